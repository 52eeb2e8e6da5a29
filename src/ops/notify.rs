use chrono::{DateTime, Duration, Local, NaiveDate, SecondsFormat, Utc};
use indexmap::IndexSet;
use sha2::{Digest, Sha256};

use crate::model::notification::{Notification, NotificationKind, Severity};
use crate::model::plan::{PlanMeta, PlanStatus};

/// In-progress plans blocked for longer than this are flagged
const STALE_AFTER_DAYS: i64 = 3;

/// First 12 hex chars of a hash over kind, filename and date, so the id
/// stays stable while the triggering condition does.
pub fn notification_id(kind: NotificationKind, filename: &str, date: &str) -> String {
    let digest = Sha256::digest(format!("{}-{}-{}", kind.as_str(), filename, date));
    let hex = format!("{:x}", digest);
    hex[..12].to_string()
}

fn parse_day(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
        .or_else(|| parse_day(s)?.and_hms_opt(0, 0, 0).map(|t| t.and_utc()))
}

struct Draft {
    kind: NotificationKind,
    severity: Severity,
    id_date: String,
    message: String,
}

fn due_draft(title: &str, due: &str, today: NaiveDate) -> Option<Draft> {
    let day = parse_day(due)?;
    let (kind, severity, message) = if day < today {
        (
            NotificationKind::Overdue,
            Severity::Critical,
            format!("\"{}\" is overdue (due {})", title, due),
        )
    } else if day == today {
        (
            NotificationKind::DueSoon,
            Severity::Warning,
            format!("\"{}\" is due today", title),
        )
    } else if Some(day) == today.succ_opt() {
        (
            NotificationKind::DueSoon,
            Severity::Info,
            format!("\"{}\" is due tomorrow", title),
        )
    } else {
        return None;
    };
    Some(Draft {
        kind,
        severity,
        id_date: due.to_string(),
        message,
    })
}

fn stale_draft(plan: &PlanMeta, now: DateTime<Utc>) -> Option<Draft> {
    let fm = plan.frontmatter.as_ref()?;
    if fm.blocked_by.is_empty() || fm.status_or_default() != PlanStatus::InProgress {
        return None;
    }
    let modified = fm
        .modified
        .as_deref()
        .and_then(parse_time)
        .or_else(|| parse_time(&plan.modified_at))?;
    if modified >= now - Duration::days(STALE_AFTER_DAYS) {
        return None;
    }
    Some(Draft {
        kind: NotificationKind::BlockedStale,
        severity: Severity::Warning,
        id_date: modified.format("%Y-%m-%d").to_string(),
        message: format!(
            "\"{}\" is blocked and hasn't been updated in {}+ days",
            plan.title, STALE_AFTER_DAYS
        ),
    })
}

/// Derive notifications from plan state. Completed plans never produce
/// any. Sorted most severe first.
pub fn generate(plans: &[PlanMeta], now: DateTime<Local>, read: &IndexSet<String>) -> Vec<Notification> {
    let today = now.date_naive();
    let now_utc = now.with_timezone(&Utc);
    let created_at = now_utc.to_rfc3339_opts(SecondsFormat::Millis, true);

    let mut out = Vec::new();
    for plan in plans {
        let Some(fm) = &plan.frontmatter else {
            continue;
        };
        if fm.status_or_default() == PlanStatus::Completed {
            continue;
        }
        let due = fm.due_date.as_deref().and_then(|d| due_draft(&plan.title, d, today));
        let stale = stale_draft(plan, now_utc);
        for draft in due.into_iter().chain(stale) {
            let id = notification_id(draft.kind, &plan.filename, &draft.id_date);
            out.push(Notification {
                read: read.contains(&id),
                id,
                kind: draft.kind,
                plan_filename: plan.filename.clone(),
                plan_title: plan.title.clone(),
                message: draft.message,
                severity: draft.severity,
                created_at: created_at.clone(),
            });
        }
    }
    out.sort_by(|a, b| a.severity.cmp(&b.severity).then_with(|| b.created_at.cmp(&a.created_at)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::plan::PlanFrontmatter;
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).single().unwrap()
    }

    fn plan(filename: &str, fm: PlanFrontmatter) -> PlanMeta {
        PlanMeta {
            filename: filename.into(),
            title: filename.trim_end_matches(".md").into(),
            created_at: String::new(),
            modified_at: "2026-03-10T00:00:00Z".into(),
            mtime_ms: 0,
            size: 0,
            preview: String::new(),
            sections: Vec::new(),
            related_project: None,
            frontmatter: Some(fm),
        }
    }

    fn due(date: &str) -> PlanFrontmatter {
        PlanFrontmatter {
            due_date: Some(date.into()),
            ..Default::default()
        }
    }

    #[test]
    fn due_dates_map_to_kinds() {
        let plans = vec![
            plan("later.md", due("2026-03-20")),
            plan("tomorrow.md", due("2026-03-11")),
            plan("late.md", due("2026-03-01")),
            plan("today.md", due("2026-03-10")),
        ];
        let list = generate(&plans, now(), &IndexSet::new());
        let got: Vec<_> = list
            .iter()
            .map(|n| (n.plan_filename.as_str(), n.kind, n.severity))
            .collect();
        assert_eq!(
            got,
            vec![
                ("late.md", NotificationKind::Overdue, Severity::Critical),
                ("today.md", NotificationKind::DueSoon, Severity::Warning),
                ("tomorrow.md", NotificationKind::DueSoon, Severity::Info),
            ]
        );
        assert_eq!(list[0].message, "\"late\" is overdue (due 2026-03-01)");
    }

    #[test]
    fn completed_plans_are_skipped() {
        let mut fm = due("2026-03-01");
        fm.status = Some(PlanStatus::Completed);
        assert!(generate(&[plan("done.md", fm)], now(), &IndexSet::new()).is_empty());
    }

    #[test]
    fn blocked_and_stale() {
        let fm = PlanFrontmatter {
            status: Some(PlanStatus::InProgress),
            blocked_by: vec!["base.md".into()],
            modified: Some("2026-03-01T08:00:00Z".into()),
            ..Default::default()
        };
        let mut fresh = fm.clone();
        fresh.modified = Some("2026-03-09T08:00:00Z".into());

        let list = generate(&[plan("old.md", fm), plan("new.md", fresh)], now(), &IndexSet::new());
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].kind, NotificationKind::BlockedStale);
        assert_eq!(
            list[0].id,
            notification_id(NotificationKind::BlockedStale, "old.md", "2026-03-01")
        );
    }

    #[test]
    fn ids_are_stable_and_read_flag_applies() {
        let plans = vec![plan("late.md", due("2026-03-01"))];
        let first = generate(&plans, now(), &IndexSet::new());
        assert_eq!(first[0].id.len(), 12);
        let read: IndexSet<String> = [first[0].id.clone()].into_iter().collect();
        let second = generate(&plans, now(), &read);
        assert_eq!(first[0].id, second[0].id);
        assert!(second[0].read);
        assert!(!first[0].read);
    }
}

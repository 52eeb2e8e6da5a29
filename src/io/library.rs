use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use indexmap::IndexSet;

use crate::io::archive_store::ArchiveStore;
use crate::io::backup_store::BackupStore;
use crate::io::config_io::{expand_home, ProcessEnv};
use crate::io::conflict::ConflictTracker;
use crate::io::error::StoreError;
use crate::io::notification_store::ReadStore;
use crate::io::plan_store::validate_filename;
use crate::io::recovery::log_plan_deletion;
use crate::io::settings_store::SettingsStore;
use crate::io::view_store::ViewStore;
use crate::model::archive::ArchiveEntry;
use crate::model::backup::{BackupInfo, ImportResult, PlanFile};
use crate::model::config::AppConfig;
use crate::model::notification::NotificationList;
use crate::ops::check::{check_plans, CheckResult};
use crate::ops::deps::{build_graph, DependencyGraph, PlanDependencies};
use crate::ops::export::{self, ExportFormat, ExportOptions, ExportPlan};
use crate::ops::notify;
use crate::ops::search::{search, SearchResult};

/// Handle shared by every surface: configuration plus the stores that
/// live under the plans directory.
#[derive(Debug)]
pub struct Library {
    config: AppConfig,
    settings: SettingsStore,
    archive: ArchiveStore,
    views: ViewStore,
    read_store: ReadStore,
    backups: BackupStore,
    conflicts: ConflictTracker,
}

impl Library {
    pub fn new(config: AppConfig) -> Self {
        let plans_dir = config.plans_dir.clone();
        Library {
            settings: SettingsStore::new(&plans_dir),
            archive: ArchiveStore::new(
                &config.archive_dir,
                config.archive_retention_days,
                config.preview_length,
            ),
            views: ViewStore::new(&plans_dir),
            read_store: ReadStore::new(&plans_dir),
            backups: BackupStore::new(&plans_dir),
            conflicts: ConflictTracker::new(),
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn plans_dir(&self) -> &Path {
        &self.config.plans_dir
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn archive(&self) -> &ArchiveStore {
        &self.archive
    }

    pub fn views(&self) -> &ViewStore {
        &self.views
    }

    pub fn conflicts(&self) -> &ConflictTracker {
        &self.conflicts
    }

    /// Directories scanned for plans, in priority order. New plans go into
    /// the first one.
    pub fn plan_directories(&self) -> Vec<PathBuf> {
        let configured = self.settings.get().plan_directories;
        if configured.is_empty() {
            return vec![self.config.plans_dir.clone()];
        }
        configured
            .iter()
            .map(|dir| expand_home(dir, &ProcessEnv))
            .collect()
    }

    pub(crate) fn create_dir(&self) -> PathBuf {
        self.plan_directories()
            .into_iter()
            .next()
            .unwrap_or_else(|| self.config.plans_dir.clone())
    }

    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        search(&self.load_plans(), query, limit)
    }

    pub fn dependency_graph(&self) -> DependencyGraph {
        build_graph(&self.load_plans())
    }

    pub fn plan_dependencies(&self, filename: &str) -> Result<PlanDependencies, StoreError> {
        validate_filename(filename)?;
        self.dependency_graph()
            .plan_dependencies(filename)
            .ok_or_else(|| StoreError::NotFound(filename.to_string()))
    }

    /// Current notifications; always empty while frontmatter is disabled.
    pub fn notifications(&self) -> NotificationList {
        if !self.settings.frontmatter_enabled() {
            return NotificationList::new(Vec::new());
        }
        let read = self.read_store.read_ids();
        let notifications = notify::generate(&self.list_plans(), Local::now(), &read);
        let current: IndexSet<String> = notifications.iter().map(|n| n.id.clone()).collect();
        match self.read_store.retain(&current) {
            Ok(0) => {}
            Ok(n) => log::debug!("forgot {} stale read notification id(s)", n),
            Err(e) => log::warn!("could not prune read notifications: {}", e),
        }
        NotificationList::new(notifications)
    }

    pub fn mark_read(&self, id: &str) -> Result<(), StoreError> {
        if id.trim().is_empty() {
            return Err(StoreError::Invalid("notification id is required".into()));
        }
        self.read_store.mark_read(id)
    }

    /// Mark every current notification read, forgetting ids of ones that
    /// no longer exist. Returns how many there were.
    pub fn mark_all_read(&self) -> Result<usize, StoreError> {
        let ids: IndexSet<String> = self
            .notifications()
            .notifications
            .into_iter()
            .map(|n| n.id)
            .collect();
        let count = ids.len();
        self.read_store.replace(ids)?;
        Ok(count)
    }

    pub fn archived(&self) -> Vec<ArchiveEntry> {
        self.archive.list()
    }

    pub fn restore_archived(&self, filename: &str) -> Result<PathBuf, StoreError> {
        validate_filename(filename)?;
        if self.plan_directories().iter().any(|d| d.join(filename).exists()) {
            return Err(StoreError::AlreadyExists(filename.to_string()));
        }
        let path = self.archive.restore(filename, &self.create_dir())?;
        self.conflicts.forget(filename);
        Ok(path)
    }

    /// Permanently delete an archived plan, keeping its content in the
    /// recovery log.
    pub fn delete_archived(&self, filename: &str) -> Result<(), StoreError> {
        validate_filename(filename)?;
        let content = self.archive.delete(filename)?;
        log_plan_deletion(&self.config.plans_dir, filename, &content);
        Ok(())
    }

    pub fn cleanup_archive(&self) -> Result<usize, StoreError> {
        self.archive.cleanup_expired(Utc::now())
    }

    pub fn check(&self) -> CheckResult {
        check_plans(&self.raw_plans())
    }

    /// Plan files selected by `options`, archived ones last.
    pub fn export_plans(&self, options: &ExportOptions) -> Vec<ExportPlan> {
        let mut plans: Vec<ExportPlan> = self
            .raw_plans()
            .into_iter()
            .map(|p| ExportPlan {
                filename: p.filename,
                content: p.content,
                archived: false,
            })
            .collect();
        if options.include_archived {
            for entry in self.archive.list() {
                match self.archive.read(&entry.filename) {
                    Ok(content) => plans.push(ExportPlan {
                        filename: entry.filename,
                        content,
                        archived: true,
                    }),
                    Err(e) => log::warn!("leaving {} out of the export: {}", entry.filename, e),
                }
            }
        }
        export::select(plans, options)
    }

    /// Render an export in `format`.
    pub fn export(&self, format: ExportFormat, options: &ExportOptions) -> Result<Vec<u8>, StoreError> {
        let plans = self.export_plans(options);
        let now = Utc::now();
        log::info!("exporting {} plan(s) as {:?}", plans.len(), format);
        match format {
            ExportFormat::Json => export::to_json(&plans, now)
                .map(String::into_bytes)
                .map_err(|e| StoreError::Export(e.to_string())),
            ExportFormat::Csv => Ok(export::to_csv(&plans).into_bytes()),
            ExportFormat::Tar => {
                export::to_tar_gz(&plans, now).map_err(|e| StoreError::Export(e.to_string()))
            }
        }
    }

    /// Snapshot every plan into a new backup.
    pub fn create_backup(&self) -> Result<BackupInfo, StoreError> {
        let plans = self
            .raw_plans()
            .into_iter()
            .map(|p| PlanFile {
                filename: p.filename,
                content: p.content,
            })
            .collect();
        self.backups.create(plans, Utc::now())
    }

    pub fn list_backups(&self) -> Vec<BackupInfo> {
        self.backups.list()
    }

    /// Import the plans of a backup. Plans that exist are left alone.
    pub fn restore_backup(&self, id: &str) -> Result<ImportResult, StoreError> {
        if id.trim().is_empty() {
            return Err(StoreError::Invalid("backup id is required".into()));
        }
        let plans = self.backups.load(id)?;
        Ok(self.import_markdown(plans))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::notification::NotificationKind;
    use crate::model::settings::SettingsUpdate;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Library) {
        let tmp = TempDir::new().unwrap();
        let lib = Library::new(AppConfig::with_plans_dir(tmp.path()));
        (tmp, lib)
    }

    #[test]
    fn archive_then_restore_is_byte_identical() {
        let (tmp, lib) = setup();
        let original = "---\nstatus: todo\n---\n# Keep me\n\nExact  bytes\t\n";
        let path = tmp.path().join("keep.md");
        std::fs::write(&path, original).unwrap();

        lib.delete_plan("keep.md", true).unwrap();
        assert!(!path.exists());
        assert_eq!(lib.archived()[0].title, "Keep me");

        let restored = lib.restore_archived("keep.md").unwrap();
        assert_eq!(restored, path);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
        assert!(lib.archived().is_empty());
    }

    #[test]
    fn restore_refuses_to_overwrite() {
        let (tmp, lib) = setup();
        std::fs::write(tmp.path().join("a.md"), "# A\n").unwrap();
        lib.delete_plan("a.md", true).unwrap();
        std::fs::write(tmp.path().join("a.md"), "# New A\n").unwrap();
        assert!(matches!(
            lib.restore_archived("a.md").unwrap_err(),
            StoreError::AlreadyExists(_)
        ));
    }

    #[test]
    fn notifications_and_read_state() {
        let (tmp, lib) = setup();
        std::fs::write(tmp.path().join("late.md"), "---\ndueDate: 2020-01-01\n---\n# Late\n").unwrap();
        std::fs::write(tmp.path().join("later.md"), "---\ndueDate: 2020-02-01\n---\n# Later\n").unwrap();

        let list = lib.notifications();
        assert_eq!(list.unread_count, 2);
        assert!(list.notifications.iter().all(|n| n.kind == NotificationKind::Overdue));

        let first = list.notifications[0].id.clone();
        lib.mark_read(&first).unwrap();
        lib.mark_read(&first).unwrap();
        let list = lib.notifications();
        assert_eq!(list.unread_count, 1);
        let other = list.notifications.iter().find(|n| n.id != first).unwrap();
        assert!(!other.read);

        assert_eq!(lib.mark_all_read().unwrap(), 2);
        assert_eq!(lib.notifications().unread_count, 0);
    }

    #[test]
    fn read_ids_of_resolved_notifications_are_forgotten() {
        let (tmp, lib) = setup();
        let late = tmp.path().join("late.md");
        std::fs::write(&late, "---\ndueDate: 2020-01-01\n---\n# Late\n").unwrap();
        std::fs::write(tmp.path().join("later.md"), "---\ndueDate: 2020-02-01\n---\n# Later\n").unwrap();

        assert_eq!(lib.mark_all_read().unwrap(), 2);
        assert_eq!(lib.read_store.read_ids().len(), 2);

        std::fs::write(&late, "---\nstatus: completed\ndueDate: 2020-01-01\n---\n# Late\n").unwrap();
        let list = lib.notifications();
        assert_eq!(list.notifications.len(), 1);
        assert_eq!(list.unread_count, 0);
        let stored: Vec<_> = lib.read_store.read_ids().into_iter().collect();
        assert_eq!(stored, vec![list.notifications[0].id.clone()]);
    }

    #[test]
    fn read_set_stays_bounded_across_mark_all() {
        let (tmp, lib) = setup();
        lib.read_store.mark_read("left-over-id").unwrap();
        std::fs::write(tmp.path().join("late.md"), "---\ndueDate: 2020-01-01\n---\n# Late\n").unwrap();

        assert_eq!(lib.mark_all_read().unwrap(), 1);
        let stored = lib.read_store.read_ids();
        assert_eq!(stored.len(), 1);
        assert!(!stored.contains("left-over-id"));
    }

    #[test]
    fn archiving_twice_under_one_name_keeps_both_copies() {
        let (tmp, lib) = setup();
        let path = tmp.path().join("a.md");
        std::fs::write(&path, "# First\n").unwrap();
        lib.delete_plan("a.md", true).unwrap();

        std::fs::write(&path, "# Second\n").unwrap();
        assert!(matches!(
            lib.delete_plan("a.md", true).unwrap_err(),
            StoreError::AlreadyArchived(_)
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Second\n");
        assert_eq!(lib.archived()[0].title, "First");
    }

    #[test]
    fn export_can_include_archived_plans() {
        let (tmp, lib) = setup();
        std::fs::write(tmp.path().join("live.md"), "---\nstatus: review\n---\n# Live\n").unwrap();
        std::fs::write(tmp.path().join("old.md"), "# Old\n").unwrap();
        lib.delete_plan("old.md", true).unwrap();

        let names = |options: &ExportOptions| -> Vec<String> {
            lib.export_plans(options).into_iter().map(|p| p.filename).collect()
        };
        assert_eq!(names(&ExportOptions::default()), vec!["live.md"]);
        let all = ExportOptions {
            include_archived: true,
            ..Default::default()
        };
        let mut every = names(&all);
        every.sort();
        assert_eq!(every, vec!["live.md", "old.md"]);

        let csv = String::from_utf8(lib.export(ExportFormat::Csv, &all).unwrap()).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.contains("live.md,Live,review,"));
    }

    #[test]
    fn backup_then_restore_brings_back_deleted_plans() {
        let (tmp, lib) = setup();
        let content = "---\nstatus: todo\n---\n# Keep\n";
        std::fs::write(tmp.path().join("keep.md"), content).unwrap();
        std::fs::write(tmp.path().join("stay.md"), "# Stay\n").unwrap();

        let info = lib.create_backup().unwrap();
        assert_eq!(info.plan_count, 2);
        assert_eq!(lib.list_backups(), vec![info.clone()]);
        // the backups directory is not mistaken for plans
        assert_eq!(lib.list_plans().len(), 2);

        lib.delete_plan("keep.md", false).unwrap();
        std::fs::write(tmp.path().join("stay.md"), "# Stay, edited\n").unwrap();

        let result = lib.restore_backup(&info.id).unwrap();
        assert_eq!(result.imported, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(std::fs::read_to_string(tmp.path().join("keep.md")).unwrap(), content);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("stay.md")).unwrap(),
            "# Stay, edited\n"
        );
        assert!(matches!(
            lib.restore_backup("missing").unwrap_err(),
            StoreError::BackupNotFound(_)
        ));
    }

    #[test]
    fn notifications_empty_when_frontmatter_disabled() {
        let (tmp, lib) = setup();
        std::fs::write(tmp.path().join("late.md"), "---\ndueDate: 2020-01-01\n---\n# Late\n").unwrap();
        lib.settings()
            .update(SettingsUpdate {
                frontmatter_enabled: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert!(lib.notifications().notifications.is_empty());
    }

    #[test]
    fn dependencies_for_missing_plan() {
        let (_tmp, lib) = setup();
        assert!(matches!(
            lib.plan_dependencies("nope.md").unwrap_err(),
            StoreError::NotFound(_)
        ));
    }
}

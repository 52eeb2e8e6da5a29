//! Plan files on disk: enumeration, reads, and every mutating operation.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;

use crate::io::conflict::{mtime_ms, ConflictCheck};
use crate::io::error::StoreError;
use crate::io::library::Library;
use crate::io::recovery::{atomic_write, log_conflict, log_failed_write, log_plan_deletion};
use crate::model::backup::{ImportFailure, ImportResult, PlanFile};
use crate::model::plan::{BulkFailure, BulkResult, PlanDetail, PlanFrontmatter, PlanMeta, PlanStatus};
use crate::ops::check::RawPlan;
use crate::ops::names;
use crate::ops::status::{available_transitions, can_transition};
use crate::ops::subtask_ops::{self, SubtaskAction, SubtaskOutcome};
use crate::parse::frontmatter::{compose, migrate, needs_migration, set_field};
use crate::parse::{extract_preview, extract_related_project, extract_sections, extract_title, parse_document};

/// Attempts at finding an unused generated filename
pub const MAX_NAME_ATTEMPTS: usize = 100;

/// Plan filenames are a single path component: `[A-Za-z0-9_-]+\.md`.
pub fn validate_filename(filename: &str) -> Result<(), StoreError> {
    let valid = filename.strip_suffix(".md").is_some_and(|stem| {
        !stem.is_empty()
            && stem
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    });
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidFilename(filename.to_string()))
    }
}

fn timestamp(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Library {
    /// Every `.md` plan across the configured directories. When the same
    /// filename exists in more than one directory the first one wins.
    fn scan(&self) -> IndexMap<String, PathBuf> {
        let mut found = IndexMap::new();
        for dir in self.plan_directories() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        log::warn!("skipping unreadable directory {}: {}", dir.display(), e);
                    }
                    continue;
                }
            };
            for entry in entries.flatten() {
                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                if validate_filename(&name).is_err() || found.contains_key(&name) {
                    continue;
                }
                let path = entry.path();
                if path.is_file() {
                    found.insert(name, path);
                }
            }
        }
        found
    }

    /// Path of an existing plan.
    pub fn resolve_plan_path(&self, filename: &str) -> Result<PathBuf, StoreError> {
        validate_filename(filename)?;
        self.plan_directories()
            .into_iter()
            .map(|dir| dir.join(filename))
            .find(|path| path.is_file())
            .ok_or_else(|| StoreError::NotFound(filename.to_string()))
    }

    fn plan_exists(&self, filename: &str) -> bool {
        self.plan_directories()
            .iter()
            .any(|dir| dir.join(filename).exists())
    }

    fn read_detail(&self, filename: &str, path: &Path, frontmatter_enabled: bool) -> Result<PlanDetail, StoreError> {
        let content = std::fs::read_to_string(path).map_err(StoreError::io(path))?;
        let stat = std::fs::metadata(path).map_err(StoreError::io(path))?;
        let doc = parse_document(&content);
        let modified = stat.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let created = stat.created().unwrap_or(modified);

        let meta = PlanMeta {
            filename: filename.to_string(),
            title: extract_title(doc.body),
            created_at: timestamp(created),
            modified_at: timestamp(modified),
            mtime_ms: mtime_ms(&stat),
            size: stat.len(),
            preview: extract_preview(doc.body, self.config().preview_length),
            sections: extract_sections(doc.body),
            related_project: extract_related_project(doc.body),
            frontmatter: if frontmatter_enabled { doc.frontmatter } else { None },
        };
        Ok(PlanDetail {
            meta,
            content: doc.body.to_string(),
        })
    }

    /// Every readable plan with its body, most recently modified first.
    pub fn load_plans(&self) -> Vec<PlanDetail> {
        let enabled = self.settings().frontmatter_enabled();
        let mut plans: Vec<PlanDetail> = self
            .scan()
            .into_iter()
            .filter_map(|(filename, path)| match self.read_detail(&filename, &path, enabled) {
                Ok(plan) => Some(plan),
                Err(e) => {
                    log::warn!("skipping {}: {}", filename, e);
                    None
                }
            })
            .collect();
        plans.sort_by(|a, b| b.meta.mtime_ms.cmp(&a.meta.mtime_ms));
        plans
    }

    pub fn list_plans(&self) -> Vec<PlanMeta> {
        self.load_plans().into_iter().map(|p| p.meta).collect()
    }

    /// Plans as raw file content, for validation.
    pub fn raw_plans(&self) -> Vec<RawPlan> {
        self.scan()
            .into_iter()
            .filter_map(|(filename, path)| {
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| log::warn!("skipping {}: {}", filename, e))
                    .ok()?;
                Some(RawPlan { filename, content })
            })
            .collect()
    }

    pub fn get_meta(&self, filename: &str) -> Result<PlanMeta, StoreError> {
        let path = self.resolve_plan_path(filename)?;
        let enabled = self.settings().frontmatter_enabled();
        Ok(self.read_detail(filename, &path, enabled)?.meta)
    }

    /// Load one plan and remember its on-disk state for conflict checks.
    pub fn get_plan(&self, filename: &str) -> Result<PlanDetail, StoreError> {
        let path = self.resolve_plan_path(filename)?;
        let enabled = self.settings().frontmatter_enabled();
        let detail = self.read_detail(filename, &path, enabled)?;
        self.conflicts().record_path(filename, &path);
        log::debug!("loaded {}", filename);
        Ok(detail)
    }

    fn check_size(&self, content: &str) -> Result<(), StoreError> {
        let size = content.len() as u64;
        let limit = self.config().max_file_size;
        if size > limit {
            return Err(StoreError::TooLarge { size, limit });
        }
        Ok(())
    }

    /// Write plan content, keeping it in the recovery log if the write fails.
    fn write_plan(&self, filename: &str, path: &Path, content: &str) -> Result<(), StoreError> {
        let result = path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|_| atomic_write(path, content.as_bytes()));
        if let Err(e) = result {
            log_failed_write(&self.config().plans_dir, filename, &e.to_string(), content);
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
        self.conflicts().record_path(filename, path);
        Ok(())
    }

    /// Create a plan in the first plan directory. Without a filename a
    /// random `adjective-verb-noun.md` name is chosen.
    pub fn create_plan(&self, content: &str, filename: Option<&str>) -> Result<PlanMeta, StoreError> {
        self.check_size(content)?;
        let filename = match filename.map(str::trim).filter(|f| !f.is_empty()) {
            Some(name) => {
                validate_filename(name)?;
                if self.plan_exists(name) {
                    return Err(StoreError::AlreadyExists(name.to_string()));
                }
                name.to_string()
            }
            None => names::generate_unique(MAX_NAME_ATTEMPTS, |name| self.plan_exists(name))
                .ok_or(StoreError::NamesExhausted(MAX_NAME_ATTEMPTS))?,
        };

        let path = self.create_dir().join(&filename);
        self.write_plan(&filename, &path, content)?;
        log::info!("created {}", filename);
        self.get_meta(&filename)
    }

    /// Write each file as a new plan. Existing plans are skipped, never
    /// overwritten; bad names and failed writes are reported per file.
    pub fn import_markdown(&self, files: Vec<PlanFile>) -> ImportResult {
        let mut result = ImportResult::default();
        let dir = self.create_dir();
        for file in files {
            let outcome = validate_filename(&file.filename)
                .map_err(|_| "Invalid filename format".to_string())
                .and_then(|_| self.check_size(&file.content).map_err(|e| e.to_string()));
            if let Err(error) = outcome {
                result.errors.push(ImportFailure {
                    filename: file.filename,
                    error,
                });
                continue;
            }
            if self.plan_exists(&file.filename) {
                result.skipped += 1;
                continue;
            }
            match self.write_plan(&file.filename, &dir.join(&file.filename), &file.content) {
                Ok(()) => result.imported += 1,
                Err(e) => result.errors.push(ImportFailure {
                    filename: file.filename,
                    error: e.to_string(),
                }),
            }
        }
        log::info!(
            "imported {} plan(s), skipped {}, {} error(s)",
            result.imported,
            result.skipped,
            result.errors.len()
        );
        result
    }

    /// Replace a plan's content. Fails with a conflict when the file changed
    /// on disk since this process last read or wrote it.
    pub fn update_plan(&self, filename: &str, content: &str) -> Result<PlanMeta, StoreError> {
        self.check_size(content)?;
        let path = self.resolve_plan_path(filename)?;
        let dir = path.parent().unwrap_or(self.config().plans_dir.as_path());

        let check = self.conflicts().check_conflict(filename, dir);
        if check.has_conflict {
            let current = check.current_mtime.unwrap_or_default();
            log_conflict(&self.config().plans_dir, filename, current, content);
            return Err(StoreError::Conflict {
                filename: filename.to_string(),
                last_known: check.last_known_mtime.unwrap_or_default(),
                current,
            });
        }

        self.write_plan(filename, &path, content)?;
        log::info!("updated {}", filename);
        self.get_meta(filename)
    }

    /// Delete a plan, either into the archive or for good. Permanently
    /// deleted content is kept in the recovery log.
    pub fn delete_plan(&self, filename: &str, archive: bool) -> Result<(), StoreError> {
        let path = self.resolve_plan_path(filename)?;
        if archive {
            self.archive().archive(filename, &path, Utc::now())?;
        } else {
            let content = std::fs::read_to_string(&path).map_err(StoreError::io(&path))?;
            std::fs::remove_file(&path).map_err(StoreError::io(&path))?;
            log_plan_deletion(&self.config().plans_dir, filename, &content);
            log::info!("deleted {}", filename);
        }
        self.conflicts().forget(filename);
        Ok(())
    }

    /// Rename within the plan's directory.
    pub fn rename_plan(&self, filename: &str, new_filename: &str) -> Result<PlanMeta, StoreError> {
        validate_filename(new_filename)?;
        let old_path = self.resolve_plan_path(filename)?;
        if filename == new_filename {
            return self.get_meta(filename);
        }
        if self.plan_exists(new_filename) {
            return Err(StoreError::AlreadyExists(new_filename.to_string()));
        }
        let new_path = old_path.with_file_name(new_filename);
        std::fs::rename(&old_path, &new_path).map_err(StoreError::io(&old_path))?;
        self.conflicts().forget(filename);
        self.conflicts().record_path(new_filename, &new_path);
        log::info!("renamed {} to {}", filename, new_filename);
        self.get_meta(new_filename)
    }

    /// Rewrite a plan's frontmatter through `edit`, stamping `modified`.
    fn edit_frontmatter<T>(
        &self,
        filename: &str,
        edit: impl FnOnce(&mut PlanFrontmatter) -> Result<T, StoreError>,
    ) -> Result<(PlanMeta, T), StoreError> {
        let path = self.resolve_plan_path(filename)?;
        let content = std::fs::read_to_string(&path).map_err(StoreError::io(&path))?;
        let doc = parse_document(&content);
        let mut fm = doc.frontmatter.unwrap_or_default();

        let output = edit(&mut fm)?;
        fm.modified = Some(now_stamp());
        let updated = compose(&fm, doc.body);
        self.check_size(&updated)?;
        self.write_plan(filename, &path, &updated)?;
        Ok((self.get_meta(filename)?, output))
    }

    pub fn update_status(&self, filename: &str, status: PlanStatus) -> Result<PlanMeta, StoreError> {
        let (meta, from) = self.edit_frontmatter(filename, |fm| {
            let from = fm.status_or_default();
            if !can_transition(from, status) {
                return Err(StoreError::InvalidTransition { from, to: status });
            }
            fm.status = Some(status);
            Ok(from)
        })?;
        log::info!("{}: {} -> {}", filename, from, status);
        Ok(meta)
    }

    /// Set one frontmatter field from a JSON value (`null` clears it).
    pub fn update_frontmatter_field(
        &self,
        filename: &str,
        field: &str,
        value: serde_json::Value,
    ) -> Result<PlanMeta, StoreError> {
        let (meta, ()) = self.edit_frontmatter(filename, |fm| Ok(set_field(fm, field, value)?))?;
        log::info!("{}: set {}", filename, field);
        Ok(meta)
    }

    pub fn apply_subtask(&self, filename: &str, action: SubtaskAction) -> Result<SubtaskOutcome, StoreError> {
        let (_, subtask) = self.edit_frontmatter(filename, |fm| subtask_ops::apply(fm, action))?;
        Ok(SubtaskOutcome {
            success: true,
            subtask,
        })
    }

    /// Statuses the plan may move to next.
    pub fn available_transitions(&self, filename: &str) -> Result<Vec<PlanStatus>, StoreError> {
        let status = self.get_meta(filename)?.status();
        Ok(available_transitions(status).to_vec())
    }

    pub fn check_conflict(&self, filename: &str) -> Result<ConflictCheck, StoreError> {
        validate_filename(filename)?;
        let dir = match self.resolve_plan_path(filename) {
            Ok(path) => path.parent().map(Path::to_path_buf),
            Err(_) => None,
        }
        .unwrap_or_else(|| self.config().plans_dir.clone());
        Ok(self.conflicts().check_conflict(filename, &dir))
    }

    pub fn bulk_delete(&self, filenames: &[String], archive: bool) -> BulkResult {
        bulk(filenames, |f| self.delete_plan(f, archive))
    }

    pub fn bulk_status(&self, filenames: &[String], status: PlanStatus) -> BulkResult {
        bulk(filenames, |f| self.update_status(f, status).map(|_| ()))
    }

    /// Upgrade every plan whose frontmatter predates the current schema.
    /// Returns the filenames that were rewritten.
    pub fn migrate_all(&self) -> Result<Vec<String>, StoreError> {
        let mut migrated = Vec::new();
        for (filename, path) in self.scan() {
            let content = std::fs::read_to_string(&path).map_err(StoreError::io(&path))?;
            let doc = parse_document(&content);
            let Some(fm) = doc.frontmatter else {
                continue;
            };
            if !needs_migration(Some(&fm)) {
                continue;
            }
            self.write_plan(&filename, &path, &compose(&migrate(fm), doc.body))?;
            migrated.push(filename);
        }
        if !migrated.is_empty() {
            log::info!("migrated {} plan(s)", migrated.len());
        }
        Ok(migrated)
    }
}

fn bulk(filenames: &[String], mut op: impl FnMut(&str) -> Result<(), StoreError>) -> BulkResult {
    let mut result = BulkResult::default();
    for filename in filenames {
        match op(filename) {
            Ok(()) => result.succeeded.push(filename.clone()),
            Err(e) => result.failed.push(BulkFailure {
                filename: filename.clone(),
                error: e.to_string(),
            }),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::AppConfig;
    use crate::model::plan::SubtaskStatus;
    use crate::ops::subtask_ops::NewSubtask;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Library) {
        let tmp = TempDir::new().unwrap();
        let lib = Library::new(AppConfig::with_plans_dir(tmp.path()));
        (tmp, lib)
    }

    fn write(tmp: &TempDir, name: &str, content: &str) {
        std::fs::write(tmp.path().join(name), content).unwrap();
    }

    #[test]
    fn filename_validation() {
        assert!(validate_filename("plan-1_a.md").is_ok());
        for bad in ["../x.md", "a/b.md", ".md", "plan.txt", "pl an.md", "a..md"] {
            assert!(validate_filename(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn list_reads_metadata() {
        let (tmp, lib) = setup();
        write(&tmp, "a.md", "---\nstatus: review\n---\n# Alpha\n\nSome prose.\n## Step\n");
        write(&tmp, "notes.txt", "ignored");
        let plans = lib.list_plans();
        assert_eq!(plans.len(), 1);
        let meta = &plans[0];
        assert_eq!(meta.title, "Alpha");
        assert_eq!(meta.preview, "Some prose.");
        assert_eq!(meta.sections, vec!["Step"]);
        assert_eq!(meta.status(), PlanStatus::Review);
    }

    #[test]
    fn create_generates_name_and_rejects_duplicates() {
        let (_tmp, lib) = setup();
        let meta = lib.create_plan("# New\n", None).unwrap();
        assert!(meta.filename.ends_with(".md"));
        let err = lib.create_plan("# Again\n", Some(&meta.filename)).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        let err = lib.create_plan("# Bad\n", Some("../escape.md")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidFilename(_)));
    }

    #[test]
    fn create_enforces_size_limit() {
        let tmp = TempDir::new().unwrap();
        let mut config = AppConfig::with_plans_dir(tmp.path());
        config.max_file_size = 8;
        let lib = Library::new(config);
        let err = lib.create_plan("# far too long\n", Some("x.md")).unwrap_err();
        assert!(matches!(err, StoreError::TooLarge { limit: 8, .. }));
    }

    #[test]
    fn update_detects_external_change() {
        let (tmp, lib) = setup();
        write(&tmp, "a.md", "# A\n");
        lib.get_plan("a.md").unwrap();
        lib.update_plan("a.md", "# A\nmine\n").unwrap();
        // Own writes never conflict
        lib.update_plan("a.md", "# A\nmine again\n").unwrap();

        let path = tmp.path().join("a.md");
        let later = SystemTime::now() + std::time::Duration::from_secs(5);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();

        assert!(lib.check_conflict("a.md").unwrap().has_conflict);
        let err = lib.update_plan("a.md", "# A\nlost?\n").unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        let log = std::fs::read_to_string(tmp.path().join(".recovery.log")).unwrap();
        assert!(log.contains("lost?"));
    }

    #[test]
    fn status_workflow_is_enforced() {
        let (tmp, lib) = setup();
        write(&tmp, "a.md", "# A\nbody\n");
        let err = lib.update_status("a.md", PlanStatus::Completed).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        let meta = lib.update_status("a.md", PlanStatus::InProgress).unwrap();
        let fm = meta.frontmatter.unwrap();
        assert_eq!(fm.status, Some(PlanStatus::InProgress));
        assert!(fm.modified.is_some());
        let content = std::fs::read_to_string(tmp.path().join("a.md")).unwrap();
        assert!(content.starts_with("---\n"));
        assert!(content.ends_with("# A\nbody\n"));
        assert_eq!(
            lib.available_transitions("a.md").unwrap(),
            vec![PlanStatus::Review, PlanStatus::Todo]
        );
    }

    #[test]
    fn frontmatter_field_and_subtasks() {
        let (tmp, lib) = setup();
        write(&tmp, "a.md", "# A\n");
        lib.update_frontmatter_field("a.md", "tags", serde_json::json!(["x", "y"]))
            .unwrap();
        let err = lib
            .update_frontmatter_field("a.md", "colour", serde_json::json!("red"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Field(_)));

        let outcome = lib
            .apply_subtask(
                "a.md",
                SubtaskAction::Add {
                    subtask: NewSubtask {
                        title: "Check".into(),
                        ..Default::default()
                    },
                },
            )
            .unwrap();
        let id = outcome.subtask.unwrap().id;
        lib.apply_subtask("a.md", SubtaskAction::Toggle { subtask_id: id }).unwrap();

        let fm = lib.get_meta("a.md").unwrap().frontmatter.unwrap();
        assert_eq!(fm.tags, vec!["x", "y"]);
        assert_eq!(fm.subtasks[0].status, SubtaskStatus::Done);
    }

    #[test]
    fn rename_and_delete() {
        let (tmp, lib) = setup();
        write(&tmp, "a.md", "# A\n");
        write(&tmp, "b.md", "# B\n");
        assert!(matches!(
            lib.rename_plan("a.md", "b.md").unwrap_err(),
            StoreError::AlreadyExists(_)
        ));
        lib.rename_plan("a.md", "c.md").unwrap();
        assert!(tmp.path().join("c.md").is_file());

        lib.delete_plan("c.md", false).unwrap();
        assert!(!tmp.path().join("c.md").exists());
        assert!(matches!(lib.get_plan("c.md").unwrap_err(), StoreError::NotFound(_)));
    }

    #[test]
    fn bulk_reports_each_file() {
        let (tmp, lib) = setup();
        write(&tmp, "a.md", "# A\n");
        let names = vec!["a.md".to_string(), "ghost.md".to_string()];
        let result = lib.bulk_status(&names, PlanStatus::InProgress);
        assert_eq!(result.succeeded, vec!["a.md"]);
        assert_eq!(result.failed[0].filename, "ghost.md");
        assert_eq!(result.failed[0].error, "Plan not found: ghost.md");
    }

    #[test]
    fn migrate_stamps_schema_version() {
        let (tmp, lib) = setup();
        write(&tmp, "old.md", "---\nstatus: todo\n---\n# Old\n");
        write(&tmp, "plain.md", "# Plain\n");
        assert_eq!(lib.migrate_all().unwrap(), vec!["old.md"]);
        assert!(lib.migrate_all().unwrap().is_empty());
        let content = std::fs::read_to_string(tmp.path().join("old.md")).unwrap();
        assert!(content.contains("schemaVersion: 1"));
    }

    #[test]
    fn disabled_frontmatter_hides_it() {
        let (tmp, lib) = setup();
        write(&tmp, "a.md", "---\nstatus: review\n---\n# A\n");
        lib.settings()
            .update(crate::model::settings::SettingsUpdate {
                frontmatter_enabled: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert!(lib.get_plan("a.md").unwrap().meta.frontmatter.is_none());
    }

    #[test]
    fn second_directory_is_searched() {
        let (tmp, lib) = setup();
        let extra = TempDir::new().unwrap();
        std::fs::write(extra.path().join("far.md"), "# Far\n").unwrap();
        std::fs::write(extra.path().join("a.md"), "# Shadowed\n").unwrap();
        write(&tmp, "a.md", "# Near\n");
        lib.settings()
            .update(crate::model::settings::SettingsUpdate {
                plan_directories: Some(vec![
                    tmp.path().display().to_string(),
                    extra.path().display().to_string(),
                ]),
                ..Default::default()
            })
            .unwrap();
        let titles: Vec<_> = {
            let mut t: Vec<_> = lib.list_plans().into_iter().map(|m| m.title).collect();
            t.sort();
            t
        };
        assert_eq!(titles, vec!["Far", "Near"]);
    }

    #[test]
    fn import_skips_existing_and_reports_bad_names() {
        let (tmp, lib) = setup();
        write(&tmp, "taken.md", "# Mine\n");
        let file = |name: &str, content: &str| PlanFile {
            filename: name.to_string(),
            content: content.to_string(),
        };

        let result = lib.import_markdown(vec![
            file("new.md", "---\nstatus: review\n---\n# New\n"),
            file("taken.md", "# Theirs\n"),
            file("../escape.md", "# Bad\n"),
        ]);
        assert_eq!(result.imported, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(
            result.errors,
            vec![ImportFailure {
                filename: "../escape.md".to_string(),
                error: "Invalid filename format".to_string(),
            }]
        );
        assert_eq!(std::fs::read_to_string(tmp.path().join("taken.md")).unwrap(), "# Mine\n");
        assert_eq!(lib.get_meta("new.md").unwrap().status(), PlanStatus::Review);
    }
}

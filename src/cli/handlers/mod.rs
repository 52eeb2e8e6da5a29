use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde_json::Value;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io::{self, ProcessEnv};
use crate::io::recovery;
use crate::io::Library;
use crate::model::backup::{ImportResult, PlanFile};
use crate::model::config::AppConfig;
use crate::model::plan::{PlanMeta, PlanPriority, SubtaskStatus};
use crate::model::settings::SettingsUpdate;
use crate::model::view::{CreateViewRequest, ViewFilters};
use crate::ops::check::{CheckError, CheckWarning};
use crate::ops::export::{ExportFormat, ExportOptions};
use crate::ops::search::DEFAULT_LIMIT;
use crate::ops::subtask_ops::{NewSubtask, SubtaskAction, SubtaskPatch};
use crate::{rpc, server};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;
    let plans_dir = cli.plans_dir.as_deref().map(PathBuf::from);
    let config = config_io::load_config(plans_dir.as_deref())?;

    let (lib, command) = match cli.command {
        // Commands that do not need the library
        Commands::Config(args) => return cmd_config(args, &config, plans_dir.as_deref(), json),
        Commands::Serve(args) => return cmd_serve(args, config),
        command => (Library::new(config), command),
    };

    match command {
        // Read commands
        Commands::List(args) => cmd_list(&lib, args, json),
        Commands::Show(args) => cmd_show(&lib, args, json),
        Commands::Search(args) => cmd_search(&lib, args, json),
        Commands::Deps(args) => cmd_deps(&lib, args, json),
        Commands::Check => cmd_check(&lib, json),

        // Write commands
        Commands::Create(args) => cmd_create(&lib, args, json),
        Commands::Update(args) => cmd_update(&lib, args, json),
        Commands::Delete(args) => cmd_delete(&lib, args),
        Commands::Rename(args) => cmd_rename(&lib, args, json),
        Commands::Status(args) => cmd_status(&lib, args, json),
        Commands::Set(args) => cmd_set(&lib, args, json),
        Commands::Subtask(args) => cmd_subtask(&lib, args, json),
        Commands::Bulk(args) => cmd_bulk(&lib, args, json),
        Commands::Migrate => cmd_migrate(&lib, json),

        // Services
        Commands::Archive(args) => cmd_archive(&lib, args, json),
        Commands::Notifications(args) => cmd_notifications(&lib, args, json),
        Commands::Views(args) => cmd_views(&lib, args, json),
        Commands::Settings(args) => cmd_settings(&lib, args, json),
        Commands::Recovery(args) => cmd_recovery(&lib, args, json),
        Commands::Export(args) => cmd_export(&lib, args),
        Commands::Import(args) => cmd_import(&lib, args, json),
        Commands::Backup(args) => cmd_backup(&lib, args, json),
        Commands::Rpc(args) => cmd_rpc(&lib, args),
        Commands::Config(_) | Commands::Serve(_) => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn print_json<T: Serialize + ?Sized>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

/// Plan content from `--file`, or stdin when no file is given.
fn read_content(file: Option<&str>) -> Result<String, Box<dyn std::error::Error>> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {}", path, e).into()),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc())
        })
        .map_err(|_| format!("invalid timestamp: {} (expected ISO-8601)", s))
}

fn parse_subtask_status(s: &str) -> Result<SubtaskStatus, String> {
    SubtaskStatus::parse(s).ok_or_else(|| format!("invalid subtask status: {} (expected todo, done)", s))
}

fn parse_priority(s: &str) -> Result<PlanPriority, String> {
    PlanPriority::parse(s)
        .ok_or_else(|| format!("invalid priority: {} (expected low, medium, high, critical)", s))
}

/// A CLI value as JSON: valid JSON is taken as-is, anything else is a string.
fn cli_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

fn cmd_list(lib: &Library, args: ListArgs, json: bool) -> CmdResult {
    let mut query = Vec::new();
    if let Some(id) = &args.view {
        query.push(lib.views().get(id)?.to_query());
    }
    if let Some(status) = &args.status {
        query.push(format!("status={}", parse_plan_status(status)?));
    }
    if let Some(tag) = &args.tag {
        query.push(format!("tag=\"{}\"", tag));
    }
    let query = query.join(" ");

    let mut plans = lib.list_plans();
    if !query.trim().is_empty() {
        let matched: IndexSet<String> = lib
            .search(&query, usize::MAX)
            .into_iter()
            .map(|r| r.filename)
            .collect();
        plans.retain(|p| matched.contains(&p.filename));
    }

    if json {
        #[derive(Serialize)]
        struct ListJson<'a> {
            total: usize,
            plans: &'a [PlanMeta],
        }
        return print_json(&ListJson {
            total: plans.len(),
            plans: &plans,
        });
    }
    for plan in &plans {
        println!("{}", format_plan_line(plan));
    }
    Ok(())
}

fn cmd_show(lib: &Library, args: ShowArgs, json: bool) -> CmdResult {
    let detail = lib.get_plan(&args.filename)?;
    if json {
        return print_json(&detail);
    }
    if args.body {
        print!("{}", detail.content);
    } else {
        print_lines(&format_plan_detail(&detail));
    }
    Ok(())
}

fn cmd_search(lib: &Library, args: SearchArgs, json: bool) -> CmdResult {
    let query = args.query.join(" ");
    let limit = args.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 {
        return Err("limit must be at least 1".into());
    }
    let results = lib.search(&query, limit);
    if json {
        return print_json(&serde_json::json!({
            "total": results.len(),
            "query": query,
            "results": results,
        }));
    }
    if results.is_empty() {
        println!("no matches");
    }
    for result in &results {
        print_lines(&format_search_result(result));
    }
    Ok(())
}

fn cmd_deps(lib: &Library, args: DepsArgs, json: bool) -> CmdResult {
    match args.filename {
        Some(filename) => {
            let deps = lib.plan_dependencies(&filename)?;
            if json {
                return print_json(&deps);
            }
            print_lines(&format_plan_dependencies(&deps));
        }
        None => {
            let graph = lib.dependency_graph();
            if json {
                return print_json(&graph);
            }
            for edge in &graph.edges {
                println!("{} -> {}", edge.from, edge.to);
            }
            for node in graph.nodes.iter().filter(|n| !n.unresolved.is_empty()) {
                println!("{} has unresolved links: {}", node.filename, node.unresolved.join(", "));
            }
        }
    }
    Ok(())
}

fn cmd_check(lib: &Library, json: bool) -> CmdResult {
    let result = lib.check();
    if json {
        return print_json(&result);
    }
    if !result.errors.is_empty() {
        println!("Errors:");
        for err in &result.errors {
            match err {
                CheckError::MalformedFrontmatter { filename, message } => {
                    println!("  {} has malformed frontmatter: {}", filename, message);
                }
                CheckError::InvalidStatus { filename, value } => {
                    println!("  {} has invalid status: {}", filename, value);
                }
                CheckError::InvalidPriority { filename, value } => {
                    println!("  {} has invalid priority: {}", filename, value);
                }
                CheckError::InvalidDueDate { filename, value } => {
                    println!("  {} has invalid dueDate: {}", filename, value);
                }
                CheckError::InvalidEstimate { filename, value } => {
                    println!("  {} has invalid estimate: {}", filename, value);
                }
                CheckError::DanglingBlockedBy { filename, target } => {
                    println!("  {} is blocked by missing plan: {}", filename, target);
                }
                CheckError::InvalidSubtask { filename, index } => {
                    println!("  {} has an invalid subtask at position {}", filename, index);
                }
            }
        }
    }
    if !result.warnings.is_empty() {
        if !result.errors.is_empty() {
            println!();
        }
        println!("Warnings:");
        for warn in &result.warnings {
            match warn {
                CheckWarning::UnresolvedLink { filename, target } => {
                    println!("  {} links to missing plan: {}", filename, target);
                }
                CheckWarning::LegacyStatus {
                    filename,
                    value,
                    canonical,
                } => {
                    println!("  {} uses legacy status {} (now {})", filename, value, canonical);
                }
                CheckWarning::MissingTitle { filename } => {
                    println!("  {} has no # title", filename);
                }
                CheckWarning::OutdatedSchema { filename } => {
                    println!("  {} has outdated frontmatter (run `pb migrate`)", filename);
                }
            }
        }
    }
    if result.valid {
        println!("✓ {} plans are valid", result.checked);
    } else {
        println!("✗ plans have errors");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

fn print_meta(meta: &PlanMeta, json: bool) -> CmdResult {
    if json {
        return print_json(meta);
    }
    println!("{}", format_plan_line(meta));
    Ok(())
}

fn cmd_create(lib: &Library, args: CreateArgs, json: bool) -> CmdResult {
    let content = read_content(args.file.as_deref())?;
    let meta = lib.create_plan(&content, args.name.as_deref())?;
    if json {
        return print_json(&meta);
    }
    println!("{}", meta.filename);
    Ok(())
}

fn cmd_update(lib: &Library, args: UpdateArgs, json: bool) -> CmdResult {
    let content = read_content(args.file.as_deref())?;
    // Record the on-disk state first so an external edit in between is caught
    lib.get_plan(&args.filename)?;
    let meta = lib.update_plan(&args.filename, &content)?;
    print_meta(&meta, json)
}

fn cmd_delete(lib: &Library, args: DeleteArgs) -> CmdResult {
    lib.delete_plan(&args.filename, !args.permanent)?;
    if args.permanent {
        println!("deleted {}", args.filename);
    } else {
        println!("archived {}", args.filename);
    }
    Ok(())
}

fn cmd_rename(lib: &Library, args: RenameArgs, json: bool) -> CmdResult {
    let meta = lib.rename_plan(&args.filename, &args.new_filename)?;
    print_meta(&meta, json)
}

fn cmd_status(lib: &Library, args: StatusArgs, json: bool) -> CmdResult {
    let Some(status) = args.status else {
        let transitions = lib.available_transitions(&args.filename)?;
        if json {
            return print_json(&serde_json::json!({ "transitions": transitions }));
        }
        for t in transitions {
            println!("{}", t);
        }
        return Ok(());
    };
    let status = parse_plan_status(&status)?;
    let meta = lib.update_status(&args.filename, status)?;
    print_meta(&meta, json)
}

fn cmd_set(lib: &Library, args: SetArgs, json: bool) -> CmdResult {
    let meta = lib.update_frontmatter_field(&args.filename, &args.field, cli_value(&args.value))?;
    print_meta(&meta, json)
}

fn cmd_subtask(lib: &Library, args: SubtaskCmd, json: bool) -> CmdResult {
    let action = match args.action.unwrap_or(SubtaskCliAction::List) {
        SubtaskCliAction::List => {
            let meta = lib.get_meta(&args.filename)?;
            let subtasks = meta.frontmatter.map(|fm| fm.subtasks).unwrap_or_default();
            if json {
                return print_json(&subtasks);
            }
            for st in &subtasks {
                println!("{}", format_subtask_line(st));
            }
            return Ok(());
        }
        SubtaskCliAction::Add(a) => SubtaskAction::Add {
            subtask: NewSubtask {
                title: a.title,
                status: None,
                assignee: a.assignee,
                due_date: a.due,
            },
        },
        SubtaskCliAction::Toggle(a) => SubtaskAction::Toggle { subtask_id: a.id },
        SubtaskCliAction::Delete(a) => SubtaskAction::Delete { subtask_id: a.id },
        SubtaskCliAction::Update(a) => SubtaskAction::Update {
            subtask_id: a.id,
            subtask: SubtaskPatch {
                title: a.title,
                status: a.status.as_deref().map(parse_subtask_status).transpose()?,
                assignee: a.assignee,
                due_date: a.due,
            },
        },
    };

    let outcome = lib.apply_subtask(&args.filename, action)?;
    if json {
        return print_json(&outcome);
    }
    match &outcome.subtask {
        Some(st) => println!("{}", format_subtask_line(st)),
        None => println!("ok"),
    }
    Ok(())
}

fn cmd_bulk(lib: &Library, args: BulkCmd, json: bool) -> CmdResult {
    let result = match args.action {
        BulkAction::Delete(a) => lib.bulk_delete(&a.filenames, !a.permanent),
        BulkAction::Status(a) => lib.bulk_status(&a.filenames, parse_plan_status(&a.status)?),
    };
    if json {
        return print_json(&result);
    }
    for name in &result.succeeded {
        println!("ok    {}", name);
    }
    for failure in &result.failed {
        println!("fail  {}: {}", failure.filename, failure.error);
    }
    if !result.failed.is_empty() {
        return Err(format!("{} of {} failed", result.failed.len(), result.failed.len() + result.succeeded.len()).into());
    }
    Ok(())
}

fn cmd_migrate(lib: &Library, json: bool) -> CmdResult {
    let migrated = lib.migrate_all()?;
    if json {
        return print_json(&serde_json::json!({ "migrated": migrated }));
    }
    if migrated.is_empty() {
        println!("nothing to migrate");
    }
    for name in &migrated {
        println!("migrated {}", name);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

fn cmd_archive(lib: &Library, args: ArchiveCmd, json: bool) -> CmdResult {
    match args.action.unwrap_or(ArchiveAction::List) {
        ArchiveAction::List => {
            let archived = lib.archived();
            if json {
                return print_json(&archived);
            }
            if archived.is_empty() {
                println!("archive is empty");
            }
            for entry in &archived {
                println!("{}", format_archive_entry(entry));
            }
        }
        ArchiveAction::Restore(a) => {
            let path = lib.restore_archived(&a.filename)?;
            println!("restored {} to {}", a.filename, path.display());
        }
        ArchiveAction::Delete(a) => {
            lib.delete_archived(&a.filename)?;
            println!("deleted {}", a.filename);
        }
        ArchiveAction::Cleanup => {
            let deleted = lib.cleanup_archive()?;
            if json {
                return print_json(&serde_json::json!({ "deleted": deleted }));
            }
            println!("removed {} expired plan(s)", deleted);
        }
    }
    Ok(())
}

fn cmd_notifications(lib: &Library, args: NotificationsCmd, json: bool) -> CmdResult {
    match args.action.unwrap_or(NotificationsAction::List) {
        NotificationsAction::List => {
            let list = lib.notifications();
            if json {
                return print_json(&list);
            }
            for n in &list.notifications {
                println!("{}", format_notification(n));
            }
            println!("{} unread", list.unread_count);
        }
        NotificationsAction::Read(a) => {
            lib.mark_read(&a.id)?;
        }
        NotificationsAction::ReadAll => {
            let marked = lib.mark_all_read()?;
            println!("marked {} notification(s) read", marked);
        }
    }
    Ok(())
}

fn cmd_views(lib: &Library, args: ViewsCmd, json: bool) -> CmdResult {
    match args.action.unwrap_or(ViewsAction::List) {
        ViewsAction::List => {
            let views = lib.views().list();
            if json {
                return print_json(&views);
            }
            for view in &views {
                println!("{}", format_view(view));
            }
        }
        ViewsAction::Show(a) => {
            let view = lib.views().get(&a.id)?;
            if json {
                return print_json(&view);
            }
            println!("{}", format_view(&view));
        }
        ViewsAction::Create(a) => {
            let request = CreateViewRequest {
                name: a.name,
                query: a.query,
                filters: ViewFilters {
                    status: a.status.as_deref().map(parse_plan_status).transpose()?,
                    priority: a.priority.as_deref().map(parse_priority).transpose()?,
                    tags: a.tags,
                    assignee: a.assignee,
                    due_after: None,
                    due_before: None,
                },
                sort_by: None,
                sort_order: None,
            };
            let view = lib.views().create(request)?;
            if json {
                return print_json(&view);
            }
            println!("{}", view.id);
        }
        ViewsAction::Delete(a) => {
            lib.views().delete(&a.id)?;
            println!("deleted view {}", a.id);
        }
    }
    Ok(())
}

fn cmd_settings(lib: &Library, args: SettingsCmd, json: bool) -> CmdResult {
    let settings = match args.action.unwrap_or(SettingsAction::Show) {
        SettingsAction::Show => lib.settings().get(),
        SettingsAction::Set(a) => {
            let mut shortcuts = IndexMap::new();
            for pair in &a.shortcuts {
                let (action, chord) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("invalid shortcut: {} (expected ACTION=CHORD)", pair))?;
                shortcuts.insert(action.trim().to_string(), chord.trim().to_string());
            }
            let update = SettingsUpdate {
                frontmatter_enabled: a.frontmatter,
                plan_directories: (!a.dirs.is_empty()).then_some(a.dirs),
                shortcuts: (!shortcuts.is_empty()).then_some(shortcuts),
            };
            lib.settings().update(update)?
        }
    };
    if json {
        return print_json(&settings);
    }
    println!("frontmatter: {}", if settings.frontmatter_enabled { "on" } else { "off" });
    println!("plan directories:");
    for dir in lib.plan_directories() {
        println!("  {}", dir.display());
    }
    println!("shortcuts:");
    for (action, chord) in &settings.shortcuts {
        println!("  {:<16} {}", action, chord);
    }
    Ok(())
}

fn cmd_export(lib: &Library, args: ExportArgs) -> CmdResult {
    let format = ExportFormat::parse(&args.format)
        .ok_or_else(|| format!("unknown export format: {} (expected json, csv, tar)", args.format))?;
    let options = ExportOptions {
        include_archived: args.include_archived,
        filter_status: args.status.as_deref().map(parse_plan_status).transpose()?,
        filter_tags: args.tags,
    };
    let bytes = lib.export(format, &options)?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, &bytes).map_err(|e| format!("cannot write {}: {}", path, e))?;
            eprintln!("wrote {}", path);
        }
        None if format == ExportFormat::Tar => {
            return Err("tar exports are binary; pass --output FILE".into());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            if !bytes.ends_with(b"\n") {
                writeln!(stdout)?;
            }
        }
    }
    Ok(())
}

fn print_import_result(result: &ImportResult, json: bool) -> CmdResult {
    if json {
        return print_json(result);
    }
    println!("imported {}, skipped {} existing", result.imported, result.skipped);
    for failure in &result.errors {
        println!("  {}: {}", failure.filename, failure.error);
    }
    Ok(())
}

fn cmd_import(lib: &Library, args: ImportArgs, json: bool) -> CmdResult {
    let mut files = Vec::new();
    for path in &args.files {
        let filename = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| format!("not a file: {}", path))?
            .to_string();
        let content = read_content(Some(path.as_str()))?;
        files.push(PlanFile { filename, content });
    }
    print_import_result(&lib.import_markdown(files), json)
}

fn cmd_backup(lib: &Library, args: BackupCmd, json: bool) -> CmdResult {
    match args.action.unwrap_or(BackupAction::List) {
        BackupAction::List => {
            let backups = lib.list_backups();
            if json {
                return print_json(&backups);
            }
            if backups.is_empty() {
                println!("no backups");
            }
            for backup in &backups {
                println!("{}", format_backup(backup));
            }
        }
        BackupAction::Create => {
            let info = lib.create_backup()?;
            if json {
                return print_json(&info);
            }
            println!("backed up {} plan(s) as {}", info.plan_count, info.id);
        }
        BackupAction::Restore(a) => {
            print_import_result(&lib.restore_backup(&a.id)?, json)?;
        }
    }
    Ok(())
}

fn cmd_recovery(lib: &Library, args: RecoveryCmd, json: bool) -> CmdResult {
    let plans_dir = &lib.config().plans_dir;
    match args.action {
        Some(RecoveryAction::Path) => {
            println!("{}", recovery::recovery_log_path(plans_dir).display());
        }
        Some(RecoveryAction::Prune(a)) => {
            let before = a.before.as_deref().map(parse_timestamp).transpose()?;
            let removed = recovery::prune_recovery(plans_dir, before, a.all)?;
            println!("pruned {} entr{}", removed, if removed == 1 { "y" } else { "ies" });
        }
        None => {
            let since = args.since.as_deref().map(parse_timestamp).transpose()?;
            let entries = recovery::read_recovery_entries(plans_dir, Some(args.limit.unwrap_or(10)), since);
            if json {
                let values: Vec<Value> = entries.iter().map(|e| e.to_json()).collect();
                return print_json(&values);
            }
            if entries.is_empty() {
                println!("recovery log is empty");
            } else {
                println!("{}", format_recovery_entries(&entries));
            }
        }
    }
    Ok(())
}

fn cmd_rpc(lib: &Library, args: RpcArgs) -> CmdResult {
    let payload = match args.payload.as_deref() {
        Some(raw) => serde_json::from_str(raw).map_err(|e| format!("payload is not valid JSON: {}", e))?,
        None => Value::Null,
    };
    match rpc::dispatch(lib, &args.channel, payload) {
        Ok(value) => print_json(&value),
        Err(e) => {
            print_json(&e.to_json())?;
            Err(e.into())
        }
    }
}

// ---------------------------------------------------------------------------
// Config and server
// ---------------------------------------------------------------------------

fn cmd_config(args: ConfigCmd, config: &AppConfig, plans_dir: Option<&Path>, json: bool) -> CmdResult {
    let path = config_io::config_file_path(plans_dir, &ProcessEnv);
    match args.action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            if json {
                return print_json(config);
            }
            println!("plans_dir              = {}", config.plans_dir.display());
            println!("archive_dir            = {}", config.archive_dir.display());
            println!("archive_retention_days = {}", config.archive_retention_days);
            println!("max_file_size          = {}", config.max_file_size);
            println!("server.host            = {}", config.host);
            println!("server.port            = {}", config.port);
            println!("server.cors_origins    = {}", config.cors_origins.join(", "));
        }
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Set(a) => {
            let mut doc = match config_io::read_config_file(&path)? {
                Some((_, doc)) => doc,
                None => toml_edit::DocumentMut::new(),
            };
            config_io::set_config_value(&mut doc, &a.key, &a.value)?;
            config_io::write_config_file(&path, &doc)?;
            println!("set {} in {}", a.key, path.display());
        }
    }
    Ok(())
}

fn cmd_serve(args: ServeArgs, mut config: AppConfig) -> CmdResult {
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(host) = args.host {
        config.host = host;
    }
    let lib = Arc::new(Library::new(config));
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server::serve(lib))?;
    Ok(())
}

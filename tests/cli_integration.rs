//! Integration tests for the `pb` CLI.
//!
//! Each test creates a temp plans directory, runs `pb` as a subprocess,
//! and verifies stdout and/or file contents.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

fn pb_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pb"))
}

/// A plans directory with three plans: one without frontmatter, one in
/// progress that links to the first, and one blocked by the second.
fn create_test_library(root: &Path) {
    fs::write(
        root.join("auth-migration.md"),
        "\
# Migrate auth

Project: `~/src/auth`

## Steps
- move sessions
- rotate keys
",
    )
    .unwrap();

    fs::write(
        root.join("api-cleanup.md"),
        "\
---
status: in_progress
priority: high
tags: [backend, api]
dueDate: 2020-01-01
---
# API cleanup

Depends on [[auth-migration]] being done.
",
    )
    .unwrap();

    fs::write(
        root.join("release.md"),
        "\
---
status: todo
blockedBy: [api-cleanup]
---
# Release 2.0

Ship it.
",
    )
    .unwrap();
}

fn command(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(pb_bin());
    cmd.arg("--plans-dir")
        .arg(dir)
        .args(args)
        .current_dir(dir)
        .env_remove("PLANBOOK_CONFIG")
        .env_remove("PLANS_DIR")
        .env_remove("ARCHIVE_DIR");
    cmd
}

/// Run `pb` against `dir`, returning (stdout, stderr, success).
fn run_pb(dir: &Path, args: &[&str]) -> (String, String, bool) {
    let output = command(dir, args).output().expect("failed to run pb");
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Run `pb` expecting success, return stdout.
fn run_pb_ok(dir: &Path, args: &[&str]) -> String {
    let (stdout, stderr, success) = run_pb(dir, args);
    if !success {
        panic!("pb {:?} failed:\nstdout: {}\nstderr: {}", args, stdout, stderr);
    }
    stdout
}

/// Run `pb` with `input` on stdin, expecting success.
fn run_pb_stdin(dir: &Path, args: &[&str], input: &str) -> String {
    let mut child = command(dir, args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run pb");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(
        output.status.success(),
        "pb {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn json(out: &str) -> serde_json::Value {
    serde_json::from_str(out).unwrap()
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

#[test]
fn test_list_all() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_library(tmp.path());

    let out = run_pb_ok(tmp.path(), &["list"]);
    assert!(out.contains("auth-migration.md"));
    assert!(out.contains("API cleanup"));
    assert!(out.contains("Release 2.0"));
}

#[test]
fn test_list_status_filter() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_library(tmp.path());

    let out = run_pb_ok(tmp.path(), &["list", "--status", "in_progress"]);
    assert!(out.contains("api-cleanup.md"));
    assert!(!out.contains("release.md"));
}

#[test]
fn test_list_json_with_view() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_library(tmp.path());

    let out = run_pb_ok(tmp.path(), &["list", "--view", "preset-in-progress", "--json"]);
    let parsed = json(&out);
    assert_eq!(parsed["total"], 1);
    assert_eq!(parsed["plans"][0]["filename"], "api-cleanup.md");
}

#[test]
fn test_show_plan() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_library(tmp.path());

    let out = run_pb_ok(tmp.path(), &["show", "api-cleanup.md"]);
    assert!(out.contains("API cleanup (api-cleanup.md)"));
    assert!(out.contains("status: in_progress"));
    assert!(out.contains("tags: backend, api"));

    let body = run_pb_ok(tmp.path(), &["show", "api-cleanup.md", "--body"]);
    assert!(body.starts_with("# API cleanup"));
}

#[test]
fn test_show_missing_plan_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_library(tmp.path());

    let (_, stderr, success) = run_pb(tmp.path(), &["show", "nope.md"]);
    assert!(!success);
    assert!(stderr.contains("error: Plan not found: nope.md"));
}

#[test]
fn test_search_json() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_library(tmp.path());

    let out = run_pb_ok(tmp.path(), &["search", "sessions", "--json"]);
    let parsed = json(&out);
    assert_eq!(parsed["total"], 1);
    assert_eq!(parsed["results"][0]["filename"], "auth-migration.md");
}

#[test]
fn test_deps_for_plan() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_library(tmp.path());

    let out = run_pb_ok(tmp.path(), &["deps", "api-cleanup.md", "--json"]);
    let parsed = json(&out);
    assert_eq!(parsed["references"][0], "auth-migration.md");
    assert_eq!(parsed["referencedBy"][0], "release.md");
}

#[test]
fn test_check_reports_dangling_blocker() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_library(tmp.path());
    fs::write(
        tmp.path().join("broken.md"),
        "---\nstatus: todo\nblockedBy: [ghost]\n---\n# Broken\n",
    )
    .unwrap();

    let out = run_pb_ok(tmp.path(), &["check"]);
    assert!(out.contains("broken.md is blocked by missing plan"));
    assert!(out.contains("✗ plans have errors"));
}

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

#[test]
fn test_create_from_stdin() {
    let tmp = tempfile::TempDir::new().unwrap();

    let out = run_pb_stdin(tmp.path(), &["create", "--name", "fresh.md"], "# Fresh plan\n");
    assert_eq!(out.trim(), "fresh.md");
    assert_eq!(
        fs::read_to_string(tmp.path().join("fresh.md")).unwrap(),
        "# Fresh plan\n"
    );
}

#[test]
fn test_create_generates_name() {
    let tmp = tempfile::TempDir::new().unwrap();

    let out = run_pb_stdin(tmp.path(), &["create"], "# Nameless\n");
    let name = out.trim();
    assert!(name.ends_with(".md"));
    assert_eq!(name.trim_end_matches(".md").split('-').count(), 3);
    assert!(tmp.path().join(name).is_file());
}

#[test]
fn test_status_transition() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_library(tmp.path());

    let out = run_pb_ok(tmp.path(), &["status", "api-cleanup.md"]);
    assert!(out.contains("review"));

    run_pb_ok(tmp.path(), &["status", "api-cleanup.md", "review"]);
    let content = fs::read_to_string(tmp.path().join("api-cleanup.md")).unwrap();
    assert!(content.contains("status: review"));
    assert!(content.contains("# API cleanup"));
}

#[test]
fn test_set_field_and_subtasks() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_library(tmp.path());

    run_pb_ok(tmp.path(), &["set", "release.md", "estimate", "3d"]);
    let out = run_pb_ok(tmp.path(), &["subtask", "release.md", "add", "Write notes", "--json"]);
    let id = json(&out)["subtask"]["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("st-"));

    run_pb_ok(tmp.path(), &["subtask", "release.md", "toggle", &id]);
    let list = run_pb_ok(tmp.path(), &["subtask", "release.md"]);
    assert!(list.contains(&format!("[x] {} Write notes", id)));

    let content = fs::read_to_string(tmp.path().join("release.md")).unwrap();
    assert!(content.contains(r#"estimate: "3d""#));
}

#[test]
fn test_delete_archives_then_restore() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_library(tmp.path());
    let original = fs::read_to_string(tmp.path().join("release.md")).unwrap();

    let out = run_pb_ok(tmp.path(), &["delete", "release.md"]);
    assert!(out.contains("archived release.md"));
    assert!(!tmp.path().join("release.md").exists());

    let listing = run_pb_ok(tmp.path(), &["archive"]);
    assert!(listing.contains("release.md"));

    run_pb_ok(tmp.path(), &["archive", "restore", "release.md"]);
    assert_eq!(
        fs::read_to_string(tmp.path().join("release.md")).unwrap(),
        original
    );
}

#[test]
fn test_permanent_delete_writes_recovery_log() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_library(tmp.path());

    run_pb_ok(tmp.path(), &["delete", "release.md", "--permanent"]);
    assert!(!tmp.path().join("release.md").exists());

    let out = run_pb_ok(tmp.path(), &["recovery"]);
    assert!(out.contains("release.md"));
    assert!(out.contains("Ship it."));
}

#[test]
fn test_bulk_status_reports_failures() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_library(tmp.path());

    let (stdout, stderr, success) = run_pb(
        tmp.path(),
        &["bulk", "status", "review", "api-cleanup.md", "missing.md"],
    );
    assert!(!success);
    assert!(stdout.contains("ok    api-cleanup.md"));
    assert!(stdout.contains("fail  missing.md"));
    assert!(stderr.contains("1 of 2 failed"));
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

#[test]
fn test_notifications_overdue() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_library(tmp.path());

    let out = run_pb_ok(tmp.path(), &["notifications", "--json"]);
    let parsed = json(&out);
    assert_eq!(parsed["notifications"][0]["type"], "overdue");
    assert_eq!(parsed["notifications"][0]["planFilename"], "api-cleanup.md");

    run_pb_ok(tmp.path(), &["notifications", "read-all"]);
    let parsed = json(&run_pb_ok(tmp.path(), &["notifications", "--json"]));
    assert_eq!(parsed["unreadCount"], 0);
}

#[test]
fn test_views_create_and_delete() {
    let tmp = tempfile::TempDir::new().unwrap();

    let id = run_pb_ok(tmp.path(), &["views", "create", "Backend", "--tag", "backend"]);
    let id = id.trim();
    let out = run_pb_ok(tmp.path(), &["views"]);
    assert!(out.contains("Backend (custom) [tag=backend]"));

    run_pb_ok(tmp.path(), &["views", "delete", id]);
    let (_, stderr, success) = run_pb(tmp.path(), &["views", "delete", "preset-todo"]);
    assert!(!success);
    assert!(stderr.contains("preset views cannot be changed"));
}

#[test]
fn test_settings_disable_frontmatter() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_library(tmp.path());

    run_pb_ok(tmp.path(), &["settings", "set", "--frontmatter", "false"]);
    let out = run_pb_ok(tmp.path(), &["show", "api-cleanup.md", "--json"]);
    assert!(json(&out).get("frontmatter").is_none());
}

#[test]
fn test_config_set_and_show() {
    let tmp = tempfile::TempDir::new().unwrap();

    run_pb_ok(tmp.path(), &["config", "set", "server.port", "4100"]);
    let text = fs::read_to_string(tmp.path().join("planbook.toml")).unwrap();
    assert!(text.contains("port = 4100"));

    let out = run_pb_ok(tmp.path(), &["config", "--json"]);
    assert_eq!(json(&out)["port"], 4100);

    let (_, _, success) = run_pb(tmp.path(), &["config", "set", "server.port", "lots"]);
    assert!(!success);
}

#[test]
fn test_rpc_channel() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_library(tmp.path());

    let out = run_pb_ok(tmp.path(), &["rpc", "plans:get", r#"{"filename":"release.md"}"#]);
    assert_eq!(json(&out)["title"], "Release 2.0");

    let (stdout, _, success) = run_pb(tmp.path(), &["rpc", "plans:explode"]);
    assert!(!success);
    assert_eq!(json(&stdout)["error"], "unknown_channel");
}

#[test]
fn test_migrate_rewrites_legacy_status() {
    let tmp = tempfile::TempDir::new().unwrap();
    fs::write(
        tmp.path().join("old.md"),
        "---\nstatus: done\n---\n# Old plan\n",
    )
    .unwrap();

    let out = run_pb_ok(tmp.path(), &["migrate"]);
    assert!(out.contains("migrated old.md"));
    let content = fs::read_to_string(tmp.path().join("old.md")).unwrap();
    assert!(content.contains("status: completed"));
    assert!(content.ends_with("# Old plan\n"));

    let out = run_pb_ok(tmp.path(), &["migrate"]);
    assert!(out.contains("nothing to migrate"));
}

// ---------------------------------------------------------------------------
// Import, export and backups
// ---------------------------------------------------------------------------

#[test]
fn test_export_csv_by_tag() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_library(tmp.path());

    let out = run_pb_ok(tmp.path(), &["export", "--format", "csv", "--tag", "api"]);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "filename,title,status,dueDate,estimate,created,modified");
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("api-cleanup.md,API cleanup,in_progress,2020-01-01"));

    let exported = json(&run_pb_ok(tmp.path(), &["export", "--status", "todo"]));
    assert_eq!(exported["planCount"], 2);

    let (_, stderr, success) = run_pb(tmp.path(), &["export", "--format", "tar"]);
    assert!(!success);
    assert!(stderr.contains("--output"));
}

#[test]
fn test_import_then_backup_and_restore() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_library(tmp.path());
    let incoming = tempfile::TempDir::new().unwrap();
    let new_plan = incoming.path().join("new-plan.md");
    fs::write(&new_plan, "# New plan\n").unwrap();
    let clash = incoming.path().join("release.md");
    fs::write(&clash, "# Someone else's release\n").unwrap();

    let result = json(&run_pb_ok(
        tmp.path(),
        &["--json", "import", new_plan.to_str().unwrap(), clash.to_str().unwrap()],
    ));
    assert_eq!(result["imported"], 1);
    assert_eq!(result["skipped"], 1);
    assert!(fs::read_to_string(tmp.path().join("release.md")).unwrap().contains("Release 2.0"));

    let backup = json(&run_pb_ok(tmp.path(), &["--json", "backup", "create"]));
    assert_eq!(backup["planCount"], 4);
    let listed = json(&run_pb_ok(tmp.path(), &["--json", "backup"]));
    assert_eq!(listed[0]["id"], backup["id"]);

    fs::remove_file(tmp.path().join("new-plan.md")).unwrap();
    let out = run_pb_ok(tmp.path(), &["backup", "restore", backup["id"].as_str().unwrap()]);
    assert!(out.contains("imported 1, skipped 3 existing"));
    assert_eq!(fs::read_to_string(tmp.path().join("new-plan.md")).unwrap(), "# New plan\n");
}

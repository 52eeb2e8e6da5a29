use planbook::parse::frontmatter::{migrate, needs_migration};
use planbook::parse::{compose, parse_document};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;

fn fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Could not read fixture {}: {}", name, e))
}

/// Parse a fixture, compose it again, and assert byte-for-byte equality
fn assert_plan_round_trip(name: &str) {
    let source = fixture(name);
    let doc = parse_document(&source);
    let output = match &doc.frontmatter {
        Some(fm) => compose(fm, doc.body),
        None => doc.body.to_string(),
    };
    assert_eq!(output, source, "Round-trip failed for fixture: {}", name);
}

#[test]
fn round_trip_canonical_plan() {
    assert_plan_round_trip("canonical.md");
}

#[test]
fn round_trip_plan_without_frontmatter() {
    assert_plan_round_trip("no_frontmatter.md");
}

#[test]
fn canonical_plan_fields() {
    let source = fixture("canonical.md");
    let doc = parse_document(&source);
    let fm = doc.frontmatter.unwrap();
    assert_eq!(fm.tags, vec!["backend", "api"]);
    assert_eq!(fm.blocked_by, vec!["auth-migration.md"]);
    assert_eq!(fm.subtasks.len(), 2);
    assert_eq!(fm.subtasks[1].title, "Write \"quoted\" notes");
    assert!(doc.body.starts_with("# API cleanup\n"));
}

#[test]
fn legacy_plan_migrates_to_canonical_form() {
    let source = fixture("legacy.md");
    let doc = parse_document(&source);
    let fm = doc.frontmatter.unwrap();
    assert!(needs_migration(Some(&fm)));

    let migrated = compose(&migrate(fm), doc.body);
    assert_eq!(
        migrated,
        "---\nstatus: completed\npriority: high\ntags:\n  - \"solo\"\nschemaVersion: 1\n---\n# Legacy plan\n\nWritten before schemaVersion existed.\n"
    );

    // A second pass is a no-op
    let again = parse_document(&migrated);
    assert!(!needs_migration(again.frontmatter.as_ref()));
    assert_eq!(compose(again.frontmatter.as_ref().unwrap(), again.body), migrated);
}

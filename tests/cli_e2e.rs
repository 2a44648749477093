//! End-to-end CLI tests for statusdex.
//!
//! These tests run the actual statusdex binary and verify:
//! - Command-line interface behavior
//! - JSON output shape and content
//! - Error messages and hints
//!
//! # Test Organization
//!
//! - `test_import_*` / `test_index_*` - Data loading
//! - `test_search_*` - Search command tests
//! - `test_timeline_*` - Filter evaluation tests
//! - `test_cli_*` - General CLI tests (flags, help, version, config)
//!
//! Every command runs against a fresh temp directory with its own config
//! home, so a developer's real configuration never leaks in.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

/// Log a test event with timestamp
macro_rules! test_log {
    ($($arg:tt)*) => {
        let timestamp = chrono::Utc::now().format("%H:%M:%S%.3f");
        eprintln!("[TEST {}] {}", timestamp, format!($($arg)*));
    };
}

const SAMPLE_EXPORT: &str = r#"{
    "posts": [
        {"id": 1, "account_id": 10, "text": "Running late for the concert", "created_at": "2025-01-08T12:00:00Z"},
        {"id": 2, "account_id": 11, "text": "<p>京都で紅葉を見ました</p>", "local": false, "created_at": "2025-01-09T08:00:00Z"},
        {"id": 3, "account_id": 12, "text": "Season finale tonight", "created_at": "2025-01-09T09:00:00Z"},
        {"id": 4, "account_id": 20, "reblog_of_id": 3, "created_at": "2025-01-09T10:00:00Z"}
    ],
    "mentions": [{"post_id": 1, "account_id": 20}],
    "favourites": [{"post_id": 2, "account_id": 20}],
    "filters": [
        {"id": 1, "account_id": 20, "phrase": "finale", "whole_word": true, "context": ["home"]},
        {"id": 2, "account_id": 20, "phrase": "紅葉", "context": ["home"], "irreversible": true}
    ]
}"#;

/// A temp workspace with its own database, index and config home.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn db(&self) -> PathBuf {
        self.path().join("statusdex.db")
    }

    fn index(&self) -> PathBuf {
        self.path().join("index")
    }

    fn write_export(&self, content: &str) -> PathBuf {
        let path = self.path().join("export.json");
        fs::write(&path, content).expect("Failed to write export");
        path
    }

    /// The statusdex command pointed at this workspace.
    fn cmd(&self) -> Command {
        let config_home = self.path().join("config");
        let mut cmd = cargo_bin_cmd!("statusdex");
        cmd.env("HOME", self.path())
            .env("XDG_CONFIG_HOME", &config_home)
            .env("NO_COLOR", "1")
            .env_remove("STATUSDEX_DB")
            .env_remove("STATUSDEX_INDEX")
            .env_remove("STATUSDEX_LIMIT")
            .env_remove("STATUSDEX_FORMAT")
            .env_remove("STATUSDEX_QUIET")
            .arg("--db")
            .arg(self.db())
            .arg("--index")
            .arg(self.index());
        cmd
    }

    /// Import the sample export and build the index.
    fn seeded() -> Self {
        let ws = Self::new();
        let export = ws.write_export(SAMPLE_EXPORT);
        ws.cmd().arg("import").arg(&export).assert().success();
        ws.cmd().args(["index", "--batch-size", "2"]).assert().success();
        ws
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self
            .cmd()
            .args(["--format", "json"])
            .args(args)
            .output()
            .expect("Failed to run statusdex");
        assert!(
            output.status.success(),
            "statusdex {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
    }
}

fn ids(value: &Value) -> Vec<i64> {
    let mut ids: Vec<i64> = value
        .as_array()
        .expect("expected a JSON array")
        .iter()
        .filter_map(|item| item["id"].as_i64())
        .collect();
    ids.sort_unstable();
    ids
}

// =============================================================================
// Import and Index Tests
// =============================================================================

#[test]
fn test_import_reports_counts() {
    test_log!("Starting test_import_reports_counts");
    let start = Instant::now();

    let ws = Workspace::new();
    let export = ws.write_export(SAMPLE_EXPORT);
    let stats = ws.json(&["import", export.to_str().unwrap()]);

    assert_eq!(stats["posts"], 4);
    assert_eq!(stats["mentions"], 1);
    assert_eq!(stats["favourites"], 1);
    assert_eq!(stats["filters"], 2);
    assert!(ws.db().exists());

    test_log!("Completed in {:?}", start.elapsed());
}

#[test]
fn test_import_missing_file_fails() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("import")
        .arg(ws.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_import_internal_failure_exits_one() {
    let ws = Workspace::new();
    let export = ws.write_export(SAMPLE_EXPORT);
    // A directory where the database file should be cannot be opened.
    fs::create_dir_all(ws.db()).expect("Failed to create directory");
    ws.cmd().arg("import").arg(&export).assert().code(1);
}

#[test]
fn test_import_malformed_export_fails() {
    let ws = Workspace::new();
    let export = ws.write_export("{\"posts\": [ {\"id\": \"oops\"} ]}");
    ws.cmd()
        .arg("import")
        .arg(&export)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse"));
}

#[test]
fn test_index_without_import_hints_at_import() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("index")
        .assert()
        .failure()
        .stderr(predicate::str::contains("statusdex import"));
}

#[test]
fn test_index_reports_documents() {
    let ws = Workspace::new();
    let export = ws.write_export(SAMPLE_EXPORT);
    ws.cmd().arg("import").arg(&export).assert().success();

    let report = ws.json(&["index", "--batch-size", "2", "--jobs", "2"]);
    assert_eq!(report["posts_seen"], 4);
    assert_eq!(report["documents"], 3);
    assert_eq!(report["reblogs_skipped"], 1);
    assert!(ws.index().join("meta.json").exists());
}

// =============================================================================
// Search Tests
// =============================================================================

#[test]
fn test_search_respects_visibility() {
    test_log!("Starting test_search_respects_visibility");
    let ws = Workspace::seeded();

    assert_eq!(ids(&ws.json(&["search", "concert", "--viewer", "20"])), vec![1]);
    assert_eq!(ids(&ws.json(&["search", "紅葉", "--viewer", "20"])), vec![2]);
    assert_eq!(ids(&ws.json(&["search", "finale", "--viewer", "20"])), vec![3]);
    assert!(ids(&ws.json(&["search", "concert", "--viewer", "99"])).is_empty());
    assert_eq!(ids(&ws.json(&["search", "concert", "--viewer", "10"])), vec![1]);
}

#[test]
fn test_search_stems_inflections() {
    let ws = Workspace::seeded();
    assert_eq!(ids(&ws.json(&["search", "runs", "--viewer", "20"])), vec![1]);
}

#[test]
fn test_search_text_output() {
    let ws = Workspace::seeded();
    ws.cmd()
        .args(["search", "concert", "--viewer", "20"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Running late for the concert"));

    ws.cmd()
        .args(["search", "concert", "--viewer", "99"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No results found."));
}

#[test]
fn test_search_without_index_suggests_indexing() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["search", "anything", "--viewer", "1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Search index not found"))
        .stderr(predicate::str::contains("statusdex index --force"));
}

#[test]
fn test_search_punctuation_only_is_rejected() {
    let ws = Workspace::seeded();
    ws.cmd()
        .args(["search", "!!", "--viewer", "20"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid search query"));
}

// =============================================================================
// Timeline Tests
// =============================================================================

#[test]
fn test_timeline_hides_and_drops() {
    let ws = Workspace::seeded();
    let rows = ws.json(&["timeline", "--viewer", "20", "--context", "home"]);
    let rows = rows.as_array().expect("expected a JSON array");

    let summary: Vec<(i64, bool)> = rows
        .iter()
        .map(|row| (row["id"].as_i64().unwrap(), row["hidden"].as_bool().unwrap()))
        .collect();
    // 2 is dropped by the irreversible rule; 4 boosts 3 and inherits its verdict.
    assert_eq!(summary, vec![(4, true), (3, true), (1, false)]);
}

#[test]
fn test_timeline_show_dropped() {
    let ws = Workspace::seeded();
    let rows = ws.json(&[
        "timeline",
        "--viewer",
        "20",
        "--context",
        "list:5",
        "--show-dropped",
        "2",
        "1",
    ]);
    let rows = rows.as_array().expect("expected a JSON array");

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], 2);
    assert_eq!(rows[0]["dropped"], true);
    assert_eq!(rows[1]["id"], 1);
    assert_eq!(rows[1]["dropped"], false);
}

#[test]
fn test_timeline_public_context_ignores_home_rules() {
    let ws = Workspace::seeded();
    let rows = ws.json(&["timeline", "--viewer", "20", "--context", "public"]);
    let rows = rows.as_array().expect("expected a JSON array");
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|row| row["hidden"] == false));
}

// =============================================================================
// Stats and Normalize Tests
// =============================================================================

#[test]
fn test_stats_json() {
    let ws = Workspace::seeded();
    let stats = ws.json(&["stats"]);
    assert_eq!(stats["posts"], 4);
    assert_eq!(stats["reblogs"], 1);
    assert_eq!(stats["indexed_documents"], 3);
}

#[test]
fn test_normalize_folds_width() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["normalize", "ＡＢＣ１２３"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ABC123"));
}

// =============================================================================
// General CLI Tests
// =============================================================================

#[test]
fn test_cli_help() {
    cargo_bin_cmd!("statusdex")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("timeline"));
}

#[test]
fn test_cli_version() {
    cargo_bin_cmd!("statusdex")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_unknown_config_key_suggests_match() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["config", "--set", "search.default_limt=5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown config key"))
        .stderr(predicate::str::contains("search.default_limit"));
}

#[test]
fn test_cli_config_set_persists() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["config", "--set", "search.default_limit=7"])
        .assert()
        .success();

    let config = ws.json(&["config"]);
    assert_eq!(config["search"]["default_limit"], 7);
}

#[test]
fn test_cli_completions() {
    cargo_bin_cmd!("statusdex")
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("statusdex"));
}

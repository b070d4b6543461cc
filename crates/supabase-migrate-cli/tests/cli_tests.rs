//! CLI integration tests for supabase-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for the failures that happen before any connection.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

const ENV_VARS: &[&str] = &[
    "SOURCE_DATABASE_URL",
    "DATABASE_URL",
    "SUPABASE_DB_URL",
    "SUPABASE_URL",
    "NEXT_PUBLIC_SUPABASE_URL",
    "SUPABASE_SERVICE_ROLE_KEY",
];

/// Get a command for the supabase-migrate binary.
///
/// Runs in an empty directory so no stray `.env` file is picked up.
fn cmd(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("supabase-migrate").unwrap();
    cmd.current_dir(dir.path());
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// A command with every required variable set to an unreachable target.
fn configured_cmd(dir: &tempfile::TempDir) -> Command {
    let mut c = cmd(dir);
    c.env("SOURCE_DATABASE_URL", "postgres://legacy@127.0.0.1:1/app")
        .env("SUPABASE_DB_URL", "postgres://postgres@127.0.0.1:1/postgres")
        .env("SUPABASE_URL", "https://example.supabase.co")
        .env("SUPABASE_SERVICE_ROLE_KEY", "service-role-key");
    c
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_lists_all_flags() {
    let dir = tempfile::tempdir().unwrap();
    cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--tables"))
        .stdout(predicate::str::contains("--limit"))
        .stdout(predicate::str::contains("--batch-size"))
        .stdout(predicate::str::contains("--log-file"))
        .stdout(predicate::str::contains("--manifest"))
        .stdout(predicate::str::contains("--credentials-file"));
}

#[test]
fn test_batch_size_default() {
    let dir = tempfile::tempdir().unwrap();
    cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: 500]"));
}

#[test]
fn test_version_flag() {
    let dir = tempfile::tempdir().unwrap();
    cmd(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("supabase-migrate"));
}

// =============================================================================
// Argument Validation Tests
// =============================================================================

#[test]
fn test_non_numeric_limit_rejected() {
    let dir = tempfile::tempdir().unwrap();
    cmd(&dir)
        .arg("--limit=lots")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--limit"));
}

#[test]
fn test_unknown_flag_rejected() {
    let dir = tempfile::tempdir().unwrap();
    cmd(&dir)
        .arg("--workers=4")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--workers"));
}

// =============================================================================
// Configuration Error Tests
// =============================================================================

#[test]
fn test_missing_env_names_every_variable() {
    let dir = tempfile::tempdir().unwrap();
    cmd(&dir)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("SOURCE_DATABASE_URL"))
        .stderr(predicate::str::contains("DATABASE_URL"))
        .stderr(predicate::str::contains("SUPABASE_DB_URL"))
        .stderr(predicate::str::contains("SUPABASE_URL"))
        .stderr(predicate::str::contains("SUPABASE_SERVICE_ROLE_KEY"));
}

#[test]
fn test_partial_env_names_only_missing_variables() {
    let dir = tempfile::tempdir().unwrap();
    cmd(&dir)
        .env("DATABASE_URL", "postgres://legacy@localhost/app")
        .env("SUPABASE_DB_URL", "postgres://postgres@localhost/postgres")
        .env("NEXT_PUBLIC_SUPABASE_URL", "https://example.supabase.co")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("SUPABASE_SERVICE_ROLE_KEY"))
        .stderr(predicate::str::contains("SUPABASE_DB_URL").not());
}

#[test]
fn test_env_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let mut env = std::fs::File::create(dir.path().join(".env")).unwrap();
    writeln!(env, "SOURCE_DATABASE_URL=postgres://legacy@localhost/app").unwrap();
    writeln!(env, "SUPABASE_DB_URL=postgres://postgres@localhost/postgres").unwrap();
    writeln!(env, "SUPABASE_URL=https://example.supabase.co").unwrap();

    cmd(&dir)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("SUPABASE_SERVICE_ROLE_KEY"))
        .stderr(predicate::str::contains("SUPABASE_DB_URL").not());
}

#[test]
fn test_unknown_table_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    configured_cmd(&dir)
        .arg("--tables=monitors,widgets")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("widgets"));
}

#[test]
fn test_zero_batch_size_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    configured_cmd(&dir)
        .arg("--batch-size=0")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("batch"));
}

#[test]
fn test_invalid_manifest_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("columns.yaml");
    std::fs::write(&manifest, "tables:\n  users: [id, email]\n").unwrap();

    configured_cmd(&dir)
        .arg("--manifest")
        .arg(&manifest)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("users"));
}

#[test]
fn test_missing_manifest_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    configured_cmd(&dir)
        .arg("--manifest=does-not-exist.yaml")
        .assert()
        .code(7);
}

// =============================================================================
// Connectivity Tests
// =============================================================================

#[test]
fn test_unreachable_source_is_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    configured_cmd(&dir)
        .args(["--dry-run", "--verbosity=error"])
        .timeout(std::time::Duration::from_secs(60))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("source"));
}

#[test]
fn test_fatal_error_is_written_to_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("migration.log");
    configured_cmd(&dir)
        .arg("--dry-run")
        .arg("--log-file")
        .arg(&log)
        .timeout(std::time::Duration::from_secs(60))
        .assert()
        .code(2);

    let content = std::fs::read_to_string(&log).unwrap();
    let line = content
        .lines()
        .find(|l| l.contains("[ERROR]"))
        .unwrap_or_else(|| panic!("no error line in {}", content));
    assert!(line.contains("Migration failed: Pool error"), "{}", content);
    assert!(content.contains("source"), "{}", content);
}

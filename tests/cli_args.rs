//! Integration tests for CLI argument handling
//!
//! These only exercise paths that fail or exit before any network access.

use std::process::Command;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    Command::new(env!("CARGO_BIN_EXE_roadwatch"))
        .args(args)
        .current_dir(dir.path())
        .env("ROADWATCH_CACHE_DIR", dir.path().join("cache"))
        .env("ROADWATCH_REFRESH_ENABLED", "false")
        .env_remove("TOMTOM_API_KEY")
        .output()
        .expect("Failed to execute roadwatch")
}

#[test]
fn test_help_lists_subcommands() {
    let output = run_cli(&["--help"]);
    assert!(output.status.success(), "Expected --help to exit successfully");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("roadwatch"), "Help should mention roadwatch");
    for command in ["search", "nearby", "route", "refresh", "daemon"] {
        assert!(stdout.contains(command), "Help should list {}", command);
    }
}

#[test]
fn test_nearby_with_invalid_latitude_fails() {
    let output = run_cli(&["nearby", "--lat", "200", "--lon", "0"]);
    assert!(!output.status.success(), "Expected invalid latitude to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Invalid coordinates"),
        "Should report the bad coordinates: {}",
        stderr
    );
}

#[test]
fn test_nearby_with_zero_radius_fails() {
    let output = run_cli(&["nearby", "--lat", "49.28", "--lon", "-123.12", "--radius-km", "0"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid radius"), "Unexpected stderr: {}", stderr);
}

#[test]
fn test_route_with_malformed_point_fails() {
    let output = run_cli(&["route", "49.28", "49.29,-123.1"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid point"), "Unexpected stderr: {}", stderr);
}

#[test]
fn test_cache_clear_on_empty_cache_succeeds() {
    let output = run_cli(&["cache", "clear-expired"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"removed\": 0"), "Unexpected stdout: {}", stdout);
}

#[test]
fn test_missing_config_file_fails() {
    let output = run_cli(&["--config", "does-not-exist.toml", "tiles"]);
    assert!(!output.status.success());
}

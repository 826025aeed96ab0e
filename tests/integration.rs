use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn rankt_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rankt");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/rank.sqlite"

[provider]
timeout_secs = 5

[tracking]
max_depth = 100
default_user = "tester"

[server]
bind = "127.0.0.1:7411"
"#,
        root.display()
    );

    let config_path = config_dir.join("ranktrack.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_rankt(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = rankt_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        // Commands that need the provider must fail deterministically.
        .env_remove("SERPAPI_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rankt binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_rankt(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/rank.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_rankt(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_rankt(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_history_on_empty_database() {
    let (_tmp, config_path) = setup_test_env();

    run_rankt(&config_path, &["init"]);
    let (stdout, stderr, success) = run_rankt(
        &config_path,
        &["history", "--domain", "joes-pizza.com"],
    );
    assert!(
        success,
        "history failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("No snapshots"));
}

#[test]
fn test_history_rejects_invalid_domain() {
    let (_tmp, config_path) = setup_test_env();

    run_rankt(&config_path, &["init"]);
    let (_, stderr, success) = run_rankt(&config_path, &["history", "--domain", "http://"]);
    assert!(!success);
    assert!(stderr.contains("invalid domain"));
}

#[test]
fn test_track_without_api_key_fails_fast() {
    let (_tmp, config_path) = setup_test_env();

    run_rankt(&config_path, &["init"]);
    let (_, stderr, success) = run_rankt(
        &config_path,
        &["track", "pizza nyc", "--domain", "joes-pizza.com"],
    );
    assert!(!success, "track must fail without an API key");
    assert!(
        stderr.contains("not configured"),
        "expected a configuration error, got: {}",
        stderr
    );
}

#[test]
fn test_refresh_without_api_key_fails_fast() {
    let (_tmp, config_path) = setup_test_env();

    run_rankt(&config_path, &["init"]);
    let (_, stderr, success) = run_rankt(&config_path, &["refresh"]);
    assert!(!success);
    assert!(stderr.contains("not configured"));
}

#[test]
fn test_unknown_device_is_rejected() {
    let (_tmp, config_path) = setup_test_env();

    run_rankt(&config_path, &["init"]);
    let (_, stderr, success) = run_rankt(
        &config_path,
        &[
            "track",
            "pizza",
            "--domain",
            "joes-pizza.com",
            "--device",
            "tablet",
        ],
    );
    assert!(!success);
    assert!(stderr.contains("tablet"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _) = setup_test_env();
    let bad_config = tmp.path().join("config/bad.toml");
    fs::write(
        &bad_config,
        "[db]\npath = \"/tmp/x.sqlite\"\n\n[tracking]\nmax_depth = 0\n",
    )
    .unwrap();

    let (_, stderr, success) = run_rankt(&bad_config, &["init"]);
    assert!(!success);
    assert!(stderr.contains("max_depth"));
}

#[test]
fn test_missing_config_is_an_error() {
    let (tmp, _) = setup_test_env();
    let missing = tmp.path().join("config/nope.toml");

    let (_, stderr, success) = run_rankt(&missing, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

// ABOUTME: Tests for the rdbsync binary itself
// ABOUTME: Checks flag parsing, exit codes and the cursor file a real run leaves behind

mod common;

use common::{result, FakeResultsDb};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn rdbsync() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_rdbsync"));
    cmd.env_remove("RDBSYNC_CENTOS_URL")
        .env_remove("RDBSYNC_FEDORA_URL")
        .env_remove("RDBSYNC_FEDORA_TOKEN");
    cmd
}

async fn run(args: Vec<String>) -> Output {
    tokio::task::spawn_blocking(move || rdbsync().args(&args).output().unwrap())
        .await
        .unwrap()
}

fn args(centos: &str, fedora: &str, cursor: &Path, extra: &[&str]) -> Vec<String> {
    let mut args = vec![
        "--centos-url".to_string(),
        centos.to_string(),
        "--fedora-url".to_string(),
        fedora.to_string(),
        "--cursor-file".to_string(),
        cursor.display().to_string(),
        "--fedora-token".to_string(),
        "token".to_string(),
    ];
    args.extend(extra.iter().map(|s| s.to_string()));
    args
}

#[test]
fn test_help_lists_flags() {
    let output = rdbsync().arg("--help").output().unwrap();
    assert!(output.status.success());

    let help = String::from_utf8_lossy(&output.stdout);
    for flag in [
        "--centos-url",
        "--fedora-url",
        "--timeout",
        "--poll-interval",
        "--cursor-file",
        "--dry-run",
    ] {
        assert!(help.contains(flag), "missing {} in help", flag);
    }
}

#[test]
fn test_rejects_non_numeric_timeout() {
    let output = rdbsync().args(["--timeout", "soon"]).output().unwrap();
    assert!(!output.status.success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_one_shot_run_writes_cursor() {
    let centos = FakeResultsDb::with_results(vec![
        result(1, "m1", "PASSED", "2018-01-10T12:00:01.000000"),
        result(2, "m2", "FAILED", "2018-01-10T12:00:02.000000"),
    ]);
    let fedora = FakeResultsDb::new();
    let centos_api = centos.start().await;
    let fedora_api = fedora.start().await;
    let dir = tempdir().unwrap();
    let cursor = dir.path().join("cursor.json");

    let output = run(args(&centos_api, &fedora_api, &cursor, &[])).await;

    assert!(
        output.status.success(),
        "stdout: {}",
        String::from_utf8_lossy(&output.stdout)
    );
    assert_eq!(fedora.posted_msg_ids(), vec!["m1", "m2"]);
    assert_eq!(fedora.posts()[0]["_auth_token"], "token");
    let state: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&cursor).unwrap()).unwrap();
    assert_eq!(state["last_message_id"], "m2");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_one_shot_run_fails_on_rejected_result() {
    let centos = FakeResultsDb::with_results(vec![
        result(1, "m1", "PASSED", "2018-01-10T12:00:01.000000"),
        result(2, "m2", "PASSED", "2018-01-10T12:00:02.000000"),
    ]);
    let fedora = FakeResultsDb::new();
    fedora.reject("m2");
    let centos_api = centos.start().await;
    let fedora_api = fedora.start().await;
    let dir = tempdir().unwrap();
    let cursor = dir.path().join("cursor.json");

    let output = run(args(&centos_api, &fedora_api, &cursor, &[])).await;

    assert!(!output.status.success());
    let state: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&cursor).unwrap()).unwrap();
    assert_eq!(state["last_message_id"], "m1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dry_run_leaves_everything_untouched() {
    let centos =
        FakeResultsDb::with_results(vec![result(1, "m1", "PASSED", "2018-01-10T12:00:01.000000")]);
    let fedora = FakeResultsDb::new();
    let centos_api = centos.start().await;
    let fedora_api = fedora.start().await;
    let dir = tempdir().unwrap();
    let cursor = dir.path().join("cursor.json");

    let output = run(args(&centos_api, &fedora_api, &cursor, &["--dry-run"])).await;

    assert!(output.status.success());
    assert!(fedora.posts().is_empty());
    assert!(!cursor.exists());
}

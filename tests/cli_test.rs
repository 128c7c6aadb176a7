//! CLI smoke tests.
//!
//! Stdout is not a terminal under the test harness, so every command answers
//! in JSON.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct TestEnv {
    dir: TempDir,
}

impl TestEnv {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("bugbridge").unwrap();
        cmd.env("BUGBRIDGE_DB", self.dir.path().join("bugs.db"))
            .env("BUGBRIDGE_CONFIG", self.dir.path().join("config.json"))
            .env_remove("GITEA_TOKEN")
            .env_remove("RUST_LOG");
        cmd
    }

    fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.cmd().args(args).output().unwrap();
        assert!(
            output.status.success(),
            "{args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

#[test]
fn test_config_set_and_show_masks_tokens() {
    let env = TestEnv::new();
    env.json(&[
        "config", "set", "--owner", "acme", "--project", "widgets", "--login", "alice",
    ]);
    env.json(&["config", "add-token", "--login", "alice", "--token", "s3cret"]);

    let shown = env.json(&["config", "show"]);
    assert_eq!(shown["config"]["owner"], "acme");
    assert_eq!(shown["config"]["base_url"], "https://gitea.com/");
    assert_eq!(shown["config"]["credentials"][0]["login"], "alice");
    assert_eq!(shown["config"]["credentials"][0]["token"], "********");
}

#[test]
fn test_local_bug_lifecycle() {
    let env = TestEnv::new();
    let created = env.json(&["bug", "--author", "alice", "new", "Crash on start", "-m", "boom"]);
    let id = created["bug"].as_str().unwrap().to_string();

    env.json(&["bug", "--author", "bob", "comment", &id, "me too"]);
    env.json(&["bug", "--author", "alice", "label", &id, "--add", "bug,p1"]);
    env.json(&["bug", "--author", "alice", "close", &id]);

    let listed = env.json(&["bug", "list", "--status", "closed"]);
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["bugs"][0]["labels"], serde_json::json!(["bug", "p1"]));
    assert_eq!(listed["bugs"][0]["comments"], 1);

    let shown = env.json(&["bug", "show", &id[..8]]);
    assert_eq!(shown["title"], "Crash on start");
    assert_eq!(shown["status"], "closed");
    assert_eq!(shown["comments"][1]["message"], "me too");
}

#[test]
fn test_unknown_bug_exit_code() {
    let env = TestEnv::new();
    env.cmd()
        .args(["bug", "show", "bug_missing"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("BUG_NOT_FOUND"));
}

#[test]
fn test_import_without_token_fails() {
    let env = TestEnv::new();
    env.json(&[
        "config", "set", "--owner", "acme", "--project", "widgets", "--login", "alice",
    ]);

    env.cmd()
        .arg("import")
        .assert()
        .code(5)
        .stderr(predicate::str::contains("MISSING_CREDENTIAL"));
}

#[test]
fn test_export_without_target_is_config_error() {
    let env = TestEnv::new();
    env.cmd()
        .arg("export")
        .assert()
        .code(7)
        .stderr(predicate::str::contains("CONFIG_ERROR"));
}

#[test]
fn test_completions() {
    let env = TestEnv::new();
    env.cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bugbridge"));
}

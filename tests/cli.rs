use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("cli")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve").and(predicate::str::contains("client")));
}

#[test]
fn test_client_requires_user() {
    Command::cargo_bin("cli")
        .unwrap()
        .env_remove("KANBAN_USER_ID")
        .args(["client", "projects", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--user"));
}

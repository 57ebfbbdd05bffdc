/// CLI Integration Tests
/// Tests the command-line interface and the exit status of short sessions
use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("math_mcp").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Arithmetic and math-tutoring MCP server",
        ));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("math_mcp").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("math_mcp"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_serve_subcommand_help() {
    let mut cmd = Command::cargo_bin("math_mcp").unwrap();
    cmd.arg("serve")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Start the MCP server"))
        .stdout(predicate::str::contains("--verbose"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--log-format"));
}

#[test]
fn test_cli_no_subcommand_fails() {
    let mut cmd = Command::cargo_bin("math_mcp").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_cli_invalid_subcommand_fails() {
    let mut cmd = Command::cargo_bin("math_mcp").unwrap();
    cmd.arg("invalid")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_serve_answers_and_exits_cleanly_on_eof() {
    let mut cmd = Command::cargo_bin("math_mcp").unwrap();
    cmd.arg("serve")
        .write_stdin("{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"calculate\",\"params\":{\"a\":5,\"b\":3,\"op\":\"add\"}}\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"value\":8"))
        .stdout(predicate::str::contains("\"id\":1"));
}

#[test]
fn test_serve_exits_with_data_error_on_malformed_input() {
    let mut cmd = Command::cargo_bin("math_mcp").unwrap();
    cmd.arg("serve")
        .write_stdin("not json\n")
        .assert()
        .code(65);
}

#[test]
fn test_serve_reject_policy_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"malformed_input": "reject"}}"#).unwrap();

    let mut cmd = Command::cargo_bin("math_mcp").unwrap();
    cmd.arg("serve")
        .arg("--config")
        .arg(file.path())
        .write_stdin("not json\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("-32700"))
        .stdout(predicate::str::contains("\"id\":2"));
}

#[test]
fn test_serve_rejects_bad_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"logging": {{"level": "loud"}}}}"#).unwrap();

    let mut cmd = Command::cargo_bin("math_mcp").unwrap();
    cmd.arg("serve")
        .arg("--config")
        .arg(file.path())
        .assert()
        .code(70)
        .stderr(predicate::str::contains("unknown log level"));
}

#[test]
fn test_serve_logs_go_to_stderr() {
    let mut cmd = Command::cargo_bin("math_mcp").unwrap();
    cmd.arg("serve")
        .arg("--log-format")
        .arg("json")
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Starting MCP server"));
}

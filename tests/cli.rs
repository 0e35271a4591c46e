use assert_cmd::Command;
use predicates::prelude::*;

fn helper(env_file: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("ads-refresh-token").unwrap();
    cmd.env("ADS_TOKEN_ENV_FILE", env_file)
        // Unroutable, the flow must never get this far
        .env("OAUTH_TOKEN_URI", "http://127.0.0.1:9/token")
        .arg("--no-browser");
    cmd
}

#[test]
fn missing_client_id_exits_with_failure() {
    let dir = tempfile::tempdir().unwrap();
    let env_file = dir.path().join(".env");

    helper(&env_file)
        .write_stdin("\n")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("REFRESH TOKEN SETUP"))
        .stdout(predicate::str::contains("Starting OAuth flow").not())
        .stderr(predicate::str::contains("Client ID is required!"));

    assert!(!env_file.exists());
}

#[test]
fn missing_client_secret_exits_with_failure() {
    let dir = tempfile::tempdir().unwrap();
    let env_file = dir.path().join(".env");

    helper(&env_file)
        .write_stdin("some-client.apps.googleusercontent.com\n   \n")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Starting OAuth flow").not())
        .stderr(predicate::str::contains("Client Secret is required!"));

    assert!(!env_file.exists());
}

#[test]
fn closed_stdin_exits_with_failure() {
    let dir = tempfile::tempdir().unwrap();

    helper(&dir.path().join(".env"))
        .write_stdin("")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to read input"));
}

#[cfg(unix)]
#[test]
fn interrupt_at_prompt_exits_cleanly() {
    use std::io::{BufRead, BufReader};
    use std::process::{Command, Stdio};

    let dir = tempfile::tempdir().unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_ads-refresh-token"))
        .env("ADS_TOKEN_ENV_FILE", dir.path().join(".env"))
        .env("OAUTH_TOKEN_URI", "http://127.0.0.1:9/token")
        .arg("--no-browser")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    // Banner is printed after the handler is installed. Stdin is held open
    // (`wait` would close it) so the helper sits at the Client ID prompt.
    let stdin = child.stdin.take();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());
    let mut line = String::new();
    while !line.contains("REFRESH TOKEN SETUP") {
        line.clear();
        assert_ne!(stdout.read_line(&mut line).unwrap(), 0, "banner never shown");
    }

    let killed = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(killed.success());

    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(0));

    let mut rest = String::new();
    std::io::Read::read_to_string(&mut stdout, &mut rest).unwrap();
    assert!(rest.contains("Operation cancelled by user."));
    drop(stdin);
}

// CLI integration tests for koebashi

use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};

use tempfile::TempDir;

fn koebashi() -> Command {
    Command::new(env!("CARGO_BIN_EXE_koebashi"))
}

/// Test that --help flag shows help message with program description
#[test]
fn test_help_flag_shows_help_message() {
    let output = koebashi()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Help should exit with success");
    assert!(
        stdout.contains("koebashi"),
        "Help should contain program name. Got: {}",
        stdout
    );
    for flag in ["--config", "--port", "--response-timeout", "--backend"] {
        assert!(
            stdout.contains(flag),
            "Help should list {}. Got: {}",
            flag,
            stdout
        );
    }
}

#[test]
fn test_config_init_prints_default_template() {
    let output = koebashi()
        .args(["config", "init"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("[bridge]"), "Got: {}", stdout);
    assert!(stdout.contains("response_timeout_secs = 30"), "Got: {}", stdout);
}

#[test]
fn test_config_init_refuses_to_overwrite_without_force() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("koebashi.toml");
    std::fs::write(&path, "# keep me\n").unwrap();

    let output = koebashi()
        .args(["config", "init", "--output"])
        .arg(&path)
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "# keep me\n");

    let output = koebashi()
        .args(["config", "init", "--force", "--output"])
        .arg(&path)
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    assert!(std::fs::read_to_string(&path).unwrap().contains("[server]"));
}

/// An invalid configuration stops the server before it binds
#[test]
fn test_invalid_config_exits_with_failure() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("koebashi.toml");
    std::fs::write(&path, "[backend]\nkind = \"process\"\n").unwrap();

    let output = koebashi()
        .arg("--config")
        .arg(&path)
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("backend.cmd"), "Got: {}", stderr);
}

/// Flags are applied before validation, so they can repair the file
#[test]
fn test_cli_override_repairs_invalid_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("koebashi.toml");
    std::fs::write(&path, "[backend]\nkind = \"process\"\n").unwrap();

    let mut child = koebashi()
        .arg("--config")
        .arg(&path)
        .args(["--backend", "loopback", "--host", "127.0.0.1", "--port", "0"])
        .env("RUST_LOG", "info")
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to execute command");

    let stderr = child.stderr.take().expect("stderr is piped");
    let mut seen = Vec::new();
    let listening = BufReader::new(stderr).lines().map_while(Result::ok).any(|line| {
        seen.push(line.clone());
        line.contains("Listening on")
    });

    let exited = child.try_wait().expect("Failed to poll child");
    let _ = child.kill();
    let _ = child.wait();

    assert!(listening, "server never started. Got: {:?}", seen);
    assert!(exited.is_none(), "server exited early: {:?}", exited);
}

/// A port that is already taken fails startup cleanly
#[test]
fn test_bind_failure_exits_with_failure() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port().to_string();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("koebashi.toml");
    std::fs::write(&path, "").unwrap();

    let output = koebashi()
        .arg("--config")
        .arg(&path)
        .args(["--host", "127.0.0.1", "--port", &port])
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("failed to bind"), "Got: {}", stderr);
    assert!(
        stderr.contains("Event loop stopping"),
        "event loop should be shut down before exit. Got: {}",
        stderr
    );
}

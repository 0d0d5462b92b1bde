//! Integration tests for the `meshdock` CLI binary.
//!
//! Everything runs against temporary config/state files and loopback
//! sockets; the user's real configuration is never touched.
#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

use meshdock_core::storage::codec;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `meshdock` binary with env isolation.
fn meshdock_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("meshdock");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env("NO_COLOR", "1")
        .env_remove("MESHDOCK_CONFIG")
        .env_remove("MESHDOCK_STATE_FILE")
        .env_remove("MESHDOCK_OUTPUT")
        .env_remove("MESHDOCK_AUTH_KEY")
        .env_remove("MESHDOCK_CONTROL_URL")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn profile_json(id: &str, control_url: &str) -> String {
    format!(
        r#"{{"ControlURL": "{control_url}", "Hostname": "{id}-console",
            "Config": {{"NodeID": "n-{id}", "UserProfile": {{"ID": 1, "LoginName": "{id}@example.net"}}}}}}"#
    )
}

/// Write a state file the way the stack lays it out.
fn write_state(dir: &Path, current: Option<&str>) -> PathBuf {
    let mut entries = BTreeMap::new();
    entries.insert(
        "ipn-state-profile-abc".to_owned(),
        codec::encode(&profile_json("abc", "https://hs.example.net")),
    );
    entries.insert(
        "ipn-state-profile-def".to_owned(),
        codec::encode(&profile_json("def", "https://hs.other.net")),
    );
    entries.insert("ipn-state-profile-bad".to_owned(), "zz".to_owned());
    if let Some(name) = current {
        entries.insert(
            "ipn-state-_current-profile".to_owned(),
            codec::encode(name),
        );
    }
    let path = dir.join("state.json");
    std::fs::write(&path, serde_json::to_string_pretty(&entries).unwrap()).unwrap();
    path
}

const NETMAP: &str = r#"{
    "domain": "corp.example.net",
    "self": {"name": "console.corp.example.net.", "addresses": ["100.64.0.1"]},
    "peers": [
        {"id": "n1", "name": "db.corp.example.net.", "addresses": ["100.64.0.7"],
         "os": "linux", "user": "7", "online": true},
        {"id": "n2", "name": "self-service.corp.example.net.", "addresses": ["100.64.0.9"],
         "os": "linux", "user": "7", "online": true},
        {"id": "n3", "name": "laptop.corp.example.net.", "addresses": ["100.64.0.12"],
         "os": "macOS", "user": "7", "online": false}
    ],
    "users": {"7": {"ID": 7, "LoginName": "ops@example.net", "DisplayName": "Ops"}}
}"#;

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = TempDir::new().unwrap();
    let output = meshdock_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_commands() {
    let home = TempDir::new().unwrap();
    meshdock_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("profiles")
            .and(predicate::str::contains("netmap"))
            .and(predicate::str::contains("link"))
            .and(predicate::str::contains("pipe")),
    );
}

#[test]
fn test_completions_zsh() {
    let home = TempDir::new().unwrap();
    meshdock_cmd(home.path())
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Profiles ────────────────────────────────────────────────────────

#[test]
fn test_profiles_list_skips_malformed_entries() {
    let home = TempDir::new().unwrap();
    let state = write_state(home.path(), Some("profile-abc"));

    meshdock_cmd(home.path())
        .args(["profiles", "list", "-o", "plain", "--state"])
        .arg(&state)
        .assert()
        .success()
        .stdout("profile-abc\nprofile-def\n");
}

#[test]
fn test_profiles_table_marks_current() {
    let home = TempDir::new().unwrap();
    let state = write_state(home.path(), Some("profile-def"));

    meshdock_cmd(home.path())
        .args(["profiles", "list", "--state"])
        .arg(&state)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("def@example.net")
                .and(predicate::str::contains("https://hs.other.net"))
                .and(predicate::str::contains("*")),
        );
}

#[test]
fn test_profiles_use_then_current() {
    let home = TempDir::new().unwrap();
    let state = write_state(home.path(), Some("profile-abc"));

    meshdock_cmd(home.path())
        .args(["profiles", "use", "def", "--state"])
        .arg(&state)
        .assert()
        .success()
        .stdout(predicate::str::contains("profile-def"));

    meshdock_cmd(home.path())
        .args(["profiles", "current", "-o", "plain", "--state"])
        .arg(&state)
        .assert()
        .success()
        .stdout("profile-def\n");
}

#[test]
fn test_profiles_show_json() {
    let home = TempDir::new().unwrap();
    let state = write_state(home.path(), None);

    let output = meshdock_cmd(home.path())
        .args(["profiles", "show", "profile-abc", "-o", "json", "--state"])
        .arg(&state)
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["id"], "profile-abc");
    assert_eq!(value["ControlURL"], "https://hs.example.net");
}

#[test]
fn test_profiles_show_unknown_is_not_found() {
    let home = TempDir::new().unwrap();
    let state = write_state(home.path(), None);

    let output = meshdock_cmd(home.path())
        .args(["profiles", "show", "zzz", "--state"])
        .arg(&state)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("profiles list"));
}

#[test]
fn test_profiles_clear_removes_pointer() {
    let home = TempDir::new().unwrap();
    let state = write_state(home.path(), Some("profile-abc"));

    meshdock_cmd(home.path())
        .args(["profiles", "clear", "--state"])
        .arg(&state)
        .assert()
        .success()
        .stdout(predicate::str::contains("cleared"));

    let raw = std::fs::read_to_string(&state).unwrap();
    assert!(!raw.contains("_current-profile"));
    assert!(raw.contains("ipn-state-profile-abc"));

    meshdock_cmd(home.path())
        .args(["profiles", "current", "--state"])
        .arg(&state)
        .assert()
        .code(4);

    meshdock_cmd(home.path())
        .args(["profiles", "clear", "--state"])
        .arg(&state)
        .assert()
        .success()
        .stdout(predicate::str::contains("No current profile"));
}

#[test]
fn test_dangling_pointer_has_no_current_profile() {
    let home = TempDir::new().unwrap();
    let state = write_state(home.path(), Some("profile-gone"));

    meshdock_cmd(home.path())
        .args(["profiles", "current", "--state"])
        .arg(&state)
        .assert()
        .code(4);
}

// ── Netmap ──────────────────────────────────────────────────────────

#[test]
fn test_netmap_from_stdin() {
    let home = TempDir::new().unwrap();
    meshdock_cmd(home.path())
        .args(["netmap", "-", "-o", "plain"])
        .write_stdin(NETMAP)
        .assert()
        .success()
        .stdout("db\nself-service\nlaptop\n");

    meshdock_cmd(home.path())
        .args(["netmap", "-", "--online", "-o", "plain"])
        .write_stdin(NETMAP)
        .assert()
        .success()
        .stdout("db\nself-service\n");
}

#[test]
fn test_netmap_selfservice_peer() {
    let home = TempDir::new().unwrap();
    meshdock_cmd(home.path())
        .args(["netmap", "-", "--selfservice", "-o", "plain"])
        .write_stdin(NETMAP)
        .assert()
        .success()
        .stdout("100.64.0.9\n");
}

#[test]
fn test_netmap_table_resolves_users() {
    let home = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("netmap.json");
    std::fs::write(&file, NETMAP).unwrap();

    meshdock_cmd(home.path())
        .arg("netmap")
        .arg(&file)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("ops@example.net")
                .and(predicate::str::contains("offline"))
                .and(predicate::str::contains("100.64.0.7")),
        );
}

#[test]
fn test_malformed_netmap_is_usage_error() {
    let home = TempDir::new().unwrap();
    let output = meshdock_cmd(home.path())
        .args(["netmap", "-"])
        .write_stdin("not valid json")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Invalid network map"));
}

// ── Links ───────────────────────────────────────────────────────────

#[test]
fn test_link_encode_then_decode() {
    let home = TempDir::new().unwrap();
    let output = meshdock_cmd(home.path())
        .args(["link", "encode", "rdp", "win-box"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let token = String::from_utf8(output.stdout).unwrap().trim().to_owned();
    assert!(!token.contains('='));

    meshdock_cmd(home.path())
        .args(["link", "decode", &token, "-o", "plain"])
        .assert()
        .success()
        .stdout("rdp://win-box:3389\n");
}

#[test]
fn test_link_rejects_unknown_protocol_and_garbage() {
    let home = TempDir::new().unwrap();
    meshdock_cmd(home.path())
        .args(["link", "encode", "telnet", "host"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown protocol"));

    meshdock_cmd(home.path())
        .args(["link", "decode", "!!not-a-token!!"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("link"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_init_show_and_conflict() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("meshdock.toml");

    meshdock_cmd(home.path())
        .args(["config", "init", "--control-url", "https://hs.example.net/", "--config"])
        .arg(&config)
        .assert()
        .success();

    meshdock_cmd(home.path())
        .args(["config", "show", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("control_url = \"https://hs.example.net/\"")
                .and(predicate::str::contains("[channels]")),
        );

    meshdock_cmd(home.path())
        .args(["config", "init", "--config"])
        .arg(&config)
        .assert()
        .code(6);
}

#[test]
fn test_config_show_masks_plaintext_key() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("meshdock.toml");
    std::fs::write(&config, "auth_key = \"tskey-secret\"\n").unwrap();

    meshdock_cmd(home.path())
        .args(["config", "show", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("****").and(predicate::str::contains("tskey-secret").not()),
        );
}

#[test]
fn test_config_init_rejects_bad_url() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("meshdock.toml");

    meshdock_cmd(home.path())
        .args(["config", "init", "--control-url", "not a url", "--config"])
        .arg(&config)
        .assert()
        .failure();
    assert!(!config.exists());
}

// ── Pipe ────────────────────────────────────────────────────────────

#[test]
fn test_pipe_round_trips_stdin_through_echo_server() {
    let home = TempDir::new().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = std::thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        let mut buf = [0u8; 10];
        socket.read_exact(&mut buf).unwrap();
        socket.write_all(&buf).unwrap();
    });

    meshdock_cmd(home.path())
        .args(["pipe", "127.0.0.1", &port.to_string(), "--proto", "vnc"])
        .write_stdin("hello mesh")
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .success()
        .stdout("hello mesh");
    server.join().unwrap();
}

#[test]
fn test_pipe_connect_failure_exit_code() {
    let home = TempDir::new().unwrap();
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    meshdock_cmd(home.path())
        .args(["pipe", "127.0.0.1", &port.to_string()])
        .write_stdin("")
        .assert()
        .code(7)
        .stderr(predicate::str::contains("Could not connect"));
}

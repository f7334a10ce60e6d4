#![allow(deprecated)] // TODO: move from Command::cargo_bin to cargo_bin_cmd!

use assert_cmd::Command;
use predicates::prelude::*;

/// Binary command with broker environment variables cleared
const PENDING_STATE: &str = r#"{
  "version": 1,
  "updated_at": "2024-01-01T00:00:00Z",
  "instances": {
    "abc": {
      "instance_id": "abc",
      "operation_id": null,
      "state": "pending",
      "created_at": "2024-01-01T00:00:00Z",
      "updated_at": "2024-01-01T00:00:00Z"
    }
  }
}"#;

fn acctbrokerd() -> Command {
    let mut cmd = Command::cargo_bin("acctbrokerd").unwrap();
    cmd.env_remove("ACCTBROKER_CONFIG")
        .env_remove("BASE_EMAIL")
        .env_remove("DATABASE_URL")
        .env("RUST_LOG", "warn");
    cmd
}

/// Help lists the subcommands and the config flag
#[test]
fn test_cli_help() {
    acctbrokerd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("provisions AWS accounts"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("pending"))
        .stdout(predicate::str::contains("confirm"))
        .stdout(predicate::str::contains("release"))
        .stdout(predicate::str::contains("--config"));
}

/// Version subcommand prints the binary name
#[test]
fn test_cli_version() {
    acctbrokerd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("acctbrokerd"));
}

/// Pending on a fresh state file reports nothing to reconcile
#[test]
fn test_pending_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("broker.kdl");
    let state = dir.path().join("instances.json");
    std::fs::write(
        &config,
        format!(
            "database {{ path {:?}; }}\nbroker {{ base-email \"ops@example.com\"; }}\n",
            state.display().to_string()
        ),
    )
    .unwrap();

    acctbrokerd()
        .arg("--config")
        .arg(&config)
        .arg("pending")
        .assert()
        .success()
        .stdout(predicate::str::contains("No unconfirmed reservations"));
}

/// Pending lists each reservation with its derived address
#[test]
fn test_pending_lists_reservations() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("instances.json");
    std::fs::write(
        &state,
        r#"{
  "version": 1,
  "updated_at": "2024-01-01T00:00:00Z",
  "instances": {
    "abc": {
      "instance_id": "abc",
      "operation_id": null,
      "state": "pending",
      "created_at": "2024-01-01T00:00:00Z",
      "updated_at": "2024-01-01T00:00:00Z"
    }
  }
}"#,
    )
    .unwrap();

    acctbrokerd()
        .arg("pending")
        .env("DATABASE_URL", format!("file:{}", state.display()))
        .env("BASE_EMAIL", "ops@example.com")
        .current_dir(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("abc"))
        .stdout(predicate::str::contains("ops+abc@example.com"));
}

/// An explicit config path that does not exist is an error
#[test]
fn test_missing_explicit_config_fails() {
    let dir = tempfile::tempdir().unwrap();

    acctbrokerd()
        .arg("--config")
        .arg(dir.path().join("missing.kdl"))
        .arg("pending")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

/// Serve refuses to start without a base email
#[test]
fn test_serve_requires_base_email() {
    let dir = tempfile::tempdir().unwrap();

    acctbrokerd()
        .arg("serve")
        .current_dir(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No base email configured"));
}

/// Temp dir holding a state file with one pending reservation for `abc`
fn pending_state() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("instances.json");
    std::fs::write(&state, PENDING_STATE).unwrap();
    (dir, state)
}

fn read_state(path: &std::path::Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

/// Confirm turns the pending reservation into a confirmed record
#[test]
fn test_confirm_pending_reservation() {
    let (dir, state) = pending_state();

    acctbrokerd()
        .args(["confirm", "abc", "car-123"])
        .env("DATABASE_URL", format!("file:{}", state.display()))
        .current_dir(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Confirmed"));

    let saved = read_state(&state);
    assert_eq!(saved["instances"]["abc"]["state"], "confirmed");
    assert_eq!(saved["instances"]["abc"]["operation_id"], "car-123");
    assert!(!dir.path().join("instances.json.lock").exists());

    acctbrokerd()
        .arg("pending")
        .env("DATABASE_URL", format!("file:{}", state.display()))
        .current_dir(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No unconfirmed reservations"));
}

/// A confirmed record cannot be confirmed again or released
#[test]
fn test_confirmed_record_is_final() {
    let (dir, state) = pending_state();
    let database_url = format!("file:{}", state.display());

    acctbrokerd()
        .args(["confirm", "abc", "car-123"])
        .env("DATABASE_URL", &database_url)
        .current_dir(dir.path())
        .assert()
        .success();

    acctbrokerd()
        .args(["confirm", "abc", "car-456"])
        .env("DATABASE_URL", &database_url)
        .current_dir(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already confirmed"));

    acctbrokerd()
        .args(["release", "abc"])
        .env("DATABASE_URL", &database_url)
        .current_dir(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No pending reservation"));

    assert_eq!(read_state(&state)["instances"]["abc"]["operation_id"], "car-123");
}

/// Release drops the pending reservation
#[test]
fn test_release_pending_reservation() {
    let (dir, state) = pending_state();

    acctbrokerd()
        .args(["release", "abc"])
        .env("DATABASE_URL", format!("file:{}", state.display()))
        .current_dir(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Released"));

    let saved = read_state(&state);
    assert!(saved["instances"].get("abc").is_none());
}

/// Releasing or confirming an unknown instance fails without changing the file
#[test]
fn test_unknown_instance_fails() {
    let (dir, state) = pending_state();
    let database_url = format!("file:{}", state.display());

    acctbrokerd()
        .args(["release", "nope"])
        .env("DATABASE_URL", &database_url)
        .current_dir(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No pending reservation for instance nope"));

    acctbrokerd()
        .args(["confirm", "nope", "car-1"])
        .env("DATABASE_URL", &database_url)
        .current_dir(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No pending reservation for instance nope"));

    assert_eq!(std::fs::read_to_string(&state).unwrap(), PENDING_STATE);
}

/// Confirm and release refuse to run while another process holds the state lock
#[test]
fn test_resolve_refused_while_locked() {
    let (dir, state) = pending_state();
    let lock = dir.path().join("instances.json.lock");
    std::fs::write(
        &lock,
        r#"{"holder":"broker-host","pid":4242,"acquired_at":"2024-01-01T00:00:00Z"}"#,
    )
    .unwrap();
    let database_url = format!("file:{}", state.display());

    acctbrokerd()
        .args(["confirm", "abc", "car-123"])
        .env("DATABASE_URL", &database_url)
        .current_dir(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("locked"))
        .stderr(predicate::str::contains("pid 4242"));

    acctbrokerd()
        .args(["release", "abc"])
        .env("DATABASE_URL", &database_url)
        .current_dir(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("locked"));

    assert_eq!(std::fs::read_to_string(&state).unwrap(), PENDING_STATE);
    assert!(lock.exists());
}

/// Pending reads the state file without taking the lock
#[test]
fn test_pending_while_locked() {
    let (dir, state) = pending_state();
    let lock = dir.path().join("instances.json.lock");
    std::fs::write(
        &lock,
        r#"{"holder":"broker-host","pid":4242,"acquired_at":"2024-01-01T00:00:00Z"}"#,
    )
    .unwrap();

    acctbrokerd()
        .arg("pending")
        .env("DATABASE_URL", format!("file:{}", state.display()))
        .current_dir(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("abc"));

    assert!(lock.exists());
}

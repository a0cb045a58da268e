//! Ledger swap semantics and run-lock queueing, on scratch
//! directories.

use std::time::Duration;

use gantry::error::DeployError;
use gantry::state::{DeploymentState, RunLock, StateStore};

fn record(host: &str, revision: &str) -> DeploymentState {
    DeploymentState {
        version: 0,
        host: host.to_string(),
        revision: revision.to_string(),
        api_image: format!("r/api:{revision}"),
        proxy_image: format!("r/proxy:{revision}"),
        config: vec![("ALLOWED_HOSTS".into(), "*".into())],
        activated_at: 1_756_100_000,
    }
}

#[test]
fn empty_store_has_no_current() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path());

    assert!(store.current().unwrap().is_none());
}

#[test]
fn first_swap_is_version_one() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path());

    let mut first = record("203.0.113.10", "a1b2c3d");
    let previous = store.swap(&mut first).unwrap();

    assert!(previous.is_none());
    assert_eq!(first.version, 1);

    let current = store.current().unwrap().unwrap();
    assert_eq!(current.version, 1);
    assert_eq!(current.revision, "a1b2c3d");
}

#[test]
fn swap_returns_previous_and_bumps_version() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path());

    let mut first = record("203.0.113.10", "a1b2c3d");
    store.swap(&mut first).unwrap();

    let mut second = record("203.0.113.10", "e4f5a6b");
    let previous = store.swap(&mut second).unwrap().unwrap();

    assert_eq!(previous.revision, "a1b2c3d");
    assert_eq!(second.version, 2);
    assert_eq!(store.current().unwrap().unwrap().revision, "e4f5a6b");
}

#[test]
fn config_snapshot_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path());

    let mut rec = record("203.0.113.10", "a1b2c3d");
    store.swap(&mut rec).unwrap();

    let current = store.current().unwrap().unwrap();
    assert_eq!(current.config, vec![("ALLOWED_HOSTS".to_string(), "*".to_string())]);
}

#[test]
fn lock_is_exclusive_until_released() {
    let dir = tempfile::tempdir().unwrap();

    let first = RunLock::acquire(dir.path(), Duration::ZERO).unwrap();

    let contended = RunLock::acquire(dir.path(), Duration::ZERO);
    assert!(matches!(contended.unwrap_err(), DeployError::LockHeld { .. }));

    drop(first);
    assert!(RunLock::acquire(dir.path(), Duration::ZERO).is_ok());
}

#[test]
fn lock_error_names_the_holder() {
    let dir = tempfile::tempdir().unwrap();

    let _held = RunLock::acquire(dir.path(), Duration::ZERO).unwrap();

    let err = RunLock::acquire(dir.path(), Duration::ZERO).unwrap_err();
    let DeployError::LockHeld { holder, since } = err else {
        panic!("expected LockHeld");
    };
    assert_eq!(holder, std::process::id().to_string());
    assert_ne!(since, "unknown");
}

#[test]
fn queued_run_proceeds_when_holder_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_path_buf();

    let first = RunLock::acquire(&path, Duration::ZERO).unwrap();

    let waiter = std::thread::spawn(move || {
        RunLock::acquire(&path, Duration::from_secs(30)).map(|_| ())
    });

    std::thread::sleep(Duration::from_millis(200));
    drop(first);

    assert!(waiter.join().unwrap().is_ok());
}

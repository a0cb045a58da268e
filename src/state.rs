//! The deployment ledger and the pipeline run lock.
//!
//! "What is currently serving" is an explicit versioned record,
//! replaced by an atomic file swap, never an implicit consequence
//! of whatever containers happen to be running.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, DeployResult};

const STATE_FILE: &str = "deploy-state.json";
const LOCK_FILE: &str = "pipeline.lock";
const LOCK_POLL: Duration = Duration::from_secs(2);

/// The record of one activated deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentState {
    pub version: u64,
    pub host: String,
    pub revision: String,
    pub api_image: String,
    pub proxy_image: String,
    pub config: Vec<(String, String)>,
    pub activated_at: u64,
}

/// Stores the current [`DeploymentState`] on disk and replaces it
/// atomically.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    /// The currently recorded deployment, if any.
    pub fn current(&self) -> DeployResult<Option<DeploymentState>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Replace the current record with `record`, assigning the
    /// next version number. Write-then-rename, so a crash mid-swap
    /// leaves the previous record intact. Returns the replaced
    /// record.
    pub fn swap(&self, record: &mut DeploymentState) -> DeployResult<Option<DeploymentState>> {
        fs::create_dir_all(&self.dir)?;

        let previous = self.current()?;
        record.version = previous.as_ref().map_or(1, |p| p.version + 1);

        let tmp = self.dir.join(format!("{STATE_FILE}.tmp"));
        fs::write(&tmp, serde_json::to_string_pretty(record)?)?;
        fs::rename(&tmp, self.path())?;

        Ok(previous)
    }
}

/// One pipeline run at a time. A contending run queues behind the
/// holder by polling; it never cancels the running pipeline and
/// never proceeds in parallel with it.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Take the lock, waiting up to `wait` for the holder to
    /// finish.
    pub fn acquire(dir: &Path, wait: Duration) -> DeployResult<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE);
        let deadline = Instant::now() + wait;
        let mut announced = false;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    writeln!(file, "{} {}", std::process::id(), unix_now())?;
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let (holder, since) = read_holder(&path);
                    if Instant::now() >= deadline {
                        return Err(DeployError::LockHeld { holder, since });
                    }
                    if !announced {
                        eprintln!(
                            "Another pipeline run is in progress \
                             (pid {holder}, since {since}); queuing..."
                        );
                        announced = true;
                    }
                    thread::sleep(LOCK_POLL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn read_holder(path: &Path) -> (String, String) {
    let raw = fs::read_to_string(path).unwrap_or_default();
    let mut parts = raw.split_whitespace();
    let holder = parts.next().unwrap_or("unknown").to_string();
    let since = parts.next().unwrap_or("unknown").to_string();
    (holder, since)
}

/// Seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

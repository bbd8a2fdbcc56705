//! Per-team advisory file lock.
//!
//! Arbitration is the flock itself, taken on a permanent `.lock` file that is
//! never unlinked: deleting a locked file would let a second process flock a
//! fresh inode while the first still holds the old one, so the file stays and
//! the kernel alone decides who holds it. A holder that dies loses its flock
//! automatically; no explicit reclamation exists. The owner metadata file
//! (`.lock.owner.json`, pid and acquisition time) is purely diagnostic: it
//! feeds timeout messages and the liveness/staleness warnings while waiting,
//! and never grounds an eviction.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{TeamError, TeamResult};

/// Default lock wait budget.
pub const DEFAULT_WAIT_SECS: u64 = 10;

/// Default informational stale window.
pub const DEFAULT_STALE_SECS: u64 = 180;

const LOCK_FILE: &str = ".lock";
const OWNER_FILE: &str = ".lock.owner.json";

/// Diagnostic owner metadata stored alongside the lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// Process liveness probe. Mockable in tests.
pub trait ProcessProbe {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe backed by the operating system.
#[derive(Debug, Default)]
pub struct SystemProcessProbe;

impl ProcessProbe for SystemProcessProbe {
    fn is_alive(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        #[cfg(target_os = "linux")]
        {
            Path::new(&format!("/proc/{pid}")).exists()
        }
        #[cfg(not(target_os = "linux"))]
        {
            // kill -0 probes existence without delivering a signal.
            std::process::Command::new("kill")
                .args(["-0", &pid.to_string()])
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
        }
    }
}

/// Lock acquisition settings.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// How long a mutating call may wait for the lock.
    pub wait_budget: Duration,
    /// Informational aging threshold; never grounds for eviction.
    pub stale_window: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait_budget: Duration::from_secs(DEFAULT_WAIT_SECS),
            stale_window: Duration::from_secs(DEFAULT_STALE_SECS),
        }
    }
}

/// Exclusive per-team lock.
pub struct TeamLock {
    path: PathBuf,
    owner_path: PathBuf,
    config: LockConfig,
    file: Option<File>,
}

impl TeamLock {
    /// Create a lock rooted in the team's directory.
    pub fn new(team_dir: &Path, config: LockConfig) -> Self {
        Self {
            path: team_dir.join(LOCK_FILE),
            owner_path: team_dir.join(OWNER_FILE),
            config,
            file: None,
        }
    }

    /// Whether this handle currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Acquire the lock, polling with backoff up to the wait budget.
    ///
    /// Only the flock grants ownership. While waiting, the owner record
    /// drives diagnostics: a recorded pid the probe reports dead means the
    /// record is stale (a live flock implies a live holder); a changed pid
    /// means the lock turned over and waiting continues against the new
    /// holder; a record older than the stale window warns but never evicts.
    pub fn acquire(&mut self, probe: &dyn ProcessProbe) -> TeamResult<()> {
        let start = Instant::now();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;

        let mut last_seen: Option<u32> = None;
        let mut backoff = Duration::from_millis(25);
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    if let Some(stale) = self.read_owner() {
                        if !probe.is_alive(stale.pid) {
                            warn!(
                                pid = stale.pid,
                                lock = %self.path.display(),
                                "previous holder died without releasing; taking over"
                            );
                        }
                    }
                    self.write_owner()?;
                    self.file = Some(file);
                    return Ok(());
                }
                Err(_) => {
                    let owner = self.read_owner();
                    if let Some(ref meta) = owner {
                        if !probe.is_alive(meta.pid) {
                            // The flock is held, so someone is alive; the
                            // record just lags behind the real holder.
                            debug!(
                                pid = meta.pid,
                                "owner record names a dead pid while the lock is held"
                            );
                        }
                        if let Some(prev) = last_seen {
                            if prev != meta.pid {
                                debug!(
                                    prev,
                                    pid = meta.pid,
                                    "lock holder changed while waiting"
                                );
                            }
                        }
                        last_seen = Some(meta.pid);

                        let age = Utc::now().signed_duration_since(meta.acquired_at);
                        if age.num_seconds() >= 0
                            && age.num_seconds() as u64 >= self.config.stale_window.as_secs()
                        {
                            warn!(
                                pid = meta.pid,
                                age_secs = age.num_seconds(),
                                "lock exceeds stale window but is still held; not reclaiming"
                            );
                        }
                    }

                    let elapsed = start.elapsed();
                    if elapsed >= self.config.wait_budget {
                        return Err(TeamError::LockTimeout {
                            path: self.path.clone(),
                            waited_secs: elapsed.as_secs(),
                            holder_pid: owner.map(|m| m.pid),
                        });
                    }

                    let remaining = self.config.wait_budget - elapsed;
                    std::thread::sleep(backoff.min(remaining));
                    backoff = (backoff * 2).min(Duration::from_millis(500));
                }
            }
        }
    }

    /// Release the lock. The owner record is removed while the flock is
    /// still held, so a successor's fresh record is never clobbered; the
    /// `.lock` file itself stays in place and the flock drops with the
    /// handle.
    pub fn release(&mut self) {
        if self.file.is_none() {
            return;
        }
        let _ = fs::remove_file(&self.owner_path);
        self.file = None;
    }

    fn write_owner(&self) -> TeamResult<()> {
        let meta = LockOwner {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        fs::write(&self.owner_path, serde_json::to_string(&meta)?)?;
        Ok(())
    }

    fn read_owner(&self) -> Option<LockOwner> {
        fs::read_to_string(&self.owner_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
    }
}

impl Drop for TeamLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Run `f` while holding the team's exclusive lock.
pub fn with_team_lock<T>(
    team_dir: &Path,
    config: &LockConfig,
    probe: &dyn ProcessProbe,
    f: impl FnOnce() -> TeamResult<T>,
) -> TeamResult<T> {
    let mut lock = TeamLock::new(team_dir, config.clone());
    lock.acquire(probe)?;
    let result = f();
    lock.release();
    result
}

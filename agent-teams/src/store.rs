//! File-backed team store.
//!
//! Owns the per-team path layout and the IO primitives every operation is
//! built on: snapshot loads, atomic write-to-temp-then-rename persists, and
//! append-only jsonl logs. Each invocation is a fresh short-lived process, so
//! nothing here caches in memory; the store is a view over the last persisted
//! state.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{TeamError, TeamResult};
use crate::lock::{self, LockConfig, ProcessProbe};
use crate::monitor::MonitorLogger;
use crate::registry::{validate_identifier, TeamRecord};

/// Per-team view over the resolved storage root.
#[derive(Debug, Clone)]
pub struct TeamStore {
    root: PathBuf,
    team: String,
}

impl TeamStore {
    /// Create a store for one team. The team name is validated here because
    /// it addresses a storage path.
    pub fn new(root: impl Into<PathBuf>, team: impl Into<String>) -> TeamResult<Self> {
        let team = team.into();
        validate_identifier(&team)?;
        Ok(Self {
            root: root.into(),
            team,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn team_name(&self) -> &str {
        &self.team
    }

    pub fn team_dir(&self) -> PathBuf {
        self.root.join(&self.team)
    }

    pub fn team_file(&self) -> PathBuf {
        self.team_dir().join("team.json")
    }

    pub fn task_file(&self) -> PathBuf {
        self.team_dir().join("tasks.json")
    }

    pub fn message_file(&self) -> PathBuf {
        self.team_dir().join("messages.jsonl")
    }

    pub fn debate_file(&self) -> PathBuf {
        self.team_dir().join("debates.json")
    }

    /// Whether the team has been initialized.
    pub fn exists(&self) -> bool {
        self.team_file().exists()
    }

    /// Fail fast when the team has not been initialized.
    pub fn require_team(&self) -> TeamResult<()> {
        if self.exists() {
            Ok(())
        } else {
            Err(TeamError::TeamNotFound {
                name: self.team.clone(),
                path: self.team_file(),
            })
        }
    }

    /// Load the team registry record.
    pub fn load_team(&self) -> TeamResult<TeamRecord> {
        self.load_json(&self.team_file())?
            .ok_or_else(|| TeamError::TeamNotFound {
                name: self.team.clone(),
                path: self.team_file(),
            })
    }

    /// Load a JSON snapshot. Absent files are `None`; present-but-unparseable
    /// files are a `MalformedState` error so callers can decide whether
    /// recovery applies.
    pub fn load_json<T: DeserializeOwned>(&self, path: &Path) -> TeamResult<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| TeamError::MalformedState {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Persist a JSON snapshot atomically: write a sibling temp file, then
    /// rename over the target so readers only ever see a full snapshot.
    pub fn write_json_atomic<T: Serialize>(&self, path: &Path, value: &T) -> TeamResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(value)?;
        let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Append one record to a jsonl log.
    pub fn append_jsonl<T: Serialize>(&self, path: &Path, value: &T) -> TeamResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(value)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Create an empty file if absent (used to seed the mailbox log).
    pub fn touch(&self, path: &Path) -> TeamResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(())
    }
}

/// Everything a mutating operation needs: the store, lock settings, a
/// liveness probe, and the monitor logger.
pub struct TeamContext<'a> {
    pub store: &'a TeamStore,
    pub lock: LockConfig,
    pub probe: &'a dyn ProcessProbe,
    pub monitor: &'a MonitorLogger,
}

impl<'a> TeamContext<'a> {
    pub fn new(
        store: &'a TeamStore,
        lock: LockConfig,
        probe: &'a dyn ProcessProbe,
        monitor: &'a MonitorLogger,
    ) -> Self {
        Self {
            store,
            lock,
            probe,
            monitor,
        }
    }

    /// Run `f` as one critical section under the team's exclusive lock.
    /// Either the whole section commits or none of it does.
    pub fn locked<T>(&self, f: impl FnOnce() -> TeamResult<T>) -> TeamResult<T> {
        lock::with_team_lock(&self.store.team_dir(), &self.lock, self.probe, f)
    }
}

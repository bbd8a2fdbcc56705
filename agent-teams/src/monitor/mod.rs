//! Monitor event stream.
//!
//! When enabled, every mutating operation appends one structured event to an
//! append-only jsonl log. Disabled by default; no file is created unless
//! enabled. Logging is best-effort: a failed append degrades to a warning and
//! never aborts the mutation it describes.

pub mod report;

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

pub use report::{build_report, MonitorReport};

/// Default monitor log file name, under the storage root.
pub const MONITOR_LOG_FILE: &str = "monitor.jsonl";

/// Fixed command label for the decision-apply step, regardless of whether it
/// was reached via manual decide-and-apply or via the orchestration loop.
pub const APPLY_COMMAND: &str = "apply-decision";

/// Kind of entity an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Team,
    Task,
    Debate,
    Message,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Team => write!(f, "team"),
            Self::Task => write!(f, "task"),
            Self::Debate => write!(f, "debate"),
            Self::Message => write!(f, "message"),
        }
    }
}

/// One structured monitor event, one JSON object per log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub at: DateTime<Utc>,
    pub event_type: String,
    pub command: String,
    pub team_name: String,
    pub actor: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    pub correlation_id: String,
}

/// Draft of an event under construction by an operation.
#[derive(Debug, Clone)]
pub struct EventDraft {
    event_type: String,
    command_override: Option<String>,
    actor: String,
    entity_type: EntityType,
    entity_id: String,
    before: Option<Value>,
    after: Option<Value>,
    metadata: BTreeMap<String, Value>,
}

impl EventDraft {
    pub fn new(
        event_type: impl Into<String>,
        entity_type: EntityType,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            command_override: None,
            actor: "system".to_string(),
            entity_type,
            entity_id: entity_id.into(),
            before: None,
            after: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn with_before(mut self, before: Value) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_after(mut self, after: Value) -> Self {
        self.after = Some(after);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Override the invoking command label (used by the apply step).
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command_override = Some(command.into());
        self
    }
}

/// Appender for the monitor log. One instance per invocation; all events it
/// emits share a correlation id.
#[derive(Debug, Clone)]
pub struct MonitorLogger {
    enabled: bool,
    path: PathBuf,
    command: String,
    team_name: String,
    correlation_id: String,
}

impl MonitorLogger {
    /// A logger that drops every event. No file is ever created.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            path: PathBuf::new(),
            command: String::new(),
            team_name: String::new(),
            correlation_id: String::new(),
        }
    }

    /// An enabled logger appending to `path` under the given command label.
    pub fn new(
        path: impl Into<PathBuf>,
        command: impl Into<String>,
        team_name: impl Into<String>,
    ) -> Self {
        Self {
            enabled: true,
            path: path.into(),
            command: command.into(),
            team_name: team_name.into(),
            correlation_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event. Best-effort: failures are logged, not propagated.
    pub fn emit(&self, draft: EventDraft) {
        if !self.enabled {
            return;
        }
        let event = MonitorEvent {
            at: Utc::now(),
            event_type: draft.event_type,
            command: draft
                .command_override
                .unwrap_or_else(|| self.command.clone()),
            team_name: self.team_name.clone(),
            actor: draft.actor,
            entity_type: draft.entity_type,
            entity_id: draft.entity_id,
            before: draft.before,
            after: draft.after,
            metadata: draft.metadata,
            correlation_id: self.correlation_id.clone(),
        };
        if let Err(e) = self.append(&event) {
            warn!(error = %e, path = %self.path.display(), "monitor append failed");
        }
    }

    fn append(&self, event: &MonitorEvent) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let line = serde_json::to_string(event).map_err(std::io::Error::other)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_disabled_logger_creates_no_file() {
        let logger = MonitorLogger::disabled();
        logger.emit(EventDraft::new("task_added", EntityType::Task, "task-1"));
        assert!(!logger.is_enabled());
    }

    #[test]
    fn test_emit_appends_full_event() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MONITOR_LOG_FILE);
        let logger = MonitorLogger::new(&path, "add-task", "t1");

        logger.emit(
            EventDraft::new("task_added", EntityType::Task, "task-1")
                .with_actor("alice")
                .with_after(serde_json::json!({"id": "task-1"}))
                .with_metadata("title", "write docs"),
        );

        let raw = std::fs::read_to_string(&path).unwrap();
        let event: MonitorEvent = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
        assert_eq!(event.event_type, "task_added");
        assert_eq!(event.command, "add-task");
        assert_eq!(event.team_name, "t1");
        assert_eq!(event.actor, "alice");
        assert_eq!(event.entity_type, EntityType::Task);
        assert_eq!(event.entity_id, "task-1");
        assert!(event.after.is_some());
        assert!(!event.correlation_id.is_empty());
    }

    #[test]
    fn test_command_override_for_apply() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MONITOR_LOG_FILE);
        let logger = MonitorLogger::new(&path, "orchestrate-debate", "t1");

        logger.emit(
            EventDraft::new("decision_applied", EntityType::Debate, "debate-1")
                .with_command(APPLY_COMMAND),
        );

        let raw = std::fs::read_to_string(&path).unwrap();
        let event: MonitorEvent = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
        assert_eq!(event.command, APPLY_COMMAND);
    }

    #[test]
    fn test_events_share_correlation_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MONITOR_LOG_FILE);
        let logger = MonitorLogger::new(&path, "init", "t1");

        logger.emit(EventDraft::new("team_initialized", EntityType::Team, "t1"));
        logger.emit(EventDraft::new("task_added", EntityType::Task, "task-1"));

        let raw = std::fs::read_to_string(&path).unwrap();
        let events: Vec<MonitorEvent> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].correlation_id, events[1].correlation_id);
    }
}

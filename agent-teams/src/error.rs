//! Error taxonomy for team operations.
//!
//! Four classes: validation failures that fail fast before any mutation,
//! retryable concurrency failures, state-integrity failures, and wrapped
//! IO/JSON errors. Idempotent no-ops are successful results carrying the
//! current state, never errors.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for team operations.
pub type TeamResult<T> = Result<T, TeamError>;

/// Errors surfaced by the team store and its operations.
#[derive(Debug, Error)]
pub enum TeamError {
    /// Identifier contains characters that would be unsafe in a storage path.
    #[error("invalid identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: String },

    /// Team state is absent at the resolved location.
    #[error("team '{name}' is not initialized (expected {path}); run init first")]
    TeamNotFound { name: String, path: PathBuf },

    /// Referenced member is not on the roster.
    #[error("unknown member '{name}'{}", fmt_suggestions(.suggestions))]
    UnknownMember {
        name: String,
        suggestions: Vec<String>,
    },

    /// Referenced task does not exist on the board.
    #[error("task not found: {id}")]
    TaskNotFound { id: String },

    /// Completed tasks cannot be claimed.
    #[error("cannot claim completed task: {id}")]
    ClaimCompleted { id: String },

    /// `in_progress` requires a real owner.
    #[error("task {id} cannot be in_progress while owner is 'unassigned'")]
    OwnerRequired { id: String },

    /// Status string is not one of the known task states.
    #[error("unknown task status '{value}' (expected pending, in_progress, or completed)")]
    UnknownStatus { value: String },

    /// Referenced debate does not exist.
    #[error("debate not found: {id}")]
    DebateNotFound { id: String },

    /// Positions are only accepted while the debate is open.
    #[error("debate {id} is {status}; positions are only accepted while open")]
    DebateNotOpen { id: String, status: String },

    /// Chosen option is not part of the debate.
    #[error("option '{option}' is not part of debate {debate_id} (options: {})", .options.join(", "))]
    UnknownOption {
        debate_id: String,
        option: String,
        options: Vec<String>,
    },

    /// Confidence must be a finite value within [0, 1].
    #[error("confidence must be a finite value in [0, 1], got {value}")]
    ConfidenceOutOfRange { value: f64 },

    /// A debate needs at least two distinct options.
    #[error("a debate needs at least {need} unique options, got {got}")]
    InsufficientOptions { got: usize, need: usize },

    /// A debate needs at least two distinct registered members.
    #[error("a debate needs at least {need} unique registered members, got {got}")]
    InsufficientMembers { got: usize, need: usize },

    /// Owner-map entries must name each option at most once.
    #[error("duplicate owner-map key: {key}")]
    DuplicateOwnerMapKey { key: String },

    /// Owner-map keys must be drawn from the debate's option set.
    #[error("owner-map key '{key}' is not one of the debate options")]
    OwnerMapUnknownOption { key: String },

    /// Owner-map entry is not `option:member`.
    #[error("malformed owner-map entry '{entry}' (expected option:member)")]
    MalformedOwnerMapEntry { entry: String },

    /// `require_all_positions` gate failed.
    #[error("missing positions from: {}", .members.join(", "))]
    MissingPositions { members: Vec<String> },

    /// A winner cannot be derived without any recorded positions.
    #[error("debate {debate_id} has no positions to derive a decision from")]
    NoPositions { debate_id: String },

    /// Decisions must carry a rationale.
    #[error("decision rationale must not be empty")]
    EmptyRationale,

    /// Debate status may only advance open -> decided -> applied.
    #[error("invalid debate transition on {debate_id}: {from} -> {to}")]
    InvalidDebateTransition {
        debate_id: String,
        from: String,
        to: String,
    },

    /// Apply was reached without a recorded decision.
    #[error("debate {debate_id} has no recorded decision to apply")]
    DecisionMissing { debate_id: String },

    /// Persisted decision references an option no longer in the debate.
    #[error("corrupted decision on debate {debate_id}: chosen option '{option}' is not in the option set")]
    CorruptDecision { debate_id: String, option: String },

    /// Lock wait budget exhausted. Retryable.
    #[error("timed out after {waited_secs}s waiting for the team lock at {path}{}; retry or raise the wait budget", fmt_holder(.holder_pid))]
    LockTimeout {
        path: PathBuf,
        waited_secs: u64,
        holder_pid: Option<u32>,
    },

    /// Explicit storage root must be a directory.
    #[error("storage root {path} is not a directory")]
    RootNotADirectory { path: PathBuf },

    /// Implicit root discovery could not settle on a single location.
    #[error("cannot resolve team storage for '{team}': {guidance}")]
    RootUnresolved { team: String, guidance: String },

    /// A state file exists but does not parse.
    #[error("state file {path} is not valid JSON: {reason}")]
    MalformedState { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TeamError {
    /// Whether the caller can expect a retry to succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}

fn fmt_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {}?)", suggestions.join(", "))
    }
}

fn fmt_holder(pid: &Option<u32>) -> String {
    match pid {
        Some(pid) => format!(" (held by pid {pid})"),
        None => String::new(),
    }
}

//! Debate records and the status state machine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TeamError, TeamResult};
use crate::tasks::TaskStatus;

/// Status of a debate. Monotonic: open -> decided -> applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateStatus {
    /// Accepting positions.
    Open,
    /// A decision is recorded but not yet reflected into task state.
    Decided,
    /// Terminal; further invocations are idempotent no-ops.
    Applied,
}

impl DebateStatus {
    /// Whether this is the terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(self) -> &'static [DebateStatus] {
        match self {
            Self::Open => &[Self::Decided],
            Self::Decided => &[Self::Applied],
            Self::Applied => &[],
        }
    }
}

impl std::fmt::Display for DebateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Decided => write!(f, "decided"),
            Self::Applied => write!(f, "applied"),
        }
    }
}

/// One member's current stance on a debate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub member: String,
    pub option: String,
    /// Finite, within [0, 1].
    pub confidence: f64,
    pub rationale: String,
    pub at: DateTime<Utc>,
}

/// The recorded outcome of a debate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub option: String,
    pub rationale: String,
    pub decider: String,
    pub decided_at: DateTime<Utc>,
    pub applied: bool,
    /// Winning-option to owner mapping, used when a task is linked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_map: Option<BTreeMap<String, String>>,
    /// Task status to set on apply; defaults to completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_on_apply: Option<TaskStatus>,
}

/// A structured multi-party decision record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debate {
    pub id: String,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub options: Vec<String>,
    pub members: Vec<String>,
    pub decider: String,
    pub status: DebateStatus,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Debate {
    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }

    pub fn has_member(&self, member: &str) -> bool {
        self.members.iter().any(|m| m == member)
    }

    pub fn position_of(&self, member: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.member == member)
    }

    /// Debate members who have not yet submitted a position, in roster order.
    pub fn members_without_position(&self) -> Vec<String> {
        self.members
            .iter()
            .filter(|m| self.position_of(m).is_none())
            .cloned()
            .collect()
    }

    /// Advance the status, enforcing monotonicity.
    pub fn transition(&mut self, to: DebateStatus) -> TeamResult<()> {
        if !self.status.valid_transitions().contains(&to) {
            return Err(TeamError::InvalidDebateTransition {
                debate_id: self.id.clone(),
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// All debates for a team plus the id counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateStore {
    pub debates: Vec<Debate>,
    pub next_id: u64,
}

impl Default for DebateStore {
    fn default() -> Self {
        Self {
            debates: Vec::new(),
            next_id: 1,
        }
    }
}

impl DebateStore {
    pub fn find(&self, id: &str) -> Option<&Debate> {
        self.debates.iter().find(|d| d.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Debate> {
        self.debates.iter_mut().find(|d| d.id == id)
    }

    pub fn allocate_id(&mut self) -> String {
        let id = format!("debate-{}", self.next_id);
        self.next_id += 1;
        id
    }
}

//! Shared task board.
//!
//! Tasks carry an owner, a three-state status, a dependency set, and an
//! append-only note trail. Transitions are operator-directed: any status may
//! follow any other, with one invariant enforced throughout: `in_progress`
//! requires a real owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

use crate::error::{TeamError, TeamResult};
use crate::monitor::{EntityType, EventDraft};
use crate::registry::UNASSIGNED;
use crate::store::{TeamContext, TeamStore};

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = TeamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(TeamError::UnknownStatus {
                value: other.to_string(),
            }),
        }
    }
}

/// One timestamped note on a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNote {
    pub at: DateTime<Utc>,
    pub text: String,
}

/// One task record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub owner: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub notes: Vec<TaskNote>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The board: tasks in creation order plus the id counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBoard {
    pub tasks: Vec<Task>,
    pub next_id: u64,
}

impl Default for TaskBoard {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            next_id: 1,
        }
    }
}

impl TaskBoard {
    pub fn find(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    fn allocate_id(&mut self) -> String {
        let id = format!("task-{}", self.next_id);
        self.next_id += 1;
        id
    }

    /// Restartable iteration over task snapshots in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }
}

/// Arguments for `add_task`.
#[derive(Debug, Clone)]
pub struct AddTaskArgs {
    pub title: String,
    pub owner: String,
    pub status: TaskStatus,
    pub depends_on: Vec<String>,
}

/// What a claim displaced; lets callers detect a lost race after the fact.
#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    pub task: Task,
    pub previous_owner: String,
    pub previous_status: TaskStatus,
}

/// Arguments for `update_task`. Absent fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateTaskArgs {
    pub task_id: String,
    pub status: Option<TaskStatus>,
    pub owner: Option<String>,
    pub note: Option<String>,
    pub depends_on: Option<Vec<String>>,
}

/// Add a task to the board.
pub fn add_task(ctx: &TeamContext, args: AddTaskArgs) -> TeamResult<Task> {
    ctx.store.require_team()?;
    ctx.locked(|| {
        let team = ctx.store.load_team()?;
        team.resolve_owner(&args.owner)?;

        let mut board: TaskBoard = ctx
            .store
            .load_json(&ctx.store.task_file())?
            .unwrap_or_default();
        let id = board.allocate_id();

        if args.status == TaskStatus::InProgress && args.owner == UNASSIGNED {
            return Err(TeamError::OwnerRequired { id });
        }

        let now = Utc::now();
        let task = Task {
            id: id.clone(),
            title: args.title,
            owner: args.owner,
            status: args.status,
            depends_on: args.depends_on,
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        board.tasks.push(task.clone());
        ctx.store.write_json_atomic(&ctx.store.task_file(), &board)?;

        ctx.monitor.emit(
            EventDraft::new("task_added", EntityType::Task, &id)
                .with_actor(&task.owner)
                .with_after(serde_json::to_value(&task)?),
        );
        info!(task = id, title = task.title, "task added");
        Ok(task)
    })
}

/// Claim a task: sets owner and `in_progress` atomically.
///
/// Completed tasks cannot be claimed. Concurrent claims serialize on the
/// team lock; the outcome reports the displaced owner and status so a caller
/// who lost the race can tell.
pub fn claim(ctx: &TeamContext, task_id: &str, member: &str) -> TeamResult<ClaimOutcome> {
    ctx.store.require_team()?;
    ctx.locked(|| {
        let team = ctx.store.load_team()?;
        team.resolve_member(member)?;

        let mut board: TaskBoard = ctx
            .store
            .load_json(&ctx.store.task_file())?
            .unwrap_or_default();
        let task = board.find_mut(task_id).ok_or_else(|| TeamError::TaskNotFound {
            id: task_id.to_string(),
        })?;

        if task.status == TaskStatus::Completed {
            return Err(TeamError::ClaimCompleted {
                id: task_id.to_string(),
            });
        }

        let before = serde_json::to_value(&*task)?;
        let previous_owner = task.owner.clone();
        let previous_status = task.status;

        task.owner = member.to_string();
        task.status = TaskStatus::InProgress;
        task.updated_at = Utc::now();
        let snapshot = task.clone();
        ctx.store.write_json_atomic(&ctx.store.task_file(), &board)?;

        ctx.monitor.emit(
            EventDraft::new("task_claimed", EntityType::Task, task_id)
                .with_actor(member)
                .with_before(before)
                .with_after(serde_json::to_value(&snapshot)?)
                .with_metadata("previous_owner", previous_owner.clone()),
        );
        info!(task = task_id, member, previous_owner, "task claimed");
        Ok(ClaimOutcome {
            task: snapshot,
            previous_owner,
            previous_status,
        })
    })
}

/// Update status, owner, dependencies, or append a note.
pub fn update_task(ctx: &TeamContext, args: UpdateTaskArgs) -> TeamResult<Task> {
    ctx.store.require_team()?;
    ctx.locked(|| {
        let team = ctx.store.load_team()?;
        if let Some(ref owner) = args.owner {
            team.resolve_owner(owner)?;
        }

        let mut board: TaskBoard = ctx
            .store
            .load_json(&ctx.store.task_file())?
            .unwrap_or_default();
        let task = board
            .find_mut(&args.task_id)
            .ok_or_else(|| TeamError::TaskNotFound {
                id: args.task_id.clone(),
            })?;

        let before = serde_json::to_value(&*task)?;
        if let Some(owner) = args.owner {
            task.owner = owner;
        }
        if let Some(status) = args.status {
            task.status = status;
        }
        if task.status == TaskStatus::InProgress && task.owner == UNASSIGNED {
            return Err(TeamError::OwnerRequired {
                id: args.task_id.clone(),
            });
        }
        if let Some(note) = args.note {
            task.notes.push(TaskNote {
                at: Utc::now(),
                text: note,
            });
        }
        if let Some(depends_on) = args.depends_on {
            task.depends_on = depends_on;
        }
        task.updated_at = Utc::now();
        let snapshot = task.clone();
        ctx.store.write_json_atomic(&ctx.store.task_file(), &board)?;

        ctx.monitor.emit(
            EventDraft::new("task_updated", EntityType::Task, &args.task_id)
                .with_actor(&snapshot.owner)
                .with_before(before)
                .with_after(serde_json::to_value(&snapshot)?),
        );
        info!(task = args.task_id, status = %snapshot.status, "task updated");
        Ok(snapshot)
    })
}

/// Read-only board snapshot; not serialized behind the lock.
pub fn list_tasks(store: &TeamStore) -> TeamResult<TaskBoard> {
    store.require_team()?;
    Ok(store.load_json(&store.task_file())?.unwrap_or_default())
}

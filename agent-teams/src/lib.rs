//! File-backed coordination for teams of autonomous agents.
//!
//! Shared state lives as plain JSON under a per-team directory; every
//! invocation is a short-lived process that takes an exclusive advisory lock,
//! mutates one snapshot, and exits. The crate provides the storage layout and
//! root discovery, the team registry, a task board, a mailbox, structured
//! debates with weighted-confidence voting, and an optional monitor event
//! stream.

pub mod debate;
pub mod error;
pub mod lock;
pub mod mailbox;
pub mod monitor;
pub mod registry;
pub mod rootdir;
pub mod store;
pub mod tasks;

pub use debate::{
    add_position, decide_debate, list_debates, orchestrate, show_debate, start_debate, Debate,
    DebateStatus, DecideArgs, OrchestrateArgs, OrchestrateOutcome, StartDebateArgs,
};
pub use error::{TeamError, TeamResult};
pub use lock::{LockConfig, ProcessProbe, SystemProcessProbe, TeamLock};
pub use mailbox::{broadcast, inbox, send_message, Message, MessageKind};
pub use monitor::{build_report, MonitorLogger, MonitorReport};
pub use registry::{init_team, InitOutcome, TeamRecord, UNASSIGNED};
pub use rootdir::{resolve_root, resolve_root_for_init, RealFs, ResolvedRoot};
pub use store::{TeamContext, TeamStore};
pub use tasks::{
    add_task, claim, list_tasks, update_task, AddTaskArgs, ClaimOutcome, Task, TaskBoard,
    TaskStatus, UpdateTaskArgs,
};

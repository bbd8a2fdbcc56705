//! Structured debates with weighted-confidence voting.

pub mod engine;
pub mod orchestrator;
pub mod types;

pub use engine::{
    add_position, decide_debate, list_debates, show_debate, start_debate, DecideArgs,
    StartDebateArgs,
};
pub use orchestrator::{orchestrate, OrchestrateArgs, OrchestrateOutcome};
pub use types::{Debate, DebateStatus, DebateStore, Decision, Position};

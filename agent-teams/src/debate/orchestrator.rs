//! One-call debate orchestration.
//!
//! Designed to be invoked repeatedly by a supervisor: each call inspects the
//! debate and takes exactly the next step. Open with missing positions sends
//! reminders; open with a full slate decides and applies; decided applies;
//! applied is a no-op. Every step happens under one lock acquisition, so two
//! overlapping orchestrators cannot both decide.

use chrono::Utc;
use tracing::info;

use crate::error::{TeamError, TeamResult};
use crate::mailbox::Message;
use crate::monitor::{EntityType, EventDraft};
use crate::store::TeamContext;
use crate::tasks::TaskStatus;

use super::engine::{apply_decision, parse_owner_map, weighted_winner};
use super::types::{Debate, DebateStatus, DebateStore, Decision};

/// Arguments for `orchestrate`.
#[derive(Debug, Clone, Default)]
pub struct OrchestrateArgs {
    /// Existing debate to drive; looked up by topic, then created, if absent.
    pub debate_id: Option<String>,
    pub topic: Option<String>,
    pub options: Vec<String>,
    pub members: Vec<String>,
    pub decider: Option<String>,
    pub task_id: Option<String>,
    /// Remind members without a position instead of failing.
    pub send_reminders: bool,
    pub status_on_apply: Option<TaskStatus>,
    pub owner_map: Option<String>,
}

/// What one orchestration step did.
#[derive(Debug, Clone)]
pub struct OrchestrateOutcome {
    pub debate: Debate,
    /// Members reminded on this call (empty unless positions were missing).
    pub reminded: Vec<String>,
    /// Whether this call recorded and applied the decision.
    pub decided: bool,
    /// Whether the debate was already applied before this call.
    pub already_applied: bool,
}

/// Drive a debate one step toward applied.
pub fn orchestrate(ctx: &TeamContext, args: OrchestrateArgs) -> TeamResult<OrchestrateOutcome> {
    ctx.store.require_team()?;

    ctx.locked(|| {
        let team = ctx.store.load_team()?;
        let mut debates: DebateStore = ctx
            .store
            .load_json(&ctx.store.debate_file())?
            .unwrap_or_default();

        // Lookup-or-create happens under the lock two contenders share, so
        // a fresh topic is only ever created once.
        let debate_id = match args.debate_id {
            Some(ref id) => {
                if debates.find(id).is_none() {
                    return Err(TeamError::DebateNotFound { id: id.clone() });
                }
                id.clone()
            }
            None => {
                let by_topic = args.topic.as_ref().and_then(|topic| {
                    debates
                        .debates
                        .iter()
                        .find(|d| &d.topic == topic)
                        .map(|d| d.id.clone())
                });
                match by_topic {
                    Some(id) => id,
                    None => {
                        let created = super::engine::open_debate(
                            ctx,
                            &team,
                            &mut debates,
                            super::engine::StartDebateArgs {
                                topic: args.topic.clone().unwrap_or_default(),
                                options: args.options.clone(),
                                members: args.members.clone(),
                                decider: args.decider.clone(),
                                task_id: args.task_id.clone(),
                            },
                        )?;
                        ctx.store
                            .write_json_atomic(&ctx.store.debate_file(), &debates)?;
                        created.id
                    }
                }
            }
        };

        let debate = debates
            .find_mut(&debate_id)
            .ok_or_else(|| TeamError::DebateNotFound {
                id: debate_id.clone(),
            })?;

        match debate.status {
            DebateStatus::Applied => {
                info!(debate = debate.id, "already applied; no-op");
                return Ok(OrchestrateOutcome {
                    debate: debate.clone(),
                    reminded: Vec::new(),
                    decided: false,
                    already_applied: true,
                });
            }
            DebateStatus::Decided => {
                apply_decision(ctx, &team, debate)?;
                let snapshot = debate.clone();
                ctx.store
                    .write_json_atomic(&ctx.store.debate_file(), &debates)?;
                return Ok(OrchestrateOutcome {
                    debate: snapshot,
                    reminded: Vec::new(),
                    decided: true,
                    already_applied: false,
                });
            }
            DebateStatus::Open => {}
        }

        let missing = debate.members_without_position();
        if !missing.is_empty() {
            if !args.send_reminders {
                return Err(TeamError::MissingPositions { members: missing });
            }
            for member in &missing {
                let reminder = Message::direct(
                    &debate.decider,
                    member,
                    &format!(
                        "reminder: debate {} ({}) is waiting on your position",
                        debate.id, debate.topic
                    ),
                );
                ctx.store
                    .append_jsonl(&ctx.store.message_file(), &reminder)?;
                ctx.monitor.emit(
                    EventDraft::new("reminder_sent", EntityType::Message, member)
                        .with_actor(&debate.decider)
                        .with_metadata("debate_id", debate.id.clone()),
                );
            }
            info!(debate = debate.id, count = missing.len(), "reminders sent");
            let snapshot = debate.clone();
            return Ok(OrchestrateOutcome {
                debate: snapshot,
                reminded: missing,
                decided: false,
                already_applied: false,
            });
        }

        // Full slate: decide by weighted vote and apply, all in this lock.
        let (option, total) = weighted_winner(&debate.options, &debate.positions)
            .ok_or_else(|| TeamError::NoPositions {
                debate_id: debate.id.clone(),
            })?;
        let owner_map = args
            .owner_map
            .as_deref()
            .map(parse_owner_map)
            .transpose()?;
        let rationale = format!(
            "weighted vote: '{}' leads with total confidence {:.2} across {} positions",
            option,
            total,
            debate.positions.len()
        );
        debate.decision = Some(Decision {
            option,
            rationale,
            decider: debate.decider.clone(),
            decided_at: Utc::now(),
            applied: false,
            owner_map,
            status_on_apply: args.status_on_apply,
        });
        debate.transition(DebateStatus::Decided)?;
        ctx.monitor.emit(
            EventDraft::new("debate_decided", EntityType::Debate, &debate.id)
                .with_actor(&debate.decider)
                .with_after(serde_json::to_value(&*debate)?),
        );

        apply_decision(ctx, &team, debate)?;
        let snapshot = debate.clone();
        ctx.store
            .write_json_atomic(&ctx.store.debate_file(), &debates)?;
        info!(debate = snapshot.id, "orchestration decided and applied");
        Ok(OrchestrateOutcome {
            debate: snapshot,
            reminded: Vec::new(),
            decided: true,
            already_applied: false,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::engine::add_position;
    use crate::lock::{LockConfig, SystemProcessProbe};
    use crate::mailbox::inbox;
    use crate::monitor::MonitorLogger;
    use crate::registry::{init_team, UNASSIGNED};
    use crate::store::TeamStore;
    use crate::tasks::{add_task, list_tasks, AddTaskArgs};
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: TeamStore,
        monitor: MonitorLogger,
        probe: SystemProcessProbe,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let store = TeamStore::new(dir.path(), "t1").unwrap();
            let fx = Self {
                _dir: dir,
                store,
                monitor: MonitorLogger::disabled(),
                probe: SystemProcessProbe,
            };
            let members: Vec<String> =
                ["lead", "a", "b"].iter().map(|s| s.to_string()).collect();
            init_team(&fx.ctx(), "goal", &members, false).unwrap();
            fx
        }

        fn ctx(&self) -> TeamContext<'_> {
            TeamContext::new(&self.store, LockConfig::default(), &self.probe, &self.monitor)
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn base_args(topic: &str) -> OrchestrateArgs {
        OrchestrateArgs {
            topic: Some(topic.to_string()),
            options: strings(&["x", "y"]),
            members: strings(&["a", "b"]),
            send_reminders: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_call_creates_and_reminds() {
        let fx = Fixture::new();
        let outcome = orchestrate(&fx.ctx(), base_args("pick")).unwrap();
        assert!(!outcome.decided);
        assert_eq!(outcome.reminded, vec!["a", "b"]);
        assert_eq!(outcome.debate.status, DebateStatus::Open);

        let msgs = inbox(&fx.store, "a").unwrap();
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].body.contains("waiting on your position"));
    }

    #[test]
    fn test_repeat_call_finds_debate_by_topic() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let first = orchestrate(&ctx, base_args("pick")).unwrap();
        let second = orchestrate(&ctx, base_args("pick")).unwrap();
        assert_eq!(first.debate.id, second.debate.id);
    }

    #[test]
    fn test_full_slate_decides_and_applies() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let task = add_task(
            &ctx,
            AddTaskArgs {
                title: "pick one".to_string(),
                owner: UNASSIGNED.to_string(),
                status: TaskStatus::Pending,
                depends_on: Vec::new(),
            },
        )
        .unwrap();

        let mut args = base_args("pick");
        args.task_id = Some(task.id.clone());
        args.owner_map = Some("x:a,y:b".to_string());
        let created = orchestrate(&ctx, args.clone()).unwrap();

        add_position(&ctx, &created.debate.id, "a", "x", 0.9, "strong").unwrap();
        add_position(&ctx, &created.debate.id, "b", "y", 0.4, "mild").unwrap();

        let outcome = orchestrate(&ctx, args).unwrap();
        assert!(outcome.decided);
        let decision = outcome.debate.decision.unwrap();
        assert_eq!(decision.option, "x");
        assert!(decision.rationale.contains("0.90"));

        let board = list_tasks(&fx.store).unwrap();
        let task = board.find(&task.id).unwrap();
        assert_eq!(task.owner, "a");
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn test_applied_debate_is_noop_even_with_bad_owner_map() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let created = orchestrate(&ctx, base_args("pick")).unwrap();
        add_position(&ctx, &created.debate.id, "a", "x", 0.9, "r").unwrap();
        add_position(&ctx, &created.debate.id, "b", "x", 0.4, "r").unwrap();
        orchestrate(&ctx, base_args("pick")).unwrap();

        let mut args = base_args("pick");
        args.owner_map = Some("not-an-entry".to_string());
        let outcome = orchestrate(&ctx, args).unwrap();
        assert!(outcome.already_applied);
        assert!(!outcome.decided);
        assert_eq!(outcome.debate.status, DebateStatus::Applied);
    }

    #[test]
    fn test_missing_positions_without_reminders_is_error() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let mut args = base_args("pick");
        args.send_reminders = false;
        let created = super::super::engine::start_debate(
            &ctx,
            super::super::engine::StartDebateArgs {
                topic: "pick".to_string(),
                options: strings(&["x", "y"]),
                members: strings(&["a", "b"]),
                decider: None,
                task_id: None,
            },
        )
        .unwrap();
        args.debate_id = Some(created.id);
        let err = orchestrate(&ctx, args).unwrap_err();
        assert!(matches!(err, TeamError::MissingPositions { .. }));
    }

    #[test]
    fn test_unknown_debate_id_is_error_not_create() {
        let fx = Fixture::new();
        let mut args = base_args("pick");
        args.debate_id = Some("debate-42".to_string());
        let err = orchestrate(&fx.ctx(), args).unwrap_err();
        assert!(matches!(err, TeamError::DebateNotFound { .. }));
    }

    #[test]
    fn test_decided_debate_gets_applied() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let created = orchestrate(&ctx, base_args("pick")).unwrap();
        add_position(&ctx, &created.debate.id, "a", "x", 0.9, "r").unwrap();
        add_position(&ctx, &created.debate.id, "b", "x", 0.4, "r").unwrap();

        super::super::engine::decide_debate(
            &ctx,
            super::super::engine::DecideArgs {
                debate_id: created.debate.id.clone(),
                rationale: "manual".to_string(),
                ..Default::default()
            },
        )
        .unwrap();

        let outcome = orchestrate(&ctx, base_args("pick")).unwrap();
        assert!(outcome.decided);
        assert_eq!(outcome.debate.status, DebateStatus::Applied);
    }
}

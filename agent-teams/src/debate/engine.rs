//! Debate lifecycle: start, position, decide, apply.
//!
//! Deciding and applying are separable steps. A decision records the chosen
//! option and rationale; applying reflects it into the linked task and
//! announces it to the team. Both run inside the same critical section when
//! requested together, so observers never see a decided-but-half-applied
//! state.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{TeamError, TeamResult};
use crate::mailbox::Message;
use crate::monitor::{EntityType, EventDraft, APPLY_COMMAND};
use crate::registry::{suggest, TeamRecord, DEFAULT_DECIDER, UNASSIGNED};
use crate::store::{TeamContext, TeamStore};
use crate::tasks::{TaskBoard, TaskNote, TaskStatus};

use super::types::{Debate, DebateStatus, DebateStore, Decision, Position};

/// Arguments for `start_debate`.
#[derive(Debug, Clone)]
pub struct StartDebateArgs {
    pub topic: String,
    pub options: Vec<String>,
    pub members: Vec<String>,
    pub decider: Option<String>,
    pub task_id: Option<String>,
}

/// Arguments for `decide_debate`.
#[derive(Debug, Clone, Default)]
pub struct DecideArgs {
    pub debate_id: String,
    /// Explicit winner; derived from positions by weighted vote when absent.
    pub option: Option<String>,
    pub rationale: String,
    /// Refuse to decide until every debate member has a position on record.
    pub require_all_positions: bool,
    /// Apply the decision in the same critical section.
    pub apply: bool,
    pub status_on_apply: Option<TaskStatus>,
    /// Raw `option:member,option:member` mapping; parsed only if the debate
    /// is not already applied, so replays with stale arguments stay no-ops.
    pub owner_map: Option<String>,
}

/// Open a new debate.
pub fn start_debate(ctx: &TeamContext, args: StartDebateArgs) -> TeamResult<Debate> {
    ctx.store.require_team()?;
    ctx.locked(|| {
        let team = ctx.store.load_team()?;
        let mut debates: DebateStore = ctx
            .store
            .load_json(&ctx.store.debate_file())?
            .unwrap_or_default();
        let debate = open_debate(ctx, &team, &mut debates, args)?;
        ctx.store
            .write_json_atomic(&ctx.store.debate_file(), &debates)?;
        Ok(debate)
    })
}

/// Validate and append a new debate. Caller holds the lock and persists the
/// store, so lookup-or-create callers can keep the whole step in one
/// critical section.
pub(super) fn open_debate(
    ctx: &TeamContext,
    team: &TeamRecord,
    debates: &mut DebateStore,
    args: StartDebateArgs,
) -> TeamResult<Debate> {
    let options = dedupe_trimmed(&args.options);
    if options.len() < 2 {
        return Err(TeamError::InsufficientOptions {
            got: options.len(),
            need: 2,
        });
    }
    let members = dedupe_trimmed(&args.members);
    if members.len() < 2 {
        return Err(TeamError::InsufficientMembers {
            got: members.len(),
            need: 2,
        });
    }
    for member in &members {
        team.resolve_member(member)?;
    }
    let decider = resolve_decider(team, &members, args.decider.as_deref())?;

    if let Some(ref task_id) = args.task_id {
        let board: TaskBoard = ctx
            .store
            .load_json(&ctx.store.task_file())?
            .unwrap_or_default();
        if board.find(task_id).is_none() {
            return Err(TeamError::TaskNotFound {
                id: task_id.clone(),
            });
        }
    }

    let id = debates.allocate_id();
    let now = Utc::now();
    let debate = Debate {
        id: id.clone(),
        topic: args.topic,
        task_id: args.task_id,
        options,
        members,
        decider,
        status: DebateStatus::Open,
        positions: Vec::new(),
        decision: None,
        created_at: now,
        updated_at: now,
    };
    debates.debates.push(debate.clone());

    ctx.monitor.emit(
        EventDraft::new("debate_started", EntityType::Debate, &id)
            .with_actor(&debate.decider)
            .with_after(serde_json::to_value(&debate)?),
    );
    info!(debate = id, topic = debate.topic, "debate started");
    Ok(debate)
}

/// Record or replace a member's position on an open debate.
pub fn add_position(
    ctx: &TeamContext,
    debate_id: &str,
    member: &str,
    option: &str,
    confidence: f64,
    rationale: &str,
) -> TeamResult<Debate> {
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(TeamError::ConfidenceOutOfRange { value: confidence });
    }

    ctx.store.require_team()?;
    ctx.locked(|| {
        let mut debates: DebateStore = ctx
            .store
            .load_json(&ctx.store.debate_file())?
            .unwrap_or_default();
        let debate = debates
            .find_mut(debate_id)
            .ok_or_else(|| TeamError::DebateNotFound {
                id: debate_id.to_string(),
            })?;

        if debate.status != DebateStatus::Open {
            return Err(TeamError::DebateNotOpen {
                id: debate_id.to_string(),
                status: debate.status.to_string(),
            });
        }
        if !debate.has_member(member) {
            return Err(TeamError::UnknownMember {
                name: member.to_string(),
                suggestions: suggest(member, &debate.members),
            });
        }
        if !debate.has_option(option) {
            return Err(TeamError::UnknownOption {
                debate_id: debate_id.to_string(),
                option: option.to_string(),
                options: debate.options.clone(),
            });
        }

        let position = Position {
            member: member.to_string(),
            option: option.to_string(),
            confidence,
            rationale: rationale.to_string(),
            at: Utc::now(),
        };
        match debate.positions.iter_mut().find(|p| p.member == member) {
            Some(existing) => *existing = position,
            None => debate.positions.push(position),
        }
        debate.updated_at = Utc::now();
        let snapshot = debate.clone();
        ctx.store
            .write_json_atomic(&ctx.store.debate_file(), &debates)?;

        ctx.monitor.emit(
            EventDraft::new("position_recorded", EntityType::Debate, debate_id)
                .with_actor(member)
                .with_metadata("option", option)
                .with_metadata("confidence", confidence),
        );
        info!(debate = debate_id, member, option, confidence, "position recorded");
        Ok(snapshot)
    })
}

/// Decide a debate and optionally apply the decision in the same critical
/// section. Idempotent: an already-applied debate returns unchanged before
/// any argument is even parsed.
pub fn decide_debate(ctx: &TeamContext, args: DecideArgs) -> TeamResult<Debate> {
    ctx.store.require_team()?;
    ctx.locked(|| {
        let team = ctx.store.load_team()?;
        let mut debates: DebateStore = ctx
            .store
            .load_json(&ctx.store.debate_file())?
            .unwrap_or_default();
        let debate = debates
            .find_mut(&args.debate_id)
            .ok_or_else(|| TeamError::DebateNotFound {
                id: args.debate_id.clone(),
            })?;

        match debate.status {
            DebateStatus::Applied => {
                info!(debate = debate.id, "already applied; no-op");
                return Ok(debate.clone());
            }
            DebateStatus::Decided => {
                if !args.apply {
                    info!(debate = debate.id, "already decided; no-op");
                    return Ok(debate.clone());
                }
                // Backfill apply details the original decide call left out.
                let owner_map = args
                    .owner_map
                    .as_deref()
                    .map(parse_owner_map)
                    .transpose()?;
                if let Some(decision) = debate.decision.as_mut() {
                    if decision.owner_map.is_none() {
                        decision.owner_map = owner_map;
                    }
                    if decision.status_on_apply.is_none() {
                        decision.status_on_apply = args.status_on_apply;
                    }
                }
            }
            DebateStatus::Open => {
                if args.require_all_positions {
                    let missing = debate.members_without_position();
                    if !missing.is_empty() {
                        return Err(TeamError::MissingPositions { members: missing });
                    }
                }
                if args.rationale.trim().is_empty() {
                    return Err(TeamError::EmptyRationale);
                }
                let option = match args.option {
                    Some(option) => {
                        if !debate.has_option(&option) {
                            return Err(TeamError::UnknownOption {
                                debate_id: debate.id.clone(),
                                option,
                                options: debate.options.clone(),
                            });
                        }
                        option
                    }
                    None => {
                        let (option, _) = weighted_winner(&debate.options, &debate.positions)
                            .ok_or_else(|| TeamError::NoPositions {
                                debate_id: debate.id.clone(),
                            })?;
                        option
                    }
                };
                let owner_map = args
                    .owner_map
                    .as_deref()
                    .map(parse_owner_map)
                    .transpose()?;

                debate.decision = Some(Decision {
                    option,
                    rationale: args.rationale.clone(),
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
                info!(debate = debate.id, "debate decided");
            }
        }

        if args.apply {
            apply_decision(ctx, &team, debate)?;
        }
        let snapshot = debate.clone();
        ctx.store
            .write_json_atomic(&ctx.store.debate_file(), &debates)?;
        Ok(snapshot)
    })
}

/// Reflect a recorded decision into team state. Caller holds the lock and
/// persists the debate store afterwards.
pub(super) fn apply_decision(
    ctx: &TeamContext,
    team: &TeamRecord,
    debate: &mut Debate,
) -> TeamResult<()> {
    let decision = debate
        .decision
        .clone()
        .ok_or_else(|| TeamError::DecisionMissing {
            debate_id: debate.id.clone(),
        })?;
    if !debate.has_option(&decision.option) {
        return Err(TeamError::CorruptDecision {
            debate_id: debate.id.clone(),
            option: decision.option,
        });
    }
    if let Some(ref map) = decision.owner_map {
        for (key, value) in map {
            if !debate.has_option(key) {
                return Err(TeamError::OwnerMapUnknownOption { key: key.clone() });
            }
            team.resolve_owner(value)?;
        }
    }

    // Stage the board mutation in memory first; it is persisted after the
    // announcement so an IO failure mid-apply leaves the task untouched and
    // the whole step retryable.
    let staged = match debate.task_id {
        Some(ref task_id) => {
            let mut board: TaskBoard = ctx
                .store
                .load_json(&ctx.store.task_file())?
                .unwrap_or_default();
            let task = board.find_mut(task_id).ok_or_else(|| TeamError::TaskNotFound {
                id: task_id.clone(),
            })?;

            let before = serde_json::to_value(&*task)?;
            if let Some(owner) = decision
                .owner_map
                .as_ref()
                .and_then(|m| m.get(&decision.option))
            {
                task.owner = owner.clone();
            }
            task.status = decision.status_on_apply.unwrap_or(TaskStatus::Completed);
            if task.status == TaskStatus::InProgress && task.owner == UNASSIGNED {
                return Err(TeamError::OwnerRequired {
                    id: task_id.clone(),
                });
            }
            let note_text = format!(
                "debate {}: decided '{}' ({})",
                debate.id, decision.option, decision.rationale
            );
            // A retried apply must not stack duplicate notes.
            if !task.notes.iter().any(|n| n.text == note_text) {
                task.notes.push(TaskNote {
                    at: Utc::now(),
                    text: note_text,
                });
            }
            task.updated_at = Utc::now();
            let snapshot = task.clone();
            Some((task_id.clone(), board, before, snapshot))
        }
        None => None,
    };

    // Announce inside the same critical section rather than via the mailbox
    // operation, which would try to retake the lock.
    let announcement = Message::broadcast(
        &decision.decider,
        &format!(
            "debate {} ({}) decided: {} - {}",
            debate.id, debate.topic, decision.option, decision.rationale
        ),
    );
    ctx.store
        .append_jsonl(&ctx.store.message_file(), &announcement)?;

    if let Some((task_id, board, before, snapshot)) = staged {
        ctx.store.write_json_atomic(&ctx.store.task_file(), &board)?;

        ctx.monitor.emit(
            EventDraft::new("task_updated", EntityType::Task, &task_id)
                .with_command(APPLY_COMMAND)
                .with_actor(&decision.decider)
                .with_before(before)
                .with_after(serde_json::to_value(&snapshot)?),
        );
    }

    if let Some(d) = debate.decision.as_mut() {
        d.applied = true;
    }
    debate.transition(DebateStatus::Applied)?;

    ctx.monitor.emit(
        EventDraft::new("decision_applied", EntityType::Debate, &debate.id)
            .with_command(APPLY_COMMAND)
            .with_actor(&decision.decider)
            .with_after(serde_json::to_value(&*debate)?),
    );
    info!(debate = debate.id, option = decision.option, "decision applied");
    Ok(())
}

/// Weighted vote over declared options: each position adds its confidence to
/// its option's total; the highest total wins and ties go to the option
/// declared first.
pub(crate) fn weighted_winner(
    options: &[String],
    positions: &[Position],
) -> Option<(String, f64)> {
    if positions.is_empty() {
        return None;
    }
    let mut best: Option<(String, f64)> = None;
    for option in options {
        let total: f64 = positions
            .iter()
            .filter(|p| &p.option == option)
            .map(|p| p.confidence)
            .sum();
        let replace = match best {
            Some((_, top)) => total > top,
            None => true,
        };
        if replace {
            best = Some((option.clone(), total));
        }
    }
    best
}

/// Parse `option:member,option:member`. Structural checks only; whether keys
/// and values make sense for a particular debate is checked at apply time.
pub(crate) fn parse_owner_map(raw: &str) -> TeamResult<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, value) = entry
            .split_once(':')
            .ok_or_else(|| TeamError::MalformedOwnerMapEntry {
                entry: entry.to_string(),
            })?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(TeamError::MalformedOwnerMapEntry {
                entry: entry.to_string(),
            });
        }
        if map.insert(key.to_string(), value.to_string()).is_some() {
            return Err(TeamError::DuplicateOwnerMapKey {
                key: key.to_string(),
            });
        }
    }
    Ok(map)
}

fn resolve_decider(
    team: &TeamRecord,
    debate_members: &[String],
    requested: Option<&str>,
) -> TeamResult<String> {
    if let Some(name) = requested {
        team.resolve_member(name)?;
        return Ok(name.to_string());
    }
    if team.is_member(DEFAULT_DECIDER) {
        return Ok(DEFAULT_DECIDER.to_string());
    }
    // Checked non-empty by the caller.
    let fallback = debate_members[0].clone();
    warn!(decider = fallback, "no '{DEFAULT_DECIDER}' member; defaulting decider to first participant");
    Ok(fallback)
}

fn dedupe_trimmed(values: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for value in values {
        let value = value.trim();
        if !value.is_empty() && !seen.iter().any(|s| s == value) {
            seen.push(value.to_string());
        }
    }
    seen
}

/// Read-only debate lookup; no lock.
pub fn show_debate(store: &TeamStore, debate_id: &str) -> TeamResult<Debate> {
    store.require_team()?;
    let debates: DebateStore = store.load_json(&store.debate_file())?.unwrap_or_default();
    debates
        .find(debate_id)
        .cloned()
        .ok_or_else(|| TeamError::DebateNotFound {
            id: debate_id.to_string(),
        })
}

/// Read-only snapshot of every debate, in creation order; no lock.
pub fn list_debates(store: &TeamStore) -> TeamResult<Vec<Debate>> {
    store.require_team()?;
    let debates: DebateStore = store.load_json(&store.debate_file())?.unwrap_or_default();
    Ok(debates.debates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::{LockConfig, SystemProcessProbe};
    use crate::mailbox::inbox;
    use crate::monitor::MonitorLogger;
    use crate::registry::init_team;
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

    fn start_basic(ctx: &TeamContext, task_id: Option<&str>) -> Debate {
        start_debate(
            ctx,
            StartDebateArgs {
                topic: "storage backend".to_string(),
                options: strings(&["x", "y"]),
                members: strings(&["a", "b"]),
                decider: None,
                task_id: task_id.map(|s| s.to_string()),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_start_defaults_decider_to_lead() {
        let fx = Fixture::new();
        let debate = start_basic(&fx.ctx(), None);
        assert_eq!(debate.id, "debate-1");
        assert_eq!(debate.decider, "lead");
        assert_eq!(debate.status, DebateStatus::Open);
    }

    #[test]
    fn test_start_rejects_duplicate_options() {
        let fx = Fixture::new();
        let err = start_debate(
            &fx.ctx(),
            StartDebateArgs {
                topic: "t".to_string(),
                options: strings(&["x", "x", " x "]),
                members: strings(&["a", "b"]),
                decider: None,
                task_id: None,
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TeamError::InsufficientOptions { got: 1, need: 2 }
        ));
    }

    #[test]
    fn test_start_rejects_unregistered_member() {
        let fx = Fixture::new();
        let err = start_debate(
            &fx.ctx(),
            StartDebateArgs {
                topic: "t".to_string(),
                options: strings(&["x", "y"]),
                members: strings(&["a", "mallory"]),
                decider: None,
                task_id: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, TeamError::UnknownMember { .. }));
    }

    #[test]
    fn test_start_rejects_missing_linked_task() {
        let fx = Fixture::new();
        let err = start_debate(
            &fx.ctx(),
            StartDebateArgs {
                topic: "t".to_string(),
                options: strings(&["x", "y"]),
                members: strings(&["a", "b"]),
                decider: None,
                task_id: Some("task-9".to_string()),
            },
        )
        .unwrap_err();
        assert!(matches!(err, TeamError::TaskNotFound { .. }));
    }

    #[test]
    fn test_position_replaces_same_member() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let debate = start_basic(&ctx, None);

        add_position(&ctx, &debate.id, "a", "x", 0.3, "first look").unwrap();
        let updated = add_position(&ctx, &debate.id, "a", "y", 0.8, "changed my mind").unwrap();

        assert_eq!(updated.positions.len(), 1);
        assert_eq!(updated.positions[0].option, "y");
        assert!((updated.positions[0].confidence - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_position_validation() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let debate = start_basic(&ctx, None);

        assert!(matches!(
            add_position(&ctx, &debate.id, "a", "z", 0.5, "r").unwrap_err(),
            TeamError::UnknownOption { .. }
        ));
        assert!(matches!(
            add_position(&ctx, &debate.id, "lead", "x", 0.5, "r").unwrap_err(),
            TeamError::UnknownMember { .. }
        ));
        assert!(matches!(
            add_position(&ctx, &debate.id, "a", "x", 1.5, "r").unwrap_err(),
            TeamError::ConfidenceOutOfRange { .. }
        ));
        assert!(matches!(
            add_position(&ctx, &debate.id, "a", "x", f64::NAN, "r").unwrap_err(),
            TeamError::ConfidenceOutOfRange { .. }
        ));
    }

    #[test]
    fn test_position_rejected_once_decided() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let debate = start_basic(&ctx, None);
        add_position(&ctx, &debate.id, "a", "x", 0.9, "r").unwrap();
        decide_debate(
            &ctx,
            DecideArgs {
                debate_id: debate.id.clone(),
                rationale: "r".to_string(),
                ..Default::default()
            },
        )
        .unwrap();

        let err = add_position(&ctx, &debate.id, "b", "y", 0.5, "late").unwrap_err();
        match err {
            TeamError::DebateNotOpen { status, .. } => assert_eq!(status, "decided"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_weighted_winner_prefers_higher_total() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let debate = start_basic(&ctx, None);

        add_position(&ctx, &debate.id, "a", "x", 0.9, "strong").unwrap();
        add_position(&ctx, &debate.id, "b", "y", 0.4, "weak").unwrap();

        let decided = decide_debate(
            &ctx,
            DecideArgs {
                debate_id: debate.id.clone(),
                rationale: "totals".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(decided.status, DebateStatus::Decided);
        assert_eq!(decided.decision.unwrap().option, "x");
    }

    #[test]
    fn test_tie_goes_to_first_declared_option() {
        let positions = vec![
            Position {
                member: "a".to_string(),
                option: "y".to_string(),
                confidence: 0.5,
                rationale: String::new(),
                at: Utc::now(),
            },
            Position {
                member: "b".to_string(),
                option: "x".to_string(),
                confidence: 0.5,
                rationale: String::new(),
                at: Utc::now(),
            },
        ];
        let (winner, total) =
            weighted_winner(&strings(&["x", "y"]), &positions).unwrap();
        assert_eq!(winner, "x");
        assert!((total - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_decide_without_positions_fails() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let debate = start_basic(&ctx, None);

        let err = decide_debate(
            &ctx,
            DecideArgs {
                debate_id: debate.id,
                rationale: "r".to_string(),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, TeamError::NoPositions { .. }));
    }

    #[test]
    fn test_require_all_positions_names_missing_members() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let debate = start_basic(&ctx, None);
        add_position(&ctx, &debate.id, "a", "x", 0.9, "r").unwrap();

        let err = decide_debate(
            &ctx,
            DecideArgs {
                debate_id: debate.id,
                rationale: "r".to_string(),
                require_all_positions: true,
                ..Default::default()
            },
        )
        .unwrap_err();
        match err {
            TeamError::MissingPositions { members } => assert_eq!(members, vec!["b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_rationale_rejected() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let debate = start_basic(&ctx, None);
        add_position(&ctx, &debate.id, "a", "x", 0.9, "r").unwrap();

        let err = decide_debate(
            &ctx,
            DecideArgs {
                debate_id: debate.id,
                rationale: "   ".to_string(),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, TeamError::EmptyRationale));
    }

    #[test]
    fn test_apply_sets_task_owner_and_broadcasts() {
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
        let debate = start_basic(&ctx, Some(&task.id));
        add_position(&ctx, &debate.id, "a", "x", 0.9, "r").unwrap();

        let applied = decide_debate(
            &ctx,
            DecideArgs {
                debate_id: debate.id.clone(),
                rationale: "x wins".to_string(),
                apply: true,
                owner_map: Some("x:a,y:b".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(applied.status, DebateStatus::Applied);
        assert!(applied.decision.as_ref().unwrap().applied);

        let board = list_tasks(&fx.store).unwrap();
        let task = board.find(&task.id).unwrap();
        assert_eq!(task.owner, "a");
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.notes.len(), 1);
        assert!(task.notes[0].text.contains("x"));

        // Everyone saw the announcement.
        let msgs = inbox(&fx.store, "b").unwrap();
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].body.contains("x wins"));
    }

    #[test]
    fn test_replay_after_apply_is_noop_despite_bad_owner_map() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let debate = start_basic(&ctx, None);
        add_position(&ctx, &debate.id, "a", "x", 0.9, "r").unwrap();
        decide_debate(
            &ctx,
            DecideArgs {
                debate_id: debate.id.clone(),
                rationale: "r".to_string(),
                apply: true,
                ..Default::default()
            },
        )
        .unwrap();

        // Malformed owner map would error if parsed; the replay never gets
        // that far.
        let replay = decide_debate(
            &ctx,
            DecideArgs {
                debate_id: debate.id,
                rationale: "r".to_string(),
                apply: true,
                owner_map: Some("garbage-without-colon".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(replay.status, DebateStatus::Applied);
    }

    #[test]
    fn test_retried_apply_does_not_duplicate_task_note() {
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
        let debate = start_basic(&ctx, Some(&task.id));
        add_position(&ctx, &debate.id, "a", "x", 0.9, "r").unwrap();
        decide_debate(
            &ctx,
            DecideArgs {
                debate_id: debate.id.clone(),
                rationale: "x wins".to_string(),
                apply: true,
                ..Default::default()
            },
        )
        .unwrap();

        // Roll the debate store back to decided, as if the process died
        // after the board was persisted but before the debate was.
        let raw = std::fs::read_to_string(fx.store.debate_file()).unwrap();
        let mut debates: DebateStore = serde_json::from_str(&raw).unwrap();
        let record = debates.find_mut(&debate.id).unwrap();
        record.status = DebateStatus::Decided;
        record.decision.as_mut().unwrap().applied = false;
        fx.store
            .write_json_atomic(&fx.store.debate_file(), &debates)
            .unwrap();

        let retried = decide_debate(
            &ctx,
            DecideArgs {
                debate_id: debate.id,
                rationale: "x wins".to_string(),
                apply: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(retried.status, DebateStatus::Applied);

        let board = list_tasks(&fx.store).unwrap();
        let task = board.find(&task.id).unwrap();
        assert_eq!(task.notes.len(), 1);
    }

    #[test]
    fn test_decide_then_apply_later() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let debate = start_basic(&ctx, None);
        add_position(&ctx, &debate.id, "a", "x", 0.9, "r").unwrap();

        let decided = decide_debate(
            &ctx,
            DecideArgs {
                debate_id: debate.id.clone(),
                rationale: "r".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(decided.status, DebateStatus::Decided);

        let applied = decide_debate(
            &ctx,
            DecideArgs {
                debate_id: debate.id,
                rationale: "r".to_string(),
                apply: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(applied.status, DebateStatus::Applied);
    }

    #[test]
    fn test_owner_map_parsing() {
        let map = parse_owner_map("x:a, y:b").unwrap();
        assert_eq!(map.get("x").map(String::as_str), Some("a"));
        assert_eq!(map.get("y").map(String::as_str), Some("b"));

        assert!(matches!(
            parse_owner_map("x:a,x:b").unwrap_err(),
            TeamError::DuplicateOwnerMapKey { .. }
        ));
        assert!(matches!(
            parse_owner_map("nocolon").unwrap_err(),
            TeamError::MalformedOwnerMapEntry { .. }
        ));
        assert!(matches!(
            parse_owner_map("x:").unwrap_err(),
            TeamError::MalformedOwnerMapEntry { .. }
        ));
    }

    #[test]
    fn test_apply_rejects_owner_map_key_outside_options() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let debate = start_basic(&ctx, None);
        add_position(&ctx, &debate.id, "a", "x", 0.9, "r").unwrap();

        let err = decide_debate(
            &ctx,
            DecideArgs {
                debate_id: debate.id,
                rationale: "r".to_string(),
                apply: true,
                owner_map: Some("z:a".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, TeamError::OwnerMapUnknownOption { .. }));
    }

    #[test]
    fn test_apply_rejects_unregistered_owner_map_value() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let debate = start_basic(&ctx, None);
        add_position(&ctx, &debate.id, "a", "x", 0.9, "r").unwrap();

        let err = decide_debate(
            &ctx,
            DecideArgs {
                debate_id: debate.id,
                rationale: "r".to_string(),
                apply: true,
                owner_map: Some("x:mallory".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, TeamError::UnknownMember { .. }));
    }

    #[test]
    fn test_explicit_option_overrides_vote() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let debate = start_basic(&ctx, None);
        add_position(&ctx, &debate.id, "a", "x", 0.9, "r").unwrap();

        let decided = decide_debate(
            &ctx,
            DecideArgs {
                debate_id: debate.id,
                option: Some("y".to_string()),
                rationale: "overruled".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(decided.decision.unwrap().option, "y");
    }
}

//! Team registry: identity, membership, and lifecycle.
//!
//! Identifier validation is a security invariant rather than cosmetics, since
//! team and member names address storage paths. Init is idempotent; reset
//! discards and re-seeds shared state; recovery rebuilds a consistent
//! baseline when files are structurally invalid, without requiring a reset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::debate::DebateStore;
use crate::error::{TeamError, TeamResult};
use crate::monitor::{EntityType, EventDraft};
use crate::store::{TeamContext, TeamStore};
use crate::tasks::TaskBoard;

/// Sentinel owner for tasks nobody has claimed.
pub const UNASSIGNED: &str = "unassigned";

/// Conventional decider identity for debates.
pub const DEFAULT_DECIDER: &str = "lead";

/// Durable record of a team's identity and roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRecord {
    pub team_name: String,
    pub goal: String,
    pub members: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl TeamRecord {
    pub fn is_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m == name)
    }

    /// Resolve a name that must be a registered member.
    pub fn resolve_member(&self, name: &str) -> TeamResult<()> {
        if self.is_member(name) {
            Ok(())
        } else {
            Err(TeamError::UnknownMember {
                name: name.to_string(),
                suggestions: suggest(name, &self.members),
            })
        }
    }

    /// Resolve a task-owner field: a registered member or `unassigned`.
    pub fn resolve_owner(&self, name: &str) -> TeamResult<()> {
        if name == UNASSIGNED {
            Ok(())
        } else {
            self.resolve_member(name)
        }
    }
}

/// Names a team directory may never take: files that live directly under
/// the storage root beside the team subtrees.
const RESERVED_NAMES: &[&str] = &[crate::monitor::MONITOR_LOG_FILE];

/// Validate a team or member identifier.
///
/// Rejects anything that could escape or mangle a storage path: separators,
/// `.`/`..`, whitespace, control characters, and names reserved for files
/// stored beside the team directories.
pub fn validate_identifier(value: &str) -> TeamResult<()> {
    let reject = |reason: &str| {
        Err(TeamError::InvalidIdentifier {
            value: value.to_string(),
            reason: reason.to_string(),
        })
    };
    if value.is_empty() {
        return reject("must not be empty");
    }
    if value == "." || value == ".." {
        return reject("must not be a relative path component");
    }
    if value.contains('/') || value.contains('\\') {
        return reject("must not contain path separators");
    }
    if value.chars().any(|c| c.is_whitespace()) {
        return reject("must not contain whitespace");
    }
    if value.chars().any(|c| c.is_control()) {
        return reject("must not contain control characters");
    }
    if RESERVED_NAMES.contains(&value) {
        return reject("is reserved for storage files");
    }
    Ok(())
}

/// Typo suggestions from the roster, closest first.
pub fn suggest(name: &str, roster: &[String]) -> Vec<String> {
    let mut scored: Vec<(usize, &String)> = roster
        .iter()
        .map(|candidate| (levenshtein(name, candidate), candidate))
        .filter(|(d, candidate)| *d <= suggestion_cutoff(name, candidate))
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    scored.into_iter().take(3).map(|(_, c)| c.clone()).collect()
}

fn suggestion_cutoff(a: &str, b: &str) -> usize {
    (a.chars().count().max(b.chars().count()) / 3).max(2)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut prev = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            let next = (prev + cost).min(row[j] + 1).min(row[j + 1] + 1);
            prev = row[j + 1];
            row[j + 1] = next;
        }
    }
    row[b.len()]
}

/// Result of an init call.
#[derive(Debug, Clone)]
pub struct InitOutcome {
    pub record: TeamRecord,
    /// Whether the team was created (or re-seeded by reset) on this call.
    pub created: bool,
    /// Whether structurally invalid state was rebuilt.
    pub recovered: bool,
}

/// Initialize a team, idempotently.
///
/// Absent state is created. Present state is returned untouched unless
/// `reset` is set, in which case tasks, mailbox, and debates are discarded
/// and re-seeded. Structurally invalid files are rebuilt to a consistent
/// baseline either way.
pub fn init_team(
    ctx: &TeamContext,
    goal: &str,
    members: &[String],
    reset: bool,
) -> TeamResult<InitOutcome> {
    let members = dedupe(members);
    if members.is_empty() {
        return Err(TeamError::InsufficientMembers { got: 0, need: 1 });
    }
    for member in &members {
        validate_identifier(member)?;
    }

    ctx.locked(|| {
        let store = ctx.store;
        let mut recovered = false;

        let existing = match store.load_json::<TeamRecord>(&store.team_file()) {
            Ok(existing) => existing,
            Err(TeamError::MalformedState { path, reason }) => {
                warn!(path = %path.display(), reason, "team record unreadable; rebuilding");
                recovered = true;
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(record) = existing {
            if !reset {
                let repaired = ensure_baseline(store)?;
                if repaired {
                    ctx.monitor.emit(
                        EventDraft::new("team_recovered", EntityType::Team, &record.team_name)
                            .with_metadata("repaired", true),
                    );
                }
                info!(team = record.team_name, "init is a no-op; team already exists");
                return Ok(InitOutcome {
                    record,
                    created: false,
                    recovered: repaired,
                });
            }
        }

        let record = TeamRecord {
            team_name: store.team_name().to_string(),
            goal: goal.to_string(),
            members,
            created_at: Utc::now(),
        };
        store.write_json_atomic(&store.team_file(), &record)?;

        if reset || recovered {
            // Discard (reset) or rebuild (recovery) the shared state.
            seed_baseline(store, reset)?;
        } else {
            store.write_json_atomic(&store.task_file(), &TaskBoard::default())?;
            store.write_json_atomic(&store.debate_file(), &DebateStore::default())?;
            store.touch(&store.message_file())?;
        }

        let event_type = if reset { "team_reset" } else { "team_initialized" };
        ctx.monitor.emit(
            EventDraft::new(event_type, EntityType::Team, &record.team_name)
                .with_after(serde_json::to_value(&record)?),
        );
        info!(team = record.team_name, reset, recovered, "team initialized");
        Ok(InitOutcome {
            record,
            created: true,
            recovered,
        })
    })
}

/// Rebuild any subsidiary file that is missing or unparseable. Returns
/// whether anything was repaired. Files that parse are left untouched.
fn ensure_baseline(store: &TeamStore) -> TeamResult<bool> {
    let mut repaired = false;
    if needs_rebuild::<TaskBoard>(store, &store.task_file())? {
        store.write_json_atomic(&store.task_file(), &TaskBoard::default())?;
        repaired = true;
    }
    if needs_rebuild::<DebateStore>(store, &store.debate_file())? {
        store.write_json_atomic(&store.debate_file(), &DebateStore::default())?;
        repaired = true;
    }
    if !store.message_file().exists() {
        store.touch(&store.message_file())?;
        repaired = true;
    }
    Ok(repaired)
}

/// Seed fresh state. On reset the mailbox log is truncated too; on recovery
/// parseable files survive.
fn seed_baseline(store: &TeamStore, reset: bool) -> TeamResult<()> {
    if reset {
        store.write_json_atomic(&store.task_file(), &TaskBoard::default())?;
        store.write_json_atomic(&store.debate_file(), &DebateStore::default())?;
        std::fs::write(store.message_file(), "")?;
    } else {
        ensure_baseline(store)?;
    }
    Ok(())
}

fn needs_rebuild<T: serde::de::DeserializeOwned>(
    store: &TeamStore,
    path: &std::path::Path,
) -> TeamResult<bool> {
    match store.load_json::<T>(path) {
        Ok(Some(_)) => Ok(false),
        Ok(None) => Ok(true),
        Err(TeamError::MalformedState { path, reason }) => {
            warn!(path = %path.display(), reason, "state file unreadable; rebuilding baseline");
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

fn dedupe(members: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for member in members {
        let member = member.trim();
        if !member.is_empty() && !seen.iter().any(|s| s == member) {
            seen.push(member.to_string());
        }
    }
    seen
}

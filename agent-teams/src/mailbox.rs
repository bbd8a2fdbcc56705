//! Team mailbox.
//!
//! An append-only jsonl log of direct and broadcast messages, scoped per
//! team. Records are immutable once appended; ordering is append order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::TeamResult;
use crate::monitor::{EntityType, EventDraft};
use crate::store::{TeamContext, TeamStore};

/// Address used for broadcast records.
pub const BROADCAST_TARGET: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Direct,
    Broadcast,
}

/// One mailbox record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub from: String,
    pub to: String,
    pub body: String,
}

impl Message {
    pub fn direct(from: &str, to: &str, body: &str) -> Self {
        Self {
            at: Utc::now(),
            kind: MessageKind::Direct,
            from: from.to_string(),
            to: to.to_string(),
            body: body.to_string(),
        }
    }

    pub fn broadcast(from: &str, body: &str) -> Self {
        Self {
            at: Utc::now(),
            kind: MessageKind::Broadcast,
            from: from.to_string(),
            to: BROADCAST_TARGET.to_string(),
            body: body.to_string(),
        }
    }

    /// Whether this record lands in `member`'s inbox.
    pub fn addressed_to(&self, member: &str) -> bool {
        self.kind == MessageKind::Broadcast || self.to == member
    }
}

/// Send a direct message between registered members.
pub fn send_message(ctx: &TeamContext, from: &str, to: &str, body: &str) -> TeamResult<Message> {
    ctx.store.require_team()?;
    ctx.locked(|| {
        let team = ctx.store.load_team()?;
        team.resolve_member(from)?;
        team.resolve_member(to)?;

        let message = Message::direct(from, to, body);
        ctx.store
            .append_jsonl(&ctx.store.message_file(), &message)?;

        ctx.monitor.emit(
            EventDraft::new("message_sent", EntityType::Message, to)
                .with_actor(from)
                .with_after(serde_json::to_value(&message)?),
        );
        info!(from, to, "message sent");
        Ok(message)
    })
}

/// Broadcast to every member.
pub fn broadcast(ctx: &TeamContext, from: &str, body: &str) -> TeamResult<Message> {
    ctx.store.require_team()?;
    ctx.locked(|| {
        let team = ctx.store.load_team()?;
        team.resolve_member(from)?;

        let message = Message::broadcast(from, body);
        ctx.store
            .append_jsonl(&ctx.store.message_file(), &message)?;

        ctx.monitor.emit(
            EventDraft::new("broadcast_sent", EntityType::Message, BROADCAST_TARGET)
                .with_actor(from)
                .with_after(serde_json::to_value(&message)?),
        );
        info!(from, "broadcast sent");
        Ok(message)
    })
}

/// Read a member's inbox, oldest first. Read-only; no lock. Lines that fail
/// to parse are skipped with a warning rather than poisoning the whole read.
pub fn inbox(store: &TeamStore, member: &str) -> TeamResult<Vec<Message>> {
    store.require_team()?;
    let team = store.load_team()?;
    team.resolve_member(member)?;

    let path = store.message_file();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(&path)?;
    let mut messages = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Message>(line) {
            Ok(message) => {
                if message.addressed_to(member) {
                    messages.push(message);
                }
            }
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "skipping unparseable mailbox line");
            }
        }
    }
    Ok(messages)
}

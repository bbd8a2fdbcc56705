//! Offline report over a monitor log.
//!
//! Parses leniently: the log may have been written by several processes over
//! time, so a bad line is counted rather than fatal, and events for other
//! teams are tallied separately instead of being mixed in.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::error::TeamResult;

/// Summary of one team's slice of a monitor log.
#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub team: String,
    /// Well-formed events for this team.
    pub valid: usize,
    /// Lines that failed to parse or were missing required fields.
    pub invalid: usize,
    /// Well-formed events for other teams.
    pub foreign: usize,
    pub events_by_type: BTreeMap<String, usize>,
    /// Seconds from `debate_started` to `decision_applied`, per debate.
    pub decision_latencies: Vec<(String, f64)>,
}

impl std::fmt::Display for MonitorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "monitor report for team '{}'", self.team)?;
        writeln!(
            f,
            "  events: {} valid, {} invalid, {} foreign",
            self.valid, self.invalid, self.foreign
        )?;
        for (event_type, count) in &self.events_by_type {
            writeln!(f, "  {event_type}: {count}")?;
        }
        for (debate_id, secs) in &self.decision_latencies {
            writeln!(f, "  {debate_id}: decided and applied in {secs:.1}s")?;
        }
        Ok(())
    }
}

/// Fields every well-formed event carries.
const REQUIRED_FIELDS: &[&str] = &[
    "at",
    "event_type",
    "command",
    "team_name",
    "entity_type",
    "entity_id",
];

/// Build a report for `team` from the log at `path`. A missing log yields an
/// empty report rather than an error.
pub fn build_report(path: &Path, team: &str) -> TeamResult<MonitorReport> {
    let mut report = MonitorReport {
        team: team.to_string(),
        valid: 0,
        invalid: 0,
        foreign: 0,
        events_by_type: BTreeMap::new(),
        decision_latencies: Vec::new(),
    };
    if !path.exists() {
        return Ok(report);
    }

    let mut debate_starts: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
    let raw = std::fs::read_to_string(path)?;
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => {
                report.invalid += 1;
                continue;
            }
        };
        let at = match value["at"].as_str().and_then(parse_timestamp) {
            Some(at) if is_well_formed(&value) => at,
            _ => {
                report.invalid += 1;
                continue;
            }
        };
        if value["team_name"].as_str() != Some(team) {
            report.foreign += 1;
            continue;
        }
        report.valid += 1;

        let event_type = value["event_type"].as_str().unwrap_or_default().to_string();
        *report.events_by_type.entry(event_type.clone()).or_insert(0) += 1;

        let entity_id = value["entity_id"].as_str().unwrap_or_default();
        match event_type.as_str() {
            "debate_started" => {
                debate_starts.entry(entity_id.to_string()).or_insert(at);
            }
            "decision_applied" => {
                if let Some(started) = debate_starts.get(entity_id) {
                    let secs = (at - *started).num_milliseconds() as f64 / 1000.0;
                    report
                        .decision_latencies
                        .push((entity_id.to_string(), secs.max(0.0)));
                }
            }
            _ => {}
        }
    }
    Ok(report)
}

fn is_well_formed(value: &Value) -> bool {
    value.is_object()
        && REQUIRED_FIELDS
            .iter()
            .all(|field| value.get(field).and_then(Value::as_str).is_some())
}

/// Accept RFC 3339 (with `Z` or an offset) and bare naive timestamps, which
/// are read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

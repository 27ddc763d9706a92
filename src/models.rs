//! Data models for result aggregation and publishing.
//!
//! This module contains the outcome tree built during a run, the
//! outcome values stored in it, and the record shapes exchanged with
//! the remote record store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Key under which the aggregated results are stored.
pub const RECORD_KEY: &str = "trento-results";

/// Value type declared for the stored results.
pub const RECORD_TYPE: &str = "json";

/// Result of evaluating one check on one host.
///
/// Booleans map onto `Pass`/`Fail` and the literal `"skipped"` onto
/// `Skipped`; any other value is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Outcome {
    Pass,
    Fail,
    Skipped,
    Other(Value),
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(true) => Outcome::Pass,
            Value::Bool(false) => Outcome::Fail,
            Value::String(ref s) if s == "skipped" => Outcome::Skipped,
            other => Outcome::Other(other),
        }
    }
}

impl From<Outcome> for Value {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Pass => Value::Bool(true),
            Outcome::Fail => Value::Bool(false),
            Outcome::Skipped => Value::String("skipped".to_string()),
            Outcome::Other(value) => value,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => write!(f, "pass"),
            Outcome::Fail => write!(f, "fail"),
            Outcome::Skipped => write!(f, "skipped"),
            Outcome::Other(value) => write!(f, "{}", value),
        }
    }
}

impl Outcome {
    /// Returns an emoji representation of the outcome.
    pub fn emoji(&self) -> &'static str {
        match self {
            Outcome::Pass => "✅",
            Outcome::Fail => "❌",
            Outcome::Skipped => "⏭️",
            Outcome::Other(_) => "❔",
        }
    }
}

/// Outcome stored for a single host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostOutcome {
    pub result: Outcome,
}

/// Per-check results, keyed by host name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckRecord {
    #[serde(default)]
    pub hosts: BTreeMap<String, HostOutcome>,
}

/// Per-group results, keyed by check identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    #[serde(default)]
    pub checks: BTreeMap<String, CheckRecord>,
}

/// Nested `group → check → host → outcome` mapping for one run.
///
/// Serializes to the document stored remotely:
/// `{"results": {group: {"checks": {check: {"hosts": {host: {"result": ..}}}}}}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeTree {
    #[serde(default)]
    results: BTreeMap<String, GroupRecord>,
}

impl OutcomeTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures the group exists. Calling it again is a no-op.
    pub fn initialize_group(&mut self, group: &str) {
        self.results.entry(group.to_string()).or_default();
    }

    /// Records `outcome` for the triple, creating the group and check
    /// when missing. Any previous outcome for the triple is replaced.
    pub fn add_result(&mut self, group: &str, check: &str, host: &str, outcome: Outcome) {
        self.results
            .entry(group.to_string())
            .or_default()
            .checks
            .entry(check.to_string())
            .or_default()
            .hosts
            .insert(host.to_string(), HostOutcome { result: outcome });
    }

    pub fn contains_group(&self, group: &str) -> bool {
        self.results.contains_key(group)
    }

    #[allow(dead_code)] // Convenience accessor
    pub fn group(&self, group: &str) -> Option<&GroupRecord> {
        self.results.get(group)
    }

    /// Iterate groups in name order.
    pub fn groups(&self) -> impl Iterator<Item = (&String, &GroupRecord)> {
        self.results.iter()
    }

    /// Look up the outcome for one triple.
    pub fn outcome(&self, group: &str, check: &str, host: &str) -> Option<&Outcome> {
        self.results
            .get(group)?
            .checks
            .get(check)?
            .hosts
            .get(host)
            .map(|h| &h.result)
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Total number of stored `(group, check, host)` outcomes.
    pub fn outcome_count(&self) -> usize {
        self.results
            .values()
            .flat_map(|g| g.checks.values())
            .map(|c| c.hosts.len())
            .sum()
    }

    /// Serialize the tree into the document published to the store.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// Opaque run identifier assigned by the orchestration engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunToken(pub String);

impl fmt::Display for RunToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the run that owns records in the store (ARA playbook id).
pub type OwnerId = u64;

/// Identifier of a stored record.
pub type RecordId = u64;

/// A record as held by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: RecordId,
    #[serde(rename = "playbook")]
    pub owner: OwnerId,
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(rename = "type")]
    pub record_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

/// Body of a create request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRecord {
    #[serde(rename = "playbook")]
    pub owner: OwnerId,
    pub key: String,
    pub value: Value,
    #[serde(rename = "type")]
    pub record_type: String,
}

/// Body of an update request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordUpdate {
    pub key: String,
    pub value: Value,
    #[serde(rename = "type")]
    pub record_type: String,
}

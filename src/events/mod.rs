//! Engine events and variable lookup.
//!
//! Lifecycle signals from the orchestration engine are normalized here
//! into [`EngineEvent`]s. Reserved task markers are turned into a tagged
//! [`TaskKind`] by the classifier so the aggregator never compares
//! action or task names itself.

pub mod classify;
pub mod replay;

pub use classify::{classify, TaskKind};
pub use replay::EventLog;

use crate::error::AggregateError;
use crate::models::RunToken;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Variable mapping as resolved by the engine.
pub type Vars = serde_json::Map<String, Value>;

/// Per-host variable listing the groups a host belongs to.
pub const GROUP_NAMES: &str = "group_names";

/// Play-scope variable holding every host's variables.
pub const HOSTVARS: &str = "hostvars";

/// Per-host variable naming the check being evaluated.
pub const EXTERNAL_ID: &str = "external_id";

/// Play-scope variable holding the run labels.
pub const TEST_LABEL_KEY: &str = "ara_playbook_labels";

/// Label that marks a run as a verification run.
pub const TEST_LABEL: &str = "test";

/// Identity of a task as reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRef {
    /// Engine-assigned task identifier.
    #[serde(default)]
    pub uuid: String,
    /// Action (module) name, e.g. `set_fact`.
    #[serde(default)]
    pub action: String,
    /// Declared task name.
    #[serde(default)]
    pub name: String,
    /// Arguments the task was invoked with.
    #[serde(default)]
    pub args: Vars,
}

/// How a task finished on a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Ok,
    Failed,
}

/// A task-completion event for one host.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvent {
    pub host: String,
    pub task: TaskRef,
    pub status: TaskStatus,
    /// Result payload; `Null` when the engine reported none.
    pub result: Value,
}

/// Lifecycle signal delivered by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    RunStart { playbook: Option<String> },
    PlayStart { run_token: RunToken },
    Task(TaskEvent),
    RunEnd,
}

impl EngineEvent {
    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::RunStart { .. } => "run start",
            EngineEvent::PlayStart { .. } => "play start",
            EngineEvent::Task(_) => "task completion",
            EngineEvent::RunEnd => "run end",
        }
    }
}

/// Resolves engine variables.
///
/// `play_vars` returns play-scope variables (including `hostvars`);
/// `task_vars` returns the variables merged for one host in the context
/// of one task, the way the engine resolves host and group vars.
pub trait VarLookup {
    fn play_vars(&self) -> Result<Vars, AggregateError>;

    fn task_vars(&self, host: &str, task: &TaskRef) -> Result<Vars, AggregateError>;
}

/// Read `group_names` from a host's variables.
pub fn group_names(vars: &Vars, host: &str) -> Result<Vec<String>, AggregateError> {
    let groups = vars
        .get(GROUP_NAMES)
        .and_then(Value::as_array)
        .ok_or_else(|| AggregateError::malformed(host, GROUP_NAMES))?;

    groups
        .iter()
        .map(|g| {
            g.as_str()
                .map(String::from)
                .ok_or_else(|| AggregateError::malformed(host, GROUP_NAMES))
        })
        .collect()
}

/// Every group referenced by any host in the play's `hostvars` snapshot.
///
/// Hosts without `group_names` contribute nothing.
pub fn membership_groups(play_vars: &Vars) -> BTreeSet<String> {
    let Some(hostvars) = play_vars.get(HOSTVARS).and_then(Value::as_object) else {
        return BTreeSet::new();
    };

    hostvars
        .values()
        .filter_map(|host| host.get(GROUP_NAMES).and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_str)
        .map(String::from)
        .collect()
}

/// Whether the run labels include `label`.
///
/// Labels may be a list of strings or one comma-separated string.
pub fn has_label(play_vars: &Vars, label: &str) -> bool {
    match play_vars.get(TEST_LABEL_KEY) {
        Some(Value::Array(labels)) => labels.iter().any(|l| l.as_str() == Some(label)),
        Some(Value::String(labels)) => labels.split(',').any(|l| l.trim() == label),
        _ => false,
    }
}

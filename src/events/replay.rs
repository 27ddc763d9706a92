//! JSON-lines engine event log.
//!
//! The orchestration engine writes one JSON object per line, tagged by
//! `event`. Replaying the log yields [`EngineEvent`]s in order while
//! recording the variables each line carries, so the aggregator can
//! resolve them through [`VarLookup`] exactly as it would against a live
//! engine.

use super::{EngineEvent, TaskEvent, TaskRef, TaskStatus, VarLookup, Vars, HOSTVARS};
use crate::error::{AggregateError, EventLogError};
use crate::models::RunToken;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum LogEntry {
    RunStart {
        #[serde(default)]
        playbook: Option<String>,
    },
    PlayStart {
        play_uuid: String,
        #[serde(default)]
        vars: Vars,
    },
    TaskOk(TaskEntry),
    TaskFailed(TaskEntry),
    RunEnd,
}

#[derive(Debug, Clone, Deserialize)]
struct TaskEntry {
    host: String,
    task: TaskRef,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    vars: Vars,
}

/// A parsed engine event log.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: Vec<LogEntry>,
}

impl EventLog {
    /// Read and parse a log file.
    pub fn open(path: &Path) -> Result<Self, EventLogError> {
        let content = std::fs::read_to_string(path).map_err(|source| EventLogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse log content. Blank lines are skipped; line numbers in errors
    /// are 1-based.
    pub fn parse(content: &str) -> Result<Self, EventLogError> {
        let mut entries = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let entry = serde_json::from_str(line).map_err(|source| EventLogError::InvalidLine {
                line: index + 1,
                source,
            })?;
            entries.push(entry);
        }

        debug!("Parsed {} events", entries.len());
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_replay(self) -> Replay {
        Replay {
            entries: self.entries.into_iter(),
            vars: RecordedVars::default(),
        }
    }
}

/// Ordered replay over an [`EventLog`].
pub struct Replay {
    entries: std::vec::IntoIter<LogEntry>,
    vars: RecordedVars,
}

impl Replay {
    /// Next event, with its variables recorded before it is returned.
    pub fn next_event(&mut self) -> Option<EngineEvent> {
        let entry = self.entries.next()?;

        let event = match entry {
            LogEntry::RunStart { playbook } => EngineEvent::RunStart { playbook },
            LogEntry::PlayStart { play_uuid, vars } => {
                self.vars.play = vars;
                EngineEvent::PlayStart {
                    run_token: RunToken(play_uuid),
                }
            }
            LogEntry::TaskOk(task) => self.task_event(task, TaskStatus::Ok),
            LogEntry::TaskFailed(task) => self.task_event(task, TaskStatus::Failed),
            LogEntry::RunEnd => EngineEvent::RunEnd,
        };

        Some(event)
    }

    /// Variables recorded so far.
    pub fn vars(&self) -> &RecordedVars {
        &self.vars
    }

    fn task_event(&mut self, entry: TaskEntry, status: TaskStatus) -> EngineEvent {
        // each line replaces what an earlier line for the same task recorded
        self.vars
            .tasks
            .insert((entry.host.clone(), entry.task.uuid.clone()), entry.vars);

        EngineEvent::Task(TaskEvent {
            host: entry.host,
            task: entry.task,
            status,
            result: entry.result,
        })
    }
}

/// Variables captured from an event log.
///
/// Task variables are the host's entry in the play's `hostvars` overlaid
/// with whatever the task line itself carried.
#[derive(Debug, Clone, Default)]
pub struct RecordedVars {
    play: Vars,
    tasks: HashMap<(String, String), Vars>,
}

impl VarLookup for RecordedVars {
    fn play_vars(&self) -> Result<Vars, AggregateError> {
        Ok(self.play.clone())
    }

    fn task_vars(&self, host: &str, task: &TaskRef) -> Result<Vars, AggregateError> {
        let mut vars = self
            .play
            .get(HOSTVARS)
            .and_then(|h| h.get(host))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        if let Some(task_vars) = self.tasks.get(&(host.to_string(), task.uuid.clone())) {
            vars.extend(task_vars.clone());
        }

        Ok(vars)
    }
}

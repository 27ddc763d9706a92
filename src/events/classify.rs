//! Task event classification.
//!
//! Two reserved `(action, name)` pairs mark the events the aggregator
//! cares about; everything else is noise.

use super::{TaskEvent, TaskStatus};
use crate::error::AggregateError;
use crate::models::Outcome;
use serde_json::Value;
use std::path::PathBuf;

pub const SET_FACT_ACTION: &str = "set_fact";
pub const INCLUDE_ROLE_ACTION: &str = "include_role";

/// Declared name of the step that records a check's outcome.
pub const TEST_RESULT_TASK_NAME: &str = "set_test_result";

/// Declared name of the loop that includes every selected check.
pub const TEST_INCLUDE_TASK_NAME: &str = "run_checks";

/// Argument of the outcome step holding the declared result.
pub const TEST_RESULT_ARG: &str = "test_result";

/// What a task event means to the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskKind {
    /// A recorded check outcome for the reporting host.
    TestOutcome(Outcome),
    /// Definition roots of the checks the include loop skipped.
    SkippedChecks(Vec<PathBuf>),
    /// Not relevant.
    Ignored,
}

pub fn is_test_outcome(event: &TaskEvent) -> bool {
    event.task.action == SET_FACT_ACTION && event.task.name == TEST_RESULT_TASK_NAME
}

pub fn is_check_include_loop(event: &TaskEvent) -> bool {
    event.task.action == INCLUDE_ROLE_ACTION && event.task.name == TEST_INCLUDE_TASK_NAME
}

/// Tag a task event, extracting the fields its kind requires.
///
/// A failed outcome step always yields `Fail`, whatever its payload.
/// Include loops are only inspected when they succeeded.
pub fn classify(event: &TaskEvent) -> Result<TaskKind, AggregateError> {
    if is_check_include_loop(event) {
        if event.status == TaskStatus::Failed {
            return Ok(TaskKind::Ignored);
        }
        return skipped_checks(event).map(TaskKind::SkippedChecks);
    }

    if is_test_outcome(event) {
        let outcome = match event.status {
            TaskStatus::Failed => Outcome::Fail,
            TaskStatus::Ok => event
                .task
                .args
                .get(TEST_RESULT_ARG)
                .cloned()
                .map(Outcome::from)
                .ok_or_else(|| AggregateError::malformed(&event.host, TEST_RESULT_ARG))?,
        };
        return Ok(TaskKind::TestOutcome(outcome));
    }

    Ok(TaskKind::Ignored)
}

fn skipped_checks(event: &TaskEvent) -> Result<Vec<PathBuf>, AggregateError> {
    let items = event
        .result
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| AggregateError::malformed(&event.host, "results"))?;

    items
        .iter()
        .filter(|item| item.get("skipped").and_then(Value::as_bool).unwrap_or(false))
        .map(|item| {
            item.pointer("/check_item/path")
                .and_then(Value::as_str)
                .map(PathBuf::from)
                .ok_or_else(|| AggregateError::malformed(&event.host, "check_item.path"))
        })
        .collect()
}

//! Run aggregation.
//!
//! The aggregator consumes one run's lifecycle events in delivery order
//! and folds check outcomes into an [`OutcomeTree`]:
//!
//! ```text
//! Idle --run start--> RunStarted --play start--> GroupActive --run end--> Finished
//!                                                 |  ^
//!                                                 +--+ play start / task completion
//! ```
//!
//! At run end the label gate decides whether the tree is handed over for
//! publishing or discarded.

use crate::checks::resolve_check_id;
use crate::error::AggregateError;
use crate::events::{
    classify, group_names, has_label, membership_groups, EngineEvent, EventLog, TaskEvent,
    TaskKind, VarLookup, Vars, EXTERNAL_ID, TEST_LABEL,
};
use crate::models::{Outcome, OutcomeTree, RunToken};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, warn};

/// Position of the aggregator in the run lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    RunStarted,
    GroupActive,
    Finished,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::RunStarted => write!(f, "run started"),
            RunState::GroupActive => write!(f, "group active"),
            RunState::Finished => write!(f, "finished"),
        }
    }
}

/// A completed run ready to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedRun {
    pub run_token: RunToken,
    pub tree: OutcomeTree,
}

/// What happened when the run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunCompletion {
    /// The gate passed; the tree should be published.
    Publish(FinishedRun),
    /// Not a verification run; the tree was discarded.
    GateSkipped,
    /// The event stream stopped before the run ended.
    Unfinished(RunState),
}

/// Folds one run's events into an outcome tree.
#[derive(Debug)]
pub struct RunAggregator {
    state: RunState,
    tree: OutcomeTree,
    run_token: Option<RunToken>,
}

#[allow(dead_code)] // Tests build aggregators with default()
impl Default for RunAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl RunAggregator {
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
            tree: OutcomeTree::new(),
            run_token: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// The tree built so far.
    #[allow(dead_code)] // Inspection accessor
    pub fn tree(&self) -> &OutcomeTree {
        &self.tree
    }

    /// Dispatch one lifecycle event.
    ///
    /// Returns the run's completion once the run-end event is handled.
    pub fn handle<V: VarLookup>(
        &mut self,
        event: EngineEvent,
        vars: &V,
    ) -> Result<Option<RunCompletion>, AggregateError> {
        match event {
            EngineEvent::RunStart { playbook } => {
                self.on_run_start(playbook.as_deref())?;
                Ok(None)
            }
            EngineEvent::PlayStart { run_token } => {
                self.on_play_start(run_token, vars)?;
                Ok(None)
            }
            EngineEvent::Task(task) => {
                self.on_task(&task, vars)?;
                Ok(None)
            }
            EngineEvent::RunEnd => self.on_run_end(vars).map(Some),
        }
    }

    pub fn on_run_start(&mut self, playbook: Option<&str>) -> Result<(), AggregateError> {
        self.expect_state(&[RunState::Idle], "run start")?;
        info!("Run started: {}", playbook.unwrap_or("<unnamed>"));
        self.state = RunState::RunStarted;
        Ok(())
    }

    /// Record the run token and make sure every group of the membership
    /// snapshot appears in the tree.
    pub fn on_play_start<V: VarLookup>(
        &mut self,
        run_token: RunToken,
        vars: &V,
    ) -> Result<(), AggregateError> {
        self.expect_state(&[RunState::RunStarted, RunState::GroupActive], "play start")?;

        let groups = membership_groups(&vars.play_vars()?);
        debug!("Play {} declares {} groups", run_token, groups.len());
        for group in &groups {
            self.tree.initialize_group(group);
        }

        self.run_token = Some(run_token);
        self.state = RunState::GroupActive;
        Ok(())
    }

    pub fn on_task<V: VarLookup>(
        &mut self,
        event: &TaskEvent,
        vars: &V,
    ) -> Result<(), AggregateError> {
        self.expect_state(&[RunState::GroupActive], "task completion")?;

        match classify(event)? {
            TaskKind::SkippedChecks(roots) => {
                if roots.is_empty() {
                    return Ok(());
                }
                let task_vars = vars.task_vars(&event.host, &event.task)?;
                let groups = group_names(&task_vars, &event.host)?;

                for root in roots {
                    let check_id = resolve_check_id(&root)?;
                    debug!("Check {} skipped on {}", check_id, event.host);
                    self.record(&groups, &check_id, &event.host, Outcome::Skipped);
                }
            }
            TaskKind::TestOutcome(outcome) => {
                let task_vars = vars.task_vars(&event.host, &event.task)?;
                let check_id = external_id(&task_vars, &event.host)?;
                let groups = group_names(&task_vars, &event.host)?;

                debug!("Check {} on {}: {}", check_id, event.host, outcome);
                self.record(&groups, &check_id, &event.host, outcome);
            }
            TaskKind::Ignored => {}
        }

        Ok(())
    }

    /// Apply the label gate and finish the run.
    pub fn on_run_end<V: VarLookup>(&mut self, vars: &V) -> Result<RunCompletion, AggregateError> {
        self.expect_state(&[RunState::GroupActive], "run end")?;
        self.state = RunState::Finished;

        let tree = std::mem::take(&mut self.tree);
        let run_token = self.run_token.take().ok_or_else(|| AggregateError::UnexpectedEvent {
            state: RunState::GroupActive.to_string(),
            event: "run end without a run token".to_string(),
        })?;

        if !has_label(&vars.play_vars()?, TEST_LABEL) {
            info!("Not running a Trento test execution");
            return Ok(RunCompletion::GateSkipped);
        }

        info!(
            "Run {} finished with {} results in {} groups",
            run_token,
            tree.outcome_count(),
            tree.groups().count()
        );
        Ok(RunCompletion::Publish(FinishedRun { run_token, tree }))
    }

    fn record(&mut self, groups: &[String], check_id: &str, host: &str, outcome: Outcome) {
        for group in groups {
            if !self.tree.contains_group(group) {
                warn!(
                    "Group {} of host {} was not in the membership snapshot; adding it",
                    group, host
                );
            }
            self.tree.add_result(group, check_id, host, outcome.clone());
        }
    }

    fn expect_state(&self, allowed: &[RunState], event: &str) -> Result<(), AggregateError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(AggregateError::UnexpectedEvent {
                state: self.state.to_string(),
                event: event.to_string(),
            })
        }
    }
}

fn external_id(vars: &Vars, host: &str) -> Result<String, AggregateError> {
    match vars.get(EXTERNAL_ID) {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(AggregateError::malformed(host, EXTERNAL_ID)),
    }
}

/// Replay a whole event log through a fresh aggregator.
///
/// `on_event` is called before each event is applied.
pub fn aggregate_log<F>(log: EventLog, mut on_event: F) -> Result<RunCompletion, AggregateError>
where
    F: FnMut(&EngineEvent),
{
    let mut aggregator = RunAggregator::new();
    let mut replay = log.into_replay();

    while let Some(event) = replay.next_event() {
        on_event(&event);
        if let Some(completion) = aggregator.handle(event, replay.vars())? {
            return Ok(completion);
        }
    }

    warn!("Event stream ended while {}", aggregator.state());
    Ok(RunCompletion::Unfinished(aggregator.state()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::definition::DEFAULTS_FILE;
    use crate::events::{TaskRef, TaskStatus};
    use serde_json::json;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeVars {
        play: Vars,
        hosts: HashMap<String, Vars>,
    }

    impl FakeVars {
        fn new(play: Value) -> Self {
            Self {
                play: play.as_object().cloned().unwrap_or_default(),
                hosts: HashMap::new(),
            }
        }

        fn host(mut self, host: &str, vars: Value) -> Self {
            self.hosts
                .insert(host.to_string(), vars.as_object().cloned().unwrap_or_default());
            self
        }
    }

    impl VarLookup for FakeVars {
        fn play_vars(&self) -> Result<Vars, AggregateError> {
            Ok(self.play.clone())
        }

        fn task_vars(&self, host: &str, _task: &TaskRef) -> Result<Vars, AggregateError> {
            Ok(self.hosts.get(host).cloned().unwrap_or_default())
        }
    }

    fn test_play() -> Value {
        json!({
            "ara_playbook_labels": ["test"],
            "hostvars": {
                "node1": {"group_names": ["web", "db"]},
                "node2": {"group_names": ["idle"]}
            }
        })
    }

    fn outcome_task(status: TaskStatus, args: Value) -> TaskEvent {
        TaskEvent {
            host: "node1".to_string(),
            task: TaskRef {
                uuid: "t1".to_string(),
                action: "set_fact".to_string(),
                name: "set_test_result".to_string(),
                args: args.as_object().cloned().unwrap_or_default(),
            },
            status,
            result: Value::Null,
        }
    }

    fn include_task(result: Value) -> TaskEvent {
        TaskEvent {
            host: "node1".to_string(),
            task: TaskRef {
                uuid: "t2".to_string(),
                action: "include_role".to_string(),
                name: "run_checks".to_string(),
                args: Vars::new(),
            },
            status: TaskStatus::Ok,
            result,
        }
    }

    fn started(vars: &FakeVars) -> RunAggregator {
        let mut agg = RunAggregator::new();
        agg.on_run_start(Some("site.yml")).unwrap();
        agg.on_play_start(RunToken("play-1".to_string()), vars).unwrap();
        agg
    }

    fn write_check(root: &Path, name: &str, id: &str) -> String {
        let check = root.join(name);
        std::fs::create_dir_all(check.join("defaults")).unwrap();
        std::fs::write(check.join(DEFAULTS_FILE), format!("external_id: \"{}\"\n", id)).unwrap();
        check.to_string_lossy().to_string()
    }

    #[test]
    fn test_play_start_initializes_every_group() {
        let vars = FakeVars::new(test_play());
        let agg = started(&vars);

        assert_eq!(agg.state(), RunState::GroupActive);
        for group in ["web", "db", "idle"] {
            assert!(agg.tree().contains_group(group), "{}", group);
        }
        assert!(agg.tree().group("idle").unwrap().checks.is_empty());
    }

    #[test]
    fn test_outcome_recorded_for_every_host_group() {
        let vars = FakeVars::new(test_play()).host(
            "node1",
            json!({"external_id": "CHK001", "group_names": ["web", "db"]}),
        );
        let mut agg = started(&vars);

        agg.on_task(&outcome_task(TaskStatus::Ok, json!({"test_result": true})), &vars)
            .unwrap();
        assert_eq!(agg.tree().outcome("web", "CHK001", "node1"), Some(&Outcome::Pass));
        assert_eq!(agg.tree().outcome("db", "CHK001", "node1"), Some(&Outcome::Pass));

        agg.on_task(&outcome_task(TaskStatus::Failed, json!({})), &vars)
            .unwrap();
        assert_eq!(agg.tree().outcome("web", "CHK001", "node1"), Some(&Outcome::Fail));
        assert_eq!(agg.tree().outcome("db", "CHK001", "node1"), Some(&Outcome::Fail));

        let value = agg.tree().to_value().unwrap();
        assert_eq!(value["results"]["web"]["checks"]["CHK001"]["hosts"]["node1"]["result"], false);
    }

    #[test]
    fn test_missing_external_id_is_malformed() {
        let vars = FakeVars::new(test_play()).host("node1", json!({"group_names": ["web"]}));
        let mut agg = started(&vars);

        let err = agg
            .on_task(&outcome_task(TaskStatus::Ok, json!({"test_result": true})), &vars)
            .unwrap_err();
        assert!(matches!(err, AggregateError::MalformedEvent { ref field, .. } if field == "external_id"));
    }

    #[test]
    fn test_skipped_checks_recorded() {
        let dir = TempDir::new().unwrap();
        let a = write_check(dir.path(), "1.1.1", "156F64");
        let b = write_check(dir.path(), "1.1.2", "A1B2C3");
        let c = write_check(dir.path(), "1.1.3", "DDDDDD");

        let vars = FakeVars::new(test_play()).host("node1", json!({"group_names": ["web", "db"]}));
        let mut agg = started(&vars);

        agg.on_task(
            &include_task(json!({"results": [
                {"skipped": true, "check_item": {"path": a}},
                {"skipped": false, "check_item": {"path": b}},
                {"skipped": true, "check_item": {"path": c}}
            ]})),
            &vars,
        )
        .unwrap();

        for group in ["web", "db"] {
            let checks = &agg.tree().group(group).unwrap().checks;
            assert_eq!(checks.len(), 2);
            assert_eq!(agg.tree().outcome(group, "156F64", "node1"), Some(&Outcome::Skipped));
            assert_eq!(agg.tree().outcome(group, "DDDDDD", "node1"), Some(&Outcome::Skipped));
        }
        assert_eq!(agg.tree().outcome_count(), 4);
    }

    #[test]
    fn test_skipped_check_without_definition_fails() {
        let dir = TempDir::new().unwrap();
        let vars = FakeVars::new(test_play()).host("node1", json!({"group_names": ["web"]}));
        let mut agg = started(&vars);

        let missing = dir.path().join("gone").to_string_lossy().to_string();
        let err = agg
            .on_task(
                &include_task(json!({"results": [{"skipped": true, "check_item": {"path": missing}}]})),
                &vars,
            )
            .unwrap_err();
        assert!(matches!(err, AggregateError::DefinitionReadFailure(_)));
    }

    #[test]
    fn test_unknown_group_is_added() {
        let vars = FakeVars::new(test_play()).host(
            "node1",
            json!({"external_id": "CHK001", "group_names": ["late"]}),
        );
        let mut agg = started(&vars);

        agg.on_task(&outcome_task(TaskStatus::Ok, json!({"test_result": false})), &vars)
            .unwrap();
        assert_eq!(agg.tree().outcome("late", "CHK001", "node1"), Some(&Outcome::Fail));
    }

    #[test]
    fn test_noise_is_ignored() {
        let vars = FakeVars::new(test_play());
        let mut agg = started(&vars);
        let before = agg.tree().clone();

        let mut noise = outcome_task(TaskStatus::Ok, json!({"test_result": true}));
        noise.task.name = "gather_facts".to_string();
        agg.on_task(&noise, &vars).unwrap();

        assert_eq!(agg.tree(), &before);
    }

    #[test]
    fn test_gate_passes_with_test_label() {
        let vars = FakeVars::new(test_play());
        let mut agg = started(&vars);

        let completion = agg.on_run_end(&vars).unwrap();
        assert_eq!(agg.state(), RunState::Finished);
        match completion {
            RunCompletion::Publish(run) => {
                assert_eq!(run.run_token, RunToken("play-1".to_string()));
                assert!(run.tree.contains_group("idle"));
            }
            other => panic!("unexpected completion: {:?}", other),
        }
    }

    #[test]
    fn test_gate_discards_tree_without_test_label() {
        let vars = FakeVars::new(json!({
            "ara_playbook_labels": ["nightly"],
            "hostvars": {"node1": {"group_names": ["web"]}}
        }))
        .host("node1", json!({"external_id": "CHK001", "group_names": ["web"]}));
        let mut agg = started(&vars);
        agg.on_task(&outcome_task(TaskStatus::Ok, json!({"test_result": true})), &vars)
            .unwrap();

        assert_eq!(agg.on_run_end(&vars).unwrap(), RunCompletion::GateSkipped);
        assert!(agg.tree().is_empty());
    }

    #[test]
    fn test_events_out_of_order_are_rejected() {
        let vars = FakeVars::new(test_play());
        let mut agg = RunAggregator::new();

        let err = agg
            .on_task(&outcome_task(TaskStatus::Ok, json!({"test_result": true})), &vars)
            .unwrap_err();
        assert!(matches!(err, AggregateError::UnexpectedEvent { .. }));

        let mut agg = started(&vars);
        agg.on_run_end(&vars).unwrap();
        assert!(agg.on_run_start(None).is_err());
        assert!(agg.on_run_end(&vars).is_err());
    }

    #[test]
    fn test_aggregate_log_end_to_end() {
        let log = EventLog::parse(
            r#"{"event":"run_start","playbook":"site.yml"}
{"event":"play_start","play_uuid":"abc","vars":{"ara_playbook_labels":["test"],"hostvars":{"node1":{"group_names":["web","db"]}}}}
{"event":"task_ok","host":"node1","task":{"uuid":"t1","action":"set_fact","name":"set_test_result","args":{"test_result":true}},"vars":{"external_id":"CHK001"}}
{"event":"task_failed","host":"node1","task":{"uuid":"t1","action":"set_fact","name":"set_test_result"},"vars":{"external_id":"CHK001"}}
{"event":"task_ok","host":"node1","task":{"uuid":"t3","action":"set_fact","name":"set_test_result","args":{"test_result":true}},"vars":{"external_id":"CHK002"}}
{"event":"run_end"}"#,
        )
        .unwrap();

        let mut seen = 0;
        let completion = aggregate_log(log, |_| seen += 1).unwrap();
        assert_eq!(seen, 6);

        let RunCompletion::Publish(run) = completion else {
            panic!("expected a publishable run");
        };
        assert_eq!(run.run_token, RunToken("abc".to_string()));
        assert_eq!(run.tree.outcome("web", "CHK001", "node1"), Some(&Outcome::Fail));
        assert_eq!(run.tree.outcome("db", "CHK001", "node1"), Some(&Outcome::Fail));
        assert_eq!(run.tree.outcome("db", "CHK002", "node1"), Some(&Outcome::Pass));
    }

    #[test]
    fn test_aggregate_log_does_not_reuse_earlier_task_vars() {
        let log = EventLog::parse(
            r#"{"event":"run_start","playbook":"site.yml"}
{"event":"play_start","play_uuid":"abc","vars":{"ara_playbook_labels":["test"],"hostvars":{"node1":{"group_names":["web"]}}}}
{"event":"task_ok","host":"node1","task":{"uuid":"t1","action":"set_fact","name":"set_test_result","args":{"test_result":true}},"vars":{"external_id":"CHK001"}}
{"event":"task_failed","host":"node1","task":{"uuid":"t1","action":"set_fact","name":"set_test_result"},"vars":{}}
{"event":"run_end"}"#,
        )
        .unwrap();

        let err = aggregate_log(log, |_| {}).unwrap_err();
        assert!(matches!(
            err,
            AggregateError::MalformedEvent { ref field, .. } if field == EXTERNAL_ID
        ));
    }

    #[test]
    fn test_aggregate_log_without_run_end() {
        let log = EventLog::parse(r#"{"event":"run_start"}"#).unwrap();
        assert_eq!(
            aggregate_log(log, |_| {}).unwrap(),
            RunCompletion::Unfinished(RunState::RunStarted)
        );
    }
}

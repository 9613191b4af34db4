/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! End-to-end executor scenarios: pipeline row accounting, DAG batching,
//! dependency-failure propagation, cycles, and timeouts.

use serde_json::{json, Map, Value};

use sluice::{ExecutorError, ExecutionStatus, MetadataStore, StepKind, TriggerKind};

use crate::fixtures::*;

#[tokio::test]
async fn linear_pipeline_records_row_counts() {
    let harness = Harness::new();
    harness.store.insert_pipeline(pipeline(
        "linear",
        vec![
            step("a", StepKind::Extract, "rows_source", json!({"rows": 3}), None, Some("x")),
            step("b", StepKind::Transform, "head", json!({"count": 2}), Some("x"), Some("y")),
            step("c", StepKind::Load, "counting_sink", Value::Null, Some("y"), None),
        ],
    ));

    let execution_id = harness
        .executor
        .execute_pipeline("linear", TriggerKind::Manual, None)
        .await
        .unwrap();

    let execution = harness
        .store
        .get_execution(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Success);
    assert_eq!(execution.pipeline_id.as_deref(), Some("linear"));
    assert!(execution.duration_ms.unwrap() >= 0);
    assert!(execution.finished_at.unwrap() >= execution.started_at.unwrap());

    let tasks = harness.store.list_tasks(execution_id).await.unwrap();
    let summary: Vec<(&str, Option<i64>, Option<i64>)> = tasks
        .iter()
        .map(|t| (t.node_id.as_str(), t.input_rows, t.output_rows))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("a", Some(0), Some(3)),
            ("b", Some(3), Some(2)),
            ("c", Some(2), Some(2)),
        ]
    );
    assert!(tasks.iter().all(|t| t.status == ExecutionStatus::Success));
}

#[tokio::test]
async fn single_extract_pipeline_counts_rows() {
    let harness = Harness::new();
    harness.store.insert_pipeline(pipeline(
        "solo",
        vec![step(
            "only",
            StepKind::Extract,
            "rows_source",
            json!({"rows": 4}),
            None,
            None,
        )],
    ));

    let execution_id = harness
        .executor
        .execute_pipeline("solo", TriggerKind::Manual, None)
        .await
        .unwrap();

    let tasks = harness.store.list_tasks(execution_id).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].input_rows, Some(0));
    assert_eq!(tasks[0].output_rows, Some(4));
}

#[tokio::test]
async fn unknown_pipeline_is_not_found() {
    let harness = Harness::new();
    let err = harness
        .executor
        .execute_pipeline("ghost", TriggerKind::Manual, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::PipelineNotFound(ref id) if id == "ghost"));
    assert!(harness.store.executions().is_empty());
}

#[tokio::test]
async fn unknown_plugin_fails_the_step() {
    let harness = Harness::new();
    harness.store.insert_pipeline(pipeline(
        "bad_plugin",
        vec![step("s", StepKind::Extract, "no_such_plugin", Value::Null, None, None)],
    ));

    let execution_id = harness
        .executor
        .execute_pipeline("bad_plugin", TriggerKind::Manual, None)
        .await
        .unwrap();

    let execution = harness
        .store
        .get_execution(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);

    let tasks = harness.store.list_tasks(execution_id).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, ExecutionStatus::Failed);
    assert!(tasks[0].error.as_deref().unwrap().contains("unknown extract plugin"));
}

#[tokio::test]
async fn failing_step_aborts_the_pipeline_and_logs() {
    let harness = Harness::new();
    harness.store.insert_pipeline(pipeline(
        "abort",
        vec![
            step("boom", StepKind::Extract, "failing_source", Value::Null, None, Some("x")),
            step("never", StepKind::Load, "counting_sink", Value::Null, Some("x"), None),
        ],
    ));

    let execution_id = harness
        .executor
        .execute_pipeline("abort", TriggerKind::Manual, None)
        .await
        .unwrap();

    let execution = harness
        .store
        .get_execution(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);

    // First failure wins: the second step never ran.
    let tasks = harness.store.list_tasks(execution_id).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].node_id, "boom");
    assert_eq!(tasks[0].status, ExecutionStatus::Failed);

    let logs = harness.store.logs();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].message.starts_with("Step BOOM failed:"));
    assert_eq!(logs[0].task_id, Some(tasks[0].id));
}

#[tokio::test]
async fn empty_dag_succeeds_with_zero_tasks() {
    let harness = Harness::new();
    let empty = schedule("empty", "0 2 * * *", vec![]);

    let execution_id = harness
        .executor
        .execute_schedule(&empty, TriggerKind::Manual, None)
        .await
        .unwrap();

    let execution = harness
        .store
        .get_execution(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Success);
    assert!(harness.store.list_tasks(execution_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn diamond_dag_executes_every_node() {
    let harness = Harness::new();
    harness.store.insert_pipeline(noop_pipeline("noop"));
    let diamond = schedule(
        "diamond",
        "0 2 * * *",
        vec![
            node("n1", "noop", &[]),
            node("n2", "noop", &["n1"]),
            node("n3", "noop", &["n1"]),
            node("n4", "noop", &["n2", "n3"]),
        ],
    );

    let execution_id = harness
        .executor
        .execute_schedule(&diamond, TriggerKind::Scheduled, None)
        .await
        .unwrap();

    let execution = harness
        .store
        .get_execution(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Success);
    assert_eq!(execution.trigger, TriggerKind::Scheduled);

    // One single-step pipeline run per node.
    let tasks = harness.store.list_tasks(execution_id).await.unwrap();
    assert_eq!(tasks.len(), 4);
    assert!(tasks.iter().all(|t| t.status == ExecutionStatus::Success));
}

#[tokio::test]
async fn dependency_failure_skips_downstream_nodes() {
    let harness = Harness::new();
    harness.store.insert_pipeline(noop_pipeline("noop"));
    harness.store.insert_pipeline(pipeline(
        "explode",
        vec![step("explode_step", StepKind::Extract, "failing_source", Value::Null, None, None)],
    ));
    let dag = schedule(
        "propagation",
        "0 2 * * *",
        vec![
            node("n1", "noop", &[]),
            node("n2", "explode", &["n1"]),
            node("n3", "noop", &["n1"]),
            node("n4", "noop", &["n2", "n3"]),
        ],
    );

    let execution_id = harness
        .executor
        .execute_schedule(&dag, TriggerKind::Scheduled, None)
        .await
        .unwrap();

    let execution = harness
        .store
        .get_execution(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);

    // n1, n2, n3 ran (n2 failed); n4 was skipped without running, so only
    // three step tasks exist.
    let tasks = harness.store.list_tasks(execution_id).await.unwrap();
    assert_eq!(tasks.len(), 3);
    let failed: Vec<&str> = tasks
        .iter()
        .filter(|t| t.status == ExecutionStatus::Failed)
        .map(|t| t.node_id.as_str())
        .collect();
    assert_eq!(failed, vec!["explode_step"]);
    assert_eq!(
        tasks.iter().filter(|t| t.node_id == "noop_step").count(),
        2,
        "only n1 and n3 ran the noop pipeline"
    );
}

#[tokio::test]
async fn cycle_fails_before_any_node_runs() {
    let harness = Harness::new();
    harness.store.insert_pipeline(noop_pipeline("noop"));
    let cyclic = schedule(
        "cyclic",
        "0 2 * * *",
        vec![node("n1", "noop", &["n2"]), node("n2", "noop", &["n1"])],
    );

    let err = harness
        .executor
        .execute_schedule(&cyclic, TriggerKind::Manual, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::InvalidDag(_)));

    let executions = harness.store.executions();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Failed);
    assert!(executions[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("circular dependency"));
    assert!(harness
        .store
        .list_tasks(executions[0].id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn node_timeout_fails_the_node_and_its_task() {
    let harness = Harness::new();
    harness.store.insert_pipeline(pipeline(
        "slow",
        vec![step(
            "nap",
            StepKind::Extract,
            "sleep_source",
            json!({"seconds": 5}),
            None,
            None,
        )],
    ));
    let mut slow_node = node("n1", "slow", &[]);
    slow_node.timeout = 1;
    let dag = schedule("timeouts", "0 2 * * *", vec![slow_node]);

    let execution_id = harness
        .executor
        .execute_schedule(&dag, TriggerKind::Scheduled, None)
        .await
        .unwrap();

    let execution = harness
        .store
        .get_execution(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);

    let tasks = harness.store.list_tasks(execution_id).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, ExecutionStatus::Failed);
    let error = tasks[0].error.as_deref().unwrap();
    assert!(error.contains("timed out"), "unexpected error: {error}");
}

#[tokio::test]
async fn node_params_override_caller_params() {
    let harness = Harness::new();
    harness.store.insert_pipeline(pipeline(
        "parametrized",
        vec![step("src", StepKind::Extract, "param_rows_source", Value::Null, None, None)],
    ));
    let mut parameterized_node = node("n1", "parametrized", &[]);
    parameterized_node
        .params
        .insert("rows".to_string(), Value::from(2));
    let dag = schedule("params", "0 2 * * *", vec![parameterized_node]);

    let mut caller_params = Map::new();
    caller_params.insert("rows".to_string(), Value::from(5));

    let execution_id = harness
        .executor
        .execute_schedule(&dag, TriggerKind::Manual, Some(&caller_params))
        .await
        .unwrap();

    let tasks = harness.store.list_tasks(execution_id).await.unwrap();
    assert_eq!(tasks[0].output_rows, Some(2), "node params win on collision");
}

#[tokio::test]
async fn submitted_pipeline_returns_before_completion() {
    let harness = Harness::new();
    harness.store.insert_pipeline(noop_pipeline("noop"));

    let execution_id = harness
        .executor
        .submit_pipeline("noop", TriggerKind::Manual, None)
        .await
        .unwrap();

    // The execution record exists as soon as submit returns.
    assert!(harness
        .store
        .get_execution(execution_id)
        .await
        .unwrap()
        .is_some());

    let execution = wait_for_terminal(&harness.store, execution_id).await;
    assert_eq!(execution.status, ExecutionStatus::Success);
}

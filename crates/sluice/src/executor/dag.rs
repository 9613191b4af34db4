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

//! DAG execution: dependency-ordered, batch-parallel scheduling of a
//! schedule's pipeline nodes.
//!
//! Nodes are partitioned into dependency-closed batches and each batch
//! fans out concurrently, capped by the `max_concurrent_tasks` semaphore.
//! A node whose any predecessor failed or was skipped records a failure
//! without running. Per-node deadlines cancel the in-flight pipeline at
//! its next await point.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::graph;
use super::pipeline::PipelineExecutor;
use super::state::{ExecutionScope, StateManager};
use crate::dal::MetadataStore;
use crate::error::ExecutorError;
use crate::models::{DagNode, ExecutionStatus, Pipeline, Schedule, TriggerKind};
use crate::registry::PluginRegistry;

/// Executes schedules (DAGs of pipelines) and standalone pipelines.
///
/// Cheap to clone: all state is shared behind `Arc`s, so clones drive the
/// same semaphore and store.
#[derive(Clone)]
pub struct DagExecutor {
    state: StateManager,
    pipeline_executor: PipelineExecutor,
    store: Arc<dyn MetadataStore>,
    node_slots: Arc<Semaphore>,
}

impl DagExecutor {
    /// Creates an executor over `store` with plugins from `registry`.
    ///
    /// `max_concurrent_tasks` soft-caps how many DAG nodes run at once
    /// across all executions.
    pub fn new(
        store: Arc<dyn MetadataStore>,
        registry: Arc<PluginRegistry>,
        max_concurrent_tasks: usize,
    ) -> Self {
        let state = StateManager::new(store.clone());
        Self {
            pipeline_executor: PipelineExecutor::new(state.clone(), registry),
            state,
            store,
            node_slots: Arc::new(Semaphore::new(max_concurrent_tasks.max(1))),
        }
    }

    /// Executes a schedule's DAG to completion and returns the execution
    /// id.
    ///
    /// The returned id identifies a terminal execution record; callers
    /// that need the id before the run finishes use [`submit_schedule`].
    ///
    /// [`submit_schedule`]: DagExecutor::submit_schedule
    pub async fn execute_schedule(
        &self,
        schedule: &Schedule,
        trigger: TriggerKind,
        params: Option<&Map<String, Value>>,
    ) -> Result<Uuid, ExecutorError> {
        let execution_id = self
            .state
            .create_execution(
                ExecutionScope::Schedule {
                    id: &schedule.id,
                    name: &schedule.name,
                },
                trigger,
                params.cloned().unwrap_or_default(),
            )
            .await?;

        info!(
            schedule_id = %schedule.id,
            schedule_name = %schedule.name,
            execution_id = %execution_id,
            "Starting schedule execution"
        );

        self.run_schedule(execution_id, schedule, params).await?;
        Ok(execution_id)
    }

    /// Creates the execution record, then runs the schedule in the
    /// background. Returns the execution id immediately.
    pub async fn submit_schedule(
        &self,
        schedule: Schedule,
        trigger: TriggerKind,
        params: Option<Map<String, Value>>,
    ) -> Result<Uuid, ExecutorError> {
        let execution_id = self
            .state
            .create_execution(
                ExecutionScope::Schedule {
                    id: &schedule.id,
                    name: &schedule.name,
                },
                trigger,
                params.clone().unwrap_or_default(),
            )
            .await?;

        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this
                .run_schedule(execution_id, &schedule, params.as_ref())
                .await
            {
                error!(
                    execution_id = %execution_id,
                    error = %e,
                    "Schedule execution failed"
                );
            }
        });

        Ok(execution_id)
    }

    /// Executes a standalone pipeline to completion and returns the
    /// execution id. Fails with `PipelineNotFound` before creating any
    /// records when the id is unknown.
    pub async fn execute_pipeline(
        &self,
        pipeline_id: &str,
        trigger: TriggerKind,
        params: Option<&Map<String, Value>>,
    ) -> Result<Uuid, ExecutorError> {
        let pipeline = self.load_pipeline(pipeline_id).await?;
        let execution_id = self
            .state
            .create_execution(
                ExecutionScope::Pipeline {
                    id: &pipeline.id,
                    name: &pipeline.name,
                },
                trigger,
                params.cloned().unwrap_or_default(),
            )
            .await?;

        info!(
            pipeline_id = %pipeline_id,
            execution_id = %execution_id,
            "Starting pipeline execution"
        );

        self.run_pipeline(execution_id, &pipeline, params.cloned().unwrap_or_default())
            .await?;
        Ok(execution_id)
    }

    /// Creates the execution record, then runs the pipeline in the
    /// background. Returns the execution id immediately; an unknown
    /// pipeline id still fails synchronously.
    pub async fn submit_pipeline(
        &self,
        pipeline_id: &str,
        trigger: TriggerKind,
        params: Option<Map<String, Value>>,
    ) -> Result<Uuid, ExecutorError> {
        let pipeline = self.load_pipeline(pipeline_id).await?;
        let execution_id = self
            .state
            .create_execution(
                ExecutionScope::Pipeline {
                    id: &pipeline.id,
                    name: &pipeline.name,
                },
                trigger,
                params.clone().unwrap_or_default(),
            )
            .await?;

        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this
                .run_pipeline(execution_id, &pipeline, params.unwrap_or_default())
                .await
            {
                error!(
                    execution_id = %execution_id,
                    error = %e,
                    "Pipeline execution failed"
                );
            }
        });

        Ok(execution_id)
    }

    async fn load_pipeline(&self, pipeline_id: &str) -> Result<Pipeline, ExecutorError> {
        self.store
            .get_pipeline(pipeline_id)
            .await?
            .ok_or_else(|| ExecutorError::PipelineNotFound(pipeline_id.to_string()))
    }

    /// Drives one schedule execution from `running` to its terminal
    /// status.
    async fn run_schedule(
        &self,
        execution_id: Uuid,
        schedule: &Schedule,
        params: Option<&Map<String, Value>>,
    ) -> Result<(), ExecutorError> {
        self.state.start_execution(execution_id).await?;

        let batches = match graph::execution_batches(&schedule.dag) {
            Ok(batches) => batches,
            Err(e) => {
                self.state
                    .complete_execution(execution_id, ExecutionStatus::Failed, Some(e.to_string()))
                    .await?;
                return Err(e);
            }
        };

        let mut node_results: HashMap<String, bool> = HashMap::new();

        for batch in batches {
            let mut node_ids = Vec::new();
            let mut handles = Vec::new();
            for node in batch {
                let deps_ok = node
                    .depends_on
                    .iter()
                    .all(|dep| node_results.get(dep).copied().unwrap_or(false));
                if !deps_ok {
                    warn!(node_id = %node.id, "Skipping node due to failed dependency");
                    node_results.insert(node.id.clone(), false);
                    continue;
                }

                let this = self.clone();
                let node = node.clone();
                let params = params.cloned();
                node_ids.push(node.id.clone());
                handles.push(tokio::spawn(async move {
                    this.execute_node(&node, execution_id, params.as_ref()).await
                }));
            }

            let results = futures::future::join_all(handles).await;
            for (node_id, result) in node_ids.into_iter().zip(results) {
                let result = match result {
                    Ok(result) => result,
                    Err(e) => {
                        error!(node_id = %node_id, error = %e, "Node execution panicked");
                        false
                    }
                };
                node_results.insert(node_id, result);
            }
        }

        let all_success = node_results.values().all(|&ok| ok);
        let final_status = if all_success {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failed
        };
        self.state
            .complete_execution(execution_id, final_status, None)
            .await?;

        info!(
            execution_id = %execution_id,
            status = %final_status,
            "Schedule execution completed"
        );
        Ok(())
    }

    /// Drives one standalone-pipeline execution to its terminal status.
    async fn run_pipeline(
        &self,
        execution_id: Uuid,
        pipeline: &Pipeline,
        params: Map<String, Value>,
    ) -> Result<(), ExecutorError> {
        self.state.start_execution(execution_id).await?;

        match self
            .pipeline_executor
            .execute(pipeline, execution_id, &params)
            .await
        {
            Ok(success) => {
                let status = if success {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::Failed
                };
                self.state
                    .complete_execution(execution_id, status, None)
                    .await?;
                Ok(())
            }
            Err(e) => {
                self.state
                    .complete_execution(execution_id, ExecutionStatus::Failed, Some(e.to_string()))
                    .await?;
                Err(e)
            }
        }
    }

    /// Runs one DAG node under its deadline. All failure modes collapse to
    /// `false` so independent branches keep running.
    async fn execute_node(
        &self,
        node: &DagNode,
        execution_id: Uuid,
        params: Option<&Map<String, Value>>,
    ) -> bool {
        let _slot = match self.node_slots.acquire().await {
            Ok(permit) => permit,
            Err(_) => return false,
        };

        let pipeline = match self.store.get_pipeline(&node.pipeline_id).await {
            Ok(Some(pipeline)) => pipeline,
            Ok(None) => {
                error!(
                    node_id = %node.id,
                    pipeline_id = %node.pipeline_id,
                    "Pipeline not found"
                );
                return false;
            }
            Err(e) => {
                error!(node_id = %node.id, error = %e, "Failed to load pipeline");
                return false;
            }
        };

        // Caller params first, node params win on collision.
        let mut merged = params.cloned().unwrap_or_default();
        for (key, value) in &node.params {
            merged.insert(key.clone(), value.clone());
        }

        let deadline = Duration::from_secs(node.timeout);
        match tokio::time::timeout(
            deadline,
            self.pipeline_executor.execute(&pipeline, execution_id, &merged),
        )
        .await
        {
            Ok(Ok(success)) => success,
            Ok(Err(e)) => {
                error!(node_id = %node.id, error = %e, "Node execution error");
                false
            }
            Err(_) => {
                let timeout_error = ExecutorError::NodeTimeout {
                    node_id: node.id.clone(),
                    timeout_secs: node.timeout,
                };
                error!(
                    node_id = %node.id,
                    timeout_secs = node.timeout,
                    "Node timed out"
                );
                self.fail_interrupted_tasks(execution_id, &pipeline, &timeout_error)
                    .await;
                false
            }
        }
    }

    /// The deadline cancelled the pipeline mid-step; close out the task
    /// record the cancelled step left in `running` so the interruption is
    /// observable.
    async fn fail_interrupted_tasks(
        &self,
        execution_id: Uuid,
        pipeline: &Pipeline,
        cause: &ExecutorError,
    ) {
        let tasks = match self.store.list_tasks(execution_id).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(execution_id = %execution_id, error = %e, "Failed to list tasks");
                return;
            }
        };

        for task in tasks {
            let belongs_to_pipeline = pipeline.steps.iter().any(|s| s.id == task.node_id);
            if task.status == ExecutionStatus::Running && belongs_to_pipeline {
                if let Err(e) = self
                    .state
                    .complete_task(
                        task.id,
                        ExecutionStatus::Failed,
                        None,
                        None,
                        Some(cause.to_string()),
                    )
                    .await
                {
                    error!(task_id = %task.id, error = %e, "Failed to fail interrupted task");
                }
            }
        }
    }
}

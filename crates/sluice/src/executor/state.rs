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

//! Lifecycle transitions for executions, tasks, and logs.
//!
//! The state manager is a thin persistence layer: it generates ids and
//! timestamps client-side, computes durations on terminal transitions, and
//! writes each change through the metadata store in its own transaction.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::dal::MetadataStore;
use crate::error::StoreError;
use crate::models::{
    Execution, ExecutionLog, ExecutionStatus, ExecutionTask, LogLevel, TriggerKind,
};

/// What an execution was created for: a schedule's DAG or a standalone
/// pipeline.
#[derive(Debug, Clone, Copy)]
pub enum ExecutionScope<'a> {
    Schedule { id: &'a str, name: &'a str },
    Pipeline { id: &'a str, name: &'a str },
}

/// Writes execution/task/log lifecycle transitions to the metadata store.
#[derive(Clone)]
pub struct StateManager {
    store: Arc<dyn MetadataStore>,
}

impl StateManager {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Creates a pending execution record and returns its fresh id.
    pub async fn create_execution(
        &self,
        scope: ExecutionScope<'_>,
        trigger: TriggerKind,
        params: Map<String, Value>,
    ) -> Result<Uuid, StoreError> {
        let execution_id = Uuid::new_v4();
        let (schedule_id, schedule_name, pipeline_id, pipeline_name) = match scope {
            ExecutionScope::Schedule { id, name } => {
                (Some(id.to_string()), Some(name.to_string()), None, None)
            }
            ExecutionScope::Pipeline { id, name } => {
                (None, None, Some(id.to_string()), Some(name.to_string()))
            }
        };

        let execution = Execution {
            id: execution_id,
            schedule_id,
            schedule_name,
            pipeline_id,
            pipeline_name,
            status: ExecutionStatus::Pending,
            trigger,
            params,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            error_message: None,
            created_at: Utc::now(),
        };
        self.store.insert_execution(&execution).await?;

        info!(execution_id = %execution_id, trigger = %trigger, "Created execution");
        Ok(execution_id)
    }

    /// Transitions an execution to running.
    pub async fn start_execution(&self, execution_id: Uuid) -> Result<(), StoreError> {
        self.store
            .mark_execution_running(execution_id, Utc::now())
            .await?;
        info!(execution_id = %execution_id, "Started execution");
        Ok(())
    }

    /// Transitions an execution to a terminal status, computing its
    /// duration from the stored `started_at` (0 if it never started).
    pub async fn complete_execution(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let started_at = self
            .store
            .get_execution(execution_id)
            .await?
            .and_then(|e| e.started_at);
        let duration_ms = started_at
            .map(|s| (now - s).num_milliseconds())
            .unwrap_or(0);

        self.store
            .complete_execution(execution_id, status, now, duration_ms, error)
            .await?;

        info!(
            execution_id = %execution_id,
            status = %status,
            duration_ms,
            "Completed execution"
        );
        Ok(())
    }

    /// Creates a pending task record for one step and returns its id.
    pub async fn create_task(
        &self,
        execution_id: Uuid,
        node_id: &str,
        node_name: &str,
    ) -> Result<Uuid, StoreError> {
        let task_id = Uuid::new_v4();
        let task = ExecutionTask {
            id: task_id,
            execution_id,
            node_id: node_id.to_string(),
            node_name: node_name.to_string(),
            status: ExecutionStatus::Pending,
            started_at: None,
            finished_at: None,
            input_rows: None,
            output_rows: None,
            error: None,
            created_at: Utc::now(),
        };
        self.store.insert_task(&task).await?;
        Ok(task_id)
    }

    /// Transitions a task to running.
    pub async fn start_task(&self, task_id: Uuid) -> Result<(), StoreError> {
        self.store.mark_task_running(task_id, Utc::now()).await
    }

    /// Transitions a task to a terminal status with its row accounting.
    pub async fn complete_task(
        &self,
        task_id: Uuid,
        status: ExecutionStatus,
        input_rows: Option<i64>,
        output_rows: Option<i64>,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        self.store
            .complete_task(task_id, status, Utc::now(), input_rows, output_rows, error)
            .await?;
        debug!(task_id = %task_id, status = %status, "Completed task");
        Ok(())
    }

    /// Appends a log record to the execution's log stream.
    pub async fn add_log(
        &self,
        execution_id: Uuid,
        task_id: Option<Uuid>,
        level: LogLevel,
        message: impl Into<String>,
        metadata: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let log = ExecutionLog {
            id: Uuid::new_v4(),
            execution_id,
            task_id,
            level,
            message: message.into(),
            metadata,
            created_at: Utc::now(),
        };
        self.store.insert_log(&log).await
    }

    /// Borrow the underlying store.
    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }
}

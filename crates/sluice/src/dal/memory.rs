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

//! In-memory metadata store.
//!
//! A complete [`MetadataStore`] implementation over process memory, used by
//! the test suite and available for embedded runs that do not need
//! persistence. Schedules and pipelines are seeded through the inherent
//! methods; execution records accumulate exactly as they would in the
//! database.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::MetadataStore;
use crate::error::StoreError;
use crate::models::{
    Execution, ExecutionLog, ExecutionStatus, ExecutionTask, Pipeline, Schedule,
};

#[derive(Default)]
struct Inner {
    pipelines: BTreeMap<String, Pipeline>,
    schedules: BTreeMap<String, Schedule>,
    executions: HashMap<Uuid, Execution>,
    // Creation order; the database equivalent orders by created_at.
    tasks: Vec<ExecutionTask>,
    logs: Vec<ExecutionLog>,
}

/// Metadata store held entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds (or replaces) a pipeline definition.
    pub fn insert_pipeline(&self, pipeline: Pipeline) {
        self.inner
            .lock()
            .pipelines
            .insert(pipeline.id.clone(), pipeline);
    }

    /// Seeds (or replaces) a schedule definition.
    pub fn insert_schedule(&self, schedule: Schedule) {
        self.inner
            .lock()
            .schedules
            .insert(schedule.id.clone(), schedule);
    }

    /// Deletes a schedule.
    pub fn remove_schedule(&self, schedule_id: &str) {
        self.inner.lock().schedules.remove(schedule_id);
    }

    /// Flips a schedule's enabled flag.
    pub fn set_schedule_enabled(&self, schedule_id: &str, enabled: bool) {
        if let Some(schedule) = self.inner.lock().schedules.get_mut(schedule_id) {
            schedule.enabled = enabled;
        }
    }

    /// Reads back a schedule, including engine-maintained timestamps.
    pub fn get_schedule(&self, schedule_id: &str) -> Option<Schedule> {
        self.inner.lock().schedules.get(schedule_id).cloned()
    }

    /// Snapshot of all execution records written so far.
    pub fn executions(&self) -> Vec<Execution> {
        self.inner.lock().executions.values().cloned().collect()
    }

    /// Snapshot of all log records written so far.
    pub fn logs(&self) -> Vec<ExecutionLog> {
        self.inner.lock().logs.clone()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn list_enabled_schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .schedules
            .values()
            .filter(|s| s.enabled)
            .cloned()
            .collect())
    }

    async fn get_pipeline(&self, pipeline_id: &str) -> Result<Option<Pipeline>, StoreError> {
        Ok(self.inner.lock().pipelines.get(pipeline_id).cloned())
    }

    async fn update_schedule_last_run(
        &self,
        schedule_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(schedule) = self.inner.lock().schedules.get_mut(schedule_id) {
            schedule.last_run_at = Some(at);
        }
        Ok(())
    }

    async fn update_schedule_next_run(
        &self,
        schedule_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(schedule) = self.inner.lock().schedules.get_mut(schedule_id) {
            schedule.next_run_at = Some(at);
        }
        Ok(())
    }

    async fn insert_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        self.inner
            .lock()
            .executions
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn mark_execution_running(
        &self,
        execution_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(execution) = self.inner.lock().executions.get_mut(&execution_id) {
            execution.status = ExecutionStatus::Running;
            execution.started_at = Some(at);
        }
        Ok(())
    }

    async fn complete_execution(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        finished_at: DateTime<Utc>,
        duration_ms: i64,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        if let Some(execution) = self.inner.lock().executions.get_mut(&execution_id) {
            execution.status = status;
            execution.finished_at = Some(finished_at);
            execution.duration_ms = Some(duration_ms);
            execution.error_message = error;
        }
        Ok(())
    }

    async fn get_execution(&self, execution_id: Uuid) -> Result<Option<Execution>, StoreError> {
        Ok(self.inner.lock().executions.get(&execution_id).cloned())
    }

    async fn insert_task(&self, task: &ExecutionTask) -> Result<(), StoreError> {
        self.inner.lock().tasks.push(task.clone());
        Ok(())
    }

    async fn mark_task_running(&self, task_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(task) = inner.tasks.iter_mut().find(|t| t.id == task_id) {
            task.status = ExecutionStatus::Running;
            task.started_at = Some(at);
        }
        Ok(())
    }

    async fn complete_task(
        &self,
        task_id: Uuid,
        status: ExecutionStatus,
        finished_at: DateTime<Utc>,
        input_rows: Option<i64>,
        output_rows: Option<i64>,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(task) = inner.tasks.iter_mut().find(|t| t.id == task_id) {
            task.status = status;
            task.finished_at = Some(finished_at);
            task.input_rows = input_rows;
            task.output_rows = output_rows;
            task.error = error;
        }
        Ok(())
    }

    async fn list_tasks(&self, execution_id: Uuid) -> Result<Vec<ExecutionTask>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .tasks
            .iter()
            .filter(|t| t.execution_id == execution_id)
            .cloned()
            .collect())
    }

    async fn insert_log(&self, log: &ExecutionLog) -> Result<(), StoreError> {
        self.inner.lock().logs.push(log.clone());
        Ok(())
    }
}

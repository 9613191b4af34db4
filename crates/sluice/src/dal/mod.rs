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

//! Metadata store gateway.
//!
//! [`MetadataStore`] is the narrow interface between the engine and its
//! relational metadata store: definitions in, execution records out. Each
//! operation is its own transaction; there is no multi-statement contract
//! between operations beyond per-operation atomicity.
//!
//! Two implementations ship with the crate:
//!
//! - [`postgres::PgStore`]: diesel over a pooled PostgreSQL connection,
//!   the production backend.
//! - [`memory::MemoryStore`]: an in-process store for tests and embedded
//!   use.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Execution, ExecutionLog, ExecutionStatus, ExecutionTask, Pipeline, Schedule,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// The persistence operations the engine requires of its metadata store.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// All schedules currently enabled, in stable (id) order.
    async fn list_enabled_schedules(&self) -> Result<Vec<Schedule>, StoreError>;

    /// Looks up a pipeline definition by id.
    async fn get_pipeline(&self, pipeline_id: &str) -> Result<Option<Pipeline>, StoreError>;

    /// Records the wall time a schedule last fired.
    async fn update_schedule_last_run(
        &self,
        schedule_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Records a schedule's next computed fire instant.
    async fn update_schedule_next_run(
        &self,
        schedule_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Inserts a freshly created execution record.
    async fn insert_execution(&self, execution: &Execution) -> Result<(), StoreError>;

    /// Transitions an execution to running.
    async fn mark_execution_running(
        &self,
        execution_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Writes an execution's terminal state. Terminal records are never
    /// mutated again.
    async fn complete_execution(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        finished_at: DateTime<Utc>,
        duration_ms: i64,
        error: Option<String>,
    ) -> Result<(), StoreError>;

    /// Reads back an execution record.
    async fn get_execution(&self, execution_id: Uuid) -> Result<Option<Execution>, StoreError>;

    /// Inserts a freshly created task record.
    async fn insert_task(&self, task: &ExecutionTask) -> Result<(), StoreError>;

    /// Transitions a task to running.
    async fn mark_task_running(&self, task_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Writes a task's terminal state with its row accounting.
    async fn complete_task(
        &self,
        task_id: Uuid,
        status: ExecutionStatus,
        finished_at: DateTime<Utc>,
        input_rows: Option<i64>,
        output_rows: Option<i64>,
        error: Option<String>,
    ) -> Result<(), StoreError>;

    /// All task records for an execution, in creation order.
    async fn list_tasks(&self, execution_id: Uuid) -> Result<Vec<ExecutionTask>, StoreError>;

    /// Appends a log record. Log records are append-only.
    async fn insert_log(&self, log: &ExecutionLog) -> Result<(), StoreError>;
}

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

//! PostgreSQL metadata store.
//!
//! Row shapes here mirror the `etl_*` tables; JSONB documents deserialize
//! into domain types on the way out. Every operation acquires one pooled
//! connection, runs one `interact` closure, and releases the connection on
//! all exit paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use super::MetadataStore;
use crate::database::schema::{
    etl_execution_logs, etl_execution_tasks, etl_executions, etl_pipelines, etl_schedules,
};
use crate::database::Database;
use crate::error::StoreError;
use crate::models::{
    DagNode, Execution, ExecutionLog, ExecutionStatus, ExecutionTask, Pipeline, PipelineStep,
    PipelineTrigger, Schedule, TriggerKind,
};

/// Metadata store backed by PostgreSQL through the shared connection pool.
#[derive(Clone)]
pub struct PgStore {
    database: Database,
}

impl PgStore {
    /// Creates a store over an existing connection pool.
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

// ---------------------------------------------------------------------------
// Row shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Queryable)]
struct PipelineRow {
    id: String,
    name: String,
    version: i32,
    description: Option<String>,
    trigger: Option<Value>,
    parameters: Option<Value>,
    steps: Option<Value>,
    status: String,
}

impl TryFrom<PipelineRow> for Pipeline {
    type Error = StoreError;

    fn try_from(row: PipelineRow) -> Result<Self, StoreError> {
        let trigger: PipelineTrigger = match row.trigger {
            Some(doc) => serde_json::from_value(doc)?,
            None => PipelineTrigger::default(),
        };
        let parameters: Vec<Value> = match row.parameters {
            Some(doc) => serde_json::from_value(doc)?,
            None => Vec::new(),
        };
        let steps: Vec<PipelineStep> = match row.steps {
            Some(doc) => serde_json::from_value(doc)?,
            None => Vec::new(),
        };

        Ok(Pipeline {
            id: row.id,
            name: row.name,
            version: row.version,
            description: row.description,
            trigger,
            parameters,
            steps,
            status: row.status,
        })
    }
}

#[derive(Debug, Queryable)]
struct ScheduleRow {
    id: String,
    name: String,
    description: Option<String>,
    cron_expr: String,
    timezone: String,
    enabled: bool,
    dag: Option<Value>,
    last_run_at: Option<DateTime<Utc>>,
    next_run_at: Option<DateTime<Utc>>,
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = StoreError;

    fn try_from(row: ScheduleRow) -> Result<Self, StoreError> {
        let dag: Vec<DagNode> = match row.dag {
            Some(doc) => serde_json::from_value(doc)?,
            None => Vec::new(),
        };

        Ok(Schedule {
            id: row.id,
            name: row.name,
            description: row.description,
            cron_expr: row.cron_expr,
            timezone: row.timezone,
            enabled: row.enabled,
            dag,
            last_run_at: row.last_run_at,
            next_run_at: row.next_run_at,
        })
    }
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = etl_executions)]
struct ExecutionRow {
    id: Uuid,
    schedule_id: Option<String>,
    schedule_name: Option<String>,
    pipeline_id: Option<String>,
    pipeline_name: Option<String>,
    status: String,
    trigger: String,
    params: Option<Value>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    duration: Option<i64>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<&Execution> for ExecutionRow {
    fn from(execution: &Execution) -> Self {
        Self {
            id: execution.id,
            schedule_id: execution.schedule_id.clone(),
            schedule_name: execution.schedule_name.clone(),
            pipeline_id: execution.pipeline_id.clone(),
            pipeline_name: execution.pipeline_name.clone(),
            status: execution.status.as_str().to_string(),
            trigger: execution.trigger.as_str().to_string(),
            params: Some(Value::Object(execution.params.clone())),
            started_at: execution.started_at,
            finished_at: execution.finished_at,
            duration: execution.duration_ms,
            error_message: execution.error_message.clone(),
            created_at: execution.created_at,
        }
    }
}

impl TryFrom<ExecutionRow> for Execution {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> Result<Self, StoreError> {
        let status = parse_status(&row.status)?;
        let trigger = match row.trigger.as_str() {
            "manual" => TriggerKind::Manual,
            "scheduled" => TriggerKind::Scheduled,
            other => return Err(StoreError::Corrupt(format!("unknown trigger '{other}'"))),
        };
        let params = match row.params {
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(StoreError::Corrupt(format!(
                    "params is not an object: {other}"
                )))
            }
            None => serde_json::Map::new(),
        };

        Ok(Execution {
            id: row.id,
            schedule_id: row.schedule_id,
            schedule_name: row.schedule_name,
            pipeline_id: row.pipeline_id,
            pipeline_name: row.pipeline_name,
            status,
            trigger,
            params,
            started_at: row.started_at,
            finished_at: row.finished_at,
            duration_ms: row.duration,
            error_message: row.error_message,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = etl_execution_tasks)]
struct TaskRow {
    id: Uuid,
    execution_id: Uuid,
    node_id: String,
    node_name: String,
    status: String,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    input_rows: Option<i64>,
    output_rows: Option<i64>,
    error: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<&ExecutionTask> for TaskRow {
    fn from(task: &ExecutionTask) -> Self {
        Self {
            id: task.id,
            execution_id: task.execution_id,
            node_id: task.node_id.clone(),
            node_name: task.node_name.clone(),
            status: task.status.as_str().to_string(),
            started_at: task.started_at,
            finished_at: task.finished_at,
            input_rows: task.input_rows,
            output_rows: task.output_rows,
            error: task.error.clone(),
            created_at: task.created_at,
        }
    }
}

impl TryFrom<TaskRow> for ExecutionTask {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, StoreError> {
        Ok(ExecutionTask {
            id: row.id,
            execution_id: row.execution_id,
            node_id: row.node_id,
            node_name: row.node_name,
            status: parse_status(&row.status)?,
            started_at: row.started_at,
            finished_at: row.finished_at,
            input_rows: row.input_rows,
            output_rows: row.output_rows,
            error: row.error,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = etl_execution_logs)]
struct NewLogRow {
    id: Uuid,
    execution_id: Uuid,
    task_id: Option<Uuid>,
    level: String,
    message: String,
    metadata: Option<Value>,
    created_at: DateTime<Utc>,
}

impl From<&ExecutionLog> for NewLogRow {
    fn from(log: &ExecutionLog) -> Self {
        Self {
            id: log.id,
            execution_id: log.execution_id,
            task_id: log.task_id,
            level: log.level.as_str().to_string(),
            message: log.message.clone(),
            metadata: Some(Value::Object(log.metadata.clone())),
            created_at: log.created_at,
        }
    }
}

fn parse_status(raw: &str) -> Result<ExecutionStatus, StoreError> {
    ExecutionStatus::parse(raw)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown status '{raw}'")))
}

// ---------------------------------------------------------------------------
// Store operations
// ---------------------------------------------------------------------------

#[async_trait]
impl MetadataStore for PgStore {
    async fn list_enabled_schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        let conn = self.database.get_connection().await?;

        let rows: Vec<ScheduleRow> = conn
            .interact(|conn| {
                etl_schedules::table
                    .filter(etl_schedules::enabled.eq(true))
                    .order(etl_schedules::id.asc())
                    .load(conn)
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        rows.into_iter().map(Schedule::try_from).collect()
    }

    async fn get_pipeline(&self, pipeline_id: &str) -> Result<Option<Pipeline>, StoreError> {
        let conn = self.database.get_connection().await?;

        let pipeline_id = pipeline_id.to_string();
        let row: Option<PipelineRow> = conn
            .interact(move |conn| {
                etl_pipelines::table
                    .find(pipeline_id)
                    .first::<PipelineRow>(conn)
                    .optional()
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        row.map(Pipeline::try_from).transpose()
    }

    async fn update_schedule_last_run(
        &self,
        schedule_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.database.get_connection().await?;

        let schedule_id = schedule_id.to_string();
        conn.interact(move |conn| {
            diesel::update(etl_schedules::table.find(schedule_id))
                .set(etl_schedules::last_run_at.eq(Some(at)))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    async fn update_schedule_next_run(
        &self,
        schedule_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.database.get_connection().await?;

        let schedule_id = schedule_id.to_string();
        conn.interact(move |conn| {
            diesel::update(etl_schedules::table.find(schedule_id))
                .set(etl_schedules::next_run_at.eq(Some(at)))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    async fn insert_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        let conn = self.database.get_connection().await?;

        let row = ExecutionRow::from(execution);
        conn.interact(move |conn| {
            diesel::insert_into(etl_executions::table)
                .values(&row)
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    async fn mark_execution_running(
        &self,
        execution_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.database.get_connection().await?;

        conn.interact(move |conn| {
            diesel::update(etl_executions::table.find(execution_id))
                .set((
                    etl_executions::status.eq(ExecutionStatus::Running.as_str()),
                    etl_executions::started_at.eq(Some(at)),
                ))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

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
        let conn = self.database.get_connection().await?;

        conn.interact(move |conn| {
            diesel::update(etl_executions::table.find(execution_id))
                .set((
                    etl_executions::status.eq(status.as_str()),
                    etl_executions::finished_at.eq(Some(finished_at)),
                    etl_executions::duration.eq(Some(duration_ms)),
                    etl_executions::error_message.eq(error),
                ))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    async fn get_execution(&self, execution_id: Uuid) -> Result<Option<Execution>, StoreError> {
        let conn = self.database.get_connection().await?;

        let row: Option<ExecutionRow> = conn
            .interact(move |conn| {
                etl_executions::table
                    .find(execution_id)
                    .first::<ExecutionRow>(conn)
                    .optional()
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        row.map(Execution::try_from).transpose()
    }

    async fn insert_task(&self, task: &ExecutionTask) -> Result<(), StoreError> {
        let conn = self.database.get_connection().await?;

        let row = TaskRow::from(task);
        conn.interact(move |conn| {
            diesel::insert_into(etl_execution_tasks::table)
                .values(&row)
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    async fn mark_task_running(&self, task_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.database.get_connection().await?;

        conn.interact(move |conn| {
            diesel::update(etl_execution_tasks::table.find(task_id))
                .set((
                    etl_execution_tasks::status.eq(ExecutionStatus::Running.as_str()),
                    etl_execution_tasks::started_at.eq(Some(at)),
                ))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

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
        let conn = self.database.get_connection().await?;

        conn.interact(move |conn| {
            diesel::update(etl_execution_tasks::table.find(task_id))
                .set((
                    etl_execution_tasks::status.eq(status.as_str()),
                    etl_execution_tasks::finished_at.eq(Some(finished_at)),
                    etl_execution_tasks::input_rows.eq(input_rows),
                    etl_execution_tasks::output_rows.eq(output_rows),
                    etl_execution_tasks::error.eq(error),
                ))
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    async fn list_tasks(&self, execution_id: Uuid) -> Result<Vec<ExecutionTask>, StoreError> {
        let conn = self.database.get_connection().await?;

        let rows: Vec<TaskRow> = conn
            .interact(move |conn| {
                etl_execution_tasks::table
                    .filter(etl_execution_tasks::execution_id.eq(execution_id))
                    .order(etl_execution_tasks::created_at.asc())
                    .load(conn)
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        rows.into_iter().map(ExecutionTask::try_from).collect()
    }

    async fn insert_log(&self, log: &ExecutionLog) -> Result<(), StoreError> {
        let conn = self.database.get_connection().await?;

        let row = NewLogRow::from(log);
        conn.interact(move |conn| {
            diesel::insert_into(etl_execution_logs::table)
                .values(&row)
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(())
    }
}

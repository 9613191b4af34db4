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

//! Shared fixtures: synthetic plugins, definition builders, and a test
//! harness over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use sluice::plugin::{ExtractPlugin, Frame, LoadPlugin, PluginContext, Row, TransformPlugin};
use sluice::{
    DagExecutor, DagNode, Execution, MemoryStore, MetadataStore, Pipeline, PipelineStep,
    PipelineTrigger, PluginConfig, PluginError, PluginRegistry, Schedule, StepKind,
};

// ---------------------------------------------------------------------------
// Synthetic plugins
// ---------------------------------------------------------------------------

/// Extract plugin yielding `rows` rows (config key, default 1).
struct RowsSource {
    rows: usize,
}

impl RowsSource {
    fn new(config: PluginConfig) -> Result<Self, PluginError> {
        Ok(Self {
            rows: config.get_i64("rows").unwrap_or(1) as usize,
        })
    }
}

#[async_trait]
impl ExtractPlugin for RowsSource {
    async fn extract(&self, _ctx: &PluginContext) -> Result<Frame, PluginError> {
        Ok(numbered_frame(self.rows))
    }
}

/// Extract plugin reading its row count from the `rows` execution param.
struct ParamRowsSource;

#[async_trait]
impl ExtractPlugin for ParamRowsSource {
    async fn extract(&self, ctx: &PluginContext) -> Result<Frame, PluginError> {
        let rows = ctx
            .get_param("rows")
            .and_then(Value::as_i64)
            .ok_or_else(|| PluginError::Failure(anyhow::anyhow!("missing 'rows' param")))?;
        Ok(numbered_frame(rows as usize))
    }
}

/// Extract plugin that always fails.
struct FailingSource;

#[async_trait]
impl ExtractPlugin for FailingSource {
    async fn extract(&self, _ctx: &PluginContext) -> Result<Frame, PluginError> {
        Err(PluginError::Failure(anyhow::anyhow!(
            "synthetic source failure"
        )))
    }
}

/// Extract plugin that sleeps `seconds` (config key) before yielding an
/// empty frame. Used for timeout scenarios.
struct SleepSource {
    seconds: u64,
}

impl SleepSource {
    fn new(config: PluginConfig) -> Result<Self, PluginError> {
        Ok(Self {
            seconds: config.get_i64("seconds").unwrap_or(1) as u64,
        })
    }
}

#[async_trait]
impl ExtractPlugin for SleepSource {
    async fn extract(&self, _ctx: &PluginContext) -> Result<Frame, PluginError> {
        tokio::time::sleep(Duration::from_secs(self.seconds)).await;
        Ok(Frame::new())
    }
}

/// Transform plugin keeping the first `count` rows (config key).
#[derive(Debug)]
struct HeadTransform {
    count: usize,
}

impl HeadTransform {
    fn new(config: PluginConfig) -> Result<Self, PluginError> {
        let count = config.require("count")?.as_i64().ok_or_else(|| {
            PluginError::InvalidConfig {
                key: "count".to_string(),
                reason: "expected an integer".to_string(),
            }
        })?;
        Ok(Self {
            count: count as usize,
        })
    }
}

#[async_trait]
impl TransformPlugin for HeadTransform {
    async fn transform(&self, _ctx: &PluginContext, frame: Frame) -> Result<Frame, PluginError> {
        Ok(frame.into_rows().into_iter().take(self.count).collect())
    }
}

/// Load plugin reporting every input row as written.
#[derive(Debug)]
struct CountingSink;

#[async_trait]
impl LoadPlugin for CountingSink {
    async fn load(&self, _ctx: &PluginContext, frame: Frame) -> Result<u64, PluginError> {
        Ok(frame.len() as u64)
    }
}

fn numbered_frame(rows: usize) -> Frame {
    (0..rows)
        .map(|i| {
            let mut row = Row::new();
            row.insert("n".to_string(), Value::from(i as i64));
            row
        })
        .collect()
}

/// Registry with every synthetic plugin installed.
pub fn test_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry.register_extract("rows_source", |config| Ok(Box::new(RowsSource::new(config)?)));
    registry.register_extract("param_rows_source", |_config| Ok(Box::new(ParamRowsSource)));
    registry.register_extract("failing_source", |_config| Ok(Box::new(FailingSource)));
    registry.register_extract("sleep_source", |config| Ok(Box::new(SleepSource::new(config)?)));
    registry.register_transform("head", |config| Ok(Box::new(HeadTransform::new(config)?)));
    registry.register_load("counting_sink", |_config| Ok(Box::new(CountingSink)));
    registry
}

// ---------------------------------------------------------------------------
// Definition builders
// ---------------------------------------------------------------------------

pub fn step(
    id: &str,
    kind: StepKind,
    plugin: &str,
    config: Value,
    input: Option<&str>,
    output: Option<&str>,
) -> PipelineStep {
    let config = match config {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => panic!("step config must be an object, got {other}"),
    };
    PipelineStep {
        id: id.into(),
        name: id.to_uppercase(),
        kind,
        plugin: plugin.into(),
        config,
        input: input.map(Into::into),
        output: output.map(Into::into),
        parallel: false,
        on_error: Default::default(),
    }
}

pub fn pipeline(id: &str, steps: Vec<PipelineStep>) -> Pipeline {
    Pipeline {
        id: id.into(),
        name: id.to_uppercase(),
        version: 1,
        description: None,
        trigger: PipelineTrigger::default(),
        parameters: vec![],
        steps,
        status: "active".into(),
    }
}

/// A one-step pipeline that extracts a single row.
pub fn noop_pipeline(id: &str) -> Pipeline {
    pipeline(
        id,
        vec![step(
            &format!("{id}_step"),
            StepKind::Extract,
            "rows_source",
            serde_json::json!({ "rows": 1 }),
            None,
            None,
        )],
    )
}

pub fn node(id: &str, pipeline_id: &str, depends_on: &[&str]) -> DagNode {
    DagNode {
        id: id.into(),
        name: id.to_uppercase(),
        pipeline_id: pipeline_id.into(),
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        params: Map::new(),
        timeout: 3600,
        retries: 0,
    }
}

pub fn schedule(id: &str, cron_expr: &str, dag: Vec<DagNode>) -> Schedule {
    Schedule {
        id: id.into(),
        name: id.to_uppercase(),
        description: None,
        cron_expr: cron_expr.into(),
        timezone: "UTC".into(),
        enabled: true,
        dag,
        last_run_at: None,
        next_run_at: None,
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub executor: DagExecutor,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let executor = DagExecutor::new(
            store.clone() as Arc<dyn MetadataStore>,
            Arc::new(test_registry()),
            10,
        );
        Self { store, executor }
    }
}

/// Polls the store until the execution reaches a terminal status.
pub async fn wait_for_terminal(store: &MemoryStore, execution_id: Uuid) -> Execution {
    for _ in 0..500 {
        if let Some(execution) = store.get_execution(execution_id).await.unwrap() {
            if execution.status.is_terminal() {
                return execution;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("execution {execution_id} never reached a terminal status");
}

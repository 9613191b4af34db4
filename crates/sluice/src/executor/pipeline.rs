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

//! Sequential pipeline execution.
//!
//! Steps run one at a time in an order derived from their `input`/`output`
//! declarations. Each step gets a task record, a plugin instance built
//! from the registry, and row accounting; its output frame is bound into
//! the shared variable environment for downstream steps. The first failing
//! step aborts the pipeline.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::graph;
use super::state::StateManager;
use crate::error::ExecutorError;
use crate::models::{ExecutionStatus, LogLevel, Pipeline, PipelineStep, StepKind};
use crate::plugin::{Frame, PluginConfig, PluginContext, Variable};
use crate::registry::PluginRegistry;

/// Runs one pipeline's steps sequentially against a shared variable
/// environment.
#[derive(Clone)]
pub struct PipelineExecutor {
    state: StateManager,
    registry: Arc<PluginRegistry>,
}

impl PipelineExecutor {
    pub fn new(state: StateManager, registry: Arc<PluginRegistry>) -> Self {
        Self { state, registry }
    }

    /// Executes every step of `pipeline` under `execution_id`.
    ///
    /// Returns `Ok(true)` when all steps succeed and `Ok(false)` when a
    /// step fails (the failure is recorded on its task). An `Err` means
    /// the pipeline could not be run at all (invalid topology or a
    /// metadata store failure).
    pub async fn execute(
        &self,
        pipeline: &Pipeline,
        execution_id: Uuid,
        params: &Map<String, Value>,
    ) -> Result<bool, ExecutorError> {
        info!(
            pipeline_id = %pipeline.id,
            pipeline_name = %pipeline.name,
            "Executing pipeline"
        );

        let steps = graph::sort_steps(&pipeline.steps)?;
        let mut ctx = PluginContext::new(execution_id, params.clone());

        for step in steps {
            let task_id = self
                .state
                .create_task(execution_id, &step.id, &step.name)
                .await?;
            ctx.task_id = task_id;
            self.state.start_task(task_id).await?;

            debug!(
                step_id = %step.id,
                step_name = %step.name,
                step_kind = %step.kind,
                "Executing step"
            );

            match self.run_step(step, &mut ctx).await {
                Ok((input_rows, output_rows)) => {
                    self.state
                        .complete_task(
                            task_id,
                            ExecutionStatus::Success,
                            Some(input_rows as i64),
                            Some(output_rows as i64),
                            None,
                        )
                        .await?;
                    debug!(step_id = %step.id, input_rows, output_rows, "Step completed");
                }
                Err(e) => {
                    let message = e.to_string();
                    error!(step_id = %step.id, error = %message, "Step failed");

                    self.state
                        .complete_task(
                            task_id,
                            ExecutionStatus::Failed,
                            None,
                            None,
                            Some(message.clone()),
                        )
                        .await?;
                    self.state
                        .add_log(
                            execution_id,
                            Some(task_id),
                            LogLevel::Error,
                            format!("Step {} failed: {}", step.name, message),
                            Map::new(),
                        )
                        .await?;

                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// Runs one step, returning `(input_rows, output_rows)`.
    async fn run_step(
        &self,
        step: &PipelineStep,
        ctx: &mut PluginContext,
    ) -> Result<(u64, u64), ExecutorError> {
        let config = PluginConfig::new(step.config.clone());

        match step.kind {
            StepKind::Extract => {
                let plugin = self.registry.get_extract(&step.plugin, config)?;
                let frame = plugin.extract(ctx).await?;
                let output_rows = frame.len() as u64;
                ctx.set_frame(step.output_variable(), frame);
                Ok((0, output_rows))
            }
            StepKind::Transform => {
                let input = resolve_input(step, ctx)?.clone();
                let input_rows = input.len() as u64;
                let plugin = self.registry.get_transform(&step.plugin, config)?;
                let frame = plugin.transform(ctx, input).await?;
                let output_rows = frame.len() as u64;
                ctx.set_frame(step.output_variable(), frame);
                Ok((input_rows, output_rows))
            }
            StepKind::Load => {
                let input = resolve_input(step, ctx)?.clone();
                let input_rows = input.len() as u64;
                let plugin = self.registry.get_load(&step.plugin, config)?;
                let rows_written = plugin.load(ctx, input).await?;
                Ok((input_rows, rows_written))
            }
        }
    }
}

/// Resolves the input frame for a transform/load step.
///
/// A declared input must be bound and must hold a frame. Without a
/// declaration the step reads the most recently bound frame, which is the
/// deterministic fallback rule.
fn resolve_input<'a>(
    step: &PipelineStep,
    ctx: &'a PluginContext,
) -> Result<&'a Frame, ExecutorError> {
    match &step.input {
        Some(name) => match ctx.get_variable(name) {
            Some(Variable::Frame(frame)) => Ok(frame),
            Some(Variable::Value(_)) => Err(ExecutorError::InputTypeMismatch(name.clone())),
            None => Err(ExecutorError::InputNotFound(name.clone())),
        },
        None => ctx.last_frame().ok_or_else(|| {
            ExecutorError::InputNotFound(format!("no frame available for step '{}'", step.id))
        }),
    }
}

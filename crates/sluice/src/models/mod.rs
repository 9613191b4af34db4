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

//! Domain models for pipelines, schedules, and execution records.
//!
//! These are API-level types; row-level shapes for database storage live
//! in the data access layer. All document fields (`steps`, `dag`, `params`)
//! round-trip through serde, matching the JSON columns of the metadata
//! store.

mod execution;
mod pipeline;
mod schedule;

pub use execution::{
    Execution, ExecutionLog, ExecutionStatus, ExecutionTask, LogLevel, TriggerKind,
};
pub use pipeline::{ErrorPolicy, Pipeline, PipelineStep, PipelineTrigger, StepKind};
pub use schedule::{DagNode, Schedule};

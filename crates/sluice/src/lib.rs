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

//! # Sluice
//!
//! An embeddable ETL execution engine. Operators author **pipelines**
//! (directed graphs of extract/transform/load steps) and **schedules**
//! (cron-triggered DAGs of pipelines with cross-pipeline dependencies);
//! Sluice persists them in a relational metadata store and executes them:
//!
//! - The [`CronScheduler`](scheduler::CronScheduler) fires enabled
//!   schedules at their cron instants, evaluated in each schedule's IANA
//!   timezone, and reconciles its job set with the store so edits apply
//!   without a restart.
//! - The [`DagExecutor`](executor::DagExecutor) runs a schedule's nodes in
//!   dependency-ordered parallel batches with per-node timeouts, skipping
//!   nodes whose predecessors failed.
//! - The [`PipelineExecutor`](executor::PipelineExecutor) runs one
//!   pipeline's steps sequentially, exchanging tabular
//!   [`Frame`](plugin::Frame)s through a per-execution variable
//!   environment and recording per-step row counts.
//!
//! Concrete sources, transforms, and sinks are plugins: external
//! implementations of the three capability traits in [`plugin`],
//! registered by name in a [`PluginRegistry`](registry::PluginRegistry)
//! at startup.
//!
//! The [`Engine`](engine::Engine) facade ties it together for embedding
//! services: start/stop, plugin inventory, active schedules, and manual
//! triggers that return an execution id immediately while the run
//! proceeds asynchronously.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use sluice::{Engine, EngineConfig, PluginRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut registry = PluginRegistry::new();
//!     registry.register_extract("csv_source", |config| {
//!         Ok(Box::new(CsvSource::new(config)?))
//!     });
//!
//!     let engine = Engine::new(EngineConfig::from_env()?, registry)?;
//!     engine.start().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dal;
pub mod database;
pub mod engine;
pub mod error;
pub mod executor;
pub mod models;
pub mod plugin;
pub mod registry;
pub mod scheduler;

pub use config::EngineConfig;
pub use dal::{MemoryStore, MetadataStore, PgStore};
pub use database::Database;
pub use engine::Engine;
pub use error::{
    ConfigError, EngineError, ExecutorError, PluginError, RegistryError, SchedulerError,
    StoreError,
};
pub use executor::{DagExecutor, PipelineExecutor, StateManager};
pub use models::{
    DagNode, ErrorPolicy, Execution, ExecutionLog, ExecutionStatus, ExecutionTask, LogLevel,
    Pipeline, PipelineStep, PipelineTrigger, Schedule, StepKind, TriggerKind,
};
pub use plugin::{
    ExtractPlugin, Frame, LoadPlugin, PluginConfig, PluginContext, Row, TransformPlugin, Variable,
};
pub use registry::{PluginInventory, PluginRegistry};
pub use scheduler::CronScheduler;

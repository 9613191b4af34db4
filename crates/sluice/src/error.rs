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

//! Error types for the Sluice engine.
//!
//! Each subsystem owns one error enum; higher layers wrap lower ones
//! transparently so callers can match on the original failure. Plugin
//! failures are opaque: plugins are external code, so their errors
//! arrive as [`anyhow::Error`] payloads.

use thiserror::Error;

use crate::models::StepKind;

/// Errors raised by plugins or plugin configuration access.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A required configuration key was absent.
    #[error("missing required config: {key}")]
    MissingConfig { key: String },

    /// A configuration key was present but had the wrong shape.
    #[error("invalid config value for '{key}': {reason}")]
    InvalidConfig { key: String, reason: String },

    /// Any failure raised by the plugin body itself.
    #[error("plugin failure: {0}")]
    Failure(#[from] anyhow::Error),
}

/// Errors raised by plugin registry lookups and construction.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No plugin registered under the requested name for this kind.
    #[error("unknown {kind} plugin: {name}")]
    UnknownPlugin { kind: StepKind, name: String },

    /// The plugin's constructor rejected its configuration.
    #[error(transparent)]
    Construction(#[from] PluginError),
}

/// Errors raised by the metadata store gateway.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to obtain a connection from the pool or to run the
    /// closure on it.
    #[error("connection pool error: {0}")]
    ConnectionPool(String),

    /// The database rejected a statement.
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// A stored JSON document (steps, dag, params, ...) failed to
    /// deserialize into its domain shape.
    #[error("invalid stored document: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored scalar (status, trigger) held a value outside its domain.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Errors raised by the DAG and pipeline executors.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The schedule's DAG has a cycle or an unresolvable dependency.
    #[error("invalid DAG: {0}")]
    InvalidDag(String),

    /// The pipeline's steps have a circular input/output dependency.
    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// No pipeline with the given id exists in the store.
    #[error("pipeline not found: {0}")]
    PipelineNotFound(String),

    /// A step declared an input variable that is not bound in the
    /// execution environment.
    #[error("input not found: {0}")]
    InputNotFound(String),

    /// A step's input variable is bound but does not hold a frame.
    #[error("input '{0}' is not a frame")]
    InputTypeMismatch(String),

    /// A DAG node exceeded its declared timeout.
    #[error("node '{node_id}' timed out after {timeout_secs}s")]
    NodeTimeout { node_id: String, timeout_secs: u64 },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by the cron scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No schedule with the given id is active or enabled in the store.
    #[error("schedule not found: {0}")]
    ScheduleNotFound(String),

    /// A schedule's cron expression failed to parse.
    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    /// A schedule's timezone is not a recognized IANA identifier.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Errors raised while loading engine configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable was set but could not be parsed.
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

/// Errors surfaced by the [`Engine`](crate::engine::Engine) facade.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine has not been started yet.
    #[error("engine not started")]
    Unavailable,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

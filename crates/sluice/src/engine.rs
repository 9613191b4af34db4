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

//! The engine facade: the management surface an embedding service (HTTP
//! layer, CLI) talks to.
//!
//! Construction wires the metadata store, executors, and scheduler
//! together; `start()`/`shutdown()` drive the scheduler lifecycle. Trigger
//! operations return an execution id immediately; the run proceeds
//! asynchronously and its outcome is observed through the executions
//! table.
//!
//! # Example
//!
//! ```rust,ignore
//! use sluice::{Engine, EngineConfig, PluginRegistry};
//!
//! let mut registry = PluginRegistry::new();
//! register_builtin_plugins(&mut registry);
//!
//! let engine = Engine::new(EngineConfig::from_env()?, registry)?;
//! engine.start().await?;
//!
//! let execution_id = engine.trigger_pipeline("daily_prices", None).await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::dal::{MetadataStore, PgStore};
use crate::database::Database;
use crate::error::EngineError;
use crate::executor::DagExecutor;
use crate::models::TriggerKind;
use crate::registry::{PluginInventory, PluginRegistry};
use crate::scheduler::{ActiveSchedule, CronScheduler};

/// The assembled ETL engine.
pub struct Engine {
    config: EngineConfig,
    registry: Arc<PluginRegistry>,
    executor: DagExecutor,
    scheduler: CronScheduler,
    started: AtomicBool,
}

impl Engine {
    /// Builds an engine over the PostgreSQL metadata store described by
    /// `config`. Plugins must already be registered; registration is
    /// bulk at startup.
    pub fn new(config: EngineConfig, registry: PluginRegistry) -> Result<Self, EngineError> {
        let database = Database::new(&config.database_url(), config.db_pool_size)?;
        let store: Arc<dyn MetadataStore> = Arc::new(PgStore::new(database));
        Ok(Self::with_store(config, registry, store))
    }

    /// Builds an engine over any metadata store implementation.
    pub fn with_store(
        config: EngineConfig,
        registry: PluginRegistry,
        store: Arc<dyn MetadataStore>,
    ) -> Self {
        let registry = Arc::new(registry);
        let executor = DagExecutor::new(
            store.clone(),
            registry.clone(),
            config.max_concurrent_tasks,
        );
        let scheduler = CronScheduler::new(
            store,
            executor.clone(),
            config.scheduler_enabled,
            config.scheduler_poll_interval,
        );

        Self {
            config,
            registry,
            executor,
            scheduler,
            started: AtomicBool::new(false),
        }
    }

    /// Starts the engine: logs the plugin inventory and brings the cron
    /// scheduler up (a no-op when disabled by configuration).
    pub async fn start(&self) -> Result<(), EngineError> {
        let inventory = self.registry.list();
        info!(
            service_port = self.config.service_port,
            extract_plugins = inventory.extract.len(),
            transform_plugins = inventory.transform.len(),
            load_plugins = inventory.load.len(),
            "Starting ETL engine"
        );

        self.scheduler.start().await?;
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stops the scheduler, waiting briefly for in-flight firings.
    pub async fn shutdown(&self) {
        info!("Shutting down ETL engine");
        self.started.store(false, Ordering::SeqCst);
        self.scheduler.stop().await;
        info!("ETL engine stopped");
    }

    /// Registered plugin names, by kind.
    pub fn list_plugins(&self) -> PluginInventory {
        self.registry.list()
    }

    /// Snapshots of the schedules with active cron jobs.
    pub async fn active_schedules(&self) -> Vec<ActiveSchedule> {
        self.scheduler.get_active_schedules().await
    }

    /// Runs a schedule now with a `manual` trigger. Returns the execution
    /// id immediately; the run proceeds asynchronously.
    pub async fn trigger_schedule(
        &self,
        schedule_id: &str,
        params: Option<Map<String, Value>>,
    ) -> Result<Uuid, EngineError> {
        self.ensure_started()?;
        Ok(self.scheduler.trigger_manual(schedule_id, params).await?)
    }

    /// Runs a standalone pipeline now with a `manual` trigger. Returns
    /// the execution id immediately; the run proceeds asynchronously.
    pub async fn trigger_pipeline(
        &self,
        pipeline_id: &str,
        params: Option<Map<String, Value>>,
    ) -> Result<Uuid, EngineError> {
        self.ensure_started()?;
        Ok(self
            .executor
            .submit_pipeline(pipeline_id, TriggerKind::Manual, params)
            .await?)
    }

    /// Borrow the scheduler (embedders that need direct access).
    pub fn scheduler(&self) -> &CronScheduler {
        &self.scheduler
    }

    /// Borrow the DAG executor.
    pub fn executor(&self) -> &DagExecutor {
        &self.executor
    }

    /// Borrow the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn ensure_started(&self) -> Result<(), EngineError> {
        if self.started.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::Unavailable)
        }
    }
}

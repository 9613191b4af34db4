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

//! # Plugin Registry
//!
//! Name → constructor tables for the three plugin capability kinds.
//! Registration is bulk at startup; after that the registry is shared
//! immutably behind an `Arc` and lookups construct a fresh plugin instance
//! per step execution.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut registry = PluginRegistry::new();
//! registry.register_extract("csv_source", |config| {
//!     Ok(Box::new(CsvSource::new(config)?))
//! });
//! registry.register_load("csv_target", |config| {
//!     Ok(Box::new(CsvTarget::new(config)?))
//! });
//!
//! let plugin = registry.get_extract("csv_source", config)?;
//! ```

use std::collections::HashMap;

use tracing::debug;

use crate::error::{PluginError, RegistryError};
use crate::models::StepKind;
use crate::plugin::{ExtractPlugin, LoadPlugin, PluginConfig, TransformPlugin};

type ExtractConstructor =
    Box<dyn Fn(PluginConfig) -> Result<Box<dyn ExtractPlugin>, PluginError> + Send + Sync>;
type TransformConstructor =
    Box<dyn Fn(PluginConfig) -> Result<Box<dyn TransformPlugin>, PluginError> + Send + Sync>;
type LoadConstructor =
    Box<dyn Fn(PluginConfig) -> Result<Box<dyn LoadPlugin>, PluginError> + Send + Sync>;

/// Registered plugin names, by kind. Returned by [`PluginRegistry::list`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PluginInventory {
    pub extract: Vec<String>,
    pub transform: Vec<String>,
    pub load: Vec<String>,
}

/// Registry holding three disjoint name → constructor tables.
#[derive(Default)]
pub struct PluginRegistry {
    extract: HashMap<String, ExtractConstructor>,
    transform: HashMap<String, TransformConstructor>,
    load: HashMap<String, LoadConstructor>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an extract plugin constructor under `name`.
    ///
    /// Re-registering a name replaces the previous constructor.
    pub fn register_extract<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(PluginConfig) -> Result<Box<dyn ExtractPlugin>, PluginError> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(plugin = %name, "Registered extract plugin");
        self.extract.insert(name, Box::new(constructor));
    }

    /// Registers a transform plugin constructor under `name`.
    pub fn register_transform<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(PluginConfig) -> Result<Box<dyn TransformPlugin>, PluginError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        debug!(plugin = %name, "Registered transform plugin");
        self.transform.insert(name, Box::new(constructor));
    }

    /// Registers a load plugin constructor under `name`.
    pub fn register_load<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(PluginConfig) -> Result<Box<dyn LoadPlugin>, PluginError> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(plugin = %name, "Registered load plugin");
        self.load.insert(name, Box::new(constructor));
    }

    /// Constructs the extract plugin registered under `name`.
    pub fn get_extract(
        &self,
        name: &str,
        config: PluginConfig,
    ) -> Result<Box<dyn ExtractPlugin>, RegistryError> {
        let constructor = self
            .extract
            .get(name)
            .ok_or_else(|| RegistryError::UnknownPlugin {
                kind: StepKind::Extract,
                name: name.to_string(),
            })?;
        Ok(constructor(config)?)
    }

    /// Constructs the transform plugin registered under `name`.
    pub fn get_transform(
        &self,
        name: &str,
        config: PluginConfig,
    ) -> Result<Box<dyn TransformPlugin>, RegistryError> {
        let constructor = self
            .transform
            .get(name)
            .ok_or_else(|| RegistryError::UnknownPlugin {
                kind: StepKind::Transform,
                name: name.to_string(),
            })?;
        Ok(constructor(config)?)
    }

    /// Constructs the load plugin registered under `name`.
    pub fn get_load(
        &self,
        name: &str,
        config: PluginConfig,
    ) -> Result<Box<dyn LoadPlugin>, RegistryError> {
        let constructor = self
            .load
            .get(name)
            .ok_or_else(|| RegistryError::UnknownPlugin {
                kind: StepKind::Load,
                name: name.to_string(),
            })?;
        Ok(constructor(config)?)
    }

    /// Lists registered plugin names per kind, sorted.
    pub fn list(&self) -> PluginInventory {
        let mut extract: Vec<String> = self.extract.keys().cloned().collect();
        let mut transform: Vec<String> = self.transform.keys().cloned().collect();
        let mut load: Vec<String> = self.load.keys().cloned().collect();
        extract.sort();
        transform.sort();
        load.sort();
        PluginInventory {
            extract,
            transform,
            load,
        }
    }
}

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

//! Plugin capability contract.
//!
//! Plugins are externally-supplied implementations of one of three
//! capability kinds. The engine constructs them by name through the
//! [registry](crate::registry), hands them a [`PluginContext`], and
//! consumes nothing of their output beyond frame row counts.
//!
//! Plugins may be long-running; they must honor cancellation at their
//! `.await` points, which is where the node timeout cuts in.
//!
//! # Example
//!
//! ```rust,ignore
//! use sluice::plugin::{ExtractPlugin, Frame, PluginConfig, PluginContext};
//! use sluice::error::PluginError;
//! use async_trait::async_trait;
//!
//! struct CsvSource {
//!     path: String,
//! }
//!
//! impl CsvSource {
//!     fn new(config: PluginConfig) -> Result<Self, PluginError> {
//!         Ok(Self {
//!             path: config.require_str("path")?.to_string(),
//!         })
//!     }
//! }
//!
//! #[async_trait]
//! impl ExtractPlugin for CsvSource {
//!     async fn extract(&self, _ctx: &PluginContext) -> Result<Frame, PluginError> {
//!         let rows = read_csv(&self.path).await?;
//!         Ok(Frame::from_rows(rows))
//!     }
//! }
//! ```

mod config;
mod context;
mod frame;

pub use config::PluginConfig;
pub use context::{PluginContext, Variable};
pub use frame::{Frame, Row};

use async_trait::async_trait;

use crate::error::PluginError;

/// A plugin that produces a frame from an external source.
#[async_trait]
pub trait ExtractPlugin: Send + Sync {
    async fn extract(&self, ctx: &PluginContext) -> Result<Frame, PluginError>;
}

/// A plugin that maps an input frame to an output frame.
#[async_trait]
pub trait TransformPlugin: Send + Sync + std::fmt::Debug {
    async fn transform(&self, ctx: &PluginContext, frame: Frame) -> Result<Frame, PluginError>;
}

/// A plugin that writes a frame to an external sink.
///
/// Returns the number of rows actually written, which may differ from the
/// input row count (deduplicating sinks, upserts).
#[async_trait]
pub trait LoadPlugin: Send + Sync + std::fmt::Debug {
    async fn load(&self, ctx: &PluginContext, frame: Frame) -> Result<u64, PluginError>;
}

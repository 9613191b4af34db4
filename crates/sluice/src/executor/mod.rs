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

//! Execution engines.
//!
//! The [`DagExecutor`] runs a schedule's DAG in dependency-ordered
//! parallel batches; the [`PipelineExecutor`] runs one pipeline's steps
//! sequentially, threading the variable environment between them. All
//! state transitions flow through the [`StateManager`].

pub mod dag;
pub mod graph;
pub mod pipeline;
pub mod state;

pub use dag::DagExecutor;
pub use pipeline::PipelineExecutor;
pub use state::{ExecutionScope, StateManager};

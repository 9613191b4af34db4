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

//! Per-execution context threaded through pipeline steps.
//!
//! One [`PluginContext`] exists per pipeline execution. The pipeline
//! executor rebinds `task_id` before each step and binds each step's
//! output frame into the variable environment, where subsequent steps
//! resolve their inputs. Steps run one at a time, so the environment
//! needs no synchronization.

use std::collections::HashMap;

use serde_json::{Map, Value};
use uuid::Uuid;

use super::frame::Frame;

/// A value bound in the execution's variable environment.
///
/// Step outputs are frames; plugins may additionally stash scalar values
/// for downstream steps (lookup keys, watermarks). Resolving a step input
/// against a non-frame variable is a type mismatch.
#[derive(Debug, Clone)]
pub enum Variable {
    Frame(Frame),
    Value(Value),
}

impl Variable {
    /// Borrow the frame, if this variable holds one.
    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            Variable::Frame(frame) => Some(frame),
            Variable::Value(_) => None,
        }
    }
}

/// Execution-scoped context handed to every plugin invocation.
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// The execution this step belongs to.
    pub execution_id: Uuid,
    /// The task record for the currently running step.
    pub task_id: Uuid,
    params: Map<String, Value>,
    variables: HashMap<String, Variable>,
    /// Name of the most recently bound frame, for steps that declare no
    /// input.
    last_frame: Option<String>,
}

impl PluginContext {
    /// Creates a context with an empty variable environment.
    pub fn new(execution_id: Uuid, params: Map<String, Value>) -> Self {
        Self {
            execution_id,
            task_id: Uuid::nil(),
            params,
            variables: HashMap::new(),
            last_frame: None,
        }
    }

    /// Looks up a caller-supplied parameter.
    pub fn get_param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Borrow all caller-supplied parameters.
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Binds a frame under `name`, making it the most recently produced
    /// frame in the environment.
    pub fn set_frame(&mut self, name: impl Into<String>, frame: Frame) {
        let name = name.into();
        self.last_frame = Some(name.clone());
        self.variables.insert(name, Variable::Frame(frame));
    }

    /// Binds a scalar value under `name`.
    pub fn set_value(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), Variable::Value(value));
    }

    /// Looks up a variable by name.
    pub fn get_variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// Looks up a frame by name, ignoring non-frame variables.
    pub fn get_frame(&self, name: &str) -> Option<&Frame> {
        self.variables.get(name).and_then(Variable::as_frame)
    }

    /// The most recently bound frame, if any.
    ///
    /// This is the deterministic fallback for transform/load steps that
    /// declare no input.
    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame
            .as_deref()
            .and_then(|name| self.get_frame(name))
    }
}

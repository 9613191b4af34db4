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

//! Pipeline definitions: ordered graphs of extract/transform/load steps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The capability kind of a pipeline step.
///
/// Dispatch over step kinds is exhaustive; there is no fourth kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Produces a frame from an external source.
    Extract,
    /// Maps an input frame to an output frame.
    Transform,
    /// Writes an input frame to an external sink.
    Load,
}

impl StepKind {
    /// Returns the string representation of the step kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Extract => "extract",
            StepKind::Transform => "transform",
            StepKind::Load => "load",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a step reacts to row-level errors.
///
/// The engine itself only ever aborts on failure (`Fail`); the other
/// policies are honored inside plugins that support them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    SkipRow,
    #[default]
    Fail,
    DefaultValue,
}

/// One extract/transform/load unit inside a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    /// Registry name of the plugin implementing this step.
    pub plugin: String,
    /// Opaque plugin configuration; the engine passes it through untouched.
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Variable the step reads its input frame from. A step with no input
    /// declaration depends on nothing.
    #[serde(default)]
    pub input: Option<String>,
    /// Variable the step binds its output frame to (defaults to the step id).
    #[serde(default)]
    pub output: Option<String>,
    /// Advisory only; steps always run sequentially.
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub on_error: ErrorPolicy,
}

impl PipelineStep {
    /// The variable name this step's output frame is bound under.
    pub fn output_variable(&self) -> &str {
        self.output.as_deref().unwrap_or(&self.id)
    }
}

/// How a pipeline is triggered when run standalone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTrigger {
    #[serde(rename = "type", default = "default_trigger_kind")]
    pub kind: String,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for PipelineTrigger {
    fn default() -> Self {
        Self {
            kind: default_trigger_kind(),
            schedule: None,
            timezone: default_timezone(),
        }
    }
}

fn default_trigger_kind() -> String {
    "manual".to_string()
}

pub(crate) fn default_timezone() -> String {
    "UTC".to_string()
}

/// A pipeline definition: the unit executed by a DAG node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: i32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub trigger: PipelineTrigger,
    /// Parameter schema, opaque to the engine.
    #[serde(default)]
    pub parameters: Vec<Value>,
    #[serde(default)]
    pub steps: Vec<PipelineStep>,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_version() -> i32 {
    1
}

fn default_status() -> String {
    "draft".to_string()
}

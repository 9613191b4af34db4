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

//! Schedule definitions: cron-triggered DAGs of pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::pipeline::default_timezone;

/// One node of a schedule's DAG, referencing a pipeline to execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagNode {
    pub id: String,
    pub name: String,
    pub pipeline_id: String,
    /// Ids of sibling nodes that must complete successfully first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Per-node parameter overrides; win over caller params on collision.
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Node execution deadline in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Declared but not consumed by the executor.
    #[serde(default)]
    pub retries: u32,
}

fn default_timeout() -> u64 {
    3600
}

/// A cron-triggered DAG of pipelines.
///
/// `last_run_at` / `next_run_at` are engine-maintained; everything else is
/// operator-authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Five-field POSIX cron expression, evaluated in `timezone`.
    pub cron_expr: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub dag: Vec<DagNode>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_run_at: Option<DateTime<Utc>>,
}

impl Schedule {
    /// Whether the fields that define the cron job differ between two
    /// versions of the same schedule. Used by reconciliation to decide
    /// when to reinstall a job.
    pub fn job_differs(&self, other: &Schedule) -> bool {
        self.cron_expr != other.cron_expr
            || self.timezone != other.timezone
            || self.dag != other.dag
    }
}

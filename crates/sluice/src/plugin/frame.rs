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

//! The tabular dataset exchanged between pipeline steps.
//!
//! A [`Frame`] is an ordered sequence of rows, each a mapping from column
//! name to JSON value. The engine treats frames as opaque: it only ever
//! asks for the row count. Column-level operations live entirely inside
//! plugins.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row: column name → typed value.
pub type Row = Map<String, Value>;

/// An opaque tabular dataset with a defined row count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    rows: Vec<Row>,
}

impl Frame {
    /// Creates an empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a frame from a sequence of rows. Row order is preserved.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Number of rows in the frame.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the frame holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Borrow the rows.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Consume the frame, yielding its rows.
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl FromIterator<Row> for Frame {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

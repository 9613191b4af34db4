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

//! Opaque plugin configuration mapping.

use serde_json::{Map, Value};

use crate::error::PluginError;

/// Configuration handed to a plugin constructor.
///
/// The engine passes step config through untouched; the accessors here are
/// the plugin-side contract: `get` for optional keys, `require` for keys
/// whose absence is a [`PluginError::MissingConfig`].
#[derive(Debug, Clone, Default)]
pub struct PluginConfig(Map<String, Value>);

impl PluginConfig {
    pub fn new(config: Map<String, Value>) -> Self {
        Self(config)
    }

    /// Looks up an optional key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Looks up a required key.
    pub fn require(&self, key: &str) -> Result<&Value, PluginError> {
        self.0.get(key).ok_or_else(|| PluginError::MissingConfig {
            key: key.to_string(),
        })
    }

    /// Looks up an optional string key.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Looks up a required string key.
    pub fn require_str(&self, key: &str) -> Result<&str, PluginError> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| PluginError::InvalidConfig {
                key: key.to_string(),
                reason: "expected a string".to_string(),
            })
    }

    /// Looks up an optional integer key.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    /// Borrow the underlying mapping.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for PluginConfig {
    fn from(config: Map<String, Value>) -> Self {
        Self(config)
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Configuration for the wallet engine and its store.
//!
//! Every field has a default, so an empty TOML document is a valid config:
//!
//! ```toml
//! [engine]
//! allow_self_transfer = false
//!
//! [store]
//! max_commit_attempts = 32
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub store: StoreConfig,
}

impl Config {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.store.max_commit_attempts == 0 {
            return Err(ConfigError::Invalid(
                "store.max_commit_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Business-rule switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Accept transfers whose payer and payee are the same user. Such a
    /// transfer leaves the balance unchanged but is still logged.
    pub allow_self_transfer: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allow_self_transfer: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Times a unit of work is attempted before a commit conflict is
    /// reported as a store failure. Retries back off, so the budget mostly
    /// bounds latency under heavy contention on a single row.
    pub max_commit_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: 1_000,
        }
    }
}

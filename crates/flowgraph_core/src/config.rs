// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine settings.
//!
//! Settings are stored as RON, for example:
//!
//! ```ron
//! EngineConfig(
//!     allow_multiple_inputs: false,
//!     max_evaluation_depth: 10000,
//!     history_limit: 32,
//! )
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default cap on the evaluation work stack
pub const DEFAULT_MAX_EVALUATION_DEPTH: usize = 10_000;

/// Default number of undo steps kept
pub const DEFAULT_HISTORY_LIMIT: usize = 32;

/// Error loading or saving settings
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read or written
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid RON
    #[error("Invalid config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// The settings could not be serialized
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),

    /// A setting is out of range
    #[error("Invalid setting '{name}': {reason}")]
    Invalid {
        /// Setting name
        name: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Settings controlling graph editing and evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Allow more than one edge on an input socket. When off, connecting an
    /// input evicts its previous edge.
    pub allow_multiple_inputs: bool,
    /// Maximum depth of the evaluation work stack
    pub max_evaluation_depth: usize,
    /// Number of undo steps kept by [`History`](crate::History)
    pub history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allow_multiple_inputs: false,
            max_evaluation_depth: DEFAULT_MAX_EVALUATION_DEPTH,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Parse settings from RON text
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize settings as pretty RON
    pub fn to_ron(&self) -> Result<String, ConfigError> {
        let pretty = ron::ser::PrettyConfig::default().struct_names(true);
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_ron(&content)?;
        tracing::debug!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_evaluation_depth == 0 {
            return Err(ConfigError::Invalid {
                name: "max_evaluation_depth",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All configuration sections are defined here with appropriate defaults.

use crate::line::{LineConfig, LineConfigBuilder, LineError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial line configuration
    pub line: LineSection,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Serial line configuration section.
///
/// The line parameters sit directly in `[line]` next to the identifier:
///
/// ```toml
/// [line]
/// identifier = "COM3"
/// baud_rate = 115200
/// parity = "even"
/// read_timeout_ms = 50
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSection {
    /// Line identifier (e.g. "COM3" or "/dev/ttyUSB0") or an alias
    pub identifier: String,
    /// Short names for line identifiers
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    /// Line parameters, validated when turned into a `LineConfig`
    #[serde(flatten)]
    pub settings: LineConfigBuilder,
}

impl Default for LineSection {
    fn default() -> Self {
        Self {
            identifier: "COM1".to_string(),
            aliases: HashMap::new(),
            settings: LineConfigBuilder::default(),
        }
    }
}

impl LineSection {
    /// Validated line parameters.
    pub fn line_config(&self) -> Result<LineConfig, LineError> {
        self.settings.clone().build()
    }

    /// Resolve a line name through aliases
    pub fn resolve_identifier(&self, name: &str) -> String {
        self.aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// The configured identifier, alias-resolved.
    pub fn resolved_identifier(&self) -> String {
        self.resolve_identifier(&self.identifier)
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive used when RUST_LOG is unset
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    Pretty,
    /// Compact format
    #[default]
    Compact,
}

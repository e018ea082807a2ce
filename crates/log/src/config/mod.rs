//! Logging configuration.

mod presets;

use serde::{Deserialize, Serialize};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Level filter in `EnvFilter` syntax (e.g. `info`, `debug,codenode::python=trace`)
    pub level: String,

    /// Output format
    pub format: Format,

    /// Display options
    pub display: DisplayConfig,

    /// Fields recorded on a root span around everything logged
    pub fields: Fields,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Compact,
            display: DisplayConfig::default(),
            fields: Fields::default(),
        }
    }
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Human-readable, multi-line
    Pretty,
    /// Single-line
    Compact,
    /// One JSON object per event
    Json,
}

impl Format {
    /// Parse a format name; unknown names fall back to compact.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "pretty" => Self::Pretty,
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Display configuration
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Show timestamps
    pub time: bool,
    /// Show source location (`file:line`)
    pub source: bool,
    /// Show target module
    pub target: bool,
    /// Show thread IDs
    pub thread_ids: bool,
    /// Show thread names
    pub thread_names: bool,
    /// Use ANSI colors
    pub colors: bool,
    /// Show span list in JSON
    pub span_list: bool,
    /// Flatten JSON events
    pub flatten: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            time: true,
            source: cfg!(debug_assertions),
            target: true,
            thread_ids: false,
            thread_names: false,
            colors: std::io::IsTerminal::is_terminal(&std::io::stderr()),
            span_list: true,
            flatten: true,
        }
    }
}

/// Global fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fields {
    /// Service name
    pub service: Option<String>,
    /// Environment (dev/staging/prod)
    pub env: Option<String>,
    /// Version
    pub version: Option<String>,
}

impl Fields {
    /// Check if fields are empty
    pub fn is_empty(&self) -> bool {
        self.service.is_none() && self.env.is_none() && self.version.is_none()
    }
}

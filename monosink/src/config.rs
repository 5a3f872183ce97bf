//! Configuration management for monosink
//!
//! Bootstrap configuration is read from a TOML file. Every setting has a
//! built-in default, so a missing section or key falls back silently.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--device, --block-size)
//! 2. TOML configuration file (--config / MONOSINK_CONFIG)
//! 3. Built-in defaults (code constants)
//!
//! The negotiated stream format is not configurable; see
//! [`crate::server::StreamFormat::MONO_F32_48K`].

use crate::error::{Error, Result};
use crate::pipeline::DEFAULT_BLOCK_SIZE;
use crate::server::StreamProperties;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Largest accepted block size in frames
pub const MAX_BLOCK_SIZE: usize = 65_536;

/// Complete configuration file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub sink: SinkSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[sink]` section
#[derive(Debug, Clone, Deserialize)]
pub struct SinkSettings {
    /// Node name announced to the audio server
    #[serde(default = "default_name")]
    pub name: String,

    /// Media role property of the stream
    #[serde(default = "default_media_role")]
    pub media_role: String,

    /// Output device name (server default if not specified)
    #[serde(default)]
    pub device: Option<String>,

    /// Frames per block handed to the audio server
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

/// `[logging]` section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_name() -> String {
    "monosink".to_string()
}

fn default_media_role() -> String {
    "Music".to_string()
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            media_role: default_media_role(),
            device: None,
            block_size: default_block_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub device: Option<String>,
    pub block_size: Option<usize>,
}

impl SinkConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: SinkConfig = toml::from_str(toml_str)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let toml_str = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config = Self::from_toml_str(&toml_str)?;
        info!("Loaded TOML configuration from {:?}", path);
        Ok(config)
    }

    /// Load from `path` if given, built-in defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Apply command-line overrides and re-validate.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Result<()> {
        if let Some(device) = overrides.device {
            self.sink.device = Some(device);
        }
        if let Some(block_size) = overrides.block_size {
            self.sink.block_size = block_size;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        let block_size = self.sink.block_size;
        if block_size == 0 || block_size > MAX_BLOCK_SIZE {
            return Err(Error::Config(format!(
                "block_size must be between 1 and {}, got {}",
                MAX_BLOCK_SIZE, block_size
            )));
        }
        if self.sink.name.trim().is_empty() {
            return Err(Error::Config("sink name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Stream properties announced when the sink connects
    pub fn stream_properties(&self) -> StreamProperties {
        let mut properties = StreamProperties::playback(&self.sink.name, &self.sink.media_role);
        properties.device = self.sink.device.clone();
        properties.block_size = self.sink.block_size;
        properties
    }
}

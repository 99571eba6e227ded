/*!
 * Configuration management for ZigFlow.
 *
 * This module provides functionality to load, validate, and access configuration
 * settings for ZigFlow components.
 */
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Core configuration for ZigFlow
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Discovery configuration
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Application environment (development, production, etc.)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, zigflow_devices=trace, ...)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to include the event target in log lines
    #[serde(default = "default_true")]
    pub with_target: bool,
}

/// The discovery mechanisms a network can be scanned with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMode {
    /// Device announce events pushed by the network
    Announce,
    /// Active scan of the transport's address table
    Addressing,
    /// Neighbor link-quality table walk
    LinkQuality,
}

impl DiscoveryMode {
    /// Every discovery mode
    pub const ALL: [DiscoveryMode; 3] = [
        DiscoveryMode::Announce,
        DiscoveryMode::Addressing,
        DiscoveryMode::LinkQuality,
    ];

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryMode::Announce => "announce",
            DiscoveryMode::Addressing => "addressing",
            DiscoveryMode::LinkQuality => "link_quality",
        }
    }
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-mode enable switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryModes {
    /// Enable the announce listener
    #[serde(default = "default_true")]
    pub announce: bool,

    /// Enable the address-table browser
    #[serde(default = "default_true")]
    pub addressing: bool,

    /// Enable the link-quality browser (also requires `lqi_discovery_enabled`)
    #[serde(default = "default_true")]
    pub link_quality: bool,
}

impl DiscoveryModes {
    /// Whether a mode is switched on
    pub fn contains(&self, mode: DiscoveryMode) -> bool {
        match mode {
            DiscoveryMode::Announce => self.announce,
            DiscoveryMode::Addressing => self.addressing,
            DiscoveryMode::LinkQuality => self.link_quality,
        }
    }
}

impl Default for DiscoveryModes {
    fn default() -> Self {
        Self {
            announce: true,
            addressing: true,
            link_quality: true,
        }
    }
}

/// Discovery pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Enabled discovery modes
    #[serde(default)]
    pub modes: DiscoveryModes,

    /// Gate for the link-quality browser, checked in addition to `modes.link_quality`
    #[serde(default)]
    pub lqi_discovery_enabled: bool,

    /// Capacity of the discovery work queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Timeout applied to every command exchange in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Time allowed for discovery producers to stop on shutdown before they
    /// are aborted, in milliseconds. The builder is always waited for.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Neighbors reported below this link quality are ignored by the LQI walk
    #[serde(default)]
    pub min_link_quality: u8,

    /// Maximum number of hops the LQI walk follows from a known device; at least 1
    #[serde(default = "default_max_lqi_depth")]
    pub max_lqi_depth: usize,

    /// Do not interrogate the coordinator itself
    #[serde(default = "default_true")]
    pub skip_coordinator: bool,
}

impl DiscoveryConfig {
    /// Modes that will actually run, after applying the link-quality gate
    pub fn enabled_modes(&self) -> Vec<DiscoveryMode> {
        DiscoveryMode::ALL
            .iter()
            .copied()
            .filter(|mode| self.modes.contains(*mode))
            .filter(|mode| *mode != DiscoveryMode::LinkQuality || self.lqi_discovery_enabled)
            .collect()
    }

    /// Command timeout as a duration
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Shutdown grace period as a duration
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Check the values are usable
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::config("discovery.queue_capacity must be greater than 0"));
        }
        if self.command_timeout_ms == 0 {
            return Err(Error::config("discovery.command_timeout_ms must be greater than 0"));
        }
        if self.max_lqi_depth == 0 {
            return Err(Error::config("discovery.max_lqi_depth must be greater than 0"));
        }
        Ok(())
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            environment: default_environment(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: true,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            modes: DiscoveryModes::default(),
            lqi_discovery_enabled: false,
            queue_capacity: default_queue_capacity(),
            command_timeout_ms: default_command_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            min_link_quality: 0,
            max_lqi_depth: default_max_lqi_depth(),
            skip_coordinator: true,
        }
    }
}

fn default_app_name() -> String {
    "zigflow".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    256
}

fn default_command_timeout_ms() -> u64 {
    5_000
}

fn default_shutdown_grace_ms() -> u64 {
    2_000
}

fn default_max_lqi_depth() -> usize {
    8
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
    override_with: Option<Config>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Override with an existing config
    pub fn override_with(mut self, config: Config) -> Self {
        self.override_with = Some(config);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        if let Some(config) = self.override_with {
            config.discovery.validate()?;
            return Ok(config);
        }

        let mut config_builder = ConfigLib::builder();

        // Start with default values
        let default_config = Config::default();
        config_builder = config_builder.add_source(
            ConfigLib::try_from(&default_config)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?,
        );

        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if path.exists() {
                debug!("Loading configuration from {}", config_file);
                config_builder = config_builder.add_source(File::with_name(&config_file));
            } else {
                debug!("Configuration file {} does not exist, using defaults", config_file);
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config_lib = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        let config: Config = config_lib
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        config.discovery.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }
}

/// A thread-safe reference to a configuration
#[derive(Debug, Clone)]
pub struct SharedConfig(Arc<Config>);

impl SharedConfig {
    /// Create a new SharedConfig
    pub fn new(config: Config) -> Self {
        Self(Arc::new(config))
    }

    /// Get a reference to the config
    pub fn get(&self) -> &Config {
        &self.0
    }
}

impl From<Config> for SharedConfig {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}

impl AsRef<Config> for SharedConfig {
    fn as_ref(&self) -> &Config {
        self.get()
    }
}

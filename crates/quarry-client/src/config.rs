//! Client configuration.
//!
//! Defaults for the execution layer, loadable from TOML.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::executor;
use crate::options::{Consistency, ExecutionOptions, SerialConsistency};

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Maximum number of compiled structured queries kept.
    #[serde(default = "default_compile_cache_capacity")]
    pub compile_cache_capacity: usize,

    /// Consistency applied when a call does not set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_consistency: Option<Consistency>,

    /// Serial consistency applied when a call does not set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_serial_consistency: Option<SerialConsistency>,

    /// Page size applied when a call does not set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_fetch_size: Option<u32>,

    /// Decode column keys as strings instead of symbols.
    #[serde(default)]
    pub string_keys: bool,

    /// Request server-side tracing.
    #[serde(default)]
    pub tracing: bool,

    /// Worker threads of the default completion pool (defaults to one per
    /// core).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_pool_threads: Option<usize>,
}

fn default_compile_cache_capacity() -> usize {
    quarry_cache::DEFAULT_CAPACITY
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            compile_cache_capacity: default_compile_cache_capacity(),
            default_consistency: None,
            default_serial_consistency: None,
            default_fetch_size: None,
            string_keys: false,
            tracing: false,
            callback_pool_threads: None,
        }
    }
}

impl ClientConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Converts configuration to TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Returns the per-call options this configuration implies.
    ///
    /// Tracing is only set when enabled, so statements keep the driver
    /// default otherwise.
    pub fn default_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            consistency: self.default_consistency,
            serial_consistency: self.default_serial_consistency,
            fetch_size: self.default_fetch_size,
            tracing: self.tracing.then_some(true),
            string_keys: self.string_keys,
            ..ExecutionOptions::default()
        }
    }

    /// Builds the default completion pool with the configured thread count.
    ///
    /// Has no effect on the thread count if the pool already exists.
    pub fn init_default_executor(&self) -> std::io::Result<tokio::runtime::Handle> {
        executor::default_executor_with(self.callback_pool_threads)
    }

    /// Creates a builder for configuration.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }
}

/// Builder for client configuration.
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the compilation cache capacity.
    pub fn compile_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.compile_cache_capacity = capacity;
        self
    }

    /// Sets the default consistency.
    pub fn default_consistency(mut self, consistency: Consistency) -> Self {
        self.config.default_consistency = Some(consistency);
        self
    }

    /// Sets the default serial consistency.
    pub fn default_serial_consistency(mut self, serial: SerialConsistency) -> Self {
        self.config.default_serial_consistency = Some(serial);
        self
    }

    /// Sets the default fetch size.
    pub fn default_fetch_size(mut self, size: u32) -> Self {
        self.config.default_fetch_size = Some(size);
        self
    }

    /// Selects string column keys.
    pub fn string_keys(mut self, enabled: bool) -> Self {
        self.config.string_keys = enabled;
        self
    }

    /// Enables tracing.
    pub fn tracing(mut self, enabled: bool) -> Self {
        self.config.tracing = enabled;
        self
    }

    /// Sets the default pool size.
    pub fn callback_pool_threads(mut self, threads: usize) -> Self {
        self.config.callback_pool_threads = Some(threads);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.compile_cache_capacity, 100);
        assert!(config.default_consistency.is_none());
        assert!(!config.string_keys);
        assert!(!config.tracing);
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::builder()
            .compile_cache_capacity(10)
            .default_consistency(Consistency::LocalQuorum)
            .default_fetch_size(200)
            .string_keys(true)
            .build();

        assert_eq!(config.compile_cache_capacity, 10);
        assert_eq!(config.default_consistency, Some(Consistency::LocalQuorum));
        assert_eq!(config.default_fetch_size, Some(200));
        assert!(config.string_keys);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: ClientConfig = toml::from_str(
            r#"
            default_consistency = "local_quorum"
            default_serial_consistency = "local_serial"
            "#,
        )
        .unwrap();

        assert_eq!(config.compile_cache_capacity, 100);
        assert_eq!(config.default_consistency, Some(Consistency::LocalQuorum));
        assert_eq!(
            config.default_serial_consistency,
            Some(SerialConsistency::LocalSerial)
        );
    }

    #[test]
    fn test_to_toml() {
        let config = ClientConfig::builder()
            .default_consistency(Consistency::One)
            .build();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("compile_cache_capacity = 100"));
        assert!(toml.contains("default_consistency = \"one\""));
        assert!(!toml.contains("default_fetch_size"));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("conf").join("quarry.toml");

        let config = ClientConfig::builder()
            .compile_cache_capacity(42)
            .default_serial_consistency(SerialConsistency::Serial)
            .callback_pool_threads(2)
            .tracing(true)
            .build();

        config.save(&path).unwrap();

        let loaded = ClientConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_default_options() {
        let config = ClientConfig::builder()
            .default_consistency(Consistency::Two)
            .default_fetch_size(25)
            .string_keys(true)
            .build();
        let options = config.default_options();

        assert_eq!(options.consistency, Some(Consistency::Two));
        assert_eq!(options.fetch_size, Some(25));
        assert!(options.tracing.is_none());
        assert!(options.string_keys);
        assert!(options.executor.is_none());
    }
}

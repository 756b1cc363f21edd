//! Configuration loader for the scan core
//!
//! Handles loading configuration from TOML files and merging with defaults.

use super::defaults::default_config;
use crate::pointer::PointerSettings;
use crate::scan::{ScanSettings, StoreLimits};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_scanner")]
    pub scanner: ScannerConfig,

    #[serde(default = "default_session")]
    pub session: SessionConfig,

    #[serde(default = "default_pointer")]
    pub pointer: PointerConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,
}

/// Scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default = "default_refine_batch_gap")]
    pub refine_batch_gap: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// 0 disables the per-round deadline
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
    #[serde(default = "default_use_simd")]
    pub use_simd: bool,
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 0 keeps idle sessions forever
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,
}

/// Pointer resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointerConfig {
    #[serde(default = "default_pointer_width")]
    pub pointer_width: usize,
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,
    #[serde(default = "default_max_path_depth")]
    pub max_path_depth: usize,
    #[serde(default = "default_max_path_reads")]
    pub max_path_reads: u64,
    #[serde(default = "default_max_paths")]
    pub max_paths: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log to this file instead of stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default = "default_with_target")]
    pub with_target: bool,
}

impl Config {
    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            chunk_size: self.scanner.chunk_size,
            page_size: self.scanner.page_size,
            max_candidates: self.scanner.max_candidates,
            refine_batch_gap: self.scanner.refine_batch_gap,
            use_simd: self.scanner.use_simd,
            scan_timeout: (self.scanner.scan_timeout_ms > 0)
                .then(|| Duration::from_millis(self.scanner.scan_timeout_ms)),
        }
    }

    pub fn store_limits(&self) -> StoreLimits {
        StoreLimits {
            max_sessions: self.session.max_sessions,
            idle_timeout: (self.session.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(self.session.idle_timeout_secs)),
        }
    }

    pub fn pointer_settings(&self) -> PointerSettings {
        PointerSettings {
            pointer_width: self.pointer.pointer_width,
            max_chain_depth: self.pointer.max_chain_depth,
            max_path_depth: self.pointer.max_path_depth,
            max_path_reads: self.pointer.max_path_reads,
            max_paths: self.pointer.max_paths,
        }
    }
}

/// Configuration loader
pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Creates a new configuration loader
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        ConfigLoader {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    /// Loads configuration from file
    pub fn load(&self) -> Result<Config, ConfigError> {
        if !self.config_path.exists() {
            return Err(ConfigError::FileNotFound(
                self.config_path.display().to_string(),
            ));
        }

        let contents = fs::read_to_string(&self.config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Loads the file if present; a missing file yields defaults, a broken one
    /// is still an error
    pub fn load_or_default(&self) -> Result<Config, ConfigError> {
        match self.load() {
            Err(ConfigError::FileNotFound(_)) => Ok(Config::default()),
            other => other,
        }
    }

    /// Saves configuration to file
    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, contents)?;
        Ok(())
    }
}

/// Loads `memory-scan.toml` from the working directory, or defaults
pub fn load_config() -> Result<Config, ConfigError> {
    ConfigLoader::new("memory-scan.toml").load_or_default()
}

// Default functions for serde
fn default_scanner() -> ScannerConfig {
    let defaults = default_config();
    ScannerConfig {
        max_threads: defaults.scanner.max_threads,
        chunk_size: defaults.scanner.chunk_size,
        max_candidates: defaults.scanner.max_candidates,
        refine_batch_gap: defaults.scanner.refine_batch_gap,
        page_size: defaults.scanner.page_size,
        scan_timeout_ms: defaults.scanner.scan_timeout_ms,
        use_simd: defaults.scanner.use_simd,
    }
}

fn default_session() -> SessionConfig {
    let defaults = default_config();
    SessionConfig {
        idle_timeout_secs: defaults.session.idle_timeout_secs,
        max_sessions: defaults.session.max_sessions,
        eviction_interval_secs: defaults.session.eviction_interval_secs,
    }
}

fn default_pointer() -> PointerConfig {
    let defaults = default_config();
    PointerConfig {
        pointer_width: defaults.pointer.pointer_width,
        max_chain_depth: defaults.pointer.max_chain_depth,
        max_path_depth: defaults.pointer.max_path_depth,
        max_path_reads: defaults.pointer.max_path_reads,
        max_paths: defaults.pointer.max_paths,
    }
}

fn default_logging() -> LoggingConfig {
    let defaults = default_config();
    LoggingConfig {
        level: defaults.logging.level,
        file: None,
        with_target: defaults.logging.with_target,
    }
}

// Individual field defaults
fn default_max_threads() -> usize {
    default_config().scanner.max_threads
}

fn default_chunk_size() -> usize {
    default_config().scanner.chunk_size
}

fn default_max_candidates() -> usize {
    default_config().scanner.max_candidates
}

fn default_refine_batch_gap() -> usize {
    default_config().scanner.refine_batch_gap
}

fn default_page_size() -> usize {
    default_config().scanner.page_size
}

fn default_scan_timeout_ms() -> u64 {
    default_config().scanner.scan_timeout_ms
}

fn default_use_simd() -> bool {
    default_config().scanner.use_simd
}

fn default_idle_timeout_secs() -> u64 {
    default_config().session.idle_timeout_secs
}

fn default_max_sessions() -> usize {
    default_config().session.max_sessions
}

fn default_eviction_interval_secs() -> u64 {
    default_config().session.eviction_interval_secs
}

fn default_pointer_width() -> usize {
    default_config().pointer.pointer_width
}

fn default_max_chain_depth() -> usize {
    default_config().pointer.max_chain_depth
}

fn default_max_path_depth() -> usize {
    default_config().pointer.max_path_depth
}

fn default_max_path_reads() -> u64 {
    default_config().pointer.max_path_reads
}

fn default_max_paths() -> usize {
    default_config().pointer.max_paths
}

fn default_log_level() -> String {
    default_config().logging.level
}

fn default_with_target() -> bool {
    default_config().logging.with_target
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scanner: default_scanner(),
            session: default_session(),
            pointer: default_pointer(),
            logging: default_logging(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.scanner.max_threads > 0);
        assert_eq!(config.pointer.max_chain_depth, 16);
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let loader = ConfigLoader::new("nonexistent.toml");
        let result = loader.load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));

        let config = loader.load_or_default().unwrap();
        assert_eq!(config.session.max_sessions, 64);
    }

    #[test]
    fn test_broken_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("broken.toml");
        fs::write(&config_path, "[scanner\nchunk_size = ").unwrap();

        let result = ConfigLoader::new(&config_path).load_or_default();
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let mut config = Config::default();
        config.logging.file = Some("scan.log".to_string());
        let loader = ConfigLoader::new(&config_path);

        loader.save(&config).unwrap();
        assert!(config_path.exists());

        let loaded = loader.load().unwrap();
        assert_eq!(loaded.scanner.chunk_size, config.scanner.chunk_size);
        assert_eq!(loaded.logging.file.as_deref(), Some("scan.log"));
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
            [scanner]
            chunk_size = 65536
            scan_timeout_ms = 500

            [pointer]
            pointer_width = 4
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scanner.chunk_size, 65536);
        assert_eq!(config.pointer.pointer_width, 4);
        // Check defaults are applied
        assert!(config.scanner.use_simd);
        assert_eq!(config.pointer.max_chain_depth, 16);

        let settings = config.scan_settings();
        assert_eq!(settings.scan_timeout, Some(Duration::from_millis(500)));
        assert_eq!(config.store_limits().idle_timeout, Some(Duration::from_secs(1800)));
    }
}

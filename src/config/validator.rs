//! Configuration validator for the scan core
//!
//! Validates configuration values to ensure they are within acceptable ranges.

use super::loader::{
    Config, ConfigError, LoggingConfig, PointerConfig, ScannerConfig, SessionConfig,
};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the entire configuration
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        Self::validate_scanner(&config.scanner)?;
        Self::validate_session(&config.session)?;
        Self::validate_pointer(&config.pointer)?;
        Self::validate_logging(&config.logging)?;
        Ok(())
    }

    /// Validates scanner configuration
    fn validate_scanner(scanner: &ScannerConfig) -> Result<(), ConfigError> {
        // Validate thread count
        if scanner.max_threads == 0 {
            return Err(ConfigError::Invalid(
                "Scanner threads must be at least 1".to_string(),
            ));
        }

        if scanner.max_threads > 128 {
            return Err(ConfigError::Invalid(
                "Scanner threads cannot exceed 128".to_string(),
            ));
        }

        // Chunks sit on absolute multiples of their size
        if scanner.chunk_size < 4096 || !scanner.chunk_size.is_power_of_two() {
            return Err(ConfigError::Invalid(
                "Chunk size must be a power of 2 of at least 4096".to_string(),
            ));
        }

        if scanner.page_size == 0 || !scanner.page_size.is_power_of_two() {
            return Err(ConfigError::Invalid(
                "Page size must be a power of 2".to_string(),
            ));
        }

        if scanner.page_size > scanner.chunk_size {
            return Err(ConfigError::Invalid(
                "Page size cannot exceed chunk size".to_string(),
            ));
        }

        if scanner.max_candidates == 0 {
            return Err(ConfigError::Invalid(
                "Maximum candidates must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates session store configuration
    fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
        if session.max_sessions == 0 {
            return Err(ConfigError::Invalid(
                "Maximum sessions must be at least 1".to_string(),
            ));
        }

        if session.eviction_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "Eviction interval must be at least 1 second".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates pointer configuration
    fn validate_pointer(pointer: &PointerConfig) -> Result<(), ConfigError> {
        if pointer.pointer_width != 4 && pointer.pointer_width != 8 {
            return Err(ConfigError::Invalid(format!(
                "Pointer width must be 4 or 8, got {}",
                pointer.pointer_width
            )));
        }

        if pointer.max_chain_depth == 0 {
            return Err(ConfigError::Invalid(
                "Maximum chain depth must be at least 1".to_string(),
            ));
        }

        if pointer.max_path_depth == 0 || pointer.max_path_depth > pointer.max_chain_depth {
            return Err(ConfigError::Invalid(
                "Maximum path depth must be between 1 and the maximum chain depth".to_string(),
            ));
        }

        if pointer.max_paths == 0 {
            return Err(ConfigError::Invalid(
                "Maximum path steps must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates logging configuration
    fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                logging.level, valid_levels
            )));
        }

        if logging.file.as_deref() == Some("") {
            return Err(ConfigError::Invalid(
                "Log file path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Validates a configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    ConfigValidator::validate(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_thread_count() {
        let mut config = Config::default();
        config.scanner.max_threads = 0;
        let result = validate_config(&config);
        assert!(result.is_err());

        config.scanner.max_threads = 129;
        let result = validate_config(&config);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_chunk_size() {
        let mut config = Config::default();
        config.scanner.chunk_size = 0;
        assert!(validate_config(&config).is_err());

        config.scanner.chunk_size = 1000; // Not power of 2
        assert!(validate_config(&config).is_err());

        config.scanner.chunk_size = 2048; // Below one page
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_pointer_width() {
        let mut config = Config::default();
        config.pointer.pointer_width = 6;
        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("Pointer width"));
    }

    #[test]
    fn test_path_depth_bounded_by_chain_depth() {
        let mut config = Config::default();
        config.pointer.max_chain_depth = 3;
        config.pointer.max_path_depth = 4;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_path_steps() {
        let mut config = Config::default();
        config.pointer.max_paths = 0;
        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("path steps"));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("log level"));
    }

    #[test]
    fn test_edge_cases() {
        let mut config = Config::default();

        // Test minimum valid values
        config.scanner.max_threads = 1;
        config.scanner.chunk_size = 4096;
        config.scanner.page_size = 4096;
        config.session.max_sessions = 1;
        config.pointer.max_chain_depth = 1;
        config.pointer.max_path_depth = 1;

        assert!(validate_config(&config).is_ok());

        // Test maximum valid values
        config.scanner.max_threads = 128;
        config.pointer.pointer_width = 4;

        assert!(validate_config(&config).is_ok());
    }
}

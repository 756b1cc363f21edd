//! Default configuration values for the scan core

use serde::{Deserialize, Serialize};

/// Default configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDefaults {
    pub scanner: ScannerDefaults,
    pub session: SessionDefaults,
    pub pointer: PointerDefaults,
    pub logging: LoggingDefaults,
}

/// Default scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerDefaults {
    pub max_threads: usize,
    pub chunk_size: usize,
    pub max_candidates: usize,
    pub refine_batch_gap: usize,
    pub page_size: usize,
    pub scan_timeout_ms: u64,
    pub use_simd: bool,
}

/// Default session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDefaults {
    pub idle_timeout_secs: u64,
    pub max_sessions: usize,
    pub eviction_interval_secs: u64,
}

/// Default pointer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointerDefaults {
    pub pointer_width: usize,
    pub max_chain_depth: usize,
    pub max_path_depth: usize,
    pub max_path_reads: u64,
    pub max_paths: usize,
}

/// Default logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingDefaults {
    pub level: String,
    pub with_target: bool,
}

/// Returns the default configuration
pub fn default_config() -> ConfigDefaults {
    ConfigDefaults {
        scanner: ScannerDefaults {
            max_threads: num_cpus::get().min(128),
            chunk_size: 1048576,     // 1MB
            max_candidates: 10_000_000,
            refine_batch_gap: 256,
            page_size: 4096,
            scan_timeout_ms: 0, // no deadline
            use_simd: true,
        },
        session: SessionDefaults {
            idle_timeout_secs: 1800,
            max_sessions: 64,
            eviction_interval_secs: 60,
        },
        pointer: PointerDefaults {
            pointer_width: 8,
            max_chain_depth: 16,
            max_path_depth: 5,
            max_path_reads: 50_000_000,
            max_paths: 1_000_000,
        },
        logging: LoggingDefaults {
            level: "info".to_string(),
            with_target: false,
        },
    }
}

//! Core module containing fundamental types for the scanning core
//!
//! This module provides the foundational building blocks used throughout
//! the crate, including address handling, memory values, the region model,
//! scan criteria and error types.

pub mod types;

// Re-export commonly used types for convenience
pub use types::{
    Address, Criterion, MemoryError, MemoryRegion, MemoryResult, MemoryValue, Protection,
    ScanResult, ScanType, ValueType,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

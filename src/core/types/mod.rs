//! Core type definitions for the scanning core
//!
//! This module contains the fundamental types used throughout the crate:
//! address wrappers, typed memory values, the region model, scan selectors
//! and the error taxonomy.

mod address;
mod error;
mod region;
mod scan_result;
mod value;

// Re-export all public types
pub use address::{parse_address, Address};
pub use error::{MemoryError, MemoryResult};
pub use region::{find_region, MemoryRegion, Protection, RegionEnumeration};
pub use scan_result::{Criterion, ScanResult, ScanType};
pub use value::{MemoryValue, ValueType};

// Common type aliases
pub type Offset = i64;
pub type ProcessId = u32;
pub type SessionId = u64;
pub type Size = usize;

//! Memory scanning core: value and pattern scans, refinement rounds and
//! pointer chains over a target's address space

pub mod api;
pub mod config;
pub mod core;
pub mod logging;
pub mod memory;
pub mod pointer;
pub mod scan;

#[cfg(windows)]
pub mod windows;

// Re-export main types from core module
pub use crate::core::types::{
    Address, Criterion, MemoryError, MemoryRegion, MemoryResult, MemoryValue, Protection,
    ScanResult, ScanType, SessionId, ValueType,
};

pub use api::{Handler, Reply, Request, Response};
pub use memory::{ProcessMemory, SnapshotMemory};
pub use pointer::{PointerChain, PointerResolver};
pub use scan::{SessionStore, WorkerPool};

pub use crate::core::{AUTHORS, VERSION};

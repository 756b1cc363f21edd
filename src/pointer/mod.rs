//! Pointer chains: resolution, write-back and discovery
//!
//! Everything here works on raw reads through
//! [`ProcessMemory`](crate::memory::ProcessMemory) and keeps no state between
//! calls.

pub mod chain;
pub mod paths;
pub mod resolver;

pub use chain::{parse_offset, PointerBase, PointerChain};
pub use paths::{BaseCandidate, BaseKind, PathEstimate, PointerPath};
pub use resolver::{PointerResolver, PointerSettings};

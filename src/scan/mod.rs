//! Value and pattern scanning across rounds
//!
//! Leaf-first: [`value`] and [`pattern`] are pure matchers, [`chunk`] cuts
//! address space into work, [`worker`] runs that work, [`engine`] executes a
//! round, and [`session`]/[`store`] keep candidates between rounds.

pub mod candidates;
pub mod chunk;
pub mod control;
pub mod engine;
pub mod pattern;
pub mod session;
pub mod simd;
pub mod store;
pub mod value;
pub mod worker;

pub use candidates::CandidateSet;
pub use chunk::{Chunk, ChunkScheduler, ReadBatch};
pub use control::{CancelToken, RoundControl};
pub use engine::{AobMatch, Matcher, RoundDiagnostics, ScanContext, ScanOptions, ScanSettings};
pub use pattern::{FuzzyHit, Pattern, PatternByte};
pub use session::{RoundKind, RoundOutcome, RoundRecord, ScanSession, SessionSnapshot, SessionState};
pub use store::{SessionStore, StoreLimits};
pub use value::{Predicate, Scalar, ValueMatcher};
pub use worker::{PoolOutcome, WorkerPool};

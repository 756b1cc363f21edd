//! Scan sessions: candidate sets carried across rounds

use super::candidates::CandidateSet;
use super::control::RoundControl;
use super::engine::{self, Matcher, RoundDiagnostics, ScanContext, ScanOptions};
use crate::core::types::{
    Criterion, MemoryError, MemoryResult, ScanResult, ScanType, SessionId, ValueType,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "round", rename_all = "camelCase")]
pub enum SessionState {
    Empty,
    FirstScanDone,
    /// Number of refinements applied so far
    Refining(u32),
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoundKind {
    First,
    Refine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoundOutcome {
    Completed,
    Cancelled,
    TimedOut,
}

/// One entry of the append-only round log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundRecord {
    pub round: u32,
    pub kind: RoundKind,
    pub scan_type: ScanType,
    pub criterion: Criterion,
    pub outcome: RoundOutcome,
    pub matches: usize,
    pub removed: usize,
    pub diagnostics: RoundDiagnostics,
    pub elapsed_ms: u64,
}

/// Serializable copy of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub value_type: Option<ValueType>,
    pub state: SessionState,
    pub round: u32,
    pub candidates: Vec<ScanResult>,
    pub history: Vec<RoundRecord>,
}

/// Candidate set and history for one scan target.
///
/// The session never sees a half-finished round: engine calls return a new
/// set which is swapped in only on success.
#[derive(Debug)]
pub struct ScanSession {
    id: SessionId,
    value_type: Option<ValueType>,
    state: SessionState,
    round: u32,
    candidates: Option<CandidateSet>,
    history: Vec<RoundRecord>,
}

impl ScanSession {
    pub fn new(id: SessionId) -> Self {
        ScanSession {
            id,
            value_type: None,
            state: SessionState::Empty,
            round: 0,
            candidates: None,
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of the last completed round
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn value_type(&self) -> Option<ValueType> {
        self.value_type
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.as_ref().map_or(0, CandidateSet::len)
    }

    pub fn candidates(&self) -> Option<&CandidateSet> {
        self.candidates.as_ref()
    }

    pub fn history(&self) -> &[RoundRecord] {
        &self.history
    }

    /// Candidates `[offset, offset + limit)` in address order
    pub fn page(&self, offset: usize, limit: usize) -> MemoryResult<Vec<ScanResult>> {
        self.ensure_open()?;
        Ok(self
            .candidates
            .as_ref()
            .map(|set| set.page(offset, limit))
            .unwrap_or_default())
    }

    /// Seeds an empty session from every readable region
    pub fn start_scan(
        &mut self,
        ctx: ScanContext<'_>,
        value_type: ValueType,
        scan_type: ScanType,
        criterion: Criterion,
        options: &ScanOptions,
        control: &RoundControl,
    ) -> MemoryResult<RoundRecord> {
        self.ensure_open()?;
        if self.state != SessionState::Empty {
            return Err(MemoryError::UnsupportedOperation(format!(
                "session {} already has candidates, refine it instead",
                self.id
            )));
        }
        if !scan_type.allowed_on_first_scan() {
            return Err(MemoryError::invalid_criterion(format!(
                "{:?} compares against a previous value and cannot start a session",
                scan_type
            )));
        }

        let matcher = Matcher::compile(value_type, scan_type, &criterion, None)?;
        let started = Instant::now();

        match engine::first_scan(ctx, &matcher, value_type, options, control) {
            Ok((set, diagnostics)) => {
                let record = RoundRecord {
                    round: 0,
                    kind: RoundKind::First,
                    scan_type,
                    criterion,
                    outcome: RoundOutcome::Completed,
                    matches: set.len(),
                    removed: 0,
                    diagnostics,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                };
                info!(
                    session_id = self.id,
                    round = 0,
                    matches = record.matches,
                    elapsed_ms = record.elapsed_ms,
                    "First scan complete"
                );

                self.value_type = Some(value_type);
                self.candidates = Some(set);
                self.state = SessionState::FirstScanDone;
                self.round = 0;
                self.history.push(record.clone());
                Ok(record)
            }
            Err(e) => Err(self.abandon(e, 0, RoundKind::First, scan_type, criterion, started)),
        }
    }

    /// Re-tests every candidate and keeps the survivors
    pub fn refine(
        &mut self,
        ctx: ScanContext<'_>,
        scan_type: ScanType,
        criterion: Criterion,
        control: &RoundControl,
    ) -> MemoryResult<RoundRecord> {
        self.ensure_open()?;
        let (value_type, current) = match (self.value_type, self.candidates.as_ref()) {
            (Some(value_type), Some(set)) if !set.is_empty() => (value_type, set),
            _ => return Err(MemoryError::EmptySession(self.id.to_string())),
        };

        let matcher = Matcher::compile(value_type, scan_type, &criterion, Some(current.width()))?;
        let before = current.len();
        let started = Instant::now();
        let round = self.round + 1;

        match engine::refine(ctx, &matcher, current, control) {
            Ok((set, diagnostics)) => {
                let record = RoundRecord {
                    round,
                    kind: RoundKind::Refine,
                    scan_type,
                    criterion,
                    outcome: RoundOutcome::Completed,
                    matches: set.len(),
                    removed: before - set.len(),
                    diagnostics,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                };
                info!(
                    session_id = self.id,
                    round,
                    matches = record.matches,
                    removed = record.removed,
                    elapsed_ms = record.elapsed_ms,
                    "Refinement complete"
                );

                self.candidates = Some(set);
                self.round = round;
                self.state = SessionState::Refining(round);
                self.history.push(record.clone());
                Ok(record)
            }
            Err(e) => Err(self.abandon(e, round, RoundKind::Refine, scan_type, criterion, started)),
        }
    }

    /// Releases candidates and history. Safe to call more than once.
    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            info!(session_id = self.id, rounds = self.history.len(), "Session closed");
        }
        self.state = SessionState::Closed;
        self.candidates = None;
        self.history = Vec::new();
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            value_type: self.value_type,
            state: self.state,
            round: self.round,
            candidates: self
                .candidates
                .as_ref()
                .map(|set| set.page(0, set.len()))
                .unwrap_or_default(),
            history: self.history.clone(),
        }
    }

    fn ensure_open(&self) -> MemoryResult<()> {
        if self.is_closed() {
            Err(MemoryError::SessionClosed(self.id.to_string()))
        } else {
            Ok(())
        }
    }

    /// Logs a cancelled or timed-out round; other errors pass through
    fn abandon(
        &mut self,
        error: MemoryError,
        round: u32,
        kind: RoundKind,
        scan_type: ScanType,
        criterion: Criterion,
        started: Instant,
    ) -> MemoryError {
        if !error.is_abandoned() {
            return error;
        }
        let outcome = match error {
            MemoryError::Timeout(_) => RoundOutcome::TimedOut,
            _ => RoundOutcome::Cancelled,
        };

        warn!(session_id = self.id, round, ?outcome, "Round abandoned, candidates unchanged");
        self.history.push(RoundRecord {
            round,
            kind,
            scan_type,
            criterion,
            outcome,
            matches: self.candidate_count(),
            removed: 0,
            diagnostics: RoundDiagnostics::default(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        error
    }
}

//! Registry of live scan sessions
//!
//! Each session sits behind its own mutex. A round holds that mutex for its
//! whole duration, so a second round on the same session is rejected with
//! `ScanInProgress` rather than queued, while rounds on other sessions run
//! side by side on the shared worker pool.

use super::control::{CancelToken, RoundControl};
use super::engine::{self, AobMatch, RoundDiagnostics, ScanContext, ScanOptions, ScanSettings};
use super::pattern::Pattern;
use super::session::{RoundRecord, ScanSession, SessionSnapshot};
use super::worker::WorkerPool;
use crate::core::types::{
    Criterion, MemoryError, MemoryResult, ScanResult, ScanType, SessionId, ValueType,
};
use crate::memory::ProcessMemory;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError,
};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Housekeeping limits for a store
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoreLimits {
    pub max_sessions: usize,
    /// Sessions untouched for this long are evicted; `None` keeps them forever
    pub idle_timeout: Option<Duration>,
}

impl Default for StoreLimits {
    fn default() -> Self {
        StoreLimits {
            max_sessions: 64,
            idle_timeout: Some(Duration::from_secs(30 * 60)),
        }
    }
}

type SessionMap = HashMap<SessionId, Arc<SessionEntry>>;

struct SessionEntry {
    session: Mutex<ScanSession>,
    /// Cancellation token of the round in flight, if any
    active: Mutex<Option<CancelToken>>,
    last_used: Mutex<Instant>,
}

impl SessionEntry {
    fn new(id: SessionId) -> Self {
        SessionEntry {
            session: Mutex::new(ScanSession::new(id)),
            active: Mutex::new(None),
            last_used: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_used.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used.lock().unwrap_or_else(|e| e.into_inner()).elapsed()
    }

    fn set_active(&self, token: Option<CancelToken>) {
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = token;
    }
}

/// Owns every session of one target process
pub struct SessionStore {
    memory: Arc<dyn ProcessMemory>,
    pool: Arc<WorkerPool>,
    settings: ScanSettings,
    limits: StoreLimits,
    sessions: RwLock<SessionMap>,
    next_id: AtomicU64,
}

impl SessionStore {
    pub fn new(
        memory: Arc<dyn ProcessMemory>,
        pool: Arc<WorkerPool>,
        settings: ScanSettings,
        limits: StoreLimits,
    ) -> Self {
        SessionStore {
            memory,
            pool,
            settings,
            limits,
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn memory(&self) -> &Arc<dyn ProcessMemory> {
        &self.memory
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.read_sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers an empty session
    pub fn create(&self) -> MemoryResult<SessionId> {
        let mut sessions = self.write_sessions();
        if sessions.len() >= self.limits.max_sessions {
            return Err(MemoryError::SessionLimitReached(self.limits.max_sessions));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        sessions.insert(id, Arc::new(SessionEntry::new(id)));
        debug!(session_id = id, "Session created");
        Ok(id)
    }

    /// Creates a session and runs its first scan. The session is discarded
    /// if the scan fails for any reason.
    pub fn start_scan(
        &self,
        value_type: ValueType,
        scan_type: ScanType,
        criterion: Criterion,
        options: &ScanOptions,
    ) -> MemoryResult<(SessionId, RoundRecord)> {
        let id = self.create()?;
        match self.first_scan(id, value_type, scan_type, criterion, options) {
            Ok(record) => Ok((id, record)),
            Err(e) => {
                self.write_sessions().remove(&id);
                Err(e)
            }
        }
    }

    /// Runs the first scan of an existing empty session
    pub fn first_scan(
        &self,
        id: SessionId,
        value_type: ValueType,
        scan_type: ScanType,
        criterion: Criterion,
        options: &ScanOptions,
    ) -> MemoryResult<RoundRecord> {
        self.with_round(id, |session, ctx, control| {
            session.start_scan(ctx, value_type, scan_type, criterion, options, control)
        })
    }

    pub fn refine(
        &self,
        id: SessionId,
        scan_type: ScanType,
        criterion: Criterion,
    ) -> MemoryResult<RoundRecord> {
        self.with_round(id, |session, ctx, control| {
            session.refine(ctx, scan_type, criterion, control)
        })
    }

    /// Total candidate count and one page of candidates
    pub fn list_candidates(
        &self,
        id: SessionId,
        offset: usize,
        limit: usize,
    ) -> MemoryResult<(usize, Vec<ScanResult>)> {
        self.with_session(id, |session| {
            Ok((session.candidate_count(), session.page(offset, limit)?))
        })
    }

    pub fn history(&self, id: SessionId) -> MemoryResult<Vec<RoundRecord>> {
        self.with_session(id, |session| Ok(session.history().to_vec()))
    }

    pub fn export(&self, id: SessionId) -> MemoryResult<SessionSnapshot> {
        self.with_session(id, |session| Ok(session.snapshot()))
    }

    /// Signals the round in flight on `id`. Returns whether one was running.
    pub fn cancel(&self, id: SessionId) -> MemoryResult<bool> {
        let entry = self.entry(id)?;
        let active = entry.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.as_ref() {
            Some(token) => {
                token.cancel();
                info!(session_id = id, "Cancellation requested");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Closes and forgets a session, cancelling any round in flight.
    ///
    /// Closing an id that was already closed or evicted succeeds and returns
    /// `false`; ids never handed out are `SessionNotFound`.
    pub fn close(&self, id: SessionId) -> MemoryResult<bool> {
        let removed = self.write_sessions().remove(&id);
        let entry = match removed {
            Some(entry) => entry,
            None if id > 0 && id < self.next_id.load(Ordering::Relaxed) => return Ok(false),
            None => return Err(MemoryError::SessionNotFound(id.to_string())),
        };

        if let Some(token) = entry.active.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            token.cancel();
        }
        match entry.session.try_lock() {
            Ok(mut session) => session.close(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().close(),
            // The running round owns the last reference and drops it on exit
            Err(TryLockError::WouldBlock) => {
                debug!(session_id = id, "Closing session with a round in flight")
            }
        }
        Ok(true)
    }

    /// Drops sessions idle past the timeout. Busy sessions are never evicted.
    pub fn evict_idle(&self) -> usize {
        let Some(timeout) = self.limits.idle_timeout else {
            return 0;
        };

        let mut sessions = self.write_sessions();
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let idle = entry.idle_for() >= timeout;
            let busy = matches!(entry.session.try_lock(), Err(TryLockError::WouldBlock));
            if idle && !busy {
                debug!(session_id = *id, "Evicting idle session");
                false
            } else {
                true
            }
        });

        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "Idle sessions evicted");
        }
        evicted
    }

    /// One-shot pattern search that creates no session
    pub fn aob_scan(
        &self,
        pattern: &str,
        max_distance: Option<u32>,
        module: Option<&str>,
    ) -> MemoryResult<(Vec<AobMatch>, RoundDiagnostics)> {
        let pattern = Pattern::parse(pattern)?;
        let control = RoundControl::unbounded().with_timeout(self.settings.scan_timeout);
        engine::aob_scan(self.context(), pattern, max_distance, module, &control)
    }

    fn context(&self) -> ScanContext<'_> {
        ScanContext {
            memory: &*self.memory,
            pool: &self.pool,
            settings: &self.settings,
        }
    }

    fn entry(&self, id: SessionId) -> MemoryResult<Arc<SessionEntry>> {
        self.read_sessions()
            .get(&id)
            .cloned()
            .ok_or_else(|| MemoryError::SessionNotFound(id.to_string()))
    }

    /// Locks the session without waiting. A poisoned session is removed.
    fn lock<'a>(
        &self,
        id: SessionId,
        entry: &'a SessionEntry,
    ) -> MemoryResult<MutexGuard<'a, ScanSession>> {
        match entry.session.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(MemoryError::ScanInProgress(id.to_string())),
            Err(TryLockError::Poisoned(_)) => {
                warn!(session_id = id, "Session state poisoned by a panic, closing it");
                self.write_sessions().remove(&id);
                Err(MemoryError::SessionClosed(id.to_string()))
            }
        }
    }

    fn with_session<T>(
        &self,
        id: SessionId,
        f: impl FnOnce(&ScanSession) -> MemoryResult<T>,
    ) -> MemoryResult<T> {
        let entry = self.entry(id)?;
        let session = self.lock(id, &entry)?;
        entry.touch();
        f(&*session)
    }

    fn with_round<T>(
        &self,
        id: SessionId,
        f: impl FnOnce(&mut ScanSession, ScanContext<'_>, &RoundControl) -> MemoryResult<T>,
    ) -> MemoryResult<T> {
        let entry = self.entry(id)?;
        let mut session = self.lock(id, &entry)?;

        let token = CancelToken::new();
        entry.set_active(Some(token.clone()));
        let control = RoundControl::new(token).with_timeout(self.settings.scan_timeout);

        let result = f(&mut *session, self.context(), &control);

        entry.set_active(None);
        entry.touch();
        result
    }

    fn read_sessions(&self) -> RwLockReadGuard<'_, SessionMap> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_sessions(&self) -> RwLockWriteGuard<'_, SessionMap> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }
}

//! Request dispatch

use super::request::Request;
use super::response::{CandidateView, ErrorBody, PathView, Reply, Response};
use crate::core::types::{Address, MemoryError, MemoryResult};
use crate::pointer::PointerResolver;
use crate::scan::SessionStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes requests to the session store and the pointer resolver
#[derive(Clone)]
pub struct Handler {
    store: Arc<SessionStore>,
    pointers: Arc<PointerResolver>,
}

impl Handler {
    pub fn new(store: Arc<SessionStore>, pointers: Arc<PointerResolver>) -> Self {
        Handler { store, pointers }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn handle(&self, request: Request) -> MemoryResult<Response> {
        debug!(method = request.method(), "Handling request");

        match request {
            Request::StartScan {
                value_type,
                scan_type,
                criterion,
                options,
            } => {
                let (session_id, round) =
                    self.store.start_scan(value_type, scan_type, criterion, &options)?;
                Ok(Response::ScanStarted { session_id, round })
            }
            Request::RefineScan {
                session_id,
                scan_type,
                criterion,
            } => {
                let round = self.store.refine(session_id, scan_type, criterion)?;
                Ok(Response::ScanRefined { session_id, round })
            }
            Request::ListCandidates {
                session_id,
                offset,
                limit,
            } => {
                let (total, page) = self.store.list_candidates(session_id, offset, limit)?;
                Ok(Response::Candidates {
                    session_id,
                    total,
                    offset,
                    candidates: page.into_iter().map(CandidateView::from).collect(),
                })
            }
            Request::AobScan {
                pattern,
                max_distance,
                module,
            } => {
                let (matches, diagnostics) =
                    self.store.aob_scan(&pattern, max_distance, module.as_deref())?;
                Ok(Response::AobMatches { matches, diagnostics })
            }
            Request::ResolvePointer { chain, read } => {
                let chain = chain.to_chain()?;
                let trace = self.pointers.resolve_trace(&chain)?;
                let address = trace.last().copied().unwrap_or_default();
                let value = match read {
                    Some(read) => {
                        let memory = self.store.memory();
                        Some(memory.read_value(address, read.value_type, read.len)?)
                    }
                    None => None,
                };
                Ok(Response::PointerResolved {
                    address: address.to_string(),
                    trace: trace.iter().map(Address::to_string).collect(),
                    value,
                })
            }
            Request::FindPointerPaths {
                from,
                to,
                max_depth,
                max_offset,
            } => {
                let from: Vec<Address> = from.into_iter().map(Address::from).collect();
                let paths = self.pointers.find_paths(&from, to.into(), max_depth, max_offset)?;
                Ok(Response::PointerPaths {
                    paths: paths.into_iter().map(PathView::from).collect(),
                })
            }
            Request::CloseSession { session_id } => {
                let existed = self.store.close(session_id)?;
                Ok(Response::SessionClosed { session_id, existed })
            }
            Request::CancelScan { session_id } => {
                let was_running = self.store.cancel(session_id)?;
                Ok(Response::CancelRequested { session_id, was_running })
            }
            Request::SessionHistory { session_id } => Ok(Response::History {
                session_id,
                rounds: self.store.history(session_id)?,
            }),
            Request::ExportSession { session_id } => Ok(Response::SessionExport {
                snapshot: self.store.export(session_id)?,
            }),
            Request::EstimatePointerPaths {
                from_count,
                max_depth,
                max_offset,
            } => Ok(Response::PathEstimate {
                estimate: self.pointers.estimate_paths(from_count, max_depth, max_offset),
            }),
            Request::FindBaseCandidates {
                target,
                max_offset,
                limit,
            } => Ok(Response::BaseCandidates {
                candidates: self.pointers.find_base_candidates(target.into(), max_offset, limit)?,
            }),
            Request::WritePointer { chain, value } => {
                let address = self.pointers.write_value(&chain.to_chain()?, &value)?;
                Ok(Response::PointerWritten {
                    address: address.to_string(),
                })
            }
        }
    }

    /// Handles one JSON request and always produces a JSON reply
    pub fn handle_json(&self, line: &str) -> String {
        let reply = match serde_json::from_str::<Request>(line) {
            Ok(request) => match self.handle(request) {
                Ok(response) => Reply::success(response),
                Err(e) => {
                    debug!(error = %e, "Request failed");
                    Reply::failure(ErrorBody::from(&e))
                }
            },
            Err(e) => Reply::failure(ErrorBody::from(&MemoryError::from(e))),
        };

        serde_json::to_string(&reply).unwrap_or_else(|e| {
            warn!(error = %e, "Reply serialization failed");
            format!(r#"{{"ok":false,"error":{{"code":"Unknown","message":"{}"}}}}"#, e)
        })
    }
}

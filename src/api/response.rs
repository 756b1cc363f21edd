//! Response types and the reply envelope

use crate::core::types::{Address, MemoryError, MemoryValue, ScanResult, SessionId};
use crate::pointer::{BaseCandidate, PathEstimate, PointerChain, PointerPath};
use crate::scan::{AobMatch, RoundDiagnostics, RoundRecord, SessionSnapshot};
use serde::{Deserialize, Serialize};

/// A candidate with its address in hex and its value rendered for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateView {
    pub address: String,
    pub value: MemoryValue,
    pub display: String,
}

impl From<ScanResult> for CandidateView {
    fn from(result: ScanResult) -> Self {
        CandidateView {
            address: result.address.to_string(),
            display: result.value.to_string(),
            value: result.value,
        }
    }
}

/// A discovered path in chain notation next to its parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathView {
    pub chain: String,
    pub base: Address,
    pub offsets: Vec<i64>,
}

impl From<PointerPath> for PathView {
    fn from(path: PointerPath) -> Self {
        PathView {
            chain: PointerChain::absolute(path.base, path.offsets.clone()).to_string(),
            base: path.base,
            offsets: path.offsets,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum Response {
    #[serde(rename_all = "camelCase")]
    ScanStarted { session_id: SessionId, round: RoundRecord },
    #[serde(rename_all = "camelCase")]
    ScanRefined { session_id: SessionId, round: RoundRecord },
    #[serde(rename_all = "camelCase")]
    Candidates {
        session_id: SessionId,
        total: usize,
        offset: usize,
        candidates: Vec<CandidateView>,
    },
    #[serde(rename_all = "camelCase")]
    AobMatches {
        matches: Vec<AobMatch>,
        diagnostics: RoundDiagnostics,
    },
    #[serde(rename_all = "camelCase")]
    PointerResolved {
        address: String,
        trace: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<MemoryValue>,
    },
    #[serde(rename_all = "camelCase")]
    PointerPaths { paths: Vec<PathView> },
    #[serde(rename_all = "camelCase")]
    PathEstimate { estimate: PathEstimate },
    #[serde(rename_all = "camelCase")]
    BaseCandidates { candidates: Vec<BaseCandidate> },
    #[serde(rename_all = "camelCase")]
    PointerWritten { address: String },
    #[serde(rename_all = "camelCase")]
    SessionClosed { session_id: SessionId, existed: bool },
    #[serde(rename_all = "camelCase")]
    CancelRequested { session_id: SessionId, was_running: bool },
    #[serde(rename_all = "camelCase")]
    History { session_id: SessionId, rounds: Vec<RoundRecord> },
    #[serde(rename_all = "camelCase")]
    SessionExport { snapshot: SessionSnapshot },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error name, e.g. `SessionNotFound`
    pub code: String,
    pub message: String,
}

impl From<&MemoryError> for ErrorBody {
    fn from(error: &MemoryError) -> Self {
        ErrorBody {
            code: error_code(error).to_string(),
            message: error.to_string(),
        }
    }
}

/// `{"ok": true, "data": ...}` or `{"ok": false, "error": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Response>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Reply {
    pub fn success(data: Response) -> Self {
        Reply {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: ErrorBody) -> Self {
        Reply {
            ok: false,
            data: None,
            error: Some(error),
        }
    }
}

pub fn error_code(error: &MemoryError) -> &'static str {
    match error {
        MemoryError::InvalidAddress(_) => "InvalidAddress",
        MemoryError::UnreadableAddress { .. } => "UnreadableAddress",
        MemoryError::WriteFailed { .. } => "WriteFailed",
        MemoryError::InvalidValueType(_) => "InvalidValueType",
        MemoryError::TypeMismatch(_) => "TypeMismatch",
        MemoryError::InvalidCriterion(_) => "InvalidCriterion",
        MemoryError::InvalidPattern(_) => "InvalidPattern",
        MemoryError::SessionNotFound(_) => "SessionNotFound",
        MemoryError::SessionClosed(_) => "SessionClosed",
        MemoryError::EmptySession(_) => "EmptySession",
        MemoryError::ScanInProgress(_) => "ScanInProgress",
        MemoryError::SessionLimitReached(_) => "SessionLimitReached",
        MemoryError::ModuleNotFound(_) => "ModuleNotFound",
        MemoryError::ChainTooLong { .. } => "ChainTooLong",
        MemoryError::SearchBudgetExceeded { .. } => "SearchBudgetExceeded",
        MemoryError::TooManyPaths { .. } => "TooManyPaths",
        MemoryError::RegionEnumerationPartial(_) => "RegionEnumerationPartial",
        MemoryError::Cancelled => "Cancelled",
        MemoryError::Timeout(_) => "Timeout",
        MemoryError::ProcessNotFound(_) => "ProcessNotFound",
        MemoryError::WindowsApi(_) => "WindowsApi",
        MemoryError::UnsupportedOperation(_) => "UnsupportedOperation",
        MemoryError::IoError(_) => "IoError",
        MemoryError::JsonError(_) => "InvalidRequest",
        MemoryError::Unknown(_) => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_shape() {
        let reply = Reply::failure(ErrorBody::from(&MemoryError::SessionNotFound("9".to_string())));
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "ok": false,
                "error": {"code": "SessionNotFound", "message": "Scan session not found: 9"}
            })
        );
    }

    #[test]
    fn test_candidate_view_renders_hex() {
        let result = ScanResult::new(Address::new(0x1040), MemoryValue::Bytes(vec![0xDE, 0xAD]));
        let view = CandidateView::from(result);
        assert_eq!(view.address, "0x0000000000001040");
        assert_eq!(view.display, "DEAD");
    }

    #[test]
    fn test_path_view_chain_text() {
        let view = PathView::from(PointerPath {
            base: Address::new(0x400000),
            offsets: vec![0x10, -0x8],
        });
        assert_eq!(view.chain, "0x400000 -> 0x10 -> -0x8");
    }
}

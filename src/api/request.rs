//! Request types
//!
//! Requests arrive as `{"method": "...", "params": {...}}` with camelCase
//! field names. Addresses may be JSON numbers or strings in any form
//! [`Address`] parses (`"0x1F00"`, `"$1F00"`, `"7936"`).

use crate::core::types::{
    Address, Criterion, MemoryResult, MemoryValue, ScanType, SessionId, ValueType,
};
use crate::pointer::PointerChain;
use crate::scan::ScanOptions;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

fn default_limit() -> usize {
    100
}

/// An address accepted as a number or a string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AddressArg(pub Address);

impl<'de> Deserialize<'de> for AddressArg {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(AddressArg(Address::from(n))),
            Raw::Text(text) => text.parse().map(AddressArg).map_err(de::Error::custom),
        }
    }
}

impl From<AddressArg> for Address {
    fn from(arg: AddressArg) -> Self {
        arg.0
    }
}

/// A chain in text notation or as a structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChainArg {
    Text(String),
    Structured(PointerChain),
}

impl ChainArg {
    pub fn to_chain(&self) -> MemoryResult<PointerChain> {
        match self {
            ChainArg::Text(text) => text.parse(),
            ChainArg::Structured(chain) => Ok(chain.clone()),
        }
    }
}

/// Optional typed read at a resolved address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadArg {
    pub value_type: ValueType,
    /// Byte count for bytes and strings
    #[serde(default)]
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    StartScan {
        value_type: ValueType,
        scan_type: ScanType,
        #[serde(default)]
        criterion: Criterion,
        #[serde(default)]
        options: ScanOptions,
    },
    #[serde(rename_all = "camelCase")]
    RefineScan {
        session_id: SessionId,
        scan_type: ScanType,
        #[serde(default)]
        criterion: Criterion,
    },
    #[serde(rename_all = "camelCase")]
    ListCandidates {
        session_id: SessionId,
        #[serde(default)]
        offset: usize,
        #[serde(default = "default_limit")]
        limit: usize,
    },
    #[serde(rename_all = "camelCase")]
    AobScan {
        pattern: String,
        #[serde(default)]
        max_distance: Option<u32>,
        #[serde(default)]
        module: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ResolvePointer {
        chain: ChainArg,
        #[serde(default)]
        read: Option<ReadArg>,
    },
    #[serde(rename_all = "camelCase")]
    FindPointerPaths {
        from: Vec<AddressArg>,
        to: AddressArg,
        max_depth: usize,
        max_offset: u64,
    },
    #[serde(rename_all = "camelCase")]
    CloseSession { session_id: SessionId },
    #[serde(rename_all = "camelCase")]
    CancelScan { session_id: SessionId },
    #[serde(rename_all = "camelCase")]
    SessionHistory { session_id: SessionId },
    #[serde(rename_all = "camelCase")]
    ExportSession { session_id: SessionId },
    #[serde(rename_all = "camelCase")]
    EstimatePointerPaths {
        from_count: usize,
        max_depth: usize,
        max_offset: u64,
    },
    #[serde(rename_all = "camelCase")]
    FindBaseCandidates {
        target: AddressArg,
        max_offset: u64,
        #[serde(default = "default_limit")]
        limit: usize,
    },
    #[serde(rename_all = "camelCase")]
    WritePointer { chain: ChainArg, value: MemoryValue },
}

impl Request {
    /// Wire name of the method
    pub fn method(&self) -> &'static str {
        match self {
            Request::StartScan { .. } => "startScan",
            Request::RefineScan { .. } => "refineScan",
            Request::ListCandidates { .. } => "listCandidates",
            Request::AobScan { .. } => "aobScan",
            Request::ResolvePointer { .. } => "resolvePointer",
            Request::FindPointerPaths { .. } => "findPointerPaths",
            Request::CloseSession { .. } => "closeSession",
            Request::CancelScan { .. } => "cancelScan",
            Request::SessionHistory { .. } => "sessionHistory",
            Request::ExportSession { .. } => "exportSession",
            Request::EstimatePointerPaths { .. } => "estimatePointerPaths",
            Request::FindBaseCandidates { .. } => "findBaseCandidates",
            Request::WritePointer { .. } => "writePointer",
        }
    }
}

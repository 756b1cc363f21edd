//! Scan algorithm selectors, criteria and result views

use super::error::{MemoryError, MemoryResult};
use super::{Address, MemoryValue, ValueType};
use serde::{Deserialize, Serialize};

/// A candidate as reported to callers: an address and its last observed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub address: Address,
    pub value: MemoryValue,
}

impl ScanResult {
    pub fn new(address: Address, value: MemoryValue) -> Self {
        ScanResult { address, value }
    }
}

/// Scan algorithm. The set is closed; each case compiles to one predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    Exact,
    Unknown,
    Changed,
    Unchanged,
    Increased,
    Decreased,
    Between,
    BiggerThan,
    SmallerThan,
    IncreasedBy,
    DecreasedBy,
    /// Array-of-bytes pattern with wildcards
    Pattern,
}

impl ScanType {
    /// Checks if this scan type compares against each candidate's previous value
    pub fn requires_previous(&self) -> bool {
        matches!(
            self,
            ScanType::Increased
                | ScanType::IncreasedBy
                | ScanType::Decreased
                | ScanType::DecreasedBy
                | ScanType::Changed
                | ScanType::Unchanged
        )
    }

    /// Checks if this scan type needs a numeric ordering on the value type
    pub fn requires_ordering(&self) -> bool {
        matches!(
            self,
            ScanType::Increased
                | ScanType::IncreasedBy
                | ScanType::Decreased
                | ScanType::DecreasedBy
                | ScanType::Between
                | ScanType::BiggerThan
                | ScanType::SmallerThan
        )
    }

    /// Checks whether the scan type can seed a session
    pub fn allowed_on_first_scan(&self) -> bool {
        !self.requires_previous()
    }

    /// Validates the criterion shape against the scan type
    pub fn check_criterion(&self, criterion: &Criterion) -> MemoryResult<()> {
        let ok = match self {
            ScanType::Exact
            | ScanType::BiggerThan
            | ScanType::SmallerThan
            | ScanType::IncreasedBy
            | ScanType::DecreasedBy => matches!(criterion, Criterion::Value { .. }),
            ScanType::Between => matches!(criterion, Criterion::Range { .. }),
            ScanType::Pattern => matches!(criterion, Criterion::Pattern { .. }),
            ScanType::Unknown
            | ScanType::Changed
            | ScanType::Unchanged
            | ScanType::Increased
            | ScanType::Decreased => matches!(criterion, Criterion::None),
        };

        if ok {
            Ok(())
        } else {
            Err(MemoryError::invalid_criterion(format!(
                "{:?} scan cannot take a {} criterion",
                self,
                criterion.shape()
            )))
        }
    }
}

/// The operand(s) of a scan round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Criterion {
    #[default]
    None,
    Value {
        value: MemoryValue,
    },
    Range {
        low: MemoryValue,
        high: MemoryValue,
    },
    Pattern {
        pattern: String,
        /// Hamming-distance threshold; absent means exact matching
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_distance: Option<u32>,
    },
}

impl Criterion {
    pub fn value(value: MemoryValue) -> Self {
        Criterion::Value { value }
    }

    pub fn range(low: MemoryValue, high: MemoryValue) -> Self {
        Criterion::Range { low, high }
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        Criterion::Pattern {
            pattern: pattern.into(),
            max_distance: None,
        }
    }

    pub fn fuzzy_pattern(pattern: impl Into<String>, max_distance: u32) -> Self {
        Criterion::Pattern {
            pattern: pattern.into(),
            max_distance: Some(max_distance),
        }
    }

    /// Short name of the criterion's shape, for error messages
    pub fn shape(&self) -> &'static str {
        match self {
            Criterion::None => "empty",
            Criterion::Value { .. } => "single value",
            Criterion::Range { .. } => "range",
            Criterion::Pattern { .. } => "pattern",
        }
    }

    /// Checks every operand carries the session's value type
    pub fn check_type(&self, value_type: ValueType) -> MemoryResult<()> {
        match self {
            Criterion::Value { value } => value.expect_type(value_type),
            Criterion::Range { low, high } => {
                low.expect_type(value_type)?;
                high.expect_type(value_type)
            }
            Criterion::None | Criterion::Pattern { .. } => Ok(()),
        }
    }
}

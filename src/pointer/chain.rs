//! Pointer chain notation
//!
//! `game.exe+0x1F00 -> 0x10 -> -0x8` starts at the module base plus an
//! offset; `0x7FF6A0001000 -> 0x10` starts at an absolute address.

use crate::core::types::{Address, MemoryError, MemoryResult, Offset};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a chain starts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PointerBase {
    Module { name: String, offset: Offset },
    Absolute { address: Address },
}

/// A base followed by offsets, one dereference per offset
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointerChain {
    pub base: PointerBase,
    #[serde(default)]
    pub offsets: Vec<Offset>,
}

impl PointerChain {
    pub fn module(name: impl Into<String>, offset: Offset, offsets: Vec<Offset>) -> Self {
        PointerChain {
            base: PointerBase::Module {
                name: name.into(),
                offset,
            },
            offsets,
        }
    }

    pub fn absolute(address: Address, offsets: Vec<Offset>) -> Self {
        PointerChain {
            base: PointerBase::Absolute { address },
            offsets,
        }
    }

    /// Number of dereferences
    pub fn depth(&self) -> usize {
        self.offsets.len()
    }
}

/// Parses `0x10`, `-0x8`, `16` or `-16`
pub fn parse_offset(text: &str) -> MemoryResult<Offset> {
    let text = text.trim();
    let (negative, magnitude) = match text.strip_prefix('-') {
        Some(rest) => (true, rest.trim()),
        None => (false, text.strip_prefix('+').unwrap_or(text).trim()),
    };

    let value = match magnitude.strip_prefix("0x").or_else(|| magnitude.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => magnitude.parse::<i64>(),
    }
    .map_err(|_| MemoryError::InvalidAddress(format!("bad offset '{}'", text)))?;

    Ok(if negative { -value } else { value })
}

fn fmt_offset(offset: Offset, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if offset < 0 {
        write!(f, "-0x{:X}", offset.unsigned_abs())
    } else {
        write!(f, "0x{:X}", offset)
    }
}

impl FromStr for PointerChain {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split("->").map(str::trim);
        let base = parts
            .next()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| MemoryError::InvalidAddress("empty pointer chain".to_string()))?;

        let base = match base.rsplit_once('+') {
            Some((name, offset)) if !name.trim().is_empty() => PointerBase::Module {
                name: name.trim().to_string(),
                offset: parse_offset(offset)?,
            },
            _ => PointerBase::Absolute {
                address: base.parse()?,
            },
        };
        let offsets = parts.map(parse_offset).collect::<MemoryResult<Vec<_>>>()?;

        Ok(PointerChain { base, offsets })
    }
}

impl fmt::Display for PointerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.base {
            PointerBase::Module { name, offset } => {
                write!(f, "{}+", name)?;
                fmt_offset(*offset, f)?;
            }
            PointerBase::Absolute { address } => write!(f, "0x{:X}", address.as_usize())?,
        }
        for offset in &self.offsets {
            write!(f, " -> ")?;
            fmt_offset(*offset, f)?;
        }
        Ok(())
    }
}

//! Typed memory values and their tags

use super::error::{MemoryError, MemoryResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A value observed in or searched for in target memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum MemoryValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bytes(Vec<u8>),
    String(String),
}

impl MemoryValue {
    /// Returns the size in bytes of the value
    pub fn size(&self) -> usize {
        match self {
            MemoryValue::Bytes(b) => b.len(),
            MemoryValue::String(s) => s.len(),
            other => other.value_type().size().unwrap_or(0),
        }
    }

    /// Little-endian byte image, as it would appear in target memory
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            MemoryValue::I8(v) => v.to_le_bytes().to_vec(),
            MemoryValue::I16(v) => v.to_le_bytes().to_vec(),
            MemoryValue::I32(v) => v.to_le_bytes().to_vec(),
            MemoryValue::I64(v) => v.to_le_bytes().to_vec(),
            MemoryValue::U8(v) => v.to_le_bytes().to_vec(),
            MemoryValue::U16(v) => v.to_le_bytes().to_vec(),
            MemoryValue::U32(v) => v.to_le_bytes().to_vec(),
            MemoryValue::U64(v) => v.to_le_bytes().to_vec(),
            MemoryValue::F32(v) => v.to_le_bytes().to_vec(),
            MemoryValue::F64(v) => v.to_le_bytes().to_vec(),
            MemoryValue::Bytes(b) => b.clone(),
            MemoryValue::String(s) => s.as_bytes().to_vec(),
        }
    }

    /// Decodes a value of `value_type` from the front of `bytes`.
    ///
    /// Bytes and strings take the whole slice; strings are decoded lossily
    /// since target memory is not guaranteed to hold valid UTF-8.
    pub fn from_bytes(bytes: &[u8], value_type: ValueType) -> Option<Self> {
        fn arr<const N: usize>(bytes: &[u8]) -> Option<[u8; N]> {
            bytes.get(..N)?.try_into().ok()
        }

        let value = match value_type {
            ValueType::I8 => MemoryValue::I8(i8::from_le_bytes(arr(bytes)?)),
            ValueType::I16 => MemoryValue::I16(i16::from_le_bytes(arr(bytes)?)),
            ValueType::I32 => MemoryValue::I32(i32::from_le_bytes(arr(bytes)?)),
            ValueType::I64 => MemoryValue::I64(i64::from_le_bytes(arr(bytes)?)),
            ValueType::U8 => MemoryValue::U8(u8::from_le_bytes(arr(bytes)?)),
            ValueType::U16 => MemoryValue::U16(u16::from_le_bytes(arr(bytes)?)),
            ValueType::U32 => MemoryValue::U32(u32::from_le_bytes(arr(bytes)?)),
            ValueType::U64 => MemoryValue::U64(u64::from_le_bytes(arr(bytes)?)),
            ValueType::F32 => MemoryValue::F32(f32::from_le_bytes(arr(bytes)?)),
            ValueType::F64 => MemoryValue::F64(f64::from_le_bytes(arr(bytes)?)),
            ValueType::Bytes => MemoryValue::Bytes(bytes.to_vec()),
            ValueType::String => MemoryValue::String(String::from_utf8_lossy(bytes).into_owned()),
        };
        Some(value)
    }

    /// Parses user text into a value of the given type
    pub fn parse(text: &str, value_type: ValueType) -> MemoryResult<Self> {
        let text = text.trim();
        let bad =
            || MemoryError::InvalidValueType(format!("'{}' is not a valid {}", text, value_type));

        let value = match value_type {
            ValueType::I8 => MemoryValue::I8(text.parse().map_err(|_| bad())?),
            ValueType::I16 => MemoryValue::I16(text.parse().map_err(|_| bad())?),
            ValueType::I32 => MemoryValue::I32(text.parse().map_err(|_| bad())?),
            ValueType::I64 => MemoryValue::I64(text.parse().map_err(|_| bad())?),
            ValueType::U8 => MemoryValue::U8(text.parse().map_err(|_| bad())?),
            ValueType::U16 => MemoryValue::U16(text.parse().map_err(|_| bad())?),
            ValueType::U32 => MemoryValue::U32(text.parse().map_err(|_| bad())?),
            ValueType::U64 => MemoryValue::U64(text.parse().map_err(|_| bad())?),
            ValueType::F32 => MemoryValue::F32(text.parse().map_err(|_| bad())?),
            ValueType::F64 => MemoryValue::F64(text.parse().map_err(|_| bad())?),
            ValueType::Bytes => {
                let compact: String = text.split_whitespace().collect();
                MemoryValue::Bytes(hex::decode(compact).map_err(|_| bad())?)
            }
            ValueType::String => MemoryValue::String(text.to_string()),
        };
        Ok(value)
    }

    /// Gets the value type enum for this value
    pub fn value_type(&self) -> ValueType {
        match self {
            MemoryValue::I8(_) => ValueType::I8,
            MemoryValue::I16(_) => ValueType::I16,
            MemoryValue::I32(_) => ValueType::I32,
            MemoryValue::I64(_) => ValueType::I64,
            MemoryValue::U8(_) => ValueType::U8,
            MemoryValue::U16(_) => ValueType::U16,
            MemoryValue::U32(_) => ValueType::U32,
            MemoryValue::U64(_) => ValueType::U64,
            MemoryValue::F32(_) => ValueType::F32,
            MemoryValue::F64(_) => ValueType::F64,
            MemoryValue::Bytes(_) => ValueType::Bytes,
            MemoryValue::String(_) => ValueType::String,
        }
    }

    /// Fails with `TypeMismatch` unless the value carries `expected` as its tag
    pub fn expect_type(&self, expected: ValueType) -> MemoryResult<()> {
        if self.value_type() == expected {
            Ok(())
        } else {
            Err(MemoryError::type_mismatch(format!(
                "expected a {} value, got {}",
                expected,
                self.value_type()
            )))
        }
    }
}

/// Enum representing the type of a memory value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bytes,
    String,
}

impl ValueType {
    /// Returns the size in bytes for fixed-width types
    pub fn size(&self) -> Option<usize> {
        match self {
            ValueType::I8 | ValueType::U8 => Some(1),
            ValueType::I16 | ValueType::U16 => Some(2),
            ValueType::I32 | ValueType::U32 | ValueType::F32 => Some(4),
            ValueType::I64 | ValueType::U64 | ValueType::F64 => Some(8),
            ValueType::Bytes | ValueType::String => None,
        }
    }

    /// Required alignment: the natural width for numbers, 1 for byte sequences
    pub fn alignment(&self) -> usize {
        self.size().unwrap_or(1)
    }

    /// Whether `increased`/`decreased`/`between` have a meaning for this type
    pub fn is_orderable(&self) -> bool {
        self.size().is_some()
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ValueType::F32 | ValueType::F64)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::I8 => "i8",
            ValueType::I16 => "i16",
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::U8 => "u8",
            ValueType::U16 => "u16",
            ValueType::U32 => "u32",
            ValueType::U64 => "u64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::Bytes => "bytes",
            ValueType::String => "string",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueType {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value_type = match s.trim().to_ascii_lowercase().as_str() {
            "i8" => ValueType::I8,
            "i16" => ValueType::I16,
            "i32" => ValueType::I32,
            "i64" => ValueType::I64,
            "u8" => ValueType::U8,
            "u16" => ValueType::U16,
            "u32" => ValueType::U32,
            "u64" => ValueType::U64,
            "f32" | "float" => ValueType::F32,
            "f64" | "double" => ValueType::F64,
            "bytes" | "aob" => ValueType::Bytes,
            "string" | "str" => ValueType::String,
            other => return Err(MemoryError::InvalidValueType(other.to_string())),
        };
        Ok(value_type)
    }
}

impl fmt::Display for MemoryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryValue::I8(v) => write!(f, "{}", v),
            MemoryValue::I16(v) => write!(f, "{}", v),
            MemoryValue::I32(v) => write!(f, "{}", v),
            MemoryValue::I64(v) => write!(f, "{}", v),
            MemoryValue::U8(v) => write!(f, "{}", v),
            MemoryValue::U16(v) => write!(f, "{}", v),
            MemoryValue::U32(v) => write!(f, "{}", v),
            MemoryValue::U64(v) => write!(f, "{}", v),
            MemoryValue::F32(v) => write!(f, "{}", v),
            MemoryValue::F64(v) => write!(f, "{}", v),
            MemoryValue::Bytes(b) => write!(f, "{}", hex::encode_upper(b)),
            MemoryValue::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_size() {
        assert_eq!(MemoryValue::I32(42).size(), 4);
        assert_eq!(MemoryValue::U64(100).size(), 8);
        assert_eq!(MemoryValue::F32(1.5).size(), 4);
        assert_eq!(MemoryValue::Bytes(vec![1, 2, 3]).size(), 3);
    }

    #[test]
    fn test_value_to_bytes() {
        assert_eq!(MemoryValue::U32(0x12345678).to_bytes(), vec![0x78, 0x56, 0x34, 0x12]);
        assert_eq!(MemoryValue::I8(-1).to_bytes(), vec![0xFF]);
        assert_eq!(MemoryValue::String("Hi".to_string()).to_bytes(), vec![b'H', b'i']);
    }

    #[test]
    fn test_value_from_bytes() {
        let bytes = vec![0x78, 0x56, 0x34, 0x12];
        let value = MemoryValue::from_bytes(&bytes, ValueType::U32).unwrap();
        assert_eq!(value, MemoryValue::U32(0x12345678));
        assert!(MemoryValue::from_bytes(&bytes[..2], ValueType::U32).is_none());
    }

    #[test]
    fn test_parse_values() {
        assert_eq!(MemoryValue::parse("-5", ValueType::I16).unwrap(), MemoryValue::I16(-5));
        assert_eq!(
            MemoryValue::parse("de ad", ValueType::Bytes).unwrap(),
            MemoryValue::Bytes(vec![0xDE, 0xAD])
        );
        assert!(MemoryValue::parse("300", ValueType::U8).is_err());
    }

    #[test]
    fn test_alignment_and_ordering() {
        assert_eq!(ValueType::F64.alignment(), 8);
        assert_eq!(ValueType::String.alignment(), 1);
        assert!(ValueType::I16.is_orderable());
        assert!(!ValueType::Bytes.is_orderable());
    }

    #[test]
    fn test_expect_type() {
        assert!(MemoryValue::U32(1).expect_type(ValueType::U32).is_ok());
        let err = MemoryValue::F32(1.0).expect_type(ValueType::U32).unwrap_err();
        assert!(matches!(err, MemoryError::TypeMismatch(_)));
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&MemoryValue::U32(7)).unwrap();
        assert_eq!(json, r#"{"type":"u32","value":7}"#);
        let back: MemoryValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, MemoryValue::U32(7));
        assert_eq!("double".parse::<ValueType>().unwrap(), ValueType::F64);
    }
}

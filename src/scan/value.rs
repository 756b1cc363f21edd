//! Value matcher: typed predicates over raw little-endian memory
//!
//! A [`ScanType`] plus its [`Criterion`] compiles once per round into a
//! [`ValueMatcher`], a closed enum with one arm per value type. Each numeric
//! arm carries a [`Predicate`] specialised to the native type, so the hot loop
//! compares `u32` against `u32` without re-decoding the operand.

use super::simd;
use crate::core::types::{
    Address, Criterion, MemoryError, MemoryResult, MemoryValue, ScanType, ValueType,
};

/// A fixed-width number as stored in target memory
pub trait Scalar: Copy + PartialOrd + Send + Sync + 'static {
    const WIDTH: usize;

    /// Decodes from the first `WIDTH` bytes of `bytes`
    fn load(bytes: &[u8]) -> Self;

    /// Exact equality. Floats compare bit patterns.
    fn same(self, other: Self) -> bool;

    /// Little-endian image in the first `WIDTH` bytes
    fn le_bytes(self) -> [u8; 8];

    fn plus(self, other: Self) -> Self;

    fn minus(self, other: Self) -> Self;

    fn extract(value: &MemoryValue) -> Option<Self>;
}

macro_rules! impl_scalar_int {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl Scalar for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();

            #[inline(always)]
            fn load(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..Self::WIDTH]);
                <$ty>::from_le_bytes(raw)
            }

            #[inline(always)]
            fn same(self, other: Self) -> bool {
                self == other
            }

            #[inline(always)]
            fn le_bytes(self) -> [u8; 8] {
                let mut raw = [0u8; 8];
                raw[..Self::WIDTH].copy_from_slice(&self.to_le_bytes());
                raw
            }

            #[inline(always)]
            fn plus(self, other: Self) -> Self {
                self.wrapping_add(other)
            }

            #[inline(always)]
            fn minus(self, other: Self) -> Self {
                self.wrapping_sub(other)
            }

            fn extract(value: &MemoryValue) -> Option<Self> {
                match value {
                    MemoryValue::$variant(v) => Some(*v),
                    _ => None,
                }
            }
        }
    )*};
}

macro_rules! impl_scalar_float {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl Scalar for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();

            #[inline(always)]
            fn load(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..Self::WIDTH]);
                <$ty>::from_le_bytes(raw)
            }

            #[inline(always)]
            fn same(self, other: Self) -> bool {
                self.to_bits() == other.to_bits()
            }

            #[inline(always)]
            fn le_bytes(self) -> [u8; 8] {
                let mut raw = [0u8; 8];
                raw[..Self::WIDTH].copy_from_slice(&self.to_le_bytes());
                raw
            }

            #[inline(always)]
            fn plus(self, other: Self) -> Self {
                self + other
            }

            #[inline(always)]
            fn minus(self, other: Self) -> Self {
                self - other
            }

            fn extract(value: &MemoryValue) -> Option<Self> {
                match value {
                    MemoryValue::$variant(v) => Some(*v),
                    _ => None,
                }
            }
        }
    )*};
}

impl_scalar_int!(
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64
);
impl_scalar_float!(f32 => F32, f64 => F64);

/// One scan algorithm specialised to a native type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Predicate<T> {
    Any,
    Equal(T),
    Changed,
    Unchanged,
    Increased,
    Decreased,
    /// Inclusive on both ends
    Between(T, T),
    Above(T),
    Below(T),
    IncreasedBy(T),
    DecreasedBy(T),
}

impl<T: Scalar> Predicate<T> {
    fn compile(scan_type: ScanType, criterion: &Criterion) -> MemoryResult<Self> {
        let operand = |value: &MemoryValue| {
            T::extract(value).ok_or_else(|| {
                MemoryError::type_mismatch(format!(
                    "operand {} does not fit the scan type",
                    value.value_type()
                ))
            })
        };

        let predicate = match (scan_type, criterion) {
            (ScanType::Unknown, _) => Predicate::Any,
            (ScanType::Changed, _) => Predicate::Changed,
            (ScanType::Unchanged, _) => Predicate::Unchanged,
            (ScanType::Increased, _) => Predicate::Increased,
            (ScanType::Decreased, _) => Predicate::Decreased,
            (ScanType::Exact, Criterion::Value { value }) => Predicate::Equal(operand(value)?),
            (ScanType::BiggerThan, Criterion::Value { value }) => Predicate::Above(operand(value)?),
            (ScanType::SmallerThan, Criterion::Value { value }) => {
                Predicate::Below(operand(value)?)
            }
            (ScanType::IncreasedBy, Criterion::Value { value }) => {
                Predicate::IncreasedBy(operand(value)?)
            }
            (ScanType::DecreasedBy, Criterion::Value { value }) => {
                Predicate::DecreasedBy(operand(value)?)
            }
            (ScanType::Between, Criterion::Range { low, high }) => {
                let (low, high) = (operand(low)?, operand(high)?);
                if !(low <= high) {
                    return Err(MemoryError::invalid_criterion(
                        "range low bound exceeds high bound",
                    ));
                }
                Predicate::Between(low, high)
            }
            (scan_type, criterion) => {
                return Err(MemoryError::invalid_criterion(format!(
                    "{:?} scan cannot take a {} criterion",
                    scan_type,
                    criterion.shape()
                )))
            }
        };
        Ok(predicate)
    }

    pub fn needs_previous(&self) -> bool {
        matches!(
            self,
            Predicate::Changed
                | Predicate::Unchanged
                | Predicate::Increased
                | Predicate::Decreased
                | Predicate::IncreasedBy(_)
                | Predicate::DecreasedBy(_)
        )
    }

    /// Evaluates the predicate. Previous-value predicates never match
    /// without a previous value.
    #[inline(always)]
    pub fn test(&self, current: T, previous: Option<T>) -> bool {
        match *self {
            Predicate::Any => true,
            Predicate::Equal(target) => current.same(target),
            Predicate::Between(low, high) => current >= low && current <= high,
            Predicate::Above(target) => current > target,
            Predicate::Below(target) => current < target,
            Predicate::Changed => previous.map_or(false, |p| !current.same(p)),
            Predicate::Unchanged => previous.map_or(false, |p| current.same(p)),
            Predicate::Increased => previous.map_or(false, |p| current > p),
            Predicate::Decreased => previous.map_or(false, |p| current < p),
            Predicate::IncreasedBy(delta) => previous.map_or(false, |p| current == p.plus(delta)),
            Predicate::DecreasedBy(delta) => previous.map_or(false, |p| current == p.minus(delta)),
        }
    }
}

/// Byte-sequence predicates. Ordering has no meaning here.
#[derive(Debug, Clone, PartialEq)]
pub enum BytesPredicate {
    Any,
    Equal(Vec<u8>),
    Changed,
    Unchanged,
}

impl BytesPredicate {
    fn test(&self, current: &[u8], previous: Option<&[u8]>) -> bool {
        match self {
            BytesPredicate::Any => true,
            BytesPredicate::Equal(target) => current == target.as_slice(),
            BytesPredicate::Changed => previous.map_or(false, |p| current != p),
            BytesPredicate::Unchanged => previous.map_or(false, |p| current == p),
        }
    }
}

/// A compiled value scan
#[derive(Debug, Clone, PartialEq)]
pub enum ValueMatcher {
    I8(Predicate<i8>),
    I16(Predicate<i16>),
    I32(Predicate<i32>),
    I64(Predicate<i64>),
    U8(Predicate<u8>),
    U16(Predicate<u16>),
    U32(Predicate<u32>),
    U64(Predicate<u64>),
    F32(Predicate<f32>),
    F64(Predicate<f64>),
    Bytes {
        value_type: ValueType,
        width: usize,
        predicate: BytesPredicate,
    },
}

/// Runs `$body` with `$pred` bound to the numeric predicate and `$ty` to its
/// native type, or `$bytes` for byte sequences.
macro_rules! dispatch {
    ($matcher:expr, |$pred:ident : $ty:ident| $body:expr, |$w:ident, $bp:ident| $bytes:expr) => {
        match $matcher {
            ValueMatcher::I8($pred) => { type $ty = i8; $body }
            ValueMatcher::I16($pred) => { type $ty = i16; $body }
            ValueMatcher::I32($pred) => { type $ty = i32; $body }
            ValueMatcher::I64($pred) => { type $ty = i64; $body }
            ValueMatcher::U8($pred) => { type $ty = u8; $body }
            ValueMatcher::U16($pred) => { type $ty = u16; $body }
            ValueMatcher::U32($pred) => { type $ty = u32; $body }
            ValueMatcher::U64($pred) => { type $ty = u64; $body }
            ValueMatcher::F32($pred) => { type $ty = f32; $body }
            ValueMatcher::F64($pred) => { type $ty = f64; $body }
            ValueMatcher::Bytes { width: $w, predicate: $bp, .. } => $bytes,
        }
    };
}

impl ValueMatcher {
    /// Compiles a scan for `value_type`.
    ///
    /// `width` is the established width of a bytes/string session; numeric
    /// types ignore it.
    pub fn compile(
        value_type: ValueType,
        scan_type: ScanType,
        criterion: &Criterion,
        width: Option<usize>,
    ) -> MemoryResult<Self> {
        if scan_type == ScanType::Pattern {
            return Err(MemoryError::invalid_criterion(
                "pattern scans are handled by the pattern matcher",
            ));
        }
        scan_type.check_criterion(criterion)?;
        if scan_type.requires_ordering() && !value_type.is_orderable() {
            return Err(MemoryError::type_mismatch(format!(
                "{:?} needs an ordered type, {} has no ordering",
                scan_type, value_type
            )));
        }
        criterion.check_type(value_type)?;

        let matcher = match value_type {
            ValueType::I8 => ValueMatcher::I8(Predicate::compile(scan_type, criterion)?),
            ValueType::I16 => ValueMatcher::I16(Predicate::compile(scan_type, criterion)?),
            ValueType::I32 => ValueMatcher::I32(Predicate::compile(scan_type, criterion)?),
            ValueType::I64 => ValueMatcher::I64(Predicate::compile(scan_type, criterion)?),
            ValueType::U8 => ValueMatcher::U8(Predicate::compile(scan_type, criterion)?),
            ValueType::U16 => ValueMatcher::U16(Predicate::compile(scan_type, criterion)?),
            ValueType::U32 => ValueMatcher::U32(Predicate::compile(scan_type, criterion)?),
            ValueType::U64 => ValueMatcher::U64(Predicate::compile(scan_type, criterion)?),
            ValueType::F32 => ValueMatcher::F32(Predicate::compile(scan_type, criterion)?),
            ValueType::F64 => ValueMatcher::F64(Predicate::compile(scan_type, criterion)?),
            ValueType::Bytes | ValueType::String => {
                Self::compile_bytes(value_type, scan_type, criterion, width)?
            }
        };
        Ok(matcher)
    }

    fn compile_bytes(
        value_type: ValueType,
        scan_type: ScanType,
        criterion: &Criterion,
        width: Option<usize>,
    ) -> MemoryResult<Self> {
        let (predicate, operand_width) = match (scan_type, criterion) {
            (ScanType::Exact, Criterion::Value { value }) => {
                let bytes = value.to_bytes();
                let len = bytes.len();
                (BytesPredicate::Equal(bytes), Some(len))
            }
            (ScanType::Unknown, _) => (BytesPredicate::Any, None),
            (ScanType::Changed, _) => (BytesPredicate::Changed, None),
            (ScanType::Unchanged, _) => (BytesPredicate::Unchanged, None),
            (scan_type, _) => {
                return Err(MemoryError::type_mismatch(format!(
                    "{:?} is not defined for {}",
                    scan_type, value_type
                )))
            }
        };

        let width = match (operand_width, width) {
            (Some(0), _) => return Err(MemoryError::invalid_criterion("empty byte sequence")),
            (Some(op), Some(w)) if op != w => {
                return Err(MemoryError::type_mismatch(format!(
                    "operand is {} bytes, session values are {} bytes",
                    op, w
                )))
            }
            (Some(op), _) => op,
            (None, Some(w)) => w,
            (None, None) => {
                return Err(MemoryError::invalid_criterion(format!(
                    "{:?} needs a known width for {} values",
                    scan_type, value_type
                )))
            }
        };

        Ok(ValueMatcher::Bytes {
            value_type,
            width,
            predicate,
        })
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            ValueMatcher::I8(_) => ValueType::I8,
            ValueMatcher::I16(_) => ValueType::I16,
            ValueMatcher::I32(_) => ValueType::I32,
            ValueMatcher::I64(_) => ValueType::I64,
            ValueMatcher::U8(_) => ValueType::U8,
            ValueMatcher::U16(_) => ValueType::U16,
            ValueMatcher::U32(_) => ValueType::U32,
            ValueMatcher::U64(_) => ValueType::U64,
            ValueMatcher::F32(_) => ValueType::F32,
            ValueMatcher::F64(_) => ValueType::F64,
            ValueMatcher::Bytes { value_type, .. } => *value_type,
        }
    }

    /// Bytes per value
    pub fn width(&self) -> usize {
        dispatch!(self, |_p: T| T::WIDTH, |width, _bp| *width)
    }

    pub fn needs_previous(&self) -> bool {
        dispatch!(
            self,
            |p: T| p.needs_previous(),
            |_w, bp| matches!(bp, BytesPredicate::Changed | BytesPredicate::Unchanged)
        )
    }

    /// Tests one value. `current` must hold at least `width()` bytes.
    pub fn matches(&self, current: &[u8], previous: Option<&[u8]>) -> bool {
        let width = self.width();
        if current.len() < width || previous.map_or(false, |p| p.len() < width) {
            return false;
        }
        dispatch!(
            self,
            |p: T| p.test(T::load(current), previous.map(T::load)),
            |w, bp| bp.test(&current[..*w], previous.map(|prev| &prev[..*w]))
        )
    }

    /// Scans `buf` (which starts at `base`) one value at a time.
    ///
    /// Only values starting in `[0, owned)` are reported; bytes past `owned`
    /// are overlap for values straddling the end. Offsets are pushed in
    /// ascending order and respect `align` in absolute address terms.
    pub fn scan_scalar(
        &self,
        buf: &[u8],
        base: Address,
        owned: usize,
        align: usize,
        hits: &mut Vec<usize>,
    ) {
        let width = self.width();
        let align = align.max(1);
        let mut offset = first_aligned(base, align);

        while offset < owned && offset + width <= buf.len() {
            if self.matches(&buf[offset..offset + width], None) {
                hits.push(offset);
            }
            offset += align;
        }
    }

    /// Same contract as [`scan_scalar`](Self::scan_scalar), evaluating
    /// naturally aligned numeric scans in vector-width lane batches.
    pub fn scan_simd(
        &self,
        buf: &[u8],
        base: Address,
        owned: usize,
        align: usize,
        hits: &mut Vec<usize>,
    ) {
        let natural = align.max(1) == self.width();
        if !natural || self.needs_previous() {
            return self.scan_scalar(buf, base, owned, align, hits);
        }
        dispatch!(
            self,
            |p: T| simd::scan_lanes::<T>(p, buf, first_aligned(base, T::WIDTH), owned, hits),
            |_w, _bp| self.scan_scalar(buf, base, owned, align, hits)
        )
    }

    pub fn scan(
        &self,
        buf: &[u8],
        base: Address,
        owned: usize,
        align: usize,
        use_simd: bool,
        hits: &mut Vec<usize>,
    ) {
        if use_simd {
            self.scan_simd(buf, base, owned, align, hits)
        } else {
            self.scan_scalar(buf, base, owned, align, hits)
        }
    }
}

/// Offset of the first address at or after `base` that is a multiple of `align`
pub fn first_aligned(base: Address, align: usize) -> usize {
    let rem = base.as_usize() % align.max(1);
    if rem == 0 {
        0
    } else {
        align - rem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(vt: ValueType, st: ScanType, c: Criterion) -> ValueMatcher {
        ValueMatcher::compile(vt, st, &c, None).unwrap()
    }

    #[test]
    fn test_exact_integer() {
        let m = compile(ValueType::U32, ScanType::Exact, Criterion::value(MemoryValue::U32(100)));
        assert!(m.matches(&100u32.to_le_bytes(), None));
        assert!(!m.matches(&101u32.to_le_bytes(), None));
        assert!(!m.matches(&[100, 0], None));
    }

    #[test]
    fn test_signedness_follows_tag() {
        let m = compile(ValueType::I8, ScanType::SmallerThan, Criterion::value(MemoryValue::I8(0)));
        assert!(m.matches(&[0xFF], None));

        let m = compile(ValueType::U8, ScanType::SmallerThan, Criterion::value(MemoryValue::U8(1)));
        assert!(!m.matches(&[0xFF], None));
    }

    #[test]
    fn test_between_is_inclusive() {
        let m = compile(
            ValueType::I32,
            ScanType::Between,
            Criterion::range(MemoryValue::I32(-5), MemoryValue::I32(5)),
        );
        assert!(m.matches(&(-5i32).to_le_bytes(), None));
        assert!(m.matches(&5i32.to_le_bytes(), None));
        assert!(!m.matches(&6i32.to_le_bytes(), None));

        let err = ValueMatcher::compile(
            ValueType::I32,
            ScanType::Between,
            &Criterion::range(MemoryValue::I32(5), MemoryValue::I32(-5)),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidCriterion(_)));
    }

    #[test]
    fn test_float_exact_is_bitwise() {
        let m = compile(ValueType::F32, ScanType::Exact, Criterion::value(MemoryValue::F32(0.0)));
        assert!(m.matches(&0.0f32.to_le_bytes(), None));
        assert!(!m.matches(&(-0.0f32).to_le_bytes(), None));

        let nan = compile(ValueType::F64, ScanType::Unchanged, Criterion::None);
        let bits = f64::NAN.to_le_bytes();
        assert!(nan.matches(&bits, Some(&bits)));
    }

    #[test]
    fn test_previous_value_predicates() {
        let inc = compile(ValueType::U16, ScanType::Increased, Criterion::None);
        assert!(inc.needs_previous());
        assert!(inc.matches(&5u16.to_le_bytes(), Some(&4u16.to_le_bytes())));
        assert!(!inc.matches(&4u16.to_le_bytes(), Some(&4u16.to_le_bytes())));
        assert!(!inc.matches(&5u16.to_le_bytes(), None));

        let by = compile(
            ValueType::I64,
            ScanType::DecreasedBy,
            Criterion::value(MemoryValue::I64(10)),
        );
        assert!(by.matches(&90i64.to_le_bytes(), Some(&100i64.to_le_bytes())));
        assert!(!by.matches(&91i64.to_le_bytes(), Some(&100i64.to_le_bytes())));

        let changed = compile(ValueType::F32, ScanType::Changed, Criterion::None);
        assert!(changed.matches(&1.5f32.to_le_bytes(), Some(&1.0f32.to_le_bytes())));
    }

    #[test]
    fn test_ordering_on_bytes_is_type_mismatch() {
        let err =
            ValueMatcher::compile(ValueType::Bytes, ScanType::Increased, &Criterion::None, Some(4))
                .unwrap_err();
        assert!(matches!(err, MemoryError::TypeMismatch(_)));

        let err =
            ValueMatcher::compile(ValueType::String, ScanType::Unknown, &Criterion::None, None)
                .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidCriterion(_)));
    }

    #[test]
    fn test_bytes_exact_and_changed() {
        let m = compile(
            ValueType::Bytes,
            ScanType::Exact,
            Criterion::value(MemoryValue::Bytes(vec![0xDE, 0xAD])),
        );
        assert_eq!(m.width(), 2);
        assert!(m.matches(&[0xDE, 0xAD, 0x00], None));

        let changed =
            ValueMatcher::compile(ValueType::Bytes, ScanType::Changed, &Criterion::None, Some(2))
                .unwrap();
        assert!(changed.matches(&[1, 2], Some(&[1, 3])));
        assert!(!changed.matches(&[1, 2], Some(&[1, 2])));
    }

    #[test]
    fn test_criterion_type_mismatch() {
        let err = ValueMatcher::compile(
            ValueType::U32,
            ScanType::Exact,
            &Criterion::value(MemoryValue::I32(1)),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, MemoryError::TypeMismatch(_)));
    }

    #[test]
    fn test_scan_respects_alignment_and_ownership() {
        let mut buf = vec![0u8; 32];
        buf[4..8].copy_from_slice(&7u32.to_le_bytes());
        buf[9..13].copy_from_slice(&7u32.to_le_bytes());
        buf[28..32].copy_from_slice(&7u32.to_le_bytes());

        let m = compile(ValueType::U32, ScanType::Exact, Criterion::value(MemoryValue::U32(7)));

        let mut aligned = Vec::new();
        m.scan_scalar(&buf, Address::new(0x1000), 32, 4, &mut aligned);
        assert_eq!(aligned, vec![4, 28]);

        let mut unaligned = Vec::new();
        m.scan_scalar(&buf, Address::new(0x1000), 32, 1, &mut unaligned);
        assert_eq!(unaligned, vec![4, 9, 28]);

        let mut owned = Vec::new();
        m.scan_scalar(&buf, Address::new(0x1000), 28, 4, &mut owned);
        assert_eq!(owned, vec![4]);
    }

    #[test]
    fn test_first_aligned() {
        assert_eq!(first_aligned(Address::new(0x1000), 8), 0);
        assert_eq!(first_aligned(Address::new(0x1003), 4), 1);
        assert_eq!(first_aligned(Address::new(0x1003), 1), 0);
    }
}

//! Column-wise candidate storage
//!
//! Addresses are kept sorted and unique next to a flat buffer of their last
//! observed values, `width` bytes each. Millions of candidates cost
//! `8 + width` bytes apiece instead of a map entry plus a boxed value.

use crate::core::types::{Address, MemoryValue, ScanResult, ValueType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSet {
    value_type: ValueType,
    width: usize,
    addresses: Vec<Address>,
    values: Vec<u8>,
}

impl CandidateSet {
    pub fn empty(value_type: ValueType, width: usize) -> Self {
        CandidateSet {
            value_type,
            width,
            addresses: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Builds a set from parallel columns, sorting and dropping duplicate
    /// addresses when needed. `values` holds `width` bytes per address.
    pub fn from_parts(
        value_type: ValueType,
        width: usize,
        addresses: Vec<Address>,
        values: Vec<u8>,
    ) -> Self {
        debug_assert_eq!(values.len(), addresses.len() * width);

        if addresses.windows(2).all(|pair| pair[0] < pair[1]) {
            return CandidateSet {
                value_type,
                width,
                addresses,
                values,
            };
        }

        let mut order: Vec<usize> = (0..addresses.len()).collect();
        order.sort_by_key(|&i| addresses[i]);
        order.dedup_by_key(|i| addresses[*i]);

        let mut sorted_values = Vec::with_capacity(order.len() * width);
        for &i in &order {
            sorted_values.extend_from_slice(&values[i * width..(i + 1) * width]);
        }

        CandidateSet {
            value_type,
            width,
            addresses: order.iter().map(|&i| addresses[i]).collect(),
            values: sorted_values,
        }
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// Raw bytes of the `index`th candidate's last value
    pub fn value_bytes(&self, index: usize) -> &[u8] {
        &self.values[index * self.width..(index + 1) * self.width]
    }

    /// Last observed value at `address`, if it is a candidate
    pub fn get(&self, address: Address) -> Option<&[u8]> {
        self.addresses
            .binary_search(&address)
            .ok()
            .map(|index| self.value_bytes(index))
    }

    pub fn contains(&self, address: Address) -> bool {
        self.addresses.binary_search(&address).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Address, &[u8])> + '_ {
        self.addresses.iter().copied().zip(self.values.chunks_exact(self.width.max(1)))
    }

    /// Decoded view of `limit` candidates starting at `offset`, by address
    pub fn page(&self, offset: usize, limit: usize) -> Vec<ScanResult> {
        self.iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(address, raw)| {
                MemoryValue::from_bytes(raw, self.value_type)
                    .map(|value| ScanResult::new(address, value))
            })
            .collect()
    }
}

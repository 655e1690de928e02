//! Fixed-length bitsets over `u64` blocks.
//!
//! [`BitSet`] is the membership vector behind tree bipartitions: one bit per
//! taxon, unions computed block-wise, popcount via `u64::count_ones()`.

use crate::{PhyloMcError, Result};

/// A fixed-length bitset.
///
/// Bits beyond `len` in the last block are always zero, so equality and
/// hashing depend only on the visible bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BitSet {
    blocks: Vec<u64>,
    len: usize,
}

impl BitSet {
    /// An all-zero bitset of `len` bits.
    pub fn new(len: usize) -> Self {
        Self {
            blocks: vec![0u64; (len + 63) / 64],
            len,
        }
    }

    /// Build a bitset from a slice of booleans.
    pub fn from_bools(bits: &[bool]) -> Self {
        let mut set = Self::new(bits.len());
        for (i, &b) in bits.iter().enumerate() {
            if b {
                set.blocks[i / 64] |= 1u64 << (i % 64);
            }
        }
        set
    }

    /// A bitset of `len` bits with only bit `i` set.
    ///
    /// # Errors
    ///
    /// Returns an error if `i >= len`.
    pub fn singleton(len: usize, i: usize) -> Result<Self> {
        let mut set = Self::new(len);
        set.insert(i)?;
        Ok(set)
    }

    /// Set bit `i`.
    ///
    /// # Errors
    ///
    /// Returns an error if `i >= len`.
    pub fn insert(&mut self, i: usize) -> Result<()> {
        if i >= self.len {
            return Err(PhyloMcError::InvalidInput(format!(
                "bit index {} out of range ({})",
                i, self.len
            )));
        }
        self.blocks[i / 64] |= 1u64 << (i % 64);
        Ok(())
    }

    /// Get the bit at position `i` (false when out of range).
    pub fn contains(&self, i: usize) -> bool {
        i < self.len && (self.blocks[i / 64] >> (i % 64)) & 1 == 1
    }

    /// In-place union with another bitset of the same length.
    ///
    /// # Panics
    ///
    /// Panics if the lengths differ.
    pub fn union_with(&mut self, other: &BitSet) {
        assert_eq!(self.len, other.len, "bitset length mismatch");
        for (a, b) in self.blocks.iter_mut().zip(other.blocks.iter()) {
            *a |= *b;
        }
    }

    /// The complement within `len` bits.
    pub fn complement(&self) -> Self {
        let mut out = Self {
            blocks: self.blocks.iter().map(|b| !b).collect(),
            len: self.len,
        };
        out.clear_padding();
        out
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.blocks.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the bitset has zero length.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over the indices of set bits in increasing order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&i| self.contains(i))
    }

    fn clear_padding(&mut self) {
        let rem = self.len % 64;
        if rem != 0 {
            if let Some(last) = self.blocks.last_mut() {
                *last &= (1u64 << rem) - 1;
            }
        }
    }
}

//! Account-conflict bloom filter carried in every block body.
//!
//! The filter records the writable accounts touched by a block. Downstream
//! parallel execution uses it to decide whether two batches may run side by
//! side: a negative answer is exact, a positive one may be spurious and only
//! costs an unnecessary serialization.
//!
//! ## Layout
//!
//! 32,768 bits stored as 4,096 bytes. Bit `p` lives in byte `p / 8` under the
//! mask `1 << (p % 8)`. Each key sets three bits; position `i` is the first
//! four bytes (big-endian) of `H(ascii(i) ‖ key)`, modulo 32,768.

use rkyv::{Archive, Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::hash;

/// Number of bits in the filter.
pub const BLOOM_BITS: usize = 32_768;

/// Serialized size of the filter in bytes.
pub const BLOOM_BYTES: usize = BLOOM_BITS / 8;

/// Number of salted positions per key.
pub const BLOOM_HASHES: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Bloom filter must be {BLOOM_BYTES} bytes, got {0}")]
pub struct BloomLengthError(pub usize);

/// [`AccountConflictBloom`] is an additive-only set of writable account keys.
#[derive(Archive, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct AccountConflictBloom {
    /// Always exactly [`BLOOM_BYTES`] long
    bits: Vec<u8>,
}

impl AccountConflictBloom {
    pub fn new() -> Self {
        Self {
            bits: vec![0u8; BLOOM_BYTES],
        }
    }

    /// Rebuilds a filter from its 4,096-byte serialized form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BloomLengthError> {
        if bytes.len() != BLOOM_BYTES {
            return Err(BloomLengthError(bytes.len()));
        }
        Ok(Self {
            bits: bytes.to_vec(),
        })
    }

    /// Returns the serialized form.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// The three bit positions for `key`.
    pub fn positions(key: &[u8; 32]) -> [usize; BLOOM_HASHES] {
        let mut positions = [0usize; BLOOM_HASHES];
        for (salt, position) in positions.iter_mut().enumerate() {
            let salt_ascii = [b'0' + salt as u8];
            let digest = hash::hashv(&[salt_ascii.as_slice(), key.as_slice()]);
            let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
            *position = prefix as usize % BLOOM_BITS;
        }
        positions
    }

    pub fn add(&mut self, key: &[u8; 32]) {
        for position in Self::positions(key) {
            self.bits[position / 8] |= 1 << (position % 8);
        }
    }

    /// `false` means the key was definitely never added.
    pub fn might_contain(&self, key: &[u8; 32]) -> bool {
        Self::positions(key)
            .into_iter()
            .all(|position| self.bits[position / 8] & (1 << (position % 8)) != 0)
    }

    /// Adds every key of `other` to this filter.
    pub fn merge(&mut self, other: &Self) {
        for (mine, theirs) in self.bits.iter_mut().zip(other.bits.iter()) {
            *mine |= theirs;
        }
    }

    /// Whether the two filters share at least one set bit.
    ///
    /// `false` proves the two key sets are disjoint.
    pub fn may_conflict(&self, other: &Self) -> bool {
        self.bits
            .iter()
            .zip(other.bits.iter())
            .any(|(a, b)| a & b != 0)
    }

    pub fn count_ones(&self) -> u32 {
        self.bits.iter().map(|byte| byte.count_ones()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|byte| *byte == 0)
    }
}

impl Default for AccountConflictBloom {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AccountConflictBloom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConflictBloom")
            .field("bits_set", &self.count_ones())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: u64) -> [u8; 32] {
        hash::hash(&seed.to_le_bytes())
    }

    #[test]
    fn added_keys_are_always_found() {
        let mut bloom = AccountConflictBloom::new();
        let keys: Vec<_> = (0..2_000).map(key).collect();
        for k in &keys {
            bloom.add(k);
        }
        assert!(keys.iter().all(|k| bloom.might_contain(k)));
    }

    #[test]
    fn empty_filter_contains_nothing() {
        let bloom = AccountConflictBloom::new();
        assert!(bloom.is_empty());
        assert!(!bloom.might_contain(&key(1)));
        assert_eq!(bloom.as_bytes().len(), BLOOM_BYTES);
    }

    #[test]
    fn positions_follow_salted_prefix_rule() {
        let k = key(42);
        let digest = hash::hashv(&[b"1".as_slice(), k.as_slice()]);
        let expected = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
            % BLOOM_BITS;
        assert_eq!(AccountConflictBloom::positions(&k)[1], expected);
    }

    #[test]
    fn sparse_filter_has_low_false_positive_rate() {
        let mut bloom = AccountConflictBloom::new();
        for seed in 0..100 {
            bloom.add(&key(seed));
        }
        let false_positives = (10_000..20_000)
            .filter(|seed| bloom.might_contain(&key(*seed)))
            .count();
        assert!(false_positives < 50, "false positives: {false_positives}");
    }

    #[test]
    fn byte_round_trip_preserves_membership() {
        let mut bloom = AccountConflictBloom::new();
        bloom.add(&key(7));
        let restored = AccountConflictBloom::from_bytes(bloom.as_bytes()).unwrap();
        assert!(restored.might_contain(&key(7)));
        assert_eq!(restored, bloom);
    }

    #[test]
    fn from_bytes_rejects_wrong_length() {
        assert_eq!(
            AccountConflictBloom::from_bytes(&[0u8; 10]),
            Err(BloomLengthError(10))
        );
    }

    #[test]
    fn merge_and_conflict_detection() {
        let mut a = AccountConflictBloom::new();
        let mut b = AccountConflictBloom::new();
        a.add(&key(1));
        b.add(&key(2));
        a.merge(&b);
        assert!(a.might_contain(&key(1)) && a.might_contain(&key(2)));

        let mut c = AccountConflictBloom::new();
        c.add(&key(2));
        assert!(a.may_conflict(&c));
        assert!(!AccountConflictBloom::new().may_conflict(&c));
        assert!(c.count_ones() <= BLOOM_HASHES as u32);
    }
}

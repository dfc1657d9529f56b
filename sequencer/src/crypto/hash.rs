//! Hash primitives shared by the chain, the pool and the assembler.
//!
//! Every 32-byte digest in this crate is BLAKE3.

/// A 32-byte BLAKE3 digest.
pub type Hash = [u8; blake3::OUT_LEN];

/// The all-zero digest, used as the event digest of empty events and as
/// the parent hash of the genesis block.
pub const ZERO_HASH: Hash = [0u8; blake3::OUT_LEN];

/// Hashes a single byte slice.
#[inline]
pub fn hash(data: &[u8]) -> Hash {
    blake3::hash(data).into()
}

/// Hashes the concatenation of several byte slices without allocating.
pub fn hashv(parts: &[&[u8]]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Short hex prefix of a digest, for log lines.
#[inline]
pub fn short_hex(hash: &Hash) -> String {
    hex::encode(&hash[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashv_matches_concatenation() {
        let joined = [b"abc".as_slice(), b"def".as_slice()].concat();
        assert_eq!(hashv(&[b"abc".as_slice(), b"def".as_slice()]), hash(&joined));
    }

    #[test]
    fn short_hex_is_sixteen_chars() {
        assert_eq!(short_hex(&ZERO_HASH), "0000000000000000");
    }
}

use crate::crypto::hash::Hash;

/// Producer-side signer for chain records.
///
/// The signature scheme is owned by the node's key management; the chain
/// engine only asks for a signature over each record's `current_hash`.
pub trait RecordSigner: Send + Sync {
    /// Signs the given chain hash.
    fn sign(&self, current_hash: &Hash) -> Vec<u8>;
}

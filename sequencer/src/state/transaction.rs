use rkyv::{Archive, Deserialize, Serialize, rancor, util::AlignedVec, with::Skip};

use crate::crypto::hash::{self, Hash, ZERO_HASH};

/// Length in bytes of a transaction signature.
pub const SIGNATURE_LEN: usize = 64;

/// A detached transaction signature.
pub type Signature = [u8; SIGNATURE_LEN];

/// An account referenced by a transaction, together with its access mode.
#[derive(Archive, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountMeta {
    /// The account's public key
    pub pubkey: [u8; 32],
    /// Whether the transaction carries this account's signature
    pub is_signer: bool,
    /// Whether the transaction may write to this account
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn new(pubkey: [u8; 32], is_signer: bool, is_writable: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable,
        }
    }
}

/// A single program invocation inside a transaction.
#[derive(Archive, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    /// The program to invoke
    pub program_id: [u8; 32],
    /// Indices into the transaction's account list
    pub account_indices: Vec<u8>,
    /// Opaque program input
    pub data: Vec<u8>,
}

/// Admission bits of a transaction inside this node.
///
/// Set once by the pool before the transaction is shared. Later lifecycle
/// steps are tracked by the node's status cache, not here. The bits are
/// local bookkeeping and are not part of the canonical
/// encoding, so they never influence the transaction hash.
#[derive(Archive, Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxStatus(pub u32);

impl TxStatus {
    pub const VALIDATED: u32 = 1 << 0;
    pub const POOLED: u32 = 1 << 1;

    #[inline]
    pub fn contains(&self, bits: u32) -> bool {
        self.0 & bits == bits
    }

    #[inline]
    pub fn insert(&mut self, bits: u32) {
        self.0 |= bits;
    }
}

/// [`Transaction`] is the unit of work ordered by the chain and packed into blocks.
///
/// The transaction id is derived from the first signature, so two transactions
/// carrying the same first signature share an id. The fee payer is the first
/// account that is both a signer and writable.
#[derive(Archive, Deserialize, Serialize, Clone, Debug)]
pub struct Transaction {
    /// Signatures over the transaction message, fee payer first
    pub signatures: Vec<Signature>,
    /// Accounts touched by the instructions
    pub accounts: Vec<AccountMeta>,
    /// Program invocations, executed in order
    pub instructions: Vec<Instruction>,
    /// Recent block hash, bounds the validity window
    pub recent_blockhash: Hash,
    /// The fee offered. Used to prioritize transactions in the pool.
    pub fee: u64,
    /// The transaction id, derived from the first signature
    pub id: Hash,
    /// Local lifecycle bits
    #[rkyv(with = Skip)]
    pub status: TxStatus,
}

impl Transaction {
    pub fn new(
        signatures: Vec<Signature>,
        accounts: Vec<AccountMeta>,
        instructions: Vec<Instruction>,
        recent_blockhash: Hash,
        fee: u64,
    ) -> Self {
        let id = Self::derive_id(&signatures);
        Self {
            signatures,
            accounts,
            instructions,
            recent_blockhash,
            fee,
            id,
            status: TxStatus::default(),
        }
    }

    /// Computes the id a transaction with these signatures must carry.
    ///
    /// Unsigned transactions get the zero id; they never pass validation.
    pub fn derive_id(signatures: &[Signature]) -> Hash {
        signatures
            .first()
            .map(|sig| hash::hash(sig))
            .unwrap_or(ZERO_HASH)
    }

    /// Returns the fee payer: the first account that signs and is writable.
    pub fn fee_payer(&self) -> Option<&AccountMeta> {
        self.accounts
            .iter()
            .find(|meta| meta.is_signer && meta.is_writable)
    }

    /// Iterates over the keys of all writable accounts.
    pub fn writable_keys(&self) -> impl Iterator<Item = &[u8; 32]> + '_ {
        self.accounts
            .iter()
            .filter(|meta| meta.is_writable)
            .map(|meta| &meta.pubkey)
    }

    /// Returns the canonical encoding of the transaction.
    ///
    /// This is the byte string the chain digests when the transaction is
    /// timestamped, and whose length counts towards the block size.
    pub fn canonical_bytes(&self) -> Result<AlignedVec, rancor::Error> {
        rkyv::to_bytes::<rancor::Error>(self)
    }

    /// Hash of the canonical encoding.
    pub fn content_hash(&self) -> Result<Hash, rancor::Error> {
        Ok(hash::hash(&self.canonical_bytes()?))
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.fee == other.fee
            && self.signatures == other.signatures
            && self.accounts == other.accounts
            && self.instructions == other.instructions
            && self.recent_blockhash == other.recent_blockhash
    }
}

impl Eq for Transaction {}

impl AsRef<Transaction> for Transaction {
    fn as_ref(&self) -> &Transaction {
        self
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;

    /// Builds a well-formed transfer-like transaction with a unique id.
    pub(crate) fn sample_tx(seed: u64, fee: u64) -> Transaction {
        let mut signature = [0u8; SIGNATURE_LEN];
        signature[..8].copy_from_slice(&seed.to_le_bytes());
        let mut payer = [1u8; 32];
        payer[..8].copy_from_slice(&seed.to_le_bytes());
        let mut recipient = [2u8; 32];
        recipient[..8].copy_from_slice(&seed.to_le_bytes());
        Transaction::new(
            vec![signature],
            vec![
                AccountMeta::new(payer, true, true),
                AccountMeta::new(recipient, false, true),
                AccountMeta::new([9u8; 32], false, false),
            ],
            vec![Instruction {
                program_id: [7u8; 32],
                account_indices: vec![0, 1],
                data: seed.to_le_bytes().to_vec(),
            }],
            [3u8; 32],
            fee,
        )
    }
}

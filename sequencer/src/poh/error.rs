use thiserror::Error;

/// Errors raised while extending the chain.
///
/// Fatal variants halt the engine: once one is returned, every later append
/// fails with [`PohError::Halted`] until the node restarts from a checkpoint.
#[derive(Debug, Error)]
pub enum PohError {
    /// The event could not be encoded for hashing
    #[error("Failed to encode event for hashing: {0}")]
    Encoding(String),

    /// Too many consecutive empty events since the last non-empty one
    #[error("Empty event counter exceeded ceiling {ceiling} at height {height}")]
    EmptyCounterOverflow { ceiling: u64, height: u64 },

    /// A previous append panicked while holding the chain writer
    #[error("Chain writer poisoned by a panicked append")]
    WriterPoisoned,

    /// A due checkpoint could not be persisted; the chain did not advance
    #[error("Failed to persist checkpoint at height {height} after {attempts} attempts: {source}")]
    Persist {
        height: u64,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The checkpoint store could not be read during recovery
    #[error("Failed to load checkpoint: {0}")]
    CheckpointLoad(#[source] anyhow::Error),

    /// The last persisted checkpoint does not verify
    #[error("Checkpoint at height {height} is corrupt: {source}")]
    CorruptCheckpoint {
        height: u64,
        #[source]
        source: VerifyError,
    },

    /// The engine was halted by an earlier fatal error
    #[error("Chain halted by an earlier fatal error")]
    Halted,

    /// The engine configuration was rejected at construction
    #[error("Invalid chain configuration: {0}")]
    InvalidConfig(String),
}

impl PohError {
    /// Whether the error leaves the engine halted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PohError::Encoding(_)
                | PohError::EmptyCounterOverflow { .. }
                | PohError::WriterPoisoned
                | PohError::Halted
        )
    }

    /// Whether retrying the same append later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PohError::Persist { .. })
    }
}

/// The first inconsistency found while replaying a sequence of records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Record {position}: recomputed hash does not match stored hash")]
    HashMismatch { position: usize },

    #[error("Record {position}: previous hash does not link to its predecessor")]
    BrokenLink { position: usize },

    #[error("Record {position}: expected height {expected}, found {found}")]
    HeightGap {
        position: usize,
        expected: u64,
        found: u64,
    },

    #[error("Record {position}: empty event counter {found} is inconsistent with its predecessor")]
    CounterMismatch { position: usize, found: u64 },

    #[error("Record {position}: empty event carries a non-zero digest")]
    NonEmptyDigest { position: usize },
}

impl VerifyError {
    /// Index of the offending record in the verified slice.
    pub fn position(&self) -> usize {
        match self {
            VerifyError::HashMismatch { position }
            | VerifyError::BrokenLink { position }
            | VerifyError::HeightGap { position, .. }
            | VerifyError::CounterMismatch { position, .. }
            | VerifyError::NonEmptyDigest { position } => *position,
        }
    }
}

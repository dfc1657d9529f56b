use crate::poh::record::ChainRecord;

/// Durable home for chain checkpoints.
///
/// The engine persists a record every `checkpoint_interval` heights and on
/// every block event, and reads the latest one back on recovery. Implementations must make a persisted
/// record durable before returning `Ok`.
pub trait ChainCheckpointStore: Send + Sync {
    /// Persists `record` as the latest checkpoint.
    fn persist_checkpoint(&self, record: &ChainRecord) -> anyhow::Result<()>;

    /// Returns the checkpoint with the greatest height, if any.
    fn latest_checkpoint(&self) -> anyhow::Result<Option<ChainRecord>>;
}

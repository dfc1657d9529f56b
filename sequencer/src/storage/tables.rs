use redb::TableDefinition;

/// Chain height → archived `ChainRecord`.
pub const CHECKPOINTS: TableDefinition<u64, &[u8]> = TableDefinition::new("checkpoints");
/// Block hash → archived `Block`.
pub const BLOCKS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("blocks");
/// Slot → block hash of the block committed for that slot.
pub const SLOT_INDEX: TableDefinition<u64, &[u8]> = TableDefinition::new("slot_index");

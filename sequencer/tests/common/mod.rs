//! Shared helpers for the sequencer integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use sequencer::{
    config::PohConfig,
    crypto::ZERO_HASH,
    logging,
    poh::PohEngine,
    state::transaction::{AccountMeta, Instruction, SIGNATURE_LEN, Transaction},
};
use slog::Logger;

/// Logger for integration tests; silent unless `RUST_LOG` is set.
pub fn test_logger() -> Logger {
    if std::env::var_os("RUST_LOG").is_some() {
        logging::create_test_logger()
    } else {
        logging::create_quiet_logger()
    }
}

/// A well-formed transfer whose id is unique per `seed`.
pub fn transfer(seed: u64, fee: u64) -> Transaction {
    let mut signature = [0u8; SIGNATURE_LEN];
    signature[..8].copy_from_slice(&seed.to_le_bytes());
    signature[8] = 0xAB;
    let mut payer = [4u8; 32];
    payer[..8].copy_from_slice(&seed.to_le_bytes());
    let mut recipient = [5u8; 32];
    recipient[..8].copy_from_slice(&seed.to_le_bytes());

    Transaction::new(
        vec![signature],
        vec![
            AccountMeta::new(payer, true, true),
            AccountMeta::new(recipient, false, true),
        ],
        vec![Instruction {
            program_id: [6u8; 32],
            account_indices: vec![0, 1],
            data: fee.to_le_bytes().to_vec(),
        }],
        [8u8; 32],
        fee,
    )
}

/// Engine from the zero genesis hash with checkpoints and the ticker disabled.
pub fn memory_engine() -> Arc<PohEngine> {
    let config = PohConfig {
        checkpoint_interval: 0,
        tick_interval_ms: 0,
        ..PohConfig::default()
    };
    Arc::new(PohEngine::new(config, ZERO_HASH, test_logger()).unwrap())
}

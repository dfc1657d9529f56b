//! Structural transaction checks.
//!
//! These checks need nothing but the transaction itself. Balance, nonce and
//! signature verification belong to the execution layer and are not done here.

use thiserror::Error;

use crate::state::transaction::Transaction;

/// Reasons a transaction is structurally malformed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TxValidationError {
    #[error("Transaction carries no signatures")]
    MissingSignatures,

    #[error("Transaction references no accounts")]
    MissingAccounts,

    #[error("Transaction has no writable signer to pay the fee")]
    MissingFeePayer,

    #[error("Transaction id does not match its first signature")]
    IdMismatch,

    #[error("Instruction {instruction} references account index {index}, only {accounts} accounts")]
    AccountIndexOutOfRange {
        instruction: usize,
        index: u8,
        accounts: usize,
    },
}

/// Checks that `tx` is well formed.
///
/// Cheap and read-only; safe to call from any producer thread.
pub fn validate_transaction(tx: &Transaction) -> Result<(), TxValidationError> {
    if tx.signatures.is_empty() {
        return Err(TxValidationError::MissingSignatures);
    }
    if tx.accounts.is_empty() {
        return Err(TxValidationError::MissingAccounts);
    }
    if tx.fee_payer().is_none() {
        return Err(TxValidationError::MissingFeePayer);
    }
    if tx.id != Transaction::derive_id(&tx.signatures) {
        return Err(TxValidationError::IdMismatch);
    }
    for (instruction, ix) in tx.instructions.iter().enumerate() {
        if let Some(&index) = ix
            .account_indices
            .iter()
            .find(|&&index| index as usize >= tx.accounts.len())
        {
            return Err(TxValidationError::AccountIndexOutOfRange {
                instruction,
                index,
                accounts: tx.accounts.len(),
            });
        }
    }
    Ok(())
}

//! Proof-of-History hash chain.
//!
//! Every event the sequencer observes, whether a transaction, a committed
//! block, or an idle heartbeat, is folded into a single BLAKE3 hash chain:
//!
//! ```text
//! current_hash = H(previous_hash ‖ event_digest ‖ empty_event_counter_be)
//! ```
//!
//! The chain proves relative ordering: a record cannot be produced without
//! every record before it. Consecutive empty events increment the counter so
//! idle time is itself part of the proof.
//!
//! - [`PohEngine`] is the single writer; readers use its published head
//! - [`PohTicker`] appends heartbeats on a fixed interval
//! - [`verify_records`] replays a stored run of records

pub mod checkpoint;
pub mod engine;
pub mod error;
pub mod record;
pub mod ticker;

pub use checkpoint::ChainCheckpointStore;
pub use engine::{ChainHead, PohEngine};
pub use error::{PohError, VerifyError};
pub use record::{ChainRecord, EventKind, next_hash, verify_records};
pub use ticker::PohTicker;

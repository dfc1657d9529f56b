//! Persistent storage for chain checkpoints and committed blocks.
//!
//! Backed by redb; values are rkyv archives validated on read.

mod conversions;
mod store;
mod tables;

pub use store::ChainStore;

pub mod hash;
pub mod identity;
pub mod signer;

pub use hash::{Hash, ZERO_HASH};

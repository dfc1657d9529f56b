pub mod block;
pub mod bloom;
pub mod transaction;

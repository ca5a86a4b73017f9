pub mod accept;
pub mod block;
pub mod error;
pub mod message;
pub mod miner;
pub mod net;
pub mod server;
pub mod state;
pub mod transaction;
pub mod validate;

#[cfg(test)]
pub mod testing;

use lazy_static::lazy_static;
use num_bigint::BigUint;
use num_traits::One;

/// Well-known port every node listens on.
pub const PORT: u16 = 10000;

/// Maximum number of blocks served per sync reply.
pub const GET_BLOCKS_CHUNK: usize = 10;

/// Amount minted by each coinbase.
pub const BLOCK_SUBSIDY: u64 = 50;

/// Test-grade difficulty: roughly one in 2^2 hashes wins.
pub const DIFFICULTY_BITS: u32 = 2;

lazy_static! {
    /// A block id, read as a 256-bit big-endian integer, must be strictly
    /// below this target to prove its work.
    pub static ref POW_TARGET: BigUint = BigUint::one() << (256 - DIFFICULTY_BITS as usize);
}

use std::fmt;

use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

use crate::wallet::{sha256, Hash256};

use super::transaction::Tx;
use super::DIFFICULTY_BITS;

#[derive(Serialize, Deserialize, Clone)]
pub struct Block {
    /// The first transaction is the coinbase.
    pub txns: Vec<Tx>,
    /// None only for genesis.
    pub prev_id: Option<Hash256>,
    pub nonce: u64,
}

impl Block {
    /// Deterministic serialization of all three fields; the preimage of the
    /// block id.
    pub fn header(&self) -> Vec<u8> {
        bincode::serialize(self).expect("serialize block header")
    }

    pub fn id(&self) -> Hash256 {
        sha256(&self.header())
    }

    /// The block id read as a 256-bit big-endian integer, for comparison
    /// against the proof-of-work target.
    pub fn proof(&self) -> BigUint {
        BigUint::from_bytes_be(&self.id())
    }

    /// Difficulty bits. A global constant for now, but exposed per block so
    /// [total_work] keeps its shape when retargeting shows up.
    pub fn bits(&self) -> u32 {
        DIFFICULTY_BITS
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("id", &hex::encode(self.id()))
            .field("prev_id", &self.prev_id.map(hex::encode))
            .field("txns", &self.txns.len())
            .field("nonce", &self.nonce)
            .finish()
    }
}

/// Total work of a chain segment: Σ 2^bits over its blocks. With constant
/// bits this weighs every block equally, giving longest-chain fork choice.
pub fn total_work(blocks: &[Block]) -> BigUint {
    blocks.iter().fold(BigUint::zero(), |acc, block| {
        acc + (BigUint::one() << block.bits())
    })
}

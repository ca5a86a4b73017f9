//! Shared helpers for the state-machine tests. Difficulty is test-grade, so
//! helpers mine for real.

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;

use ed25519_dalek::Keypair;

use crate::wallet::{self, Hash256};

use super::block::Block;
use super::miner::{mine_block, mine_genesis_block};
use super::state::Node;
use super::transaction::{prepare_coinbase, prepare_simple_tx, random_tx_id, Tx};
use super::{POW_TARGET, PORT};

pub fn keypair(name: &str) -> Keypair {
    wallet::lookup_keypair(name).unwrap()
}

pub fn test_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], PORT))
}

/// A node whose chain holds only the deterministic genesis paying alice.
pub fn node_with_genesis() -> Node {
    let mut node = Node::new(test_address());
    mine_genesis_block(&mut node, &keypair("alice").public);
    node
}

/// Mine the given transactions on top of `prev_id`.
pub fn mined_block(txns: Vec<Tx>, prev_id: Hash256) -> Block {
    let unmined = Block {
        txns,
        prev_id: Some(prev_id),
        nonce: 0,
    };
    mine_block(unmined, &AtomicBool::new(false)).unwrap()
}

/// A coinbase-only block extending `prev_id`, paying the named miner. The
/// random coinbase id keeps sibling blocks distinct.
pub fn mined_coinbase_block(miner: &str, prev_id: Hash256) -> Block {
    mined_block(
        vec![prepare_coinbase(&keypair(miner).public, random_tx_id())],
        prev_id,
    )
}

/// A block positioned on a nonce that does NOT satisfy the target, for
/// exercising proof-of-work rejection and the interrupt path.
pub fn unmined_block(txns: Vec<Tx>, prev_id: Hash256) -> Block {
    let mut block = Block {
        txns,
        prev_id: Some(prev_id),
        nonce: 0,
    };
    while block.proof() < *POW_TARGET {
        block.nonce += 1;
    }
    block
}

/// A signed payment built against the node's live UTXO set.
pub fn payment(node: &Node, from: &str, to: &str, amount: u64) -> Tx {
    let sender = keypair(from);
    let utxos = node.fetch_utxos(&sender.public);
    prepare_simple_tx(&utxos, &sender, &keypair(to).public, amount).unwrap()
}

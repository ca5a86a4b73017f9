use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ed25519_dalek::PublicKey;
use rand::Rng;
use tracing::info;

use super::block::Block;
use super::server::submit_block;
use super::state::Node;
use super::transaction::{prepare_coinbase, random_tx_id, GENESIS_TX_ID};
use super::POW_TARGET;

/// Grind nonces until the block proves its work. Polls the shared interrupt
/// on every iteration; if it fires, the flag is cleared and the candidate is
/// abandoned.
pub fn mine_block(mut block: Block, interrupt: &AtomicBool) -> Option<Block> {
    while block.proof() >= *POW_TARGET {
        if interrupt.swap(false, Ordering::SeqCst) {
            info!("mining interrupted");
            return None;
        }
        block.nonce = block.nonce.wrapping_add(1);
    }
    Some(block)
}

/// The miner thread. Snapshots the tip and the mempool, grinds a candidate
/// outside the lock, and re-enters the acceptor only on success. A stale
/// snapshot wastes hashes on the loser of a race but never corrupts state.
pub fn mine_forever(node: Arc<Mutex<Node>>, interrupt: Arc<AtomicBool>, miner: PublicKey) {
    info!("starting miner");
    loop {
        let (prev_id, mempool) = {
            let guard = node.lock().unwrap();
            (guard.tip().id(), guard.mempool.clone())
        };

        let mut txns = vec![prepare_coinbase(&miner, random_tx_id())];
        txns.extend(mempool);
        let candidate = Block {
            txns,
            prev_id: Some(prev_id),
            nonce: rand::thread_rng().gen(),
        };

        if let Some(mined) = mine_block(candidate, &interrupt) {
            info!("mined a block");
            if let Err(err) = submit_block(&node, mined) {
                // Someone else's block beat ours to the tip.
                info!("own block was not accepted: {err}");
            }
        }
    }
}

/// Mine the deterministic genesis block: fixed coinbase id, fixed payee,
/// nonce search from zero. Every node computes the identical block.
pub fn mine_genesis_block(node: &mut Node, payee: &PublicKey) -> Block {
    let coinbase = prepare_coinbase(payee, GENESIS_TX_ID);
    let unmined = Block {
        txns: vec![coinbase.clone()],
        prev_id: None,
        nonce: 0,
    };
    let mined = mine_block(unmined, &AtomicBool::new(false))
        .expect("uninterrupted mining always returns a block");

    node.blocks.push(mined.clone());
    node.connect_tx(&coinbase);
    mined
}

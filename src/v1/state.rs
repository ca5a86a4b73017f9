use std::cmp;
use std::collections::HashMap;
use std::net::SocketAddr;

use ed25519_dalek::PublicKey;
use tracing::debug;

use crate::wallet::Hash256;

use super::block::Block;
use super::transaction::{Outpoint, Tx, TxOut};
use super::GET_BLOCKS_CHUNK;

/// All shared node state. Lives behind a single process-wide mutex; every
/// handler that touches the chain, the UTXO set, the mempool, or the peer
/// lists does so under that lock.
pub struct Node {
    /// The main chain. `blocks[0]` is genesis, the last element is the tip.
    pub blocks: Vec<Block>,
    /// Side chains. Each branch roots at a block somewhere off the tip and
    /// stays around as reorg material.
    pub branches: Vec<Vec<Block>>,
    /// Unspent outputs of the current main chain.
    pub utxo_set: HashMap<Outpoint, TxOut>,
    /// Validated transactions waiting for a block.
    pub mempool: Vec<Tx>,
    pub peers: Vec<SocketAddr>,
    pub pending_peers: Vec<SocketAddr>,
    /// Our own gossip address, so we never try to peer with ourselves.
    pub address: SocketAddr,
}

impl Node {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            blocks: vec![],
            branches: vec![],
            utxo_set: HashMap::new(),
            mempool: vec![],
            peers: vec![],
            pending_peers: vec![],
            address,
        }
    }

    /// The last block of the main chain. The chain is never empty once
    /// genesis has been mined.
    pub fn tip(&self) -> &Block {
        self.blocks.last().expect("chain has no genesis")
    }

    pub fn contains_block(&self, id: &Hash256) -> bool {
        self.blocks.iter().any(|block| block.id() == *id) || self.find_in_branch(id).is_some()
    }

    /// Locate a block id among the side branches. Returns the branch index
    /// and the height within that branch.
    pub fn find_in_branch(&self, id: &Hash256) -> Option<(usize, usize)> {
        for (branch_index, branch) in self.branches.iter().enumerate() {
            for (height, block) in branch.iter().enumerate() {
                if block.id() == *id {
                    return Some((branch_index, height));
                }
            }
        }
        None
    }

    /// Ids of our most recent blocks, for a sync request.
    pub fn recent_block_ids(&self) -> Vec<Hash256> {
        let start = self.blocks.len().saturating_sub(GET_BLOCKS_CHUNK);
        self.blocks[start..].iter().map(Block::id).collect()
    }

    /// Serve a peer's sync request: starting from the tip, find our most
    /// recent block the peer does not know but whose parent it does, and
    /// hand back that block plus up to a chunk of successors.
    pub fn blocks_for_sync(&self, peer_ids: &[Hash256]) -> Option<Vec<Block>> {
        for (height, block) in self.blocks.iter().enumerate().rev() {
            let known = peer_ids.contains(&block.id());
            let parent_known = block
                .prev_id
                .map_or(false, |prev| peer_ids.contains(&prev));
            if !known && parent_known {
                let end = cmp::min(height + GET_BLOCKS_CHUNK, self.blocks.len());
                return Some(self.blocks[height..end].to_vec());
            }
        }
        None
    }

    pub fn fetch_utxos(&self, key: &PublicKey) -> Vec<TxOut> {
        self.utxo_set
            .values()
            .filter(|out| out.public_key == *key)
            .cloned()
            .collect()
    }

    pub fn fetch_balance(&self, key: &PublicKey) -> u64 {
        self.fetch_utxos(key).iter().map(|out| out.amount).sum()
    }

    /// Apply a transaction to the UTXO set and drop it from the mempool.
    /// Callers connect a block's transactions in block order, and only after
    /// validation, so the spent outputs are guaranteed present.
    pub fn connect_tx(&mut self, tx: &Tx) {
        if !tx.is_coinbase() {
            for outpoint in tx.spent_outpoints() {
                self.utxo_set
                    .remove(outpoint)
                    .expect("connected input misses its UTXO");
            }
        }

        for out in &tx.outputs {
            self.utxo_set.insert(out.outpoint, out.clone());
        }

        if let Some(pos) = self.mempool.iter().position(|pooled| pooled == tx) {
            self.mempool.remove(pos);
        }
    }

    /// Undo a transaction: restore what it spent, drop what it created, and
    /// return it to the mempool so a future block can pick it up again.
    /// Callers disconnect a block's transactions in reverse order.
    pub fn disconnect_tx(&mut self, tx: &Tx) {
        if !tx.is_coinbase() {
            for outpoint in tx.spent_outpoints() {
                let out = self
                    .original_tx_out(outpoint)
                    .expect("disconnected input's source left the chain");
                self.utxo_set.insert(out.outpoint, out);
            }
        }

        for out in &tx.outputs {
            self.utxo_set.remove(&out.outpoint);
        }

        if !tx.is_coinbase() && !self.mempool.contains(tx) {
            debug!("returning {:?} to mempool", tx);
            self.mempool.push(tx.clone());
        }
    }

    /// Recover a spent output by scanning the main chain for the transaction
    /// that produced it. Reorgs are rare and chains short, so the linear
    /// scan holds up.
    fn original_tx_out(&self, outpoint: &Outpoint) -> Option<TxOut> {
        for block in &self.blocks {
            for tx in &block.txns {
                if tx.id == outpoint.tx_id {
                    return tx.outputs.get(outpoint.index as usize).cloned();
                }
            }
        }
        None
    }

    /// Handshake step one: an unknown caller asked to connect.
    pub fn note_connect(&mut self, peer: SocketAddr) -> bool {
        if self.pending_peers.contains(&peer) || self.peers.contains(&peer) {
            return false;
        }
        self.pending_peers.push(peer);
        true
    }

    /// Handshake step two: a node we reached out to answered, so promote it
    /// from pending to peer.
    pub fn note_connect_response(&mut self, peer: SocketAddr) -> bool {
        if !self.pending_peers.contains(&peer) || self.peers.contains(&peer) {
            return false;
        }
        self.pending_peers.retain(|pending| *pending != peer);
        self.peers.push(peer);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v1::accept::{accept_block, accept_tx};
    use crate::v1::testing;
    use crate::v1::BLOCK_SUBSIDY;

    #[test]
    fn connect_then_disconnect_is_an_inverse() {
        let mut node = testing::node_with_genesis();
        let before = node.utxo_set.clone();
        let tx = testing::payment(&node, "alice", "bob", 10);

        node.connect_tx(&tx);
        assert_eq!(node.utxo_set.len(), 2);
        assert_eq!(node.fetch_balance(&testing::keypair("bob").public), 10);
        assert_eq!(node.fetch_balance(&testing::keypair("alice").public), 40);

        node.disconnect_tx(&tx);
        assert_eq!(node.utxo_set, before);
        // Disconnecting hands the transaction back to the mempool.
        assert!(node.mempool.contains(&tx));
    }

    #[test]
    fn connecting_a_mempool_tx_removes_it() {
        let mut node = testing::node_with_genesis();
        let tx = testing::payment(&node, "alice", "bob", 10);

        accept_tx(&mut node, tx.clone()).unwrap();
        assert_eq!(node.mempool.len(), 1);

        node.connect_tx(&tx);
        assert!(node.mempool.is_empty());
    }

    #[test]
    fn balances_are_per_key() {
        let node = testing::node_with_genesis();
        let alice = testing::keypair("alice").public;
        let bob = testing::keypair("bob").public;

        assert_eq!(node.fetch_balance(&alice), BLOCK_SUBSIDY);
        assert_eq!(node.fetch_balance(&bob), 0);
        assert_eq!(node.fetch_utxos(&alice).len(), 1);
        assert!(node.fetch_utxos(&bob).is_empty());
    }

    #[test]
    fn sync_serves_chunks_from_the_fork_point() {
        let mut node = testing::node_with_genesis();
        let genesis_id = node.tip().id();
        for _ in 0..15 {
            let block = testing::mined_coinbase_block("node0", node.tip().id());
            accept_block(&mut node, block).unwrap();
        }

        // A peer that only knows genesis gets the first chunk above it.
        let chunk = node.blocks_for_sync(&[genesis_id]).unwrap();
        assert_eq!(chunk.len(), GET_BLOCKS_CHUNK);
        assert_eq!(chunk[0].prev_id, Some(genesis_id));
        assert_eq!(&chunk[..], &node.blocks[1..11]);

        // Once the peer has those, the remainder is less than a full chunk.
        let peer_ids: Vec<Hash256> = node.blocks[..11].iter().map(Block::id).collect();
        let rest = node.blocks_for_sync(&peer_ids).unwrap();
        assert_eq!(rest.len(), 5);
        assert_eq!(&rest[..], &node.blocks[11..]);

        // A peer that already has everything cannot be served.
        let all_ids: Vec<Hash256> = node.blocks.iter().map(Block::id).collect();
        assert!(node.blocks_for_sync(&all_ids).is_none());
    }

    #[test]
    fn recent_block_ids_are_capped() {
        let mut node = testing::node_with_genesis();
        for _ in 0..15 {
            let block = testing::mined_coinbase_block("node0", node.tip().id());
            accept_block(&mut node, block).unwrap();
        }

        let ids = node.recent_block_ids();
        assert_eq!(ids.len(), GET_BLOCKS_CHUNK);
        assert_eq!(*ids.last().unwrap(), node.tip().id());
    }

    #[test]
    fn handshake_promotion_is_idempotent() {
        let mut node = testing::node_with_genesis();
        let peer: SocketAddr = "10.0.0.7:10000".parse().unwrap();

        assert!(node.note_connect(peer));
        assert!(!node.note_connect(peer));
        assert_eq!(node.pending_peers, vec![peer]);

        assert!(node.note_connect_response(peer));
        assert!(node.pending_peers.is_empty());
        assert_eq!(node.peers, vec![peer]);

        // A second response must not duplicate the peer.
        assert!(!node.note_connect_response(peer));
        assert_eq!(node.peers, vec![peer]);
    }
}

use std::net::SocketAddr;

use ed25519_dalek::PublicKey;
use serde::{Deserialize, Serialize};

use crate::wallet::Hash256;

use super::block::Block;
use super::transaction::{Tx, TxOut};

/// Everything that crosses the wire. Each frame carries exactly one of
/// these; the enum tag is the command, the payload rides in the variant.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Message {
    /// Handshake opener from a prospective peer.
    Connect,
    /// Handshake acknowledgement; promotes the sender from pending to peer.
    ConnectResponse,
    /// Ask a peer for its peer list.
    Peers,
    PeersResponse(Vec<SocketAddr>),
    Ping,
    Pong,
    /// Tip sync: the sender's most recent block ids, tip-ward.
    Sync(Vec<Hash256>),
    /// Blocks for the acceptor, either gossip or a sync reply.
    Blocks(Vec<Block>),
    /// A transaction for the mempool.
    Tx(Tx),
    /// Query the balance locked to a key.
    Balance(PublicKey),
    BalanceResponse(u64),
    /// Query the spendable outputs locked to a key.
    Utxos(PublicKey),
    UtxosResponse(Vec<TxOut>),
}

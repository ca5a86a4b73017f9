use std::error::Error;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{info, warn};

use super::accept::{accept_block, accept_tx};
use super::block::Block;
use super::error::{AcceptResult, ErrorKind};
use super::message::Message;
use super::net::{broadcast, disrupt, read_message, send_message, write_message};
use super::state::Node;
use super::{GET_BLOCKS_CHUNK, PORT};

/// Accept inbound connections forever, one short-lived worker thread per
/// connection. A bad message kills its worker, never the server.
pub fn serve_forever(listener: TcpListener, node: Arc<Mutex<Node>>, interrupt: Arc<AtomicBool>) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let node = Arc::clone(&node);
                let interrupt = Arc::clone(&interrupt);
                // Workers are fire-and-forget; each one handles exactly one
                // framed message.
                let _ = thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &node, &interrupt) {
                        warn!("dropping request: {err}");
                    }
                });
            }
            Err(err) => warn!("failed to accept connection: {err}"),
        }
    }
}

/// Where to reach the node on the other end of a connection: its IP at the
/// well-known port every node listens on.
fn canonical_peer_addr(stream: &TcpStream) -> Result<SocketAddr, Box<dyn Error>> {
    Ok(SocketAddr::new(stream.peer_addr()?.ip(), PORT))
}

/// Parse one framed message, dispatch it, and hang up. Query messages are
/// answered on the same socket; everything else that needs a reply opens a
/// fresh connection to the peer's canonical address.
fn handle_connection(
    mut stream: TcpStream,
    node: &Mutex<Node>,
    interrupt: &AtomicBool,
) -> Result<(), Box<dyn Error>> {
    let peer = canonical_peer_addr(&stream)?;
    let message = read_message(&mut stream)?;

    match message {
        Message::Connect => {
            if node.lock().unwrap().note_connect(peer) {
                info!("(handshake) accepted connect from {peer}");
                send_message(peer, &Message::ConnectResponse)?;
            }
        }
        Message::ConnectResponse => {
            if node.lock().unwrap().note_connect_response(peer) {
                info!("(handshake) connected to {peer}");
                send_message(peer, &Message::ConnectResponse)?;
                // Ask our new peer who else is out there.
                send_message(peer, &Message::Peers)?;
            }
        }
        Message::Peers => {
            let peers = node.lock().unwrap().peers.clone();
            send_message(peer, &Message::PeersResponse(peers))?;
        }
        Message::PeersResponse(addrs) => {
            for addr in addrs {
                connect(node, addr);
            }
        }
        Message::Ping => write_message(&mut stream, &Message::Pong)?,
        Message::Sync(peer_ids) => {
            let blocks = node.lock().unwrap().blocks_for_sync(&peer_ids);
            match blocks {
                Some(blocks) => {
                    send_message(peer, &Message::Blocks(blocks))?;
                    info!("served sync request");
                }
                None => info!("could not serve sync request"),
            }
        }
        Message::Blocks(blocks) => {
            let full_chunk = blocks.len() == GET_BLOCKS_CHUNK;
            for block in blocks {
                match submit_block(node, block) {
                    // Kick the miner off its now-stale candidate.
                    Ok(()) => interrupt.store(true, Ordering::SeqCst),
                    Err(err) => info!("rejected block: {err}"),
                }
            }
            // A full chunk means the peer probably has more for us.
            if full_chunk {
                sync(node);
            }
        }
        Message::Tx(tx) => {
            let accepted = {
                let mut guard = node.lock().unwrap();
                accept_tx(&mut guard, tx.clone())
            };
            match accepted {
                Ok(true) => {
                    let peers = node.lock().unwrap().peers.clone();
                    broadcast(&Message::Tx(tx), &peers);
                }
                Ok(false) => (),
                Err(err) => info!("rejected transaction: {err}"),
            }
        }
        Message::Balance(key) => {
            let balance = node.lock().unwrap().fetch_balance(&key);
            write_message(&mut stream, &Message::BalanceResponse(balance))?;
        }
        Message::Utxos(key) => {
            let utxos = node.lock().unwrap().fetch_utxos(&key);
            write_message(&mut stream, &Message::UtxosResponse(utxos))?;
        }
        // Replies a node never initiates; only the CLI consumes these.
        Message::Pong | Message::BalanceResponse(_) | Message::UtxosResponse(_) => (),
    }

    Ok(())
}

/// Run a block through the acceptor under the lock, then gossip it through
/// the disruption simulator on success or trigger a tip-sync if its parent
/// is unknown. Socket work happens only after the lock is released.
pub fn submit_block(node: &Mutex<Node>, block: Block) -> AcceptResult<()> {
    let (result, peers) = {
        let mut guard = node.lock().unwrap();
        let result = accept_block(&mut guard, block.clone());
        (result, guard.peers.clone())
    };

    match &result {
        Ok(()) => {
            for peer in peers {
                disrupt(peer, Message::Blocks(vec![block.clone()]));
            }
        }
        Err(err) => {
            if matches!(**err, ErrorKind::UnknownParent) {
                sync(node);
            }
        }
    }

    result
}

/// Ask every peer for the blocks above our recent window.
pub fn sync(node: &Mutex<Node>) {
    let (ids, peers) = {
        let guard = node.lock().unwrap();
        (guard.recent_block_ids(), guard.peers.clone())
    };
    broadcast(&Message::Sync(ids), &peers);
}

/// Open the handshake with a peer we have not talked to yet.
pub fn connect(node: &Mutex<Node>, peer: SocketAddr) {
    {
        let guard = node.lock().unwrap();
        if peer == guard.address
            || guard.peers.contains(&peer)
            || guard.pending_peers.contains(&peer)
        {
            return;
        }
    }

    info!("(handshake) sent connect to {peer}");
    match send_message(peer, &Message::Connect) {
        Ok(()) => {
            let mut guard = node.lock().unwrap();
            if !guard.pending_peers.contains(&peer) {
                guard.pending_peers.push(peer);
            }
        }
        Err(_) => info!("(handshake) node {peer} offline"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v1::net::send_request;
    use crate::v1::testing;
    use crate::v1::BLOCK_SUBSIDY;

    /// Spin up a real listener on an ephemeral port backed by a genesis-only
    /// node, and return the address to talk to it.
    fn spawn_node() -> (SocketAddr, Arc<Mutex<Node>>, Arc<AtomicBool>) {
        let node = Arc::new(Mutex::new(testing::node_with_genesis()));
        let interrupt = Arc::new(AtomicBool::new(false));
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        {
            let node = Arc::clone(&node);
            let interrupt = Arc::clone(&interrupt);
            thread::spawn(move || serve_forever(listener, node, interrupt));
        }

        (addr, node, interrupt)
    }

    #[test]
    fn ping_gets_pong() {
        let (addr, _node, _interrupt) = spawn_node();
        match send_request(addr, &Message::Ping).unwrap() {
            Message::Pong => (),
            other => panic!("expected Pong, got {other:?}"),
        }
    }

    #[test]
    fn balance_and_utxos_are_served() {
        let (addr, _node, _interrupt) = spawn_node();
        let alice = testing::keypair("alice").public;

        match send_request(addr, &Message::Balance(alice)).unwrap() {
            Message::BalanceResponse(balance) => assert_eq!(balance, BLOCK_SUBSIDY),
            other => panic!("expected BalanceResponse, got {other:?}"),
        }

        match send_request(addr, &Message::Utxos(alice)).unwrap() {
            Message::UtxosResponse(utxos) => {
                assert_eq!(utxos.len(), 1);
                assert_eq!(utxos[0].amount, BLOCK_SUBSIDY);
            }
            other => panic!("expected UtxosResponse, got {other:?}"),
        }
    }

    #[test]
    fn inbound_blocks_interrupt_the_miner() {
        let (addr, node, interrupt) = spawn_node();
        let tip_id = node.lock().unwrap().tip().id();
        let block = testing::mined_coinbase_block("node1", tip_id);

        send_message(addr, &Message::Blocks(vec![block.clone()])).unwrap();

        // The worker thread applies the block asynchronously; the interrupt
        // is the last thing it sets.
        for _ in 0..100 {
            if interrupt.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(interrupt.load(Ordering::SeqCst));
        assert_eq!(node.lock().unwrap().tip().id(), block.id());
    }

    #[test]
    fn inbound_transactions_land_in_the_mempool() {
        let (addr, node, _interrupt) = spawn_node();
        let tx = {
            let guard = node.lock().unwrap();
            testing::payment(&guard, "alice", "bob", 10)
        };

        send_message(addr, &Message::Tx(tx.clone())).unwrap();

        for _ in 0..100 {
            if !node.lock().unwrap().mempool.is_empty() {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(node.lock().unwrap().mempool, vec![tx]);
    }
}

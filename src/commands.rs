use std::env;
use std::error::Error;
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::v1::message::Message;
use crate::v1::miner::{mine_forever, mine_genesis_block};
use crate::v1::net::{send_message, send_request};
use crate::v1::server::{self, serve_forever};
use crate::v1::state::Node;
use crate::v1::transaction::prepare_simple_tx;
use crate::v1::PORT;
use crate::wallet;

const NODE_NAMES: [&str; 3] = ["node0", "node1", "node2"];

/// Run the node: mine the shared genesis, serve peers, join the network,
/// catch up to the tip, then mine forever. Configured by the `NAME` and
/// `PEERS` environment variables.
pub fn serve() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_thread_names(true)
        .with_target(false)
        .with_max_level(tracing::Level::INFO)
        .init();

    let name = env::var("NAME")?;
    let peer_names = env::var("PEERS")?;
    let index = NODE_NAMES
        .iter()
        .position(|known| *known == name)
        .ok_or_else(|| format!("NAME must be one of {}", NODE_NAMES.join("|")))?;

    // Stagger startup so the test cluster comes up deterministically.
    thread::sleep(Duration::from_secs(10 * index as u64));

    let address = resolve(&name).unwrap_or_else(|_| {
        warn!("cannot resolve own hostname {name}; falling back to loopback");
        SocketAddr::from(([127, 0, 0, 1], PORT))
    });

    let mut node = Node::new(address);
    // Alice holds the genesis coins.
    mine_genesis_block(&mut node, &wallet::lookup_public_key("alice")?);

    let node = Arc::new(Mutex::new(node));
    let interrupt = Arc::new(AtomicBool::new(false));

    let listener = TcpListener::bind(("0.0.0.0", PORT))?;
    info!("starting server");
    let _server = {
        let node = Arc::clone(&node);
        let interrupt = Arc::clone(&interrupt);
        thread::Builder::new()
            .name("server".into())
            .spawn(move || serve_forever(listener, node, interrupt))?
    };

    // Join the network.
    for peer in peer_names.split(',').filter(|name| !name.is_empty()) {
        match resolve(peer) {
            Ok(addr) => server::connect(&node, addr),
            Err(err) => warn!("cannot resolve peer {peer}: {err}"),
        }
    }
    thread::sleep(Duration::from_secs(1));

    // Catch up to the network tip before burning CPU on stale candidates.
    server::sync(&node);
    thread::sleep(Duration::from_secs(1));

    let miner_key = wallet::lookup_public_key(&name)?;
    let miner = thread::Builder::new()
        .name("miner".into())
        .spawn(move || mine_forever(node, interrupt, miner_key))?;

    if miner.join().is_err() {
        return Err("miner thread panicked".into());
    }
    Ok(())
}

pub fn ping(node: &str) -> Result<(), Box<dyn Error>> {
    let address = external_address(node)?;
    match send_request(address, &Message::Ping)? {
        Message::Pong => Ok(()),
        other => Err(format!("unexpected reply to ping: {other:?}").into()),
    }
}

pub fn balance(name: &str, node: &str) -> Result<(), Box<dyn Error>> {
    let key = wallet::lookup_public_key(name)?;
    let address = external_address(node)?;
    match send_request(address, &Message::Balance(key))? {
        Message::BalanceResponse(amount) => {
            println!("{amount}");
            Ok(())
        }
        other => Err(format!("unexpected reply to balance: {other:?}").into()),
    }
}

/// Fetch the sender's spendable outputs from the node, build and sign a
/// payment, and hand it back for gossip.
pub fn tx(from: &str, to: &str, amount: u64, node: &str) -> Result<(), Box<dyn Error>> {
    let sender = wallet::lookup_keypair(from)?;
    let recipient = wallet::lookup_public_key(to)?;
    let address = external_address(node)?;

    let utxos = match send_request(address, &Message::Utxos(sender.public))? {
        Message::UtxosResponse(utxos) => utxos,
        other => return Err(format!("unexpected reply to utxos: {other:?}").into()),
    };

    let tx = prepare_simple_tx(&utxos, &sender, &recipient, amount)?;
    send_message(address, &Message::Tx(tx))
}

/// Where the host maps a node's well-known port: node0 at 10000, node1 at
/// 10001, and so on.
fn external_address(node: &str) -> Result<SocketAddr, Box<dyn Error>> {
    let index = node
        .chars()
        .last()
        .and_then(|c| c.to_digit(10))
        .ok_or_else(|| format!("bad node name: {node}"))?;
    Ok(SocketAddr::from(([127, 0, 0, 1], PORT + index as u16)))
}

fn resolve(host: &str) -> io::Result<SocketAddr> {
    (host, PORT)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no address for {host}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_addresses_follow_the_port_convention() {
        assert_eq!(
            external_address("node0").unwrap(),
            SocketAddr::from(([127, 0, 0, 1], 10000))
        );
        assert_eq!(
            external_address("node2").unwrap(),
            SocketAddr::from(([127, 0, 0, 1], 10002))
        );
        assert!(external_address("gateway").is_err());
    }
}

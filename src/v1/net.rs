use std::error::Error;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use super::message::Message;

/// Read one frame: a 4-byte big-endian length followed by that many bytes
/// of serialized message.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message, Box<dyn Error>> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;

    Ok(bincode::deserialize(&payload)?)
}

pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<(), Box<dyn Error>> {
    let payload = bincode::serialize(message)?;
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(&payload)?;
    Ok(())
}

/// Fire a message over a fresh connection and hang up.
pub fn send_message(addr: SocketAddr, message: &Message) -> Result<(), Box<dyn Error>> {
    let mut stream = TcpStream::connect(addr)?;
    write_message(&mut stream, message)
}

/// Send a message and wait for the reply on the same connection.
pub fn send_request(addr: SocketAddr, message: &Message) -> Result<Message, Box<dyn Error>> {
    let mut stream = TcpStream::connect(addr)?;
    write_message(&mut stream, message)?;
    read_message(&mut stream)
}

/// Send to every peer at once. A failed delivery only costs that peer its
/// copy.
pub fn broadcast(message: &Message, peers: &[SocketAddr]) {
    crossbeam::scope(|scope| {
        for &peer in peers {
            scope.spawn(move |_| {
                if let Err(err) = send_message(peer, message) {
                    debug!("failed to reach {peer}: {err}");
                }
            });
        }
    })
    .expect("broadcast worker panicked");
}

/// Outbound block gossip goes through a simulated hostile network: one send
/// in ten is dropped outright, the rest arrive up to a second late.
pub fn disrupt(peer: SocketAddr, message: Message) {
    let mut rng = rand::thread_rng();
    if rng.gen_range(0..10) == 0 {
        return;
    }
    let delay = Duration::from_millis(rng.gen_range(0..1000));
    let _ = thread::spawn(move || {
        thread::sleep(delay);
        if let Err(err) = send_message(peer, &message) {
            debug!("failed to gossip to {peer}: {err}");
        }
    });
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::v1::testing;
    use crate::v1::GET_BLOCKS_CHUNK;

    fn roundtrip(message: &Message) -> Message {
        let mut buf: Vec<u8> = vec![];
        write_message(&mut buf, message).unwrap();
        read_message(&mut Cursor::new(buf)).unwrap()
    }

    #[test]
    fn frames_roundtrip() {
        match roundtrip(&Message::Ping) {
            Message::Ping => (),
            other => panic!("expected Ping, got {other:?}"),
        }

        let node = testing::node_with_genesis();
        let tx = testing::payment(&node, "alice", "bob", 10);
        match roundtrip(&Message::Tx(tx.clone())) {
            Message::Tx(decoded) => assert_eq!(decoded, tx),
            other => panic!("expected Tx, got {other:?}"),
        }

        let blocks = vec![node.tip().clone()];
        match roundtrip(&Message::Blocks(blocks.clone())) {
            Message::Blocks(decoded) => {
                assert_eq!(decoded.len(), 1);
                assert_eq!(decoded[0].id(), blocks[0].id());
            }
            other => panic!("expected Blocks, got {other:?}"),
        }

        let ids = node.recent_block_ids();
        assert!(ids.len() <= GET_BLOCKS_CHUNK);
        match roundtrip(&Message::Sync(ids.clone())) {
            Message::Sync(decoded) => assert_eq!(decoded, ids),
            other => panic!("expected Sync, got {other:?}"),
        }
    }

    #[test]
    fn length_prefix_is_big_endian() {
        let mut buf: Vec<u8> = vec![];
        write_message(&mut buf, &Message::Pong).unwrap();

        let payload_len = (buf.len() - 4) as u32;
        assert_eq!(buf[..4], payload_len.to_be_bytes());
    }

    #[test]
    fn truncated_frames_are_errors() {
        let mut buf: Vec<u8> = vec![];
        write_message(&mut buf, &Message::Ping).unwrap();
        buf.truncate(buf.len() - 1);

        assert!(read_message(&mut Cursor::new(buf)).is_err());
    }
}

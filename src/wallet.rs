use std::error::Error;

use ed25519_dalek::{Keypair, PublicKey, SecretKey};
use ring::digest::{Context, SHA256};

pub type Hash256 = [u8; 32];

pub fn sha256(bytes: &[u8]) -> Hash256 {
    let mut context = Context::new(&SHA256);
    context.update(bytes);
    let digest = context.finish();

    let mut out = [0u8; 32];
    out.copy_from_slice(digest.as_ref());
    out
}

/// Test-net identity registry. Each name maps to an Ed25519 keypair derived
/// from a constant seed, so every node independently agrees on everyone's
/// keys without any key exchange.
const REGISTRY: [(&str, u8); 5] = [
    ("alice", 1),
    ("bob", 2),
    ("node0", 3),
    ("node1", 4),
    ("node2", 5),
];

pub fn lookup_keypair(name: &str) -> Result<Keypair, Box<dyn Error>> {
    let (_, seed_byte) = REGISTRY
        .iter()
        .find(|(known, _)| *known == name)
        .ok_or_else(|| format!("unknown name: {name}"))?;

    let mut seed = [0u8; 32];
    seed[31] = *seed_byte;

    let secret = SecretKey::from_bytes(&seed).expect("seed is the right length");
    let public = PublicKey::from(&secret);

    Ok(Keypair { secret, public })
}

pub fn lookup_public_key(name: &str) -> Result<PublicKey, Box<dyn Error>> {
    Ok(lookup_keypair(name)?.public)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        let digest = sha256(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn registry_is_deterministic() {
        let first = lookup_keypair("alice").unwrap();
        let second = lookup_keypair("alice").unwrap();
        assert_eq!(first.public, second.public);
    }

    #[test]
    fn registry_names_have_distinct_keys() {
        let alice = lookup_public_key("alice").unwrap();
        let bob = lookup_public_key("bob").unwrap();
        assert_ne!(alice, bob);
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!(lookup_keypair("mallory").is_err());
    }
}

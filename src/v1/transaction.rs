use std::error::Error;
use std::fmt;

use ed25519_dalek::{Keypair, PublicKey, Signature, Signer};
use serde::{Deserialize, Serialize};

use super::BLOCK_SUBSIDY;

/// Transaction identifier: a freshly generated 128-bit value. Ids only have
/// to be unique, not derived from the transaction contents.
pub type TxId = [u8; 16];

/// Coinbase id of the genesis block. Fixed so that every node mines an
/// identical genesis without talking to anyone.
pub const GENESIS_TX_ID: TxId = [0xab, 0xc1, 0x23, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

pub fn random_tx_id() -> TxId {
    rand::random()
}

/// Points at one output of one transaction.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Outpoint {
    pub tx_id: TxId,
    pub index: u32,
}

/// A spendable amount locked directly to a public key. The outpoint is
/// self-referential: it names the owning transaction and this output's own
/// index within it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TxOut {
    pub outpoint: Outpoint,
    pub amount: u64,
    pub public_key: PublicKey,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum TxIn {
    /// Mints the block subsidy. Only legal as the sole input of a block's
    /// first transaction.
    Coinbase,
    /// Spends an existing output. The signature covers [spend_message].
    Spend {
        outpoint: Outpoint,
        signature: Signature,
    },
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Tx {
    pub id: TxId,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
}

impl Tx {
    pub fn is_coinbase(&self) -> bool {
        matches!(self.inputs.first(), Some(TxIn::Coinbase))
    }

    /// The outpoints this transaction consumes. Empty for a coinbase.
    pub fn spent_outpoints(&self) -> impl Iterator<Item = &Outpoint> {
        self.inputs.iter().filter_map(|input| match input {
            TxIn::Spend { outpoint, .. } => Some(outpoint),
            TxIn::Coinbase => None,
        })
    }

    pub fn spends(&self, outpoint: &Outpoint) -> bool {
        self.spent_outpoints().any(|spent| spent == outpoint)
    }
}

impl PartialEq for Tx {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", hex::encode(self.tx_id), self.index)
    }
}

impl fmt::Debug for Tx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tx")
            .field("id", &hex::encode(self.id))
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}

/// The message a spender signs for one input: the input's own outpoint
/// followed by the full output list. Other inputs are deliberately not
/// covered, so a signature stays valid even if inputs are added later; a
/// known departure from Bitcoin's sighash rules.
pub fn spend_message(outpoint: &Outpoint, outputs: &[TxOut]) -> Vec<u8> {
    let mut message = bincode::serialize(outpoint).expect("serialize outpoint");
    message.extend(bincode::serialize(outputs).expect("serialize outputs"));
    message
}

/// The transaction that pays a block's miner.
pub fn prepare_coinbase(miner: &PublicKey, tx_id: TxId) -> Tx {
    Tx {
        id: tx_id,
        inputs: vec![TxIn::Coinbase],
        outputs: vec![TxOut {
            outpoint: Outpoint { tx_id, index: 0 },
            amount: BLOCK_SUBSIDY,
            public_key: *miner,
        }],
    }
}

/// Build and sign a payment: greedily gather the sender's UTXOs until they
/// cover the amount, pay the recipient with output 0, and return any change
/// to the sender with output 1.
pub fn prepare_simple_tx(
    utxos: &[TxOut],
    sender: &Keypair,
    recipient: &PublicKey,
    amount: u64,
) -> Result<Tx, Box<dyn Error>> {
    let mut selected: Vec<Outpoint> = vec![];
    let mut input_sum = 0u64;
    for utxo in utxos {
        selected.push(utxo.outpoint);
        input_sum += utxo.amount;
        if input_sum > amount {
            break;
        }
    }

    if input_sum < amount {
        return Err(format!("insufficient funds: have {input_sum}, need {amount}").into());
    }

    let tx_id = random_tx_id();
    let change = input_sum - amount;
    let outputs = vec![
        TxOut {
            outpoint: Outpoint { tx_id, index: 0 },
            amount,
            public_key: *recipient,
        },
        TxOut {
            outpoint: Outpoint { tx_id, index: 1 },
            amount: change,
            public_key: sender.public,
        },
    ];

    // Outputs are fixed, so every input can be signed as it is built.
    let inputs = selected
        .iter()
        .map(|outpoint| TxIn::Spend {
            outpoint: *outpoint,
            signature: sender.sign(&spend_message(outpoint, &outputs)),
        })
        .collect();

    Ok(Tx {
        id: tx_id,
        inputs,
        outputs,
    })
}

use std::collections::HashSet;

use ed25519_dalek::Verifier;

use super::block::Block;
use super::error::{AcceptResult, ErrorKind};
use super::state::Node;
use super::transaction::{spend_message, Outpoint, Tx, TxIn};
use super::{BLOCK_SUBSIDY, POW_TARGET};

/// Check a block. Proof-of-work is always checked; transactions only when
/// `validate_txns` is set, i.e. when the block is about to join the main
/// chain. Blocks parked on a branch get their transactions re-checked if a
/// reorg ever selects that branch, which keeps branch recording cheap.
pub fn validate_block(node: &Node, block: &Block, validate_txns: bool) -> AcceptResult<()> {
    if block.proof() >= *POW_TARGET {
        return Err(Box::new(ErrorKind::InsufficientPow));
    }

    if validate_txns {
        let (coinbase, rest) = match block.txns.split_first() {
            Some(parts) => parts,
            None => return Err(Box::new(ErrorKind::EmptyBlock)),
        };

        validate_coinbase(coinbase)?;

        // Transactions are checked against the UTXO set as of the parent
        // block, so no transaction may depend on or contend with another
        // from the same block.
        let mut spent: HashSet<Outpoint> = HashSet::new();
        for tx in rest {
            validate_tx(node, tx)?;
            for outpoint in tx.spent_outpoints() {
                if !spent.insert(*outpoint) {
                    return Err(Box::new(ErrorKind::DoubleSpend(*outpoint)));
                }
            }
        }
    }

    Ok(())
}

/// The stateful transaction rules: every input spends a live UTXO, every
/// signature verifies against the key locking the spent output, and value
/// is conserved exactly (fees are not a thing here).
pub fn validate_tx(node: &Node, tx: &Tx) -> AcceptResult<()> {
    let mut in_sum: u64 = 0;

    for input in &tx.inputs {
        let (outpoint, signature) = match input {
            TxIn::Spend {
                outpoint,
                signature,
            } => (outpoint, signature),
            TxIn::Coinbase => return Err(Box::new(ErrorKind::Coinbase)),
        };

        let spent = node
            .utxo_set
            .get(outpoint)
            .ok_or_else(|| Box::new(ErrorKind::MissingUtxo(*outpoint)))?;

        let message = spend_message(outpoint, &tx.outputs);
        spent
            .public_key
            .verify(&message, signature)
            .map_err(|_| Box::new(ErrorKind::BadSignature))?;

        in_sum += spent.amount;
    }

    let out_sum: u64 = tx.outputs.iter().map(|out| out.amount).sum();
    if in_sum != out_sum {
        return Err(Box::new(ErrorKind::ValueMismatch { in_sum, out_sum }));
    }

    Ok(())
}

pub fn validate_coinbase(tx: &Tx) -> AcceptResult<()> {
    if !tx.is_coinbase() || tx.inputs.len() != 1 || tx.outputs.len() != 1 {
        return Err(Box::new(ErrorKind::BadCoinbase));
    }

    let minted = tx.outputs[0].amount;
    if minted != BLOCK_SUBSIDY {
        return Err(Box::new(ErrorKind::ValueMismatch {
            in_sum: BLOCK_SUBSIDY,
            out_sum: minted,
        }));
    }

    Ok(())
}

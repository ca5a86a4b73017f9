use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::transaction::Outpoint;

pub type AcceptResult<T> = std::result::Result<T, AcceptError>;

pub type AcceptError = Box<ErrorKind>;

#[derive(Debug, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The block id does not beat the proof-of-work target.
    InsufficientPow,
    /// The block is already on the chain or in a branch. Not a protocol
    /// error; duplicates are rejected silently.
    DuplicateBlock,
    /// The block's parent is nowhere to be found; the receiver should sync.
    UnknownParent,
    /// An input signature does not verify against the key locking the
    /// referenced output.
    BadSignature,
    /// An input references an outpoint that is not in the UTXO set.
    MissingUtxo(Outpoint),
    /// Inputs and outputs do not balance (or a coinbase mints the wrong
    /// amount).
    ValueMismatch { in_sum: u64, out_sum: u64 },
    /// Two transactions contend for the same outpoint.
    DoubleSpend(Outpoint),
    /// A coinbase input showed up somewhere other than the first slot of a
    /// block's first transaction.
    Coinbase,
    /// The first transaction of a block is not a well-formed coinbase.
    BadCoinbase,
    /// A block carried no transactions at all.
    EmptyBlock,
    /// A branch failed validation mid-connect; the previous main chain was
    /// restored.
    ReorgFailed,
}

impl Error for ErrorKind {}

impl fmt::Display for ErrorKind {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::InsufficientPow => write!(fmt, "insufficient proof-of-work"),
            ErrorKind::DuplicateBlock => write!(fmt, "received duplicate block"),
            ErrorKind::UnknownParent => write!(fmt, "block has unknown parent"),
            ErrorKind::BadSignature => write!(fmt, "input signature does not verify"),
            ErrorKind::MissingUtxo(outpoint) => {
                write!(fmt, "input spends unknown output {outpoint:?}")
            }
            ErrorKind::ValueMismatch { in_sum, out_sum } => write!(
                fmt,
                "value mismatch: {in_sum} in, {out_sum} out"
            ),
            ErrorKind::DoubleSpend(outpoint) => {
                write!(fmt, "output {outpoint:?} is already being spent")
            }
            ErrorKind::Coinbase => write!(fmt, "coinbase input outside a coinbase transaction"),
            ErrorKind::BadCoinbase => write!(fmt, "malformed coinbase transaction"),
            ErrorKind::EmptyBlock => write!(fmt, "block has no transactions"),
            ErrorKind::ReorgFailed => {
                write!(fmt, "reorg failed; rolled back to the previous chain")
            }
        }
    }
}

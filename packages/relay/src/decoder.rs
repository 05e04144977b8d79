//! Log Decoder
//!
//! Turns raw logs into `RawEvent`s and extracts human-readable revert reasons
//! from failed call output.
//!
//! Every catalogued event has only static parameters, so its arguments are the
//! indexed topics (after topic0) followed by the 32-byte data words, in
//! declaration order. Decoding is therefore independent of which parameters
//! are indexed.

use alloy::primitives::{Address, TxHash, B256, U256};
use alloy::sol_types::{Panic, Revert, SolError};
use thiserror::Error;

use crate::chain::{TxLog, TxReceipt};
use crate::signatures::{event_kind, EventKind};

/// Size of one ABI word
pub const WORD_SIZE: usize = 32;

/// Selector, offset and length words preceding an `Error(string)` payload
const REVERT_STRING_HEADER: usize = 4 + WORD_SIZE + WORD_SIZE;

/// Errors that can occur during log decoding
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Log has no topics")]
    MissingTopic,

    #[error("Unknown event topic: {0}")]
    UnknownTopic(B256),

    #[error("Log data length {0} is not a multiple of 32")]
    MalformedData(usize),

    #[error("Expected {expected} argument words, found {found}")]
    ArgumentCount { expected: usize, found: usize },

    #[error("Argument {0} out of range")]
    MissingArgument(usize),

    #[error("Argument {index} is not a valid {expected}")]
    InvalidArgument { index: usize, expected: &'static str },
}

/// Positional argument words of a decoded event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventArgs(Vec<B256>);

impl EventArgs {
    pub fn new(words: Vec<B256>) -> Self {
        Self(words)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw word at `index`
    pub fn word(&self, index: usize) -> Result<B256, DecodeError> {
        self.0.get(index).copied().ok_or(DecodeError::MissingArgument(index))
    }

    /// Word at `index` as an address; the upper 12 bytes must be zero
    pub fn address(&self, index: usize) -> Result<Address, DecodeError> {
        let word = self.word(index)?;
        if word[..12].iter().any(|b| *b != 0) {
            return Err(DecodeError::InvalidArgument { index, expected: "address" });
        }
        Ok(Address::from_word(word))
    }

    pub fn uint(&self, index: usize) -> Result<U256, DecodeError> {
        Ok(U256::from_be_bytes(self.word(index)?.0))
    }

    pub fn boolean(&self, index: usize) -> Result<bool, DecodeError> {
        match self.uint(index)? {
            v if v.is_zero() => Ok(false),
            v if v == U256::from(1) => Ok(true),
            _ => Err(DecodeError::InvalidArgument { index, expected: "bool" }),
        }
    }

    pub fn u8(&self, index: usize) -> Result<u8, DecodeError> {
        u8::try_from(self.uint(index)?)
            .map_err(|_| DecodeError::InvalidArgument { index, expected: "uint8" })
    }
}

/// A classified log ready for a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: EventKind,
    pub args: EventArgs,
    /// Contract that emitted the log
    pub emitter: Address,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<TxHash>,
}

/// Decode a log into a `RawEvent`
///
/// # Arguments
/// * `log` - The log to decode
///
/// # Returns
/// The classified event, or an error if topic0 is not catalogued or the
/// log carries fewer argument words than the event declares
pub fn decode_log(log: &TxLog) -> Result<RawEvent, DecodeError> {
    let topic0 = log.topic0().ok_or(DecodeError::MissingTopic)?;
    let kind = event_kind(topic0).ok_or(DecodeError::UnknownTopic(*topic0))?;

    if log.data.len() % WORD_SIZE != 0 {
        return Err(DecodeError::MalformedData(log.data.len()));
    }

    let mut words: Vec<B256> = log.topics[1..].to_vec();
    words.extend(log.data.chunks(WORD_SIZE).map(B256::from_slice));

    if words.len() < kind.arity() {
        return Err(DecodeError::ArgumentCount {
            expected: kind.arity(),
            found: words.len(),
        });
    }

    Ok(RawEvent {
        kind,
        args: EventArgs(words),
        emitter: log.address,
        block_number: log.block_number,
        transaction_hash: log.transaction_hash,
    })
}

/// First log of a receipt carrying the given event's topic0
pub fn find_log(receipt: &TxReceipt, kind: EventKind) -> Option<&TxLog> {
    let topic = kind.topic();
    receipt.logs.iter().find(|log| log.topic0() == Some(&topic))
}

/// Extract a readable reason from revert data
///
/// Tries `Error(string)`, then `Panic(uint256)`, then a lenient UTF-8 read of
/// whatever follows the `Error(string)` header.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.is_empty() {
        return None;
    }

    if let Ok(revert) = Revert::abi_decode(data, true) {
        return Some(revert.reason);
    }

    if let Ok(panic) = Panic::abi_decode(data, true) {
        return Some(format!("panic code {:#x}", panic.code));
    }

    lenient_utf8(data)
}

fn lenient_utf8(data: &[u8]) -> Option<String> {
    if data.len() <= REVERT_STRING_HEADER {
        return None;
    }
    let tail = &data[REVERT_STRING_HEADER..];
    let end = tail.iter().rposition(|b| *b != 0)? + 1;
    let text = std::str::from_utf8(&tail[..end]).ok()?;
    if text.chars().all(|c| !c.is_control() || c.is_whitespace()) {
        Some(text.to_string())
    } else {
        None
    }
}

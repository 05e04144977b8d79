//! Chain Reader
//!
//! Read-only view of the chain the pipeline depends on. Handlers and the
//! watcher only see the domain types below; `node::NodeClient` converts from
//! the RPC types.

use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Errors raised by chain reads
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("Call to {to} reverted: {reason}")]
    Reverted { to: Address, reason: String },

    #[error("Failed to decode return of {method}: {reason}")]
    AbiDecode { method: &'static str, reason: String },

    #[error("Subscription failed: {0}")]
    Subscription(String),

    #[error("Block {0} not found")]
    BlockNotFound(u64),
}

/// A log as emitted by a contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<TxHash>,
}

impl TxLog {
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }
}

/// Mined transaction outcome with its ordered logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub transaction_hash: TxHash,
    pub from: Address,
    /// None for contract creation
    pub to: Option<Address>,
    pub status: bool,
    pub block_number: u64,
    pub logs: Vec<TxLog>,
}

/// Transaction as seen inside a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedTx {
    pub hash: TxHash,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub gas_limit: u64,
    pub nonce: u64,
    pub block_number: Option<u64>,
}

/// Entry of a block body; some nodes return bare hashes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockTx {
    Full(ObservedTx),
    Hash(TxHash),
}

/// Result of re-executing a transaction as a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replay {
    Success(Bytes),
    Reverted {
        /// Raw revert payload when the node returned one
        data: Option<Bytes>,
        /// Node-side error message
        message: String,
    },
}

/// Read access to chain state
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Latest block number
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Execute a view call, optionally pinned to a block
    ///
    /// # Arguments
    /// * `to` - Contract to call
    /// * `input` - ABI-encoded calldata
    /// * `block` - Block to evaluate at, latest when `None`
    async fn call(&self, to: Address, input: Bytes, block: Option<u64>) -> Result<Bytes, ChainError>;

    /// Receipt by hash; `None` while the transaction is unknown or pending
    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<TxReceipt>, ChainError>;

    /// Transaction by hash; `None` when the node does not know it
    async fn transaction(&self, hash: TxHash) -> Result<Option<ObservedTx>, ChainError>;

    /// All transactions of a block, in block order
    async fn block_transactions(&self, number: u64) -> Result<Vec<BlockTx>, ChainError>;

    /// Re-run a mined transaction as an `eth_call` at its own block
    async fn replay(&self, tx: &ObservedTx) -> Result<Replay, ChainError>;
}

/// Push-style access to new logs and blocks
#[async_trait]
pub trait ChainSubscriber: Send + Sync {
    /// Stream logs whose topic0 is one of `topics`, from `address` when given
    async fn subscribe_logs(
        &self,
        address: Option<Address>,
        topics: Vec<B256>,
    ) -> Result<BoxStream<'static, TxLog>, ChainError>;

    /// Stream numbers of newly mined blocks
    async fn subscribe_blocks(&self) -> Result<BoxStream<'static, u64>, ChainError>;
}

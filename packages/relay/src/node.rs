//! Node Connection Module
//!
//! Connects to the chain over HTTP, WebSocket or an IPC socket, reconnects
//! with exponential backoff, and adapts the alloy provider to the
//! `ChainReader` / `ChainSubscriber` traits.

use std::path::Path;
use std::time::Duration;

use alloy::consensus::Transaction as ConsensusTx;
use alloy::eips::BlockId;
use alloy::network::TransactionResponse;
use alloy::primitives::{Address, Bytes, TxHash, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{
    BlockNumberOrTag, BlockTransactionsKind, Filter, Log, Transaction, TransactionInput, TransactionReceipt,
    TransactionRequest,
};
use alloy::transports::{BoxTransport, RpcError, TransportErrorKind};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::chain::{BlockTx, ChainError, ChainReader, ChainSubscriber, ObservedTx, Replay, TxLog, TxReceipt};

/// Maximum number of reconnection attempts before giving up
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Initial backoff delay for reconnection
pub const INITIAL_BACKOFF_MS: u64 = 100;

/// Maximum backoff delay for reconnection
pub const MAX_BACKOFF_MS: u64 = 30000;

/// Errors that can occur while connecting to a node
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("IPC socket not found at path: {0}")]
    SocketNotFound(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Max reconnection attempts ({0}) exceeded")]
    MaxReconnectAttemptsExceeded(u32),
}

/// Transport kind of an RPC endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Http(String),
    Ws(String),
    /// Expanded socket path
    Ipc(String),
}

impl Endpoint {
    /// Classify an endpoint string; anything that is not a URL is an IPC path
    pub fn parse(endpoint: &str) -> Result<Self, NodeError> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(NodeError::InvalidEndpoint("Endpoint cannot be empty".to_string()));
        }
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            Ok(Endpoint::Http(endpoint.to_string()))
        } else if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
            Ok(Endpoint::Ws(endpoint.to_string()))
        } else if endpoint.contains("://") {
            Err(NodeError::InvalidEndpoint(endpoint.to_string()))
        } else {
            Ok(Endpoint::Ipc(expand_path(endpoint)))
        }
    }

    /// Connection string understood by `ProviderBuilder::on_builtin`
    pub fn connection_string(&self) -> &str {
        match self {
            Endpoint::Http(url) | Endpoint::Ws(url) | Endpoint::Ipc(url) => url,
        }
    }
}

/// Configuration for the node connection
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// HTTP/WS URL or IPC socket path
    pub endpoint: String,
    /// Maximum reconnection attempts
    pub max_reconnect_attempts: u32,
    /// Initial backoff delay in milliseconds
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds
    pub max_backoff_ms: u64,
    /// Interval between log and block polls
    pub poll_interval: Duration,
}

impl NodeConfig {
    pub fn new(endpoint: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
            poll_interval,
        }
    }

    /// Calculate backoff delay for a given attempt number
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_backoff_ms * 2u64.pow(attempt.min(10));
        Duration::from_millis(delay_ms.min(self.max_backoff_ms))
    }
}

/// Expand ~ to home directory in path
pub fn expand_path(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return path.replacen("~", &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

/// Node connection manager with reconnection support
pub struct NodeConnection {
    config: NodeConfig,
    reconnect_attempts: u32,
}

impl NodeConnection {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            reconnect_attempts: 0,
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Get current reconnection attempt count
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Calculate delay before next reconnection attempt
    pub fn next_backoff_delay(&self) -> Duration {
        self.config.backoff_delay(self.reconnect_attempts)
    }

    /// Attempt to connect once
    pub async fn connect(&mut self) -> Result<NodeClient, NodeError> {
        let endpoint = Endpoint::parse(&self.config.endpoint)?;
        if let Endpoint::Ipc(path) = &endpoint {
            if !Path::new(path).exists() {
                return Err(NodeError::SocketNotFound(path.clone()));
            }
        }

        info!("Connecting to node at {}", endpoint.connection_string());
        let provider = ProviderBuilder::new()
            .on_builtin(endpoint.connection_string())
            .await
            .map_err(|e| NodeError::ConnectionFailed(e.to_string()))?;

        self.reconnect_attempts = 0;
        info!("Successfully connected to node");

        Ok(NodeClient::new(provider, self.config.poll_interval))
    }

    /// Connect, retrying with exponential backoff
    pub async fn connect_with_retry(&mut self) -> Result<NodeClient, NodeError> {
        match self.connect().await {
            Ok(client) => Ok(client),
            Err(NodeError::InvalidEndpoint(e)) => Err(NodeError::InvalidEndpoint(e)),
            Err(e) => {
                error!("Initial connection failed: {}", e);
                self.reconnect().await
            }
        }
    }

    /// Attempt to reconnect with exponential backoff
    pub async fn reconnect(&mut self) -> Result<NodeClient, NodeError> {
        while self.reconnect_attempts < self.config.max_reconnect_attempts {
            let delay = self.next_backoff_delay();
            warn!(
                "Attempting to reconnect (attempt {}/{}), waiting {:?}",
                self.reconnect_attempts + 1,
                self.config.max_reconnect_attempts,
                delay
            );

            sleep(delay).await;
            self.reconnect_attempts += 1;

            match self.connect().await {
                Ok(client) => return Ok(client),
                Err(e) => {
                    error!("Reconnection attempt {} failed: {}", self.reconnect_attempts, e);
                }
            }
        }

        Err(NodeError::MaxReconnectAttemptsExceeded(self.config.max_reconnect_attempts))
    }
}

fn rpc_error(e: RpcError<TransportErrorKind>) -> ChainError {
    ChainError::Rpc(e.to_string())
}

fn convert_log(log: &Log) -> TxLog {
    TxLog {
        address: log.inner.address,
        topics: log.inner.data.topics().to_vec(),
        data: log.inner.data.data.clone(),
        block_number: log.block_number,
        transaction_hash: log.transaction_hash,
    }
}

fn convert_receipt(receipt: &TransactionReceipt) -> TxReceipt {
    TxReceipt {
        transaction_hash: receipt.transaction_hash,
        from: receipt.from,
        to: receipt.to,
        status: receipt.status(),
        block_number: receipt.block_number.unwrap_or_default(),
        logs: receipt.inner.logs().iter().map(convert_log).collect(),
    }
}

fn convert_transaction(tx: &Transaction) -> ObservedTx {
    ObservedTx {
        hash: TransactionResponse::tx_hash(tx),
        from: tx.from,
        to: ConsensusTx::to(tx),
        value: ConsensusTx::value(tx),
        input: ConsensusTx::input(tx).clone(),
        gas_limit: ConsensusTx::gas_limit(tx),
        nonce: ConsensusTx::nonce(tx),
        block_number: tx.block_number,
    }
}

/// Revert payload carried in the `data` field of a JSON-RPC error
fn revert_data(data: Option<&serde_json::value::RawValue>) -> Option<Bytes> {
    data.and_then(|raw| serde_json::from_str::<Bytes>(raw.get()).ok())
}

/// `ChainReader` and `ChainSubscriber` over an alloy provider
#[derive(Clone)]
pub struct NodeClient {
    provider: RootProvider<BoxTransport>,
    poll_interval: Duration,
}

impl NodeClient {
    pub fn new(provider: RootProvider<BoxTransport>, poll_interval: Duration) -> Self {
        Self {
            provider,
            poll_interval,
        }
    }
}

#[async_trait]
impl ChainReader for NodeClient {
    async fn block_number(&self) -> Result<u64, ChainError> {
        self.provider.get_block_number().await.map_err(rpc_error)
    }

    async fn call(&self, to: Address, input: Bytes, block: Option<u64>) -> Result<Bytes, ChainError> {
        let request = TransactionRequest::default()
            .to(to)
            .input(TransactionInput::new(input));
        let mut call = self.provider.call(&request);
        if let Some(number) = block {
            call = call.block(BlockId::number(number));
        }
        call.await.map_err(|e| match e {
            RpcError::ErrorResp(payload) => ChainError::Reverted {
                to,
                reason: payload.message.to_string(),
            },
            other => rpc_error(other),
        })
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<TxReceipt>, ChainError> {
        let receipt = self.provider.get_transaction_receipt(hash).await.map_err(rpc_error)?;
        Ok(receipt.as_ref().map(convert_receipt))
    }

    async fn transaction(&self, hash: TxHash) -> Result<Option<ObservedTx>, ChainError> {
        let tx = self.provider.get_transaction_by_hash(hash).await.map_err(rpc_error)?;
        Ok(tx.as_ref().map(convert_transaction))
    }

    async fn block_transactions(&self, number: u64) -> Result<Vec<BlockTx>, ChainError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number), BlockTransactionsKind::Full)
            .await
            .map_err(rpc_error)?
            .ok_or(ChainError::BlockNotFound(number))?;

        if let Some(txs) = block.transactions.as_transactions() {
            return Ok(txs.iter().map(|tx| BlockTx::Full(convert_transaction(tx))).collect());
        }
        debug!(block = number, "Block returned without transaction bodies");
        Ok(block
            .transactions
            .as_hashes()
            .map(|hashes| hashes.iter().copied().map(BlockTx::Hash).collect())
            .unwrap_or_default())
    }

    async fn replay(&self, tx: &ObservedTx) -> Result<Replay, ChainError> {
        let mut request = TransactionRequest::default()
            .from(tx.from)
            .value(tx.value)
            .input(TransactionInput::new(tx.input.clone()))
            .gas_limit(tx.gas_limit)
            .nonce(tx.nonce);
        if let Some(to) = tx.to {
            request = request.to(to);
        }

        let mut call = self.provider.call(&request);
        if let Some(number) = tx.block_number {
            call = call.block(BlockId::number(number));
        }
        match call.await {
            Ok(output) => Ok(Replay::Success(output)),
            Err(RpcError::ErrorResp(payload)) => Ok(Replay::Reverted {
                data: revert_data(payload.data.as_deref()),
                message: payload.message.to_string(),
            }),
            Err(e) => Err(rpc_error(e)),
        }
    }
}

#[async_trait]
impl ChainSubscriber for NodeClient {
    async fn subscribe_logs(
        &self,
        address: Option<Address>,
        topics: Vec<B256>,
    ) -> Result<BoxStream<'static, TxLog>, ChainError> {
        let mut filter = Filter::new().event_signature(topics);
        if let Some(address) = address {
            filter = filter.address(address);
        }

        let poller = self
            .provider
            .watch_logs(&filter)
            .await
            .map_err(|e| ChainError::Subscription(e.to_string()))?
            .with_poll_interval(self.poll_interval);
        debug!(?address, "Log filter installed");

        Ok(poller
            .into_stream()
            .flat_map(stream::iter)
            .map(|log| convert_log(&log))
            .boxed())
    }

    async fn subscribe_blocks(&self) -> Result<BoxStream<'static, u64>, ChainError> {
        let start = self.block_number().await?;
        let provider = self.provider.clone();
        let interval = self.poll_interval;

        // Yields every block number after `start`, polling the head
        let numbers = stream::unfold((provider, start), move |(provider, last)| async move {
            loop {
                sleep(interval).await;
                match provider.get_block_number().await {
                    Ok(head) if head > last => {
                        let batch = stream::iter(last + 1..=head);
                        return Some((batch, (provider, head)));
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Block number poll failed: {}", e),
                }
            }
        });
        Ok(numbers.flatten().boxed())
    }
}

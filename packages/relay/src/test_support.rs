//! In-memory chain and transport used by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{address, Address, Bytes, TxHash, U256};
use alloy::sol_types::SolValue;
use async_trait::async_trait;

use crate::chain::{BlockTx, ChainError, ChainReader, ObservedTx, Replay, TxReceipt};
use crate::config::{Network, RelayConfig};
use crate::handlers::HandlerContext;
use crate::limiter::RateLimiter;
use crate::metadata::{ContractNameSource, ExplorerError, MetadataResolver};
use crate::notification::ChannelKind;
use crate::registry::CoreAddresses;
use crate::sink::{Sink, SinkError, WebhookPayload, WebhookTransport};

pub const CONTROLLER: Address = address!("6b2e0facd2f2a8f407ac591067ac06b5d29247e4");
pub const ANNOUNCER: Address = address!("f62f6ba38ff6974429d001dbc7911453870227bf");
pub const BOOKKEEPER: Address = address!("b8ba82f19a9be6cbf6daf9bf4fbcc5bdfcf8bee6");
pub const REWARD_TOKEN: Address = address!("4f851750a3e6f80f1e1f89c67b56960bfc29a934");
pub const READER: Address = address!("6e4d8cac827b52e7e67ae8f68531fafa36eaef0b");
pub const FUND_KEEPER: Address = address!("efbc16b8c973deca383aaabab07153d2eb676556");

/// 10^18
pub fn ether() -> U256 {
    U256::from(10u64).pow(U256::from(18))
}

pub fn core_addresses() -> CoreAddresses {
    CoreAddresses {
        controller: CONTROLLER,
        announcer: ANNOUNCER,
        bookkeeper: BOOKKEEPER,
        reward_token: REWARD_TOKEN,
        reader: READER,
        fee_reward_forwarder: None,
        mint_helper: None,
        ps_vault: None,
        fund_keeper: Some(FUND_KEEPER),
        distributor: None,
        vault_controller: None,
    }
}

/// Chain answering view calls from canned responses
///
/// Lookup order: exact `(to, calldata)`, then `(to, selector)`, then selector.
#[derive(Default)]
pub struct FakeChain {
    exact: HashMap<(Address, Bytes), Result<Bytes, ChainError>>,
    by_target: HashMap<(Address, [u8; 4]), Result<Bytes, ChainError>>,
    by_selector: HashMap<[u8; 4], Result<Bytes, ChainError>>,
    receipts: HashMap<TxHash, TxReceipt>,
    blocks: HashMap<u64, Vec<BlockTx>>,
    transactions: HashMap<TxHash, ObservedTx>,
    replays: HashMap<TxHash, Replay>,
    receipt_failures: AtomicU32,
    pub calls: Mutex<Vec<(Address, Bytes, Option<u64>)>>,
    pub receipt_requests: AtomicU32,
}

impl FakeChain {
    pub fn with_return(mut self, selector: [u8; 4], value: impl SolValue) -> Self {
        self.by_selector.insert(selector, Ok(Bytes::from(value.abi_encode())));
        self
    }

    pub fn with_return_at(mut self, to: Address, selector: [u8; 4], value: impl SolValue) -> Self {
        self.by_target.insert((to, selector), Ok(Bytes::from(value.abi_encode())));
        self
    }

    pub fn with_exact(mut self, to: Address, input: Vec<u8>, value: impl SolValue) -> Self {
        self.exact.insert((to, Bytes::from(input)), Ok(Bytes::from(value.abi_encode())));
        self
    }

    pub fn with_uint(self, selector: [u8; 4], value: U256) -> Self {
        self.with_return(selector, value)
    }

    pub fn with_error(mut self, selector: [u8; 4], error: ChainError) -> Self {
        self.by_selector.insert(selector, Err(error));
        self
    }

    pub fn with_error_at(mut self, to: Address, selector: [u8; 4], error: ChainError) -> Self {
        self.by_target.insert((to, selector), Err(error));
        self
    }

    pub fn with_receipt(mut self, receipt: TxReceipt) -> Self {
        self.receipts.insert(receipt.transaction_hash, receipt);
        self
    }

    /// First `count` receipt requests fail with an RPC error
    pub fn with_receipt_failures(self, count: u32) -> Self {
        self.receipt_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_block(mut self, number: u64, txs: Vec<ObservedTx>) -> Self {
        self.blocks.insert(number, txs.into_iter().map(BlockTx::Full).collect());
        self
    }

    /// Block whose body lists only hashes; `known` bodies are served by hash
    pub fn with_hash_only_block(mut self, number: u64, hashes: Vec<TxHash>, known: Vec<ObservedTx>) -> Self {
        self.blocks.insert(number, hashes.into_iter().map(BlockTx::Hash).collect());
        self.transactions.extend(known.into_iter().map(|tx| (tx.hash, tx)));
        self
    }

    pub fn with_replay(mut self, hash: TxHash, replay: Replay) -> Self {
        self.replays.insert(hash, replay);
        self
    }

    pub fn recorded_calls(&self) -> Vec<(Address, Bytes, Option<u64>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.blocks.keys().copied().max().unwrap_or_default())
    }

    async fn call(&self, to: Address, input: Bytes, block: Option<u64>) -> Result<Bytes, ChainError> {
        self.calls.lock().unwrap().push((to, input.clone(), block));
        let mut selector = [0u8; 4];
        if input.len() >= 4 {
            selector.copy_from_slice(&input[..4]);
        }
        self.exact
            .get(&(to, input))
            .or_else(|| self.by_target.get(&(to, selector)))
            .or_else(|| self.by_selector.get(&selector))
            .cloned()
            .unwrap_or_else(|| {
                Err(ChainError::Reverted {
                    to,
                    reason: format!("no canned response for 0x{}", hex::encode(selector)),
                })
            })
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<TxReceipt>, ChainError> {
        self.receipt_requests.fetch_add(1, Ordering::SeqCst);
        let failures = self.receipt_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.receipt_failures.store(failures - 1, Ordering::SeqCst);
            return Err(ChainError::Rpc("header not found".to_string()));
        }
        Ok(self.receipts.get(&hash).cloned())
    }

    async fn transaction(&self, hash: TxHash) -> Result<Option<ObservedTx>, ChainError> {
        Ok(self.transactions.get(&hash).cloned())
    }

    async fn block_transactions(&self, number: u64) -> Result<Vec<BlockTx>, ChainError> {
        self.blocks.get(&number).cloned().ok_or(ChainError::BlockNotFound(number))
    }

    async fn replay(&self, tx: &ObservedTx) -> Result<Replay, ChainError> {
        Ok(self
            .replays
            .get(&tx.hash)
            .cloned()
            .unwrap_or_else(|| Replay::Success(Bytes::new())))
    }
}

/// Explorer stand-in with fixed names
#[derive(Default)]
pub struct StaticNames(pub HashMap<Address, String>);

#[async_trait]
impl ContractNameSource for StaticNames {
    async fn contract_name(&self, address: Address) -> Result<Option<String>, ExplorerError> {
        Ok(self.0.get(&address).cloned())
    }
}

/// Transport that keeps every payload
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(String, WebhookPayload)>>,
    pub fail: AtomicBool,
}

impl RecordingTransport {
    pub fn payloads(&self) -> Vec<WebhookPayload> {
        self.sent.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn urls(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
    }

    /// Field value of the only sent embed
    pub fn single_body(&self) -> String {
        let payloads = self.payloads();
        assert_eq!(payloads.len(), 1, "expected exactly one payload");
        payloads[0].embeds[0].fields[0].value.clone()
    }
}

#[async_trait]
impl WebhookTransport for RecordingTransport {
    async fn post(&self, url: &str, payload: &WebhookPayload) -> Result<(), SinkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SinkError::Transport("connection refused".to_string()));
        }
        self.sent.lock().unwrap().push((url.to_string(), payload.clone()));
        Ok(())
    }
}

pub fn test_config() -> RelayConfig {
    let mut config = RelayConfig::for_network(Network::Matic, "http://localhost:8545");
    for kind in ChannelKind::ALL {
        config
            .webhooks
            .insert(kind, format!("https://discord.test/{:?}", kind));
    }
    config.sink_min_interval = Duration::from_millis(1);
    config.user_action_retry_delay = Duration::from_millis(1);
    config.poll_interval = Duration::from_millis(1);
    config
}

/// Handler context over fakes, plus handles to inspect them
pub struct Harness {
    pub ctx: Arc<HandlerContext>,
    pub chain: Arc<FakeChain>,
    pub transport: Arc<RecordingTransport>,
}

pub fn harness(chain: FakeChain) -> Harness {
    harness_with(chain, StaticNames::default(), test_config())
}

pub fn harness_with(chain: FakeChain, names: StaticNames, config: RelayConfig) -> Harness {
    let chain = Arc::new(chain);
    let transport = Arc::new(RecordingTransport::default());
    let config = Arc::new(config);
    let sink = Arc::new(Sink::new(
        transport.clone(),
        config.webhooks.clone(),
        config.network.scan_url(),
        Arc::new(RateLimiter::new(config.sink_min_interval)),
    ));
    let metadata = MetadataResolver::new(chain.clone(), Arc::new(names));
    let ctx = Arc::new(HandlerContext::new(
        chain.clone(),
        metadata,
        sink,
        core_addresses(),
        config,
    ));
    Harness { ctx, chain, transport }
}

//! Failed-Transaction Watcher
//!
//! Scans every new block for failed transactions sent from or to a watched
//! address, replays them to recover the revert reason and reports them to
//! the error channel.

use std::collections::HashSet;
use std::sync::Arc;

use alloy::primitives::Address;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::chain::{BlockTx, ChainError, ChainReader, ObservedTx, Replay, TxReceipt};
use crate::contracts::{call_view, IBookkeeper};
use crate::decoder::decode_revert_reason;
use crate::handlers::{HandlerContext, HandlerError};
use crate::metadata::Resolved;
use crate::notification::{ChannelKind, Notification};
use crate::registry::CoreAddresses;

/// Receipt lookups per candidate before giving up
pub const RECEIPT_POLL_ATTEMPTS: u32 = 5;

/// Reason reported when none can be recovered
pub const UNKNOWN_REASON: &str = "unknown";

/// Addresses whose failed transactions are reported
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchList {
    addresses: HashSet<Address>,
}

impl WatchList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry addresses plus every vault known to the bookkeeper
    pub async fn build(core: &CoreAddresses, chain: &dyn ChainReader) -> Result<Self, ChainError> {
        let mut list = Self::new();
        list.extend(core.labelled().into_iter().map(|(_, address)| address));

        let vaults = call_view(chain, core.bookkeeper, IBookkeeper::vaultsCall {}, None)
            .await?
            ._0;
        info!(vaults = vaults.len(), "Loaded vaults into watch list");
        list.extend(vaults);
        Ok(list)
    }

    /// Returns true if the address was not watched yet
    pub fn insert(&mut self, address: Address) -> bool {
        self.addresses.insert(address)
    }

    pub fn extend(&mut self, addresses: impl IntoIterator<Item = Address>) {
        self.addresses.extend(addresses);
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.addresses.contains(address)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Either side of the transaction is watched
    pub fn touches(&self, tx: &ObservedTx) -> bool {
        self.contains(&tx.from) || tx.to.is_some_and(|to| self.contains(&to))
    }
}

impl FromIterator<Address> for WatchList {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        Self {
            addresses: iter.into_iter().collect(),
        }
    }
}

/// Reason carried by a replay outcome
///
/// Prefers the decoded revert payload, then the node's message.
pub fn replay_reason(replay: &Replay) -> String {
    match replay {
        Replay::Success(_) => UNKNOWN_REASON.to_string(),
        Replay::Reverted { data, message } => data
            .as_ref()
            .and_then(|d| decode_revert_reason(d))
            .or_else(|| {
                let message = message.trim();
                (!message.is_empty()).then(|| message.to_string())
            })
            .unwrap_or_else(|| UNKNOWN_REASON.to_string()),
    }
}

pub struct FailedTxWatcher {
    ctx: Arc<HandlerContext>,
    watch_list: Arc<RwLock<WatchList>>,
}

impl FailedTxWatcher {
    pub fn new(ctx: Arc<HandlerContext>, watch_list: Arc<RwLock<WatchList>>) -> Self {
        Self { ctx, watch_list }
    }

    pub fn watch_list(&self) -> Arc<RwLock<WatchList>> {
        self.watch_list.clone()
    }

    /// Check every transaction of a block
    ///
    /// Per-transaction faults are logged and do not stop the scan.
    ///
    /// # Returns
    /// Number of error notifications sent
    pub async fn handle_block(&self, number: u64) -> Result<usize, HandlerError> {
        let entries = self.ctx.chain.block_transactions(number).await?;
        debug!(block = number, txs = entries.len(), "Scanning block");

        let mut reported = 0;
        for entry in entries {
            let hash = match &entry {
                BlockTx::Full(tx) => tx.hash,
                BlockTx::Hash(hash) => *hash,
            };
            match self.handle_entry(entry).await {
                Ok(true) => reported += 1,
                Ok(false) => {}
                Err(e) => error!(block = number, tx = %hash, "Failed to check transaction: {}", e),
            }
        }
        Ok(reported)
    }

    /// Check a block entry, fetching the body when only the hash is known
    async fn handle_entry(&self, entry: BlockTx) -> Result<bool, HandlerError> {
        let tx = match entry {
            BlockTx::Full(tx) => tx,
            BlockTx::Hash(hash) => match self.ctx.chain.transaction(hash).await? {
                Some(tx) => tx,
                None => {
                    warn!(tx = %hash, "Transaction body not available, skipping");
                    return Ok(false);
                }
            },
        };
        self.handle_tx(&tx).await
    }

    /// Report one transaction if it touched the watch list and failed
    pub async fn handle_tx(&self, tx: &ObservedTx) -> Result<bool, HandlerError> {
        if !self.watch_list.read().await.touches(tx) {
            return Ok(false);
        }

        let Some(receipt) = self.await_receipt(tx).await? else {
            warn!(tx = %tx.hash, "Receipt not available, skipping");
            return Ok(false);
        };
        if receipt.status {
            return Ok(false);
        }

        let replay = self.ctx.chain.replay(tx).await?;
        if matches!(replay, Replay::Success(_)) {
            debug!(tx = %tx.hash, "Replay succeeded for a failed transaction");
        }
        let reason = replay_reason(&replay);

        let contract_name = match tx.to {
            Some(to) => self.ctx.metadata.resolve_contract_name(to).await,
            None => Resolved::Unknown,
        };
        let core = &self.ctx.core;
        let to_label = match &tx.to {
            Some(to) => core.resolve_name(to),
            None => "contract creation".to_string(),
        };

        let name = format!("{} error: {}", contract_name.name_or_sentinel(), reason);
        let body = format!("From {} to {}", core.resolve_name(&tx.from), to_label);
        info!(tx = %tx.hash, "{} | {}", name, body);

        let notification = Notification::new(
            ChannelKind::Error,
            Some(receipt.transaction_hash),
            self.ctx.title("Error"),
            name,
            body,
        );
        self.ctx.deliver(notification).await
    }

    /// Poll for the receipt a bounded number of times
    async fn await_receipt(&self, tx: &ObservedTx) -> Result<Option<TxReceipt>, HandlerError> {
        for attempt in 1..=RECEIPT_POLL_ATTEMPTS {
            if let Some(receipt) = self.ctx.chain.transaction_receipt(tx.hash).await? {
                return Ok(Some(receipt));
            }
            if attempt < RECEIPT_POLL_ATTEMPTS {
                tokio::time::sleep(self.ctx.config.poll_interval).await;
            }
        }
        Ok(None)
    }
}

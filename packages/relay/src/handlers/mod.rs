//! Event Handlers
//!
//! One handler per contract family. Each typed `handle_*` method enriches an
//! event with chain reads, formats a [`Notification`] and hands it to the
//! sink.
//!
//! Return convention: `Ok(true)` once a notification was sent, `Ok(false)`
//! when a precondition failed (logged), `Err` for RPC or transport faults.

pub mod announcer;
pub mod bookkeeper;
pub mod controller;
pub mod splitter;

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use thiserror::Error;
use tracing::warn;

use crate::chain::{ChainError, ChainReader, TxReceipt};
use crate::config::RelayConfig;
use crate::contracts::{call_view, IErc20, ITetuToken};
use crate::decoder::{DecodeError, RawEvent};
use crate::format::{address_link, format_integer, units_to_f64};
use crate::metadata::MetadataResolver;
use crate::notification::Notification;
use crate::registry::CoreAddresses;
use crate::sink::{Sink, SinkError};

pub use announcer::AnnouncerHandler;
pub use bookkeeper::{BookkeeperHandler, EarnedReport, UserActionReport};
pub use controller::ControllerHandler;
pub use splitter::SplitterHandler;

/// Decimals of the reward token
pub const REWARD_TOKEN_DECIMALS: u8 = 18;

/// Errors that abort a handler
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Event {0} is not handled here")]
    Unroutable(&'static str),
}

/// Dependencies shared by every handler
pub struct HandlerContext {
    pub chain: Arc<dyn ChainReader>,
    pub metadata: MetadataResolver,
    pub sink: Arc<Sink>,
    pub core: CoreAddresses,
    pub config: Arc<RelayConfig>,
}

impl HandlerContext {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        metadata: MetadataResolver,
        sink: Arc<Sink>,
        core: CoreAddresses,
        config: Arc<RelayConfig>,
    ) -> Self {
        Self {
            chain,
            metadata,
            sink,
            core,
            config,
        }
    }

    pub fn network(&self) -> &'static str {
        self.config.network.name()
    }

    pub fn scan_url(&self) -> &'static str {
        self.config.network.scan_url()
    }

    /// `"<prefix> on <network>"`
    pub fn title(&self, prefix: &str) -> String {
        format!("{} on {}", prefix, self.network())
    }

    /// Explorer link of an address
    pub fn link(&self, address: &Address, label: Option<&str>) -> String {
        address_link(self.scan_url(), address, label)
    }

    /// Explorer link followed by the contract's version
    pub async fn link_with_version(&self, address: &Address, label: Option<&str>) -> String {
        let version = self.metadata.resolve_version(*address).await;
        format!("{} v{}", self.link(address, label), version.version_or_sentinel())
    }

    /// ERC20 `name()`; vault names come through here
    pub async fn token_name(&self, token: Address) -> Result<String, HandlerError> {
        Ok(call_view(self.chain.as_ref(), token, IErc20::nameCall {}, None).await?._0)
    }

    pub async fn token_symbol(&self, token: Address) -> Result<String, HandlerError> {
        Ok(call_view(self.chain.as_ref(), token, IErc20::symbolCall {}, None).await?._0)
    }

    pub async fn token_decimals(&self, token: Address) -> Result<u8, HandlerError> {
        Ok(call_view(self.chain.as_ref(), token, IErc20::decimalsCall {}, None).await?._0)
    }

    /// Hand a notification to the sink
    pub async fn deliver(&self, notification: Notification) -> Result<bool, HandlerError> {
        self.sink.send(&notification).await?;
        Ok(true)
    }

    /// Mint amount in whole reward tokens, and whether it is the max available
    ///
    /// A zero amount means "mint everything available"; the amount is then
    /// `maxTotalSupplyForCurrentBlock - totalSupply` at `block`.
    pub async fn mint_amount(&self, amount: U256, block: Option<u64>) -> Result<(f64, bool), HandlerError> {
        if !amount.is_zero() {
            return Ok((units_to_f64(amount, REWARD_TOKEN_DECIMALS), false));
        }
        let token = self.core.reward_token;
        let supply = call_view(self.chain.as_ref(), token, IErc20::totalSupplyCall {}, block).await?._0;
        let max_supply = call_view(
            self.chain.as_ref(),
            token,
            ITetuToken::maxTotalSupplyForCurrentBlockCall {},
            block,
        )
        .await?
        ._0;
        let available = max_supply.saturating_sub(supply);
        Ok((units_to_f64(available, REWARD_TOKEN_DECIMALS), true))
    }

    /// Split lines of a mint between FundKeeper, Distributor and DevFund
    pub fn mint_split(&self, amount: f64, fund_keeper: &Address, distributor: &Address) -> String {
        let mut value = String::new();
        value += &format!(
            "To {} {} (67%)\n",
            self.link(fund_keeper, Some("FundKeeper")),
            format_integer(amount * 0.67)
        );
        value += &format!(
            "To {} {} (23.1%)\n",
            self.link(distributor, Some("Distributor")),
            format_integer(amount * 0.231)
        );
        value += &format!("To DevFund {} (9.9%)\n", format_integer(amount * 0.099));
        value
    }
}

/// Shared precondition of receipt-driven handlers
pub(crate) fn usable_receipt<'a>(event: &RawEvent, receipt: Option<&'a TxReceipt>) -> Option<&'a TxReceipt> {
    match receipt {
        None => {
            warn!(event = event.kind.name(), tx = ?event.transaction_hash, "Receipt not found");
            None
        }
        Some(r) if !r.status => {
            warn!(event = event.kind.name(), tx = %r.transaction_hash, "Wrong receipt status");
            None
        }
        Some(r) => Some(r),
    }
}

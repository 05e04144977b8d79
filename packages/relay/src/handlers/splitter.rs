//! Splitter sub-strategy changes.

use std::sync::Arc;

use alloy::primitives::Address;
use tracing::{info, warn};

use super::{usable_receipt, HandlerContext, HandlerError};
use crate::chain::TxReceipt;
use crate::contracts::{call_view, IController, IStrategy};
use crate::decoder::RawEvent;
use crate::notification::{ChannelKind, Notification};
use crate::signatures::EventKind;

pub struct SplitterHandler {
    ctx: Arc<HandlerContext>,
}

impl SplitterHandler {
    pub fn new(ctx: Arc<HandlerContext>) -> Self {
        Self { ctx }
    }

    /// The emitting log address is the splitter
    pub async fn handle_event(&self, event: &RawEvent, receipt: Option<&TxReceipt>) -> Result<bool, HandlerError> {
        let Some(receipt) = usable_receipt(event, receipt) else {
            return Ok(false);
        };
        let sub_strategy = event.args.address(0)?;
        match event.kind {
            EventKind::StrategyAdded => self.handle_strategy_added(event.emitter, sub_strategy, receipt).await,
            EventKind::StrategyRemoved => {
                self.handle_strategy_removed(event.emitter, sub_strategy, receipt)
                    .await
            }
            other => Err(HandlerError::Unroutable(other.name())),
        }
    }

    pub async fn handle_strategy_added(
        &self,
        splitter: Address,
        sub_strategy: Address,
        receipt: &TxReceipt,
    ) -> Result<bool, HandlerError> {
        self.report(splitter, sub_strategy, true, receipt).await
    }

    pub async fn handle_strategy_removed(
        &self,
        splitter: Address,
        sub_strategy: Address,
        receipt: &TxReceipt,
    ) -> Result<bool, HandlerError> {
        self.report(splitter, sub_strategy, false, receipt).await
    }

    /// The splitter subscription is chain-wide, so any contract can emit a
    /// matching event. Only splitters of a controller-registered vault count.
    async fn report(
        &self,
        splitter: Address,
        sub_strategy: Address,
        added: bool,
        receipt: &TxReceipt,
    ) -> Result<bool, HandlerError> {
        let vault = call_view(self.ctx.chain.as_ref(), splitter, IStrategy::vaultCall {}, None)
            .await?
            ._0;
        let registered = call_view(
            self.ctx.chain.as_ref(),
            self.ctx.core.controller,
            IController::isValidVaultCall { vault },
            None,
        )
        .await?
        ._0;
        if !registered {
            warn!(tx = %receipt.transaction_hash, %splitter, %vault, "Splitter event for unregistered vault, ignoring");
            return Ok(false);
        }
        let vault_name = self.ctx.token_name(vault).await?;
        let sub_name = self.ctx.metadata.resolve_strategy_name(sub_strategy).await;

        let action = if added { "added new" } else { "removed" };
        info!(
            tx = %receipt.transaction_hash,
            %splitter,
            %vault,
            "Sub strategy {} {} {}",
            sub_strategy,
            action,
            vault_name
        );

        let notification = Notification::new(
            ChannelKind::ImportantMessage,
            Some(receipt.transaction_hash),
            self.ctx.title(&format!("{} {} sub strategy", vault_name, action)),
            format!("Strategy type: {}", sub_name.name_or_sentinel()),
            format!("Strategy name: {}", sub_strategy.to_checksum(None)),
        );
        self.ctx.deliver(notification).await
    }
}

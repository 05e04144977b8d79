//! Time-lock announcements
//!
//! Every governance change goes through the announcer first and can be
//! executed once the time lock has passed.

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use tracing::{error, info};

use super::{usable_receipt, HandlerContext, HandlerError};
use crate::chain::TxReceipt;
use crate::contracts::{call_view, IAnnouncer, IProxy, ISmartVault};
use crate::decoder::RawEvent;
use crate::format::{
    format_integer, format_ratio, format_raw_amount, format_token_amount, format_vault_name, op_code_label,
    TIME_LOCK_DELAY_TEXT,
};
use crate::notification::{ChannelKind, Notification};
use crate::signatures::EventKind;

pub struct AnnouncerHandler {
    ctx: Arc<HandlerContext>,
    scan_bound: Option<(B256, u64)>,
}

impl AnnouncerHandler {
    pub fn new(ctx: Arc<HandlerContext>) -> Self {
        Self { ctx, scan_bound: None }
    }

    /// Scan only the first `length` time-lock records when closing `op_hash`
    pub fn with_time_lock_scan_bound(mut self, op_hash: B256, length: u64) -> Self {
        self.scan_bound = Some((op_hash, length));
        self
    }

    /// Route a decoded announcer event to its typed handler
    pub async fn handle_event(&self, event: &RawEvent, receipt: Option<&TxReceipt>) -> Result<bool, HandlerError> {
        let Some(receipt) = usable_receipt(event, receipt) else {
            return Ok(false);
        };
        let args = &event.args;
        match event.kind {
            EventKind::AddressChangeAnnounce => {
                self.handle_address_change(args.u8(0)?, args.address(1)?, receipt).await
            }
            EventKind::UintChangeAnnounce => self.handle_uint_change(args.u8(0)?, args.uint(1)?, receipt).await,
            EventKind::RatioChangeAnnounced => {
                self.handle_ratio_change(args.u8(0)?, args.uint(1)?, args.uint(2)?, receipt)
                    .await
            }
            EventKind::TokenMoveAnnounced => {
                self.handle_token_move(args.u8(0)?, args.address(1)?, args.address(2)?, args.uint(3)?, receipt)
                    .await
            }
            EventKind::ProxyUpgradeAnnounced => {
                self.handle_proxy_upgrade(args.address(0)?, args.address(1)?, receipt).await
            }
            EventKind::MintAnnounced => {
                self.handle_mint(args.uint(0)?, args.address(1)?, args.address(2)?, receipt)
                    .await
            }
            EventKind::AnnounceClosed => self.handle_close(args.word(0)?, receipt).await,
            EventKind::StrategyUpgradeAnnounced => {
                self.handle_strategy_upgrade(args.address(0)?, args.address(1)?, receipt)
                    .await
            }
            EventKind::VaultStop => self.handle_vault_stop(args.address(0)?, receipt).await,
            other => Err(HandlerError::Unroutable(other.name())),
        }
    }

    fn announce(&self, receipt: &TxReceipt, title: &str, name: String, value: String) -> Notification {
        info!(tx = %receipt.transaction_hash, "{} | {} | {}", title, name, value);
        Notification::new(
            ChannelKind::Announcement,
            Some(receipt.transaction_hash),
            self.ctx.title(title),
            name,
            value,
        )
    }

    pub async fn handle_address_change(
        &self,
        op_code: u8,
        new_address: Address,
        receipt: &TxReceipt,
    ) -> Result<bool, HandlerError> {
        let name = format!(
            "{} address will be able to change {}",
            op_code_label(op_code),
            TIME_LOCK_DELAY_TEXT
        );
        let value = self.ctx.link(&new_address, Some("New Address"));
        self.ctx
            .deliver(self.announce(receipt, "Announce address change", name, value))
            .await
    }

    pub async fn handle_uint_change(&self, op_code: u8, new_value: U256, receipt: &TxReceipt) -> Result<bool, HandlerError> {
        let name = format!(
            "{} value will be able to change {}",
            op_code_label(op_code),
            TIME_LOCK_DELAY_TEXT
        );
        let value = format!("New value is {}", new_value);
        self.ctx
            .deliver(self.announce(receipt, "Announce value change", name, value))
            .await
    }

    pub async fn handle_ratio_change(
        &self,
        op_code: u8,
        numerator: U256,
        denominator: U256,
        receipt: &TxReceipt,
    ) -> Result<bool, HandlerError> {
        let name = format!(
            "{} ratio will be able to change {}",
            op_code_label(op_code),
            TIME_LOCK_DELAY_TEXT
        );
        let value = format!("New ratio is {}", format_ratio(numerator, denominator));
        self.ctx
            .deliver(self.announce(receipt, "Announce ratio change", name, value))
            .await
    }

    pub async fn handle_token_move(
        &self,
        op_code: u8,
        target: Address,
        token: Address,
        amount: U256,
        receipt: &TxReceipt,
    ) -> Result<bool, HandlerError> {
        let decimals = self.ctx.token_decimals(token).await?;
        let symbol = self.ctx.token_symbol(token).await?;
        let name = format!(
            "{} will be able to proceed {}",
            op_code_label(op_code),
            TIME_LOCK_DELAY_TEXT
        );
        let value = format!(
            "{} {} will be transferred to {}\nRaw amount: {}",
            format_token_amount(amount, decimals),
            self.ctx.link(&token, Some(&symbol)),
            self.ctx.link(&target, None),
            format_raw_amount(amount)
        );
        self.ctx
            .deliver(self.announce(receipt, "Announce token transfer", name, value))
            .await
    }

    pub async fn handle_proxy_upgrade(
        &self,
        proxy: Address,
        implementation: Address,
        receipt: &TxReceipt,
    ) -> Result<bool, HandlerError> {
        let current = call_view(self.ctx.chain.as_ref(), proxy, IProxy::implementationCall {}, None)
            .await?
            ._0;
        let contract_name = self.ctx.metadata.resolve_contract_name(current).await;
        let name = format!(
            "{} Proxy will be able to upgrade {}",
            contract_name.name_or_sentinel(),
            TIME_LOCK_DELAY_TEXT
        );
        let value = format!(
            "Proxy contract {} with current logic {} will have new logic implementation {}",
            self.ctx.link(&proxy, None),
            self.ctx.link_with_version(&current, None).await,
            self.ctx.link_with_version(&implementation, None).await
        );
        self.ctx
            .deliver(self.announce(receipt, "Announce proxy contract upgrade", name, value))
            .await
    }

    pub async fn handle_mint(
        &self,
        total_amount: U256,
        distributor: Address,
        other_network_fund: Address,
        receipt: &TxReceipt,
    ) -> Result<bool, HandlerError> {
        let (amount, max_available) = self.ctx.mint_amount(total_amount, None).await?;
        let marker = if max_available { " (max available)" } else { "" };
        let name = format!(
            "Mint {}{} TETU tokens will be able to proceed {}",
            format_integer(amount),
            marker,
            TIME_LOCK_DELAY_TEXT
        );

        let mut value = String::new();
        if max_available {
            value += "Will be minted max available tokens at the time of the future call. \
                      The following numbers are based on the currently available values.\n";
        }
        value += &self.ctx.mint_split(amount, &other_network_fund, &distributor);

        self.ctx
            .deliver(self.announce(receipt, "Announce TETU mint", name, value))
            .await
    }

    /// Report a cancelled announcement
    ///
    /// The announcer only keeps an append-only list of time-lock records, so
    /// the closed one is found by scanning backwards for its op hash.
    pub async fn handle_close(&self, op_hash: B256, receipt: &TxReceipt) -> Result<bool, HandlerError> {
        let announcer = self.ctx.core.announcer;
        let length = match self.scan_bound {
            Some((hash, bound)) if hash == op_hash => bound,
            _ => call_view(self.ctx.chain.as_ref(), announcer, IAnnouncer::timeLockInfosLengthCall {}, None)
                .await?
                ._0
                .saturating_to::<u64>(),
        };

        let mut found = None;
        for idx in (0..length).rev() {
            let info = call_view(
                self.ctx.chain.as_ref(),
                announcer,
                IAnnouncer::timeLockInfoCall { idx: U256::from(idx) },
                None,
            )
            .await?
            ._0;
            if info.opHash == op_hash {
                found = Some(info);
                break;
            }
        }

        let Some(info) = found else {
            error!(tx = %receipt.transaction_hash, op_hash = %op_hash, "Announce not found");
            return Ok(false);
        };

        let name = format!("{} closed and no longer able to proceed", op_code_label(info.opCode));
        let addresses: Vec<String> = info.adrValues.iter().map(|a| a.to_checksum(None)).collect();
        let numbers: Vec<String> = info.numValues.iter().map(|n| n.to_string()).collect();
        let value = format!(
            "Target was {}\nAddress values was {}\nNumber values was {}\n",
            info.target.to_checksum(None),
            addresses.join(","),
            numbers.join(",")
        );
        self.ctx
            .deliver(self.announce(receipt, "Announce was closed", name, value))
            .await
    }

    pub async fn handle_strategy_upgrade(
        &self,
        vault: Address,
        strategy: Address,
        receipt: &TxReceipt,
    ) -> Result<bool, HandlerError> {
        let current = call_view(self.ctx.chain.as_ref(), vault, ISmartVault::strategyCall {}, None)
            .await?
            ._0;
        let vault_name = format_vault_name(&self.ctx.token_name(vault).await?);
        let current_name = self.ctx.metadata.resolve_strategy_name(current).await;
        let new_name = self.ctx.metadata.resolve_strategy_name(strategy).await;

        let name = format!(
            "{} vault will be able to upgrade strategy {}",
            vault_name, TIME_LOCK_DELAY_TEXT
        );
        let value = format!(
            "Vault {} with current strategy {} {} will be upgraded to {} {}",
            self.ctx.link_with_version(&vault, Some(&vault_name)).await,
            current_name.name_or_sentinel(),
            self.ctx.link_with_version(&current, None).await,
            new_name.name_or_sentinel(),
            self.ctx.link_with_version(&strategy, None).await
        );
        self.ctx
            .deliver(self.announce(receipt, "Announce strategy upgrade", name, value))
            .await
    }

    pub async fn handle_vault_stop(&self, vault: Address, receipt: &TxReceipt) -> Result<bool, HandlerError> {
        let vault_name = format_vault_name(&self.ctx.token_name(vault).await?);
        let name = format!("{} vault will be able to stop rewards {}", vault_name, TIME_LOCK_DELAY_TEXT);
        let mut value = format!("{}\n", self.ctx.link_with_version(&vault, Some(&vault_name)).await);
        value += "Stop rewards action is critical and will not be able to revert.\n";
        value += "All reward tokens will be moved to Controller contract and users will not able to claim earned rewards.\n";
        value += "It should be called only as part of the migration process and strongly not recommended for normal circumstances";
        self.ctx
            .deliver(self.announce(receipt, "Announce vault stop rewards", name, value))
            .await
    }
}

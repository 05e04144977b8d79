//! Controller events
//!
//! Executed governance actions. Everything here goes to the important
//! messages channel.

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use tracing::info;

use super::{usable_receipt, HandlerContext, HandlerError};
use crate::chain::TxReceipt;
use crate::decoder::RawEvent;
use crate::format::{format_integer, format_token_amount, format_vault_name, slot_name};
use crate::notification::{ChannelKind, Notification};
use crate::signatures::EventKind;

/// Which contract tokens were moved out of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMoveSource {
    Controller,
    Strategy,
    FundKeeper,
}

pub struct ControllerHandler {
    ctx: Arc<HandlerContext>,
}

impl ControllerHandler {
    pub fn new(ctx: Arc<HandlerContext>) -> Self {
        Self { ctx }
    }

    pub async fn handle_event(&self, event: &RawEvent, receipt: Option<&TxReceipt>) -> Result<bool, HandlerError> {
        let Some(receipt) = usable_receipt(event, receipt) else {
            return Ok(false);
        };
        let args = &event.args;
        match event.kind {
            EventKind::HardWorkerAdded => self.handle_hard_worker_added(args.address(0)?, receipt).await,
            EventKind::HardWorkerRemoved => self.handle_hard_worker_removed(args.address(0)?, receipt).await,
            EventKind::AddedToWhiteList => {
                self.handle_white_list_status_changed(args.address(0)?, true, receipt)
                    .await
            }
            EventKind::RemovedFromWhiteList => {
                self.handle_white_list_status_changed(args.address(0)?, false, receipt)
                    .await
            }
            EventKind::VaultAndStrategyAdded => {
                self.handle_vault_and_strategy_added(args.address(0)?, args.address(1)?, receipt)
                    .await
            }
            EventKind::ControllerTokenMoved => {
                self.handle_token_moved(
                    TokenMoveSource::Controller,
                    args.address(0)?,
                    args.address(1)?,
                    args.uint(2)?,
                    receipt,
                )
                .await
            }
            EventKind::StrategyTokenMoved => {
                self.handle_token_moved(
                    TokenMoveSource::Strategy,
                    args.address(0)?,
                    args.address(1)?,
                    args.uint(2)?,
                    receipt,
                )
                .await
            }
            EventKind::FundKeeperTokenMoved => {
                self.handle_token_moved(
                    TokenMoveSource::FundKeeper,
                    args.address(0)?,
                    args.address(1)?,
                    args.uint(2)?,
                    receipt,
                )
                .await
            }
            EventKind::UpdatedAddressSlot => {
                self.handle_updated_address_slot(args.word(0)?, args.address(1)?, args.address(2)?, receipt)
                    .await
            }
            EventKind::UpdatedUint256Slot => {
                self.handle_updated_uint_slot(args.word(0)?, args.uint(1)?, args.uint(2)?, receipt)
                    .await
            }
            EventKind::VaultStrategyChanged => {
                self.handle_vault_strategy_changed(args.address(0)?, args.address(1)?, args.address(2)?, receipt)
                    .await
            }
            EventKind::ProxyUpgraded => {
                self.handle_proxy_upgraded(args.address(0)?, args.address(1)?, args.address(2)?, receipt)
                    .await
            }
            EventKind::Minted => {
                self.handle_minted(
                    args.address(0)?,
                    args.uint(1)?,
                    args.address(2)?,
                    args.address(3)?,
                    args.boolean(4)?,
                    receipt,
                )
                .await
            }
            EventKind::DistributorChanged => self.handle_distributor_changed(args.address(0)?, receipt).await,
            other => Err(HandlerError::Unroutable(other.name())),
        }
    }

    async fn important(&self, receipt: &TxReceipt, title: &str, name: String, value: String) -> Result<bool, HandlerError> {
        info!(tx = %receipt.transaction_hash, "{} | {} | {}", title, name, value);
        let notification = Notification::new(
            ChannelKind::ImportantMessage,
            Some(receipt.transaction_hash),
            self.ctx.title(title),
            name,
            value,
        );
        self.ctx.deliver(notification).await
    }

    pub async fn handle_hard_worker_added(&self, worker: Address, receipt: &TxReceipt) -> Result<bool, HandlerError> {
        let value = format!(
            "Address {} was added as HardWorker\n\
             Now this EOA/contract able to call some non critical functions such as doHardWork()",
            self.ctx.link(&worker, None)
        );
        self.important(receipt, "HardWorker added", "New HardWorker!".to_string(), value)
            .await
    }

    pub async fn handle_hard_worker_removed(&self, worker: Address, receipt: &TxReceipt) -> Result<bool, HandlerError> {
        let value = format!("Address {} was removed from HardWorkers", self.ctx.link(&worker, None));
        self.important(receipt, "HardWorker removed", "HardWorker removed".to_string(), value)
            .await
    }

    pub async fn handle_white_list_status_changed(
        &self,
        target: Address,
        added: bool,
        receipt: &TxReceipt,
    ) -> Result<bool, HandlerError> {
        let link = self.ctx.link(&target, None);
        let (name, value) = if added {
            (
                "Added to WhiteList",
                format!(
                    "Address {} was added to whitelisted\n\
                     Now this contract is able to interact with Tetu vaults. No more privileges",
                    link
                ),
            )
        } else {
            ("Removed from WhiteList", format!("Address {} was removed from whitelisted", link))
        };
        self.important(receipt, "Address whitelist status changed", name.to_string(), value)
            .await
    }

    pub async fn handle_vault_and_strategy_added(
        &self,
        vault: Address,
        strategy: Address,
        receipt: &TxReceipt,
    ) -> Result<bool, HandlerError> {
        let vault_name = format_vault_name(&self.ctx.token_name(vault).await?);
        let strategy_name = self.ctx.metadata.resolve_strategy_name(strategy).await;
        let strategy_name = strategy_name.name_or_sentinel();

        let name = format!("New Vault {} with strategy {}", vault_name, strategy_name);
        let value = format!(
            "New Vault {} with Strategy {} was registered",
            self.ctx.link_with_version(&vault, Some(&vault_name)).await,
            self.ctx.link_with_version(&strategy, Some(strategy_name)).await
        );
        self.important(receipt, "Vault with Strategy registered", name, value)
            .await
    }

    /// Tokens moved out of the controller, a strategy or the fund keeper
    ///
    /// `holder` is the recipient for controller moves and the source
    /// contract otherwise.
    pub async fn handle_token_moved(
        &self,
        source: TokenMoveSource,
        holder: Address,
        token: Address,
        amount: U256,
        receipt: &TxReceipt,
    ) -> Result<bool, HandlerError> {
        let symbol = self.ctx.token_symbol(token).await?;
        let decimals = self.ctx.token_decimals(token).await?;
        let amount = format_token_amount(amount, decimals);
        let holder_link = self.ctx.link(&holder, None);

        match source {
            TokenMoveSource::Controller => {
                let value = format!(
                    "{} {} was transferred to {}",
                    self.ctx.link(&token, Some(&symbol)),
                    amount,
                    holder_link
                );
                self.important(
                    receipt,
                    "Tokens was transferred from Controller",
                    "Controller token moved".to_string(),
                    value,
                )
                .await
            }
            TokenMoveSource::Strategy => {
                let value = format!(
                    "{} {} was transferred from {}",
                    self.ctx.link(&token, Some(&symbol)),
                    amount,
                    holder_link
                );
                self.important(
                    receipt,
                    "Tokens was transferred from Strategy",
                    "Strategy token moved".to_string(),
                    value,
                )
                .await
            }
            TokenMoveSource::FundKeeper => {
                let name = format!("{} {} was transferred from {}", symbol, amount, holder_link);
                self.important(receipt, "Tokens was transferred from FundKeeper", name, String::new())
                    .await
            }
        }
    }

    pub async fn handle_updated_address_slot(
        &self,
        name_hash: B256,
        old_value: Address,
        new_value: Address,
        receipt: &TxReceipt,
    ) -> Result<bool, HandlerError> {
        let value = format!(
            "{} was updated from {} to {}",
            slot_name(&name_hash),
            self.ctx.link(&old_value, None),
            self.ctx.link(&new_value, None)
        );
        self.important(
            receipt,
            "Controller Address variable was updated",
            "Address updated".to_string(),
            value,
        )
        .await
    }

    pub async fn handle_updated_uint_slot(
        &self,
        name_hash: B256,
        old_value: U256,
        new_value: U256,
        receipt: &TxReceipt,
    ) -> Result<bool, HandlerError> {
        let value = format!("{} was updated from {} to {}", slot_name(&name_hash), old_value, new_value);
        self.important(
            receipt,
            "Controller Number variable was updated",
            "Uint value updated".to_string(),
            value,
        )
        .await
    }

    pub async fn handle_vault_strategy_changed(
        &self,
        vault: Address,
        old_strategy: Address,
        new_strategy: Address,
        receipt: &TxReceipt,
    ) -> Result<bool, HandlerError> {
        let vault_name = format_vault_name(&self.ctx.token_name(vault).await?);
        let old_name = self.ctx.metadata.resolve_strategy_name(old_strategy).await;
        let new_name = self.ctx.metadata.resolve_strategy_name(new_strategy).await;

        let name = format!("Vault {} changed strategy to {}", vault_name, new_name.name_or_sentinel());
        let value = format!(
            "Vault {}\nOld strategy {}\nNew strategy {}\n",
            self.ctx.link_with_version(&vault, Some(&vault_name)).await,
            self.ctx
                .link_with_version(&old_strategy, Some(old_name.name_or_sentinel()))
                .await,
            self.ctx
                .link_with_version(&new_strategy, Some(new_name.name_or_sentinel()))
                .await
        );
        self.important(receipt, "Strategy changed", name, value).await
    }

    pub async fn handle_proxy_upgraded(
        &self,
        target: Address,
        old_logic: Address,
        new_logic: Address,
        receipt: &TxReceipt,
    ) -> Result<bool, HandlerError> {
        let contract_name = self.ctx.metadata.resolve_contract_name(old_logic).await;
        let contract_name = contract_name.name_or_sentinel();

        let name = format!("{} Proxy contract was upgraded", contract_name);
        let value = format!(
            "{} Proxy {}\nOld logic {}\nNew logic {}",
            contract_name,
            self.ctx.link(&target, None),
            self.ctx.link_with_version(&old_logic, None).await,
            self.ctx.link_with_version(&new_logic, None).await
        );
        self.important(receipt, "Proxy upgraded", name, value).await
    }

    /// Reward token mint
    ///
    /// A zero amount minted everything available; the amount is then
    /// recomputed at the block before the mint.
    pub async fn handle_minted(
        &self,
        mint_helper: Address,
        total_amount: U256,
        distributor: Address,
        other_network_fund: Address,
        mint_all_available: bool,
        receipt: &TxReceipt,
    ) -> Result<bool, HandlerError> {
        let block = receipt.block_number.saturating_sub(1);
        let (amount, max_available) = self.ctx.mint_amount(total_amount, Some(block)).await?;
        info!(
            tx = %receipt.transaction_hash,
            %mint_helper,
            mint_all_available,
            "Minted {} reward tokens",
            amount
        );

        let marker = if max_available { " (max available)" } else { "" };
        let name = format!("Minted {}{} TETU tokens", format_integer(amount), marker);
        let value = self.ctx.mint_split(amount, &other_network_fund, &distributor);
        self.important(receipt, "TETU was minted", name, value).await
    }

    pub async fn handle_distributor_changed(&self, distributor: Address, receipt: &TxReceipt) -> Result<bool, HandlerError> {
        let value = self.ctx.link(&distributor, Some("New distributor"));
        self.important(
            receipt,
            "Distributor address was changed",
            "Reward Distributor was changed".to_string(),
            value,
        )
        .await
    }
}

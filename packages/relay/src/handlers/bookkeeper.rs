//! Bookkeeper events: user deposits/withdrawals and strategy earnings.

use std::sync::Arc;

use alloy::primitives::{Address, TxHash, U256};
use tracing::{error, info, warn};

use super::{usable_receipt, HandlerContext, HandlerError, REWARD_TOKEN_DECIMALS};
use crate::chain::TxReceipt;
use crate::contracts::{call_view, IContractReader, IController, ISmartVault, IStrategy};
use crate::decoder::{find_log, RawEvent};
use crate::format::{earned_emoji, format_integer, format_vault_name, units_to_f64};
use crate::notification::{ChannelKind, Notification, DEPOSIT_COLOR, EARNED_COLOR, WITHDRAW_COLOR};
use crate::signatures::EventKind;

pub const MAX_RETRY: &str = "MAX RETRY";
pub const WRONG_STATUS: &str = "WRONG STATUS";
pub const INTERNAL_ACTION: &str = "INTERNAL ACTION";
pub const NOT_DIRECT_CALL: &str = "NOT DIRECT CALL ON VAULT";

/// Outcome of a user action, sent or not
#[derive(Debug, Clone, PartialEq)]
pub struct UserActionReport {
    pub deposit: bool,
    /// Pretty vault name, or one of the sentinels
    pub vault_name_pretty: String,
    /// Rounded USD notional, `"0"` for sentinels
    pub usd_value: String,
    pub transaction_hash: Option<TxHash>,
    pub sent: bool,
}

impl UserActionReport {
    fn sentinel(deposit: bool, reason: &str, transaction_hash: Option<TxHash>) -> Self {
        Self {
            deposit,
            vault_name_pretty: reason.to_string(),
            usd_value: "0".to_string(),
            transaction_hash,
            sent: false,
        }
    }
}

/// Outcome of a strategy earning, sent or not
#[derive(Debug, Clone, PartialEq)]
pub struct EarnedReport {
    pub vault_name_pretty: String,
    pub strategy_name: String,
    /// Earned reward tokens
    pub amount: f64,
    pub usd_value: f64,
    pub sent: bool,
}

pub struct BookkeeperHandler {
    ctx: Arc<HandlerContext>,
}

impl BookkeeperHandler {
    pub fn new(ctx: Arc<HandlerContext>) -> Self {
        Self { ctx }
    }

    pub async fn handle_event(&self, event: &RawEvent, receipt: Option<&TxReceipt>) -> Result<bool, HandlerError> {
        let args = &event.args;
        match event.kind {
            EventKind::UserAction => {
                let Some(hash) = event.transaction_hash else {
                    warn!("UserAction log without transaction hash");
                    return Ok(false);
                };
                let report = self
                    .handle_user_action(args.address(0)?, args.uint(1)?, args.boolean(2)?, hash)
                    .await?;
                Ok(report.sent)
            }
            EventKind::StrategyEarned => {
                let Some(receipt) = usable_receipt(event, receipt) else {
                    return Ok(false);
                };
                let report = self
                    .handle_strategy_earned(args.address(0)?, args.uint(1)?, receipt)
                    .await?;
                Ok(report.is_some_and(|r| r.sent))
            }
            other => Err(HandlerError::Unroutable(other.name())),
        }
    }

    /// Classify a deposit or withdrawal and report it when large enough
    ///
    /// The receipt is fetched by hash. A missing receipt or any chain fault
    /// restarts the whole sequence after a fixed delay; once the retry budget
    /// is spent a `MAX RETRY` sentinel is returned. Sink faults are not
    /// retried.
    pub async fn handle_user_action(
        &self,
        user: Address,
        amount: U256,
        deposit: bool,
        transaction_hash: TxHash,
    ) -> Result<UserActionReport, HandlerError> {
        let max_retries = self.ctx.config.user_action_max_retries;
        let delay = self.ctx.config.user_action_retry_delay;
        let mut errors = 0u32;

        loop {
            match self.classify_user_action(user, amount, deposit, transaction_hash).await {
                Ok(Some(report)) => return Ok(report),
                Ok(None) => warn!(tx = %transaction_hash, "Empty receipt"),
                Err(HandlerError::Sink(e)) => return Err(HandlerError::Sink(e)),
                Err(e) => error!(tx = %transaction_hash, "Error in handle_user_action: {}", e),
            }

            errors += 1;
            if errors > max_retries {
                error!(tx = %transaction_hash, attempts = errors, "Giving up on user action");
                return Ok(UserActionReport::sentinel(deposit, MAX_RETRY, None));
            }
            tokio::time::sleep(delay).await;
        }
    }

    /// One attempt; `None` while the receipt is unavailable
    async fn classify_user_action(
        &self,
        user: Address,
        amount: U256,
        deposit: bool,
        transaction_hash: TxHash,
    ) -> Result<Option<UserActionReport>, HandlerError> {
        let Some(receipt) = self.ctx.chain.transaction_receipt(transaction_hash).await? else {
            return Ok(None);
        };
        let tx = Some(receipt.transaction_hash);

        if !receipt.status {
            error!(tx = %receipt.transaction_hash, "handle_user_action wrong status");
            return Ok(Some(UserActionReport::sentinel(deposit, WRONG_STATUS, tx)));
        }
        if user != receipt.from {
            return Ok(Some(UserActionReport::sentinel(deposit, INTERNAL_ACTION, tx)));
        }
        let Some(vault) = self.locate_vault(&receipt).await? else {
            return Ok(Some(UserActionReport::sentinel(deposit, NOT_DIRECT_CALL, tx)));
        };

        let vault_name = self.ctx.token_name(vault).await?;
        let decimals = self.ctx.token_decimals(vault).await?;
        let underlying = call_view(self.ctx.chain.as_ref(), vault, ISmartVault::underlyingCall {}, None)
            .await?
            ._0;
        let price = self.price_of(underlying).await?;

        let usd = units_to_f64(amount, decimals) * price;
        let vault_name_pretty = format_vault_name(&vault_name);
        let usd_value = format_integer(usd);

        if usd < self.ctx.config.min_user_action_usd {
            return Ok(Some(UserActionReport {
                deposit,
                vault_name_pretty,
                usd_value,
                transaction_hash: tx,
                sent: false,
            }));
        }

        info!(tx = %receipt.transaction_hash, deposit, "USER ACTION: {} ${}", vault_name_pretty, usd_value);

        let (title, color) = if deposit {
            (":money_mouth: Deposit", DEPOSIT_COLOR)
        } else {
            (":pleading_face: Withdraw", WITHDRAW_COLOR)
        };
        let notification = Notification::new(
            ChannelKind::UserAction,
            tx,
            self.ctx.title(title),
            vault_name_pretty.clone(),
            format!("${}", usd_value),
        )
        .with_color(color);
        self.ctx.deliver(notification).await?;

        Ok(Some(UserActionReport {
            deposit,
            vault_name_pretty,
            usd_value,
            transaction_hash: tx,
            sent: true,
        }))
    }

    /// Vault a user action was a direct call on
    ///
    /// Asks the controller whether the receipt's recipient is a registered
    /// vault. When that lookup fails, falls back to the emitter of the first
    /// Deposit/Withdraw log.
    async fn locate_vault(&self, receipt: &TxReceipt) -> Result<Option<Address>, HandlerError> {
        let Some(to) = receipt.to else {
            return Ok(None);
        };
        let controller = self.ctx.core.controller;
        match call_view(
            self.ctx.chain.as_ref(),
            controller,
            IController::isValidVaultCall { vault: to },
            None,
        )
        .await
        {
            Ok(ret) if ret._0 => Ok(Some(to)),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!(tx = %receipt.transaction_hash, "Vault registry lookup failed, scanning logs: {}", e);
                Ok(find_log(receipt, EventKind::Deposit)
                    .or_else(|| find_log(receipt, EventKind::Withdraw))
                    .map(|log| log.address))
            }
        }
    }

    /// USD price of a token from the reader contract
    async fn price_of(&self, token: Address) -> Result<f64, HandlerError> {
        let price = call_view(
            self.ctx.chain.as_ref(),
            self.ctx.core.reader,
            IContractReader::getPriceCall { token },
            None,
        )
        .await?
        ._0;
        Ok(units_to_f64(price, 18))
    }

    /// Report a strategy earning when it is worth enough
    ///
    /// Returns `None` when the receipt failed.
    pub async fn handle_strategy_earned(
        &self,
        strategy: Address,
        amount: U256,
        receipt: &TxReceipt,
    ) -> Result<Option<EarnedReport>, HandlerError> {
        if !receipt.status {
            error!(tx = %receipt.transaction_hash, "handle_strategy_earned wrong status");
            return Ok(None);
        }
        let chain = self.ctx.chain.as_ref();
        let strategy_name = call_view(chain, strategy, IStrategy::STRATEGY_NAMECall {}, None).await?._0;
        let vault = call_view(chain, strategy, IStrategy::vaultCall {}, None).await?._0;
        let vault_name_pretty = format_vault_name(&self.ctx.token_name(vault).await?);
        let earned = units_to_f64(amount, REWARD_TOKEN_DECIMALS);
        let usd = earned * self.price_of(self.ctx.core.reward_token).await?;

        info!(
            tx = %receipt.transaction_hash,
            "STRATEGY EARNED: {} {} {} ${}",
            vault_name_pretty,
            strategy_name,
            earned,
            usd
        );

        let mut report = EarnedReport {
            vault_name_pretty,
            strategy_name,
            amount: earned,
            usd_value: usd,
            sent: false,
        };
        if usd < self.ctx.config.min_earned_usd {
            return Ok(Some(report));
        }

        let notification = Notification::new(
            ChannelKind::StrategyEarned,
            Some(receipt.transaction_hash),
            self.ctx
                .title(&format!("{} {} earned", earned_emoji(usd), report.vault_name_pretty)),
            format!("Strategy type: {}", report.strategy_name),
            format!("Earned {}TETU (${})", format_integer(earned), format_integer(usd)),
        )
        .with_color(EARNED_COLOR);
        self.ctx.deliver(notification).await?;
        report.sent = true;
        Ok(Some(report))
    }
}

//! Event Dispatcher
//!
//! Owns the chain subscriptions. Every log subscription and the block
//! subscription run as their own task; each task handles its stream
//! sequentially and stops when the shutdown channel changes.

use std::sync::Arc;

use alloy::primitives::Address;
use futures::future::join_all;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::chain::{ChainError, ChainReader, ChainSubscriber, TxLog};
use crate::decoder::{decode_log, RawEvent};
use crate::handlers::{
    AnnouncerHandler, BookkeeperHandler, ControllerHandler, HandlerContext, HandlerError, SplitterHandler,
};
use crate::registry::CoreAddresses;
use crate::signatures::{topics_for, EventKind, EventSource};
use crate::watcher::{FailedTxWatcher, WatchList};

/// Log subscriptions: contract family and the address to filter on
///
/// Splitters are not known up front, so their events are matched by topic only.
pub fn subscriptions(core: &CoreAddresses) -> Vec<(EventSource, Option<Address>)> {
    vec![
        (EventSource::Announcer, Some(core.announcer)),
        (EventSource::Controller, Some(core.controller)),
        (EventSource::Bookkeeper, Some(core.bookkeeper)),
        (EventSource::Splitter, None),
    ]
}

/// Routes decoded events to the handler of their contract family
pub struct Router {
    chain: Arc<dyn ChainReader>,
    announcer: AnnouncerHandler,
    controller: ControllerHandler,
    bookkeeper: BookkeeperHandler,
    splitter: SplitterHandler,
    watch_list: Arc<RwLock<WatchList>>,
}

impl Router {
    pub fn new(ctx: Arc<HandlerContext>, watch_list: Arc<RwLock<WatchList>>) -> Self {
        Self {
            chain: ctx.chain.clone(),
            announcer: AnnouncerHandler::new(ctx.clone()),
            controller: ControllerHandler::new(ctx.clone()),
            bookkeeper: BookkeeperHandler::new(ctx.clone()),
            splitter: SplitterHandler::new(ctx),
            watch_list,
        }
    }

    /// Decode a raw log and route it
    pub async fn route_log(&self, log: &TxLog) -> Result<bool, HandlerError> {
        let event = decode_log(log)?;
        self.route(&event).await
    }

    pub async fn route(&self, event: &RawEvent) -> Result<bool, HandlerError> {
        if event.kind == EventKind::VaultAndStrategyAdded {
            let vault = event.args.address(0)?;
            if self.watch_list.write().await.insert(vault) {
                info!(%vault, "Vault added to failed transaction watch list");
            }
        }

        // UserAction fetches its own receipt with retries
        let receipt = match (event.kind, event.transaction_hash) {
            (EventKind::UserAction, _) | (_, None) => None,
            (_, Some(hash)) => self.chain.transaction_receipt(hash).await?,
        };

        match event.kind.source() {
            EventSource::Announcer => self.announcer.handle_event(event, receipt.as_ref()).await,
            EventSource::Controller => self.controller.handle_event(event, receipt.as_ref()).await,
            EventSource::Bookkeeper => self.bookkeeper.handle_event(event, receipt.as_ref()).await,
            EventSource::Splitter => self.splitter.handle_event(event, receipt.as_ref()).await,
            EventSource::Vault => Err(HandlerError::Unroutable(event.kind.name())),
        }
    }
}

/// Next stream item, or `None` once shutdown is signalled or the stream ends
///
/// Any change on the shutdown channel, including the sender being dropped,
/// counts as a shutdown signal.
async fn next_item<T>(stream: &mut BoxStream<'static, T>, shutdown: &mut watch::Receiver<bool>) -> Option<T> {
    if *shutdown.borrow() {
        return None;
    }
    tokio::select! {
        biased;
        _ = shutdown.changed() => None,
        item = stream.next() => item,
    }
}

pub struct Dispatcher {
    router: Arc<Router>,
    watcher: Arc<FailedTxWatcher>,
    subscriber: Arc<dyn ChainSubscriber>,
    core: CoreAddresses,
}

impl Dispatcher {
    pub fn new(
        ctx: Arc<HandlerContext>,
        subscriber: Arc<dyn ChainSubscriber>,
        watch_list: Arc<RwLock<WatchList>>,
    ) -> Self {
        Self {
            router: Arc::new(Router::new(ctx.clone(), watch_list.clone())),
            watcher: Arc::new(FailedTxWatcher::new(ctx.clone(), watch_list)),
            subscriber,
            core: ctx.core.clone(),
        }
    }

    pub fn router(&self) -> Arc<Router> {
        self.router.clone()
    }

    /// Subscribe, run every task until shutdown, then join them all
    ///
    /// A failed subscription aborts before any task is started.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), ChainError> {
        let mut log_streams = Vec::new();
        for (source, address) in subscriptions(&self.core) {
            let stream = self.subscriber.subscribe_logs(address, topics_for(source)).await?;
            info!(?source, ?address, "Subscribed to logs");
            log_streams.push((source, stream));
        }
        let blocks = self.subscriber.subscribe_blocks().await?;
        info!("Subscribed to new blocks");

        let mut tasks: Vec<JoinHandle<()>> = log_streams
            .into_iter()
            .map(|(source, stream)| {
                tokio::spawn(Self::log_task(source, stream, self.router.clone(), shutdown.clone()))
            })
            .collect();
        tasks.push(tokio::spawn(Self::block_task(blocks, self.watcher.clone(), shutdown)));

        for result in join_all(tasks).await {
            if let Err(e) = result {
                error!("Dispatcher task panicked: {}", e);
            }
        }
        info!("Dispatcher stopped");
        Ok(())
    }

    async fn log_task(
        source: EventSource,
        mut stream: BoxStream<'static, TxLog>,
        router: Arc<Router>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        while let Some(log) = next_item(&mut stream, &mut shutdown).await {
            let tx = log.transaction_hash;
            match router.route_log(&log).await {
                Ok(true) => debug!(?source, ?tx, "Event notified"),
                Ok(false) => debug!(?source, ?tx, "Event skipped"),
                Err(e) => error!(?source, ?tx, "Failed to handle event: {}", e),
            }
        }
        if !*shutdown.borrow() {
            warn!(?source, "Log stream ended");
        }
    }

    async fn block_task(
        mut stream: BoxStream<'static, u64>,
        watcher: Arc<FailedTxWatcher>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        while let Some(number) = next_item(&mut stream, &mut shutdown).await {
            match watcher.handle_block(number).await {
                Ok(0) => {}
                Ok(reported) => info!(block = number, reported, "Failed transactions reported"),
                Err(e) => error!(block = number, "Failed to scan block: {}", e),
            }
        }
        if !*shutdown.borrow() {
            warn!("Block stream ended");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::TxReceipt;
    use crate::contracts::{IController, IErc20, IStrategy};
    use crate::decoder::DecodeError;
    use crate::test_support::{harness, FakeChain, Harness, CONTROLLER};
    use alloy::primitives::{address, Bytes, B256};
    use alloy::sol_types::SolCall;
    use async_trait::async_trait;
    use futures::stream;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    const SPLITTER: Address = address!("abababababababababababababababababababab");
    const VAULT: Address = address!("cdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcd");
    const SUB: Address = address!("efefefefefefefefefefefefefefefefefefefef");

    /// Subscriber replaying canned logs, then staying open
    #[derive(Default)]
    struct FakeSubscriber {
        logs: HashMap<Option<Address>, Vec<TxLog>>,
        requested: Mutex<Vec<(Option<Address>, usize)>>,
        fail: bool,
    }

    #[async_trait]
    impl ChainSubscriber for FakeSubscriber {
        async fn subscribe_logs(
            &self,
            address: Option<Address>,
            topics: Vec<B256>,
        ) -> Result<BoxStream<'static, TxLog>, ChainError> {
            if self.fail {
                return Err(ChainError::Subscription("filter not found".to_string()));
            }
            self.requested.lock().unwrap().push((address, topics.len()));
            let logs = self.logs.get(&address).cloned().unwrap_or_default();
            Ok(stream::iter(logs).chain(stream::pending()).boxed())
        }

        async fn subscribe_blocks(&self) -> Result<BoxStream<'static, u64>, ChainError> {
            Ok(stream::pending().boxed())
        }
    }

    fn removed_log() -> TxLog {
        TxLog {
            address: SPLITTER,
            topics: vec![EventKind::StrategyRemoved.topic()],
            data: Bytes::from(SUB.into_word().to_vec()),
            block_number: Some(10),
            transaction_hash: Some(B256::repeat_byte(0x66)),
        }
    }

    fn splitter_harness() -> Harness {
        let chain = FakeChain::default()
            .with_return_at(SPLITTER, IStrategy::vaultCall::SELECTOR, VAULT)
            .with_return_at(CONTROLLER, IController::isValidVaultCall::SELECTOR, true)
            .with_return_at(VAULT, IErc20::nameCall::SELECTOR, "TETU_SPLITTER_USDC".to_string())
            .with_return_at(SUB, IStrategy::STRATEGY_NAMECall::SELECTOR, "AaveFold".to_string())
            .with_receipt(TxReceipt {
                transaction_hash: B256::repeat_byte(0x66),
                from: Address::ZERO,
                to: Some(SPLITTER),
                status: true,
                block_number: 10,
                logs: vec![],
            });
        harness(chain)
    }

    fn watch_list() -> Arc<RwLock<WatchList>> {
        Arc::new(RwLock::new(WatchList::new()))
    }

    // ==================== subscription tests ====================

    #[test]
    fn test_subscriptions_cover_every_handled_family() {
        let core = crate::test_support::core_addresses();
        let subs = subscriptions(&core);
        assert_eq!(subs.len(), 4);
        assert!(subs.contains(&(EventSource::Announcer, Some(core.announcer))));
        assert!(subs.contains(&(EventSource::Controller, Some(core.controller))));
        assert!(subs.contains(&(EventSource::Bookkeeper, Some(core.bookkeeper))));
        assert!(subs.contains(&(EventSource::Splitter, None)));
    }

    // ==================== Router tests ====================

    #[tokio::test]
    async fn test_route_fetches_receipt() {
        let h = splitter_harness();
        let router = Router::new(h.ctx.clone(), watch_list());

        assert!(router.route_log(&removed_log()).await.unwrap());
        assert_eq!(h.chain.receipt_requests.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(
            h.transport.payloads()[0].embeds[0].title,
            "TETU_SPLITTER_USDC removed sub strategy on matic"
        );
    }

    #[tokio::test]
    async fn test_route_ignores_splitter_event_from_unregistered_emitter() {
        let chain = FakeChain::default()
            .with_return_at(SPLITTER, IStrategy::vaultCall::SELECTOR, VAULT)
            .with_return_at(CONTROLLER, IController::isValidVaultCall::SELECTOR, false)
            .with_receipt(TxReceipt {
                transaction_hash: B256::repeat_byte(0x66),
                from: Address::ZERO,
                to: Some(SPLITTER),
                status: true,
                block_number: 10,
                logs: vec![],
            });
        let h = harness(chain);
        let router = Router::new(h.ctx.clone(), watch_list());

        assert!(!router.route_log(&removed_log()).await.unwrap());
        assert!(h.transport.payloads().is_empty());
    }

    #[tokio::test]
    async fn test_route_without_receipt_skips() {
        let h = harness(FakeChain::default());
        let router = Router::new(h.ctx.clone(), watch_list());

        assert!(!router.route_log(&removed_log()).await.unwrap());
        assert!(h.transport.payloads().is_empty());
    }

    #[tokio::test]
    async fn test_route_unknown_topic() {
        let h = harness(FakeChain::default());
        let router = Router::new(h.ctx.clone(), watch_list());
        let mut log = removed_log();
        log.topics = vec![B256::repeat_byte(0x01)];

        let result = router.route_log(&log).await;
        assert!(matches!(result, Err(HandlerError::Decode(DecodeError::UnknownTopic(_)))));
    }

    #[tokio::test]
    async fn test_vault_added_extends_watch_list() {
        let h = harness(FakeChain::default());
        let list = watch_list();
        let router = Router::new(h.ctx.clone(), list.clone());
        let log = TxLog {
            address: h.ctx.core.controller,
            topics: vec![EventKind::VaultAndStrategyAdded.topic()],
            data: Bytes::from([VAULT.into_word().to_vec(), SUB.into_word().to_vec()].concat()),
            block_number: Some(10),
            transaction_hash: Some(B256::repeat_byte(0x77)),
        };

        // No receipt is canned, so the handler itself skips
        assert!(!router.route_log(&log).await.unwrap());
        assert!(list.read().await.contains(&VAULT));
    }

    // ==================== Dispatcher tests ====================

    #[tokio::test]
    async fn test_dispatcher_runs_until_shutdown() {
        let h = splitter_harness();
        let mut subscriber = FakeSubscriber::default();
        subscriber.logs.insert(None, vec![removed_log()]);
        let subscriber = Arc::new(subscriber);
        let dispatcher = Dispatcher::new(h.ctx.clone(), subscriber.clone(), watch_list());

        let (tx, rx) = watch::channel(false);
        let run = tokio::spawn(async move { dispatcher.run(rx).await });

        for _ in 0..200 {
            if !h.transport.payloads().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(h.transport.payloads().len(), 1);

        tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
        assert!(result.is_ok());
        assert_eq!(subscriber.requested.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_dispatcher_subscription_failure() {
        let h = harness(FakeChain::default());
        let subscriber = Arc::new(FakeSubscriber {
            fail: true,
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(h.ctx.clone(), subscriber, watch_list());
        let (_tx, rx) = watch::channel(false);

        let result = dispatcher.run(rx).await;
        assert!(matches!(result, Err(ChainError::Subscription(_))));
    }
}

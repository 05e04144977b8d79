//! Vaultwatch relay
//!
//! Watches the vault platform contracts and relays their events to webhooks.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{watch, RwLock};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vaultwatch_relay::chain::ChainReader;
use vaultwatch_relay::dispatcher::Dispatcher;
use vaultwatch_relay::handlers::HandlerContext;
use vaultwatch_relay::limiter::RateLimiter;
use vaultwatch_relay::metadata::{ExplorerClient, MetadataResolver};
use vaultwatch_relay::node::{NodeConfig, NodeConnection};
use vaultwatch_relay::registry::Registry;
use vaultwatch_relay::sink::{http_client, ReqwestTransport, Sink, HTTP_TIMEOUT};
use vaultwatch_relay::watcher::WatchList;
use vaultwatch_relay::RelayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(RelayConfig::from_env().context("Invalid configuration")?);
    info!(network = config.network.name(), "Starting relay");

    let registry = Registry::load(&config.registry_path)
        .with_context(|| format!("Failed to load registry {}", config.registry_path.display()))?;
    let core = registry.core(config.network)?.clone();

    let mut connection = NodeConnection::new(NodeConfig::new(config.rpc_url.clone(), config.poll_interval));
    let node = Arc::new(connection.connect_with_retry().await?);
    info!(block = node.block_number().await?, "Node ready");

    let http = http_client(HTTP_TIMEOUT).context("Failed to build HTTP client")?;
    let explorer = ExplorerClient::new(
        http.clone(),
        config.network.explorer_api_url(),
        config.explorer_api_key.clone(),
        Arc::new(RateLimiter::new(config.explorer_min_interval)),
    );
    let sink = Arc::new(Sink::new(
        Arc::new(ReqwestTransport::new(http)),
        config.webhooks.clone(),
        config.network.scan_url(),
        Arc::new(RateLimiter::new(config.sink_min_interval)),
    ));
    let metadata = MetadataResolver::new(node.clone(), Arc::new(explorer));

    let watch_list = WatchList::build(&core, node.as_ref())
        .await
        .context("Failed to build the failed transaction watch list")?;
    info!(addresses = watch_list.len(), "Watch list ready");

    let ctx = Arc::new(HandlerContext::new(node.clone(), metadata, sink, core, config));
    let dispatcher = Dispatcher::new(ctx, node, Arc::new(RwLock::new(watch_list)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    dispatcher.run(shutdown_rx).await?;
    info!("Relay stopped");
    Ok(())
}

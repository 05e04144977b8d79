//! Metadata Resolver
//!
//! Best-effort lookups of contract names and versions. Every failure
//! degrades to [`Resolved::Unknown`], which renders as a sentinel.

use std::fmt;
use std::sync::Arc;

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::chain::ChainReader;
use crate::contracts::{call_view, IStrategy, IVersioned};
use crate::limiter::RateLimiter;

/// Rendered for names that could not be resolved
pub const UNKNOWN_NAME: &str = "UNKNOWN_NAME";

/// Rendered for versions that could not be resolved
pub const UNKNOWN_VERSION: &str = "0";

/// Outcome of a best-effort lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved<T> {
    Known(T),
    Unknown,
}

impl<T> Resolved<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Resolved::Known(_))
    }

    pub fn known(self) -> Option<T> {
        match self {
            Resolved::Known(value) => Some(value),
            Resolved::Unknown => None,
        }
    }
}

impl<T> From<Option<T>> for Resolved<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Resolved::Known(v),
            None => Resolved::Unknown,
        }
    }
}

impl Resolved<String> {
    /// The name, or `UNKNOWN_NAME`
    pub fn name_or_sentinel(&self) -> &str {
        match self {
            Resolved::Known(name) => name,
            Resolved::Unknown => UNKNOWN_NAME,
        }
    }

    /// The version, or `"0"`
    pub fn version_or_sentinel(&self) -> &str {
        match self {
            Resolved::Known(version) => version,
            Resolved::Unknown => UNKNOWN_VERSION,
        }
    }
}

/// Errors from the block-explorer API
#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("Explorer request failed: {0}")]
    Http(String),

    #[error("Invalid explorer response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Source of verified contract names
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContractNameSource: Send + Sync {
    /// Verified name of a contract, `None` when the explorer has none
    async fn contract_name(&self, address: Address) -> Result<Option<String>, ExplorerError>;
}

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    result: serde_json::Value,
}

/// Extract `result[0].ContractName` from a `getsourcecode` response
pub fn parse_contract_name(json: &str) -> Result<Option<String>, ExplorerError> {
    let response: ExplorerResponse = serde_json::from_str(json)?;
    if response.status != "1" {
        return Ok(None);
    }
    Ok(response
        .result
        .get(0)
        .and_then(|entry| entry.get("ContractName"))
        .and_then(|name| name.as_str())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string))
}

/// Etherscan-compatible `getsourcecode` client, throttled process-wide
pub struct ExplorerClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    limiter: Arc<RateLimiter>,
}

impl ExplorerClient {
    pub fn new(
        client: reqwest::Client,
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            limiter,
        }
    }
}

#[async_trait]
impl ContractNameSource for ExplorerClient {
    async fn contract_name(&self, address: Address) -> Result<Option<String>, ExplorerError> {
        let permit = self.limiter.acquire().await;
        let address = address.to_checksum(None);
        let result = self
            .client
            .get(&self.api_url)
            .query(&[
                ("module", "contract"),
                ("action", "getsourcecode"),
                ("address", address.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await;
        permit.record();

        let body = result
            .map_err(|e| ExplorerError::Http(e.to_string()))?
            .text()
            .await
            .map_err(|e| ExplorerError::Http(e.to_string()))?;
        parse_contract_name(&body)
    }
}

/// Resolves names and versions with sentinel fallback
#[derive(Clone)]
pub struct MetadataResolver {
    chain: Arc<dyn ChainReader>,
    names: Arc<dyn ContractNameSource>,
}

impl MetadataResolver {
    pub fn new(chain: Arc<dyn ChainReader>, names: Arc<dyn ContractNameSource>) -> Self {
        Self { chain, names }
    }

    /// Verified contract name from the block explorer
    pub async fn resolve_contract_name(&self, address: Address) -> Resolved<String> {
        match self.names.contract_name(address).await {
            Ok(name) => name.into(),
            Err(e) => {
                debug!(%address, "Contract name lookup failed: {}", e);
                Resolved::Unknown
            }
        }
    }

    /// `VERSION()` of a contract
    pub async fn resolve_version(&self, address: Address) -> Resolved<String> {
        match call_view(self.chain.as_ref(), address, IVersioned::VERSIONCall {}, None).await {
            Ok(ret) if !ret._0.is_empty() => Resolved::Known(ret._0),
            Ok(_) => Resolved::Unknown,
            Err(e) => {
                debug!(%address, "Version lookup failed: {}", e);
                Resolved::Unknown
            }
        }
    }

    /// `STRATEGY_NAME()` of a strategy
    pub async fn resolve_strategy_name(&self, address: Address) -> Resolved<String> {
        match call_view(self.chain.as_ref(), address, IStrategy::STRATEGY_NAMECall {}, None).await {
            Ok(ret) if !ret._0.is_empty() => Resolved::Known(ret._0),
            Ok(_) => Resolved::Unknown,
            Err(e) => {
                debug!(%address, "Strategy name lookup failed: {}", e);
                Resolved::Unknown
            }
        }
    }
}

impl fmt::Debug for MetadataResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainError, MockChainReader};
    use alloy::primitives::Bytes;
    use alloy::sol_types::SolCall;
    use std::time::Duration;

    fn resolver(chain: MockChainReader, names: MockContractNameSource) -> MetadataResolver {
        MetadataResolver::new(Arc::new(chain), Arc::new(names))
    }

    // ==================== parse_contract_name tests ====================

    #[test]
    fn test_parse_contract_name_ok() {
        let json = r#"{"status":"1","message":"OK","result":[{"ContractName":"SmartVault","SourceCode":""}]}"#;
        assert_eq!(parse_contract_name(json).unwrap(), Some("SmartVault".to_string()));
    }

    #[test]
    fn test_parse_contract_name_not_ok_status() {
        let json = r#"{"status":"0","message":"NOTOK","result":"Invalid API Key"}"#;
        assert_eq!(parse_contract_name(json).unwrap(), None);
    }

    #[test]
    fn test_parse_contract_name_unverified() {
        let json = r#"{"status":"1","message":"OK","result":[{"ContractName":""}]}"#;
        assert_eq!(parse_contract_name(json).unwrap(), None);
    }

    #[test]
    fn test_parse_contract_name_garbage() {
        assert!(parse_contract_name("<html>").is_err());
    }

    // ==================== Resolved tests ====================

    #[test]
    fn test_resolved_sentinels() {
        let unknown: Resolved<String> = Resolved::Unknown;
        assert_eq!(unknown.name_or_sentinel(), "UNKNOWN_NAME");
        assert_eq!(unknown.version_or_sentinel(), "0");
        assert!(!unknown.is_known());

        let known = Resolved::Known("1.2.0".to_string());
        assert_eq!(known.version_or_sentinel(), "1.2.0");
        assert_eq!(known.known(), Some("1.2.0".to_string()));
    }

    // ==================== MetadataResolver tests ====================

    #[tokio::test]
    async fn test_contract_name_failure_is_sentinel() {
        let mut names = MockContractNameSource::new();
        names
            .expect_contract_name()
            .returning(|_| Err(ExplorerError::Http("timeout".to_string())));

        let resolver = resolver(MockChainReader::new(), names);
        let name = resolver.resolve_contract_name(Address::ZERO).await;
        assert_eq!(name, Resolved::Unknown);
        assert_eq!(name.name_or_sentinel(), UNKNOWN_NAME);
    }

    #[tokio::test]
    async fn test_contract_name_known() {
        let mut names = MockContractNameSource::new();
        names
            .expect_contract_name()
            .returning(|_| Ok(Some("Controller".to_string())));

        let resolver = resolver(MockChainReader::new(), names);
        assert_eq!(
            resolver.resolve_contract_name(Address::ZERO).await,
            Resolved::Known("Controller".to_string())
        );
    }

    #[tokio::test]
    async fn test_version_failure_is_sentinel() {
        let mut chain = MockChainReader::new();
        chain.expect_call().returning(|to, _, _| {
            Err(ChainError::Reverted {
                to,
                reason: "function selector was not recognized".to_string(),
            })
        });

        let resolver = resolver(chain, MockContractNameSource::new());
        let version = resolver.resolve_version(Address::ZERO).await;
        assert_eq!(version.version_or_sentinel(), UNKNOWN_VERSION);
    }

    #[tokio::test]
    async fn test_version_known() {
        let mut chain = MockChainReader::new();
        chain.expect_call().returning(|_, _, _| {
            Ok(Bytes::from(IVersioned::VERSIONCall::abi_encode_returns(&("1.4.0".to_string(),))))
        });

        let resolver = resolver(chain, MockContractNameSource::new());
        assert_eq!(
            resolver.resolve_version(Address::ZERO).await,
            Resolved::Known("1.4.0".to_string())
        );
    }

    #[tokio::test]
    async fn test_strategy_name_garbage_return_is_sentinel() {
        let mut chain = MockChainReader::new();
        chain.expect_call().returning(|_, _, _| Ok(Bytes::from(vec![0u8; 3])));

        let resolver = resolver(chain, MockContractNameSource::new());
        assert_eq!(resolver.resolve_strategy_name(Address::ZERO).await, Resolved::Unknown);
    }

    // ==================== ExplorerClient throttle tests ====================

    /// Local URL nothing listens on
    fn refused_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}/api", port)
    }

    #[tokio::test(start_paused = true)]
    async fn test_explorer_lookups_share_process_throttle() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(10)));
        let url = refused_url();
        let http = reqwest::Client::new();
        let first = MetadataResolver::new(
            Arc::new(MockChainReader::new()),
            Arc::new(ExplorerClient::new(http.clone(), url.clone(), "key", limiter.clone())),
        );
        let second = MetadataResolver::new(
            Arc::new(MockChainReader::new()),
            Arc::new(ExplorerClient::new(http, url, "key", limiter.clone())),
        );

        let start = tokio::time::Instant::now();
        assert_eq!(first.resolve_contract_name(Address::ZERO).await, Resolved::Unknown);
        assert!(start.elapsed() < limiter.min_interval());

        // Failed lookups still count towards the interval
        assert_eq!(second.resolve_contract_name(Address::ZERO).await, Resolved::Unknown);
        assert!(start.elapsed() >= limiter.min_interval());
    }
}

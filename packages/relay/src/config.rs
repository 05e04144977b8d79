//! Relay Configuration
//!
//! Explicit configuration built once at startup from environment variables
//! (after `.env` is loaded) and shared by reference afterwards.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::notification::ChannelKind;

/// Default registry file path
pub const DEFAULT_REGISTRY_PATH: &str = "addresses.json";

/// Deposits and withdrawals below this USD value are not reported
pub const MIN_USER_ACTION_USD: f64 = 100_000.0;

/// Strategy earnings below this USD value are not reported
pub const MIN_EARNED_USD: f64 = 10.0;

/// Minimum spacing between two webhook sends
pub const SINK_MIN_INTERVAL_MS: u64 = 300;

/// Minimum spacing between two block-explorer requests
pub const EXPLORER_MIN_INTERVAL_MS: u64 = 10_000;

pub const USER_ACTION_MAX_RETRIES: u32 = 5;

pub const USER_ACTION_RETRY_DELAY_MS: u64 = 10_000;

/// Log and block polling interval for HTTP endpoints
pub const POLL_INTERVAL_MS: u64 = 2_000;

/// Errors that can occur while building the configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing required variable: {0}")]
    Missing(String),

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

/// Networks the relay knows explorer endpoints for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Matic,
    Fantom,
    Mainnet,
    Rinkeby,
}

impl Network {
    /// Lowercase network name used in titles and registry keys
    pub fn name(&self) -> &'static str {
        match self {
            Network::Matic => "matic",
            Network::Fantom => "fantom",
            Network::Mainnet => "mainnet",
            Network::Rinkeby => "rinkeby",
        }
    }

    /// Block-explorer web root, used for transaction and address links
    pub fn scan_url(&self) -> &'static str {
        match self {
            Network::Matic => "https://polygonscan.com",
            Network::Fantom => "https://ftmscan.com",
            Network::Mainnet => "https://etherscan.io",
            Network::Rinkeby => "https://rinkeby.etherscan.io",
        }
    }

    /// Block-explorer API endpoint
    pub fn explorer_api_url(&self) -> &'static str {
        match self {
            Network::Matic => "https://api.polygonscan.com/api",
            Network::Fantom => "https://api.ftmscan.com/api",
            Network::Mainnet => "https://api.etherscan.io/api",
            Network::Rinkeby => "https://api-rinkeby.etherscan.io/api",
        }
    }

    /// Prefix of the per-network environment variables
    pub fn env_prefix(&self) -> String {
        self.name().to_uppercase()
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "matic" | "polygon" => Ok(Network::Matic),
            "fantom" | "ftm" => Ok(Network::Fantom),
            "mainnet" | "ethereum" => Ok(Network::Mainnet),
            "rinkeby" => Ok(Network::Rinkeby),
            other => Err(ConfigError::UnknownNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Environment variable suffix for a channel's webhook URL
pub fn webhook_suffix(kind: ChannelKind) -> &'static str {
    match kind {
        ChannelKind::UserAction => "USER_ACTION_DISCORD",
        ChannelKind::StrategyEarned => "STRATEGY_EARNED_DISCORD",
        ChannelKind::Announcement => "TIMELOCKS_DISCORD",
        ChannelKind::ImportantMessage => "IMPORTANT_DISCORD",
        ChannelKind::Error => "ERRORS_DISCORD",
    }
}

/// Complete relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub network: Network,
    /// JSON-RPC URL or IPC socket path
    pub rpc_url: String,
    pub registry_path: PathBuf,
    pub explorer_api_key: String,
    /// Destination per channel; absent channels are not sent to
    pub webhooks: HashMap<ChannelKind, String>,
    pub min_user_action_usd: f64,
    pub min_earned_usd: f64,
    pub sink_min_interval: Duration,
    pub explorer_min_interval: Duration,
    pub user_action_max_retries: u32,
    pub user_action_retry_delay: Duration,
    pub poll_interval: Duration,
}

impl RelayConfig {
    /// Config for a network with every tunable at its default
    pub fn for_network(network: Network, rpc_url: impl Into<String>) -> Self {
        Self {
            network,
            rpc_url: rpc_url.into(),
            registry_path: PathBuf::from(DEFAULT_REGISTRY_PATH),
            explorer_api_key: String::new(),
            webhooks: HashMap::new(),
            min_user_action_usd: MIN_USER_ACTION_USD,
            min_earned_usd: MIN_EARNED_USD,
            sink_min_interval: Duration::from_millis(SINK_MIN_INTERVAL_MS),
            explorer_min_interval: Duration::from_millis(EXPLORER_MIN_INTERVAL_MS),
            user_action_max_retries: USER_ACTION_MAX_RETRIES,
            user_action_retry_delay: Duration::from_millis(USER_ACTION_RETRY_DELAY_MS),
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
        }
    }

    /// Build from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup
    ///
    /// # Arguments
    /// * `lookup` - Returns the value of a variable, `None` when unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let network: Network = get("NET")
            .ok_or_else(|| ConfigError::Missing("NET".to_string()))?
            .parse()?;
        let prefix = network.env_prefix();
        let url_key = format!("{}_URL", prefix);
        let rpc_url = get("RPC_URL")
            .or_else(|| get(&url_key))
            .ok_or_else(|| ConfigError::Missing(url_key.clone()))?;

        let mut config = Self::for_network(network, rpc_url);

        if let Some(path) = get("ADDRESS_REGISTRY") {
            config.registry_path = PathBuf::from(path);
        }
        if let Some(key) = get("EXPLORER_API_KEY") {
            config.explorer_api_key = key;
        }

        for kind in ChannelKind::ALL {
            if let Some(url) = get(&format!("{}_{}", prefix, webhook_suffix(kind))) {
                config.webhooks.insert(kind, url);
            }
        }

        if let Some(v) = get("MIN_USER_ACTION_USD") {
            config.min_user_action_usd = parse_value("MIN_USER_ACTION_USD", &v)?;
        }
        if let Some(v) = get("MIN_EARNED_USD") {
            config.min_earned_usd = parse_value("MIN_EARNED_USD", &v)?;
        }
        if let Some(v) = get("SINK_MIN_INTERVAL_MS") {
            config.sink_min_interval = Duration::from_millis(parse_value("SINK_MIN_INTERVAL_MS", &v)?);
        }
        if let Some(v) = get("EXPLORER_MIN_INTERVAL_MS") {
            config.explorer_min_interval = Duration::from_millis(parse_value("EXPLORER_MIN_INTERVAL_MS", &v)?);
        }
        if let Some(v) = get("USER_ACTION_MAX_RETRIES") {
            config.user_action_max_retries = parse_value("USER_ACTION_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("USER_ACTION_RETRY_DELAY_MS") {
            config.user_action_retry_delay = Duration::from_millis(parse_value("USER_ACTION_RETRY_DELAY_MS", &v)?);
        }
        if let Some(v) = get("POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(parse_value("POLL_INTERVAL_MS", &v)?);
        }

        Ok(config)
    }

    /// Webhook URL of a channel, if configured
    pub fn webhook(&self, kind: ChannelKind) -> Option<&str> {
        self.webhooks.get(&kind).map(String::as_str)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    // ==================== Network tests ====================

    #[test]
    fn test_network_from_str() {
        assert_eq!("matic".parse::<Network>().unwrap(), Network::Matic);
        assert_eq!("FANTOM".parse::<Network>().unwrap(), Network::Fantom);
        assert_eq!(
            "bsc".parse::<Network>(),
            Err(ConfigError::UnknownNetwork("bsc".to_string()))
        );
    }

    #[test]
    fn test_network_scan_urls() {
        assert_eq!(Network::Matic.scan_url(), "https://polygonscan.com");
        assert_eq!(Network::Fantom.scan_url(), "https://ftmscan.com");
    }

    // ==================== from_lookup tests ====================

    #[test]
    fn test_from_lookup_defaults() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("NET", "matic"),
            ("MATIC_URL", "https://polygon-rpc.com"),
        ]))
        .unwrap();

        assert_eq!(config.network, Network::Matic);
        assert_eq!(config.rpc_url, "https://polygon-rpc.com");
        assert_eq!(config.registry_path, PathBuf::from(DEFAULT_REGISTRY_PATH));
        assert_eq!(config.min_user_action_usd, MIN_USER_ACTION_USD);
        assert_eq!(config.min_earned_usd, MIN_EARNED_USD);
        assert_eq!(config.sink_min_interval, Duration::from_millis(300));
        assert_eq!(config.explorer_min_interval, Duration::from_secs(10));
        assert_eq!(config.user_action_max_retries, 5);
        assert_eq!(config.user_action_retry_delay, Duration::from_secs(10));
        assert!(config.webhooks.is_empty());
    }

    #[test]
    fn test_from_lookup_rpc_url_takes_precedence() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("NET", "fantom"),
            ("FANTOM_URL", "https://rpc.ftm.tools"),
            ("RPC_URL", "~/.ethereum/geth.ipc"),
        ]))
        .unwrap();
        assert_eq!(config.rpc_url, "~/.ethereum/geth.ipc");
    }

    #[test]
    fn test_from_lookup_missing_net() {
        let result = RelayConfig::from_lookup(lookup_from(&[]));
        assert_eq!(result.unwrap_err(), ConfigError::Missing("NET".to_string()));
    }

    #[test]
    fn test_from_lookup_unknown_net() {
        let result = RelayConfig::from_lookup(lookup_from(&[("NET", "solana")]));
        assert!(matches!(result, Err(ConfigError::UnknownNetwork(_))));
    }

    #[test]
    fn test_from_lookup_missing_url() {
        let result = RelayConfig::from_lookup(lookup_from(&[("NET", "matic")]));
        assert_eq!(result.unwrap_err(), ConfigError::Missing("MATIC_URL".to_string()));
    }

    #[test]
    fn test_from_lookup_webhooks_and_overrides() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("NET", "matic"),
            ("MATIC_URL", "http://localhost:8545"),
            ("MATIC_USER_ACTION_DISCORD", "https://discord.test/ua"),
            ("MATIC_ERRORS_DISCORD", "https://discord.test/err"),
            ("MATIC_IMPORTANT_DISCORD", "   "),
            ("MIN_EARNED_USD", "25.5"),
            ("SINK_MIN_INTERVAL_MS", "50"),
        ]))
        .unwrap();

        assert_eq!(config.webhook(ChannelKind::UserAction), Some("https://discord.test/ua"));
        assert_eq!(config.webhook(ChannelKind::Error), Some("https://discord.test/err"));
        assert_eq!(config.webhook(ChannelKind::ImportantMessage), None);
        assert_eq!(config.min_earned_usd, 25.5);
        assert_eq!(config.sink_min_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_from_lookup_invalid_number() {
        let result = RelayConfig::from_lookup(lookup_from(&[
            ("NET", "matic"),
            ("MATIC_URL", "http://localhost:8545"),
            ("USER_ACTION_MAX_RETRIES", "many"),
        ]));
        assert_eq!(
            result.unwrap_err(),
            ConfigError::Invalid {
                key: "USER_ACTION_MAX_RETRIES".to_string(),
                value: "many".to_string()
            }
        );
    }

    #[test]
    fn test_from_dotenv_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "NET=fantom").unwrap();
        writeln!(file, "FANTOM_URL=https://rpc.ftm.tools").unwrap();
        writeln!(file, "FANTOM_TIMELOCKS_DISCORD=https://discord.test/tl").unwrap();

        let vars: HashMap<String, String> = dotenv::from_path_iter(file.path())
            .unwrap()
            .map(|item| item.unwrap())
            .collect();
        let config = RelayConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();

        assert_eq!(config.network, Network::Fantom);
        assert_eq!(config.webhook(ChannelKind::Announcement), Some("https://discord.test/tl"));
    }
}

//! Address Registry
//!
//! Per-network well-known contract addresses loaded from a JSON file:
//!
//! ```json
//! { "matic": { "controller": "0x..", "announcer": "0x..", ... } }
//! ```

use std::collections::HashMap;
use std::path::Path;

use alloy::primitives::Address;
use serde::Deserialize;
use thiserror::Error;

use crate::config::Network;
use crate::node::expand_path;

/// Errors that can occur while loading the registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Cannot read registry file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid registry JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No addresses configured for network {0}")]
    MissingNetwork(String),
}

/// Core contracts of one network
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreAddresses {
    pub controller: Address,
    pub announcer: Address,
    pub bookkeeper: Address,
    pub reward_token: Address,
    /// Price oracle contract
    pub reader: Address,
    #[serde(default)]
    pub fee_reward_forwarder: Option<Address>,
    #[serde(default)]
    pub mint_helper: Option<Address>,
    #[serde(default)]
    pub ps_vault: Option<Address>,
    #[serde(default)]
    pub fund_keeper: Option<Address>,
    #[serde(default)]
    pub distributor: Option<Address>,
    #[serde(default)]
    pub vault_controller: Option<Address>,
}

impl CoreAddresses {
    /// Every configured address with its display label
    pub fn labelled(&self) -> Vec<(&'static str, Address)> {
        let mut entries = vec![
            ("Controller", self.controller),
            ("Announcer", self.announcer),
            ("Bookkeeper", self.bookkeeper),
            ("RewardToken", self.reward_token),
            ("ContractReader", self.reader),
        ];
        let optional = [
            ("FeeRewardForwarder", self.fee_reward_forwarder),
            ("MintHelper", self.mint_helper),
            ("PsVault", self.ps_vault),
            ("FundKeeper", self.fund_keeper),
            ("Distributor", self.distributor),
            ("VaultController", self.vault_controller),
        ];
        entries.extend(
            optional
                .into_iter()
                .filter_map(|(label, address)| address.map(|a| (label, a))),
        );
        entries
    }

    /// Label of a known address
    pub fn label(&self, address: &Address) -> Option<&'static str> {
        self.labelled()
            .into_iter()
            .find(|(_, a)| a == address)
            .map(|(label, _)| label)
    }

    /// Label when known, checksummed address otherwise
    pub fn resolve_name(&self, address: &Address) -> String {
        match self.label(address) {
            Some(label) => label.to_string(),
            None => address.to_checksum(None),
        }
    }
}

/// All networks of a registry file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Registry {
    networks: HashMap<String, CoreAddresses>,
}

impl Registry {
    /// Parse a registry from JSON text
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a registry file; `~` is expanded
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let expanded = expand_path(&path.to_string_lossy());
        let text = std::fs::read_to_string(&expanded).map_err(|source| RegistryError::Io {
            path: expanded.clone(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Addresses of a network; absence is fatal for the caller
    pub fn core(&self, network: Network) -> Result<&CoreAddresses, RegistryError> {
        self.networks
            .get(network.name())
            .ok_or_else(|| RegistryError::MissingNetwork(network.name().to_string()))
    }
}

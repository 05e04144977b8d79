//! Event Signature Catalogue
//!
//! Fixed table of the on-chain events the relay listens to, keyed by topic0.
//! The hashes are bit-exact with the deployed contracts' log format.

use std::collections::HashMap;
use std::sync::LazyLock;

use alloy::primitives::{b256, B256};

/// Contract family that emits an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSource {
    Announcer,
    Controller,
    Bookkeeper,
    Vault,
    Splitter,
}

/// Every event the relay knows how to classify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// RegisterUserAction(address,uint256,bool)
    UserAction,
    /// RegisterStrategyEarned(address,uint256)
    StrategyEarned,
    /// Deposit(address,uint256)
    Deposit,
    /// Withdraw(address,uint256)
    Withdraw,
    AddressChangeAnnounce,
    UintChangeAnnounce,
    RatioChangeAnnounced,
    TokenMoveAnnounced,
    ProxyUpgradeAnnounced,
    MintAnnounced,
    AnnounceClosed,
    StrategyUpgradeAnnounced,
    VaultStop,
    HardWorkerAdded,
    HardWorkerRemoved,
    AddedToWhiteList,
    RemovedFromWhiteList,
    VaultAndStrategyAdded,
    ControllerTokenMoved,
    StrategyTokenMoved,
    FundKeeperTokenMoved,
    UpdatedAddressSlot,
    UpdatedUint256Slot,
    VaultStrategyChanged,
    ProxyUpgraded,
    Minted,
    DistributorChanged,
    StrategyAdded,
    StrategyRemoved,
}

impl EventKind {
    pub const ALL: [EventKind; 29] = [
        EventKind::UserAction,
        EventKind::StrategyEarned,
        EventKind::Deposit,
        EventKind::Withdraw,
        EventKind::AddressChangeAnnounce,
        EventKind::UintChangeAnnounce,
        EventKind::RatioChangeAnnounced,
        EventKind::TokenMoveAnnounced,
        EventKind::ProxyUpgradeAnnounced,
        EventKind::MintAnnounced,
        EventKind::AnnounceClosed,
        EventKind::StrategyUpgradeAnnounced,
        EventKind::VaultStop,
        EventKind::HardWorkerAdded,
        EventKind::HardWorkerRemoved,
        EventKind::AddedToWhiteList,
        EventKind::RemovedFromWhiteList,
        EventKind::VaultAndStrategyAdded,
        EventKind::ControllerTokenMoved,
        EventKind::StrategyTokenMoved,
        EventKind::FundKeeperTokenMoved,
        EventKind::UpdatedAddressSlot,
        EventKind::UpdatedUint256Slot,
        EventKind::VaultStrategyChanged,
        EventKind::ProxyUpgraded,
        EventKind::Minted,
        EventKind::DistributorChanged,
        EventKind::StrategyAdded,
        EventKind::StrategyRemoved,
    ];

    /// Returns the topic0 hash of the event
    pub fn topic(&self) -> B256 {
        match self {
            EventKind::UserAction => b256!("5e996c1c2e34bf4be685943a52557af075b96e16f7603ce2841db6a7ac807e21"),
            EventKind::StrategyEarned => b256!("acca13e80d7d3305a6d7578448aafcb61b2a05c14623b99b4daccc7dd45e28de"),
            EventKind::Deposit => b256!("e1fffcc4923d04b559f4d29a8bfc6cda04eb5b0d3c460751c2402c5c5cc9109c"),
            EventKind::Withdraw => b256!("884edad9ce6fa2440d8a54cc123490eb96d2768479d49ff9c7366125a9424364"),
            EventKind::AddressChangeAnnounce => b256!("ec51865481e134a273f5e0513f108da62434bc35133562e8163d5e9e90494e25"),
            EventKind::UintChangeAnnounce => b256!("d594939de579c818732fafb25bd10058578ef12c083ca07548ac542857db7e15"),
            EventKind::RatioChangeAnnounced => b256!("06057d48acf24427dd531007e6816c88c47700f77a842bc8d528725d6aa80d25"),
            EventKind::TokenMoveAnnounced => b256!("270f8e0d0b0cebc373f92498118829c12e4328e3d18a5f995486391be2e30058"),
            EventKind::ProxyUpgradeAnnounced => b256!("c654dba084e531d8a1ccba8dff839df3a215096b6f64c52c10978e12c7401b2b"),
            EventKind::MintAnnounced => b256!("6958eb80038e96c7170b066b17d2d71e03d71e15628ea045b4786a126b6ce292"),
            EventKind::AnnounceClosed => b256!("6c2889b3fb1d7d56b3972761ed3c0d281e6d886d282066a064fc88d7392c06b2"),
            EventKind::StrategyUpgradeAnnounced => b256!("ce277b4416c13601aec38662f1dea8f6166df6a8d119c54b83c53a3f19e80778"),
            EventKind::VaultStop => b256!("1ae1cf33202dbf1d995cfed8ffc46d5c7cfc128f0b11c3e7b98d12f641dba874"),
            EventKind::HardWorkerAdded => b256!("52209af9c1ed5e9cff9c48bfd24d9ff1cf49095bb2f5f9ea45b9e7ecaa5cab8b"),
            EventKind::HardWorkerRemoved => b256!("9dba18fe1523a765a73c1205b9d8d787a0b1a4628365ad972cd11dd10be5edd8"),
            EventKind::AddedToWhiteList => b256!("8a3be376fdc726be3f3cee8e59ba5698a268a9b59f69cdabcf06d2ec2c90658f"),
            EventKind::RemovedFromWhiteList => b256!("9354cd337eebad48c93d70f7321b188732c3061fa5c48fe32b8e6f9480c52fcc"),
            EventKind::VaultAndStrategyAdded => b256!("792a64a7ca4e7610b7e353977a119872fd250352e7e6f531021f0f73ee7f08dd"),
            EventKind::ControllerTokenMoved => b256!("2fed226b2710ba4f3f348d9f280286172cf14b969a814493f14f1c46d65e8100"),
            EventKind::StrategyTokenMoved => b256!("96ab84aa635231f05d9d24a0f0124b0cba98fe81155c84f9247a3a70771a6ae9"),
            EventKind::FundKeeperTokenMoved => b256!("b59151dfcf56081c4e95e8805a26fc0cd0c72df22e5348ff9c49d4c8010682a6"),
            EventKind::UpdatedAddressSlot => b256!("92bd1dcb0fe9472f837bda3f8ad3084fe0473337d40ad361782901f142d2ce25"),
            EventKind::UpdatedUint256Slot => b256!("db6752b9ae7079fea4a42c6db0ee23fed4ce55ab9e249719b8736e3b32bea282"),
            EventKind::VaultStrategyChanged => b256!("e23ca6e29ffebf79ee4b700c4a229ab419b98590609c74df8dde7996b6a357f5"),
            EventKind::ProxyUpgraded => b256!("8ee0f2bd29c0e6a975c3cc2e47cf2e01b5f23a9a8a02e0ed6a5a070269de3d2d"),
            EventKind::Minted => b256!("7f919ac0a2fc6f08a0bf38f052197f0122a0cb6ccdd22f6aed0ec1d5b7a4db57"),
            EventKind::DistributorChanged => b256!("e37acc13f5ed9d0cc83c2842e093fe5a494d5b8fb5b1db06356b327081832f52"),
            EventKind::StrategyAdded => b256!("3f008fd510eae7a9e7bee13513d7b83bef8003d488b5a3d0b0da4de71d6846f1"),
            EventKind::StrategyRemoved => b256!("09a1db4b80c32706328728508c941a6b954f31eb5affd32f236c1fd405f8fea4"),
        }
    }

    /// Returns the canonical Solidity signature the topic is hashed from
    pub fn signature(&self) -> &'static str {
        match self {
            EventKind::UserAction => "RegisterUserAction(address,uint256,bool)",
            EventKind::StrategyEarned => "RegisterStrategyEarned(address,uint256)",
            EventKind::Deposit => "Deposit(address,uint256)",
            EventKind::Withdraw => "Withdraw(address,uint256)",
            EventKind::AddressChangeAnnounce => "AddressChangeAnnounce(uint8,address)",
            EventKind::UintChangeAnnounce => "UintChangeAnnounce(uint8,uint256)",
            EventKind::RatioChangeAnnounced => "RatioChangeAnnounced(uint8,uint256,uint256)",
            EventKind::TokenMoveAnnounced => "TokenMoveAnnounced(uint8,address,address,uint256)",
            EventKind::ProxyUpgradeAnnounced => "ProxyUpgradeAnnounced(address,address)",
            EventKind::MintAnnounced => "MintAnnounced(uint256,address,address)",
            EventKind::AnnounceClosed => "AnnounceClosed(bytes32)",
            EventKind::StrategyUpgradeAnnounced => "StrategyUpgradeAnnounced(address,address)",
            EventKind::VaultStop => "VaultStop(address)",
            EventKind::HardWorkerAdded => "HardWorkerAdded(address)",
            EventKind::HardWorkerRemoved => "HardWorkerRemoved(address)",
            EventKind::AddedToWhiteList => "AddedToWhiteList(address)",
            EventKind::RemovedFromWhiteList => "RemovedFromWhiteList(address)",
            EventKind::VaultAndStrategyAdded => "VaultAndStrategyAdded(address,address)",
            EventKind::ControllerTokenMoved => "ControllerTokenMoved(address,address,uint256)",
            EventKind::StrategyTokenMoved => "StrategyTokenMoved(address,address,uint256)",
            EventKind::FundKeeperTokenMoved => "FundKeeperTokenMoved(address,address,uint256)",
            EventKind::UpdatedAddressSlot => "UpdatedAddressSlot(string,address,address)",
            EventKind::UpdatedUint256Slot => "UpdatedUint256Slot(string,uint256,uint256)",
            EventKind::VaultStrategyChanged => "VaultStrategyChanged(address,address,address)",
            EventKind::ProxyUpgraded => "ProxyUpgraded(address,address,address)",
            EventKind::Minted => "Minted(address,uint256,address,address,bool)",
            EventKind::DistributorChanged => "DistributorChanged(address)",
            EventKind::StrategyAdded => "StrategyAdded(address)",
            EventKind::StrategyRemoved => "StrategyRemoved(address)",
        }
    }

    /// Returns the human-readable event name
    pub fn name(&self) -> &'static str {
        let signature = self.signature();
        match signature.find('(') {
            Some(idx) => &signature[..idx],
            None => signature,
        }
    }

    /// Number of 32-byte argument words (indexed topics plus data words)
    pub fn arity(&self) -> usize {
        let signature = self.signature();
        let params = &signature[self.name().len() + 1..signature.len() - 1];
        if params.is_empty() {
            0
        } else {
            params.split(',').count()
        }
    }

    /// Contract family that emits this event
    pub fn source(&self) -> EventSource {
        match self {
            EventKind::UserAction | EventKind::StrategyEarned => EventSource::Bookkeeper,
            EventKind::Deposit | EventKind::Withdraw => EventSource::Vault,
            EventKind::AddressChangeAnnounce
            | EventKind::UintChangeAnnounce
            | EventKind::RatioChangeAnnounced
            | EventKind::TokenMoveAnnounced
            | EventKind::ProxyUpgradeAnnounced
            | EventKind::MintAnnounced
            | EventKind::AnnounceClosed
            | EventKind::StrategyUpgradeAnnounced
            | EventKind::VaultStop => EventSource::Announcer,
            EventKind::StrategyAdded | EventKind::StrategyRemoved => EventSource::Splitter,
            _ => EventSource::Controller,
        }
    }
}

/// Static lookup table for topic0 hashes
static EVENT_TOPICS: LazyLock<HashMap<B256, EventKind>> =
    LazyLock::new(|| EventKind::ALL.iter().map(|kind| (kind.topic(), *kind)).collect());

/// Get the event kind for a topic0 hash, if it is catalogued
pub fn event_kind(topic0: &B256) -> Option<EventKind> {
    EVENT_TOPICS.get(topic0).copied()
}

/// Check if a topic0 hash belongs to the catalogue
pub fn is_known_topic(topic0: &B256) -> bool {
    EVENT_TOPICS.contains_key(topic0)
}

/// All catalogued events emitted by one contract family
pub fn kinds_for(source: EventSource) -> Vec<EventKind> {
    EventKind::ALL
        .iter()
        .copied()
        .filter(|kind| kind.source() == source)
        .collect()
}

/// Topics to subscribe to for one contract family
pub fn topics_for(source: EventSource) -> Vec<B256> {
    kinds_for(source).iter().map(EventKind::topic).collect()
}

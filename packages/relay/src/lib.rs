//! Vaultwatch Relay Library
//!
//! This crate provides components for watching vault platform contracts,
//! enriching their events with on-chain reads, and relaying them as webhook
//! notifications.

pub mod chain;
pub mod config;
pub mod contracts;
pub mod decoder;
pub mod dispatcher;
pub mod format;
pub mod handlers;
pub mod limiter;
pub mod metadata;
pub mod node;
pub mod notification;
pub mod registry;
pub mod signatures;
pub mod sink;
pub mod watcher;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use chain::{ChainError, ChainReader, ChainSubscriber, TxLog, TxReceipt};
pub use config::{Network, RelayConfig};
pub use decoder::{decode_log, RawEvent};
pub use dispatcher::Dispatcher;
pub use notification::{ChannelKind, Notification};
pub use signatures::{event_kind, EventKind, EventSource};
pub use sink::Sink;

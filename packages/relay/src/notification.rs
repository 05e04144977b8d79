//! Notification
//!
//! The formatted message a handler produces and the sink delivers.

use alloy::primitives::TxHash;
use serde::{Deserialize, Serialize};

/// Embed color of deposit reports
pub const DEPOSIT_COLOR: u32 = 0x25a826;
/// Embed color of withdraw reports
pub const WITHDRAW_COLOR: u32 = 0xb32424;
/// Embed color of strategy earned reports
pub const EARNED_COLOR: u32 = 0x686868;

/// Destination channel of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelKind {
    UserAction,
    StrategyEarned,
    Announcement,
    ImportantMessage,
    Error,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 5] = [
        ChannelKind::UserAction,
        ChannelKind::StrategyEarned,
        ChannelKind::Announcement,
        ChannelKind::ImportantMessage,
        ChannelKind::Error,
    ];

    /// Embed color used when the handler does not pick one
    pub fn default_color(&self) -> u32 {
        match self {
            ChannelKind::UserAction => DEPOSIT_COLOR,
            ChannelKind::StrategyEarned => EARNED_COLOR,
            ChannelKind::Announcement => 0xe0a526,
            ChannelKind::ImportantMessage => 0x3a7bd5,
            ChannelKind::Error => 0xd93025,
        }
    }
}

/// A ready-to-send message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    /// Field name shown above the body
    pub short_name: String,
    pub body: String,
    /// Hash with 0x prefix, empty when unknown
    pub transaction_hash: String,
    pub kind: ChannelKind,
    pub color: u32,
}

impl Notification {
    /// Create a notification with the channel's default color
    pub fn new(
        kind: ChannelKind,
        transaction_hash: Option<TxHash>,
        title: impl Into<String>,
        short_name: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            short_name: short_name.into(),
            body: body.into(),
            transaction_hash: transaction_hash.map(|h| format!("{:#x}", h)).unwrap_or_default(),
            kind,
            color: kind.default_color(),
        }
    }

    pub fn with_color(mut self, color: u32) -> Self {
        self.color = color;
        self
    }
}

/// Parse a `#rrggbb` color into its integer form
pub fn color_from_hex(hex: &str) -> Option<u32> {
    u32::from_str_radix(hex.trim_start_matches('#'), 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    #[test]
    fn test_new_uses_default_color() {
        let n = Notification::new(ChannelKind::Announcement, None, "t", "s", "b");
        assert_eq!(n.color, ChannelKind::Announcement.default_color());
        assert_eq!(n.transaction_hash, "");
    }

    #[test]
    fn test_transaction_hash_is_prefixed_hex() {
        let n = Notification::new(ChannelKind::Error, Some(B256::repeat_byte(0x11)), "t", "s", "b");
        assert_eq!(n.transaction_hash, format!("0x{}", "11".repeat(32)));
    }

    #[test]
    fn test_with_color_overrides() {
        let n = Notification::new(ChannelKind::UserAction, None, "t", "s", "b").with_color(WITHDRAW_COLOR);
        assert_eq!(n.color, 0xb32424);
    }

    #[test]
    fn test_color_from_hex() {
        assert_eq!(color_from_hex("#25a826"), Some(DEPOSIT_COLOR));
        assert_eq!(color_from_hex("686868"), Some(EARNED_COLOR));
        assert_eq!(color_from_hex("#zz"), None);
    }

    #[test]
    fn test_notification_json_is_camel_case() {
        let n = Notification::new(ChannelKind::ImportantMessage, None, "t", "s", "b");
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains("\"shortName\""));
        assert!(json.contains("\"importantMessage\""));
    }
}

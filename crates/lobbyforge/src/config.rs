//! Engine configuration.

use std::time::Duration;

use lobbyforge_channel::ChannelConfig;
use lobbyforge_protocol::UserId;
use serde::{Deserialize, Serialize};

/// Settings for an [`Engine`](crate::Engine).
///
/// Every field has a default, so a partial document deserializes into a
/// complete config. Loading it from disk is the caller's business.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// A session silent for this long is logged out by the sweep.
    pub activity_timeout: Duration,

    /// How often the sweep looks for silent sessions.
    pub sweep_interval: Duration,

    /// Protocol version announced at login.
    pub protocol_version: i32,

    /// Longer chat messages are cut and end in `...`.
    pub max_message_length: usize,

    /// Name the server speaks under in private notices.
    pub bot_name: String,

    pub bot_id: UserId,

    /// Refuse logins from everyone but staff.
    pub maintenance: bool,

    /// Channels that exist for the lifetime of the process.
    pub permanent_channels: Vec<ChannelConfig>,
}

impl EngineConfig {
    /// Cuts `body` to the configured length, marking the cut with `...`.
    pub fn truncate_message(&self, body: &str) -> String {
        let limit = self.max_message_length;
        if body.chars().count() <= limit {
            return body.to_string();
        }
        let kept: String = body.chars().take(limit.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            activity_timeout: Duration::from_secs(20),
            sweep_interval: Duration::from_secs(60),
            protocol_version: 19,
            max_message_length: 2048,
            bot_name: "Lobbybot".to_string(),
            bot_id: UserId(999),
            maintenance: false,
            permanent_channels: default_channels(),
        }
    }
}

fn default_channels() -> Vec<ChannelConfig> {
    let mut osu = ChannelConfig::new("#osu", "General discussion.");
    osu.auto_join = true;
    let mut announce = ChannelConfig::new("#announce", "Server announcements.");
    announce.public_write = false;
    announce.auto_join = true;
    let lobby = ChannelConfig::new("#lobby", "Multiplayer lobby discussion.");
    vec![osu, announce, lobby]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = EngineConfig::default();
        assert_eq!(config.activity_timeout, Duration::from_secs(20));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.protocol_version, 19);
        assert_eq!(config.max_message_length, 2048);
        assert!(!config.maintenance);
    }

    #[test]
    fn test_default_channels_announce_is_read_only() {
        let config = EngineConfig::default();
        let names: Vec<&str> = config.permanent_channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["#osu", "#announce", "#lobby"]);
        let announce = &config.permanent_channels[1];
        assert!(announce.public_read);
        assert!(!announce.public_write);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "protocol_version": 20, "bot_name": "Referee" }"#).unwrap();
        assert_eq!(config.protocol_version, 20);
        assert_eq!(config.bot_name, "Referee");
        assert_eq!(config.max_message_length, 2048);
        assert_eq!(config.permanent_channels.len(), 3);
    }

    #[test]
    fn test_truncate_message_short_unchanged() {
        let config = EngineConfig::default();
        assert_eq!(config.truncate_message("hello"), "hello");
    }

    #[test]
    fn test_truncate_message_long_cut_with_ellipsis() {
        let config = EngineConfig {
            max_message_length: 10,
            ..EngineConfig::default()
        };
        let cut = config.truncate_message("abcdefghijklmnop");
        assert_eq!(cut, "abcdefg...");
        assert_eq!(cut.len(), 10);
    }

    #[test]
    fn test_truncate_message_exact_limit_unchanged() {
        let config = EngineConfig {
            max_message_length: 5,
            ..EngineConfig::default()
        };
        assert_eq!(config.truncate_message("abcde"), "abcde");
    }
}

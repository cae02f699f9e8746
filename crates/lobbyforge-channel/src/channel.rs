//! A single chat channel and its member list.

use std::sync::Arc;

use lobbyforge_protocol::{ChannelInfoRecord, ChatMessage, UserId};
use lobbyforge_session::Session;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Static settings of a permanent channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub description: String,
    /// Anyone may join and read.
    #[serde(default = "default_true")]
    pub public_read: bool,
    /// Anyone may write. Staff can always write.
    #[serde(default = "default_true")]
    pub public_write: bool,
    /// Joined automatically at login.
    #[serde(default)]
    pub auto_join: bool,
}

fn default_true() -> bool {
    true
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            public_read: true,
            public_write: true,
            auto_join: false,
        }
    }
}

/// Read-only view of a channel for status pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub name: String,
    pub description: String,
    pub member_count: usize,
    pub temporary: bool,
    pub public_read: bool,
    pub public_write: bool,
}

/// Maps a canonical channel name to what graphical clients display.
///
/// Match and spectator channels are numbered per match/host, but every
/// client shows them under one fixed tab name.
pub fn display_name(name: &str) -> &str {
    if name.starts_with("#spec_") {
        "#spectator"
    } else if name.starts_with("#multi_") {
        "#multiplayer"
    } else {
        name
    }
}

/// A named broadcast group.
#[derive(Debug)]
pub struct Channel {
    name: String,
    description: String,
    public_read: bool,
    public_write: bool,
    auto_join: bool,
    temporary: bool,
    members: RwLock<Vec<Arc<Session>>>,
}

impl Channel {
    pub fn permanent(config: &ChannelConfig) -> Self {
        Self {
            name: config.name.clone(),
            description: config.description.clone(),
            public_read: config.public_read,
            public_write: config.public_write,
            auto_join: config.auto_join,
            temporary: false,
            members: RwLock::new(Vec::new()),
        }
    }

    /// A public channel that disappears when its last member leaves.
    pub fn temporary(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            public_read: true,
            public_write: true,
            auto_join: false,
            temporary: true,
            members: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        display_name(&self.name)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn auto_join(&self) -> bool {
        self.auto_join
    }

    pub fn can_read(&self, session: &Session) -> bool {
        self.public_read || session.privileges().is_channel_staff()
    }

    pub fn can_write(&self, session: &Session) -> bool {
        self.public_write || session.privileges().is_channel_staff()
    }

    pub fn is_member(&self, session: &Session) -> bool {
        self.members
            .read()
            .iter()
            .any(|m| std::ptr::eq(Arc::as_ptr(m), session))
    }

    pub fn has_user(&self, user_id: UserId) -> bool {
        self.members.read().iter().any(|m| m.id() == user_id)
    }

    pub fn member_count(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// Snapshot of the members in join order.
    pub fn members(&self) -> Vec<Arc<Session>> {
        self.members.read().clone()
    }

    /// What a client sees in its channel list.
    pub fn info_record(&self) -> ChannelInfoRecord {
        ChannelInfoRecord {
            name: self.display_name().to_string(),
            description: self.description.clone(),
            member_count: self.member_count().min(u16::MAX as usize) as u16,
        }
    }

    pub fn descriptor(&self) -> ChannelDescriptor {
        ChannelDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            member_count: self.member_count(),
            temporary: self.temporary,
            public_read: self.public_read,
            public_write: self.public_write,
        }
    }

    /// Adds a member. Returns `false` if the session was already in.
    pub(crate) fn insert(&self, session: &Arc<Session>) -> bool {
        let mut members = self.members.write();
        if members.iter().any(|m| Arc::ptr_eq(m, session)) {
            return false;
        }
        members.push(Arc::clone(session));
        true
    }

    /// Removes a member. Returns `false` if the session wasn't in.
    pub(crate) fn remove(&self, session: &Session) -> bool {
        let mut members = self.members.write();
        let before = members.len();
        members.retain(|m| !std::ptr::eq(Arc::as_ptr(m), session));
        members.len() != before
    }

    /// Delivers `message` to every member except `from`.
    pub fn send_message(&self, from: UserId, message: &ChatMessage) -> usize {
        let recipients: Vec<Arc<Session>> = self
            .members
            .read()
            .iter()
            .filter(|m| m.id() != from)
            .cloned()
            .collect();
        for member in &recipients {
            member.on_message(message);
        }
        recipients.len()
    }

    /// Queues raw frames for every member.
    pub fn enqueue_all(&self, frames: &[u8]) {
        for member in self.members() {
            member.enqueue(frames);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lobbyforge_protocol::Privileges;
    use lobbyforge_session::{Delivery, UserIdentity};

    fn session(id: i32) -> Arc<Session> {
        Session::new(
            UserIdentity::new(UserId(id), format!("user{id}"), Privileges::NORMAL),
            Delivery::polled(),
        )
    }

    #[test]
    fn test_display_name_maps_numbered_channels() {
        assert_eq!(display_name("#multi_12"), "#multiplayer");
        assert_eq!(display_name("#spec_1000"), "#spectator");
        assert_eq!(display_name("#osu"), "#osu");
    }

    #[test]
    fn test_send_message_skips_sender() {
        let channel = Channel::temporary("#multi_1", "match");
        let a = session(1);
        let b = session(2);
        channel.insert(&a);
        channel.insert(&b);

        let message = ChatMessage {
            sender: "user1".into(),
            body: "hello".into(),
            to: "#multiplayer".into(),
            sender_id: UserId(1),
        };
        assert_eq!(channel.send_message(UserId(1), &message), 1);
        assert!(a.dequeue().is_empty());
        assert!(!b.dequeue().is_empty());
    }

    #[test]
    fn test_insert_is_idempotent() {
        let channel = Channel::temporary("#spec_1", "spectators");
        let a = session(1);
        assert!(channel.insert(&a));
        assert!(!channel.insert(&a));
        assert_eq!(channel.member_count(), 1);
        assert!(channel.remove(&a));
        assert!(!channel.remove(&a));
    }

    #[test]
    fn test_info_record_uses_display_name() {
        let channel = Channel::temporary("#multi_3", "Channel for #multi_3");
        channel.insert(&session(1));
        let info = channel.info_record();
        assert_eq!(info.name, "#multiplayer");
        assert_eq!(info.member_count, 1);
    }

    #[test]
    fn test_channel_config_deserializes_with_defaults() {
        let config: ChannelConfig =
            serde_json::from_str(r##"{"name":"#osu","description":"main"}"##).unwrap();
        assert!(config.public_read);
        assert!(config.public_write);
        assert!(!config.auto_join);
    }
}

//! The channel registry: permanent channels from config, temporary channels
//! for matches and spectator groups.
//!
//! Membership changes go through the registry rather than the channel
//! because two of their side effects reach beyond the channel itself: a
//! permanent channel's new member count is broadcast to every connected
//! session, and an emptied temporary channel is removed from the registry.

use std::sync::Arc;

use dashmap::DashMap;
use lobbyforge_session::{Session, SessionDirectory};

use crate::{Channel, ChannelConfig, ChannelDescriptor, ChannelError};

/// All live channels, keyed by canonical name.
#[derive(Debug)]
pub struct ChannelRegistry {
    channels: DashMap<String, Arc<Channel>>,
    directory: Arc<SessionDirectory>,
}

impl ChannelRegistry {
    pub fn new(directory: Arc<SessionDirectory>) -> Self {
        Self {
            channels: DashMap::new(),
            directory,
        }
    }

    /// Builds a registry with the given permanent channels.
    pub fn with_channels(directory: Arc<SessionDirectory>, configs: &[ChannelConfig]) -> Self {
        let registry = Self::new(directory);
        for config in configs {
            registry.add_permanent(config);
        }
        registry
    }

    /// Adds (or replaces) a permanent channel.
    pub fn add_permanent(&self, config: &ChannelConfig) -> Arc<Channel> {
        let channel = Arc::new(Channel::permanent(config));
        self.channels.insert(config.name.clone(), Arc::clone(&channel));
        tracing::info!(channel = %config.name, "permanent channel added");
        channel
    }

    /// Returns the temporary channel `name`, creating it if needed.
    pub fn create_temporary(&self, name: &str, description: &str) -> Arc<Channel> {
        let channel = self
            .channels
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(channel = name, "temporary channel created");
                Arc::new(Channel::temporary(name, description))
            });
        Arc::clone(channel.value())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.get(name).map(|c| Arc::clone(c.value()))
    }

    /// Like [`get`](Self::get) but reports an unknown name as an error.
    pub fn require(&self, name: &str) -> Result<Arc<Channel>, ChannelError> {
        self.get(name)
            .ok_or_else(|| ChannelError::UnknownChannel(name.to_string()))
    }

    /// Removes a channel outright, parting every member first.
    pub fn remove(&self, name: &str) -> bool {
        let Some((_, channel)) = self.channels.remove(name) else {
            return false;
        };
        for member in channel.members() {
            channel.remove(&member);
            member.on_channel_leave(channel.display_name(), channel.name());
        }
        true
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Joins `session` to `channel`.
    ///
    /// - Already a member: the join is acknowledged again and `true` is
    ///   returned, nothing else changes.
    /// - Not readable for this session: `false`, nothing changes and nothing
    ///   is sent.
    /// - Otherwise the session is added and the new descriptor is broadcast:
    ///   to the channel's own members for a temporary channel, to every
    ///   connected session for a permanent one.
    pub fn join(&self, channel: &Arc<Channel>, session: &Arc<Session>) -> bool {
        if channel.is_member(session) {
            session.on_channel_join(channel.display_name(), channel.name());
            return true;
        }
        if !channel.can_read(session) {
            tracing::debug!(
                user_id = %session.id(),
                channel = channel.name(),
                "join refused, channel not readable"
            );
            return false;
        }
        if !channel.insert(session) {
            // Lost a race with a concurrent join of the same session.
            session.on_channel_join(channel.display_name(), channel.name());
            return true;
        }

        session.on_channel_join(channel.display_name(), channel.name());
        for member in channel.members() {
            if !Arc::ptr_eq(&member, session) {
                member.on_member_joined(session, channel.name());
            }
        }
        self.broadcast_info(channel);

        tracing::info!(user_id = %session.id(), channel = channel.name(), "joined channel");
        true
    }

    /// Removes `session` from `channel`.
    ///
    /// Returns `false` if it wasn't a member. An emptied temporary channel is
    /// deleted from the registry.
    pub fn leave(&self, channel: &Arc<Channel>, session: &Arc<Session>) -> bool {
        if !channel.remove(session) {
            return false;
        }

        session.on_channel_leave(channel.display_name(), channel.name());
        for member in channel.members() {
            member.on_member_left(session, channel.name());
        }

        if channel.is_temporary() && channel.is_empty() {
            let removed = self
                .channels
                .remove_if(channel.name(), |_, stored| Arc::ptr_eq(stored, channel))
                .is_some();
            if removed {
                tracing::debug!(channel = channel.name(), "temporary channel deleted");
            }
        } else {
            self.broadcast_info(channel);
        }

        tracing::info!(user_id = %session.id(), channel = channel.name(), "left channel");
        true
    }

    /// Joins by name. Unknown channels are an error.
    pub fn join_by_name(&self, name: &str, session: &Arc<Session>) -> Result<bool, ChannelError> {
        let channel = self.require(name)?;
        Ok(self.join(&channel, session))
    }

    pub fn leave_by_name(&self, name: &str, session: &Arc<Session>) -> Result<bool, ChannelError> {
        let channel = self.require(name)?;
        Ok(self.leave(&channel, session))
    }

    /// Removes the session from every channel it is in. Returns the names.
    pub fn leave_all(&self, session: &Arc<Session>) -> Vec<String> {
        let joined: Vec<Arc<Channel>> = self
            .channels
            .iter()
            .filter(|c| c.is_member(session))
            .map(|c| Arc::clone(c.value()))
            .collect();
        joined
            .into_iter()
            .filter(|channel| self.leave(channel, session))
            .map(|channel| channel.name().to_string())
            .collect()
    }

    /// Permanent channels a session should see in its channel list.
    pub fn listing_for(&self, session: &Session) -> Vec<Arc<Channel>> {
        let mut listed: Vec<Arc<Channel>> = self
            .channels
            .iter()
            .filter(|c| !c.is_temporary() && c.can_read(session))
            .map(|c| Arc::clone(c.value()))
            .collect();
        listed.sort_by(|a, b| a.name().cmp(b.name()));
        listed
    }

    /// Permanent channels joined at login.
    pub fn auto_join_channels(&self) -> Vec<Arc<Channel>> {
        let mut channels: Vec<Arc<Channel>> = self
            .channels
            .iter()
            .filter(|c| c.auto_join())
            .map(|c| Arc::clone(c.value()))
            .collect();
        channels.sort_by(|a, b| a.name().cmp(b.name()));
        channels
    }

    /// Descriptors of every channel, sorted by name.
    pub fn descriptors(&self) -> Vec<ChannelDescriptor> {
        let mut all: Vec<ChannelDescriptor> =
            self.channels.iter().map(|c| c.descriptor()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    fn broadcast_info(&self, channel: &Channel) {
        let info = channel.info_record();
        let audience = if channel.is_temporary() {
            channel.members()
        } else {
            self.directory.enumerate_all(false)
        };
        for session in audience {
            if channel.is_temporary() || channel.can_read(&session) {
                session.on_channel_info(&info);
            }
        }
    }
}

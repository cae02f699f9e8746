//! `Engine` builder, login and logout.
//!
//! The engine ties the layers together: it owns the session directory, the
//! channel registry and the match registry, and every transport calls into
//! it with a session and a packet. There are no process-wide singletons;
//! construct one engine at startup and share it as `Arc<Engine>`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lobbyforge_channel::ChannelRegistry;
use lobbyforge_match::{DiscardEvents, MatchEventSink, MatchRegistry};
use lobbyforge_protocol::{packets, PresenceFilter, Privileges, UserId};
use lobbyforge_session::{
    unix_now, Delivery, Session, SessionDirectory, StatsSnapshot, UserIdentity,
};

use crate::EngineConfig;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring an [`Engine`].
///
/// # Example
///
/// ```rust
/// use lobbyforge::{Engine, EngineConfig};
///
/// let engine = Engine::builder()
///     .config(EngineConfig::default())
///     .build();
/// assert!(engine.directory().is_empty());
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    events: Arc<dyn MatchEventSink>,
}

impl EngineBuilder {
    /// Creates a builder with the default config and no event consumer.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            events: Arc::new(DiscardEvents),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Where finished rounds are reported.
    pub fn events(mut self, sink: Arc<dyn MatchEventSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn build(self) -> Engine {
        let directory = Arc::new(SessionDirectory::new());
        let channels = Arc::new(ChannelRegistry::with_channels(
            Arc::clone(&directory),
            &self.config.permanent_channels,
        ));
        let matches = Arc::new(MatchRegistry::new(
            Arc::clone(&directory),
            Arc::clone(&channels),
            self.events,
        ));

        tracing::info!(
            channels = channels.len(),
            maintenance = self.config.maintenance,
            "engine ready"
        );

        Engine {
            maintenance: AtomicBool::new(self.config.maintenance),
            config: self.config,
            directory,
            channels,
            matches,
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Login inputs and outcome
// ---------------------------------------------------------------------------

/// Stored account data the authenticator hands over at login.
#[derive(Debug, Clone, Default)]
pub struct LoginProfile {
    pub friends: Vec<UserId>,
    /// Indexed by game mode.
    pub stats: [StatsSnapshot; 4],
    /// Unix seconds.
    pub silence_end: u64,
    pub friends_only_dms: bool,
}

/// Result of [`Engine::connect`].
///
/// Either way the session's delivery carries the reply the client needs;
/// a refused session is never registered.
#[derive(Debug)]
pub enum Login {
    Accepted(Arc<Session>),
    Refused(Arc<Session>),
}

impl Login {
    pub fn session(&self) -> &Arc<Session> {
        match self {
            Self::Accepted(session) | Self::Refused(session) => session,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The running lobby engine.
#[derive(Debug)]
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) directory: Arc<SessionDirectory>,
    pub(crate) channels: Arc<ChannelRegistry>,
    pub(crate) matches: Arc<MatchRegistry>,
    pub(crate) maintenance: AtomicBool,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<SessionDirectory> {
        &self.directory
    }

    pub fn channels(&self) -> &Arc<ChannelRegistry> {
        &self.channels
    }

    pub fn matches(&self) -> &Arc<MatchRegistry> {
        &self.matches
    }

    pub fn is_maintenance(&self) -> bool {
        self.maintenance.load(Ordering::Relaxed)
    }

    /// Logs in an authenticated identity with an empty profile.
    pub fn connect(&self, identity: UserIdentity, delivery: Delivery) -> Login {
        self.connect_with(identity, delivery, LoginProfile::default())
    }

    /// Logs in an authenticated identity.
    ///
    /// A tournament window whose owner is online becomes a sub-session of
    /// the owner; otherwise it logs in as an ordinary session. An ordinary
    /// login replaces any session already holding the same id.
    pub fn connect_with(
        &self,
        mut identity: UserIdentity,
        delivery: Delivery,
        profile: LoginProfile,
    ) -> Login {
        if self.is_maintenance() && !is_staff(identity.privileges) {
            let session = Session::new(identity, delivery);
            session.notify("The server is in maintenance mode. Please try again later.");
            session.enqueue(&packets::login_reply(packets::LOGIN_MAINTENANCE));
            tracing::info!(user_id = %session.id(), "login refused, maintenance mode");
            return Login::Refused(session);
        }

        let owner = self.directory.by_id(identity.id);
        if identity.tournament_client && owner.is_none() {
            identity.tournament_client = false;
        }
        if !identity.tournament_client {
            if let Some(stale) = owner {
                stale.notify("You have logged in from another location.");
                self.logout(&stale);
            }
        }

        let session = Session::new(identity, delivery);
        apply_profile(&session, profile);

        let registered = if session.is_sub_session() {
            self.directory.register_sub_session(Arc::clone(&session))
        } else {
            self.directory.register(Arc::clone(&session))
        };
        if !registered {
            session.enqueue(&packets::login_reply(-1));
            tracing::warn!(user_id = %session.id(), "login refused, directory collision");
            return Login::Refused(session);
        }

        self.send_login_burst(&session);
        tracing::info!(
            user_id = %session.id(),
            name = session.name(),
            delivery = session.delivery().kind(),
            sub_session = session.is_sub_session(),
            "logged in"
        );
        Login::Accepted(session)
    }

    fn send_login_burst(&self, session: &Arc<Session>) {
        session.enqueue(&packets::protocol_version(self.config.protocol_version));
        session.enqueue(&packets::login_reply(session.id().0));
        session.enqueue(&packets::login_permissions(session.privileges().client_rank()));

        let (friends, silence_left) = {
            let state = session.state();
            (state.friends.clone(), state.silence_end.saturating_sub(unix_now()))
        };
        session.enqueue(&packets::friends_list(&friends));
        session.enqueue(&packets::silence_end(clamp_i32(silence_left)));

        let own_presence = packets::user_presence(&session.presence_record());
        session.enqueue(&own_presence);
        session.enqueue(&packets::user_stats(&session.stats_record()));

        for channel in self.channels.listing_for(session) {
            session.on_channel_info(&channel.info_record());
        }
        session.enqueue(&packets::channel_info_end());

        if is_restricted(session) {
            session.enqueue(&packets::account_restricted());
        }

        if session.is_sub_session() {
            return;
        }

        for channel in self.channels.auto_join_channels() {
            self.channels.join(&channel, session);
        }

        for other in self.directory.enumerate_all(true) {
            if Arc::ptr_eq(&other, session) || is_restricted(&other) {
                continue;
            }
            session.enqueue(&packets::user_presence(&other.presence_record()));
            if !is_restricted(session) && wants_presence_of(&other, session) {
                other.enqueue(&own_presence);
            }
        }
    }

    /// Logs a session out and releases everything it holds: match seat,
    /// spectator links, channel memberships and directory entries.
    ///
    /// Logging out a primary session logs out its sub-sessions first.
    /// Returns `false` when the session was not registered.
    pub fn logout(&self, session: &Arc<Session>) -> bool {
        if !session.is_sub_session() {
            for sub in session.sub_sessions() {
                self.logout(&sub);
            }
        }

        self.matches.leave(session);
        let watching = session.state().watching_match;
        if let Some(id) = watching {
            self.release_watch(session, id);
        }
        self.stop_spectating(session);
        for spectator in session.spectators() {
            self.stop_spectating(&spectator);
        }
        self.channels.leave_all(session);

        let removed = self.directory.unregister(session);
        if removed && !session.is_sub_session() {
            for other in self.directory.enumerate_all(false) {
                other.on_user_logout(session);
            }
        }
        if removed {
            tracing::info!(user_id = %session.id(), name = session.name(), "logged out");
        }
        removed
    }
}

fn apply_profile(session: &Session, profile: LoginProfile) {
    let mut state = session.state();
    state.friends = profile.friends;
    state.stats = profile.stats;
    state.silence_end = profile.silence_end;
    state.friends_only_dms = profile.friends_only_dms;
}

/// Roles that may log in during maintenance and moderate chat.
pub(crate) fn is_staff(privileges: Privileges) -> bool {
    privileges.is_channel_staff()
}

/// Restricted accounts lack the public bit: nobody else sees them.
pub(crate) fn is_restricted(session: &Session) -> bool {
    !session.privileges().has(Privileges::PUBLIC)
}

/// Whether `viewer`'s presence filter lets `subject`'s presence through.
pub(crate) fn wants_presence_of(viewer: &Session, subject: &Session) -> bool {
    let filter = viewer.state().presence_filter;
    match filter {
        PresenceFilter::Nobody => false,
        PresenceFilter::All => true,
        PresenceFilter::Friends => viewer.is_friend(subject.id()),
    }
}

pub(crate) fn clamp_i32(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

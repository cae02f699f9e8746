//! Session types: one logged-in identity on one connection.
//!
//! A session is the server's live record of a connected user. It tracks:
//! - WHO the user is ([`UserIdentity`], fixed for the session's lifetime)
//! - WHAT they're doing (presence status, per-mode stats)
//! - WHO they watch and who watches them (spectator links)
//! - WHERE they are (match back-reference, lobby flag)
//! - HOW to reach them ([`Delivery`])
//!
//! Sessions are shared as `Arc<Session>`: the directory, channels and match
//! slots all hold handles to the same session. Everything that changes after
//! login lives in [`SessionState`] behind a `parking_lot::Mutex`, so the lock
//! is only ever held for a few field updates and never across I/O.
//!
//! # Sub-sessions
//!
//! Tournament clients open extra windows that log in as the same user. Each
//! window gets its own session (own token, own delivery) stored in the
//! primary session's sub-session map rather than in the directory's id
//! index, because the id is already taken by the primary.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use lobbyforge_protocol::record::ChannelInfoRecord;
use lobbyforge_protocol::{
    packets, ChatMessage, GameMode, MatchId, PresenceFilter, PresenceRecord, Privileges,
    StatsRecord, StatusRecord, UserId,
};
use parking_lot::{Mutex, MutexGuard};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::Delivery;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// What the external authenticator knows about a user at login time.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub id: UserId,
    pub name: String,
    pub privileges: Privileges,
    /// Numeric country code as used by the client.
    pub country: u8,
    /// UTC offset in hours.
    pub utc_offset: i8,
    pub latitude: f64,
    pub longitude: f64,
    /// `true` for secondary tournament-client windows.
    pub tournament_client: bool,
}

impl UserIdentity {
    /// An identity with defaults for everything but id, name and roles.
    pub fn new(id: UserId, name: impl Into<String>, privileges: Privileges) -> Self {
        Self {
            id,
            name: name.into(),
            privileges,
            country: 0,
            utc_offset: 0,
            latitude: 0.0,
            longitude: 0.0,
            tournament_client: false,
        }
    }
}

/// Lowercases and replaces spaces with underscores. Names are unique under
/// this normalisation.
pub fn safe_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Current wall-clock time in unix seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Generates a random 32-character hex token (128 bits).
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// One mode's statistics as last loaded from storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub ranked_score: i64,
    /// Percent, 0..=100.
    pub accuracy: f32,
    pub play_count: i32,
    pub total_score: u64,
    pub global_rank: i32,
    pub pp: i16,
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Mutable part of a session. Obtain it through [`Session::state`] and keep
/// the guard short-lived.
#[derive(Debug)]
pub struct SessionState {
    pub status: StatusRecord,
    pub stats: [StatsSnapshot; 4],
    pub friends: Vec<UserId>,
    pub presence_filter: PresenceFilter,
    /// Only accept private messages from friends.
    pub friends_only_dms: bool,
    pub away_message: Option<String>,
    /// Unix seconds until which the user may not chat.
    pub silence_end: u64,
    pub last_activity: Instant,
    pub match_id: Option<MatchId>,
    pub in_lobby: bool,
    /// Match a tournament client is watching without occupying a slot.
    pub watching_match: Option<MatchId>,
    spectators: Vec<Arc<Session>>,
    spectating: Option<Weak<Session>>,
    sub_sessions: HashMap<String, Arc<Session>>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            status: StatusRecord::default(),
            stats: [StatsSnapshot::default(); 4],
            friends: Vec::new(),
            presence_filter: PresenceFilter::default(),
            friends_only_dms: false,
            away_message: None,
            silence_end: 0,
            last_activity: Instant::now(),
            match_id: None,
            in_lobby: false,
            watching_match: None,
            spectators: Vec::new(),
            spectating: None,
            sub_sessions: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A single connected identity.
#[derive(Debug)]
pub struct Session {
    identity: UserIdentity,
    token: String,
    safe_name: String,
    delivery: Delivery,
    state: Mutex<SessionState>,
}

impl Session {
    /// Creates a session with a fresh token.
    pub fn new(identity: UserIdentity, delivery: Delivery) -> Arc<Self> {
        Self::with_token(identity, delivery, generate_token())
    }

    /// Creates a session with a caller-chosen token.
    pub fn with_token(identity: UserIdentity, delivery: Delivery, token: String) -> Arc<Self> {
        let safe_name = safe_name(&identity.name);
        Arc::new(Self {
            identity,
            token,
            safe_name,
            delivery,
            state: Mutex::new(SessionState::new()),
        })
    }

    pub fn id(&self) -> UserId {
        self.identity.id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn safe_name(&self) -> &str {
        &self.safe_name
    }

    pub fn privileges(&self) -> Privileges {
        self.identity.privileges
    }

    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    /// `true` for a secondary tournament-client window.
    pub fn is_sub_session(&self) -> bool {
        self.identity.tournament_client
    }

    /// Locks the mutable state.
    pub fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock()
    }

    // -- activity ---------------------------------------------------------

    /// Records that the client just sent something.
    pub fn touch(&self) {
        self.state.lock().last_activity = Instant::now();
    }

    /// How long the client has been silent as of `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.state.lock().last_activity)
    }

    // -- location ---------------------------------------------------------

    pub fn match_id(&self) -> Option<MatchId> {
        self.state.lock().match_id
    }

    pub fn set_match_id(&self, match_id: Option<MatchId>) {
        self.state.lock().match_id = match_id;
    }

    pub fn in_lobby(&self) -> bool {
        self.state.lock().in_lobby
    }

    pub fn set_in_lobby(&self, in_lobby: bool) {
        self.state.lock().in_lobby = in_lobby;
    }

    // -- silence ----------------------------------------------------------

    /// Seconds of silence left at `now` (unix seconds).
    pub fn silence_remaining(&self, now: u64) -> u64 {
        self.state.lock().silence_end.saturating_sub(now)
    }

    pub fn is_silenced(&self) -> bool {
        self.silence_remaining(unix_now()) > 0
    }

    pub fn silence_until(&self, until: u64) {
        self.state.lock().silence_end = until;
    }

    // -- friends ----------------------------------------------------------

    pub fn is_friend(&self, other: UserId) -> bool {
        self.state.lock().friends.contains(&other)
    }

    /// Adds a friend. Returns `false` if already present.
    pub fn add_friend(&self, other: UserId) -> bool {
        let mut state = self.state.lock();
        if state.friends.contains(&other) {
            return false;
        }
        state.friends.push(other);
        true
    }

    pub fn remove_friend(&self, other: UserId) -> bool {
        let mut state = self.state.lock();
        let before = state.friends.len();
        state.friends.retain(|id| *id != other);
        state.friends.len() != before
    }

    // -- spectating -------------------------------------------------------

    /// Adds a spectator. Returns `false` if they were already watching.
    pub fn add_spectator(&self, spectator: &Arc<Session>) -> bool {
        let mut state = self.state.lock();
        if state.spectators.iter().any(|s| Arc::ptr_eq(s, spectator)) {
            return false;
        }
        state.spectators.push(Arc::clone(spectator));
        true
    }

    pub fn remove_spectator(&self, spectator: &Session) -> bool {
        let mut state = self.state.lock();
        let before = state.spectators.len();
        state.spectators.retain(|s| !std::ptr::eq(Arc::as_ptr(s), spectator));
        state.spectators.len() != before
    }

    /// Snapshot of the current spectators.
    pub fn spectators(&self) -> Vec<Arc<Session>> {
        self.state.lock().spectators.clone()
    }

    /// The session being watched, if it is still alive.
    pub fn spectating(&self) -> Option<Arc<Session>> {
        self.state.lock().spectating.as_ref().and_then(Weak::upgrade)
    }

    pub fn set_spectating(&self, host: Option<&Arc<Session>>) {
        self.state.lock().spectating = host.map(Arc::downgrade);
    }

    // -- sub-sessions -----------------------------------------------------

    /// Attaches a tournament window. Returns `false` if the token is taken.
    pub fn attach_sub_session(&self, sub: Arc<Session>) -> bool {
        let mut state = self.state.lock();
        if state.sub_sessions.contains_key(sub.token()) {
            return false;
        }
        state.sub_sessions.insert(sub.token().to_string(), sub);
        true
    }

    pub fn detach_sub_session(&self, token: &str) -> Option<Arc<Session>> {
        self.state.lock().sub_sessions.remove(token)
    }

    pub fn sub_session(&self, token: &str) -> Option<Arc<Session>> {
        self.state.lock().sub_sessions.get(token).cloned()
    }

    pub fn sub_sessions(&self) -> Vec<Arc<Session>> {
        self.state.lock().sub_sessions.values().cloned().collect()
    }

    // -- records ----------------------------------------------------------

    pub fn presence_record(&self) -> PresenceRecord {
        let state = self.state.lock();
        let mode = state.status.mode;
        PresenceRecord {
            user_id: self.id(),
            name: self.identity.name.clone(),
            utc_offset: self.identity.utc_offset,
            country: self.identity.country,
            rank: self.identity.privileges.client_rank(),
            latitude: self.identity.latitude,
            longitude: self.identity.longitude,
            global_rank: state.stats[mode.index()].global_rank,
        }
    }

    /// Stats for the mode the user currently has selected.
    pub fn stats_record(&self) -> StatsRecord {
        let state = self.state.lock();
        let stats = state.stats[state.status.mode.index()];
        StatsRecord {
            user_id: self.id(),
            status: state.status.clone(),
            ranked_score: stats.ranked_score,
            accuracy: stats.accuracy,
            play_count: stats.play_count,
            total_score: stats.total_score,
            global_rank: stats.global_rank,
            pp: stats.pp,
        }
    }

    pub fn set_stats(&self, mode: GameMode, stats: StatsSnapshot) {
        self.state.lock().stats[mode.index()] = stats;
    }

    // -- delivery ---------------------------------------------------------

    /// Queues raw frames. Dropped for line-stream clients.
    pub fn enqueue(&self, frames: &[u8]) {
        self.delivery.enqueue(frames);
    }

    /// Takes the polled queue. Empty for push and line transports.
    pub fn dequeue(&self) -> Vec<u8> {
        self.delivery.drain()
    }

    /// Another user logged out.
    pub fn on_user_logout(&self, who: &Session) {
        match &self.delivery {
            Delivery::PolledQueue(_) | Delivery::PushSocket(_) => {
                self.delivery.enqueue(&packets::user_logout(who.id()));
            }
            Delivery::LineStream(_) => {
                self.delivery.send_line(format!(":{} QUIT :Logged out", who.name()));
            }
        }
    }

    /// A chat message addressed to this user or to a channel they are in.
    ///
    /// A primary session also forwards the message to its line-stream
    /// sub-sessions, which have no channel membership of their own.
    pub fn on_message(&self, message: &ChatMessage) {
        match &self.delivery {
            Delivery::PolledQueue(_) | Delivery::PushSocket(_) => {
                self.delivery.enqueue(&packets::send_message(message));
            }
            Delivery::LineStream(_) => {
                let target = if message.is_channel_message() {
                    message.to.as_str()
                } else {
                    self.name()
                };
                self.delivery.send_line(format!(
                    ":{} PRIVMSG {} :{}",
                    message.sender.replace(' ', "_"),
                    target,
                    message.body
                ));
            }
        }

        if !self.is_sub_session() {
            for sub in self.sub_sessions() {
                if sub.delivery.is_line_stream() {
                    sub.on_message(message);
                }
            }
        }
    }

    /// This session joined a channel. `display_name` is what graphical
    /// clients show; `server_name` is the canonical name.
    pub fn on_channel_join(&self, display_name: &str, server_name: &str) {
        match &self.delivery {
            Delivery::PolledQueue(_) | Delivery::PushSocket(_) => {
                self.delivery.enqueue(&packets::channel_join_success(display_name));
            }
            Delivery::LineStream(_) => {
                self.delivery.send_line(format!(":{} JOIN :{}", self.safe_name, server_name));
            }
        }
    }

    /// This session left (or was removed from) a channel.
    pub fn on_channel_leave(&self, display_name: &str, server_name: &str) {
        match &self.delivery {
            Delivery::PolledQueue(_) | Delivery::PushSocket(_) => {
                self.delivery.enqueue(&packets::channel_kick(display_name));
            }
            Delivery::LineStream(_) => {
                self.delivery.send_line(format!(":{} PART :{}", self.safe_name, server_name));
            }
        }
    }

    /// Someone else joined a channel this session is in.
    pub fn on_member_joined(&self, member: &Session, server_name: &str) {
        match &self.delivery {
            Delivery::PolledQueue(_) | Delivery::PushSocket(_) => {}
            Delivery::LineStream(_) => {
                self.delivery.send_line(format!(":{} JOIN :{}", member.safe_name(), server_name));
            }
        }
    }

    /// Someone else left a channel this session is in.
    pub fn on_member_left(&self, member: &Session, server_name: &str) {
        match &self.delivery {
            Delivery::PolledQueue(_) | Delivery::PushSocket(_) => {}
            Delivery::LineStream(_) => {
                self.delivery.send_line(format!(":{} PART :{}", member.safe_name(), server_name));
            }
        }
    }

    /// Updated channel descriptor (name, topic, member count).
    pub fn on_channel_info(&self, info: &ChannelInfoRecord) {
        match &self.delivery {
            Delivery::PolledQueue(_) | Delivery::PushSocket(_) => {
                self.delivery.enqueue(&packets::channel_info(info));
            }
            Delivery::LineStream(_) => {}
        }
    }

    /// A server notice shown as a popup (or a NOTICE line on the bridge).
    pub fn notify(&self, text: &str) {
        match &self.delivery {
            Delivery::PolledQueue(_) | Delivery::PushSocket(_) => {
                self.delivery.enqueue(&packets::notification(text));
            }
            Delivery::LineStream(_) => {
                self.delivery.send_line(format!("NOTICE {} :{}", self.safe_name, text));
            }
        }
    }
}

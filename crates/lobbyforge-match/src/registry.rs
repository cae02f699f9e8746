//! Match registry: creates, tracks and disbands matches.
//!
//! Each match sits behind its own `parking_lot::Mutex`, so operations on
//! one match are serialized while different matches run in parallel. The
//! map itself is a `DashMap`; entries are always cloned out before a match
//! is locked, so no map shard is ever held while waiting on a match.
//!
//! Lock order is match → channel → session. Never lock a match while
//! holding a session's state guard.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use dashmap::DashMap;
use lobbyforge_channel::ChannelRegistry;
use lobbyforge_protocol::{packets, MatchId, MatchRecord, UserId};
use lobbyforge_session::{Session, SessionDirectory};
use parking_lot::Mutex;

use crate::lobby::lobby_sessions;
use crate::{HostAuthority, LeaveOutcome, Match, MatchError, MatchEventSink, MatchServices, MatchSnapshot};

/// A match behind its lock.
pub type SharedMatch = Arc<Mutex<Match>>;

#[derive(Debug)]
pub struct MatchRegistry {
    matches: DashMap<MatchId, SharedMatch>,
    next_id: AtomicU16,
    services: Arc<MatchServices>,
}

impl MatchRegistry {
    pub fn new(
        directory: Arc<SessionDirectory>,
        channels: Arc<ChannelRegistry>,
        events: Arc<dyn MatchEventSink>,
    ) -> Self {
        Self {
            matches: DashMap::new(),
            next_id: AtomicU16::new(1),
            services: Arc::new(MatchServices {
                directory,
                channels,
                events,
            }),
        }
    }

    pub fn services(&self) -> &Arc<MatchServices> {
        &self.services
    }

    /// Next free id. Ids grow monotonically and wrap at the 16-bit limit,
    /// skipping 0 and ids still in use.
    fn allocate_id(&self) -> Option<MatchId> {
        for _ in 0..=u16::MAX {
            let id = MatchId(self.next_id.fetch_add(1, Ordering::Relaxed));
            if id.0 != 0 && !self.matches.contains_key(&id) {
                return Some(id);
            }
        }
        None
    }

    /// Creates a match hosted and joined by `host`.
    ///
    /// Refused (with a join failure sent to the client) when the host is
    /// already in a match or every slot is locked.
    pub fn create(&self, host: &Arc<Session>, settings: &MatchRecord) -> Option<MatchId> {
        self.insert(HostAuthority::Normal(Arc::clone(host)), settings)
    }

    /// Creates a tournament match. The referee controls it without taking
    /// a slot.
    pub fn create_tourney(&self, referee: &Arc<Session>, settings: &MatchRecord) -> Option<MatchId> {
        self.insert(HostAuthority::Tourney(Arc::clone(referee)), settings)
    }

    fn insert(&self, host: HostAuthority, settings: &MatchRecord) -> Option<MatchId> {
        let creator = Arc::clone(host.session());
        if creator.match_id().is_some() {
            creator.enqueue(&packets::match_join_fail());
            return None;
        }
        let Some(id) = self.allocate_id() else {
            tracing::warn!("match ids exhausted");
            creator.enqueue(&packets::match_join_fail());
            return None;
        };

        let channel_name = id.channel_name();
        let channel = self
            .services
            .channels
            .create_temporary(&channel_name, &format!("Channel for {channel_name}"));
        let tourney = host.is_tourney();
        let entry = Arc::new(Mutex::new(Match::new(
            id,
            settings,
            host,
            channel,
            Arc::clone(&self.services),
        )));
        self.matches.insert(id, Arc::clone(&entry));

        let mut m = entry.lock();
        if tourney {
            m.attach_referee(&creator);
        } else if !m.seat_creator(&creator) {
            drop(m);
            self.matches.remove(&id);
            self.services.channels.remove(&channel_name);
            creator.enqueue(&packets::match_join_fail());
            tracing::debug!(match_id = %id, "match creation refused, no open slot");
            return None;
        }

        let announcement = packets::match_new(&m.to_record());
        for session in lobby_sessions(&self.services.directory) {
            if !Arc::ptr_eq(&session, &creator) {
                session.enqueue(&announcement);
            }
        }

        tracing::info!(match_id = %id, host_id = %creator.id(), tourney, "match created");
        Some(id)
    }

    pub fn get(&self, id: MatchId) -> Option<SharedMatch> {
        self.matches.get(&id).map(|m| Arc::clone(m.value()))
    }

    pub fn require(&self, id: MatchId) -> Result<SharedMatch, MatchError> {
        self.get(id).ok_or(MatchError::NotFound(id))
    }

    /// The match `session` is in.
    pub fn match_of(&self, session: &Session) -> Result<MatchId, MatchError> {
        session.match_id().ok_or(MatchError::NotInMatch(session.id()))
    }

    /// Runs `f` with the match locked. A match whose channel is empty
    /// afterwards is disbanded before the lock is released.
    pub fn with_match<R>(&self, id: MatchId, f: impl FnOnce(&mut Match) -> R) -> Option<R> {
        let entry = self.get(id)?;
        let mut m = entry.lock();
        let result = f(&mut m);
        if m.channel().is_empty() {
            self.remove_locked(&entry, &mut m);
        }
        Some(result)
    }

    /// Joins `session` to match `id`. Unknown ids fail like any other join.
    pub fn join(&self, id: MatchId, session: &Arc<Session>, password: &str) -> bool {
        match self.with_match(id, |m| m.join(session, password)) {
            Some(joined) => joined,
            None => {
                session.enqueue(&packets::match_join_fail());
                false
            }
        }
    }

    /// Takes `session` out of whatever match it is in.
    pub fn leave(&self, session: &Arc<Session>) -> bool {
        let Some(id) = session.match_id() else {
            return false;
        };
        match self.with_match(id, |m| m.leave(session)) {
            Some(outcome) => outcome != LeaveOutcome::NotInMatch,
            None => {
                // The match is already gone; drop the stale reference.
                session.set_match_id(None);
                false
            }
        }
    }

    /// Closes a match regardless of who is in it.
    pub fn disband(&self, id: MatchId) -> bool {
        let Some(entry) = self.get(id) else {
            return false;
        };
        let mut m = entry.lock();
        m.dissolve();
        self.remove_locked(&entry, &mut m)
    }

    fn remove_locked(&self, entry: &SharedMatch, m: &mut Match) -> bool {
        let id = m.id();
        let removed = self
            .matches
            .remove_if(&id, |_, stored| Arc::ptr_eq(stored, entry))
            .is_some();
        if !removed {
            return false;
        }
        if !m.channel().is_empty() {
            m.dissolve();
        }

        let disband = packets::match_disband(id);
        for session in lobby_sessions(&self.services.directory) {
            session.enqueue(&disband);
        }
        tracing::info!(match_id = %id, "match disbanded");
        true
    }

    /// Sends every open match to a session entering the lobby.
    pub fn announce_to(&self, session: &Session) {
        for entry in self.entries() {
            let record = entry.lock().to_record();
            session.enqueue(&packets::match_new(&record));
        }
    }

    /// Matches where `user_id` is a referee.
    pub fn refereed_by(&self, user_id: UserId) -> Vec<MatchId> {
        self.entries()
            .into_iter()
            .filter_map(|entry| {
                let m = entry.lock();
                m.referees().contains(&user_id).then(|| m.id())
            })
            .collect()
    }

    pub fn snapshots(&self) -> Vec<MatchSnapshot> {
        let mut all: Vec<MatchSnapshot> = self
            .entries()
            .into_iter()
            .map(|entry| entry.lock().snapshot())
            .collect();
        all.sort_by_key(|s| s.id);
        all
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    fn entries(&self) -> Vec<SharedMatch> {
        self.matches.iter().map(|m| Arc::clone(m.value())).collect()
    }
}

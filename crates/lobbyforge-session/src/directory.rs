//! The session directory: every connected session, indexed three ways.
//!
//! This is the central piece of the session layer. It's responsible for:
//! - Registering sessions when users log in
//! - Finding a session by user id, token or normalised name
//! - Finding tournament sub-sessions by token
//! - Handing out snapshots for broadcasts
//!
//! # Concurrency note
//!
//! The three indexes must change together, otherwise a lookup by token could
//! find a session that a lookup by id no longer knows. They therefore sit
//! behind one `parking_lot::RwLock`. Broadcast code never iterates under the
//! lock: [`SessionDirectory::enumerate_all`] clones the `Arc`s out first, so
//! sessions can register and unregister while a broadcast is being
//! delivered.

use std::collections::HashMap;
use std::sync::Arc;

use lobbyforge_protocol::UserId;
use parking_lot::RwLock;

use crate::session::safe_name;
use crate::{Session, SessionError};

/// Key for [`SessionDirectory::lookup`].
#[derive(Debug, Clone, Copy)]
pub enum Lookup<'a> {
    Id(UserId),
    /// Also matches tournament sub-sessions.
    Token(&'a str),
    /// Display or normalised name; normalised before lookup.
    Name(&'a str),
}

#[derive(Debug, Default)]
struct DirectoryIndex {
    by_id: HashMap<UserId, Arc<Session>>,
    by_token: HashMap<String, Arc<Session>>,
    by_name: HashMap<String, Arc<Session>>,
}

/// Registry of all connected sessions.
#[derive(Debug, Default)]
pub struct SessionDirectory {
    index: RwLock<DirectoryIndex>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a primary session.
    ///
    /// Returns `false`, leaving the directory untouched, when the id, the
    /// token or the normalised name is already registered.
    pub fn register(&self, session: Arc<Session>) -> bool {
        let mut index = self.index.write();
        if index.by_id.contains_key(&session.id())
            || index.by_token.contains_key(session.token())
            || index.by_name.contains_key(session.safe_name())
        {
            tracing::debug!(user_id = %session.id(), "directory collision, register refused");
            return false;
        }

        index.by_id.insert(session.id(), Arc::clone(&session));
        index.by_token.insert(session.token().to_string(), Arc::clone(&session));
        index.by_name.insert(session.safe_name().to_string(), Arc::clone(&session));

        tracing::info!(user_id = %session.id(), name = session.name(), "session registered");
        true
    }

    /// Attaches a tournament window to the primary session with the same id.
    ///
    /// Returns `false` when no primary is registered for that id or the token
    /// is already in use anywhere.
    pub fn register_sub_session(&self, sub: Arc<Session>) -> bool {
        let index = self.index.read();
        let Some(owner) = index.by_id.get(&sub.id()) else {
            return false;
        };
        if index.by_token.contains_key(sub.token()) || token_owned_by_sub(&index, sub.token()) {
            return false;
        }
        let attached = owner.attach_sub_session(Arc::clone(&sub));
        if attached {
            tracing::info!(user_id = %sub.id(), "tournament sub-session attached");
        }
        attached
    }

    pub fn lookup(&self, key: Lookup<'_>) -> Option<Arc<Session>> {
        let index = self.index.read();
        match key {
            Lookup::Id(id) => index.by_id.get(&id).cloned(),
            Lookup::Token(token) => index.by_token.get(token).cloned().or_else(|| {
                index
                    .by_id
                    .values()
                    .find_map(|owner| owner.sub_session(token))
            }),
            Lookup::Name(name) => index.by_name.get(&safe_name(name)).cloned(),
        }
    }

    pub fn by_id(&self, id: UserId) -> Option<Arc<Session>> {
        self.lookup(Lookup::Id(id))
    }

    pub fn by_token(&self, token: &str) -> Option<Arc<Session>> {
        self.lookup(Lookup::Token(token))
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<Session>> {
        self.lookup(Lookup::Name(name))
    }

    /// Resolves the token a polling client sent with its request.
    pub fn require_token(&self, token: &str) -> Result<Arc<Session>, SessionError> {
        self.by_token(token).ok_or(SessionError::UnknownToken)
    }

    /// Removes a session.
    ///
    /// For a sub-session this detaches it from its owner's map. For a primary
    /// session the entries are only removed if they still point at this very
    /// session, so unregistering a stale session can't evict its successor.
    pub fn unregister(&self, session: &Arc<Session>) -> bool {
        let mut index = self.index.write();

        let is_registered_primary = index
            .by_id
            .get(&session.id())
            .is_some_and(|s| Arc::ptr_eq(s, session));

        if !is_registered_primary {
            let detached = index
                .by_id
                .get(&session.id())
                .and_then(|owner| owner.detach_sub_session(session.token()))
                .is_some();
            if detached {
                tracing::info!(user_id = %session.id(), "tournament sub-session detached");
            }
            return detached;
        }

        index.by_id.remove(&session.id());
        index.by_token.remove(session.token());
        index.by_name.remove(session.safe_name());
        tracing::info!(user_id = %session.id(), "session unregistered");
        true
    }

    /// Snapshot of every session, optionally including sub-sessions.
    pub fn enumerate_all(&self, exclude_sub_sessions: bool) -> Vec<Arc<Session>> {
        let primaries: Vec<Arc<Session>> = self.index.read().by_id.values().cloned().collect();
        if exclude_sub_sessions {
            return primaries;
        }
        let mut all = Vec::with_capacity(primaries.len());
        for session in primaries {
            let subs = session.sub_sessions();
            all.push(session);
            all.extend(subs);
        }
        all
    }

    /// Number of primary sessions.
    pub fn len(&self) -> usize {
        self.index.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().by_id.is_empty()
    }
}

fn token_owned_by_sub(index: &DirectoryIndex, token: &str) -> bool {
    index
        .by_id
        .values()
        .any(|owner| owner.sub_session(token).is_some())
}

// =========================================================================
// Tests
// =========================================================================

//! Read-only views for status pages. Nothing here mutates engine state.

use std::time::Instant;

use lobbyforge_channel::ChannelDescriptor;
use lobbyforge_match::MatchSnapshot;
use lobbyforge_protocol::{Action, GameMode, MatchId, UserId};
use lobbyforge_session::{unix_now, Session};
use serde::Serialize;

use crate::Engine;

/// One connected session as a status page sees it.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub user_id: UserId,
    pub name: String,
    pub privileges: u32,
    /// `polled`, `push` or `line`.
    pub delivery: &'static str,
    pub sub_session: bool,
    pub action: Action,
    pub status_text: String,
    pub mode: GameMode,
    pub match_id: Option<MatchId>,
    pub in_lobby: bool,
    pub silenced_for: u64,
    pub idle_secs: u64,
    pub spectating: Option<UserId>,
    pub spectators: Vec<UserId>,
}

impl SessionSnapshot {
    fn of(session: &Session, now: Instant, unix: u64) -> Self {
        let spectating = session.spectating().map(|host| host.id());
        let spectators = session.spectators().iter().map(|s| s.id()).collect();
        let idle_secs = session.idle_for(now).as_secs();
        let silenced_for = session.silence_remaining(unix);
        let state = session.state();
        Self {
            user_id: session.id(),
            name: session.name().to_string(),
            privileges: session.privileges().bits(),
            delivery: session.delivery().kind(),
            sub_session: session.is_sub_session(),
            action: state.status.action,
            status_text: state.status.text.clone(),
            mode: state.status.mode,
            match_id: state.match_id,
            in_lobby: state.in_lobby,
            silenced_for,
            idle_secs,
            spectating,
            spectators,
        }
    }
}

impl Engine {
    /// Every match, ordered by id.
    pub fn list_matches(&self) -> Vec<MatchSnapshot> {
        self.matches.snapshots()
    }

    /// Every session, sub-sessions included, ordered by user id with each
    /// primary before its windows.
    pub fn list_sessions(&self) -> Vec<SessionSnapshot> {
        let now = Instant::now();
        let unix = unix_now();
        let mut all: Vec<SessionSnapshot> = self
            .directory
            .enumerate_all(false)
            .iter()
            .map(|s| SessionSnapshot::of(s, now, unix))
            .collect();
        all.sort_by_key(|s| (s.user_id, s.sub_session));
        all
    }

    pub fn channel_descriptors(&self) -> Vec<ChannelDescriptor> {
        self.channels.descriptors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lobbyforge_protocol::Privileges;
    use lobbyforge_session::{Delivery, UserIdentity};

    #[test]
    fn test_list_sessions_sorted_and_serializable() {
        let engine = Engine::builder().build();
        engine.connect(UserIdentity::new(UserId(1001), "Bob", Privileges::NORMAL), Delivery::polled());
        engine.connect(UserIdentity::new(UserId(1000), "Alice", Privileges::NORMAL), Delivery::polled());

        let sessions = engine.list_sessions();
        let ids: Vec<UserId> = sessions.iter().map(|s| s.user_id).collect();
        assert_eq!(ids, vec![UserId(1000), UserId(1001)]);
        assert_eq!(sessions[0].delivery, "polled");

        let json = serde_json::to_value(&sessions).unwrap();
        assert_eq!(json[0]["name"], "Alice");
        assert_eq!(json[0]["user_id"], 1000);
    }

    #[test]
    fn test_list_sessions_includes_sub_sessions() {
        let engine = Engine::builder().build();
        engine.connect(UserIdentity::new(UserId(1000), "Alice", Privileges::NORMAL), Delivery::polled());
        let mut window = UserIdentity::new(UserId(1000), "Alice", Privileges::NORMAL);
        window.tournament_client = true;
        engine.connect(window, Delivery::polled());

        let sessions = engine.list_sessions();
        assert_eq!(sessions.len(), 2);
        assert!(!sessions[0].sub_session);
        assert!(sessions[1].sub_session);
    }

    #[test]
    fn test_channel_descriptors_count_members() {
        let engine = Engine::builder().build();
        engine.connect(UserIdentity::new(UserId(1000), "Alice", Privileges::NORMAL), Delivery::polled());

        let descriptors = engine.channel_descriptors();
        let osu = descriptors.iter().find(|d| d.name == "#osu").unwrap();
        assert_eq!(osu.member_count, 1);
        let lobby = descriptors.iter().find(|d| d.name == "#lobby").unwrap();
        assert_eq!(lobby.member_count, 0);
    }

    #[test]
    fn test_list_matches_empty_engine() {
        let engine = Engine::builder().build();
        assert!(engine.list_matches().is_empty());
    }
}

//! Moderation and management surface.
//!
//! Everything here is reached by external tooling (an admin panel, a chat
//! bot, another process) and only goes through the same directory, channel
//! and match operations the packet handlers use.

use std::sync::atomic::Ordering;

use lobbyforge_match::{MatchError, MatchSnapshot};
use lobbyforge_protocol::{packets, MatchId, MatchRecord, UserId};
use lobbyforge_session::{unix_now, SessionError};

use crate::engine::{clamp_i32, is_staff};
use crate::{Engine, EngineError};

impl Engine {
    /// Disconnects a user, sub-sessions included.
    pub fn kick(&self, user_id: UserId, reason: &str) -> Result<(), EngineError> {
        let session = self
            .directory
            .by_id(user_id)
            .ok_or(SessionError::NotFound(user_id))?;
        if !reason.is_empty() {
            session.notify(reason);
        }
        session.enqueue(&packets::login_reply(-1));
        self.logout(&session);
        tracing::info!(%user_id, reason, "kicked");
        Ok(())
    }

    /// Silences a user for `seconds`. Everyone is told to clear the user's
    /// chat lines.
    pub fn silence(&self, user_id: UserId, seconds: u64, reason: &str) -> Result<(), EngineError> {
        let session = self
            .directory
            .by_id(user_id)
            .ok_or(SessionError::NotFound(user_id))?;
        session.silence_until(unix_now().saturating_add(seconds));
        session.enqueue(&packets::silence_end(clamp_i32(seconds)));
        self.send_bot_message(
            &session,
            &format!("You have been silenced for {seconds} seconds. Reason: {reason}"),
        );

        let cleared = packets::user_silenced(user_id);
        for other in self.directory.enumerate_all(false) {
            other.enqueue(&cleared);
        }
        tracing::info!(%user_id, seconds, reason, "silenced");
        Ok(())
    }

    /// Shows a notification to every connected session.
    pub fn broadcast_notification(&self, text: &str) -> usize {
        let sessions = self.directory.enumerate_all(false);
        for session in &sessions {
            session.notify(text);
        }
        sessions.len()
    }

    /// Shows a notification to one user.
    pub fn notify(&self, user_id: UserId, text: &str) -> Result<(), EngineError> {
        let session = self
            .directory
            .by_id(user_id)
            .ok_or(SessionError::NotFound(user_id))?;
        session.notify(text);
        Ok(())
    }

    /// Turns maintenance mode on or off. Switching it on disconnects
    /// everyone but staff; new logins from non-staff are refused until it
    /// is switched off again. Returns how many sessions were disconnected.
    pub fn set_maintenance(&self, enabled: bool) -> usize {
        let was = self.maintenance.swap(enabled, Ordering::Relaxed);
        if was == enabled || !enabled {
            tracing::info!(enabled, "maintenance mode set");
            return 0;
        }

        let mut kicked = 0;
        for session in self.directory.enumerate_all(true) {
            if is_staff(session.privileges()) {
                session.notify("The server is now in maintenance mode.");
                continue;
            }
            session.notify("The server is going into maintenance mode. Please try again later.");
            session.enqueue(&packets::login_reply(packets::LOGIN_MAINTENANCE));
            self.logout(&session);
            kicked += 1;
        }
        tracing::warn!(kicked, "maintenance mode enabled");
        kicked
    }

    /// Read-only view of one match.
    pub fn inspect_match(&self, match_id: MatchId) -> Result<MatchSnapshot, EngineError> {
        let entry = self.matches.require(match_id)?;
        let snapshot = entry.lock().snapshot();
        Ok(snapshot)
    }

    /// Creates a tournament match controlled by `referee`, who holds no slot.
    pub fn make_tourney_match(
        &self,
        referee: UserId,
        name: &str,
        password: Option<&str>,
    ) -> Result<MatchId, EngineError> {
        let session = self
            .directory
            .by_id(referee)
            .ok_or(SessionError::NotFound(referee))?;
        let settings = MatchRecord {
            name: name.to_string(),
            password: password.filter(|p| !p.is_empty()).map(str::to_string),
            ..MatchRecord::default()
        };
        let id = self
            .matches
            .create_tourney(&session, &settings)
            .ok_or(MatchError::CreationRefused(referee))?;
        self.matches.with_match(id, |m| {
            m.add_referee(referee);
        });
        Ok(id)
    }

    /// Disbands a match, whoever is in it.
    pub fn close_match(&self, match_id: MatchId) -> Result<(), EngineError> {
        if !self.matches.disband(match_id) {
            return Err(MatchError::NotFound(match_id).into());
        }
        Ok(())
    }

    pub fn force_match_size(&self, match_id: MatchId, size: usize) -> Result<(), EngineError> {
        self.matches
            .with_match(match_id, |m| m.force_size(size))
            .ok_or(MatchError::NotFound(match_id))?;
        Ok(())
    }

    /// Aborts the running round. `Ok(false)` when no round was running.
    pub fn abort_match(&self, match_id: MatchId) -> Result<bool, EngineError> {
        let aborted = self
            .matches
            .with_match(match_id, |m| m.abort())
            .ok_or(MatchError::NotFound(match_id))?;
        Ok(aborted)
    }

    pub fn add_referee(&self, match_id: MatchId, user_id: UserId) -> Result<bool, EngineError> {
        let added = self
            .matches
            .with_match(match_id, |m| m.add_referee(user_id))
            .ok_or(MatchError::NotFound(match_id))?;
        Ok(added)
    }

    pub fn remove_referee(&self, match_id: MatchId, user_id: UserId) -> Result<bool, EngineError> {
        let removed = self
            .matches
            .with_match(match_id, |m| m.remove_referee(user_id))
            .ok_or(MatchError::NotFound(match_id))?;
        Ok(removed)
    }

    /// Matches where `user_id` is listed as a referee.
    pub fn referee_matches(&self, user_id: UserId) -> Vec<MatchId> {
        self.matches.refereed_by(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use lobbyforge_protocol::{FrameReader, Privileges};
    use lobbyforge_session::{Delivery, Session, UserIdentity};

    fn online(engine: &Engine, id: i32, name: &str, privileges: Privileges) -> Arc<Session> {
        let login = engine.connect(UserIdentity::new(UserId(id), name, privileges), Delivery::polled());
        let session = Arc::clone(login.session());
        session.dequeue();
        session
    }

    fn packet_ids(session: &Session) -> Vec<u16> {
        let bytes = session.dequeue();
        FrameReader::new(&bytes).map(|f| f.unwrap().packet_id).collect()
    }

    // =====================================================================
    // Users
    // =====================================================================

    #[test]
    fn test_kick_logs_out_and_tells_user() {
        let engine = Engine::builder().build();
        let alice = online(&engine, 1000, "Alice", Privileges::NORMAL);

        engine.kick(UserId(1000), "bye").unwrap();
        assert!(engine.directory().by_id(UserId(1000)).is_none());
        let ids = packet_ids(&alice);
        assert!(ids.contains(&24));
        assert!(ids.contains(&5));
    }

    #[test]
    fn test_kick_unknown_user_is_error() {
        let engine = Engine::builder().build();
        let err = engine.kick(UserId(1), "").unwrap_err();
        assert!(matches!(err, EngineError::Session(SessionError::NotFound(_))));
    }

    #[test]
    fn test_silence_sets_deadline_and_broadcasts() {
        let engine = Engine::builder().build();
        let alice = online(&engine, 1000, "Alice", Privileges::NORMAL);
        let bob = online(&engine, 1001, "Bob", Privileges::NORMAL);

        engine.silence(UserId(1000), 300, "spam").unwrap();
        assert!(alice.is_silenced());
        assert!(alice.silence_remaining(unix_now()) <= 300);
        assert!(packet_ids(&alice).contains(&92));
        assert!(packet_ids(&bob).contains(&94));
    }

    #[test]
    fn test_broadcast_notification_counts_sessions() {
        let engine = Engine::builder().build();
        let alice = online(&engine, 1000, "Alice", Privileges::NORMAL);
        online(&engine, 1001, "Bob", Privileges::NORMAL);
        assert_eq!(engine.broadcast_notification("restart soon"), 2);
        assert!(packet_ids(&alice).contains(&24));
    }

    #[test]
    fn test_notify_single_user() {
        let engine = Engine::builder().build();
        let alice = online(&engine, 1000, "Alice", Privileges::NORMAL);
        engine.notify(UserId(1000), "hi").unwrap();
        assert_eq!(packet_ids(&alice), vec![24]);
        assert!(engine.notify(UserId(5), "hi").is_err());
    }

    #[test]
    fn test_set_maintenance_disconnects_non_staff() {
        let engine = Engine::builder().build();
        online(&engine, 1000, "Alice", Privileges::NORMAL);
        online(&engine, 1, "Admin", Privileges::DEVELOPER);

        assert_eq!(engine.set_maintenance(true), 1);
        assert!(engine.is_maintenance());
        assert!(engine.directory().by_id(UserId(1000)).is_none());
        assert!(engine.directory().by_id(UserId(1)).is_some());

        assert_eq!(engine.set_maintenance(false), 0);
        assert!(!engine.is_maintenance());
    }

    // =====================================================================
    // Matches
    // =====================================================================

    #[test]
    fn test_make_tourney_match_referee_holds_no_slot() {
        let engine = Engine::builder().build();
        let referee = online(&engine, 1, "Referee", Privileges::TOURNAMENT_STAFF);

        let id = engine.make_tourney_match(UserId(1), "Finals", Some("pw")).unwrap();
        let snapshot = engine.inspect_match(id).unwrap();
        assert!(snapshot.tourney);
        assert!(snapshot.has_password);
        assert!(snapshot.slots.is_empty());
        assert_eq!(snapshot.referees, vec![UserId(1)]);
        assert_eq!(referee.match_id(), Some(id));
        assert_eq!(engine.referee_matches(UserId(1)), vec![id]);
    }

    #[test]
    fn test_make_tourney_match_twice_refused() {
        let engine = Engine::builder().build();
        online(&engine, 1, "Referee", Privileges::TOURNAMENT_STAFF);
        engine.make_tourney_match(UserId(1), "Finals", None).unwrap();
        let err = engine.make_tourney_match(UserId(1), "Again", None).unwrap_err();
        assert!(matches!(err, EngineError::Match(MatchError::CreationRefused(_))));
    }

    #[test]
    fn test_close_match_removes_it() {
        let engine = Engine::builder().build();
        online(&engine, 1, "Referee", Privileges::TOURNAMENT_STAFF);
        let id = engine.make_tourney_match(UserId(1), "Finals", None).unwrap();

        engine.close_match(id).unwrap();
        assert!(engine.inspect_match(id).is_err());
        assert!(engine.close_match(id).is_err());
    }

    #[test]
    fn test_force_match_size_locks_upper_slots() {
        let engine = Engine::builder().build();
        online(&engine, 1, "Referee", Privileges::TOURNAMENT_STAFF);
        let id = engine.make_tourney_match(UserId(1), "Finals", None).unwrap();

        engine.force_match_size(id, 4).unwrap();
        let snapshot = engine.inspect_match(id).unwrap();
        assert_eq!(snapshot.slots.len(), 12);
        assert!(snapshot.slots.iter().all(|s| s.index >= 4));
    }

    #[test]
    fn test_abort_match_without_round_is_false() {
        let engine = Engine::builder().build();
        online(&engine, 1, "Referee", Privileges::TOURNAMENT_STAFF);
        let id = engine.make_tourney_match(UserId(1), "Finals", None).unwrap();
        assert!(!engine.abort_match(id).unwrap());
        assert!(engine.abort_match(MatchId(999)).is_err());
    }

    #[test]
    fn test_referee_add_and_remove() {
        let engine = Engine::builder().build();
        online(&engine, 1, "Referee", Privileges::TOURNAMENT_STAFF);
        let id = engine.make_tourney_match(UserId(1), "Finals", None).unwrap();

        assert!(engine.add_referee(id, UserId(2)).unwrap());
        assert!(!engine.add_referee(id, UserId(2)).unwrap());
        assert!(engine.remove_referee(id, UserId(2)).unwrap());
        assert!(!engine.remove_referee(id, UserId(2)).unwrap());
    }
}

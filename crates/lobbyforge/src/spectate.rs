//! Spectating: watch links, the per-host spectator channel and frame relay.
//!
//! The host and all of its spectators share a temporary `#spec_{host id}`
//! channel. It is created with the first spectator and, being temporary,
//! disappears when the host leaves it after the last spectator is gone.

use std::sync::Arc;

use lobbyforge_protocol::{packets, StatusRecord, UserId};
use lobbyforge_session::Session;

use crate::messaging::spectator_channel_name;
use crate::Engine;

impl Engine {
    /// Starts watching `host_id`. Any previous watch link is dropped first.
    pub fn start_spectating(&self, spectator: &Arc<Session>, host_id: UserId) -> bool {
        let Some(host) = self.directory.by_id(host_id) else {
            tracing::debug!(user_id = %spectator.id(), %host_id, "spectate target offline");
            return false;
        };
        if Arc::ptr_eq(&host, spectator) {
            return false;
        }
        self.stop_spectating(spectator);

        let name = spectator_channel_name(host.id());
        let channel = self
            .channels
            .create_temporary(&name, &format!("Spectator channel for {}", host.name()));
        if !channel.is_member(&host) {
            self.channels.join(&channel, &host);
        }
        if !self.channels.join(&channel, spectator) {
            return false;
        }

        let joined = packets::fellow_spectator_joined(spectator.id());
        for fellow in host.spectators() {
            fellow.enqueue(&joined);
            spectator.enqueue(&packets::fellow_spectator_joined(fellow.id()));
        }

        host.add_spectator(spectator);
        spectator.set_spectating(Some(&host));
        host.enqueue(&packets::spectator_joined(spectator.id()));

        tracing::info!(user_id = %spectator.id(), host_id = %host.id(), "started spectating");
        true
    }

    /// Stops watching. Returns `false` when the session wasn't watching.
    pub fn stop_spectating(&self, spectator: &Arc<Session>) -> bool {
        let Some(host) = spectator.spectating() else {
            return false;
        };
        host.remove_spectator(spectator);
        spectator.set_spectating(None);

        if let Some(channel) = self.channels.get(&spectator_channel_name(host.id())) {
            self.channels.leave(&channel, spectator);
            let remaining = host.spectators();
            if remaining.is_empty() {
                self.channels.leave(&channel, &host);
            } else {
                let left = packets::fellow_spectator_left(spectator.id());
                for fellow in &remaining {
                    fellow.enqueue(&left);
                }
            }
        }
        host.enqueue(&packets::spectator_left(spectator.id()));

        tracing::info!(user_id = %spectator.id(), host_id = %host.id(), "stopped spectating");
        true
    }

    /// Relays replay frames from a host to everyone watching it.
    pub fn relay_frames(&self, host: &Session, raw: &[u8]) {
        let frame = packets::spectate_frames(raw);
        for spectator in host.spectators() {
            spectator.enqueue(&frame);
        }
    }

    /// The spectator lacks the beatmap. The host and the other spectators
    /// are told.
    pub fn cant_spectate(&self, spectator: &Session) -> bool {
        let Some(host) = spectator.spectating() else {
            return false;
        };
        let frame = packets::spectator_cant_spectate(spectator.id());
        host.enqueue(&frame);
        for fellow in host.spectators() {
            if fellow.id() != spectator.id() {
                fellow.enqueue(&frame);
            }
        }
        true
    }

    /// Stores a new presence status and shows it to the session itself and
    /// to its spectators.
    pub fn change_action(&self, session: &Session, status: StatusRecord) {
        session.state().status = status;
        let stats = packets::user_stats(&session.stats_record());
        let presence = packets::user_presence(&session.presence_record());
        session.enqueue(&stats);
        session.enqueue(&presence);
        for spectator in session.spectators() {
            spectator.enqueue(&stats);
            spectator.enqueue(&presence);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lobbyforge_protocol::{Action, FrameReader, Privileges};
    use lobbyforge_session::{Delivery, UserIdentity};

    fn online(engine: &Engine, id: i32, name: &str) -> Arc<Session> {
        let login = engine.connect(
            UserIdentity::new(UserId(id), name, Privileges::NORMAL),
            Delivery::polled(),
        );
        let session = Arc::clone(login.session());
        session.dequeue();
        session
    }

    fn packet_ids(session: &Session) -> Vec<u16> {
        let bytes = session.dequeue();
        FrameReader::new(&bytes).map(|f| f.unwrap().packet_id).collect()
    }

    // =====================================================================
    // Watch links
    // =====================================================================

    #[test]
    fn test_start_spectating_links_and_creates_channel() {
        let engine = Engine::builder().build();
        let host = online(&engine, 1000, "Host");
        let viewer = online(&engine, 1001, "Viewer");

        assert!(engine.start_spectating(&viewer, UserId(1000)));
        assert!(Arc::ptr_eq(&viewer.spectating().unwrap(), &host));
        assert_eq!(host.spectators().len(), 1);

        let channel = engine.channels().get("#spec_1000").unwrap();
        assert!(channel.is_member(&host));
        assert!(channel.is_member(&viewer));
        assert!(packet_ids(&host).contains(&13));
    }

    #[test]
    fn test_start_spectating_self_refused() {
        let engine = Engine::builder().build();
        let host = online(&engine, 1000, "Host");
        assert!(!engine.start_spectating(&host, UserId(1000)));
    }

    #[test]
    fn test_start_spectating_offline_host_refused() {
        let engine = Engine::builder().build();
        let viewer = online(&engine, 1001, "Viewer");
        assert!(!engine.start_spectating(&viewer, UserId(4242)));
    }

    #[test]
    fn test_second_spectator_gets_fellow_notifications() {
        let engine = Engine::builder().build();
        online(&engine, 1000, "Host");
        let first = online(&engine, 1001, "First");
        let second = online(&engine, 1002, "Second");
        engine.start_spectating(&first, UserId(1000));
        first.dequeue();

        engine.start_spectating(&second, UserId(1000));
        assert!(packet_ids(&first).contains(&42));
        assert!(packet_ids(&second).contains(&42));
    }

    #[test]
    fn test_switching_hosts_drops_previous_link() {
        let engine = Engine::builder().build();
        let a = online(&engine, 1000, "A");
        let b = online(&engine, 1001, "B");
        let viewer = online(&engine, 1002, "Viewer");

        engine.start_spectating(&viewer, UserId(1000));
        engine.start_spectating(&viewer, UserId(1001));
        assert!(a.spectators().is_empty());
        assert_eq!(b.spectators().len(), 1);
        assert!(engine.channels().get("#spec_1000").is_none());
    }

    #[test]
    fn test_stop_spectating_last_viewer_removes_channel() {
        let engine = Engine::builder().build();
        let host = online(&engine, 1000, "Host");
        let viewer = online(&engine, 1001, "Viewer");
        engine.start_spectating(&viewer, UserId(1000));
        host.dequeue();

        assert!(engine.stop_spectating(&viewer));
        assert!(viewer.spectating().is_none());
        assert!(engine.channels().get("#spec_1000").is_none());
        assert!(packet_ids(&host).contains(&14));
    }

    #[test]
    fn test_stop_spectating_keeps_channel_for_remaining_viewers() {
        let engine = Engine::builder().build();
        online(&engine, 1000, "Host");
        let first = online(&engine, 1001, "First");
        let second = online(&engine, 1002, "Second");
        engine.start_spectating(&first, UserId(1000));
        engine.start_spectating(&second, UserId(1000));
        second.dequeue();

        engine.stop_spectating(&first);
        assert!(engine.channels().get("#spec_1000").is_some());
        assert!(packet_ids(&second).contains(&43));
    }

    #[test]
    fn test_stop_spectating_when_not_watching() {
        let engine = Engine::builder().build();
        let viewer = online(&engine, 1001, "Viewer");
        assert!(!engine.stop_spectating(&viewer));
    }

    // =====================================================================
    // Relay
    // =====================================================================

    #[test]
    fn test_relay_frames_reaches_every_spectator() {
        let engine = Engine::builder().build();
        let host = online(&engine, 1000, "Host");
        let viewer = online(&engine, 1001, "Viewer");
        engine.start_spectating(&viewer, UserId(1000));
        viewer.dequeue();

        engine.relay_frames(&host, &[1, 2, 3, 4]);
        let bytes = viewer.dequeue();
        let frame = FrameReader::new(&bytes).next().unwrap().unwrap();
        assert_eq!(frame.packet_id, 15);
        assert_eq!(frame.payload, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_cant_spectate_notifies_host_and_fellows() {
        let engine = Engine::builder().build();
        let host = online(&engine, 1000, "Host");
        let first = online(&engine, 1001, "First");
        let second = online(&engine, 1002, "Second");
        engine.start_spectating(&first, UserId(1000));
        engine.start_spectating(&second, UserId(1000));
        host.dequeue();
        first.dequeue();
        second.dequeue();

        assert!(engine.cant_spectate(&first));
        assert!(packet_ids(&host).contains(&22));
        assert!(packet_ids(&second).contains(&22));
        assert!(!packet_ids(&first).contains(&22));
    }

    #[test]
    fn test_change_action_updates_status_and_informs_spectators() {
        let engine = Engine::builder().build();
        let host = online(&engine, 1000, "Host");
        let viewer = online(&engine, 1001, "Viewer");
        engine.start_spectating(&viewer, UserId(1000));
        viewer.dequeue();

        let status = StatusRecord {
            action: Action::Playing,
            text: "a song".to_string(),
            ..StatusRecord::default()
        };
        engine.change_action(&host, status);
        assert_eq!(host.state().status.action, Action::Playing);
        let ids = packet_ids(&viewer);
        assert!(ids.contains(&11));
        assert!(ids.contains(&83));
    }
}

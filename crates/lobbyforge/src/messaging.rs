//! Chat: channel messages, private messages and match invites.

use std::sync::Arc;

use lobbyforge_protocol::{packets, ChatMessage, UserId};
use lobbyforge_session::Session;

use crate::Engine;

impl Engine {
    /// Sends a message to a channel the session is writing in.
    ///
    /// `#multiplayer` and `#spectator` are the names clients show for the
    /// caller's own match and spectator channels; they are resolved to the
    /// real channel first.
    pub fn send_public_message(&self, session: &Arc<Session>, message: &ChatMessage) -> bool {
        if session.is_silenced() {
            tracing::debug!(user_id = %session.id(), "public message dropped, sender silenced");
            return false;
        }
        let Some(name) = self.resolve_channel(session, &message.to) else {
            tracing::debug!(user_id = %session.id(), to = %message.to, "no channel to resolve");
            return false;
        };
        let Some(channel) = self.channels.get(&name) else {
            tracing::debug!(user_id = %session.id(), channel = %name, "message to unknown channel");
            return false;
        };
        if !channel.can_write(session) {
            tracing::debug!(user_id = %session.id(), channel = %name, "channel not writable");
            return false;
        }

        let outgoing = ChatMessage {
            sender: session.name().to_string(),
            body: self.config.truncate_message(&message.body),
            to: channel.display_name().to_string(),
            sender_id: session.id(),
        };
        let delivered = channel.send_message(session.id(), &outgoing);
        tracing::debug!(user_id = %session.id(), channel = %name, delivered, "channel message");
        true
    }

    /// Maps a client-side channel name to the canonical one.
    fn resolve_channel(&self, session: &Session, to: &str) -> Option<String> {
        if to.starts_with("#multi") {
            let match_id = {
                let state = session.state();
                state.match_id.or(state.watching_match)
            };
            return match_id.map(|id| id.channel_name());
        }
        if to.starts_with("#spec") {
            let host_id = session.spectating().map_or(session.id(), |host| host.id());
            return Some(spectator_channel_name(host_id));
        }
        Some(to.to_string())
    }

    /// Sends a private message to the user named in `message.to`.
    ///
    /// A receiver that only accepts friends blocks strangers. A sender who
    /// only accepts friends but writes to a stranger has that setting
    /// switched off, so the reply can reach them.
    pub fn send_private_message(&self, session: &Arc<Session>, message: &ChatMessage) -> bool {
        if session.is_silenced() {
            tracing::debug!(user_id = %session.id(), "private message dropped, sender silenced");
            return false;
        }
        let Some(receiver) = self.directory.by_name(&message.to) else {
            tracing::debug!(user_id = %session.id(), to = %message.to, "private message to offline user");
            return false;
        };

        let receiver_friends_only = receiver.state().friends_only_dms;
        if receiver_friends_only && !receiver.is_friend(session.id()) {
            session.enqueue(&packets::dm_blocked(&message.to));
            return false;
        }

        let sender_friends_only = session.state().friends_only_dms;
        if sender_friends_only && !session.is_friend(receiver.id()) {
            session.state().friends_only_dms = false;
            tracing::debug!(user_id = %session.id(), "friends-only messages lifted after writing a stranger");
        }

        if receiver.is_silenced() {
            session.enqueue(&packets::target_silenced(&message.to));
            return false;
        }

        let outgoing = ChatMessage {
            sender: session.name().to_string(),
            body: self.config.truncate_message(&message.body),
            to: receiver.name().to_string(),
            sender_id: session.id(),
        };
        receiver.on_message(&outgoing);

        let away = receiver.state().away_message.clone();
        if let Some(away) = away {
            session.on_message(&ChatMessage {
                sender: receiver.name().to_string(),
                body: away,
                to: session.name().to_string(),
                sender_id: receiver.id(),
            });
        }

        tracing::debug!(user_id = %session.id(), to_id = %receiver.id(), "private message");
        true
    }

    /// Sends `target` a private message from the caller linking to the
    /// caller's match.
    pub fn invite(&self, session: &Arc<Session>, target: UserId) -> bool {
        let Some(match_id) = session.match_id() else {
            return false;
        };
        let Some(receiver) = self.directory.by_id(target) else {
            return false;
        };
        let Some((link, name)) = self
            .matches
            .with_match(match_id, |m| (m.invite_link(), m.name().to_string()))
        else {
            return false;
        };

        let invite = ChatMessage {
            sender: String::new(),
            body: format!("Come join my game: [{link} {name}]"),
            to: receiver.name().to_string(),
            sender_id: session.id(),
        };
        self.send_private_message(session, &invite)
    }

    /// A private message from the server's own identity.
    pub fn send_bot_message(&self, receiver: &Session, body: &str) {
        receiver.on_message(&ChatMessage {
            sender: self.config.bot_name.clone(),
            body: body.to_string(),
            to: receiver.name().to_string(),
            sender_id: self.config.bot_id,
        });
    }
}

pub(crate) fn spectator_channel_name(host_id: UserId) -> String {
    format!("#spec_{}", host_id.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lobbyforge_protocol::{FrameReader, PacketReader, Privileges};
    use lobbyforge_session::{unix_now, Delivery, UserIdentity};

    fn online(engine: &Engine, id: i32, name: &str) -> Arc<Session> {
        let login = engine.connect(
            UserIdentity::new(UserId(id), name, Privileges::NORMAL),
            Delivery::polled(),
        );
        let session = Arc::clone(login.session());
        session.dequeue();
        session
    }

    fn chat(to: &str, body: &str) -> ChatMessage {
        ChatMessage {
            sender: String::new(),
            body: body.to_string(),
            to: to.to_string(),
            sender_id: UserId(0),
        }
    }

    /// Bodies of every chat message queued for `session`.
    fn received(session: &Session) -> Vec<ChatMessage> {
        let bytes = session.dequeue();
        FrameReader::new(&bytes)
            .map(|f| f.unwrap())
            .filter(|f| f.packet_id == 7)
            .map(|f| ChatMessage::decode(&mut PacketReader::new(f.payload)).unwrap())
            .collect()
    }

    fn packet_ids(session: &Session) -> Vec<u16> {
        let bytes = session.dequeue();
        FrameReader::new(&bytes).map(|f| f.unwrap().packet_id).collect()
    }

    // =====================================================================
    // Channel messages
    // =====================================================================

    #[test]
    fn test_public_message_reaches_other_members() {
        let engine = Engine::builder().build();
        let alice = online(&engine, 1000, "Alice");
        let bob = online(&engine, 1001, "Bob");

        assert!(engine.send_public_message(&alice, &chat("#osu", "hello")));
        let got = received(&bob);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].sender, "Alice");
        assert_eq!(got[0].sender_id, UserId(1000));
        assert_eq!(got[0].body, "hello");
        assert!(received(&alice).is_empty());
    }

    #[test]
    fn test_public_message_unknown_channel_ignored() {
        let engine = Engine::builder().build();
        let alice = online(&engine, 1000, "Alice");
        assert!(!engine.send_public_message(&alice, &chat("#nowhere", "hi")));
    }

    #[test]
    fn test_public_message_read_only_channel_refused() {
        let engine = Engine::builder().build();
        let alice = online(&engine, 1000, "Alice");
        assert!(!engine.send_public_message(&alice, &chat("#announce", "hi")));
    }

    #[test]
    fn test_public_message_silenced_sender_refused() {
        let engine = Engine::builder().build();
        let alice = online(&engine, 1000, "Alice");
        alice.silence_until(unix_now() + 60);
        assert!(!engine.send_public_message(&alice, &chat("#osu", "hi")));
    }

    #[test]
    fn test_public_message_long_body_truncated() {
        let engine = Engine::builder().build();
        let alice = online(&engine, 1000, "Alice");
        let bob = online(&engine, 1001, "Bob");
        let long = "x".repeat(3000);
        engine.send_public_message(&alice, &chat("#osu", &long));
        let got = received(&bob);
        assert_eq!(got[0].body.len(), 2048);
        assert!(got[0].body.ends_with("..."));
    }

    #[test]
    fn test_public_message_multiplayer_without_match_refused() {
        let engine = Engine::builder().build();
        let alice = online(&engine, 1000, "Alice");
        assert!(!engine.send_public_message(&alice, &chat("#multiplayer", "hi")));
    }

    #[test]
    fn test_resolve_spectator_channel_uses_own_id_when_not_watching() {
        let engine = Engine::builder().build();
        let alice = online(&engine, 1000, "Alice");
        assert_eq!(
            engine.resolve_channel(&alice, "#spectator").as_deref(),
            Some("#spec_1000")
        );
    }

    // =====================================================================
    // Private messages
    // =====================================================================

    #[test]
    fn test_private_message_delivered_by_name() {
        let engine = Engine::builder().build();
        let alice = online(&engine, 1000, "Alice");
        let bob = online(&engine, 1001, "Bob Smith");

        assert!(engine.send_private_message(&alice, &chat("bob smith", "psst")));
        let got = received(&bob);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].body, "psst");
        assert_eq!(got[0].to, "Bob Smith");
    }

    #[test]
    fn test_private_message_offline_target_ignored() {
        let engine = Engine::builder().build();
        let alice = online(&engine, 1000, "Alice");
        assert!(!engine.send_private_message(&alice, &chat("nobody", "hi")));
    }

    #[test]
    fn test_private_message_friends_only_receiver_blocks_stranger() {
        let engine = Engine::builder().build();
        let alice = online(&engine, 1000, "Alice");
        let bob = online(&engine, 1001, "Bob");
        bob.state().friends_only_dms = true;

        assert!(!engine.send_private_message(&alice, &chat("Bob", "hi")));
        assert!(packet_ids(&alice).contains(&100));
        assert!(received(&bob).is_empty());
    }

    #[test]
    fn test_private_message_friends_only_receiver_accepts_friend() {
        let engine = Engine::builder().build();
        let alice = online(&engine, 1000, "Alice");
        let bob = online(&engine, 1001, "Bob");
        bob.state().friends_only_dms = true;
        bob.add_friend(UserId(1000));

        assert!(engine.send_private_message(&alice, &chat("Bob", "hi")));
        assert_eq!(received(&bob).len(), 1);
    }

    #[test]
    fn test_private_message_friends_only_sender_lifted() {
        let engine = Engine::builder().build();
        let alice = online(&engine, 1000, "Alice");
        online(&engine, 1001, "Bob");
        alice.state().friends_only_dms = true;

        assert!(engine.send_private_message(&alice, &chat("Bob", "hi")));
        assert!(!alice.state().friends_only_dms);
    }

    #[test]
    fn test_private_message_silenced_target_reported() {
        let engine = Engine::builder().build();
        let alice = online(&engine, 1000, "Alice");
        let bob = online(&engine, 1001, "Bob");
        bob.silence_until(unix_now() + 60);

        assert!(!engine.send_private_message(&alice, &chat("Bob", "hi")));
        assert!(packet_ids(&alice).contains(&101));
    }

    #[test]
    fn test_private_message_away_reply_returned() {
        let engine = Engine::builder().build();
        let alice = online(&engine, 1000, "Alice");
        let bob = online(&engine, 1001, "Bob");
        bob.state().away_message = Some("brb".to_string());

        engine.send_private_message(&alice, &chat("Bob", "hi"));
        let got = received(&alice);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].body, "brb");
        assert_eq!(got[0].sender, "Bob");
    }

    // =====================================================================
    // Bot
    // =====================================================================

    #[test]
    fn test_bot_message_uses_configured_identity() {
        let engine = Engine::builder().build();
        let alice = online(&engine, 1000, "Alice");
        engine.send_bot_message(&alice, "welcome");
        let got = received(&alice);
        assert_eq!(got[0].sender, "Lobbybot");
        assert_eq!(got[0].sender_id, UserId(999));
    }
}

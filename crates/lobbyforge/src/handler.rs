//! Inbound packet routing.
//!
//! Transports hand the engine a raw batch and the session it belongs to.
//! The flow is:
//!   1. Refresh the session's activity timestamp
//!   2. Split the batch into frames
//!   3. Decode each frame's payload and dispatch it by packet id
//!
//! A decode fault ends the batch: frames after a malformed one are not
//! trusted. Client requests that break a rule (wrong host, locked slot,
//! unknown target) are ignored without an error.

use std::sync::Arc;

use lobbyforge_match::{LeaveOutcome, Match, OwnStatus};
use lobbyforge_protocol::record::{read_single_i32, read_single_string, read_user_id_list};
use lobbyforge_protocol::{
    packets, Audience, ChatMessage, ClientPacket, FrameReader, JoinRequest, MatchId, MatchRecord,
    Mods, PacketReader, PresenceFilter, Privileges, ProtocolError, StatusRecord, UserId,
};
use lobbyforge_session::Session;

use crate::engine::is_restricted;
use crate::{Engine, EngineError};

/// Most stats a client may ask for in one request.
const MAX_STATS_REQUEST: usize = 32;

/// Most presences a client may ask for in one request.
const MAX_PRESENCE_REQUEST: usize = 256;

impl Engine {
    /// Handles every frame in `batch`. Returns how many frames were handled.
    pub fn handle_batch(&self, batch: &[u8], session: &Arc<Session>) -> Result<usize, EngineError> {
        session.touch();
        let mut handled = 0;
        for frame in FrameReader::new(batch) {
            let result = frame.and_then(|f| self.handle(f.packet_id, f.payload, session));
            if let Err(e) = result {
                tracing::warn!(
                    user_id = %session.id(),
                    handled,
                    error = %e,
                    "decode fault, rest of batch dropped"
                );
                return Err(e.into());
            }
            handled += 1;
        }
        Ok(handled)
    }

    /// One round trip for a polling client: resolves `token`, handles
    /// `batch` and returns whatever is queued for the session.
    pub fn handle_polled(&self, token: &str, batch: &[u8]) -> Result<Vec<u8>, EngineError> {
        let session = self.directory.require_token(token)?;
        self.handle_batch(batch, &session)?;
        Ok(session.dequeue())
    }

    /// Handles one frame. Unknown packet ids are ignored.
    pub fn handle(
        &self,
        packet_id: u16,
        payload: &[u8],
        session: &Arc<Session>,
    ) -> Result<(), ProtocolError> {
        let Some(packet) = ClientPacket::from_u16(packet_id) else {
            tracing::trace!(user_id = %session.id(), packet_id, "unhandled packet");
            return Ok(());
        };
        let mut reader = PacketReader::new(payload);

        match packet {
            // -- presence -------------------------------------------------
            ClientPacket::ChangeAction => {
                let status = StatusRecord::decode(&mut reader)?;
                self.change_action(session, status);
            }
            ClientPacket::RequestStatusUpdate => {
                session.enqueue(&packets::user_stats(&session.stats_record()));
            }
            ClientPacket::Pong => {}
            ClientPacket::Logout => {
                self.logout(session);
            }
            ClientPacket::ReceiveUpdates => {
                let raw = read_single_i32(payload)?;
                if !(0..3).contains(&raw) {
                    tracing::debug!(user_id = %session.id(), raw, "bad presence filter");
                    return Ok(());
                }
                session.state().presence_filter = PresenceFilter::from_i32(raw);
            }
            ClientPacket::UserStatsRequest => {
                let ids = read_user_id_list(payload)?;
                if ids.len() <= MAX_STATS_REQUEST {
                    for other in self.visible_others(session, &ids) {
                        session.enqueue(&packets::user_stats(&other.stats_record()));
                    }
                }
            }
            ClientPacket::UserPresenceRequest => {
                let ids = read_user_id_list(payload)?;
                if ids.len() <= MAX_PRESENCE_REQUEST {
                    for other in self.visible_others(session, &ids) {
                        session.enqueue(&packets::user_presence(&other.presence_record()));
                    }
                }
            }
            ClientPacket::UserPresenceRequestAll => {
                for other in self.directory.enumerate_all(true) {
                    if !is_restricted(&other) {
                        session.enqueue(&packets::user_presence(&other.presence_record()));
                    }
                }
            }

            // -- friends and chat settings --------------------------------
            ClientPacket::FriendAdd => {
                session.add_friend(UserId(read_single_i32(payload)?));
            }
            ClientPacket::FriendRemove => {
                session.remove_friend(UserId(read_single_i32(payload)?));
            }
            ClientPacket::ToggleBlockNonFriendDms => {
                session.state().friends_only_dms = read_single_i32(payload)? == 1;
            }
            ClientPacket::SetAwayMessage => {
                let message = ChatMessage::decode(&mut reader)?;
                session.state().away_message = Some(message.body).filter(|b| !b.is_empty());
            }

            // -- chat -----------------------------------------------------
            ClientPacket::SendPublicMessage => {
                self.send_public_message(session, &ChatMessage::decode(&mut reader)?);
            }
            ClientPacket::SendPrivateMessage => {
                self.send_private_message(session, &ChatMessage::decode(&mut reader)?);
            }
            ClientPacket::ChannelJoin => {
                let name = read_single_string(payload)?;
                self.join_channel(session, &name);
            }
            ClientPacket::ChannelPart => {
                let name = read_single_string(payload)?;
                self.part_channel(session, &name);
            }

            // -- spectating -----------------------------------------------
            ClientPacket::StartSpectating => {
                self.start_spectating(session, UserId(read_single_i32(payload)?));
            }
            ClientPacket::StopSpectating => {
                self.stop_spectating(session);
            }
            ClientPacket::SpectateFrames => self.relay_frames(session, payload),
            ClientPacket::CantSpectate => {
                self.cant_spectate(session);
            }

            // -- lobby ----------------------------------------------------
            ClientPacket::JoinLobby => {
                session.set_in_lobby(true);
                self.matches.announce_to(session);
            }
            ClientPacket::PartLobby => session.set_in_lobby(false),
            ClientPacket::CreateMatch => {
                let settings = MatchRecord::decode(&mut reader)?;
                self.matches.create(session, &settings);
            }
            ClientPacket::JoinMatch => {
                let request = JoinRequest::decode(&mut reader)?;
                self.matches.join(request.match_id, session, &request.password);
            }
            ClientPacket::PartMatch => {
                self.matches.leave(session);
            }
            ClientPacket::MatchInvite => {
                self.invite(session, UserId(read_single_i32(payload)?));
            }

            // -- inside a match -------------------------------------------
            ClientPacket::MatchChangeSlot => {
                let target = slot_index(read_single_i32(payload)?);
                self.in_own_match(session, |m| m.change_slot(session, target));
            }
            ClientPacket::MatchLock => {
                let index = slot_index(read_single_i32(payload)?);
                self.in_own_match(session, |m| m.toggle_slot_lock(session, index));
            }
            ClientPacket::MatchChangeSettings => {
                let settings = MatchRecord::decode(&mut reader)?;
                self.in_own_match(session, |m| m.update_settings(session, &settings));
            }
            ClientPacket::MatchChangePassword => {
                let settings = MatchRecord::decode(&mut reader)?;
                self.in_own_match(session, |m| m.change_password(session, settings.password));
            }
            ClientPacket::MatchChangeMods => {
                let mods = Mods::from_wire(read_single_i32(payload)?);
                self.in_own_match(session, |m| m.change_mods(session, mods));
            }
            ClientPacket::MatchChangeTeam => {
                self.in_own_match(session, |m| m.change_team(session));
            }
            ClientPacket::MatchTransferHost => {
                let index = slot_index(read_single_i32(payload)?);
                self.in_own_match(session, |m| m.transfer_host(session, index));
            }
            ClientPacket::MatchReady => self.own_status(session, OwnStatus::Ready),
            ClientPacket::MatchNotReady => self.own_status(session, OwnStatus::NotReady),
            ClientPacket::MatchNoBeatmap => self.own_status(session, OwnStatus::NoMap),
            ClientPacket::MatchHasBeatmap => self.own_status(session, OwnStatus::HasMap),
            ClientPacket::MatchStart => {
                self.in_own_match(session, |m| m.can_mutate(session) && m.start());
            }
            ClientPacket::MatchAbort => {
                self.in_own_match(session, |m| m.can_mutate(session) && m.abort());
            }
            ClientPacket::MatchLoadComplete => {
                self.in_own_match(session, |m| m.load_complete(session));
            }
            ClientPacket::MatchScoreUpdate => {
                self.in_own_match(session, |m| m.score_update(session, payload));
            }
            ClientPacket::MatchFailed => {
                self.in_own_match(session, |m| m.player_failed(session));
            }
            ClientPacket::MatchSkipRequest => {
                self.in_own_match(session, |m| m.skip(session));
            }
            ClientPacket::MatchComplete => {
                self.in_own_match(session, |m| m.complete(session));
            }

            // -- tournament clients ---------------------------------------
            ClientPacket::TournamentMatchInfoRequest => {
                let Some(id) = match_id(read_single_i32(payload)?) else {
                    return Ok(());
                };
                if is_tournament_client(session) {
                    if let Some(entry) = self.matches.get(id) {
                        let record = entry.lock().to_record();
                        session.enqueue(&packets::match_update(
                            &record,
                            Audience::Outsider,
                        ));
                    }
                }
            }
            ClientPacket::TournamentJoinMatchChannel => {
                let Some(id) = match_id(read_single_i32(payload)?) else {
                    return Ok(());
                };
                self.watch_match(session, id);
            }
            ClientPacket::TournamentLeaveMatchChannel => {
                let Some(id) = match_id(read_single_i32(payload)?) else {
                    return Ok(());
                };
                self.unwatch_match(session, id);
            }
        }
        Ok(())
    }

    /// Runs `f` on the match the session is in. Not being in a match is an
    /// ignored request, like any other rule violation.
    fn in_own_match(&self, session: &Session, f: impl FnOnce(&mut Match) -> bool) {
        let Ok(id) = self.matches.match_of(session) else {
            tracing::debug!(user_id = %session.id(), "match packet outside a match");
            return;
        };
        let applied = self.matches.with_match(id, f);
        if applied != Some(true) {
            tracing::debug!(user_id = %session.id(), match_id = %id, "match request ignored");
        }
    }

    fn own_status(&self, session: &Session, status: OwnStatus) {
        self.in_own_match(session, |m| m.set_own_status(session, status));
    }

    fn visible_others(&self, session: &Session, ids: &[UserId]) -> Vec<Arc<Session>> {
        ids.iter()
            .filter(|id| **id != session.id())
            .filter_map(|id| self.directory.by_id(*id))
            .filter(|other| !is_restricted(other))
            .collect()
    }

    /// Joins a channel by its client-side name. Only `#`-prefixed names are
    /// channels.
    pub fn join_channel(&self, session: &Arc<Session>, name: &str) -> bool {
        if !name.starts_with('#') || is_linked_channel(name) {
            return false;
        }
        match self.channels.join_by_name(name, session) {
            Ok(joined) => joined,
            Err(e) => {
                tracing::debug!(user_id = %session.id(), error = %e, "channel join failed");
                false
            }
        }
    }

    /// Leaves a channel by name. Spectator and match channels follow the
    /// watch link or the match seat and can't be left directly.
    pub fn part_channel(&self, session: &Arc<Session>, name: &str) -> bool {
        if !name.starts_with('#') || is_linked_channel(name) {
            return false;
        }
        match self.channels.leave_by_name(name, session) {
            Ok(left) => left,
            Err(e) => {
                tracing::debug!(user_id = %session.id(), error = %e, "channel part failed");
                false
            }
        }
    }

    /// A tournament window starts following a match's chat without a slot.
    pub fn watch_match(&self, session: &Arc<Session>, id: MatchId) -> bool {
        if !is_tournament_client(session) {
            return false;
        }
        let Some(entry) = self.matches.get(id) else {
            return false;
        };
        let channel = Arc::clone(entry.lock().channel());
        if !self.channels.join(&channel, session) {
            return false;
        }
        session.state().watching_match = Some(id);
        true
    }

    pub fn unwatch_match(&self, session: &Arc<Session>, id: MatchId) -> bool {
        if !is_tournament_client(session) {
            return false;
        }
        self.release_watch(session, id)
    }

    /// Drops the session's watch on match `id`. The channel departure goes
    /// through the match so a match left with an empty channel is disbanded.
    pub(crate) fn release_watch(&self, session: &Arc<Session>, id: MatchId) -> bool {
        {
            let mut state = session.state();
            if state.watching_match == Some(id) {
                state.watching_match = None;
            }
        }
        // A seated player keeps the channel with the seat.
        if session.match_id() == Some(id) {
            return true;
        }
        self.matches
            .with_match(id, |m| m.leave(session))
            .is_some_and(|outcome| outcome != LeaveOutcome::NotInMatch)
    }
}

/// Channels whose membership is owned by a match seat or a watch link.
fn is_linked_channel(name: &str) -> bool {
    name.starts_with("#spec") || name.starts_with("#multi")
}

/// Tournament windows, their owners, and tournament staff.
fn is_tournament_client(session: &Session) -> bool {
    session.is_sub_session()
        || !session.sub_sessions().is_empty()
        || session.privileges().has(Privileges::TOURNAMENT_STAFF)
}

/// Out-of-range indexes become an index no slot has, which every slot
/// operation refuses.
fn slot_index(raw: i32) -> usize {
    usize::try_from(raw).unwrap_or(usize::MAX)
}

fn match_id(raw: i32) -> Option<MatchId> {
    u16::try_from(raw).ok().map(MatchId)
}

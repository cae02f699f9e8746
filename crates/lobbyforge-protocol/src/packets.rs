//! Packet ids and builders for every packet the server emits.
//!
//! Builders return a complete frame ready to be appended to a session's
//! outbound queue.

use crate::codec::{frame, PacketWriter};
use crate::record::{
    Audience, ChannelInfoRecord, ChatMessage, MatchRecord, PresenceRecord, StatsRecord,
};
use crate::types::{MatchId, UserId};

// ---------------------------------------------------------------------------
// Packet ids
// ---------------------------------------------------------------------------

/// Packets the client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ClientPacket {
    ChangeAction = 0,
    SendPublicMessage = 1,
    Logout = 2,
    RequestStatusUpdate = 3,
    Pong = 4,
    StartSpectating = 16,
    StopSpectating = 17,
    SpectateFrames = 18,
    CantSpectate = 21,
    SendPrivateMessage = 25,
    PartLobby = 29,
    JoinLobby = 30,
    CreateMatch = 31,
    JoinMatch = 32,
    PartMatch = 33,
    MatchChangeSlot = 38,
    MatchReady = 39,
    MatchLock = 40,
    MatchChangeSettings = 41,
    MatchStart = 44,
    MatchScoreUpdate = 47,
    MatchComplete = 49,
    MatchChangeMods = 51,
    MatchLoadComplete = 52,
    MatchNoBeatmap = 54,
    MatchNotReady = 55,
    MatchFailed = 56,
    MatchHasBeatmap = 59,
    MatchSkipRequest = 60,
    ChannelJoin = 63,
    MatchTransferHost = 70,
    FriendAdd = 73,
    FriendRemove = 74,
    MatchChangeTeam = 77,
    ChannelPart = 78,
    ReceiveUpdates = 79,
    SetAwayMessage = 82,
    UserStatsRequest = 85,
    MatchInvite = 87,
    MatchChangePassword = 90,
    TournamentMatchInfoRequest = 93,
    UserPresenceRequest = 97,
    UserPresenceRequestAll = 98,
    ToggleBlockNonFriendDms = 99,
    MatchAbort = 106,
    TournamentJoinMatchChannel = 108,
    TournamentLeaveMatchChannel = 109,
}

impl ClientPacket {
    pub fn from_u16(value: u16) -> Option<Self> {
        use ClientPacket::*;
        let packet = match value {
            0 => ChangeAction,
            1 => SendPublicMessage,
            2 => Logout,
            3 => RequestStatusUpdate,
            4 => Pong,
            16 => StartSpectating,
            17 => StopSpectating,
            18 => SpectateFrames,
            21 => CantSpectate,
            25 => SendPrivateMessage,
            29 => PartLobby,
            30 => JoinLobby,
            31 => CreateMatch,
            32 => JoinMatch,
            33 => PartMatch,
            38 => MatchChangeSlot,
            39 => MatchReady,
            40 => MatchLock,
            41 => MatchChangeSettings,
            44 => MatchStart,
            47 => MatchScoreUpdate,
            49 => MatchComplete,
            51 => MatchChangeMods,
            52 => MatchLoadComplete,
            54 => MatchNoBeatmap,
            55 => MatchNotReady,
            56 => MatchFailed,
            59 => MatchHasBeatmap,
            60 => MatchSkipRequest,
            63 => ChannelJoin,
            70 => MatchTransferHost,
            73 => FriendAdd,
            74 => FriendRemove,
            77 => MatchChangeTeam,
            78 => ChannelPart,
            79 => ReceiveUpdates,
            82 => SetAwayMessage,
            85 => UserStatsRequest,
            87 => MatchInvite,
            90 => MatchChangePassword,
            93 => TournamentMatchInfoRequest,
            97 => UserPresenceRequest,
            98 => UserPresenceRequestAll,
            99 => ToggleBlockNonFriendDms,
            106 => MatchAbort,
            108 => TournamentJoinMatchChannel,
            109 => TournamentLeaveMatchChannel,
            _ => return None,
        };
        Some(packet)
    }
}

/// Packets the server sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ServerPacket {
    LoginReply = 5,
    SendMessage = 7,
    Ping = 8,
    UserStats = 11,
    UserLogout = 12,
    SpectatorJoined = 13,
    SpectatorLeft = 14,
    SpectateFrames = 15,
    SpectatorCantSpectate = 22,
    Notification = 24,
    MatchUpdate = 26,
    MatchNew = 27,
    MatchDisband = 28,
    MatchJoinSuccess = 36,
    MatchJoinFail = 37,
    FellowSpectatorJoined = 42,
    FellowSpectatorLeft = 43,
    MatchStart = 46,
    MatchScoreUpdate = 48,
    MatchTransferHost = 50,
    MatchAllPlayersLoaded = 53,
    MatchPlayerFailed = 57,
    MatchComplete = 58,
    MatchSkip = 61,
    ChannelJoinSuccess = 64,
    ChannelInfo = 65,
    ChannelKick = 66,
    LoginPermissions = 71,
    FriendsList = 72,
    ProtocolVersion = 75,
    MatchPlayerSkipped = 81,
    UserPresence = 83,
    Restart = 86,
    ChannelInfoEnd = 89,
    SilenceEnd = 92,
    UserSilenced = 94,
    UserDmBlocked = 100,
    TargetIsSilenced = 101,
    AccountRestricted = 104,
    MatchAbort = 106,
}

impl From<ServerPacket> for u16 {
    fn from(packet: ServerPacket) -> u16 {
        packet as u16
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

fn empty(packet: ServerPacket) -> Vec<u8> {
    frame(packet.into(), &[])
}

fn single_i32(packet: ServerPacket, value: i32) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_i32(value);
    w.finish(packet)
}

fn single_string(packet: ServerPacket, value: &str) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_string(value);
    w.finish(packet)
}

fn match_packet(packet: ServerPacket, record: &MatchRecord, audience: Audience) -> Vec<u8> {
    let mut w = PacketWriter::new();
    record.encode(&mut w, audience);
    w.finish(packet)
}

/// Login result: the user id on success, a negative code on failure.
pub fn login_reply(code: i32) -> Vec<u8> {
    single_i32(ServerPacket::LoginReply, code)
}

/// Login reply code for "server is in maintenance".
pub const LOGIN_MAINTENANCE: i32 = -5;

pub fn protocol_version(version: i32) -> Vec<u8> {
    single_i32(ServerPacket::ProtocolVersion, version)
}

pub fn login_permissions(rank: crate::ClientRank) -> Vec<u8> {
    single_i32(ServerPacket::LoginPermissions, i32::from(rank.bits()))
}

pub fn friends_list(friends: &[UserId]) -> Vec<u8> {
    let ids: Vec<u32> = friends.iter().map(|id| id.0 as u32).collect();
    let mut w = PacketWriter::new();
    w.write_u32_list(&ids);
    w.finish(ServerPacket::FriendsList)
}

/// Seconds of silence left for the receiving user.
pub fn silence_end(seconds: i32) -> Vec<u8> {
    single_i32(ServerPacket::SilenceEnd, seconds)
}

/// Tells clients to clear chat lines of a silenced user.
pub fn user_silenced(user_id: UserId) -> Vec<u8> {
    single_i32(ServerPacket::UserSilenced, user_id.0)
}

pub fn notification(text: &str) -> Vec<u8> {
    single_string(ServerPacket::Notification, text)
}

/// Asks the client to reconnect after `delay_ms`.
pub fn restart(delay_ms: i32) -> Vec<u8> {
    single_i32(ServerPacket::Restart, delay_ms)
}

pub fn ping() -> Vec<u8> {
    empty(ServerPacket::Ping)
}

pub fn account_restricted() -> Vec<u8> {
    empty(ServerPacket::AccountRestricted)
}

pub fn user_presence(record: &PresenceRecord) -> Vec<u8> {
    let mut w = PacketWriter::new();
    record.encode(&mut w);
    w.finish(ServerPacket::UserPresence)
}

pub fn user_stats(record: &StatsRecord) -> Vec<u8> {
    let mut w = PacketWriter::new();
    record.encode(&mut w);
    w.finish(ServerPacket::UserStats)
}

pub fn user_logout(user_id: UserId) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_i32(user_id.0).write_u8(0);
    w.finish(ServerPacket::UserLogout)
}

// ---- chat ----

pub fn send_message(message: &ChatMessage) -> Vec<u8> {
    let mut w = PacketWriter::new();
    message.encode(&mut w);
    w.finish(ServerPacket::SendMessage)
}

/// The target only accepts private messages from friends.
pub fn dm_blocked(target: &str) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_string("").write_string("").write_string(target).write_i32(0);
    w.finish(ServerPacket::UserDmBlocked)
}

pub fn target_silenced(target: &str) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_string("").write_string("").write_string(target).write_i32(0);
    w.finish(ServerPacket::TargetIsSilenced)
}

pub fn channel_join_success(name: &str) -> Vec<u8> {
    single_string(ServerPacket::ChannelJoinSuccess, name)
}

/// Removes a channel tab on the client.
pub fn channel_kick(name: &str) -> Vec<u8> {
    single_string(ServerPacket::ChannelKick, name)
}

pub fn channel_info(record: &ChannelInfoRecord) -> Vec<u8> {
    let mut w = PacketWriter::new();
    record.encode(&mut w);
    w.finish(ServerPacket::ChannelInfo)
}

pub fn channel_info_end() -> Vec<u8> {
    empty(ServerPacket::ChannelInfoEnd)
}

// ---- spectating ----

pub fn spectator_joined(user_id: UserId) -> Vec<u8> {
    single_i32(ServerPacket::SpectatorJoined, user_id.0)
}

pub fn spectator_left(user_id: UserId) -> Vec<u8> {
    single_i32(ServerPacket::SpectatorLeft, user_id.0)
}

pub fn fellow_spectator_joined(user_id: UserId) -> Vec<u8> {
    single_i32(ServerPacket::FellowSpectatorJoined, user_id.0)
}

pub fn fellow_spectator_left(user_id: UserId) -> Vec<u8> {
    single_i32(ServerPacket::FellowSpectatorLeft, user_id.0)
}

pub fn spectator_cant_spectate(user_id: UserId) -> Vec<u8> {
    single_i32(ServerPacket::SpectatorCantSpectate, user_id.0)
}

/// Relays replay frames verbatim.
pub fn spectate_frames(raw: &[u8]) -> Vec<u8> {
    frame(ServerPacket::SpectateFrames.into(), raw)
}

// ---- multiplayer ----

pub fn match_new(record: &MatchRecord) -> Vec<u8> {
    match_packet(ServerPacket::MatchNew, record, Audience::Outsider)
}

pub fn match_update(record: &MatchRecord, audience: Audience) -> Vec<u8> {
    match_packet(ServerPacket::MatchUpdate, record, audience)
}

pub fn match_join_success(record: &MatchRecord) -> Vec<u8> {
    match_packet(ServerPacket::MatchJoinSuccess, record, Audience::Participant)
}

pub fn match_join_fail() -> Vec<u8> {
    empty(ServerPacket::MatchJoinFail)
}

pub fn match_start(record: &MatchRecord) -> Vec<u8> {
    match_packet(ServerPacket::MatchStart, record, Audience::Participant)
}

pub fn match_disband(id: MatchId) -> Vec<u8> {
    single_i32(ServerPacket::MatchDisband, i32::from(id.0))
}

pub fn match_transfer_host() -> Vec<u8> {
    empty(ServerPacket::MatchTransferHost)
}

pub fn match_all_players_loaded() -> Vec<u8> {
    empty(ServerPacket::MatchAllPlayersLoaded)
}

/// Relays a score frame; the slot byte must already be rewritten.
pub fn match_score_update(raw: &[u8]) -> Vec<u8> {
    frame(ServerPacket::MatchScoreUpdate.into(), raw)
}

pub fn match_player_failed(slot: usize) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_i16(slot as i16);
    w.finish(ServerPacket::MatchPlayerFailed)
}

pub fn match_complete() -> Vec<u8> {
    empty(ServerPacket::MatchComplete)
}

pub fn match_skip() -> Vec<u8> {
    empty(ServerPacket::MatchSkip)
}

pub fn match_player_skipped(user_id: UserId) -> Vec<u8> {
    single_i32(ServerPacket::MatchPlayerSkipped, user_id.0)
}

pub fn match_abort() -> Vec<u8> {
    empty(ServerPacket::MatchAbort)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FrameReader, PacketReader};

    fn single_frame(bytes: &[u8]) -> (u16, Vec<u8>) {
        let mut frames = FrameReader::new(bytes);
        let frame = frames.next().expect("one frame").expect("valid frame");
        assert!(frames.next().is_none());
        (frame.packet_id, frame.payload.to_vec())
    }

    #[test]
    fn test_client_packet_from_u16_known_and_unknown() {
        assert_eq!(ClientPacket::from_u16(32), Some(ClientPacket::JoinMatch));
        assert_eq!(ClientPacket::from_u16(109), Some(ClientPacket::TournamentLeaveMatchChannel));
        assert_eq!(ClientPacket::from_u16(68), None);
    }

    #[test]
    fn test_logout_packet_layout() {
        let (id, payload) = single_frame(&user_logout(UserId(1000)));
        assert_eq!(id, 12);
        assert_eq!(payload, vec![0xe8, 0x03, 0, 0, 0]);
    }

    #[test]
    fn test_match_disband_carries_i32_id() {
        let (id, payload) = single_frame(&match_disband(MatchId(3)));
        assert_eq!(id, 28);
        assert_eq!(PacketReader::new(&payload).read_i32().unwrap(), 3);
    }

    #[test]
    fn test_channel_info_layout() {
        let record = ChannelInfoRecord {
            name: "#osu".into(),
            description: "main".into(),
            member_count: 2,
        };
        let (id, payload) = single_frame(&channel_info(&record));
        assert_eq!(id, 65);
        let mut r = PacketReader::new(&payload);
        assert_eq!(r.read_string().unwrap(), "#osu");
        assert_eq!(r.read_string().unwrap(), "main");
        assert_eq!(r.read_i16().unwrap(), 2);
    }

    #[test]
    fn test_match_new_hides_password() {
        let record = MatchRecord {
            password: Some("secret".into()),
            ..MatchRecord::default()
        };
        let (id, payload) = single_frame(&match_new(&record));
        assert_eq!(id, 27);
        let decoded = MatchRecord::decode(&mut PacketReader::new(&payload)).unwrap();
        assert_eq!(decoded.password.as_deref(), Some(" "));
    }

    #[test]
    fn test_match_player_failed_is_i16_slot() {
        let (id, payload) = single_frame(&match_player_failed(5));
        assert_eq!(id, 57);
        assert_eq!(payload, vec![5, 0]);
    }

    #[test]
    fn test_empty_packets_have_empty_payload() {
        for bytes in [match_complete(), match_skip(), match_join_fail(), channel_info_end()] {
            let (_, payload) = single_frame(&bytes);
            assert!(payload.is_empty());
        }
    }
}

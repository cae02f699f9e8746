//! Compound records: the structured payloads that are more than one field.
//!
//! Each record is a plain data struct with an `encode` method writing into a
//! [`PacketWriter`] and, where the client sends it too, a `decode` method
//! reading from a [`PacketReader`]. Records carry ids, never live session
//! handles; turning an id back into a session is the directory's job.

use crate::codec::{PacketReader, PacketWriter};
use crate::types::{
    Action, ClientRank, GameMode, MatchId, MatchType, Mods, SLOT_COUNT, ScoringType,
    SlotStatus, SlotTeam, TeamType, UserId,
};
use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Match record
// ---------------------------------------------------------------------------

/// Who a match record is being written for.
///
/// Outsiders (lobby browsers) only learn *whether* a match has a password:
/// the real value is replaced by a single space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Participant,
    Outsider,
}

/// One of the sixteen seats as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotRecord {
    pub status: SlotStatus,
    pub team: SlotTeam,
    pub mods: Mods,
    /// Present exactly when `status` has a player.
    pub user_id: Option<UserId>,
}

/// The full multiplayer match record.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub id: MatchId,
    pub in_progress: bool,
    pub match_type: MatchType,
    pub mods: Mods,
    pub name: String,
    pub password: Option<String>,
    pub beatmap_name: String,
    pub beatmap_id: i32,
    pub beatmap_md5: String,
    pub slots: [SlotRecord; SLOT_COUNT],
    /// The effective host: the tournament host for tournament matches.
    pub host_id: UserId,
    pub mode: GameMode,
    pub scoring_type: ScoringType,
    pub team_type: TeamType,
    pub freemod: bool,
    pub seed: i32,
}

impl Default for MatchRecord {
    fn default() -> Self {
        Self {
            id: MatchId(0),
            in_progress: false,
            match_type: MatchType::Standard,
            mods: Mods::empty(),
            name: String::new(),
            password: None,
            beatmap_name: String::new(),
            beatmap_id: 0,
            beatmap_md5: String::new(),
            slots: [SlotRecord::default(); SLOT_COUNT],
            host_id: UserId(0),
            mode: GameMode::Standard,
            scoring_type: ScoringType::Score,
            team_type: TeamType::HeadToHead,
            freemod: false,
            seed: 0,
        }
    }
}

impl MatchRecord {
    pub fn encode(&self, w: &mut PacketWriter, audience: Audience) {
        w.write_i16(self.id.0 as i16)
            .write_bool(self.in_progress)
            .write_u8(self.match_type as u8)
            .write_i32(self.mods.to_wire())
            .write_string(&self.name);

        match (&self.password, audience) {
            (None, _) => w.write_absent_string(),
            (Some(_), Audience::Outsider) => w.write_string(" "),
            (Some(password), Audience::Participant) => w.write_string(password),
        };

        w.write_string(&self.beatmap_name)
            .write_i32(self.beatmap_id)
            .write_string(&self.beatmap_md5);

        for slot in &self.slots {
            w.write_u8(slot.status.bits());
        }
        for slot in &self.slots {
            w.write_u8(slot.team as u8);
        }
        // Occupant ids follow the status bytes that were just written,
        // so the reader can rebuild occupancy without a count.
        for slot in &self.slots {
            if slot.status.has_player() {
                w.write_i32(slot.user_id.map_or(0, |id| id.0));
            }
        }

        w.write_i32(self.host_id.0)
            .write_u8(self.mode as u8)
            .write_u8(self.scoring_type as u8)
            .write_u8(self.team_type as u8)
            .write_bool(self.freemod);

        if self.freemod {
            for slot in &self.slots {
                w.write_i32(slot.mods.to_wire());
            }
        }

        w.write_i32(self.seed);
    }

    pub fn decode(r: &mut PacketReader<'_>) -> Result<Self, ProtocolError> {
        let id = MatchId(r.read_i16()? as u16);
        let in_progress = r.read_bool()?;
        let match_type = MatchType::from_u8(r.read_u8()?);
        let mods = Mods::from_wire(r.read_i32()?);
        let name = r.read_string()?;
        let password = Some(r.read_string()?).filter(|p| !p.is_empty());
        let beatmap_name = r.read_string()?;
        let beatmap_id = r.read_i32()?;
        let beatmap_md5 = r.read_string()?;

        let mut slots = [SlotRecord::default(); SLOT_COUNT];
        for slot in &mut slots {
            slot.status = SlotStatus::from_bits_retain(r.read_u8()?);
        }
        for slot in &mut slots {
            slot.team = SlotTeam::from_u8(r.read_u8()?);
        }
        for slot in &mut slots {
            if slot.status.has_player() {
                slot.user_id = Some(UserId(r.read_i32()?));
            }
        }

        let host_id = UserId(r.read_i32()?);
        let mode = GameMode::from_u8(r.read_u8()?);
        let scoring_type = ScoringType::from_u8(r.read_u8()?);
        let team_type = TeamType::from_u8(r.read_u8()?);
        let freemod = r.read_bool()?;

        if freemod {
            for slot in &mut slots {
                slot.mods = Mods::from_wire(r.read_i32()?);
            }
        }

        let seed = r.read_i32()?;

        Ok(Self {
            id,
            in_progress,
            match_type,
            mods,
            name,
            password,
            beatmap_name,
            beatmap_id,
            beatmap_md5,
            slots,
            host_id,
            mode,
            scoring_type,
            team_type,
            freemod,
            seed,
        })
    }
}

// ---------------------------------------------------------------------------
// Presence and stats
// ---------------------------------------------------------------------------

/// Payload of the user-presence packet.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub name: String,
    /// UTC offset in hours, shifted by 24 on the wire.
    pub utc_offset: i8,
    pub country: u8,
    pub rank: ClientRank,
    pub latitude: f64,
    pub longitude: f64,
    pub global_rank: i32,
}

impl PresenceRecord {
    pub fn encode(&self, w: &mut PacketWriter) {
        w.write_i32(self.user_id.0)
            .write_string(&self.name)
            .write_u8((i16::from(self.utc_offset) + 24).clamp(0, 255) as u8)
            .write_u8(self.country)
            .write_u8(self.rank.bits())
            .write_f64(self.latitude)
            .write_f64(self.longitude)
            .write_i32(self.global_rank);
    }
}

/// What the user is doing right now. Sent by the client, echoed in stats.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusRecord {
    pub action: Action,
    pub text: String,
    pub map_md5: String,
    pub mods: Mods,
    pub mode: GameMode,
    pub map_id: i32,
}

impl StatusRecord {
    pub fn decode(r: &mut PacketReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            action: Action::from_u8(r.read_u8()?),
            text: r.read_string()?,
            map_md5: r.read_string()?,
            mods: Mods::from_wire(r.read_i32()?),
            mode: GameMode::from_u8(r.read_u8()?),
            map_id: r.read_i32()?,
        })
    }
}

/// Payload of the user-stats packet.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsRecord {
    pub user_id: UserId,
    pub status: StatusRecord,
    pub ranked_score: i64,
    /// Accuracy in percent (0..=100); written as a fraction.
    pub accuracy: f32,
    pub play_count: i32,
    pub total_score: u64,
    pub global_rank: i32,
    pub pp: i16,
}

impl StatsRecord {
    pub fn encode(&self, w: &mut PacketWriter) {
        w.write_i32(self.user_id.0)
            .write_u8(self.status.action as u8)
            .write_string(&self.status.text)
            .write_string(&self.status.map_md5)
            .write_i32(self.status.mods.to_wire())
            .write_u8(self.status.mode as u8)
            .write_i32(self.status.map_id)
            .write_i64(self.ranked_score)
            .write_f32(self.accuracy / 100.0)
            .write_i32(self.play_count)
            .write_u64(self.total_score)
            .write_i32(self.global_rank)
            .write_i16(self.pp);
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A chat line, either to a channel (`to` starts with `#`) or a user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatMessage {
    pub sender: String,
    pub body: String,
    pub to: String,
    pub sender_id: UserId,
}

impl ChatMessage {
    pub fn encode(&self, w: &mut PacketWriter) {
        w.write_string(&self.sender)
            .write_string(&self.body)
            .write_string(&self.to)
            .write_i32(self.sender_id.0);
    }

    /// Decodes a client message. The client leaves the sender fields
    /// blank; the server fills them in from the session.
    pub fn decode(r: &mut PacketReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            sender: r.read_string()?,
            body: r.read_string()?,
            to: r.read_string()?,
            sender_id: UserId(r.read_i32()?),
        })
    }

    /// `true` when addressed to a channel rather than a user.
    pub fn is_channel_message(&self) -> bool {
        self.to.starts_with('#')
    }
}

/// A channel as listed to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfoRecord {
    pub name: String,
    pub description: String,
    pub member_count: u16,
}

impl ChannelInfoRecord {
    pub fn encode(&self, w: &mut PacketWriter) {
        w.write_string(&self.name)
            .write_string(&self.description)
            .write_i16(self.member_count as i16);
    }
}

// ---------------------------------------------------------------------------
// Small client payloads
// ---------------------------------------------------------------------------

/// Match join request: the match id and the password the user typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub match_id: MatchId,
    pub password: String,
}

impl JoinRequest {
    pub fn decode(r: &mut PacketReader<'_>) -> Result<Self, ProtocolError> {
        let raw_id = r.read_i32()?;
        let match_id = u16::try_from(raw_id)
            .map(MatchId)
            .map_err(|_| ProtocolError::InvalidMessage(format!("match id {raw_id} out of range")))?;
        Ok(Self {
            match_id,
            password: r.read_string()?,
        })
    }
}

/// Reads a payload that is a single `i32`.
pub fn read_single_i32(payload: &[u8]) -> Result<i32, ProtocolError> {
    PacketReader::new(payload).read_i32()
}

/// Reads a payload that is a single string (channel joins and leaves).
pub fn read_single_string(payload: &[u8]) -> Result<String, ProtocolError> {
    PacketReader::new(payload).read_string()
}

/// Reads a payload that is a user id list (presence/stats requests).
pub fn read_user_id_list(payload: &[u8]) -> Result<Vec<UserId>, ProtocolError> {
    Ok(PacketReader::new(payload)
        .read_u32_list()?
        .into_iter()
        .map(|id| UserId(id as i32))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_match() -> MatchRecord {
        let mut record = MatchRecord {
            id: MatchId(12),
            name: "friday lobby".into(),
            password: Some("abc".into()),
            beatmap_name: "artist - title [hard]".into(),
            beatmap_id: 315,
            beatmap_md5: "0123456789abcdef0123456789abcdef".into(),
            host_id: UserId(1000),
            seed: 77,
            ..MatchRecord::default()
        };
        record.slots[0] = SlotRecord {
            status: SlotStatus::NOT_READY,
            team: SlotTeam::Neutral,
            mods: Mods::empty(),
            user_id: Some(UserId(1000)),
        };
        record.slots[3] = SlotRecord {
            status: SlotStatus::READY,
            team: SlotTeam::Neutral,
            mods: Mods::empty(),
            user_id: Some(UserId(1001)),
        };
        record.slots[15].status = SlotStatus::LOCKED;
        record
    }

    fn round_trip(record: &MatchRecord, audience: Audience) -> MatchRecord {
        let mut w = PacketWriter::new();
        record.encode(&mut w, audience);
        let bytes = w.into_payload();
        let mut r = PacketReader::new(&bytes);
        let decoded = MatchRecord::decode(&mut r).expect("decode");
        assert_eq!(r.remaining(), 0, "decoder must consume the whole record");
        decoded
    }

    // -----------------------------------------------------------------------
    // Match record
    // -----------------------------------------------------------------------

    #[test]
    fn test_match_record_round_trip_for_participant() {
        let record = sample_match();
        assert_eq!(round_trip(&record, Audience::Participant), record);
    }

    #[test]
    fn test_match_record_outsider_sees_space_password() {
        let decoded = round_trip(&sample_match(), Audience::Outsider);
        assert_eq!(decoded.password.as_deref(), Some(" "));
    }

    #[test]
    fn test_match_record_without_password_writes_zero_byte() {
        let mut record = sample_match();
        record.password = None;
        let mut w = PacketWriter::new();
        record.encode(&mut w, Audience::Outsider);
        let bytes = w.into_payload();
        // id(2) + in_progress(1) + type(1) + mods(4) + name(2 + 12)
        assert_eq!(bytes[22], 0x00);
        assert_eq!(round_trip(&record, Audience::Outsider).password, None);
    }

    #[test]
    fn test_match_record_occupancy_from_status_array() {
        let decoded = round_trip(&sample_match(), Audience::Participant);
        let occupied: Vec<usize> = decoded
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.user_id.is_some())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(occupied, vec![0, 3]);
        assert_eq!(decoded.slots[15].status, SlotStatus::LOCKED);
    }

    #[test]
    fn test_match_record_freemod_writes_mods_for_every_slot() {
        let mut record = sample_match();
        record.freemod = true;
        record.slots[0].mods = Mods::HIDDEN;
        // An empty slot still carries a mods value under freemod.
        record.slots[9].mods = Mods::FLASHLIGHT;

        let mut plain = PacketWriter::new();
        sample_match().encode(&mut plain, Audience::Participant);
        let mut free = PacketWriter::new();
        record.encode(&mut free, Audience::Participant);
        assert_eq!(free.len(), plain.len() + 16 * 4);

        let decoded = round_trip(&record, Audience::Participant);
        assert_eq!(decoded.slots[0].mods, Mods::HIDDEN);
        assert_eq!(decoded.slots[9].mods, Mods::FLASHLIGHT);
    }

    #[test]
    fn test_match_record_round_trip_across_team_types_and_fill_levels() {
        let team_types = [
            TeamType::HeadToHead,
            TeamType::TagCoop,
            TeamType::TeamVs,
            TeamType::TagTeamVs,
        ];
        for occupied in [0usize, 1, 7, 16] {
            for team_type in team_types {
                for freemod in [false, true] {
                    let mut record = MatchRecord {
                        team_type,
                        freemod,
                        ..MatchRecord::default()
                    };
                    for (i, slot) in record.slots.iter_mut().enumerate().take(occupied) {
                        slot.status = SlotStatus::NOT_READY;
                        slot.user_id = Some(UserId(2000 + i as i32));
                        slot.team = if team_type.is_team_mode() {
                            SlotTeam::from_u8(1 + (i % 2) as u8)
                        } else {
                            SlotTeam::Neutral
                        };
                        if freemod {
                            slot.mods = Mods::HIDDEN;
                        }
                    }
                    assert_eq!(round_trip(&record, Audience::Participant), record);
                }
            }
        }
    }

    #[test]
    fn test_match_record_truncated_faults() {
        let mut w = PacketWriter::new();
        sample_match().encode(&mut w, Audience::Participant);
        let bytes = w.into_payload();
        let mut r = PacketReader::new(&bytes[..bytes.len() - 2]);
        assert!(matches!(
            MatchRecord::decode(&mut r),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Other records
    // -----------------------------------------------------------------------

    #[test]
    fn test_chat_message_round_trip() {
        let message = ChatMessage {
            sender: "alice".into(),
            body: "hi".into(),
            to: "#osu".into(),
            sender_id: UserId(3),
        };
        let mut w = PacketWriter::new();
        message.encode(&mut w);
        let bytes = w.into_payload();
        let decoded = ChatMessage::decode(&mut PacketReader::new(&bytes)).unwrap();
        assert_eq!(decoded, message);
        assert!(decoded.is_channel_message());
    }

    #[test]
    fn test_status_record_decode() {
        let mut w = PacketWriter::new();
        w.write_u8(2)
            .write_string("Playing something")
            .write_string("abcd")
            .write_i32(Mods::HIDDEN.to_wire())
            .write_u8(3)
            .write_i32(42);
        let bytes = w.into_payload();
        let status = StatusRecord::decode(&mut PacketReader::new(&bytes)).unwrap();
        assert_eq!(status.action, Action::Playing);
        assert_eq!(status.mods, Mods::HIDDEN);
        assert_eq!(status.mode, GameMode::Mania);
        assert_eq!(status.map_id, 42);
    }

    #[test]
    fn test_stats_record_writes_accuracy_as_fraction() {
        let record = StatsRecord {
            user_id: UserId(5),
            status: StatusRecord::default(),
            ranked_score: 0,
            accuracy: 98.5,
            play_count: 0,
            total_score: 0,
            global_rank: 0,
            pp: 0,
        };
        let mut w = PacketWriter::new();
        record.encode(&mut w);
        let bytes = w.into_payload();
        let mut r = PacketReader::new(&bytes);
        r.read_i32().unwrap();
        r.read_u8().unwrap();
        r.read_string().unwrap();
        r.read_string().unwrap();
        r.read_i32().unwrap();
        r.read_u8().unwrap();
        r.read_i32().unwrap();
        r.read_i64().unwrap();
        assert!((r.read_f32().unwrap() - 0.985).abs() < 1e-6);
    }

    #[test]
    fn test_join_request_rejects_negative_id() {
        let mut w = PacketWriter::new();
        w.write_i32(-4).write_string("");
        let bytes = w.into_payload();
        assert!(JoinRequest::decode(&mut PacketReader::new(&bytes)).is_err());
    }
}

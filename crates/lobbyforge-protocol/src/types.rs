//! Core value types of the Lobbyforge wire format.
//!
//! Everything in here is small and `Copy`: identifiers, the enum-like bytes
//! the client sends for match settings, and the bitflag sets for mods, slot
//! status and privileges. The codec in [`crate::codec`] writes these as the
//! raw integers the client expects; the `from_u8` constructors are
//! deliberately permissive and map unknown bytes to a default variant, because
//! a malformed setting byte from a client must never take a session down.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Number of seats in every multiplayer match. The wire format is positional,
/// so this is fixed.
pub const SLOT_COUNT: usize = 16;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The stable numeric id of a user account.
///
/// Newtype over the `i32` the client uses on the wire, so a user id can't be
/// mixed up with a match id or a slot index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub i32);

/// Prints as `U-1000` in logs.
impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// The id of a multiplayer match. Matches are numbered monotonically by the
/// match registry; on the wire the id is a 16-bit field.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MatchId(pub u16);

impl MatchId {
    /// Name of the temporary channel that belongs to this match.
    pub fn channel_name(self) -> String {
        format!("#multi_{}", self.0)
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Bitflag sets
// ---------------------------------------------------------------------------

bitflags! {
    /// Gameplay modifiers. Values are the client's bit positions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Mods: u32 {
        const NO_FAIL = 1 << 0;
        const EASY = 1 << 1;
        const TOUCH_DEVICE = 1 << 2;
        const HIDDEN = 1 << 3;
        const HARD_ROCK = 1 << 4;
        const SUDDEN_DEATH = 1 << 5;
        const DOUBLE_TIME = 1 << 6;
        const RELAX = 1 << 7;
        const HALF_TIME = 1 << 8;
        const NIGHTCORE = 1 << 9;
        const FLASHLIGHT = 1 << 10;
        const AUTOPLAY = 1 << 11;
        const SPUN_OUT = 1 << 12;
        const RELAX2 = 1 << 13;
        const PERFECT = 1 << 14;
        const KEY4 = 1 << 15;
        const KEY5 = 1 << 16;
        const KEY6 = 1 << 17;
        const KEY7 = 1 << 18;
        const KEY8 = 1 << 19;
        const FADE_IN = 1 << 20;
        const RANDOM = 1 << 21;
        const CINEMA = 1 << 22;
        const TARGET = 1 << 23;
        const KEY9 = 1 << 24;
        const KEY_COOP = 1 << 25;
        const KEY1 = 1 << 26;
        const KEY3 = 1 << 27;
        const KEY2 = 1 << 28;
        const SCORE_V2 = 1 << 29;
        const MIRROR = 1 << 30;

        /// Mods that change playback speed. Under freemod these stay
        /// match-wide and only the host may set them.
        const SPEED_ALTERING = Self::DOUBLE_TIME.bits()
            | Self::NIGHTCORE.bits()
            | Self::HALF_TIME.bits();
    }
}

impl Mods {
    /// Builds a mod set from the raw wire value, keeping unknown bits.
    pub fn from_wire(raw: i32) -> Self {
        Self::from_bits_retain(raw as u32)
    }

    /// The raw value as written on the wire.
    pub fn to_wire(self) -> i32 {
        self.bits() as i32
    }

    /// Removes mutually exclusive combinations the client can still produce.
    pub fn sanitized(mut self) -> Self {
        if self.intersects(Self::DOUBLE_TIME | Self::NIGHTCORE)
            && self.contains(Self::HALF_TIME)
        {
            self.remove(Self::HALF_TIME);
        }
        if self.contains(Self::EASY) && self.contains(Self::HARD_ROCK) {
            self.remove(Self::HARD_ROCK);
        }
        if self.contains(Self::RELAX) && self.contains(Self::RELAX2) {
            self.remove(Self::AUTOPLAY);
        }
        if self.contains(Self::PERFECT) && self.contains(Self::SUDDEN_DEATH) {
            self.remove(Self::SUDDEN_DEATH);
        }
        self
    }

    /// Only the speed-altering part of this set.
    pub fn speed_part(self) -> Self {
        self & Self::SPEED_ALTERING
    }

    /// Everything except the speed-altering part.
    pub fn without_speed(self) -> Self {
        self - Self::SPEED_ALTERING
    }
}

bitflags! {
    /// Status byte of one match slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SlotStatus: u8 {
        const OPEN = 1;
        const LOCKED = 2;
        const NOT_READY = 4;
        const READY = 8;
        const NO_MAP = 16;
        const PLAYING = 32;
        const COMPLETE = 64;
        const QUIT = 128;

        /// Any status that means a participant sits in the slot.
        const HAS_PLAYER = Self::NOT_READY.bits()
            | Self::READY.bits()
            | Self::NO_MAP.bits()
            | Self::PLAYING.bits()
            | Self::COMPLETE.bits();
    }
}

impl SlotStatus {
    /// `true` when the status says the slot holds a participant.
    pub fn has_player(self) -> bool {
        self.intersects(Self::HAS_PLAYER)
    }
}

impl Default for SlotStatus {
    fn default() -> Self {
        Self::OPEN
    }
}

bitflags! {
    /// Server-side account roles.
    ///
    /// Roles are composite: `DEVELOPER` includes every bit of `CHAT_MOD`
    /// and more. A session "has" a role when all bits of the role are
    /// present, see [`Privileges::has`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Privileges: u32 {
        const PUBLIC = 1;
        const NORMAL = 3;
        const DONOR = 7;
        const BAT = 271;
        const REPLAY_MODERATOR = 4351;
        const TOURNAMENT_STAFF = 2097419;
        const CHAT_MOD = 786767;
        const COMMUNITY_MANAGER = 3079679;
        const DEVELOPER = 3129343;
        const OWNER = 7340031;
    }
}

impl Privileges {
    /// Returns `true` when every bit of `role` is present.
    pub fn has(self, role: Privileges) -> bool {
        self.contains(role)
    }

    /// The staff roles allowed into non-public channels.
    pub fn is_channel_staff(self) -> bool {
        [
            Self::DEVELOPER,
            Self::COMMUNITY_MANAGER,
            Self::CHAT_MOD,
            Self::REPLAY_MODERATOR,
        ]
        .into_iter()
        .any(|role| self.has(role))
    }

    /// Derives the rank byte shown by the client.
    pub fn client_rank(self) -> ClientRank {
        let mut rank = ClientRank::PLAYER;
        if self.has(Self::DONOR) {
            rank |= ClientRank::SUPPORTER;
        }
        if self.has(Self::BAT) {
            rank |= ClientRank::BAT;
        }
        if self.has(Self::CHAT_MOD) {
            rank |= ClientRank::MOD;
        }
        if self.has(Self::DEVELOPER) {
            rank |= ClientRank::ADMIN;
        }
        if self.has(Self::OWNER) {
            rank |= ClientRank::PEPPY;
        }
        if self.has(Self::TOURNAMENT_STAFF) {
            rank |= ClientRank::TOURNAMENT_STAFF;
        }
        rank
    }
}

bitflags! {
    /// Rank byte the client uses for name colouring and permissions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClientRank: u8 {
        const PLAYER = 1;
        const BAT = 2;
        const SUPPORTER = 4;
        const MOD = 6;
        const PEPPY = 8;
        const ADMIN = 16;
        const TOURNAMENT_STAFF = 32;
    }
}

// ---------------------------------------------------------------------------
// Byte enums
// ---------------------------------------------------------------------------

/// Team of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum SlotTeam {
    #[default]
    Neutral = 0,
    Blue = 1,
    Red = 2,
}

impl SlotTeam {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Blue,
            2 => Self::Red,
            _ => Self::Neutral,
        }
    }

    /// The opposite colour; neutral stays neutral.
    pub fn toggled(self) -> Self {
        match self {
            Self::Blue => Self::Red,
            Self::Red => Self::Blue,
            Self::Neutral => Self::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum MatchType {
    #[default]
    Standard = 0,
    Powerplay = 1,
}

impl MatchType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Powerplay,
            _ => Self::Standard,
        }
    }
}

/// Win condition of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ScoringType {
    #[default]
    Score = 0,
    Accuracy = 1,
    Combo = 2,
    ScoreV2 = 3,
}

impl ScoringType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Accuracy,
            2 => Self::Combo,
            3 => Self::ScoreV2,
            _ => Self::Score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TeamType {
    #[default]
    HeadToHead = 0,
    TagCoop = 1,
    TeamVs = 2,
    TagTeamVs = 3,
}

impl TeamType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::TagCoop,
            2 => Self::TeamVs,
            3 => Self::TagTeamVs,
            _ => Self::HeadToHead,
        }
    }

    /// Team modes split players into red and blue.
    pub fn is_team_mode(self) -> bool {
        matches!(self, Self::TeamVs | Self::TagTeamVs)
    }
}

/// Ruleset of a beatmap / player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum GameMode {
    #[default]
    Standard = 0,
    Taiko = 1,
    Catch = 2,
    Mania = 3,
}

impl GameMode {
    pub const ALL: [GameMode; 4] = [Self::Standard, Self::Taiko, Self::Catch, Self::Mania];

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Taiko,
            2 => Self::Catch,
            3 => Self::Mania,
            _ => Self::Standard,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// What a user is currently doing, as shown in their presence panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Action {
    #[default]
    Idle = 0,
    Afk = 1,
    Playing = 2,
    Editing = 3,
    Modding = 4,
    Multiplayer = 5,
    Watching = 6,
    Unknown = 7,
    Testing = 8,
    Submitting = 9,
    Paused = 10,
    Lobby = 11,
    Multiplaying = 12,
    OsuDirect = 13,
}

impl Action {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Afk,
            2 => Self::Playing,
            3 => Self::Editing,
            4 => Self::Modding,
            5 => Self::Multiplayer,
            6 => Self::Watching,
            8 => Self::Testing,
            9 => Self::Submitting,
            10 => Self::Paused,
            11 => Self::Lobby,
            12 => Self::Multiplaying,
            13 => Self::OsuDirect,
            _ => Self::Unknown,
        }
    }
}

/// Which users' presence a client wants pushed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum PresenceFilter {
    Nobody = 0,
    #[default]
    All = 1,
    Friends = 2,
}

impl PresenceFilter {
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Nobody,
            2 => Self::Friends,
            _ => Self::All,
        }
    }
}

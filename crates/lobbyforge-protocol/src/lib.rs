//! Binary packet protocol for Lobbyforge.
//!
//! This crate is the bottom of the stack and has no knowledge of sessions,
//! channels or matches. It knows how bytes look:
//!
//! - [`codec`]: primitives, strings, frames ([`PacketReader`],
//!   [`PacketWriter`], [`FrameReader`])
//! - [`record`]: compound payloads such as the multiplayer [`MatchRecord`]
//! - [`packets`]: packet ids and one builder per server packet
//! - [`types`]: ids, mods, slot status, privileges and the byte enums
//!
//! # How it fits in the stack
//!
//! ```text
//! Engine (lobbyforge)            ← routes frames to handlers
//!     ↕
//! Match / Channel layers         ← build packets for affected sessions
//!     ↕
//! Session layer                  ← queues packets per connection
//!     ↕
//! Protocol layer (this crate)    ← bytes in, bytes out
//! ```

pub mod codec;
mod error;
pub mod packets;
pub mod record;
pub mod types;

pub use codec::{Frame, FrameReader, PacketReader, PacketWriter};
pub use error::ProtocolError;
pub use packets::{ClientPacket, ServerPacket};
pub use record::{
    Audience, ChannelInfoRecord, ChatMessage, JoinRequest, MatchRecord, PresenceRecord,
    SlotRecord, StatsRecord, StatusRecord,
};
pub use types::{
    Action, ClientRank, GameMode, MatchId, MatchType, Mods, PresenceFilter, Privileges,
    SLOT_COUNT, ScoringType, SlotStatus, SlotTeam, TeamType, UserId,
};

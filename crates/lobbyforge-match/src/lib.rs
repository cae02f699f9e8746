//! Multiplayer matches for Lobbyforge.
//!
//! A match is a sixteen-slot lobby with a host, shared settings and a round
//! cycle. Players join through the registry, ready up, and the host starts
//! a round; when the last player completes, a [`MatchEndedEvent`] is
//! emitted.
//!
//! # Key types
//!
//! - [`MatchRegistry`]: creates and disbands matches
//! - [`Match`]: the slot table and every lobby operation
//! - [`Slot`]: one seat
//! - [`MatchPhase`]: round state machine
//! - [`HostAuthority`]: normal host or tournament referee
//! - [`MatchEventSink`]: where finished rounds are reported

mod error;
mod event;
mod lobby;
mod phase;
mod registry;
mod slot;

pub use error::MatchError;
pub use event::{
    DiscardEvents, EVENT_BUCKET_SECS, MatchEndedEvent, MatchEventSink, ModMode, PlayerResult,
};
pub use lobby::{
    HostAuthority, LeaveOutcome, Match, MatchServices, MatchSnapshot, OwnStatus,
    SCORE_FRAME_MIN_LEN, SlotSnapshot,
};
pub use phase::MatchPhase;
pub use registry::{MatchRegistry, SharedMatch};
pub use slot::Slot;

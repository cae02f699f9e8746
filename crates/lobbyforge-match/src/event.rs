//! The "match ended" event handed to the outside world.
//!
//! When the last player of a round completes, the match emits one
//! [`MatchEndedEvent`] through a [`MatchEventSink`]. What happens to it next
//! (a pub/sub channel, a score service, a log) is the embedder's business.

use std::collections::BTreeMap;
use std::fmt;

use lobbyforge_protocol::{GameMode, MatchId, MatchType, Mods, ScoringType, SlotTeam, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Width of the time bucket used in [`MatchEndedEvent::event_id`].
pub const EVENT_BUCKET_SECS: u64 = 60;

/// How mods were chosen for the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModMode {
    /// Host-chosen, match-wide.
    Normal,
    /// Each player chose their own.
    Freemod,
}

/// One player's result in a finished round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerResult {
    pub username: String,
    pub score: i32,
    /// Effective mods: own slot mods plus the match-wide speed mods under
    /// freemod, the match mods otherwise.
    pub mods: u32,
    pub failed: bool,
    pub passed: bool,
    pub team: SlotTeam,
}

/// Emitted once per completed round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEndedEvent {
    /// Stable id built from the completion time bucket and the match id,
    /// e.g. `"29012345-7"`. A consumer that sees the same id twice is
    /// looking at a duplicate delivery of the same round.
    pub event_id: String,
    pub match_id: MatchId,
    pub name: String,
    pub beatmap_id: i32,
    pub mods: u32,
    pub mode: GameMode,
    pub host_id: UserId,
    pub match_type: MatchType,
    pub scoring_type: ScoringType,
    pub mod_mode: ModMode,
    pub per_player: BTreeMap<UserId, PlayerResult>,
}

impl MatchEndedEvent {
    pub fn composite_id(completed_at_unix: u64, match_id: MatchId) -> String {
        format!("{}-{}", completed_at_unix / EVENT_BUCKET_SECS, match_id.0)
    }

    /// JSON form for publishing.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub(crate) fn effective_mods(match_mods: Mods, slot_mods: Mods, freemod: bool) -> Mods {
        if freemod {
            slot_mods | match_mods.speed_part()
        } else {
            match_mods
        }
    }
}

/// Receives match lifecycle events.
///
/// Implementations must not block: the sink is called while the match is
/// locked.
pub trait MatchEventSink: Send + Sync + fmt::Debug {
    fn match_ended(&self, event: MatchEndedEvent);
}

/// Forwards events into a tokio channel; the receiving task publishes them.
impl MatchEventSink for mpsc::UnboundedSender<MatchEndedEvent> {
    fn match_ended(&self, event: MatchEndedEvent) {
        let match_id = event.match_id;
        if self.send(event).is_err() {
            tracing::warn!(%match_id, "match event receiver dropped, event lost");
        }
    }
}

/// Drops every event. For embedders that don't publish results.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardEvents;

impl MatchEventSink for DiscardEvents {
    fn match_ended(&self, event: MatchEndedEvent) {
        tracing::debug!(match_id = %event.match_id, "match ended, event discarded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MatchEndedEvent {
        let mut per_player = BTreeMap::new();
        per_player.insert(
            UserId(1000),
            PlayerResult {
                username: "alice".into(),
                score: 1_000_000,
                mods: Mods::HIDDEN.bits(),
                failed: false,
                passed: true,
                team: SlotTeam::Neutral,
            },
        );
        MatchEndedEvent {
            event_id: MatchEndedEvent::composite_id(120, MatchId(7)),
            match_id: MatchId(7),
            name: "test".into(),
            beatmap_id: 1,
            mods: 0,
            mode: GameMode::Standard,
            host_id: UserId(1000),
            match_type: MatchType::Standard,
            scoring_type: ScoringType::Score,
            mod_mode: ModMode::Freemod,
            per_player,
        }
    }

    #[test]
    fn test_composite_id_buckets_time() {
        assert_eq!(MatchEndedEvent::composite_id(119, MatchId(7)), "1-7");
        assert_eq!(MatchEndedEvent::composite_id(120, MatchId(7)), "2-7");
        assert_eq!(
            MatchEndedEvent::composite_id(120, MatchId(7)),
            MatchEndedEvent::composite_id(150, MatchId(7))
        );
    }

    #[test]
    fn test_to_json_uses_camel_case_keys() {
        let json = sample().to_json().unwrap();
        assert!(json.contains("\"matchId\":7"));
        assert!(json.contains("\"perPlayer\":{\"1000\""));
        assert!(json.contains("\"modMode\":\"freemod\""));
    }

    #[test]
    fn test_effective_mods_under_freemod_adds_speed() {
        let mods = MatchEndedEvent::effective_mods(
            Mods::DOUBLE_TIME,
            Mods::HIDDEN,
            true,
        );
        assert_eq!(mods, Mods::HIDDEN | Mods::DOUBLE_TIME);
        assert_eq!(
            MatchEndedEvent::effective_mods(Mods::HARD_ROCK, Mods::HIDDEN, false),
            Mods::HARD_ROCK
        );
    }

    #[test]
    fn test_channel_sink_forwards() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.match_ended(sample());
        assert_eq!(rx.try_recv().unwrap().match_id, MatchId(7));
    }
}

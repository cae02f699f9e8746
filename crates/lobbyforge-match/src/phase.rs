//! Match round state machine.

use serde::{Deserialize, Serialize};

/// Where a match is in its play cycle.
///
/// ```text
///            start()          all loaded        first complete()
/// Forming ──────────→ Starting ──────────→ AllLoaded ──────────→ Completing
///    ↑                   │  │                  │                     │
///    │                   │  └──── complete() ──┼─────────────────────┤
///    │                   │                     │                     │
///    └──── abort() ──────┴─────────────────────┘    last complete()  │
///    └───────────────────────────────────────────────────────────────┘
/// ```
///
/// - **Forming**: players join, ready up, change settings.
/// - **Starting**: the round started, clients are loading the beatmap.
/// - **AllLoaded**: every player loaded; gameplay is running.
/// - **Completing**: at least one player finished, others still playing.
///
/// A player may finish before everyone else has loaded, so Starting can go
/// straight to Completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchPhase {
    #[default]
    Forming,
    Starting,
    AllLoaded,
    Completing,
}

impl MatchPhase {
    /// `true` while a round is in flight.
    pub fn in_progress(self) -> bool {
        !matches!(self, Self::Forming)
    }

    /// Returns `true` if moving to `target` is a legal step.
    pub fn can_transition_to(self, target: Self) -> bool {
        use MatchPhase::*;
        matches!(
            (self, target),
            (Forming, Starting)
                | (Starting, AllLoaded)
                | (Starting, Completing)
                | (AllLoaded, Completing)
                | (Starting, Forming)
                | (AllLoaded, Forming)
                | (Completing, Forming)
        )
    }
}

impl std::fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forming => write!(f, "Forming"),
            Self::Starting => write!(f, "Starting"),
            Self::AllLoaded => write!(f, "AllLoaded"),
            Self::Completing => write!(f, "Completing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forming_only_starts() {
        assert!(MatchPhase::Forming.can_transition_to(MatchPhase::Starting));
        assert!(!MatchPhase::Forming.can_transition_to(MatchPhase::AllLoaded));
        assert!(!MatchPhase::Forming.can_transition_to(MatchPhase::Completing));
        assert!(!MatchPhase::Forming.can_transition_to(MatchPhase::Forming));
    }

    #[test]
    fn test_cannot_start_twice() {
        assert!(!MatchPhase::Starting.can_transition_to(MatchPhase::Starting));
        assert!(!MatchPhase::AllLoaded.can_transition_to(MatchPhase::Starting));
    }

    #[test]
    fn test_every_in_flight_phase_can_return_to_forming() {
        for phase in [
            MatchPhase::Starting,
            MatchPhase::AllLoaded,
            MatchPhase::Completing,
        ] {
            assert!(phase.in_progress());
            assert!(phase.can_transition_to(MatchPhase::Forming));
        }
        assert!(!MatchPhase::Forming.in_progress());
    }

    #[test]
    fn test_completing_does_not_go_back_to_loading() {
        assert!(!MatchPhase::Completing.can_transition_to(MatchPhase::AllLoaded));
        assert!(!MatchPhase::Completing.can_transition_to(MatchPhase::Starting));
    }

    #[test]
    fn test_display() {
        assert_eq!(MatchPhase::AllLoaded.to_string(), "AllLoaded");
    }
}

//! Error types for the match layer.

use lobbyforge_protocol::{MatchId, UserId};

/// Lookups that can fail. Rule violations inside a match (wrong host,
/// locked slot, round in progress) aren't errors: those operations return
/// `false`.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("match {0} not found")]
    NotFound(MatchId),

    #[error("user {0} is not in a match")]
    NotInMatch(UserId),

    /// The creator is already in a match, or no id or slot was free.
    #[error("match creation refused for user {0}")]
    CreationRefused(UserId),
}

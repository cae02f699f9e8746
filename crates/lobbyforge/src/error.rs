//! Unified error type for the Lobbyforge engine.

use lobbyforge_channel::ChannelError;
use lobbyforge_match::MatchError;
use lobbyforge_protocol::ProtocolError;
use lobbyforge_session::SessionError;

/// Top-level error that wraps all crate-specific errors.
///
/// Transports and admin tooling deal with this single type instead of
/// importing errors from each layer. The `#[from]` attribute on each
/// variant generates the `From` impls, so `?` converts automatically.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A decode fault in an inbound batch.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An unknown user or token.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// An unknown channel.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// An unknown match, or a match operation that had no match to act on.
    #[error(transparent)]
    Match(#[from] MatchError),
}

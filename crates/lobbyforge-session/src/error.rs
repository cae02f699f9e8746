//! Error types for the session layer.

use lobbyforge_protocol::UserId;

/// Errors surfaced to the transport when it addresses a session.
///
/// Registration collisions are reported as `false` by the directory itself.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session is registered for this user.
    #[error("no session for user {0}")]
    NotFound(UserId),

    /// The token doesn't belong to any session or sub-session.
    /// Usually a client polling with a token from before a restart.
    #[error("unknown session token")]
    UnknownToken,
}

//! Error types for the channel layer.

/// Errors from addressing a channel by name.
///
/// Permission problems are not errors: joins and writes that a session may
/// not perform simply return `false`.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// No channel with this canonical name exists (or it was a temporary
    /// channel that has already emptied).
    #[error("unknown channel {0}")]
    UnknownChannel(String),
}

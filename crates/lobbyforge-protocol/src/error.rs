//! Error types for the protocol layer.
//!
//! Encoders in this crate are total, so every variant here is a decode
//! fault: the client sent bytes that don't fit the layout we expected.

/// Errors raised while reading the binary packet format.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A read ran past the end of the byte window.
    ///
    /// `wanted` is how many bytes the read needed, `remaining` how many
    /// were left in the window at that point.
    #[error("truncated read: wanted {wanted} bytes, {remaining} remaining")]
    Truncated { wanted: usize, remaining: usize },

    /// A frame header declared a length that is negative or larger than
    /// what is left of the batch.
    #[error("invalid frame length {length} for packet {packet_id}")]
    InvalidFrameLength { packet_id: u16, length: i32 },

    /// A variable-length integer did not terminate within 64 bits.
    #[error("variable-length integer overflow")]
    VarIntOverflow,

    /// The payload decoded, but violates a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

//! Chat channels for Lobbyforge.
//!
//! A channel is a named broadcast group. Permanent channels come from
//! configuration and live for the whole process; temporary channels belong
//! to one match (`#multi_{id}`) or one spectated user (`#spec_{id}`) and are
//! deleted as soon as their last member leaves.
//!
//! [`ChannelRegistry`] owns membership changes so that the two global side
//! effects (descriptor broadcast, temporary-channel deletion) can't be
//! forgotten by a caller.

mod channel;
mod error;
mod registry;

pub use channel::{display_name, Channel, ChannelConfig, ChannelDescriptor};
pub use error::ChannelError;
pub use registry::ChannelRegistry;

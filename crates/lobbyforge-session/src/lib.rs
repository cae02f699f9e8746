//! Session management for Lobbyforge.
//!
//! This crate handles the connected-user side of the server:
//!
//! 1. **Sessions**: one live identity per connection ([`Session`]), with
//!    presence, stats, spectator links and a match back-reference
//! 2. **Delivery**: how packets reach that connection ([`Delivery`])
//! 3. **Directory**: every session by id, token and name
//!    ([`SessionDirectory`]), including tournament sub-sessions
//!
//! # How it fits in the stack
//!
//! ```text
//! Channel / Match layers (above)  ← address sessions, queue packets
//!     ↕
//! Session layer (this crate)      ← identity, state and delivery
//!     ↕
//! Protocol layer (below)          ← packet builders, ids, records
//! ```

mod delivery;
mod directory;
mod error;
mod session;

pub use delivery::Delivery;
pub use directory::{Lookup, SessionDirectory};
pub use error::SessionError;
pub use session::{
    generate_token, safe_name, unix_now, Session, SessionState, StatsSnapshot, UserIdentity,
};

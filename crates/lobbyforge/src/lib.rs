//! # Lobbyforge
//!
//! Session, chat and multiplayer lobby engine for a game presence server.
//!
//! The [`Engine`] owns the session directory, the channel registry and the
//! match registry and wires them together. A transport (HTTP polling, a
//! websocket, a line-based chat gateway) authenticates a user, calls
//! [`Engine::connect`], then feeds raw client batches to
//! [`Engine::handle_batch`] and drains the session's queue.
//!
//! ```text
//! Transport (not part of this crate)
//!     ↕  connect / handle_batch / dequeue
//! Engine (this crate)            ← login, routing, chat, spectating, admin
//!     ↕
//! lobbyforge-match               ← multiplayer matches and their lifecycle
//!     ↕
//! lobbyforge-channel             ← chat channels and membership
//!     ↕
//! lobbyforge-session             ← sessions, queues and the directory
//!     ↕
//! lobbyforge-protocol            ← bytes in, bytes out
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lobbyforge::prelude::*;
//!
//! let engine = Engine::builder().config(EngineConfig::default()).build();
//! let login = engine.connect(
//!     UserIdentity::new(UserId(1000), "Alice", Privileges::NORMAL),
//!     Delivery::polled(),
//! );
//! let frames = login.session().dequeue();
//! # let _ = frames;
//! ```

mod admin;
mod config;
mod engine;
mod error;
mod handler;
mod messaging;
mod snapshot;
mod spectate;
mod sweep;
pub mod telemetry;

pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder, Login, LoginProfile};
pub use error::EngineError;
pub use snapshot::SessionSnapshot;
pub use sweep::spawn_timeout_sweep;

pub use lobbyforge_channel as channel;
pub use lobbyforge_match as matches;
pub use lobbyforge_protocol as protocol;
pub use lobbyforge_session as session;

/// The types most embedders need.
pub mod prelude {
    pub use crate::{
        spawn_timeout_sweep, Engine, EngineBuilder, EngineConfig, EngineError, Login,
        LoginProfile, SessionSnapshot,
    };
    pub use lobbyforge_channel::{ChannelConfig, ChannelDescriptor};
    pub use lobbyforge_match::{MatchEventSink, MatchSnapshot};
    pub use lobbyforge_protocol::{MatchId, Privileges, UserId};
    pub use lobbyforge_session::{Delivery, Session, StatsSnapshot, UserIdentity};
}

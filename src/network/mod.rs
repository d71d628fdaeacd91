//! Network Layer
//!
//! WebSocket edge of the engine. This layer is **non-deterministic** — all
//! round and bet logic runs through `game/`, serialized behind one lock.

pub mod broadcast;
pub mod protocol;
pub mod server;

pub use broadcast::{FeedItem, ObserverFeed, ObserverHub};
pub use protocol::{BetRequest, ClientMessage, ErrorCode, ErrorReply, ServerMessage};
pub use server::{CrashServer, ServerConfig, ServerError};

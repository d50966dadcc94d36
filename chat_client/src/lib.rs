//! Streaming client for spirit chat.
//!
//! [`ChatSession`] sends a message, consumes the `data: <json>\n\n` reply
//! stream as it arrives and resynchronizes with the server afterwards. The
//! text streamed during a turn is provisional; the conversation fetched once
//! the turn ends is authoritative.

pub mod api;
pub mod cache;
pub mod consumer;
pub mod error;
pub mod player;
pub mod session;

pub use api::ChatClient;
pub use cache::ConversationCache;
pub use consumer::{consume, TurnOutcome, TurnReport};
pub use error::ClientError;
pub use player::{AudioClip, AudioPlayer, DirectoryPlayer, NullPlayer};
pub use session::ChatSession;

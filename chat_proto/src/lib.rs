//! Wire types shared by the spirit chat server and its streaming clients.
//!
//! A chat turn is answered with a single long-lived HTTP body made of
//! `data: <json>\n\n` blocks. Each block carries one [`StreamEvent`]; the
//! [`frame`] module writes and reads that framing.

pub mod event;
pub mod frame;
pub mod model;

pub use event::{decode_audio_payload, AudioEncoding, StreamEvent};
pub use frame::{encode_frame, BlockBuffer, FrameDecoder};
pub use model::{
    Conversation, ConversationWithMessages, CreateConversationRequest, ErrorBody, Message, Role,
    SendMessageRequest, Session, SessionUpdate,
};

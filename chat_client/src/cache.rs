use std::collections::HashMap;

use chat_proto::{Message, Role};
use chrono::Utc;

/// Client-side view of conversations, keyed by conversation id.
///
/// Entries are provisional: a turn inserts the user's message optimistically
/// and the cache is replaced from the server once the turn ends.
#[derive(Debug)]
pub struct ConversationCache {
    entries: HashMap<i64, Vec<Message>>,
    next_provisional_id: i64,
}

impl Default for ConversationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_provisional_id: -1,
        }
    }

    /// Append a message that the server has not confirmed yet.
    ///
    /// Returns its provisional id, which is always negative.
    pub fn insert_optimistic(&mut self, conversation_id: i64, role: Role, content: &str) -> i64 {
        let id = self.next_provisional_id;
        self.next_provisional_id -= 1;
        self.entries
            .entry(conversation_id)
            .or_default()
            .push(Message {
                id,
                role,
                content: content.to_string(),
                created_at: Utc::now(),
            });
        id
    }

    pub fn replace(&mut self, conversation_id: i64, messages: Vec<Message>) {
        self.entries.insert(conversation_id, messages);
    }

    pub fn invalidate(&mut self, conversation_id: i64) {
        self.entries.remove(&conversation_id);
    }

    pub fn get(&self, conversation_id: i64) -> Option<&[Message]> {
        self.entries.get(&conversation_id).map(Vec::as_slice)
    }
}

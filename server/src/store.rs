//! Persistence collaborator for sessions, conversations and messages.
//!
//! Handlers only see the [`Storage`] trait. [`MemoryStore`] keeps
//! everything in process memory and backs the default binary and the tests.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chat_proto::{Conversation, ConversationWithMessages, Message, Role, Session, SessionUpdate};
use chrono::Utc;
use tokio::sync::RwLock;

/// Partial update of a session; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub question1: Option<String>,
    pub question2: Option<String>,
    pub question3: Option<String>,
    pub question4: Option<String>,
    pub spirit_name: Option<String>,
    pub spirit_traits: Option<String>,
    pub conversation_id: Option<i64>,
    pub is_complete: Option<bool>,
}

impl From<SessionUpdate> for SessionPatch {
    fn from(update: SessionUpdate) -> Self {
        Self {
            question1: update.question1,
            question2: update.question2,
            question3: update.question3,
            question4: update.question4,
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_session(&self) -> Result<Session>;
    async fn get_session(&self, id: i64) -> Result<Option<Session>>;
    async fn update_session(&self, id: i64, patch: SessionPatch) -> Result<Option<Session>>;

    async fn create_conversation(&self, title: &str) -> Result<Conversation>;
    /// Non-deleted conversations, newest first.
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;
    /// `None` for unknown and for deleted conversations.
    async fn get_conversation(&self, id: i64) -> Result<Option<ConversationWithMessages>>;
    /// Returns false if the conversation did not exist or was already deleted.
    async fn delete_conversation(&self, id: i64) -> Result<bool>;
    /// Append to a live conversation; `None` if it is unknown or deleted.
    async fn append_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
    ) -> Result<Option<Message>>;
}

struct StoredConversation {
    conversation: Conversation,
    messages: Vec<Message>,
    deleted: bool,
}

#[derive(Default)]
struct Tables {
    sessions: HashMap<i64, Session>,
    conversations: HashMap<i64, StoredConversation>,
    last_session_id: i64,
    last_conversation_id: i64,
    last_message_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn create_session(&self) -> Result<Session> {
        let mut tables = self.tables.write().await;
        tables.last_session_id += 1;
        let session = Session {
            id: tables.last_session_id,
            ..Default::default()
        };
        tables.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: i64) -> Result<Option<Session>> {
        Ok(self.tables.read().await.sessions.get(&id).cloned())
    }

    async fn update_session(&self, id: i64, patch: SessionPatch) -> Result<Option<Session>> {
        let mut tables = self.tables.write().await;
        let Some(session) = tables.sessions.get_mut(&id) else {
            return Ok(None);
        };

        fn apply<T>(field: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *field = value;
            }
        }
        apply(&mut session.question1, patch.question1);
        apply(&mut session.question2, patch.question2);
        apply(&mut session.question3, patch.question3);
        apply(&mut session.question4, patch.question4);
        apply(&mut session.spirit_name, patch.spirit_name);
        apply(&mut session.spirit_traits, patch.spirit_traits);
        apply(&mut session.conversation_id, patch.conversation_id);
        if let Some(done) = patch.is_complete {
            session.is_complete = done;
        }
        Ok(Some(session.clone()))
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation> {
        let mut tables = self.tables.write().await;
        tables.last_conversation_id += 1;
        let conversation = Conversation {
            id: tables.last_conversation_id,
            title: title.to_string(),
            created_at: Utc::now(),
        };
        tables.conversations.insert(
            conversation.id,
            StoredConversation {
                conversation: conversation.clone(),
                messages: Vec::new(),
                deleted: false,
            },
        );
        Ok(conversation)
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let tables = self.tables.read().await;
        let mut list: Vec<Conversation> = tables
            .conversations
            .values()
            .filter(|c| !c.deleted)
            .map(|c| c.conversation.clone())
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(list)
    }

    async fn get_conversation(&self, id: i64) -> Result<Option<ConversationWithMessages>> {
        let tables = self.tables.read().await;
        Ok(tables
            .conversations
            .get(&id)
            .filter(|c| !c.deleted)
            .map(|c| ConversationWithMessages {
                conversation: c.conversation.clone(),
                messages: c.messages.clone(),
            }))
    }

    async fn delete_conversation(&self, id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.conversations.get_mut(&id) {
            Some(c) if !c.deleted => {
                c.deleted = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
    ) -> Result<Option<Message>> {
        let mut tables = self.tables.write().await;
        let id = tables.last_message_id + 1;
        let Some(stored) = tables
            .conversations
            .get_mut(&conversation_id)
            .filter(|c| !c.deleted)
        else {
            return Ok(None);
        };

        let message = Message {
            id,
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        stored.messages.push(message.clone());
        tables.last_message_id = id;
        Ok(Some(message))
    }
}

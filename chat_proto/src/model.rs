//! JSON bodies of the REST endpoints around the chat stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Hidden persona instruction; never rendered.
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationWithMessages {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

impl ConversationWithMessages {
    /// Messages a user sees, i.e. everything but the system persona prompt.
    pub fn visible_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role != Role::System)
    }
}

/// A questionnaire run. Answers arrive one by one; generating the spirit
/// fills the remaining fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: i64,
    pub question1: Option<String>,
    pub question2: Option<String>,
    pub question3: Option<String>,
    pub question4: Option<String>,
    pub spirit_name: Option<String>,
    pub spirit_traits: Option<String>,
    pub conversation_id: Option<i64>,
    pub is_complete: bool,
}

impl Session {
    /// All four answers, if every one is present and non-blank.
    pub fn answers(&self) -> Option<[&str; 4]> {
        fn answer(a: &Option<String>) -> Option<&str> {
            a.as_deref().filter(|s| !s.trim().is_empty())
        }
        Some([
            answer(&self.question1)?,
            answer(&self.question2)?,
            answer(&self.question3)?,
            answer(&self.question4)?,
        ])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question3: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question4: Option<String>,
}

impl SessionUpdate {
    pub fn answers(&self) -> [Option<&str>; 4] {
        [
            self.question1.as_deref(),
            self.question2.as_deref(),
            self.question3.as_deref(),
            self.question4.as_deref(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub title: Option<String>,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: u16,
}

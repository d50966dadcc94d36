use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use chat_proto::{
    ConversationWithMessages, ErrorBody, SendMessageRequest, Session, SessionUpdate,
};
use futures::Stream;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ClientError;

/// Raw body of a streamed turn.
pub type TurnBody = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// HTTP client for the spirit chat API.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        // No overall timeout: a turn's body stays open while the reply is generated.
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    pub async fn create_session(&self) -> Result<Session, ClientError> {
        let response = self.http.post(self.url("sessions")).send().await?;
        read_json(response).await
    }

    pub async fn get_session(&self, id: i64) -> Result<Session, ClientError> {
        let response = self.http.get(self.url(&format!("sessions/{id}"))).send().await?;
        read_json(response).await
    }

    pub async fn update_session(
        &self,
        id: i64,
        update: &SessionUpdate,
    ) -> Result<Session, ClientError> {
        let response = self
            .http
            .patch(self.url(&format!("sessions/{id}")))
            .json(update)
            .send()
            .await?;
        read_json(response).await
    }

    /// Ask the server to summon the spirit for a session with all four answers.
    pub async fn generate_spirit(&self, id: i64) -> Result<Session, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("sessions/{id}/generate")))
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn get_conversation(&self, id: i64) -> Result<ConversationWithMessages, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("conversations/{id}")))
            .send()
            .await?;
        read_json(response).await
    }

    /// Start a turn. A rejected request (bad input, unknown conversation)
    /// fails here, before any event is read.
    pub async fn open_turn(&self, conversation_id: i64, content: &str) -> Result<TurnBody, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("conversations/{conversation_id}/messages")))
            .json(&SendMessageRequest {
                content: content.to_string(),
            })
            .send()
            .await?;
        let response = ensure_success(response).await?;
        debug!("Turn opened on conversation {conversation_id}");
        Ok(Box::pin(response.bytes_stream()))
    }
}

async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    let message = match serde_json::from_slice::<ErrorBody>(&body) {
        Ok(error) => error.error,
        Err(_) => String::from_utf8_lossy(&body).into_owned(),
    };
    Err(ClientError::Rejected {
        status: status.as_u16(),
        message,
    })
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let body = ensure_success(response).await?.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))
}

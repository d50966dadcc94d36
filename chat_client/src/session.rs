use std::sync::Arc;
use std::time::Duration;

use chat_proto::{Message, Role};
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::{ChatClient, TurnBody};
use crate::cache::ConversationCache;
use crate::consumer::{consume, TurnReport};
use crate::error::ClientError;
use crate::player::AudioPlayer;

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// One conversation as seen by a client.
///
/// `send` takes `&mut self`, so a session runs one turn at a time.
pub struct ChatSession {
    client: ChatClient,
    conversation_id: i64,
    cache: ConversationCache,
    display: watch::Sender<String>,
    player: Arc<dyn AudioPlayer>,
    drain_timeout: Duration,
}

impl ChatSession {
    /// Load the conversation and start with its persisted messages.
    pub async fn open(
        client: ChatClient,
        conversation_id: i64,
        player: Arc<dyn AudioPlayer>,
    ) -> Result<Self, ClientError> {
        let (display, _) = watch::channel(String::new());
        let mut session = Self {
            client,
            conversation_id,
            cache: ConversationCache::new(),
            display,
            player,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        };
        session.resync().await?;
        Ok(session)
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn conversation_id(&self) -> i64 {
        self.conversation_id
    }

    /// The reply being streamed, republished in full after every delta.
    ///
    /// After a turn it holds the persisted assistant reply, or is empty if
    /// the turn produced none.
    pub fn display(&self) -> watch::Receiver<String> {
        self.display.subscribe()
    }

    /// Cached messages without system prompts. Negative ids are unconfirmed.
    pub fn messages(&self) -> Vec<&Message> {
        self.cache
            .get(self.conversation_id)
            .unwrap_or_default()
            .iter()
            .filter(|m| m.role != Role::System)
            .collect()
    }

    /// Send one user message and stream the reply.
    ///
    /// Whatever happens to the stream, the cached conversation is refetched
    /// afterwards. A turn that fails mid-stream is reported in
    /// [`TurnReport::outcome`]; `Err` means the turn was rejected. If only the
    /// refetch fails, the report is still returned and the cache keeps the
    /// optimistic message until the next successful [`resync`](Self::resync).
    pub async fn send(&mut self, content: &str) -> Result<TurnReport, ClientError> {
        self.cache
            .insert_optimistic(self.conversation_id, Role::User, content);
        self.display.send_replace(String::new());

        let mut body = match self.client.open_turn(self.conversation_id, content).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Turn rejected on conversation {}: {e}", self.conversation_id);
                if let Err(resync_error) = self.resync().await {
                    warn!("Resync after rejected turn failed: {resync_error}");
                }
                return Err(e);
            }
        };

        let report = consume(&mut body, &self.display, Arc::clone(&self.player)).await;
        if report.is_completed() {
            self.drain(&mut body).await;
            info!(
                "Turn completed on conversation {}: {} chars, {} audio clips",
                self.conversation_id,
                report.response.chars().count(),
                report.audio_clips
            );
        } else {
            warn!(
                "Turn failed on conversation {}: {:?}",
                self.conversation_id, report.outcome
            );
        }
        drop(body);

        if let Err(e) = self.resync().await {
            warn!(
                "Resync after turn on conversation {} failed: {e}",
                self.conversation_id
            );
        }
        Ok(report)
    }

    /// Read the body to its end so the server has stored the reply before we refetch.
    async fn drain(&self, body: &mut TurnBody) {
        let drained = tokio::time::timeout(self.drain_timeout, async {
            while let Some(chunk) = body.next().await {
                if chunk.is_err() {
                    break;
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                "Stream did not close within {:?} after done",
                self.drain_timeout
            );
        }
    }

    /// Replace the cached conversation with the server's copy.
    ///
    /// On failure the cache is left as it was, unless the server reports the
    /// conversation gone.
    pub async fn resync(&mut self) -> Result<(), ClientError> {
        let conversation = match self.client.get_conversation(self.conversation_id).await {
            Ok(conversation) => conversation,
            Err(e) => {
                if e.is_not_found() {
                    self.cache.invalidate(self.conversation_id);
                }
                return Err(e);
            }
        };
        self.cache
            .replace(self.conversation_id, conversation.messages);

        let latest = self
            .messages()
            .last()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.display.send_replace(latest);
        Ok(())
    }
}

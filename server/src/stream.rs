//! Streamed chat turns.
//!
//! `POST /api/conversations/{id}/messages` answers with a body of
//! `data: <json>\n\n` frames. A spawned turn task drives generation and
//! speech synthesis and pushes [`StreamEvent`]s into a channel; the
//! response body drains that channel.
//!
//! Ordering within one turn:
//! - text deltas go out in generation order;
//! - a span's audio goes out only after the text containing it, in span order;
//! - `done` waits for every pending synthesis, so no audio follows it;
//! - the assistant reply is stored after `done` has been handed to the
//!   transport, and the body closes only after that commit.
//!
//! A generation or synthesis failure (or the turn deadline) ends the stream
//! with an `error` event instead of `done`. A dropped response body aborts
//! the turn. Neither stores an assistant message.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chat_proto::{encode_frame, Role, SendMessageRequest, StreamEvent};
use futures_util::StreamExt;
use llm_core::ChatMessage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use tts_core::{SentenceChunker, SpeechPipeline};

use crate::error::ApiError;
use crate::validation::{validate_conversation_id, validate_utterance};
use crate::AppState;

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("turn timed out after {0} seconds")]
    Timeout(u64),

    #[error("client disconnected")]
    TransportAbort,
}

impl TurnError {
    fn upstream(e: anyhow::Error) -> Self {
        TurnError::Upstream(format!("{e:#}"))
    }
}

/// Sending half of a turn's response body.
struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl EventSink {
    async fn emit(&self, event: StreamEvent) -> Result<(), TurnError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| TurnError::TransportAbort)
    }

    /// Resolves once the response body has been dropped.
    async fn closed(&self) {
        self.tx.closed().await
    }
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Response, ApiError> {
    state.metrics.record_request();
    let conversation_id = validate_conversation_id(&id)?;
    let content = validate_utterance(&req.content)?;

    let conversation = state
        .store
        .get_conversation(conversation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;
    state
        .store
        .append_message(conversation_id, Role::User, &content)
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

    let mut history: Vec<ChatMessage> = conversation
        .messages
        .iter()
        .map(|m| ChatMessage::new(m.role, m.content.clone()))
        .collect();
    history.push(ChatMessage::user(content));

    info!(
        "Turn started: conversation={}, history={} messages",
        conversation_id,
        history.len()
    );
    state.metrics.turn_started();

    let (tx, rx) = mpsc::channel::<StreamEvent>(state.config.stream_channel_capacity);
    let (delivered_tx, delivered_rx) = oneshot::channel::<()>();
    tokio::spawn(run_turn(
        state.clone(),
        conversation_id,
        history,
        EventSink { tx },
        delivered_rx,
    ));

    let mut response = Body::from_stream(event_body(rx, delivered_tx)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    Ok(response)
}

/// Frames events until the turn task drops its sender.
///
/// Once the terminal frame has been taken by the transport (the body is
/// polled again), `delivered` fires so the turn may commit.
fn event_body(
    mut rx: mpsc::Receiver<StreamEvent>,
    delivered: oneshot::Sender<()>,
) -> impl futures_util::Stream<Item = Result<Bytes, std::io::Error>> {
    async_stream::stream! {
        let mut delivered = Some(delivered);
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            let frame = match encode_frame(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Failed to encode stream event: {e}");
                    continue;
                }
            };
            yield Ok::<Bytes, std::io::Error>(Bytes::from(frame));
            if terminal {
                if let Some(delivered) = delivered.take() {
                    let _ = delivered.send(());
                }
            }
        }
    }
}

async fn run_turn(
    state: AppState,
    conversation_id: i64,
    history: Vec<ChatMessage>,
    sink: EventSink,
    delivered: oneshot::Receiver<()>,
) {
    let started = Instant::now();
    let deadline = state.config.turn_timeout();

    let generated = match tokio::time::timeout(deadline, produce_reply(&state, &history, &sink)).await
    {
        Ok(result) => result,
        Err(_) => Err(TurnError::Timeout(deadline.as_secs())),
    };

    let reply = match generated {
        Ok(reply) => reply,
        Err(TurnError::TransportAbort) => {
            warn!("Turn aborted: conversation={conversation_id}, client disconnected");
            state.metrics.turn_aborted();
            return;
        }
        Err(e) => {
            error!("Turn failed: conversation={conversation_id}: {e}");
            state.metrics.turn_failed();
            // A stalled reader may have filled the channel; the stream then
            // ends without a terminal event, which clients also treat as failure.
            let _ = sink.tx.try_send(StreamEvent::error(e.to_string()));
            return;
        }
    };

    let delivery = async {
        sink.emit(StreamEvent::Done).await?;
        delivered.await.map_err(|_| TurnError::TransportAbort)
    };
    match tokio::time::timeout(state.config.request_timeout(), delivery).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) | Err(_) => {
            warn!("Turn aborted before done was delivered: conversation={conversation_id}");
            state.metrics.turn_aborted();
            return;
        }
    }

    match state
        .store
        .append_message(conversation_id, Role::Assistant, &reply)
        .await
    {
        Ok(Some(_)) => {
            let latency = started.elapsed();
            info!(
                "Turn completed: conversation={}, reply={} chars, {:.2}s",
                conversation_id,
                reply.chars().count(),
                latency.as_secs_f64()
            );
            state.metrics.turn_completed(latency.as_millis() as u64);
        }
        Ok(None) => {
            warn!("Conversation {conversation_id} was deleted during the turn, reply dropped");
            state.metrics.turn_failed();
        }
        Err(e) => {
            error!("Failed to store reply for conversation {conversation_id}: {e:#}");
            state.metrics.turn_failed();
        }
    }
    // `sink` drops here and the response body ends.
}

/// Stream the reply as text and audio events and return the full text.
async fn produce_reply(
    state: &AppState,
    history: &[ChatMessage],
    sink: &EventSink,
) -> Result<String, TurnError> {
    let mut deltas = state
        .llm
        .stream_chat(history)
        .await
        .map_err(TurnError::upstream)?;

    let mut speech = match state.tts.as_ref() {
        Some(tts) => SpeechPipeline::new(Arc::clone(tts), state.config.tts_max_in_flight),
        None => SpeechPipeline::disabled(),
    };
    let mut chunker = SentenceChunker::default();
    let mut reply = String::new();

    loop {
        tokio::select! {
            biased;

            _ = sink.closed() => return Err(TurnError::TransportAbort),

            Some(audio) = speech.next_ready(), if speech.has_pending() => {
                let audio = audio.map_err(TurnError::upstream)?;
                sink.emit(StreamEvent::audio(&audio.bytes, audio.encoding)).await?;
                state.metrics.audio_clip();
            }

            delta = deltas.next() => match delta {
                Some(Ok(delta)) => {
                    reply.push_str(&delta);
                    sink.emit(StreamEvent::text(delta.as_str())).await?;
                    if speech.is_enabled() {
                        for span in chunker.push(&delta) {
                            speech.submit(&span);
                        }
                    }
                }
                Some(Err(e)) => return Err(TurnError::upstream(e)),
                None => break,
            },
        }
    }

    if let Some(tail) = chunker.finish() {
        speech.submit(&tail);
    }
    while let Some(audio) = speech.next_ready().await {
        let audio = audio.map_err(TurnError::upstream)?;
        sink.emit(StreamEvent::audio(&audio.bytes, audio.encoding)).await?;
        state.metrics.audio_clip();
    }

    if reply.trim().is_empty() {
        return Err(TurnError::Upstream("completion returned an empty reply".to_string()));
    }
    debug!("Reply generated: {} chars", reply.chars().count());
    Ok(reply)
}

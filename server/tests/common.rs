//! Common utilities for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body, Bytes},
    http::{Request, StatusCode},
    Router,
};
use chat_proto::{AudioEncoding, FrameDecoder, StreamEvent};
use llm_core::{ChatMessage, CompletionService, DeltaStream};
use server::{build_router, config::ServerConfig, store::MemoryStore, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;
use tts_core::{SpeechSynthesizer, SynthesizedAudio};

/// Completion service that replays a fixed script.
pub struct ScriptedLlm {
    pub deltas: Vec<String>,
    /// Raise an error after the deltas instead of ending cleanly.
    pub fail_after: bool,
    pub delay: Duration,
    pub spirit: Value,
}

impl ScriptedLlm {
    pub fn replying(deltas: &[&str]) -> Self {
        Self {
            deltas: deltas.iter().map(|d| d.to_string()).collect(),
            fail_after: false,
            delay: Duration::ZERO,
            spirit: json!({
                "name": "Breath of Dawn",
                "traits": "quiet, attentive",
                "systemPrompt": "You are Breath of Dawn.",
                "openingLine": "The loneliness of dawn, you said?"
            }),
        }
    }

    pub fn failing_after(deltas: &[&str]) -> Self {
        Self {
            fail_after: true,
            ..Self::replying(deltas)
        }
    }

    pub fn slow(deltas: &[&str], delay: Duration) -> Self {
        Self {
            delay,
            ..Self::replying(deltas)
        }
    }
}

#[async_trait]
impl CompletionService for ScriptedLlm {
    async fn stream_chat(&self, _messages: &[ChatMessage]) -> Result<DeltaStream> {
        let deltas = self.deltas.clone();
        let fail_after = self.fail_after;
        let delay = self.delay;
        Ok(Box::pin(async_stream::stream! {
            for delta in deltas {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(delta);
            }
            if fail_after {
                yield Err(anyhow::anyhow!("model connection reset"));
            }
        }))
    }

    async fn complete_json(&self, _messages: &[ChatMessage]) -> Result<Value> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.spirit.clone())
    }
}

/// Synthesizer whose "audio" is the span text itself, so tests can read it back.
pub struct EchoSpeech {
    /// Spans containing this marker fail.
    pub fail_on: Option<String>,
}

#[async_trait]
impl SpeechSynthesizer for EchoSpeech {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        if let Some(marker) = &self.fail_on {
            if text.contains(marker.as_str()) {
                bail!("voice service returned 503");
            }
        }
        Ok(SynthesizedAudio {
            bytes: text.as_bytes().to_vec(),
            encoding: AudioEncoding::Wav,
        })
    }
}

pub fn test_state(
    llm: ScriptedLlm,
    tts: Option<Arc<dyn SpeechSynthesizer>>,
) -> AppState {
    let config = ServerConfig {
        rate_limit_per_minute: 600,
        request_timeout_secs: 10,
        turn_timeout_secs: 10,
        ..Default::default()
    };
    AppState::new(Arc::new(MemoryStore::new()), Arc::new(llm), tts, config)
}

pub fn echo_speech() -> Option<Arc<dyn SpeechSynthesizer>> {
    Some(Arc::new(EchoSpeech { fail_on: None }))
}

/// Create a test app instance
pub fn create_test_app(state: &AppState) -> Router {
    build_router(state.clone()).expect("router builds")
}

pub async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Bytes) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body)
}

pub fn json_body(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap()
}

pub fn decode_events(body: &Bytes) -> Vec<StreamEvent> {
    let mut decoder = FrameDecoder::new();
    let mut events = decoder.push(body);
    events.extend(decoder.finish());
    events
}

pub async fn create_conversation(app: &Router) -> i64 {
    let (status, body) = call(app, "POST", "/api/conversations", Some(json!({ "title": "t" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    json_body(&body)["id"].as_i64().unwrap()
}

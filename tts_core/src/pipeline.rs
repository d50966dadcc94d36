use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::task::JoinHandle;

use crate::{clean_text_for_speech, SpeechSynthesizer, SynthesizedAudio};

/// Synthesizes spans concurrently and yields their audio in submission order.
///
/// At most `max_in_flight` requests run at once; the rest wait in a queue.
/// Dropping the pipeline aborts everything still running.
pub struct SpeechPipeline {
    synth: Option<Arc<dyn SpeechSynthesizer>>,
    queued: VecDeque<String>,
    running: VecDeque<JoinHandle<Result<SynthesizedAudio>>>,
    max_in_flight: usize,
}

impl SpeechPipeline {
    pub fn new(synth: Arc<dyn SpeechSynthesizer>, max_in_flight: usize) -> Self {
        Self {
            synth: Some(synth),
            queued: VecDeque::new(),
            running: VecDeque::new(),
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// A pipeline that accepts spans and never produces audio.
    pub fn disabled() -> Self {
        Self {
            synth: None,
            queued: VecDeque::new(),
            running: VecDeque::new(),
            max_in_flight: 1,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.synth.is_some()
    }

    /// Queue a span. Returns false when it was skipped (speech disabled or
    /// nothing speakable after cleanup).
    pub fn submit(&mut self, span: &str) -> bool {
        if self.synth.is_none() {
            return false;
        }
        let spoken = clean_text_for_speech(span);
        if spoken.is_empty() {
            return false;
        }
        self.queued.push_back(spoken);
        self.fill();
        true
    }

    pub fn has_pending(&self) -> bool {
        !self.running.is_empty() || !self.queued.is_empty()
    }

    /// Wait for the oldest span's audio. `None` once nothing is pending.
    ///
    /// Cancel safe: an unfinished request stays at the head of the queue.
    pub async fn next_ready(&mut self) -> Option<Result<SynthesizedAudio>> {
        self.fill();
        let handle = self.running.front_mut()?;
        let joined = handle.await;
        self.running.pop_front();
        self.fill();
        Some(joined.unwrap_or_else(|e| Err(anyhow!("synthesis task failed: {e}"))))
    }

    fn fill(&mut self) {
        let Some(synth) = self.synth.as_ref() else {
            return;
        };
        while self.running.len() < self.max_in_flight {
            let Some(text) = self.queued.pop_front() else {
                break;
            };
            let synth = Arc::clone(synth);
            self.running
                .push_back(tokio::spawn(async move { synth.synthesize(&text).await }));
        }
    }
}

impl Drop for SpeechPipeline {
    fn drop(&mut self) {
        for handle in &self.running {
            handle.abort();
        }
    }
}

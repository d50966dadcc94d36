//! Speech synthesis for streamed replies.
//!
//! Replies are cut into sentence or paragraph spans by [`SentenceChunker`],
//! cleaned of markdown by [`clean_text_for_speech`] and sent through a
//! [`SpeechSynthesizer`]. [`SpeechPipeline`] runs those requests
//! concurrently while handing results back in span order.

mod cache;
mod chunker;
mod clean;
mod pipeline;
mod settings;
mod speech;
mod wav;

use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chat_proto::AudioEncoding;

pub use cache::CachedSynthesizer;
pub use chunker::SentenceChunker;
pub use clean::clean_text_for_speech;
pub use pipeline::SpeechPipeline;
pub use settings::TtsSettings;
pub use speech::OpenAiSpeechClient;
pub use wav::{pcm16_duration_ms, pcm16_to_wav};

/// Encoded audio for one span of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub encoding: AudioEncoding,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio>;
}

/// Build the vendor client described by `settings`, behind the LRU cache
/// unless `cache_size` is 0.
pub fn synthesizer_from_settings(settings: TtsSettings) -> Result<Arc<dyn SpeechSynthesizer>> {
    let cache_size = settings.cache_size;
    let client: Arc<dyn SpeechSynthesizer> = Arc::new(OpenAiSpeechClient::new(settings)?);
    Ok(match NonZeroUsize::new(cache_size) {
        Some(capacity) => Arc::new(CachedSynthesizer::new(client, capacity)),
        None => client,
    })
}

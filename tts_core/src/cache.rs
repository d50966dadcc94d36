use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use lru::LruCache;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{SpeechSynthesizer, SynthesizedAudio};

/// LRU cache in front of a synthesizer, keyed by a SHA-256 of the span text.
pub struct CachedSynthesizer {
    inner: Arc<dyn SpeechSynthesizer>,
    cache: Mutex<LruCache<String, SynthesizedAudio>>,
}

impl CachedSynthesizer {
    pub fn new(inner: Arc<dyn SpeechSynthesizer>, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn key(text: &str) -> String {
        hex::encode(Sha256::digest(text.as_bytes()))
    }

    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }
}

#[async_trait]
impl SpeechSynthesizer for CachedSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        let key = Self::key(text);
        if let Some(hit) = self.cache.lock().await.get(&key) {
            debug!("Speech cache hit");
            return Ok(hit.clone());
        }

        // Lock is not held across the vendor call.
        let audio = self.inner.synthesize(text).await?;
        self.cache.lock().await.put(key, audio.clone());
        Ok(audio)
    }
}

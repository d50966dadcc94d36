use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chat_proto::AudioEncoding;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::{pcm16_duration_ms, pcm16_to_wav, SpeechSynthesizer, SynthesizedAudio, TtsSettings};

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

/// Client for an OpenAI-compatible `/audio/speech` endpoint.
pub struct OpenAiSpeechClient {
    http: Client,
    settings: TtsSettings,
}

impl OpenAiSpeechClient {
    pub fn new(settings: TtsSettings) -> Result<Self> {
        if settings.format == AudioEncoding::Pcm16 {
            bail!("raw PCM is not offered to clients, use wav or mp3");
        }
        let http = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, settings })
    }

    fn wire_format(&self) -> &'static str {
        match self.settings.format {
            AudioEncoding::Mp3 => "mp3",
            AudioEncoding::Wav | AudioEncoding::Pcm16 => "pcm",
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeechClient {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        let url = format!("{}/audio/speech", self.settings.base_url.trim_end_matches('/'));
        let body = SpeechRequest {
            model: &self.settings.model,
            voice: &self.settings.voice,
            input: text,
            response_format: self.wire_format(),
        };

        let mut request = self.http.post(url).json(&body);
        if let Some(key) = self.settings.api_key.as_deref() {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.context("speech request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("speech service returned {status}: {body}"));
        }

        let audio = response.bytes().await.context("speech body interrupted")?;
        if audio.is_empty() {
            bail!("speech service returned no audio");
        }

        let synthesized = match self.settings.format {
            AudioEncoding::Mp3 => SynthesizedAudio {
                bytes: audio.to_vec(),
                encoding: AudioEncoding::Mp3,
            },
            AudioEncoding::Wav | AudioEncoding::Pcm16 => {
                debug!(
                    "Synthesized {} ms of speech for {} chars",
                    pcm16_duration_ms(audio.len(), self.settings.sample_rate),
                    text.chars().count()
                );
                SynthesizedAudio {
                    bytes: pcm16_to_wav(&audio, self.settings.sample_rate)?,
                    encoding: AudioEncoding::Wav,
                }
            }
        };
        Ok(synthesized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(server: &MockServer, format: AudioEncoding) -> TtsSettings {
        TtsSettings {
            base_url: server.uri(),
            api_key: Some("tts-key".into()),
            format,
            ..TtsSettings::default()
        }
    }

    #[tokio::test]
    async fn wraps_pcm_in_wav() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/speech"))
            .and(header("authorization", "Bearer tts-key"))
            .and(body_partial_json(json!({ "input": "Hello there.", "response_format": "pcm" })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 0, 2, 0]))
            .mount(&server)
            .await;

        let client = OpenAiSpeechClient::new(settings_for(&server, AudioEncoding::Wav)).unwrap();
        let audio = client.synthesize("Hello there.").await.unwrap();
        assert_eq!(audio.encoding, AudioEncoding::Wav);
        assert_eq!(&audio.bytes[0..4], b"RIFF");
        assert_eq!(audio.bytes.len(), 48);
    }

    #[tokio::test]
    async fn passes_mp3_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/speech"))
            .and(body_partial_json(json!({ "response_format": "mp3" })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3fake".to_vec()))
            .mount(&server)
            .await;

        let client = OpenAiSpeechClient::new(settings_for(&server, AudioEncoding::Mp3)).unwrap();
        let audio = client.synthesize("Hi.").await.unwrap();
        assert_eq!(audio.encoding, AudioEncoding::Mp3);
        assert_eq!(audio.bytes, b"ID3fake");
    }

    #[tokio::test]
    async fn surfaces_vendor_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/speech"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = OpenAiSpeechClient::new(settings_for(&server, AudioEncoding::Wav)).unwrap();
        let err = client.synthesize("Hi.").await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

/// Container format of an audio payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    /// 16-bit PCM in a RIFF/WAVE container.
    Wav,
    Mp3,
    /// Raw little-endian 16-bit mono PCM, no header.
    Pcm16,
}

impl AudioEncoding {
    pub fn extension(self) -> &'static str {
        match self {
            AudioEncoding::Wav => "wav",
            AudioEncoding::Mp3 => "mp3",
            AudioEncoding::Pcm16 => "pcm",
        }
    }
}

/// One event of a streamed chat turn, tagged on the `kind` field.
///
/// A stream carries zero or more `text` and `audio` events followed by
/// exactly one terminal event (`done` or `error`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Incremental fragment of the assistant reply.
    Text { delta: String },
    /// Synthesized speech for a span of already-emitted text. `payload` is base64.
    Audio {
        payload: String,
        encoding: AudioEncoding,
    },
    Done,
    /// The turn failed; nothing was committed for the assistant.
    Error { message: String },
}

impl StreamEvent {
    pub fn text(delta: impl Into<String>) -> Self {
        StreamEvent::Text {
            delta: delta.into(),
        }
    }

    /// Build an audio event from raw bytes, base64-encoding them for the wire.
    pub fn audio(bytes: &[u8], encoding: AudioEncoding) -> Self {
        StreamEvent::Audio {
            payload: general_purpose::STANDARD.encode(bytes),
            encoding,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
        }
    }

    /// Returns true for the events that close a stream (`done` and `error`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error { .. })
    }
}

/// Decode the base64 payload of an audio event.
pub fn decode_audio_payload(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    general_purpose::STANDARD.decode(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_kind_tag() {
        let text = serde_json::to_string(&StreamEvent::text("hi ")).unwrap();
        assert_eq!(text, r#"{"kind":"text","delta":"hi "}"#);

        let done = serde_json::to_string(&StreamEvent::Done).unwrap();
        assert_eq!(done, r#"{"kind":"done"}"#);
    }

    #[test]
    fn audio_payload_is_base64() {
        let event = StreamEvent::audio(b"RIFF", AudioEncoding::Wav);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "audio");
        assert_eq!(json["encoding"], "wav");
        let payload = json["payload"].as_str().unwrap();
        assert_eq!(decode_audio_payload(payload).unwrap(), b"RIFF");
    }

    #[test]
    fn terminal_events() {
        assert!(StreamEvent::Done.is_terminal());
        assert!(StreamEvent::error("boom").is_terminal());
        assert!(!StreamEvent::text("x").is_terminal());
    }
}

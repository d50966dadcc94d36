use std::time::Duration;

use chat_proto::AudioEncoding;

/// Sample rate of the raw PCM the speech endpoint returns.
pub const PCM_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Clone)]
pub struct TtsSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
    /// `Wav` requests raw PCM and packages it; `Mp3` is passed through.
    pub format: AudioEncoding,
    pub sample_rate: u32,
    /// Entries of the LRU synthesis cache, 0 disables it.
    pub cache_size: usize,
    pub request_timeout: Duration,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            format: AudioEncoding::Wav,
            sample_rate: PCM_SAMPLE_RATE,
            cache_size: 128,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl TtsSettings {
    /// Read settings from the environment. Returns `None` when speech is off:
    /// either `TTS_ENABLED=false`, or no flag and no API key.
    pub fn from_env() -> Option<Self> {
        let defaults = Self::default();
        let api_key = std::env::var("TTS_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty());

        let enabled = std::env::var("TTS_ENABLED")
            .ok()
            .and_then(|v| parse_flag(&v))
            .unwrap_or(api_key.is_some());
        if !enabled {
            return None;
        }

        let format = match std::env::var("TTS_FORMAT").ok().as_deref().map(str::trim) {
            Some("mp3") => AudioEncoding::Mp3,
            _ => AudioEncoding::Wav,
        };

        Some(Self {
            base_url: env_or("TTS_BASE_URL", defaults.base_url),
            api_key,
            model: env_or("TTS_MODEL", defaults.model),
            voice: env_or("TTS_VOICE", defaults.voice),
            format,
            sample_rate: defaults.sample_rate,
            cache_size: env_parse("TTS_CACHE_SIZE", defaults.cache_size),
            request_timeout: Duration::from_secs(env_parse("TTS_TIMEOUT_SECS", 30)),
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}

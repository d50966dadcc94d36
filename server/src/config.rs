// Configuration constants for the server

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    /// Applies until response headers are sent; streamed bodies are bounded by `turn_timeout_secs`.
    pub request_timeout_secs: u64,
    /// Upper bound on generating and voicing one reply.
    pub turn_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    /// Events buffered between a turn task and its response body.
    pub stream_channel_capacity: usize,
    pub tts_max_in_flight: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            rate_limit_per_minute: 60,
            request_timeout_secs: 60,
            turn_timeout_secs: 120,
            cors_allowed_origins: None,
            stream_channel_capacity: 64,
            tts_max_in_flight: 2,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let rate_limit_per_minute = std::env::var("RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.rate_limit_per_minute);

        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        let turn_timeout_secs = std::env::var("TURN_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.turn_timeout_secs);

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            });

        let stream_channel_capacity = std::env::var("STREAM_CHANNEL_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.stream_channel_capacity);

        let tts_max_in_flight = std::env::var("TTS_MAX_IN_FLIGHT")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.tts_max_in_flight);

        Self {
            port,
            rate_limit_per_minute,
            request_timeout_secs,
            turn_timeout_secs,
            cors_allowed_origins,
            stream_channel_capacity,
            tts_max_in_flight,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }
}

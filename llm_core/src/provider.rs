use std::time::Duration;

/// Which OpenAI-compatible backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Ollama,
}

impl LlmProvider {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "ollama" => LlmProvider::Ollama,
            _ => LlmProvider::OpenAI,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "gpt-4o",
            LlmProvider::Ollama => "llama3",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "https://api.openai.com/v1",
            LlmProvider::Ollama => "http://localhost:11434/v1",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: String,
    pub base_url: String,
    /// Required for OpenAI, ignored by Ollama.
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub connect_timeout: Duration,
}

impl LlmSettings {
    pub fn new(provider: LlmProvider) -> Self {
        Self {
            provider,
            model: provider.default_model().to_string(),
            base_url: provider.default_base_url().to_string(),
            api_key: None,
            max_tokens: 512,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_env() -> Self {
        let provider = std::env::var("LLM_PROVIDER")
            .map(|v| LlmProvider::parse(&v))
            .unwrap_or(LlmProvider::OpenAI);
        let mut settings = Self::new(provider);

        if let Ok(model) = std::env::var("LLM_MODEL") {
            if !model.trim().is_empty() {
                settings.model = model;
            }
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            if !url.trim().is_empty() {
                settings.base_url = url;
            }
        }
        settings.api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        settings.max_tokens = std::env::var("LLM_MAX_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(settings.max_tokens);

        settings
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_names() {
        assert_eq!(LlmProvider::parse("ollama"), LlmProvider::Ollama);
        assert_eq!(LlmProvider::parse(" Ollama "), LlmProvider::Ollama);
        assert_eq!(LlmProvider::parse("openai"), LlmProvider::OpenAI);
        assert_eq!(LlmProvider::parse("anything"), LlmProvider::OpenAI);
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let settings = LlmSettings::new(LlmProvider::Ollama).with_base_url("http://h:1/v1/");
        assert_eq!(settings.endpoint("chat/completions"), "http://h:1/v1/chat/completions");
    }
}

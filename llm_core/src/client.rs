use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chat_proto::BlockBuffer;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{ChatMessage, CompletionService, DeltaStream, LlmProvider, LlmSettings};

/// Structure for the chat completions request
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// One `data:` block of a streamed completion
#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamError {
    message: String,
}

pub struct LlmClient {
    http: Client,
    settings: LlmSettings,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        if settings.provider == LlmProvider::OpenAI && settings.api_key.is_none() {
            bail!("OPENAI_API_KEY must be set for the OpenAI provider");
        }
        let http = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .context("failed to build HTTP client")?;
        info!(
            "LLM client ready: provider={:?}, model={}, base_url={}",
            settings.provider, settings.model, settings.base_url
        );
        Ok(Self { http, settings })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let request = self.http.post(self.settings.endpoint(path));
        match self.settings.api_key.as_deref() {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn request<'a>(&'a self, messages: &'a [ChatMessage], stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.settings.model,
            messages,
            max_tokens: self.settings.max_tokens,
            stream,
            response_format: None,
        }
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(anyhow!("completion service returned {status}: {body}"))
}

#[async_trait]
impl CompletionService for LlmClient {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<DeltaStream> {
        let response = self
            .post("chat/completions")
            .json(&self.request(messages, true))
            .send()
            .await
            .context("completion request failed")?;
        let mut bytes = ensure_success(response).await?.bytes_stream();

        let stream = async_stream::stream! {
            let mut blocks = BlockBuffer::new();
            let mut finished = false;

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(anyhow!("completion stream interrupted: {e}"));
                        return;
                    }
                };

                for data in blocks.push(&chunk) {
                    if data.trim() == "[DONE]" {
                        return;
                    }
                    let parsed: StreamChunk = match serde_json::from_str(&data) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            debug!("Skipping unparseable completion chunk: {e}");
                            continue;
                        }
                    };
                    if let Some(error) = parsed.error {
                        yield Err(anyhow!("completion service error: {}", error.message));
                        return;
                    }
                    for choice in parsed.choices {
                        if let Some(content) = choice.delta.content {
                            if !content.is_empty() {
                                yield Ok(content);
                            }
                        }
                        if choice.finish_reason.is_some() {
                            finished = true;
                        }
                    }
                }
            }

            if !finished {
                yield Err(anyhow!("completion stream ended before the reply was finished"));
            }
        };

        Ok(Box::pin(stream))
    }

    async fn complete_json(&self, messages: &[ChatMessage]) -> Result<serde_json::Value> {
        let mut body = self.request(messages, false);
        body.response_format = Some(ResponseFormat {
            kind: "json_object",
        });

        let response = self
            .post("chat/completions")
            .json(&body)
            .send()
            .await
            .context("completion request failed")?;
        let parsed: ChatResponse = ensure_success(response)
            .await?
            .json()
            .await
            .context("completion response is not valid JSON")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("completion returned no content"))?;
        let value: serde_json::Value =
            serde_json::from_str(&content).context("model did not answer with JSON")?;
        if !value.is_object() {
            bail!("model answered with JSON that is not an object");
        }
        Ok(value)
    }
}

//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use recipe_core::{Generator, GenerationConfig, RecipeError, Result};

use crate::prompts;
use crate::sse::{SseDecoder, SseEvent};

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request body for chat completions (OpenAI format).
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

/// Response: choices[0].message.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Default, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Streamed response chunk: choices[0].delta.
#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: AssistantMessage,
}

/// [`Generator`] backed by an OpenAI-compatible `/chat/completions` API.
pub struct ChatGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
}

impl ChatGenerator {
    /// Create a generator from explicit settings.
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecipeError::generation(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key,
            temperature: 0.1,
            max_tokens: 2048,
        })
    }

    /// Create a generator from the generation section of the config.
    ///
    /// The API key is read from the environment variable the config names;
    /// it is required.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                RecipeError::config(format!(
                    "Set the {} environment variable to use the generator",
                    config.api_key_env
                ))
            })?;

        let mut generator = Self::new(
            &config.base_url,
            config.model.clone(),
            Some(api_key),
            Duration::from_secs(config.timeout_secs),
        )?;
        generator.temperature = config.temperature;
        generator.max_tokens = config.max_tokens;

        info!("Generator ready: {} at {}", generator.model, generator.endpoint);
        Ok(generator)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Post a completion request and check the status.
    async fn send(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RecipeError::generation(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RecipeError::generation(format!(
                "LLM API error {}: {}",
                status, text
            )));
        }
        Ok(response)
    }

    /// Send messages and return the assistant's reply text.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let text = self
            .send(messages, false)
            .await?
            .text()
            .await
            .map_err(|e| RecipeError::generation(format!("Failed to read response: {}", e)))?;

        let parsed: ChatCompletionResponse = serde_json::from_str(&text).map_err(|e| {
            RecipeError::generation(format!("LLM response parse error: {}; body: {}", e, text))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RecipeError::generation("LLM response has no content"))?;

        debug!("LLM replied with {} chars", content.chars().count());
        Ok(content)
    }

    /// Send messages with `stream: true`, handing each content delta to
    /// `on_text`, and return the whole reply.
    pub async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        on_text: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String> {
        let mut response = self.send(messages, true).await?;
        let mut decoder = SseDecoder::default();
        let mut reply = String::new();

        'read: loop {
            let chunk = response
                .chunk()
                .await
                .map_err(|e| RecipeError::generation(format!("Stream interrupted: {}", e)))?;
            let finished = chunk.is_none();
            let events = match chunk {
                Some(bytes) => decoder.push(&bytes),
                None => decoder.finish().into_iter().collect(),
            };

            for event in events {
                let data = match event {
                    SseEvent::Done => break 'read,
                    SseEvent::Data(data) => data,
                };
                let parsed: ChatCompletionChunk = serde_json::from_str(&data).map_err(|e| {
                    RecipeError::generation(format!("LLM stream parse error: {}; data: {}", e, data))
                })?;
                for text in parsed.choices.into_iter().filter_map(|c| c.delta.content) {
                    on_text(&text);
                    reply.push_str(&text);
                }
            }

            if finished {
                break;
            }
        }

        if reply.is_empty() {
            return Err(RecipeError::generation("LLM stream has no content"));
        }
        debug!("LLM streamed {} chars", reply.chars().count());
        Ok(reply)
    }

    async fn ask(&self, prompt: &str) -> Result<String> {
        self.chat(&[ChatMessage::user(prompt)]).await
    }
}

#[async_trait]
impl Generator for ChatGenerator {
    async fn classify(&self, query: &str) -> Result<String> {
        self.ask(&prompts::classify(query)).await
    }

    async fn rewrite(&self, query: &str) -> Result<String> {
        self.ask(&prompts::rewrite(query)).await
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.ask(prompt).await
    }

    async fn complete_streaming(
        &self,
        prompt: &str,
        on_text: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<String> {
        self.chat_stream(&[ChatMessage::user(prompt)], on_text).await
    }
}

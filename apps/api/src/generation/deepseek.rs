//! DeepSeek backend (OpenAI-compatible chat completions).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::http::{finish, send_json};
use super::prompts::{build_customization_prompt, CUSTOMIZE_SYSTEM};
use super::{GenerationClient, GenerationResult};
use crate::models::CustomizationRequest;

const BACKEND: &str = "deepseek";
pub const DEEPSEEK_API_URL: &str = "https://api.deepseek.com/chat/completions";
const MODEL: &str = "deepseek-chat";
const MAX_TOKENS: u32 = 8192;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Clone)]
pub struct DeepSeekClient {
    http: Client,
    api_key: String,
    endpoint: String,
}

impl DeepSeekClient {
    pub fn new(http: Client, api_key: String) -> Self {
        if !api_key.starts_with("sk-") {
            warn!("DEEPSEEK_API_KEY does not look like an 'sk-' key; requests will likely be rejected");
        }
        Self {
            http,
            api_key,
            endpoint: DEEPSEEK_API_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl GenerationClient for DeepSeekClient {
    async fn generate(&self, request: &CustomizationRequest) -> GenerationResult {
        let prompt = build_customization_prompt(request);
        let body = ChatRequest {
            model: MODEL,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: CUSTOMIZE_SYSTEM,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.7,
            max_tokens: MAX_TOKENS,
            stream: false,
        };

        let response: ChatResponse = send_json(
            BACKEND,
            self.http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body),
        )
        .await?;

        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref());
        finish(BACKEND, text)
    }
}

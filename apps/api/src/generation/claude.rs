//! Anthropic Messages API backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http::{finish, send_json};
use super::prompts::{build_customization_prompt, CUSTOMIZE_SYSTEM};
use super::{GenerationClient, GenerationResult};
use crate::models::CustomizationRequest;

const BACKEND: &str = "claude";
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 8192;

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicResponse {
    /// Text of the first text block.
    fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Clone)]
pub struct ClaudeClient {
    http: Client,
    api_key: String,
    endpoint: String,
}

impl ClaudeClient {
    pub fn new(http: Client, api_key: String) -> Self {
        Self {
            http,
            api_key,
            endpoint: ANTHROPIC_API_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl GenerationClient for ClaudeClient {
    async fn generate(&self, request: &CustomizationRequest) -> GenerationResult {
        let prompt = build_customization_prompt(request);
        let body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            temperature: 0.7,
            system: CUSTOMIZE_SYSTEM,
            messages: vec![AnthropicMessage {
                role: "user",
                content: &prompt,
            }],
        };

        let response: AnthropicResponse = send_json(
            BACKEND,
            self.http
                .post(&self.endpoint)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body),
        )
        .await?;

        if let Some(usage) = &response.usage {
            debug!(
                "Claude call succeeded: input_tokens={}, output_tokens={}",
                usage.input_tokens, usage.output_tokens
            );
        }

        finish(BACKEND, response.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationError;
    use crate::testing::{sample_request, SAMPLE_LATEX};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ClaudeClient {
        ClaudeClient::new(Client::new(), "sk-ant-test".to_string())
            .with_endpoint(format!("{}/v1/messages", server.uri()))
    }

    #[tokio::test]
    async fn test_returns_first_text_block() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    {"type": "thinking", "text": null},
                    {"type": "text", "text": format!("```latex\n{SAMPLE_LATEX}\n```")}
                ],
                "usage": {"input_tokens": 10, "output_tokens": 20}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let body = client_for(&server)
            .generate(&sample_request("claude"))
            .await
            .unwrap();
        assert_eq!(body, SAMPLE_LATEX);
    }

    #[tokio::test]
    async fn test_bad_key_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "type": "error",
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .generate(&sample_request("claude"))
            .await
            .unwrap_err();
        match err {
            GenerationError::Auth(message) => assert!(message.contains("invalid x-api-key")),
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_content_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [],
                "usage": {"input_tokens": 10, "output_tokens": 0}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .generate(&sample_request("claude"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse(_)));
    }
}

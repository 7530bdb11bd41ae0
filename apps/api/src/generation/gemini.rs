//! Google Gemini `generateContent` backend. The API key travels as a query parameter.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{finish, send_json};
use super::prompts::{build_customization_prompt, CUSTOMIZE_SYSTEM};
use super::{GenerationClient, GenerationResult};
use crate::models::CustomizationRequest;

const BACKEND: &str = "gemini";
pub const GEMINI_API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";
const MAX_OUTPUT_TOKENS: u32 = 8192;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiResponse {
    fn text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .find_map(|p| p.text.as_deref())
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(http: Client, api_key: String) -> Self {
        Self {
            http,
            api_key,
            endpoint: GEMINI_API_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(&self, request: &CustomizationRequest) -> GenerationResult {
        let prompt = build_customization_prompt(request);
        let body = GeminiRequest {
            system_instruction: GeminiContent {
                parts: vec![GeminiPart {
                    text: CUSTOMIZE_SYSTEM,
                }],
            },
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: &prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.7,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        let response: GeminiResponse = send_json(
            BACKEND,
            self.http
                .post(&self.endpoint)
                .query(&[("key", self.api_key.as_str())])
                .json(&body),
        )
        .await?;

        finish(BACKEND, response.text())
    }
}

//! Generation backends: turn a source document and a target description into a
//! rewritten document body.
//!
//! Each client maps one call to exactly one outbound request. Retrying is the
//! orchestrator's job; rate-limited providers punish retry amplification.

pub mod claude;
pub mod deepseek;
pub mod extract;
pub mod gemini;
mod http;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::CustomizationRequest;

pub use claude::ClaudeClient;
pub use deepseek::DeepSeekClient;
pub use gemini::GeminiClient;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("backend unreachable: {0}")]
    Unreachable(String),
}

/// Message-free classification of a [`GenerationError`], safe to show callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationErrorKind {
    AuthError,
    RateLimited,
    InvalidResponse,
    Unreachable,
}

impl GenerationError {
    /// `RateLimited` and `Unreachable` may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::RateLimited(_) | GenerationError::Unreachable(_)
        )
    }

    pub fn kind(&self) -> GenerationErrorKind {
        match self {
            GenerationError::Auth(_) => GenerationErrorKind::AuthError,
            GenerationError::RateLimited(_) => GenerationErrorKind::RateLimited,
            GenerationError::InvalidResponse(_) => GenerationErrorKind::InvalidResponse,
            GenerationError::Unreachable(_) => GenerationErrorKind::Unreachable,
        }
    }
}

/// The rewritten document body, or why the backend could not produce one.
pub type GenerationResult = Result<String, GenerationError>;

/// One generation backend. Implementations own their request/response
/// translation and authentication, and must not touch global state.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, request: &CustomizationRequest) -> GenerationResult;
}

//! Status and transport classification shared by the HTTP generation clients.

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use super::extract::{strip_code_fences, validate_latex};
use super::{GenerationError, GenerationResult};

/// Most providers wrap failures as `{"error": {"message": "..."}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(500).collect())
}

pub(super) fn classify_status(backend: &str, status: StatusCode, body: &str) -> GenerationError {
    let message = format!("{backend} returned {status}: {}", error_message(body));
    match status.as_u16() {
        401 | 403 => GenerationError::Auth(message),
        429 => GenerationError::RateLimited(message),
        408 => GenerationError::Unreachable(message),
        _ if status.is_server_error() => GenerationError::Unreachable(message),
        _ => GenerationError::InvalidResponse(message),
    }
}

pub(super) fn classify_transport(backend: &str, error: reqwest::Error) -> GenerationError {
    if error.is_decode() {
        GenerationError::InvalidResponse(format!("{backend} response could not be read: {error}"))
    } else {
        GenerationError::Unreachable(format!("{backend} request failed: {error}"))
    }
}

/// Sends `request` and decodes a JSON success body.
pub(super) async fn send_json<T: DeserializeOwned>(
    backend: &str,
    request: RequestBuilder,
) -> Result<T, GenerationError> {
    let response = request
        .send()
        .await
        .map_err(|e| classify_transport(backend, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!("{backend} returned {status}");
        return Err(classify_status(backend, status, &body));
    }

    let body = response
        .text()
        .await
        .map_err(|e| classify_transport(backend, e))?;

    serde_json::from_str(&body).map_err(|e| {
        GenerationError::InvalidResponse(format!("{backend} returned malformed JSON: {e}"))
    })
}

/// Turns the model's text into a validated document body.
pub(super) fn finish(backend: &str, text: Option<&str>) -> GenerationResult {
    let text = text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| GenerationError::InvalidResponse(format!("{backend} returned no text")))?;

    let body = strip_code_fences(text);
    validate_latex(body).map_err(|issue| {
        GenerationError::InvalidResponse(format!("{backend} returned invalid LaTeX: {issue}"))
    })?;

    Ok(body.to_string())
}

use bytes::Bytes;
use reqwest::{Response, StatusCode};
use tracing::warn;

use super::{check_pdf, RenderFailure};

/// 408/429/5xx are worth retrying; any other 4xx means the service refused the
/// document itself.
pub(super) fn classify_status(backend: &str, status: StatusCode, body: &str) -> RenderFailure {
    let excerpt: String = body.chars().take(500).collect();
    let message = format!("{backend} returned {status}: {excerpt}");
    match status.as_u16() {
        408 | 429 => RenderFailure::Transient(message),
        _ if status.is_server_error() => RenderFailure::Transient(message),
        _ => RenderFailure::Fatal(message),
    }
}

pub(super) fn classify_transport(backend: &str, error: reqwest::Error) -> RenderFailure {
    RenderFailure::Transient(format!("{backend} request failed: {error}"))
}

pub(super) async fn read_pdf(backend: &str, response: Response) -> Result<Bytes, RenderFailure> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!("{backend} returned {status}");
        return Err(classify_status(backend, status, &body));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| classify_transport(backend, e))?;
    check_pdf(backend, bytes)
}

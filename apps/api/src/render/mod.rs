//! Render backends: turn a LaTeX document body into PDF bytes.

mod http;
pub mod latexonline;
pub mod pdflatex;
pub mod pipeline;
pub mod ytotech;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::resilience::AttemptOutcome;

pub use latexonline::LatexOnlineClient;
pub use pdflatex::PdflatexClient;
pub use pipeline::{BackendFailure, RenderError, RenderPipeline};
pub use ytotech::YtotechClient;

const PDF_MAGIC: &[u8] = b"%PDF";

/// Why a single render call did not produce an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderFailure {
    /// Timeout, 5xx-equivalent, connection reset. Worth retrying.
    #[error("{0}")]
    Transient(String),

    /// The backend rejected the input itself. Retrying the same backend cannot help.
    #[error("{0}")]
    Fatal(String),
}

impl RenderFailure {
    pub fn outcome(&self) -> AttemptOutcome {
        match self {
            RenderFailure::Transient(_) => AttemptOutcome::TransientFailure,
            RenderFailure::Fatal(_) => AttemptOutcome::FatalFailure,
        }
    }
}

/// One rendering service. Implementations translate the service's status
/// semantics into [`RenderFailure`]; retrying and fallback live in the pipeline.
#[async_trait]
pub trait RenderClient: Send + Sync {
    async fn render(&self, body: &str) -> Result<Bytes, RenderFailure>;
}

/// Accepts `bytes` only if they look like a PDF.
fn check_pdf(backend: &str, bytes: Bytes) -> Result<Bytes, RenderFailure> {
    if bytes.is_empty() {
        return Err(RenderFailure::Transient(format!(
            "{backend} returned an empty artifact"
        )));
    }
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(RenderFailure::Fatal(format!(
            "{backend} returned {} bytes that are not a PDF",
            bytes.len()
        )));
    }
    Ok(bytes)
}

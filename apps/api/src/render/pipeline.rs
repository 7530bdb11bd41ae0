//! Render pipeline: priority-ordered fallback across render backends, with a
//! bounded retry policy per backend.
//!
//! # Algorithm
//! 1. Walk render backends in registry order, skipping unavailable ones.
//! 2. On each backend, retry only transient failures, with exponential backoff.
//! 3. A fatal failure stops that backend immediately and falls through to the next;
//!    another backend may parse the same body differently.
//! 4. First success wins. If every backend fails, the error lists each backend's
//!    terminal outcome in the order tried.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{RenderClient, RenderFailure};
use crate::backends::{BackendDescriptor, BackendKind, BackendRegistry};
use crate::resilience::{retry, AttemptOutcome, AttemptRecord, CancelSignal, RetryError, RetryPolicy, Step};

/// One render call, as recorded in the per-invocation attempt log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderAttempt {
    pub backend_id: String,
    pub started_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub latency: Duration,
}

impl RenderAttempt {
    fn from_record(backend_id: &str, record: AttemptRecord) -> Self {
        Self {
            backend_id: backend_id.to_string(),
            started_at: record.started_at,
            outcome: record.outcome,
            latency: record.latency,
        }
    }
}

/// Terminal outcome of one backend that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendFailure {
    pub backend_id: String,
    pub outcome: AttemptOutcome,
    pub attempts: u32,
    pub message: String,
}

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?} after {} attempt(s)): {}",
            self.backend_id, self.outcome, self.attempts, self.message
        )
    }
}

fn summarize(failures: &[BackendFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("no render backend is available")]
    NoBackendAvailable,

    #[error("all render backends failed: {}", summarize(.failures))]
    AllBackendsExhausted { failures: Vec<BackendFailure> },

    #[error("render cancelled")]
    Cancelled,
}

/// Successful pipeline result.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub bytes: Bytes,
    pub backend_id: String,
    pub attempts: Vec<RenderAttempt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("render backend '{0}' is available but has no client")]
pub struct MissingRenderClient(pub String);

struct Stage {
    descriptor: BackendDescriptor,
    client: Option<Arc<dyn RenderClient>>,
}

pub struct RenderPipeline {
    stages: Vec<Stage>,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl RenderPipeline {
    /// Binds registry render descriptors to their clients. Every available
    /// descriptor must have a client; unavailable ones may omit it.
    pub fn new(
        registry: &BackendRegistry,
        mut clients: HashMap<String, Arc<dyn RenderClient>>,
        policy: RetryPolicy,
        call_timeout: Duration,
    ) -> Result<Self, MissingRenderClient> {
        let stages = registry
            .list(BackendKind::Render)
            .iter()
            .map(|descriptor| {
                let client = clients.remove(&descriptor.id);
                if descriptor.is_available && client.is_none() {
                    return Err(MissingRenderClient(descriptor.id.clone()));
                }
                Ok(Stage {
                    descriptor: descriptor.clone(),
                    client,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            stages,
            policy,
            call_timeout,
        })
    }

    pub fn has_available_backend(&self) -> bool {
        self.stages.iter().any(|s| s.descriptor.is_available)
    }

    pub async fn render(&self, body: &str, cancel: &CancelSignal) -> Result<Rendered, RenderError> {
        let mut attempts = Vec::new();
        let mut failures = Vec::new();

        for stage in &self.stages {
            let backend_id = stage.descriptor.id.as_str();
            let client = match (&stage.client, stage.descriptor.is_available) {
                (Some(client), true) => client.as_ref(),
                _ => {
                    debug!("Skipping unavailable render backend {backend_id}");
                    continue;
                }
            };

            info!("Rendering with {backend_id}");
            let label = format!("render[{backend_id}]");
            let run = retry(&self.policy, cancel, &label, || {
                attempt(client, body, self.call_timeout)
            })
            .await;

            let tried = run.attempts.len() as u32;
            attempts.extend(
                run.attempts
                    .into_iter()
                    .map(|record| RenderAttempt::from_record(backend_id, record)),
            );

            match run.result {
                Ok(bytes) => {
                    info!(
                        "Rendered {} bytes with {backend_id} after {tried} attempt(s)",
                        bytes.len()
                    );
                    return Ok(Rendered {
                        bytes,
                        backend_id: backend_id.to_string(),
                        attempts,
                    });
                }
                Err(RetryError::Cancelled) => return Err(RenderError::Cancelled),
                Err(RetryError::Fatal { error }) | Err(RetryError::Exhausted { last: error }) => {
                    warn!("Render backend {backend_id} gave up: {error}");
                    failures.push(BackendFailure {
                        backend_id: backend_id.to_string(),
                        outcome: error.outcome(),
                        attempts: tried,
                        message: error.to_string(),
                    });
                }
            }
        }

        if failures.is_empty() {
            return Err(RenderError::NoBackendAvailable);
        }
        Err(RenderError::AllBackendsExhausted { failures })
    }
}

/// One bounded call, classified for the retry loop. Timeouts and empty artifacts
/// count as transient.
async fn attempt(
    client: &dyn RenderClient,
    body: &str,
    call_timeout: Duration,
) -> Step<Bytes, RenderFailure> {
    match tokio::time::timeout(call_timeout, client.render(body)).await {
        Err(_) => Step::Transient(RenderFailure::Transient(format!(
            "timed out after {}ms",
            call_timeout.as_millis()
        ))),
        Ok(Ok(bytes)) if bytes.is_empty() => {
            Step::Transient(RenderFailure::Transient("empty artifact".to_string()))
        }
        Ok(Ok(bytes)) => Step::Success(bytes),
        Ok(Err(failure @ RenderFailure::Transient(_))) => Step::Transient(failure),
        Ok(Err(failure @ RenderFailure::Fatal(_))) => Step::Fatal(failure),
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::generation::GenerationErrorKind;
use crate::models::OwnerId;
use crate::render::BackendFailure;

/// Handle returned by `submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Why a run ended in `FAILED`. Callers only ever see one of these, never a raw
/// transport error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// The requested generation backend, or every render backend, is unavailable.
    NoBackendAvailable,
    Generation {
        kind: GenerationErrorKind,
        message: String,
    },
    /// Per-backend terminal outcomes, in the order tried.
    AllBackendsExhausted { backends: Vec<BackendFailure> },
    Publish { message: String },
    Cancelled,
}

impl FailureReason {
    /// Whether resubmitting the same request later could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FailureReason::NoBackendAvailable | FailureReason::Cancelled => true,
            FailureReason::Generation { kind, .. } => matches!(
                kind,
                GenerationErrorKind::RateLimited | GenerationErrorKind::Unreachable
            ),
            FailureReason::AllBackendsExhausted { .. } => true,
            FailureReason::Publish { .. } => false,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoBackendAvailable => f.write_str("no backend available"),
            FailureReason::Generation { kind, message } => {
                write!(f, "generation failed ({kind:?}): {message}")
            }
            FailureReason::AllBackendsExhausted { backends } => {
                write!(f, "all {} render backend(s) failed", backends.len())
            }
            FailureReason::Publish { message } => write!(f, "publish failed: {message}"),
            FailureReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Received,
    Generating,
    Rendering,
    Published {
        artifact_id: Uuid,
        render_backend: String,
    },
    Failed {
        reason: FailureReason,
    },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Published { .. } | RunState::Failed { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            RunState::Received => "RECEIVED",
            RunState::Generating => "GENERATING",
            RunState::Rendering => "RENDERING",
            RunState::Published { .. } => "PUBLISHED",
            RunState::Failed { .. } => "FAILED",
        }
    }
}

/// Snapshot of a run as observed by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    pub run_id: RunId,
    pub owner: OwnerId,
    #[serde(flatten)]
    pub state: RunState,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

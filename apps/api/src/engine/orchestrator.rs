//! Customization run state machine.
//!
//! ```text
//! RECEIVED -> GENERATING -> RENDERING -> PUBLISHED
//!     \            \            \
//!      +------------+------------+----> FAILED(reason)
//! ```
//!
//! A run holds its owner's in-flight slot from `submit` until its terminal state is
//! written. The slot is released inside that same status update, so a new run for
//! the owner is never admitted while the old one still reports a live state, and a
//! caller woken by `wait` can resubmit at once.
//! The temporary artifact is only ever touched by the final publish; every failure
//! path leaves it as it was.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::in_flight::{InFlightRuns, RunGuard};
use super::run::{FailureReason, RunId, RunState, RunStatus};
use crate::backends::{BackendDescriptor, BackendKind, BackendRegistry};
use crate::generation::{GenerationClient, GenerationError};
use crate::models::{CustomizationRequest, OwnerId, ValidationError};
use crate::render::{RenderError, RenderPipeline};
use crate::resilience::{retry, CancelSignal, RetryError, RetryPolicy, Step};
use crate::store::{NewArtifact, PermanentArtifactHandle, StoreError, TempArtifact, TempArtifactStore};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("a customization is already in progress for this user (run {running})")]
    AlreadyInProgress { running: RunId },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("run {0} not found")]
    RunNotFound(RunId),
}

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub generation_policy: RetryPolicy,
    pub generation_timeout: Duration,
    /// How long finished runs stay queryable.
    pub run_retention: Duration,
}

struct RunRecord {
    status: watch::Sender<RunStatus>,
    cancel: CancelSignal,
}

pub struct Orchestrator {
    registry: Arc<BackendRegistry>,
    generators: HashMap<String, Arc<dyn GenerationClient>>,
    pipeline: RenderPipeline,
    store: Arc<TempArtifactStore>,
    in_flight: InFlightRuns,
    runs: DashMap<RunId, RunRecord>,
    settings: EngineSettings,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<BackendRegistry>,
        generators: HashMap<String, Arc<dyn GenerationClient>>,
        pipeline: RenderPipeline,
        store: Arc<TempArtifactStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            registry,
            generators,
            pipeline,
            store,
            in_flight: InFlightRuns::new(),
            runs: DashMap::new(),
            settings,
        }
    }

    /// Validates `request` and starts a run for `owner`.
    ///
    /// Invalid requests and a busy owner are rejected without creating a run. If the
    /// requested generation backend or every render backend is unavailable, the run
    /// is created already `FAILED(NoBackendAvailable)` and no backend is called.
    pub fn submit(
        self: &Arc<Self>,
        owner: OwnerId,
        request: CustomizationRequest,
    ) -> Result<RunId, SubmitError> {
        self.prune_finished();

        request.validate_shape()?;
        let descriptor = self
            .registry
            .get(&request.backend_id)
            .ok()
            .filter(|d| d.kind == BackendKind::Generation)
            .ok_or_else(|| ValidationError::UnknownBackend(request.backend_id.clone()))?;

        let run_id = RunId::new();
        let Some(generator) = self.usable_generator(descriptor) else {
            warn!(
                "Run {run_id} for {owner}: generation backend {} is unavailable",
                descriptor.id
            );
            self.insert_run(run_id, &owner, fail(FailureReason::NoBackendAvailable));
            return Ok(run_id);
        };
        if !self.pipeline.has_available_backend() {
            warn!("Run {run_id} for {owner}: no render backend is available");
            self.insert_run(run_id, &owner, fail(FailureReason::NoBackendAvailable));
            return Ok(run_id);
        }

        let guard = self
            .in_flight
            .acquire(&owner, run_id)
            .map_err(|running| {
                info!("Rejected submission for {owner}: run {running} still in flight");
                SubmitError::AlreadyInProgress { running }
            })?;

        let cancel = self.insert_run(run_id, &owner, RunState::Received);
        info!(
            "Run {run_id} received for {owner}: backend={}, sections=[{}], intensity={}",
            request.backend_id,
            request.section_list(),
            request.intensity
        );

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.drive(run_id, owner, request, generator, cancel, guard).await;
        });

        Ok(run_id)
    }

    pub fn status(&self, run_id: RunId) -> Result<RunStatus, EngineError> {
        self.runs
            .get(&run_id)
            .map(|record| record.status.borrow().clone())
            .ok_or(EngineError::RunNotFound(run_id))
    }

    /// Resolves once the run reaches `PUBLISHED` or `FAILED`.
    pub async fn wait(&self, run_id: RunId) -> Result<RunStatus, EngineError> {
        let mut rx = self
            .runs
            .get(&run_id)
            .map(|record| record.status.subscribe())
            .ok_or(EngineError::RunNotFound(run_id))?;

        if rx.wait_for(|status| status.state.is_terminal()).await.is_err() {
            debug!("Run {run_id} was pruned while being waited on");
        }
        let status = rx.borrow().clone();
        Ok(status)
    }

    /// Requests cancellation. The run observes it at its next suspension point and
    /// ends `FAILED(Cancelled)`, unless it has already published.
    pub fn cancel(&self, run_id: RunId) -> Result<RunStatus, EngineError> {
        let record = self
            .runs
            .get(&run_id)
            .ok_or(EngineError::RunNotFound(run_id))?;
        if !record.status.borrow().state.is_terminal() {
            info!("Cancellation requested for run {run_id}");
            record.cancel.cancel();
        }
        let status = record.status.borrow().clone();
        Ok(status)
    }

    pub fn fetch_artifact(&self, owner: &OwnerId) -> Result<Arc<TempArtifact>, StoreError> {
        self.store.get(owner)
    }

    pub async fn promote(&self, owner: &OwnerId) -> Result<PermanentArtifactHandle, StoreError> {
        self.store.promote(owner).await
    }

    pub fn list_backends(&self, kind: BackendKind) -> &[BackendDescriptor] {
        self.registry.list(kind)
    }

    fn usable_generator(&self, descriptor: &BackendDescriptor) -> Option<Arc<dyn GenerationClient>> {
        if !descriptor.is_available {
            return None;
        }
        self.generators.get(&descriptor.id).cloned()
    }

    fn insert_run(&self, run_id: RunId, owner: &OwnerId, state: RunState) -> CancelSignal {
        let now = Utc::now();
        let (status, _) = watch::channel(RunStatus {
            run_id,
            owner: owner.clone(),
            state,
            submitted_at: now,
            updated_at: now,
        });
        let cancel = CancelSignal::new();
        self.runs.insert(
            run_id,
            RunRecord {
                status,
                cancel: cancel.clone(),
            },
        );
        cancel
    }

    fn transition(&self, run_id: RunId, state: RunState) {
        self.transition_releasing(run_id, state, None);
    }

    /// Writes `state` and, when given, drops `guard` while the status is still
    /// locked. Subscribers are notified only after both have happened.
    fn transition_releasing(&self, run_id: RunId, state: RunState, guard: Option<RunGuard>) {
        let Some(record) = self.runs.get(&run_id) else {
            return;
        };
        match &state {
            RunState::Failed { reason } => warn!(
                "Run {run_id} -> FAILED: {reason} (retryable: {})",
                reason.is_retryable()
            ),
            other => info!("Run {run_id} -> {}", other.name()),
        }
        record.status.send_modify(move |status| {
            status.state = state;
            status.updated_at = Utc::now();
            drop(guard);
        });
    }

    fn prune_finished(&self) {
        let retention = self.settings.run_retention;
        let now = Utc::now();
        self.runs.retain(|_, record| {
            let status = record.status.borrow();
            let expired = status.state.is_terminal()
                && (now - status.updated_at)
                    .to_std()
                    .map(|age| age > retention)
                    .unwrap_or(false);
            !expired
        });
    }

    async fn drive(
        self: Arc<Self>,
        run_id: RunId,
        owner: OwnerId,
        request: CustomizationRequest,
        generator: Arc<dyn GenerationClient>,
        cancel: CancelSignal,
        guard: RunGuard,
    ) {
        let outcome = self
            .execute(run_id, &owner, &request, generator.as_ref(), &cancel)
            .await;

        let state = match outcome {
            Ok(artifact) => RunState::Published {
                artifact_id: artifact.artifact_id,
                render_backend: artifact.render_backend.clone(),
            },
            Err(reason) => RunState::Failed { reason },
        };
        self.transition_releasing(run_id, state, Some(guard));
    }

    async fn execute(
        &self,
        run_id: RunId,
        owner: &OwnerId,
        request: &CustomizationRequest,
        generator: &dyn GenerationClient,
        cancel: &CancelSignal,
    ) -> Result<Arc<TempArtifact>, FailureReason> {
        self.transition(run_id, RunState::Generating);
        let body = self.generate(run_id, request, generator, cancel).await?;

        if cancel.is_cancelled() {
            return Err(FailureReason::Cancelled);
        }
        self.transition(run_id, RunState::Rendering);
        let rendered = self
            .pipeline
            .render(&body, cancel)
            .await
            .map_err(|e| match e {
                RenderError::NoBackendAvailable => FailureReason::NoBackendAvailable,
                RenderError::AllBackendsExhausted { failures } => {
                    FailureReason::AllBackendsExhausted { backends: failures }
                }
                RenderError::Cancelled => FailureReason::Cancelled,
            })?;
        debug!(
            "Run {run_id}: render took {} attempt(s)",
            rendered.attempts.len()
        );

        // Last cancellation point. Once publish starts it runs to completion.
        if cancel.is_cancelled() {
            return Err(FailureReason::Cancelled);
        }
        self.store
            .publish(
                owner,
                NewArtifact {
                    bytes: rendered.bytes,
                    source_request: request.clone(),
                    document_body: body,
                    render_backend: rendered.backend_id,
                },
            )
            .await
            .map_err(|e| FailureReason::Publish {
                message: e.to_string(),
            })
    }

    /// Generation with orchestrator-level retry. Only rate limits and unreachable
    /// backends are retried; a timed-out call counts as unreachable.
    async fn generate(
        &self,
        run_id: RunId,
        request: &CustomizationRequest,
        generator: &dyn GenerationClient,
        cancel: &CancelSignal,
    ) -> Result<String, FailureReason> {
        let timeout = self.settings.generation_timeout;
        let label = format!("run {run_id} generate[{}]", request.backend_id);

        let run = retry(&self.settings.generation_policy, cancel, &label, || async move {
            let result = match tokio::time::timeout(timeout, generator.generate(request)).await {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Unreachable(format!(
                    "no response within {}s",
                    timeout.as_secs()
                ))),
            };
            match result {
                Ok(body) => Step::Success(body),
                Err(e) if e.is_retryable() => Step::Transient(e),
                Err(e) => Step::Fatal(e),
            }
        })
        .await;

        match run.result {
            Ok(body) => Ok(body),
            Err(RetryError::Cancelled) => Err(FailureReason::Cancelled),
            Err(RetryError::Fatal { error }) | Err(RetryError::Exhausted { last: error }) => {
                Err(FailureReason::Generation {
                    kind: error.kind(),
                    message: error.to_string(),
                })
            }
        }
    }
}

fn fail(reason: FailureReason) -> RunState {
    RunState::Failed { reason }
}

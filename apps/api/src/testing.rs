//! Scripted fakes shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::generation::{GenerationClient, GenerationError, GenerationResult};
use crate::models::customization::Section;
use crate::models::CustomizationRequest;
use crate::render::{RenderClient, RenderFailure};

pub const SAMPLE_LATEX: &str =
    "\\documentclass{article}\n\\begin{document}\nJane Doe, Rust engineer\n\\end{document}";

pub fn sample_request(backend_id: &str) -> CustomizationRequest {
    CustomizationRequest {
        source_document: SAMPLE_LATEX.to_string(),
        target_description: "Senior Rust engineer for a payments platform".to_string(),
        sections: [Section::Experience, Section::Skills].into_iter().collect(),
        intensity: 30,
        backend_id: backend_id.to_string(),
    }
}

/// Replays queued outcomes in order, then repeats `fallback` forever.
struct Script<T> {
    queue: Mutex<VecDeque<T>>,
    fallback: T,
    calls: AtomicU32,
    delay: Duration,
}

impl<T: Clone> Script<T> {
    fn new(queue: Vec<T>, fallback: T, delay: Duration) -> Self {
        Self {
            queue: Mutex::new(queue.into()),
            fallback,
            calls: AtomicU32::new(0),
            delay,
        }
    }

    async fn next(&self) -> T {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let queued = self.queue.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| self.fallback.clone())
    }
}

pub struct ScriptedGenerator {
    script: Script<GenerationResult>,
}

impl ScriptedGenerator {
    pub fn sequence(queue: Vec<GenerationResult>, fallback: GenerationResult) -> Arc<Self> {
        Self::delayed(queue, fallback, Duration::ZERO)
    }

    pub fn always(result: GenerationResult) -> Arc<Self> {
        Self::sequence(Vec::new(), result)
    }

    pub fn delayed(
        queue: Vec<GenerationResult>,
        fallback: GenerationResult,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Script::new(queue, fallback, delay),
        })
    }

    pub fn calls(&self) -> u32 {
        self.script.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerator {
    async fn generate(&self, _request: &CustomizationRequest) -> GenerationResult {
        self.script.next().await
    }
}

pub struct ScriptedRenderer {
    script: Script<Result<Bytes, RenderFailure>>,
}

impl ScriptedRenderer {
    pub fn sequence(
        queue: Vec<Result<Bytes, RenderFailure>>,
        fallback: Result<Bytes, RenderFailure>,
    ) -> Arc<Self> {
        Self::delayed(queue, fallback, Duration::ZERO)
    }

    pub fn always(result: Result<Bytes, RenderFailure>) -> Arc<Self> {
        Self::sequence(Vec::new(), result)
    }

    pub fn delayed(
        queue: Vec<Result<Bytes, RenderFailure>>,
        fallback: Result<Bytes, RenderFailure>,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Script::new(queue, fallback, delay),
        })
    }

    pub fn calls(&self) -> u32 {
        self.script.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderClient for ScriptedRenderer {
    async fn render(&self, _body: &str) -> Result<Bytes, RenderFailure> {
        self.script.next().await
    }
}

pub fn pdf(content: &'static [u8]) -> Result<Bytes, RenderFailure> {
    Ok(Bytes::from_static(content))
}

pub fn transient() -> Result<Bytes, RenderFailure> {
    Err(RenderFailure::Transient("503 Service Unavailable".to_string()))
}

pub fn fatal() -> Result<Bytes, RenderFailure> {
    Err(RenderFailure::Fatal("400 Bad Request: malformed source".to_string()))
}

pub fn auth_error() -> GenerationResult {
    Err(GenerationError::Auth("401 invalid key".to_string()))
}

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Generation,
    Render,
}

/// Static description of one configured backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendDescriptor {
    pub id: String,
    pub display_name: String,
    pub kind: BackendKind,
    /// False when the backend is configured but unusable (e.g. missing credential).
    pub is_available: bool,
}

impl BackendDescriptor {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        kind: BackendKind,
        is_available: bool,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            kind,
            is_available,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("backend '{0}' is not configured")]
    NotFound(String),

    #[error("backend id '{0}' is configured more than once")]
    DuplicateId(String),
}

/// Read-only catalog built once at startup.
///
/// Render descriptors keep their configuration order, which is the fallback order
/// used by the render pipeline.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    generation: Vec<BackendDescriptor>,
    render: Vec<BackendDescriptor>,
}

impl BackendRegistry {
    pub fn new(
        descriptors: impl IntoIterator<Item = BackendDescriptor>,
    ) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        let mut registry = Self::default();

        for descriptor in descriptors {
            if !seen.insert(descriptor.id.clone()) {
                return Err(RegistryError::DuplicateId(descriptor.id));
            }
            match descriptor.kind {
                BackendKind::Generation => registry.generation.push(descriptor),
                BackendKind::Render => registry.render.push(descriptor),
            }
        }

        Ok(registry)
    }

    pub fn list(&self, kind: BackendKind) -> &[BackendDescriptor] {
        match kind {
            BackendKind::Generation => &self.generation,
            BackendKind::Render => &self.render,
        }
    }

    pub fn get(&self, id: &str) -> Result<&BackendDescriptor, RegistryError> {
        self.generation
            .iter()
            .chain(self.render.iter())
            .find(|d| d.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Available backends of `kind`, in configuration order.
    pub fn available(&self, kind: BackendKind) -> impl Iterator<Item = &BackendDescriptor> {
        self.list(kind).iter().filter(|d| d.is_available)
    }
}

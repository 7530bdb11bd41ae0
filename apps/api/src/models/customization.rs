//! Customization request: the immutable input to one orchestration run.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowest accepted rewrite intensity (percent of content the backend may change).
pub const MIN_INTENSITY: u8 = 10;
/// Highest accepted rewrite intensity.
pub const MAX_INTENSITY: u8 = 90;

/// Document sections a generation backend is allowed to rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Experience,
    Skills,
    Projects,
    Education,
    Certifications,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Experience => "experience",
            Section::Skills => "skills",
            Section::Projects => "projects",
            Section::Education => "education",
            Section::Certifications => "certifications",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to tailor `source_document` towards `target_description`.
///
/// `sections` is a set: duplicates in the submitted JSON collapse, and iteration
/// order is the enum order above, so prompts are deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomizationRequest {
    pub source_document: String,
    pub target_description: String,
    pub sections: BTreeSet<Section>,
    pub intensity: u8,
    pub backend_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("source_document cannot be empty")]
    EmptySourceDocument,

    #[error("target_description cannot be empty")]
    EmptyTargetDescription,

    #[error("intensity must be between 10 and 90, got {0}")]
    IntensityOutOfRange(u8),

    #[error("at least one section must be selected")]
    NoSections,

    #[error("unknown generation backend '{0}'")]
    UnknownBackend(String),
}

impl CustomizationRequest {
    /// Checks everything that can be checked without the backend registry.
    pub fn validate_shape(&self) -> Result<(), ValidationError> {
        if self.source_document.trim().is_empty() {
            return Err(ValidationError::EmptySourceDocument);
        }
        if self.target_description.trim().is_empty() {
            return Err(ValidationError::EmptyTargetDescription);
        }
        if !(MIN_INTENSITY..=MAX_INTENSITY).contains(&self.intensity) {
            return Err(ValidationError::IntensityOutOfRange(self.intensity));
        }
        if self.sections.is_empty() {
            return Err(ValidationError::NoSections);
        }
        Ok(())
    }

    /// Comma-separated section names, as embedded in generation prompts.
    pub fn section_list(&self) -> String {
        self.sections
            .iter()
            .map(Section::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

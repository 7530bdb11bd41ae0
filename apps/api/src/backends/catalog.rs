//! The closed set of backend implementations this service knows how to drive.
//!
//! Configuration names backends by string id; ids are resolved to these variants
//! once at startup and never looked up reflectively afterwards.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown backend id '{0}'")]
pub struct UnknownBackendId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationProvider {
    Claude,
    Gemini,
    DeepSeek,
}

impl GenerationProvider {
    pub const ALL: [GenerationProvider; 3] = [
        GenerationProvider::Claude,
        GenerationProvider::Gemini,
        GenerationProvider::DeepSeek,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            GenerationProvider::Claude => "claude",
            GenerationProvider::Gemini => "gemini",
            GenerationProvider::DeepSeek => "deepseek",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            GenerationProvider::Claude => "Claude Sonnet",
            GenerationProvider::Gemini => "Google Gemini Flash",
            GenerationProvider::DeepSeek => "DeepSeek Chat",
        }
    }
}

impl FromStr for GenerationProvider {
    type Err = UnknownBackendId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.id() == s)
            .ok_or_else(|| UnknownBackendId(s.to_string()))
    }
}

impl fmt::Display for GenerationProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderService {
    /// Local `pdflatex` process.
    Pdflatex,
    /// LaTeX-on-HTTP (latex.ytotech.com).
    Ytotech,
    /// LaTeX.Online (latexonline.cc).
    LatexOnline,
}

impl RenderService {
    pub const ALL: [RenderService; 3] = [
        RenderService::Pdflatex,
        RenderService::Ytotech,
        RenderService::LatexOnline,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            RenderService::Pdflatex => "pdflatex",
            RenderService::Ytotech => "ytotech",
            RenderService::LatexOnline => "latexonline",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RenderService::Pdflatex => "Local pdflatex",
            RenderService::Ytotech => "LaTeX-on-HTTP (ytotech)",
            RenderService::LatexOnline => "LaTeX.Online",
        }
    }
}

impl FromStr for RenderService {
    type Err = UnknownBackendId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.id() == s)
            .ok_or_else(|| UnknownBackendId(s.to_string()))
    }
}

impl fmt::Display for RenderService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Parses an ordered, comma-separated render backend list. Blank items are skipped.
pub fn parse_render_order(raw: &str) -> Result<Vec<RenderService>, UnknownBackendId> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(RenderService::from_str)
        .collect()
}

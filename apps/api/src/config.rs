use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::backends::{parse_render_order, GenerationProvider, RenderService};
use crate::render::latexonline::LATEXONLINE_API_URL;
use crate::render::ytotech::YTOTECH_API_URL;

const DEFAULT_RENDER_BACKENDS: &str = "pdflatex,ytotech,latexonline";
const DEFAULT_MAX_ARTIFACT_BYTES: usize = 10 * 1024 * 1024;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,

    pub claude_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub deepseek_api_key: Option<String>,

    /// Fallback order for rendering.
    pub render_backends: Vec<RenderService>,
    pub pdflatex_path: String,
    pub ytotech_endpoint: String,
    pub latexonline_endpoint: String,

    pub generation_timeout: Duration,
    pub generation_max_attempts: u32,
    pub render_timeout: Duration,
    pub render_max_attempts: u32,
    pub max_artifact_bytes: usize,

    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let render_backends = parse_render_order(
            &std::env::var("RENDER_BACKENDS").unwrap_or_else(|_| DEFAULT_RENDER_BACKENDS.to_string()),
        )
        .context("RENDER_BACKENDS must list known render backend ids")?;

        Ok(Config {
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            claude_api_key: optional_env("CLAUDE_API_KEY"),
            gemini_api_key: optional_env("GEMINI_API_KEY"),
            deepseek_api_key: optional_env("DEEPSEEK_API_KEY"),
            render_backends,
            pdflatex_path: std::env::var("PDFLATEX_PATH").unwrap_or_else(|_| "pdflatex".to_string()),
            ytotech_endpoint: std::env::var("YTOTECH_ENDPOINT")
                .unwrap_or_else(|_| YTOTECH_API_URL.to_string()),
            latexonline_endpoint: std::env::var("LATEXONLINE_ENDPOINT")
                .unwrap_or_else(|_| LATEXONLINE_API_URL.to_string()),
            generation_timeout: Duration::from_secs(parse_env("GENERATION_TIMEOUT_SECS", 60)?),
            generation_max_attempts: parse_env("GENERATION_MAX_ATTEMPTS", 3)?,
            render_timeout: Duration::from_secs(parse_env("RENDER_TIMEOUT_SECS", 90)?),
            render_max_attempts: parse_env("RENDER_MAX_ATTEMPTS", 3)?,
            max_artifact_bytes: parse_env("MAX_ARTIFACT_BYTES", DEFAULT_MAX_ARTIFACT_BYTES)?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
        })
    }

    /// Credential for `provider`, if one is configured.
    pub fn generation_key(&self, provider: GenerationProvider) -> Option<&str> {
        match provider {
            GenerationProvider::Claude => self.claude_api_key.as_deref(),
            GenerationProvider::Gemini => self.gemini_api_key.as_deref(),
            GenerationProvider::DeepSeek => self.deepseek_api_key.as_deref(),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and blank both count as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

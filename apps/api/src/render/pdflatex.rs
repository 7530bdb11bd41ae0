//! Local `pdflatex` process backend.
//!
//! Each render runs in its own temporary directory, removed when the call returns.
//! The child is killed if the render future is dropped (timeout or cancellation).

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::debug;

use super::{check_pdf, RenderClient, RenderFailure};

const BACKEND: &str = "pdflatex";
const SOURCE_FILE: &str = "main.tex";
const OUTPUT_FILE: &str = "main.pdf";

#[derive(Debug, Clone)]
pub struct PdflatexClient {
    binary: PathBuf,
}

impl PdflatexClient {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// True if the binary exists and answers `--version`.
    pub async fn probe(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl RenderClient for PdflatexClient {
    async fn render(&self, body: &str) -> Result<Bytes, RenderFailure> {
        let workdir = tempfile::tempdir().map_err(|e| {
            RenderFailure::Transient(format!("{BACKEND}: could not create build directory: {e}"))
        })?;
        let source = workdir.path().join(SOURCE_FILE);
        tokio::fs::write(&source, body).await.map_err(|e| {
            RenderFailure::Transient(format!("{BACKEND}: could not write source: {e}"))
        })?;

        let output = Command::new(&self.binary)
            .arg("-interaction=nonstopmode")
            .arg("-halt-on-error")
            .arg("-no-shell-escape")
            .arg("-output-directory")
            .arg(workdir.path())
            .arg(&source)
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RenderFailure::Transient(format!("{BACKEND}: could not start: {e}")))?;

        if !output.status.success() {
            let log = String::from_utf8_lossy(&output.stdout);
            return Err(match first_latex_error(&log) {
                Some(line) => RenderFailure::Fatal(format!("{BACKEND}: {line}")),
                None => RenderFailure::Transient(format!(
                    "{BACKEND} exited with {}",
                    output.status
                )),
            });
        }

        let pdf = tokio::fs::read(workdir.path().join(OUTPUT_FILE))
            .await
            .map_err(|e| {
                RenderFailure::Transient(format!("{BACKEND}: no PDF produced: {e}"))
            })?;
        debug!("{BACKEND} produced {} bytes", pdf.len());

        check_pdf(BACKEND, Bytes::from(pdf))
    }
}

/// TeX reports errors on lines starting with "! ".
fn first_latex_error(log: &str) -> Option<&str> {
    log.lines()
        .find(|line| line.starts_with("! "))
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SAMPLE_LATEX;

    #[test]
    fn test_first_latex_error() {
        let log = "This is pdfTeX\n(./main.tex\n! Undefined control sequence.\nl.3 \\foo\n! Emergency stop.";
        assert_eq!(
            first_latex_error(log),
            Some("! Undefined control sequence.")
        );
        assert_eq!(first_latex_error("Output written on main.pdf"), None);
    }

    #[tokio::test]
    async fn test_missing_binary_probe_is_false_and_render_transient() {
        let client = PdflatexClient::new("/nonexistent/bin/pdflatex");
        assert!(!client.probe().await);
        let err = client.render(SAMPLE_LATEX).await.unwrap_err();
        assert!(matches!(err, RenderFailure::Transient(_)));
    }

    #[cfg(unix)]
    fn fake_binary(dir: &std::path::Path, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-pdflatex");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_run_returns_pdf() {
        let bin_dir = tempfile::tempdir().unwrap();
        // The source file is the last argument; the PDF goes next to it.
        let binary = fake_binary(
            bin_dir.path(),
            "#!/bin/sh\nfor a; do last=\"$a\"; done\nprintf '%%PDF-1.4 fake' > \"$(dirname \"$last\")/main.pdf\"\n",
        );
        let bytes = PdflatexClient::new(binary).render(SAMPLE_LATEX).await.unwrap();
        assert_eq!(&bytes[..], b"%PDF-1.4 fake");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_latex_error_is_fatal() {
        let bin_dir = tempfile::tempdir().unwrap();
        let binary = fake_binary(
            bin_dir.path(),
            "#!/bin/sh\necho '! Undefined control sequence.'\nexit 1\n",
        );
        let err = PdflatexClient::new(binary)
            .render(SAMPLE_LATEX)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RenderFailure::Fatal("pdflatex: ! Undefined control sequence.".to_string())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_crash_without_latex_error_is_transient() {
        let bin_dir = tempfile::tempdir().unwrap();
        let binary = fake_binary(bin_dir.path(), "#!/bin/sh\nexit 137\n");
        let err = PdflatexClient::new(binary)
            .render(SAMPLE_LATEX)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderFailure::Transient(_)));
    }
}

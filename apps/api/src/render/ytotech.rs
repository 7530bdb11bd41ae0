//! LaTeX-on-HTTP (latex.ytotech.com) synchronous build endpoint.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;

use super::http::{classify_transport, read_pdf};
use super::{RenderClient, RenderFailure};

const BACKEND: &str = "ytotech";
pub const YTOTECH_API_URL: &str = "https://latex.ytotech.com/builds/sync";

#[derive(Clone)]
pub struct YtotechClient {
    http: Client,
    endpoint: String,
}

impl YtotechClient {
    pub fn new(http: Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl RenderClient for YtotechClient {
    async fn render(&self, body: &str) -> Result<Bytes, RenderFailure> {
        let resource = Part::text(body.to_string())
            .file_name("main.tex")
            .mime_str("text/plain")
            .map_err(|e| RenderFailure::Fatal(format!("{BACKEND}: could not build upload: {e}")))?;
        let form = Form::new()
            .text("compiler", "pdflatex")
            .part("resources", resource);

        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| classify_transport(BACKEND, e))?;

        read_pdf(BACKEND, response).await
    }
}

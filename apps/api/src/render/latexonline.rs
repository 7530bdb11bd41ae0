//! LaTeX.Online (latexonline.cc) compile-by-query endpoint.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;

use super::http::{classify_transport, read_pdf};
use super::{RenderClient, RenderFailure};

const BACKEND: &str = "latexonline";
pub const LATEXONLINE_API_URL: &str = "https://latexonline.cc/compile";

#[derive(Clone)]
pub struct LatexOnlineClient {
    http: Client,
    endpoint: String,
}

impl LatexOnlineClient {
    pub fn new(http: Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl RenderClient for LatexOnlineClient {
    async fn render(&self, body: &str) -> Result<Bytes, RenderFailure> {
        // Very long documents can exceed the service's URL limit; that surfaces as
        // a 414 and is classified fatal for this backend only.
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("text", body)])
            .send()
            .await
            .map_err(|e| classify_transport(BACKEND, e))?;

        read_pdf(BACKEND, response).await
    }
}

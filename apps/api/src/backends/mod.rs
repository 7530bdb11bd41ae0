pub mod catalog;
pub mod handlers;
pub mod registry;

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use tracing::{info, warn};

use crate::config::Config;
use crate::generation::{ClaudeClient, DeepSeekClient, GeminiClient, GenerationClient};
use crate::render::{LatexOnlineClient, PdflatexClient, RenderClient, YtotechClient};

pub use catalog::{parse_render_order, GenerationProvider, RenderService};
pub use registry::{BackendDescriptor, BackendKind, BackendRegistry, RegistryError};

/// The registry plus a client for every available backend, keyed by id.
pub struct Backends {
    pub registry: BackendRegistry,
    pub generators: HashMap<String, Arc<dyn GenerationClient>>,
    pub renderers: HashMap<String, Arc<dyn RenderClient>>,
}

/// Builds the backend catalog from configuration.
///
/// Generation backends are available when their credential is set. `pdflatex` is
/// available when the binary answers `--version`; the HTTP render services need
/// only a non-empty endpoint.
pub async fn from_config(config: &Config, http: &Client) -> Result<Backends, RegistryError> {
    let mut descriptors = Vec::new();
    let mut generators: HashMap<String, Arc<dyn GenerationClient>> = HashMap::new();
    let mut renderers: HashMap<String, Arc<dyn RenderClient>> = HashMap::new();

    for provider in GenerationProvider::ALL {
        let client: Option<Arc<dyn GenerationClient>> =
            config.generation_key(provider).map(|key| -> Arc<dyn GenerationClient> {
                let key = key.to_string();
                match provider {
                    GenerationProvider::Claude => Arc::new(ClaudeClient::new(http.clone(), key)),
                    GenerationProvider::Gemini => Arc::new(GeminiClient::new(http.clone(), key)),
                    GenerationProvider::DeepSeek => {
                        Arc::new(DeepSeekClient::new(http.clone(), key))
                    }
                }
            });

        let available = client.is_some();
        if let Some(client) = client {
            generators.insert(provider.id().to_string(), client);
        } else {
            warn!("Generation backend {provider} has no credential; listed as unavailable");
        }
        descriptors.push(BackendDescriptor::new(
            provider.id(),
            provider.display_name(),
            BackendKind::Generation,
            available,
        ));
    }

    for service in &config.render_backends {
        let client: Option<Arc<dyn RenderClient>> = match service {
            RenderService::Pdflatex => {
                let client = PdflatexClient::new(&config.pdflatex_path);
                if client.probe().await {
                    Some(Arc::new(client))
                } else {
                    warn!(
                        "pdflatex binary '{}' did not answer --version; listed as unavailable",
                        config.pdflatex_path
                    );
                    None
                }
            }
            RenderService::Ytotech => non_empty(&config.ytotech_endpoint)
                .map(|url| Arc::new(YtotechClient::new(http.clone(), url)) as Arc<dyn RenderClient>),
            RenderService::LatexOnline => non_empty(&config.latexonline_endpoint).map(|url| {
                Arc::new(LatexOnlineClient::new(http.clone(), url)) as Arc<dyn RenderClient>
            }),
        };

        let available = client.is_some();
        if let Some(client) = client {
            renderers.insert(service.id().to_string(), client);
        }
        descriptors.push(BackendDescriptor::new(
            service.id(),
            service.display_name(),
            BackendKind::Render,
            available,
        ));
    }

    let registry = BackendRegistry::new(descriptors)?;
    if registry.available(BackendKind::Render).next().is_none() {
        warn!("No render backend is available; every run will fail");
    }
    info!(
        "Backends: generation [{}], render order [{}]",
        summary(&registry, BackendKind::Generation),
        summary(&registry, BackendKind::Render)
    );

    Ok(Backends {
        registry,
        generators,
        renderers,
    })
}

fn non_empty(endpoint: &str) -> Option<&str> {
    Some(endpoint.trim()).filter(|e| !e.is_empty())
}

fn summary(registry: &BackendRegistry, kind: BackendKind) -> String {
    registry
        .list(kind)
        .iter()
        .map(|d| {
            if d.is_available {
                d.id.clone()
            } else {
                format!("{} (unavailable)", d.id)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

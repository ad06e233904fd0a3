use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::agents::{self, ChatCompletionClient, ResearchAgents};
use crate::apis::{self, PaperSource, SourceError, SourceId};
use crate::pipeline::{ResearchError, ResearchPipeline, DEFAULT_CONCURRENCY};

pub const UNCONFIGURED_MESSAGE: &str =
    "GROQ_API_KEY is not configured. Please set it in your environment variables.";

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub model_base_url: String,
    pub enabled_sources: Vec<SourceId>,
    pub bind_addr: SocketAddr,
    pub fetch_timeout: Duration,
    pub model_timeout: Duration,
    pub concurrency: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let api_key = get("GROQ_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        let model = get("PAPER_DIGEST_MODEL").unwrap_or_else(|| agents::DEFAULT_MODEL.to_string());
        let model_base_url =
            get("PAPER_DIGEST_MODEL_URL").unwrap_or_else(|| agents::DEFAULT_BASE_URL.to_string());

        let enabled_sources = match get("PAPER_DIGEST_SOURCES") {
            Some(list) => {
                let mut ids = Vec::new();
                for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    match SourceId::parse(name) {
                        Some(id) if !ids.contains(&id) => ids.push(id),
                        Some(_) => {}
                        None => tracing::warn!("Ignoring unknown source '{}' in PAPER_DIGEST_SOURCES", name),
                    }
                }
                ids
            }
            None => SourceId::ALL.to_vec(),
        };

        let fallback_addr = SocketAddr::from(([127, 0, 0, 1], 8000));
        let bind_addr = parse_or(&get, "PAPER_DIGEST_BIND", fallback_addr);

        Self {
            api_key,
            model,
            model_base_url,
            enabled_sources,
            bind_addr,
            fetch_timeout: Duration::from_secs(parse_or(&get, "PAPER_DIGEST_FETCH_TIMEOUT_SECS", 10)),
            model_timeout: Duration::from_secs(parse_or(&get, "PAPER_DIGEST_MODEL_TIMEOUT_SECS", 60)),
            concurrency: parse_or(&get, "PAPER_DIGEST_CONCURRENCY", DEFAULT_CONCURRENCY).max(1),
        }
    }

    /// Build the enabled paper sources in their configured order.
    pub fn build_sources(&self) -> Result<Vec<Arc<dyn PaperSource>>, SourceError> {
        let mut sources: Vec<Arc<dyn PaperSource>> = Vec::new();
        for id in &self.enabled_sources {
            match id {
                SourceId::ArXiv => {
                    sources.push(Arc::new(apis::arxiv::ArxivClient::new(self.fetch_timeout)?));
                }
                SourceId::GoogleScholar => {
                    sources.push(Arc::new(apis::scholar::ScholarClient::new(self.fetch_timeout)?));
                }
            }
        }
        Ok(sources)
    }

    /// Build the model-backed agents. Fails when no credential is set.
    pub fn build_agents(&self) -> Result<ResearchAgents, ResearchError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ResearchError::Unconfigured(UNCONFIGURED_MESSAGE.to_string()))?;
        let client = ChatCompletionClient::new(
            api_key.clone(),
            self.model.clone(),
            self.model_base_url.clone(),
            self.model_timeout,
        )
        .map_err(|e| ResearchError::Unconfigured(format!("Failed to initialize AI agents: {}", e)))?;
        Ok(ResearchAgents::new(Arc::new(client)))
    }

    pub fn build_pipeline(&self) -> Result<ResearchPipeline, ResearchError> {
        let agents = self.build_agents()?;
        let sources = self
            .build_sources()
            .map_err(|e| ResearchError::Unconfigured(format!("Failed to initialize data loader: {}", e)))?;
        Ok(ResearchPipeline::new(sources, Arc::new(agents))
            .with_concurrency(self.concurrency)
            // Two sequential model calls per paper.
            .with_enrich_timeout(self.model_timeout * 2 + Duration::from_secs(5)))
    }

    /// Return a status entry for every known source.
    pub fn source_status(&self) -> Vec<SourceStatus> {
        SourceId::ALL
            .iter()
            .map(|id| {
                let enabled = self.enabled_sources.contains(id);
                let note = match (enabled, id) {
                    (false, _) => "Disabled by PAPER_DIGEST_SOURCES filter",
                    (true, SourceId::ArXiv) => "Public Atom API, no API key required",
                    (true, SourceId::GoogleScholar) => "HTML scraping, capped at 5 results",
                };
                SourceStatus {
                    name: id.display_name().to_string(),
                    enabled,
                    note: note.to_string(),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub enabled: bool,
    pub note: String,
}

fn parse_or<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match get(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value '{}' for {}, using default", raw, key);
            default
        }),
    }
}

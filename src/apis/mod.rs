pub mod arxiv;
pub mod scholar;

use std::fmt;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// A raw, unenriched paper record as returned by one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub title: String,
    pub abstract_text: String,
    pub link: String,
}

/// Identifier of an external paper provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceId {
    ArXiv,
    GoogleScholar,
}

impl SourceId {
    pub const ALL: [SourceId; 2] = [SourceId::ArXiv, SourceId::GoogleScholar];

    /// Parse a user-supplied source name. Accepts the display names
    /// ("ArXiv", "Google Scholar") as well as "GoogleScholar" and
    /// "google_scholar", ignoring case. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "arxiv" => Some(SourceId::ArXiv),
            "googlescholar" | "scholar" => Some(SourceId::GoogleScholar),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SourceId::ArXiv => "ArXiv",
            SourceId::GoogleScholar => "Google Scholar",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl Serialize for SourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.display_name())
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected status code: {0}")]
    Status(u16),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Request blocked by provider: {0}")]
    Blocked(String),
}

#[async_trait]
pub trait PaperSource: Send + Sync {
    fn id(&self) -> SourceId;

    /// Query the provider. Entries that fail to parse are skipped; only
    /// transport-level or whole-response failures are returned as errors.
    async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<Candidate>, SourceError>;

    /// Like [`PaperSource::search`] but absorbs every failure into an
    /// empty result.
    async fn fetch(&self, query: &str, limit: Option<usize>) -> Vec<Candidate> {
        match self.search(query, limit).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!("Source {} failed for query '{}': {}", self.id(), query, e);
                Vec::new()
            }
        }
    }
}

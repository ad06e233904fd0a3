use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::apis::Candidate;

pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

const SUMMARIZER_PROMPT: &str = "Summarize the retrieved research papers and present concise summaries to the user. \
     Give only the relevant summary of the research paper, not your thought process.";
const ANALYZER_PROMPT: &str = "Analyze the summaries of the research papers and provide a list of advantages and \
     disadvantages for each paper in a pointwise format. Give only the advantages and disadvantages, \
     not your thought process.";

pub const NO_SUMMARY: &str = "No summary available for this paper.";
pub const NO_ANALYSIS: &str = "No analysis available for this paper.";
const SUMMARY_FALLBACK: &str = "Summarization failed!";
const ANALYSIS_FALLBACK: &str = "Advantages and disadvantages analysis failed!";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model backend unavailable: {0}")]
    Unavailable(#[from] reqwest::Error),
    #[error("model backend returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed model response: {0}")]
    Malformed(String),
}

/// Reply from the model backend. Most backends return plain text, some
/// return a structured message object instead.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Text(String),
    Structured(Value),
}

impl ModelReply {
    /// The reply text, if the reply carries any.
    pub fn text(&self) -> Option<&str> {
        match self {
            ModelReply::Text(text) => Some(text),
            ModelReply::Structured(value) => value.get("content").and_then(Value::as_str),
        }
    }

    pub fn text_or(&self, fallback: &str) -> String {
        self.text().unwrap_or(fallback).to_string()
    }
}

/// Text-in, text-out completion capability.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<ModelReply, ModelError>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl ChatCompletionClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent("paper-digest/0.1")
                .timeout(timeout)
                .build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl CompletionModel for ChatCompletionClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<ModelReply, ModelError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
        });
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let body: String = text.chars().take(400).collect();
            return Err(ModelError::Api { status: status.as_u16(), body });
        }

        let value: Value = resp.json().await?;
        let message = value
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or_else(|| ModelError::Malformed("response has no choices[0].message".into()))?;

        Ok(match message.get("content").and_then(Value::as_str) {
            Some(content) => ModelReply::Text(content.trim().to_string()),
            None => ModelReply::Structured(message.clone()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub summary: String,
    pub critique: String,
}

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("enrichment failed: {0}")]
    Failed(String),
    #[error("enrichment timed out")]
    TimedOut,
}

/// Per-paper enrichment step used by the pipeline.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, candidate: &Candidate) -> Result<Enrichment, EnrichmentError>;
}

/// Summarizer and pros/cons analyzer sharing one model backend.
///
/// Neither agent propagates backend failures: an error becomes a
/// descriptive string in place of the generated text.
#[derive(Clone)]
pub struct ResearchAgents {
    model: Arc<dyn CompletionModel>,
}

impl ResearchAgents {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model }
    }

    pub async fn summarize(&self, abstract_text: &str) -> String {
        if abstract_text.trim().is_empty() {
            return NO_SUMMARY.to_string();
        }
        let prompt = format!("Summarize this paper: {}", abstract_text);
        match self.model.complete(SUMMARIZER_PROMPT, &prompt).await {
            Ok(reply) => reply.text_or(SUMMARY_FALLBACK),
            Err(e) => {
                tracing::warn!("Summarizer call failed: {}", e);
                format!("Error generating summary: {}", e)
            }
        }
    }

    pub async fn analyze_pros_cons(&self, summary: &str) -> String {
        if summary.trim().is_empty() {
            return NO_ANALYSIS.to_string();
        }
        let prompt = format!("Provide advantages and disadvantages for this paper: {}", summary);
        match self.model.complete(ANALYZER_PROMPT, &prompt).await {
            Ok(reply) => reply.text_or(ANALYSIS_FALLBACK),
            Err(e) => {
                tracing::warn!("Pros/cons analyzer call failed: {}", e);
                format!("Error generating analysis: {}", e)
            }
        }
    }
}

#[async_trait]
impl Enricher for ResearchAgents {
    async fn enrich(&self, candidate: &Candidate) -> Result<Enrichment, EnrichmentError> {
        let summary = self.summarize(&candidate.abstract_text).await;
        let critique = self.analyze_pros_cons(&summary).await;
        Ok(Enrichment { summary, critique })
    }
}

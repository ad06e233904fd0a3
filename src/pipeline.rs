use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agents::{EnrichmentError, Enricher};
use crate::apis::{Candidate, PaperSource, SourceId};

pub const DEFAULT_NUM_RESULTS: u32 = 5;
pub const MAX_NUM_RESULTS: u32 = 50;
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_ENRICH_TIMEOUT: Duration = Duration::from_secs(180);

const ERROR_SUMMARY: &str = "Error processing this paper";
const ERROR_CRITIQUE: &str = "Analysis failed for this paper";
const NO_TITLE: &str = "No title available";
const NO_LINK: &str = "No link available";

fn default_sources() -> Vec<String> {
    SourceId::ALL.iter().map(|s| s.display_name().to_string()).collect()
}

fn default_num_results() -> u32 {
    DEFAULT_NUM_RESULTS
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResearchQuery {
    /// Research topic to search for
    pub query: String,
    /// Sources to search ("ArXiv", "Google Scholar")
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,
    /// Number of results to keep per source
    #[serde(default = "default_num_results")]
    pub num_results: u32,
}

impl ResearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            sources: default_sources(),
            num_results: DEFAULT_NUM_RESULTS,
        }
    }

    pub fn with_sources(mut self, sources: &[&str]) -> Self {
        self.sources = sources.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_num_results(mut self, num_results: u32) -> Self {
        self.num_results = num_results;
        self
    }

    /// Recognised sources in request order, without duplicates.
    pub fn source_ids(&self) -> Vec<SourceId> {
        let mut ids = Vec::new();
        for name in &self.sources {
            match SourceId::parse(name) {
                Some(id) if !ids.contains(&id) => ids.push(id),
                Some(_) => {}
                None => tracing::debug!("Ignoring unknown source '{}'", name),
            }
        }
        ids
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedPaper {
    pub title: String,
    pub link: String,
    pub summary: String,
    #[serde(rename = "advantages_disadvantages")]
    pub critique: String,
}

impl EnrichedPaper {
    fn new(candidate: Candidate, summary: String, critique: String) -> Self {
        let title = if candidate.title.trim().is_empty() { NO_TITLE.to_string() } else { candidate.title };
        let link = if candidate.link.trim().is_empty() { NO_LINK.to_string() } else { candidate.link };
        Self { title, link, summary, critique }
    }

    fn placeholder(candidate: Candidate) -> Self {
        Self::new(candidate, ERROR_SUMMARY.to_string(), ERROR_CRITIQUE.to_string())
    }
}

/// Aggregate response for one research request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResearchResult {
    papers: Vec<EnrichedPaper>,
    #[serde(rename = "total_papers")]
    total: usize,
    query: String,
    sources_used: Vec<SourceId>,
}

impl ResearchResult {
    fn new(papers: Vec<EnrichedPaper>, query: String, sources_used: Vec<SourceId>) -> Self {
        Self { total: papers.len(), papers, query, sources_used }
    }

    pub fn papers(&self) -> &[EnrichedPaper] {
        &self.papers
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn sources_used(&self) -> &[SourceId] {
        &self.sources_used
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResearchError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("{0}")]
    Unconfigured(String),
    #[error("No papers found for query: {query}. Please try a different search term.")]
    NoResults { query: String },
    #[error("An unexpected error occurred while processing the research query: {0}")]
    Unexpected(String),
}

/// Fetch-and-enrich orchestrator.
///
/// Failures are contained per source (zero results) and per paper
/// (placeholder text); only an empty merge or an internal fault fails
/// the request.
pub struct ResearchPipeline {
    sources: Vec<Arc<dyn PaperSource>>,
    enricher: Arc<dyn Enricher>,
    concurrency: usize,
    enrich_timeout: Duration,
}

impl ResearchPipeline {
    pub fn new(sources: Vec<Arc<dyn PaperSource>>, enricher: Arc<dyn Enricher>) -> Self {
        Self {
            sources,
            enricher,
            concurrency: DEFAULT_CONCURRENCY,
            enrich_timeout: DEFAULT_ENRICH_TIMEOUT,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_enrich_timeout(mut self, timeout: Duration) -> Self {
        self.enrich_timeout = timeout;
        self
    }

    pub async fn run(&self, request: &ResearchQuery) -> Result<ResearchResult, ResearchError> {
        let topic = request.query.trim();
        if topic.is_empty() {
            return Err(ResearchError::InvalidQuery("query must not be empty".into()));
        }
        if request.num_results == 0 {
            return Err(ResearchError::InvalidQuery("num_results must be at least 1".into()));
        }
        let limit = request.num_results.min(MAX_NUM_RESULTS) as usize;

        let requested = request.source_ids();
        let active: Vec<_> = self
            .sources
            .iter()
            .filter(|s| requested.contains(&s.id()))
            .cloned()
            .collect();
        let sources_used: Vec<SourceId> = requested
            .into_iter()
            .filter(|id| active.iter().any(|s| s.id() == *id))
            .collect();

        tracing::info!(
            "Processing research query '{}' from sources {:?}",
            topic,
            sources_used.iter().map(|s| s.display_name()).collect::<Vec<_>>()
        );

        let candidates = fetch_all(&active, topic, limit).await;
        if candidates.is_empty() {
            tracing::warn!("No papers found for query: {}", request.query);
            return Err(ResearchError::NoResults { query: request.query.clone() });
        }

        let papers = self.enrich_all(candidates).await;
        tracing::info!("Processed {} papers for query '{}'", papers.len(), topic);

        Ok(ResearchResult::new(papers, request.query.clone(), sources_used))
    }

    /// Run the pipeline on its own task so a panic inside it surfaces as
    /// [`ResearchError::Unexpected`] instead of tearing down the caller.
    pub async fn spawn_run(self: &Arc<Self>, request: ResearchQuery) -> Result<ResearchResult, ResearchError> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.run(&request).await })
            .await
            .map_err(|e| {
                tracing::error!("Research task failed: {}", e);
                ResearchError::Unexpected(e.to_string())
            })?
    }

    async fn enrich_all(&self, candidates: Vec<Candidate>) -> Vec<EnrichedPaper> {
        let total = candidates.len();
        let mut tagged: Vec<(usize, EnrichedPaper)> = stream::iter(candidates.into_iter().enumerate())
            .map(|(position, candidate)| {
                let enricher = Arc::clone(&self.enricher);
                let timeout = self.enrich_timeout;
                async move {
                    tracing::debug!("Processing paper {}/{}: {}", position + 1, total, candidate.title);
                    (position, enrich_one(enricher, candidate, timeout).await)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        tagged.sort_by_key(|(position, _)| *position);
        tagged.into_iter().map(|(_, paper)| paper).collect()
    }
}

/// Query the active sources concurrently and merge in source order.
/// A source that errors or panics contributes nothing.
async fn fetch_all(sources: &[Arc<dyn PaperSource>], topic: &str, limit: usize) -> Vec<Candidate> {
    let handles: Vec<_> = sources
        .iter()
        .map(|source| {
            let source = Arc::clone(source);
            let topic = topic.to_string();
            (source.id(), tokio::spawn(async move { source.fetch(&topic, Some(limit)).await }))
        })
        .collect();

    let mut merged = Vec::new();
    for (id, handle) in handles {
        match handle.await {
            Ok(mut found) => {
                found.truncate(limit);
                tracing::info!("Found {} papers from {}", found.len(), id);
                merged.extend(found);
            }
            Err(e) => tracing::warn!("Source task for {} panicked: {}", id, e),
        }
    }
    merged
}

async fn enrich_one(enricher: Arc<dyn Enricher>, candidate: Candidate, timeout: Duration) -> EnrichedPaper {
    let input = candidate.clone();
    let mut task = tokio::spawn(async move { enricher.enrich(&input).await });

    let outcome = match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(EnrichmentError::Failed(e.to_string())),
        Err(_) => {
            task.abort();
            Err(EnrichmentError::TimedOut)
        }
    };

    match outcome {
        Ok(enrichment) => EnrichedPaper::new(candidate, enrichment.summary, enrichment.critique),
        Err(e) => {
            tracing::warn!("Error processing paper '{}': {}", candidate.title, e);
            EnrichedPaper::placeholder(candidate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Enrichment;
    use crate::apis::SourceError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn candidate(title: &str) -> Candidate {
        Candidate {
            title: title.to_string(),
            abstract_text: format!("abstract of {}", title),
            link: format!("https://example.org/{}", title),
        }
    }

    struct StaticSource {
        id: SourceId,
        papers: Vec<Candidate>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl StaticSource {
        fn new(id: SourceId, titles: &[&str]) -> Self {
            Self {
                id,
                papers: titles.iter().map(|t| candidate(t)).collect(),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl PaperSource for StaticSource {
        fn id(&self) -> SourceId {
            self.id
        }

        async fn search(&self, _query: &str, _limit: Option<usize>) -> Result<Vec<Candidate>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(self.papers.clone())
        }
    }

    struct FailingSource(SourceId);

    #[async_trait]
    impl PaperSource for FailingSource {
        fn id(&self) -> SourceId {
            self.0
        }

        async fn search(&self, _query: &str, _limit: Option<usize>) -> Result<Vec<Candidate>, SourceError> {
            Err(SourceError::Parse("garbage".into()))
        }
    }

    /// Deterministic enricher. Titles starting with "fail" return an error,
    /// "panic" panics and "slow" never finishes in time.
    #[derive(Default)]
    struct EchoEnricher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Enricher for EchoEnricher {
        async fn enrich(&self, candidate: &Candidate) -> Result<Enrichment, EnrichmentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if candidate.title.starts_with("fail") {
                return Err(EnrichmentError::Failed("model exploded".into()));
            }
            if candidate.title.starts_with("panic") {
                panic!("enricher bug");
            }
            if candidate.title.starts_with("slow") {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            // Later papers finish first to exercise reordering.
            let n = candidate.title.len() as u64;
            tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(n * 3))).await;
            Ok(Enrichment {
                summary: format!("summary: {}", candidate.abstract_text),
                critique: format!("critique: {}", candidate.title),
            })
        }
    }

    fn pipeline(sources: Vec<Arc<dyn PaperSource>>, enricher: Arc<EchoEnricher>) -> ResearchPipeline {
        ResearchPipeline::new(sources, enricher)
            .with_concurrency(4)
            .with_enrich_timeout(Duration::from_millis(500))
    }

    fn titles(result: &ResearchResult) -> Vec<&str> {
        result.papers().iter().map(|p| p.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_merges_in_source_order() {
        let arxiv = StaticSource::new(SourceId::ArXiv, &["P1", "P2"]).delayed(Duration::from_millis(50));
        let scholar = StaticSource::new(SourceId::GoogleScholar, &["P3"]);
        let enricher = Arc::new(EchoEnricher::default());
        let p = pipeline(vec![Arc::new(arxiv), Arc::new(scholar)], enricher);

        let result = p
            .run(&ResearchQuery::new("transformers").with_sources(&["ArXiv", "Google Scholar"]))
            .await
            .unwrap();
        assert_eq!(titles(&result), vec!["P1", "P2", "P3"]);
        assert_eq!(result.total(), 3);
        assert_eq!(result.sources_used(), &[SourceId::ArXiv, SourceId::GoogleScholar]);
        assert_eq!(result.papers()[0].summary, "summary: abstract of P1");
        assert_eq!(result.papers()[2].critique, "critique: P3");
    }

    #[tokio::test]
    async fn test_order_preserved_under_concurrency() {
        let names: Vec<String> = (1..=9).map(|i| "x".repeat(i)).collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let source = StaticSource::new(SourceId::ArXiv, &refs);
        let p = pipeline(vec![Arc::new(source)], Arc::new(EchoEnricher::default())).with_concurrency(8);

        let result = p
            .run(&ResearchQuery::new("q").with_sources(&["ArXiv"]).with_num_results(9))
            .await
            .unwrap();
        assert_eq!(titles(&result), refs);
    }

    #[tokio::test]
    async fn test_truncates_to_num_results() {
        let source = StaticSource::new(SourceId::ArXiv, &["A", "B", "C"]);
        let p = pipeline(vec![Arc::new(source)], Arc::new(EchoEnricher::default()));

        let result = p
            .run(&ResearchQuery::new("transformers").with_sources(&["ArXiv"]).with_num_results(2))
            .await
            .unwrap();
        assert_eq!(titles(&result), vec!["A", "B"]);
        assert_eq!(result.total(), 2);
    }

    #[tokio::test]
    async fn test_no_results_skips_enrichment() {
        let empty = StaticSource::new(SourceId::ArXiv, &[]);
        let enricher = Arc::new(EchoEnricher::default());
        let p = pipeline(
            vec![Arc::new(empty), Arc::new(FailingSource(SourceId::GoogleScholar))],
            enricher.clone(),
        );

        let err = p.run(&ResearchQuery::new("nothing here")).await.unwrap_err();
        assert_eq!(err, ResearchError::NoResults { query: "nothing here".into() });
        assert!(err.to_string().contains("nothing here"));
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_source_does_not_block_siblings() {
        let scholar = StaticSource::new(SourceId::GoogleScholar, &["S1"]);
        let p = pipeline(
            vec![Arc::new(FailingSource(SourceId::ArXiv)), Arc::new(scholar)],
            Arc::new(EchoEnricher::default()),
        );

        let result = p.run(&ResearchQuery::new("q")).await.unwrap();
        assert_eq!(titles(&result), vec!["S1"]);
    }

    #[tokio::test]
    async fn test_enrichment_failures_degrade_not_drop() {
        let source = StaticSource::new(SourceId::ArXiv, &["ok1", "fail", "panic", "slow", "ok2"]);
        let p = pipeline(vec![Arc::new(source)], Arc::new(EchoEnricher::default()));

        let result = p.run(&ResearchQuery::new("q").with_sources(&["arxiv"])).await.unwrap();
        assert_eq!(result.total(), 5);
        assert_eq!(titles(&result), vec!["ok1", "fail", "panic", "slow", "ok2"]);
        for paper in &result.papers()[1..4] {
            assert_eq!(paper.summary, ERROR_SUMMARY);
            assert_eq!(paper.critique, ERROR_CRITIQUE);
            assert!(paper.link.starts_with("https://example.org/"));
        }
        assert_eq!(result.papers()[0].critique, "critique: ok1");
        assert_eq!(result.papers()[4].critique, "critique: ok2");
    }

    #[tokio::test]
    async fn test_run_is_idempotent() {
        let a = StaticSource::new(SourceId::ArXiv, &["P1", "P2"]);
        let b = StaticSource::new(SourceId::GoogleScholar, &["P3"]);
        let p = pipeline(vec![Arc::new(a), Arc::new(b)], Arc::new(EchoEnricher::default()));
        let query = ResearchQuery::new("transformers");

        let first = p.run(&query).await.unwrap();
        let second = p.run(&query).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unknown_and_unrequested_sources() {
        let arxiv = Arc::new(StaticSource::new(SourceId::ArXiv, &["A"]));
        let scholar = Arc::new(StaticSource::new(SourceId::GoogleScholar, &["S"]));
        let p = pipeline(vec![arxiv.clone(), scholar.clone()], Arc::new(EchoEnricher::default()));

        let result = p
            .run(&ResearchQuery::new("q").with_sources(&["PubMed", "GoogleScholar", "google_scholar"]))
            .await
            .unwrap();
        assert_eq!(titles(&result), vec!["S"]);
        assert_eq!(result.sources_used(), &[SourceId::GoogleScholar]);
        assert_eq!(arxiv.calls.load(Ordering::SeqCst), 0);
        assert_eq!(scholar.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_validation() {
        let p = pipeline(vec![], Arc::new(EchoEnricher::default()));
        assert!(matches!(
            p.run(&ResearchQuery::new("   ")).await,
            Err(ResearchError::InvalidQuery(_))
        ));
        assert!(matches!(
            p.run(&ResearchQuery::new("q").with_num_results(0)).await,
            Err(ResearchError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_spawn_run() {
        let source = StaticSource::new(SourceId::ArXiv, &["A"]);
        let p = Arc::new(pipeline(vec![Arc::new(source)], Arc::new(EchoEnricher::default())));
        let result = p.spawn_run(ResearchQuery::new("q")).await.unwrap();
        assert_eq!(result.total(), 1);
    }

    struct BrokenId;

    #[async_trait]
    impl PaperSource for BrokenId {
        fn id(&self) -> SourceId {
            panic!("source registry corrupted")
        }

        async fn search(&self, _query: &str, _limit: Option<usize>) -> Result<Vec<Candidate>, SourceError> {
            Ok(vec![candidate("never")])
        }
    }

    #[tokio::test]
    async fn test_spawn_run_panic_is_unexpected() {
        let enricher = Arc::new(EchoEnricher::default());
        let p = Arc::new(pipeline(vec![Arc::new(BrokenId)], enricher.clone()));
        match p.spawn_run(ResearchQuery::new("q")).await {
            Err(ResearchError::Unexpected(msg)) => assert!(msg.contains("panicked")),
            other => panic!("expected Unexpected, got {:?}", other),
        }
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_query_defaults() {
        let q: ResearchQuery = serde_json::from_str(r#"{"query": "transformers"}"#).unwrap();
        assert_eq!(q.num_results, DEFAULT_NUM_RESULTS);
        assert_eq!(q.source_ids(), SourceId::ALL.to_vec());
    }

    #[test]
    fn test_result_serialization() {
        let result = ResearchResult::new(
            vec![EnrichedPaper::placeholder(Candidate {
                title: String::new(),
                abstract_text: String::new(),
                link: "https://example.org".into(),
            })],
            "q".into(),
            vec![SourceId::GoogleScholar],
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["total_papers"], 1);
        assert_eq!(json["sources_used"][0], "Google Scholar");
        assert_eq!(json["papers"][0]["title"], NO_TITLE);
        assert_eq!(json["papers"][0]["advantages_disadvantages"], ERROR_CRITIQUE);
    }
}

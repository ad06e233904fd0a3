use std::time::Duration;

use super::{Candidate, PaperSource, SourceError, SourceId};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

const BASE_URL: &str = "https://scholar.google.com";

/// Hard cap on results taken from a results page, independent of the
/// caller's requested limit.
pub const MAX_RESULTS: usize = 5;

const NO_TITLE: &str = "No title available";
const NO_SUMMARY: &str = "No summary available";
const NO_LINK: &str = "No link available";

pub struct ScholarClient {
    client: reqwest::Client,
    base_url: String,
}

impl ScholarClient {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        Self::with_base_url(BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent("Mozilla/5.0 (compatible; paper-digest/0.1)")
                .timeout(timeout)
                .build()?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl PaperSource for ScholarClient {
    fn id(&self) -> SourceId {
        SourceId::GoogleScholar
    }

    /// The requested limit is ignored; at most [`MAX_RESULTS`] are returned.
    async fn search(&self, query: &str, _limit: Option<usize>) -> Result<Vec<Candidate>, SourceError> {
        let url = format!("{}/scholar", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("q", query), ("hl", "en")])
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(SourceError::Blocked("rate limited".into()));
        }
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let html = resp.text().await?;
        if html.contains("gs_captcha") || html.contains("id=\"recaptcha\"") {
            return Err(SourceError::Blocked("captcha challenge".into()));
        }
        parse_results_page(&html)
    }
}

struct Selectors {
    result: Selector,
    body: Selector,
    title: Selector,
    title_link: Selector,
    snippet: Selector,
}

impl Selectors {
    fn new() -> Result<Self, SourceError> {
        let parse = |css: &str| Selector::parse(css).map_err(|e| SourceError::Parse(format!("{:?}", e)));
        Ok(Self {
            result: parse("div.gs_r.gs_or")?,
            body: parse("div.gs_ri")?,
            title: parse("h3.gs_rt")?,
            title_link: parse("h3.gs_rt a[href]")?,
            snippet: parse("div.gs_rs")?,
        })
    }
}

/// Walk result blocks lazily, stopping after [`MAX_RESULTS`] blocks.
/// A block that cannot be read is skipped but still counts toward the cap.
fn parse_results_page(html: &str) -> Result<Vec<Candidate>, SourceError> {
    let document = Html::parse_document(html);
    let selectors = Selectors::new()?;

    let candidates = document
        .select(&selectors.result)
        .take(MAX_RESULTS)
        .filter_map(|block| match extract_candidate(block, &selectors) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                tracing::debug!("Skipping Google Scholar result: {}", e);
                None
            }
        })
        .collect();
    Ok(candidates)
}

fn extract_candidate(block: ElementRef<'_>, selectors: &Selectors) -> Result<Candidate, SourceError> {
    let body = block
        .select(&selectors.body)
        .next()
        .ok_or_else(|| SourceError::Parse("result block has no bibliographic body".into()))?;

    let title = body
        .select(&selectors.title)
        .next()
        .map(|h3| strip_markers(&element_text(h3)))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| NO_TITLE.to_string());

    let abstract_text = body
        .select(&selectors.snippet)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NO_SUMMARY.to_string());

    let link = body
        .select(&selectors.title_link)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
        .unwrap_or_else(|| NO_LINK.to_string());

    Ok(Candidate { title, abstract_text, link })
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Remove leading type markers such as "[PDF]" or "[CITATION][C]".
fn strip_markers(title: &str) -> String {
    let mut rest = title.trim_start();
    while rest.starts_with('[') {
        match rest.find(']') {
            Some(end) => rest = rest[end + 1..].trim_start(),
            None => break,
        }
    }
    rest.trim().to_string()
}

use std::time::Duration;

use super::{Candidate, PaperSource, SourceError, SourceId};
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;

const BASE_URL: &str = "https://export.arxiv.org/api/query";

/// Raw entries requested from the API before truncating to the caller's limit.
const DEFAULT_MAX_RESULTS: usize = 10;

pub struct ArxivClient {
    client: reqwest::Client,
    base_url: String,
}

impl ArxivClient {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        Self::with_base_url(BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent("paper-digest/0.1")
                .timeout(timeout)
                .build()?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl PaperSource for ArxivClient {
    fn id(&self) -> SourceId {
        SourceId::ArXiv
    }

    async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<Candidate>, SourceError> {
        let max_results = limit
            .map_or(DEFAULT_MAX_RESULTS, |l| l.max(DEFAULT_MAX_RESULTS))
            .to_string();
        let search_query = format!("all:{}", query);
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("search_query", search_query.as_str()),
                ("start", "0"),
                ("max_results", max_results.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let mut candidates = parse_atom_feed(&resp.text().await?);
        if let Some(limit) = limit {
            candidates.truncate(limit);
        }
        Ok(candidates)
    }
}

#[derive(Default)]
struct EntryFields {
    title: Option<String>,
    summary: Option<String>,
    id: Option<String>,
}

impl EntryFields {
    fn push_text(&mut self, tag: &str, text: &str) {
        let slot = match tag {
            "title" => &mut self.title,
            "summary" => &mut self.summary,
            "id" => &mut self.id,
            _ => return,
        };
        slot.get_or_insert_with(String::new).push_str(text);
    }

    /// All three fields must be present and non-blank.
    fn into_candidate(self) -> Option<Candidate> {
        let title = collapse_whitespace(&self.title?);
        let abstract_text = collapse_whitespace(&self.summary?);
        let link = self.id?.trim().to_string();
        if title.is_empty() || abstract_text.is_empty() || link.is_empty() {
            return None;
        }
        Some(Candidate { title, abstract_text, link })
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse an Atom feed into candidates, field by field.
///
/// Incomplete entries are skipped. A malformed document stops the parse
/// but keeps whatever entries were completed before the error.
fn parse_atom_feed(xml: &str) -> Vec<Candidate> {
    let mut reader = Reader::from_str(xml);
    let mut candidates = Vec::new();
    let mut entry: Option<EntryFields> = None;
    let mut current_tag = String::new();
    let mut skipped = 0usize;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if tag == "entry" {
                    entry = Some(EntryFields::default());
                    current_tag.clear();
                } else if entry.is_some() {
                    current_tag = tag;
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(fields) = entry.as_mut() {
                    let text = e.unescape().unwrap_or_default();
                    fields.push_text(&current_tag, &text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(fields) = entry.as_mut() {
                    fields.push_text(&current_tag, &String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::End(e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if tag == "entry" {
                    if let Some(fields) = entry.take() {
                        match fields.into_candidate() {
                            Some(candidate) => candidates.push(candidate),
                            None => skipped += 1,
                        }
                    }
                }
                if tag == current_tag {
                    current_tag.clear();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::warn!(
                    "arXiv feed parse error after {} entries: {}",
                    candidates.len(),
                    e
                );
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    if skipped > 0 {
        tracing::debug!("Skipped {} arXiv entries with missing fields", skipped);
    }
    candidates
}

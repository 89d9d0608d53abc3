use std::sync::OnceLock;
use std::time::Duration;

use feed_rs::model::Entry;
use feed_rs::parser;
use regex::Regex;
use reqwest::Client;

use crate::error::{FetchError, Result};
use crate::models::join_list;
use crate::normalize::Normalizer;

use super::github::classify_status;
use super::{RawRecord, SourceAdapter, Target};

pub const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";

fn pdf_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://arxiv\.org/pdf/").expect("valid pdf link pattern"))
}

/// Newest submissions per category from the arXiv Atom API.
pub struct ArxivAdapter {
    client: Client,
    api_base: String,
    max_results: u32,
    per_category_cap: usize,
}

impl ArxivAdapter {
    pub fn new(
        api_base: impl Into<String>,
        max_results: u32,
        per_category_cap: usize,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("ai-infra-tracker/1.0")
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into(),
            max_results,
            per_category_cap,
        })
    }

    fn query_url(&self, category: &str) -> String {
        format!(
            "{}?search_query=cat:{}&start=0&max_results={}&sortBy=submittedDate&sortOrder=descending",
            self.api_base, category, self.max_results
        )
    }
}

impl SourceAdapter for ArxivAdapter {
    fn label(&self) -> &str {
        "arXiv"
    }

    fn normalizer(&self) -> Normalizer {
        Normalizer::Paper
    }

    async fn fetch_candidates(
        &mut self,
        target: &Target,
    ) -> std::result::Result<Vec<RawRecord>, FetchError> {
        let response = self.client.get(self.query_url(&target.locator)).send().await?;
        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }

        let bytes = response.bytes().await?;
        let papers = extract_entries(&bytes, self.per_category_cap)?;
        tracing::debug!("{} usable entries in {}", papers.len(), target.name);
        Ok(papers)
    }
}

/// Looks at the first `cap` entries only. Entries without a title or a PDF
/// link are skipped.
pub fn extract_entries(
    bytes: &[u8],
    cap: usize,
) -> std::result::Result<Vec<RawRecord>, FetchError> {
    let feed = parser::parse(bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

    Ok(feed
        .entries
        .into_iter()
        .take(cap)
        .filter_map(entry_to_raw)
        .collect())
}

fn entry_to_raw(entry: Entry) -> Option<RawRecord> {
    let title = entry
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())?;
    let pdf_url = entry
        .links
        .iter()
        .map(|l| l.href.as_str())
        .find(|href| pdf_link_re().is_match(href))?
        .to_string();

    let authors: Vec<&str> = entry.authors.iter().map(|a| a.name.as_str()).collect();
    let categories: Vec<&str> = entry.categories.iter().map(|c| c.term.as_str()).collect();

    let mut raw = RawRecord::new()
        .with("title", title)
        .with("pdf_url", pdf_url)
        .with("authors", join_list(&authors, ", "))
        .with("categories", join_list(&categories, ","));
    if let Some(published) = entry.published {
        raw.insert("published", published.to_rfc3339());
    }
    if let Some(summary) = entry.summary {
        raw.insert("abstract", summary.content.trim().to_string());
    }
    Some(raw)
}

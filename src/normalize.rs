//! Maps adapter output onto the stored record shapes.
//!
//! Every function here is pure: missing text becomes an empty string,
//! missing counts become 0 and missing or unreadable dates become `today`.
//! A record without its natural key is dropped.

use chrono::{DateTime, Datelike, NaiveDate};
use url::Url;

use crate::models::{join_list, NewBlogPost, NewPaper, NewRecord, NewRepo};
use crate::sources::{value_text, RawRecord};

pub const TITLE_MAX_CHARS: usize = 100;
pub const SUMMARY_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 500;

/// Per-source fallbacks for blog posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlogDefaults {
    pub source: String,
    pub organization: String,
    pub author: String,
    /// `{n}` is replaced with the engagement count.
    pub summary_template: String,
    pub base_tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalizer {
    Repo,
    Paper,
    Blog(BlogDefaults),
}

impl Normalizer {
    pub fn normalize(&self, raw: &RawRecord, today: NaiveDate) -> Option<NewRecord> {
        match self {
            Normalizer::Repo => normalize_repo(raw, today).map(NewRecord::Repo),
            Normalizer::Paper => normalize_paper(raw, today).map(NewRecord::Paper),
            Normalizer::Blog(defaults) => {
                normalize_blog(raw, defaults, today).map(NewRecord::Blog)
            }
        }
    }
}

/// Reads the GitHub REST field names.
pub fn normalize_repo(raw: &RawRecord, today: NaiveDate) -> Option<NewRepo> {
    let full_name = raw.text("full_name")?;
    let name = raw
        .text("name")
        .or_else(|| full_name.rsplit('/').next().map(str::to_string))
        .unwrap_or_default();
    let url = raw
        .text("html_url")
        .map(|u| canonical_url(&u))
        .unwrap_or_else(|| format!("https://github.com/{full_name}"));
    let license = raw
        .get("license")
        .and_then(|v| v.get("spdx_id").or(Some(v)))
        .and_then(value_text)
        .unwrap_or_default();

    let description = clean_text(&raw.text("description").unwrap_or_default());

    Some(NewRepo {
        name,
        description: truncate_chars(&description, DESCRIPTION_MAX_CHARS),
        url,
        stars: raw.count("stargazers_count").unwrap_or(0),
        forks: raw.count("forks_count").unwrap_or(0),
        open_issues: raw.count("open_issues_count").unwrap_or(0),
        watchers: raw.count("watchers_count").unwrap_or(0),
        language: raw.text("language").unwrap_or_default(),
        license,
        updated_at: normalize_date(raw.text("updated_at").as_deref(), today),
        topics: raw.list("topics"),
        full_name,
    })
}

pub fn normalize_paper(raw: &RawRecord, today: NaiveDate) -> Option<NewPaper> {
    let title = truncate_chars(&clean_text(&raw.text("title")?), TITLE_MAX_CHARS);
    let pdf_url = canonical_url(&raw.text("pdf_url")?);

    Some(NewPaper {
        title,
        authors: join_list(&raw.list("authors"), ", "),
        r#abstract: clean_text(&raw.text("abstract").unwrap_or_default()),
        pdf_url,
        published_date: normalize_date(raw.text("published").as_deref(), today),
        categories: raw.list("categories"),
    })
}

pub fn normalize_blog(
    raw: &RawRecord,
    defaults: &BlogDefaults,
    today: NaiveDate,
) -> Option<NewBlogPost> {
    let title = truncate_chars(&clean_text(&raw.text("title")?), TITLE_MAX_CHARS);
    let url = canonical_url(&raw.text("url")?);

    let author = raw
        .text("author")
        .map(|a| clean_text(a.trim_start_matches('@')))
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| defaults.author.clone());

    let summary = raw
        .text("excerpt")
        .map(|e| truncate_chars(&clean_text(&e), SUMMARY_MAX_CHARS))
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| {
            let n = raw.count("engagement").unwrap_or(0);
            defaults.summary_template.replace("{n}", &n.to_string())
        });

    let mut tags = vec![defaults.base_tag.clone()];
    tags.extend(raw.text("topic"));

    Some(NewBlogPost {
        title,
        url,
        author,
        organization: raw
            .text("organization")
            .unwrap_or_else(|| defaults.organization.clone()),
        summary,
        published_date: normalize_date(raw.text("published").as_deref(), today),
        tags: tags.into_iter().filter(|t| !t.is_empty()).collect(),
        source: defaults.source.clone(),
    })
}

/// Collapses runs of whitespace, newlines included, into single spaces.
pub fn clean_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].trim_end().to_string(),
        None => s.to_string(),
    }
}

/// Drops the query string and fragment.
pub fn canonical_url(raw: &str) -> String {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

/// `YYYY-MM-DD`, falling back to `today`.
pub fn normalize_date(raw: Option<&str>, today: NaiveDate) -> String {
    raw.and_then(|s| parse_date(s, today))
        .unwrap_or(today)
        .format("%Y-%m-%d")
        .to_string()
}

fn parse_date(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let s = s.trim();

    // Time of day is cut off, not converted between offsets.
    if let Some(date) = s
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
    {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.date_naive());
    }
    for fmt in ["%b %d, %Y", "%B %d, %Y", "%Y年%m月%d日", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }
    // Medium drops the year for posts from the current year ("Mar 3").
    for fmt in ["%b %d, %Y", "%B %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(&format!("{s}, {}", today.year()), fmt) {
            return Some(date);
        }
    }
    None
}

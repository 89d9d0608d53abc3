use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub id: i64,
    pub title: String,
    /// Author names joined with `", "`.
    pub authors: String,
    pub r#abstract: String,
    pub pdf_url: String,
    pub published_date: String,
    pub categories: Vec<String>,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPaper {
    pub title: String,
    pub authors: String,
    pub r#abstract: String,
    pub pdf_url: String,
    pub published_date: String,
    pub categories: Vec<String>,
}

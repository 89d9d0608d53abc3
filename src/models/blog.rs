use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub author: String,
    pub organization: String,
    pub summary: String,
    pub published_date: String,
    pub tags: Vec<String>,
    pub source: String,
    pub deleted: bool,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBlogPost {
    pub title: String,
    pub url: String,
    pub author: String,
    pub organization: String,
    pub summary: String,
    pub published_date: String,
    pub tags: Vec<String>,
    /// Origin label, e.g. `"Medium"`. A run replaces every row carrying it.
    pub source: String,
}

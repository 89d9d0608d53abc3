use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub description: String,
    pub url: String,
    pub stars: i64,
    pub forks: i64,
    pub open_issues: i64,
    pub watchers: i64,
    pub language: String,
    pub license: String,
    pub updated_at: String,
    pub topics: Vec<String>,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRepo {
    pub name: String,
    pub full_name: String,
    pub description: String,
    pub url: String,
    pub stars: i64,
    pub forks: i64,
    pub open_issues: i64,
    pub watchers: i64,
    pub language: String,
    pub license: String,
    /// Date only, `YYYY-MM-DD`.
    pub updated_at: String,
    pub topics: Vec<String>,
}

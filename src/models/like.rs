use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Repo,
    Paper,
    Blog,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Repo => "repo",
            ItemType::Paper => "paper",
            ItemType::Blog => "blog",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repo" => Ok(ItemType::Repo),
            "paper" => Ok(ItemType::Paper),
            "blog" => Ok(ItemType::Blog),
            other => Err(AppError::Usage(format!(
                "unknown item type '{other}', expected repo, paper or blog"
            ))),
        }
    }
}

/// A bookmark set from the front-end. Ingestion never touches these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLike {
    pub id: i64,
    pub item_type: ItemType,
    pub item_id: i64,
    pub liked_at: DateTime<Utc>,
}

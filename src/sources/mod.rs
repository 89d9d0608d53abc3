mod arxiv;
mod blog;
mod github;
mod raw;
mod webdriver;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::normalize::Normalizer;

pub use arxiv::{ArxivAdapter, ARXIV_API_URL};
pub use blog::{variant, BlogAdapter, BlogVariant, VARIANTS};
pub use github::{GithubAdapter, GITHUB_API_URL};
pub use raw::{value_text, RawRecord};
pub use webdriver::WebDriverSession;
use webdriver::PageDriver;

/// One unit of work for an adapter: a repo identifier, a category code, a
/// search keyword or a page URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub locator: String,
}

impl Target {
    pub fn new(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
        }
    }

    /// A target whose display name is its locator.
    pub fn plain(locator: impl Into<String>) -> Self {
        let locator = locator.into();
        Self {
            name: locator.clone(),
            locator,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WritePolicy {
    /// First write wins per natural key.
    InsertOrIgnore,
    /// Rows carrying this source label are dropped and re-inserted each run.
    ReplaceSource(String),
}

pub trait SourceAdapter {
    fn label(&self) -> &str;

    fn normalizer(&self) -> Normalizer;

    fn write_policy(&self) -> WritePolicy {
        WritePolicy::InsertOrIgnore
    }

    async fn fetch_candidates(&mut self, target: &Target) -> Result<Vec<RawRecord>, FetchError>;

    /// Called once after the last target.
    async fn finish(&mut self) {}
}

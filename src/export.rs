//! Flat JSON files for the static front-end.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::db::{BlogQuery, OrderBy, Store};
use crate::error::Result;
use crate::models::{BlogPost, Paper, Repo};

#[derive(Debug, Clone, Serialize)]
pub struct RepoEntry {
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
}

impl From<Repo> for RepoEntry {
    fn from(repo: Repo) -> Self {
        Self {
            id: repo.id,
            name: repo.name,
            full_name: repo.full_name,
            description: repo.description,
            url: repo.url,
            stars: repo.stars,
            forks: repo.forks,
            open_issues: repo.open_issues,
            watchers: repo.watchers,
            language: repo.language,
            license: repo.license,
            updated_at: repo.updated_at,
            topics: repo.topics,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaperEntry {
    pub id: i64,
    pub title: String,
    pub authors: String,
    #[serde(rename = "abstract")]
    pub summary: String,
    pub pdf_url: String,
    pub published_date: String,
    pub categories: Vec<String>,
}

impl From<Paper> for PaperEntry {
    fn from(paper: Paper) -> Self {
        Self {
            id: paper.id,
            title: paper.title,
            authors: paper.authors,
            summary: paper.r#abstract,
            pdf_url: paper.pdf_url,
            published_date: paper.published_date,
            categories: paper.categories,
        }
    }
}

/// The front-end reads a post's summary as `excerpt`.
#[derive(Debug, Clone, Serialize)]
pub struct BlogEntry {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub author: String,
    pub organization: String,
    pub excerpt: String,
    pub published_date: String,
    pub tags: Vec<String>,
    pub source: String,
}

impl From<BlogPost> for BlogEntry {
    fn from(post: BlogPost) -> Self {
        Self {
            id: post.id,
            title: post.title,
            url: post.url,
            author: post.author,
            organization: post.organization,
            excerpt: post.summary,
            published_date: post.published_date,
            tags: post.tags,
            source: post.source,
        }
    }
}

pub struct Exporter<'a> {
    store: &'a Store,
}

impl<'a> Exporter<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Most-starred first.
    pub async fn repos(&self) -> Result<Vec<RepoEntry>> {
        let repos = self.store.query_repos(OrderBy::Stars).await?;
        Ok(repos.into_iter().map(RepoEntry::from).collect())
    }

    /// Newest first.
    pub async fn papers(&self) -> Result<Vec<PaperEntry>> {
        let papers = self.store.query_papers(OrderBy::Published).await?;
        Ok(papers.into_iter().map(PaperEntry::from).collect())
    }

    /// Newest first, hidden posts left out.
    pub async fn blogs(&self, source: Option<&str>) -> Result<Vec<BlogEntry>> {
        let query = BlogQuery {
            source: source.map(str::to_string),
            include_deleted: false,
            order: OrderBy::Published,
        };
        let posts = self.store.query_blogs(&query).await?;
        Ok(posts.into_iter().map(BlogEntry::from).collect())
    }

    /// Writes `repos.json`, `papers.json`, `blogs.json` and one
    /// `{name}.json` per entry of `blog_subsets` (file stem → source label).
    /// Returns the files written with their entry counts.
    pub async fn export_all(
        &self,
        dir: &Path,
        blog_subsets: &BTreeMap<String, String>,
    ) -> Result<Vec<(String, usize)>> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::new();

        let count = write_json(&dir.join("repos.json"), &self.repos().await?)?;
        written.push(("repos.json".to_string(), count));

        let count = write_json(&dir.join("papers.json"), &self.papers().await?)?;
        written.push(("papers.json".to_string(), count));

        let count = write_json(&dir.join("blogs.json"), &self.blogs(None).await?)?;
        written.push(("blogs.json".to_string(), count));

        for (stem, source) in blog_subsets {
            let file = format!("{stem}.json");
            let count = write_json(&dir.join(&file), &self.blogs(Some(source)).await?)?;
            written.push((file, count));
        }

        for (file, count) in &written {
            tracing::info!("Exported {} entries to {}", count, dir.join(file).display());
        }
        Ok(written)
    }
}

/// Pretty-printed JSON array. Returns the number of entries.
pub fn write_json<T: Serialize>(path: &Path, entries: &[T]) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(entries)?;
    std::fs::write(path, content)?;
    Ok(entries.len())
}

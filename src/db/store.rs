use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::backup::Progress;
use rusqlite::{params, DatabaseName, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{
    join_list, split_list, BlogPost, ItemType, NewBlogPost, NewPaper, NewRecord, NewRepo, Paper,
    Repo, UserLike,
};

use super::schema::SCHEMA;

/// Row ordering for the `query_*` calls. Orders that make no sense for a
/// table fall back to insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderBy {
    #[default]
    Insertion,
    Stars,
    Published,
}

#[derive(Debug, Clone, Default)]
pub struct BlogQuery {
    pub source: Option<String>,
    pub include_deleted: bool,
    pub order: OrderBy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteFilter {
    BlogSource(String),
    Like { item_type: ItemType, item_id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableCounts {
    pub repos: i64,
    pub papers: i64,
    pub blogs: i64,
    pub likes: i64,
}

/// The whole database lives in memory for the length of a run. `load` reads
/// the file in, `persist` writes it back out. Two processes persisting to the
/// same file overwrite each other; the last one wins.
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_in_memory().await?;

        if path.exists() {
            let src = path.clone();
            conn.call(move |conn| {
                conn.restore(DatabaseName::Main, &src, None::<fn(Progress)>)?;
                Ok(())
            })
            .await?;
            tracing::debug!("Loaded store from {}", path.display());
        }

        let store = Self {
            conn,
            path: Some(path),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// A store with no backing file; `persist` is a no-op.
    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn, path: None };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn persist(&self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let dst = path.clone();
        self.conn
            .call(move |conn| {
                conn.backup(DatabaseName::Main, &dst, None)?;
                Ok(())
            })
            .await?;
        tracing::debug!("Persisted store to {}", path.display());
        Ok(())
    }

    // Writes

    /// Insert-or-ignore on the record's natural key. Returns whether a row was added.
    pub async fn upsert(&self, record: NewRecord) -> Result<bool> {
        let inserted = self
            .conn
            .call(move |conn| Ok(insert_record(conn, &record)?))
            .await?;
        Ok(inserted)
    }

    /// Drops every post carrying `source` and inserts `posts` in one
    /// transaction. Returns `(removed, inserted)`.
    pub async fn replace_source(
        &self,
        source: &str,
        posts: Vec<NewBlogPost>,
    ) -> Result<(usize, usize)> {
        let source = source.to_string();
        let counts = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let removed = delete_matching(&tx, &DeleteFilter::BlogSource(source.clone()))?;
                let mut inserted = 0;
                for post in &posts {
                    if insert_blog(&tx, post, &source)? {
                        inserted += 1;
                    }
                }
                tx.commit()?;
                Ok((removed, inserted))
            })
            .await?;
        Ok(counts)
    }

    pub async fn delete_where(&self, filter: DeleteFilter) -> Result<usize> {
        let removed = self
            .conn
            .call(move |conn| Ok(delete_matching(conn, &filter)?))
            .await?;
        Ok(removed)
    }

    pub async fn set_blog_deleted(&self, id: i64, deleted: bool) -> Result<bool> {
        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE blogs SET deleted = ?1 WHERE id = ?2",
                    params![deleted, id],
                )?)
            })
            .await?;
        Ok(changed > 0)
    }

    // Likes

    pub async fn like(&self, item_type: ItemType, item_id: i64) -> Result<bool> {
        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "INSERT OR IGNORE INTO user_likes (item_type, item_id) VALUES (?1, ?2)",
                    params![item_type.as_str(), item_id],
                )?)
            })
            .await?;
        Ok(changed > 0)
    }

    pub async fn unlike(&self, item_type: ItemType, item_id: i64) -> Result<bool> {
        let removed = self
            .delete_where(DeleteFilter::Like { item_type, item_id })
            .await?;
        Ok(removed > 0)
    }

    pub async fn likes(&self) -> Result<Vec<UserLike>> {
        let likes = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, item_type, item_id, liked_at FROM user_likes ORDER BY liked_at DESC, id DESC",
                )?;
                let likes = stmt
                    .query_map([], like_from_row)?
                    .filter_map(|r| r.transpose())
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(likes)
            })
            .await?;
        Ok(likes)
    }

    // Reads

    pub async fn query_repos(&self, order: OrderBy) -> Result<Vec<Repo>> {
        let order_clause = match order {
            OrderBy::Stars => "stars DESC, id",
            OrderBy::Published => "updated_at DESC, id",
            OrderBy::Insertion => "id",
        };
        let sql = format!(
            "SELECT id, name, full_name, description, url, stars, forks, open_issues, watchers, \
                    language, license, updated_at, topics, scraped_at \
             FROM repos ORDER BY {order_clause}"
        );
        let repos = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let repos = stmt
                    .query_map([], repo_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(repos)
            })
            .await?;
        Ok(repos)
    }

    pub async fn query_papers(&self, order: OrderBy) -> Result<Vec<Paper>> {
        let order_clause = match order {
            OrderBy::Published => "published_date DESC, id",
            OrderBy::Stars | OrderBy::Insertion => "id",
        };
        let sql = format!(
            "SELECT id, title, authors, abstract, pdf_url, published_date, categories, scraped_at \
             FROM papers ORDER BY {order_clause}"
        );
        let papers = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let papers = stmt
                    .query_map([], paper_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(papers)
            })
            .await?;
        Ok(papers)
    }

    pub async fn query_blogs(&self, query: &BlogQuery) -> Result<Vec<BlogPost>> {
        let order_clause = match query.order {
            OrderBy::Published => "published_date DESC, id",
            OrderBy::Stars | OrderBy::Insertion => "id",
        };
        let sql = format!(
            "SELECT id, title, url, author, organization, summary, published_date, tags, source, \
                    deleted, scraped_at \
             FROM blogs \
             WHERE (?1 IS NULL OR source = ?1) AND (?2 OR COALESCE(deleted, 0) = 0) \
             ORDER BY {order_clause}"
        );
        let source = query.source.clone();
        let include_deleted = query.include_deleted;
        let posts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let posts = stmt
                    .query_map(params![source, include_deleted], blog_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(posts)
            })
            .await?;
        Ok(posts)
    }

    pub async fn counts(&self) -> Result<TableCounts> {
        let counts = self
            .conn
            .call(|conn| {
                let count = |table: &str| -> rusqlite::Result<i64> {
                    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                        row.get(0)
                    })
                };
                Ok(TableCounts {
                    repos: count("repos")?,
                    papers: count("papers")?,
                    blogs: count("blogs")?,
                    likes: count("user_likes")?,
                })
            })
            .await?;
        Ok(counts)
    }
}

fn delete_matching(conn: &rusqlite::Connection, filter: &DeleteFilter) -> rusqlite::Result<usize> {
    match filter {
        DeleteFilter::BlogSource(source) => {
            conn.execute("DELETE FROM blogs WHERE source = ?1", params![source])
        }
        DeleteFilter::Like { item_type, item_id } => conn.execute(
            "DELETE FROM user_likes WHERE item_type = ?1 AND item_id = ?2",
            params![item_type.as_str(), item_id],
        ),
    }
}

fn insert_record(conn: &rusqlite::Connection, record: &NewRecord) -> rusqlite::Result<bool> {
    match record {
        NewRecord::Repo(repo) => insert_repo(conn, repo),
        NewRecord::Paper(paper) => insert_paper(conn, paper),
        NewRecord::Blog(post) => insert_blog(conn, post, &post.source),
    }
}

fn insert_repo(conn: &rusqlite::Connection, repo: &NewRepo) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        r#"INSERT OR IGNORE INTO repos
               (name, full_name, description, url, stars, forks, open_issues, watchers,
                language, license, updated_at, topics)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"#,
        params![
            repo.name,
            repo.full_name,
            repo.description,
            repo.url,
            repo.stars,
            repo.forks,
            repo.open_issues,
            repo.watchers,
            repo.language,
            repo.license,
            repo.updated_at,
            join_list(&repo.topics, ","),
        ],
    )?;
    Ok(changed > 0)
}

fn insert_paper(conn: &rusqlite::Connection, paper: &NewPaper) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        r#"INSERT OR IGNORE INTO papers (title, authors, abstract, pdf_url, published_date, categories)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        params![
            paper.title,
            paper.authors,
            paper.r#abstract,
            paper.pdf_url,
            paper.published_date,
            join_list(&paper.categories, ","),
        ],
    )?;
    Ok(changed > 0)
}

fn insert_blog(
    conn: &rusqlite::Connection,
    post: &NewBlogPost,
    source: &str,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        r#"INSERT OR IGNORE INTO blogs
               (title, url, author, organization, summary, published_date, tags, source)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
        params![
            post.title,
            post.url,
            post.author,
            post.organization,
            post.summary,
            post.published_date,
            join_list(&post.tags, ","),
            source,
        ],
    )?;
    Ok(changed > 0)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn timestamp_column(row: &Row, idx: usize) -> DateTime<Utc> {
    row.get::<_, String>(idx)
        .ok()
        .and_then(|s| parse_datetime(&s))
        .unwrap_or_else(Utc::now)
}

/// Older store files declare these columns nullable; NULL reads as empty.
fn text_column(row: &Row, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

fn count_column(row: &Row, idx: usize) -> rusqlite::Result<i64> {
    Ok(row.get::<_, Option<i64>>(idx)?.unwrap_or(0))
}

fn repo_from_row(row: &Row) -> rusqlite::Result<Repo> {
    Ok(Repo {
        id: row.get(0)?,
        name: text_column(row, 1)?,
        full_name: text_column(row, 2)?,
        description: text_column(row, 3)?,
        url: text_column(row, 4)?,
        stars: count_column(row, 5)?,
        forks: count_column(row, 6)?,
        open_issues: count_column(row, 7)?,
        watchers: count_column(row, 8)?,
        language: text_column(row, 9)?,
        license: text_column(row, 10)?,
        updated_at: text_column(row, 11)?,
        topics: split_list(&text_column(row, 12)?),
        scraped_at: timestamp_column(row, 13),
    })
}

fn paper_from_row(row: &Row) -> rusqlite::Result<Paper> {
    Ok(Paper {
        id: row.get(0)?,
        title: text_column(row, 1)?,
        authors: text_column(row, 2)?,
        r#abstract: text_column(row, 3)?,
        pdf_url: text_column(row, 4)?,
        published_date: text_column(row, 5)?,
        categories: split_list(&text_column(row, 6)?),
        scraped_at: timestamp_column(row, 7),
    })
}

fn blog_from_row(row: &Row) -> rusqlite::Result<BlogPost> {
    Ok(BlogPost {
        id: row.get(0)?,
        title: text_column(row, 1)?,
        url: text_column(row, 2)?,
        author: text_column(row, 3)?,
        organization: text_column(row, 4)?,
        summary: text_column(row, 5)?,
        published_date: text_column(row, 6)?,
        tags: split_list(&text_column(row, 7)?),
        source: text_column(row, 8)?,
        deleted: count_column(row, 9)? != 0,
        scraped_at: timestamp_column(row, 10),
    })
}

/// Rows with an item type this build doesn't know are skipped.
fn like_from_row(row: &Row) -> rusqlite::Result<Option<UserLike>> {
    let item_type: String = row.get(1)?;
    let Ok(item_type) = item_type.parse::<ItemType>() else {
        return Ok(None);
    };
    Ok(Some(UserLike {
        id: row.get(0)?,
        item_type,
        item_id: row.get(2)?,
        liked_at: timestamp_column(row, 3),
    }))
}

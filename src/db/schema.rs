pub const SCHEMA: &str = r#"
-- repos table
CREATE TABLE IF NOT EXISTS repos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL DEFAULT '',
    full_name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    url TEXT NOT NULL DEFAULT '',
    stars INTEGER NOT NULL DEFAULT 0,
    forks INTEGER NOT NULL DEFAULT 0,
    open_issues INTEGER NOT NULL DEFAULT 0,
    watchers INTEGER NOT NULL DEFAULT 0,
    language TEXT NOT NULL DEFAULT '',
    license TEXT NOT NULL DEFAULT '',
    updated_at TEXT NOT NULL DEFAULT '',
    topics TEXT NOT NULL DEFAULT '',
    scraped_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_repos_stars ON repos(stars DESC);

-- papers table
CREATE TABLE IF NOT EXISTS papers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    authors TEXT NOT NULL DEFAULT '',
    abstract TEXT NOT NULL DEFAULT '',
    pdf_url TEXT NOT NULL UNIQUE,
    published_date TEXT NOT NULL DEFAULT '',
    categories TEXT NOT NULL DEFAULT '',
    scraped_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_papers_published_date ON papers(published_date DESC);

-- blogs table (rows are replaced wholesale per source label on every run)
CREATE TABLE IF NOT EXISTS blogs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    url TEXT NOT NULL UNIQUE,
    author TEXT NOT NULL DEFAULT '',
    organization TEXT NOT NULL DEFAULT '',
    summary TEXT NOT NULL DEFAULT '',
    published_date TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL DEFAULT '',
    deleted INTEGER NOT NULL DEFAULT 0,
    scraped_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_blogs_source ON blogs(source);

-- user_likes table (front-end bookmarks, never written by ingestion)
CREATE TABLE IF NOT EXISTS user_likes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_type TEXT NOT NULL,
    item_id INTEGER NOT NULL,
    liked_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(item_type, item_id)
);
"#;

//! Runs one source end to end: fetch each target, normalize, dedup, write,
//! persist.

mod throttle;

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};

use crate::db::Store;
use crate::error::{FetchError, Result};
use crate::models::{NewBlogPost, NewRecord};
use crate::sources::{SourceAdapter, Target, WritePolicy};

pub use throttle::{FixedDelay, NoDelay, WaitStrategy};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub source: String,
    pub targets: usize,
    pub failed_targets: usize,
    pub candidates: usize,
    pub added: usize,
    /// Rows dropped by a full-replace before the new batch went in.
    pub replaced: usize,
    /// One warning per failed target, in target order.
    pub failures: Vec<String>,
}

pub struct IngestDriver<'a, W> {
    store: &'a Store,
    wait: W,
}

impl<'a, W: WaitStrategy> IngestDriver<'a, W> {
    pub fn new(store: &'a Store, wait: W) -> Self {
        Self { store, wait }
    }

    /// Target failures are logged and skipped; only store failures at the
    /// write-back stage end the run with an error.
    pub async fn run<A: SourceAdapter>(
        &self,
        adapter: &mut A,
        targets: &[Target],
    ) -> Result<RunReport> {
        self.run_on(adapter, targets, Utc::now().date_naive()).await
    }

    pub async fn run_on<A: SourceAdapter>(
        &self,
        adapter: &mut A,
        targets: &[Target],
        today: NaiveDate,
    ) -> Result<RunReport> {
        let normalizer = adapter.normalizer();
        let policy = adapter.write_policy();
        let mut report = RunReport {
            source: adapter.label().to_string(),
            targets: targets.len(),
            ..Default::default()
        };

        tracing::info!("Ingesting {} ({} targets)", report.source, targets.len());

        let mut seen = HashSet::new();
        let mut staged: Vec<NewBlogPost> = Vec::new();

        for (i, target) in targets.iter().enumerate() {
            if i > 0 {
                self.wait.wait().await;
            }

            let raws = match adapter.fetch_candidates(target).await {
                Ok(raws) => raws,
                Err(e) => {
                    let message = failure_message(&report.source, target, &e);
                    tracing::warn!("{}", message);
                    report.failed_targets += 1;
                    report.failures.push(message);
                    continue;
                }
            };

            let mut added_here = 0;
            for raw in &raws {
                let Some(record) = normalizer.normalize(raw, today) else {
                    tracing::debug!("Dropped incomplete record from {}", target.name);
                    continue;
                };
                report.candidates += 1;
                if !seen.insert(record.key().to_string()) {
                    continue;
                }

                match (&policy, record) {
                    (WritePolicy::ReplaceSource(_), NewRecord::Blog(post)) => {
                        staged.push(post);
                        added_here += 1;
                    }
                    (_, record) => match self.store.upsert(record).await {
                        Ok(true) => added_here += 1,
                        Ok(false) => {}
                        Err(e) => tracing::warn!("Failed to store record from {}: {}", target.name, e),
                    },
                }
            }

            tracing::info!(
                "{}: {} candidates, {} new",
                target.name,
                raws.len(),
                added_here
            );
            if !matches!(policy, WritePolicy::ReplaceSource(_)) {
                report.added += added_here;
            }
        }

        adapter.finish().await;

        if let WritePolicy::ReplaceSource(label) = &policy {
            let (removed, inserted) = self.store.replace_source(label, staged).await?;
            report.replaced = removed;
            report.added = inserted;
        }

        self.store.persist().await?;

        tracing::info!(
            "Finished {}: {} added, {} of {} targets failed",
            report.source,
            report.added,
            report.failed_targets,
            report.targets
        );
        Ok(report)
    }
}

fn failure_message(source: &str, target: &Target, err: &FetchError) -> String {
    match err {
        FetchError::RateLimited => format!(
            "{}: {} hit the rate limit, provide or rotate GITHUB_TOKEN",
            source, target.name
        ),
        FetchError::NotFound => format!("{}: {} does not exist", source, target.name),
        other => format!("{}: {} failed: {}", source, target.name, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::db::{BlogQuery, OrderBy};
    use crate::normalize::{BlogDefaults, Normalizer};
    use crate::sources::{GithubAdapter, RawRecord};
    use crate::sources::testing::{spawn_http_stub, StubRoute};

    /// Answers each target from a script; unknown targets are 404s.
    struct ScriptedAdapter {
        normalizer: Normalizer,
        policy: WritePolicy,
        pages: HashMap<String, std::result::Result<Vec<RawRecord>, u16>>,
        fetched: Vec<String>,
        finished: bool,
    }

    impl ScriptedAdapter {
        fn new(normalizer: Normalizer, policy: WritePolicy) -> Self {
            Self {
                normalizer,
                policy,
                pages: HashMap::new(),
                fetched: Vec::new(),
                finished: false,
            }
        }

        fn page(mut self, target: &str, raws: Vec<RawRecord>) -> Self {
            self.pages.insert(target.to_string(), Ok(raws));
            self
        }

        fn failing(mut self, target: &str, status: u16) -> Self {
            self.pages.insert(target.to_string(), Err(status));
            self
        }
    }

    impl SourceAdapter for ScriptedAdapter {
        fn label(&self) -> &str {
            "scripted"
        }

        fn normalizer(&self) -> Normalizer {
            self.normalizer.clone()
        }

        fn write_policy(&self) -> WritePolicy {
            self.policy.clone()
        }

        async fn fetch_candidates(
            &mut self,
            target: &Target,
        ) -> std::result::Result<Vec<RawRecord>, FetchError> {
            self.fetched.push(target.locator.clone());
            match self.pages.get(&target.locator) {
                Some(Ok(raws)) => Ok(raws.clone()),
                Some(Err(403)) => Err(FetchError::RateLimited),
                Some(Err(code)) => Err(FetchError::Status(*code)),
                None => Err(FetchError::NotFound),
            }
        }

        async fn finish(&mut self) {
            self.finished = true;
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn repo_raw(full_name: &str, stars: i64) -> RawRecord {
        RawRecord::new()
            .with("full_name", full_name)
            .with("stargazers_count", stars)
    }

    fn paper_raw(title: &str, pdf_url: &str, published: &str) -> RawRecord {
        RawRecord::new()
            .with("title", title)
            .with("pdf_url", pdf_url)
            .with("published", published)
            .with("authors", "A, B")
    }

    fn blog_raw(url: &str) -> RawRecord {
        RawRecord::new()
            .with("title", format!("Post about inference at {url}"))
            .with("url", url)
    }

    fn medium() -> Normalizer {
        Normalizer::Blog(BlogDefaults {
            source: "Medium".to_string(),
            organization: "Medium".to_string(),
            author: "Medium Author".to_string(),
            summary_template: "Medium文章 (👏{n})".to_string(),
            base_tag: "ai-infra".to_string(),
        })
    }

    #[tokio::test]
    async fn test_failed_target_does_not_stop_run() {
        let store = Store::open_in_memory().await.unwrap();
        let driver = IngestDriver::new(&store, NoDelay);
        let mut adapter = ScriptedAdapter::new(Normalizer::Repo, WritePolicy::InsertOrIgnore)
            .page("a/b", vec![repo_raw("a/b", 5)])
            .failing("x/y", 403)
            .page("c/d", vec![repo_raw("c/d", 9)]);

        let targets = [Target::plain("a/b"), Target::plain("x/y"), Target::plain("c/d")];
        let report = driver.run_on(&mut adapter, &targets, today()).await.unwrap();

        assert_eq!(adapter.fetched, vec!["a/b", "x/y", "c/d"]);
        assert!(adapter.finished);
        assert_eq!(report.failed_targets, 1);
        assert_eq!(report.added, 2);

        let names: Vec<_> = store
            .query_repos(OrderBy::Insertion)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.full_name)
            .collect();
        assert_eq!(names, vec!["a/b", "c/d"]);
    }

    #[tokio::test]
    async fn test_repo_rerun_is_idempotent() {
        let store = Store::open_in_memory().await.unwrap();
        let driver = IngestDriver::new(&store, NoDelay);
        let targets = [Target::plain("a/b")];

        let mut first = ScriptedAdapter::new(Normalizer::Repo, WritePolicy::InsertOrIgnore)
            .page("a/b", vec![repo_raw("a/b", 5), repo_raw("a/b", 6)]);
        let report = driver.run_on(&mut first, &targets, today()).await.unwrap();
        assert_eq!(report.added, 1);

        let mut second = ScriptedAdapter::new(Normalizer::Repo, WritePolicy::InsertOrIgnore)
            .page("a/b", vec![repo_raw("a/b", 500)]);
        let report = driver.run_on(&mut second, &targets, today()).await.unwrap();
        assert_eq!(report.added, 0);

        let repos = store.query_repos(OrderBy::Insertion).await.unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].stars, 5);
    }

    #[tokio::test]
    async fn test_same_paper_in_two_categories_stored_once() {
        let store = Store::open_in_memory().await.unwrap();
        let driver = IngestDriver::new(&store, NoDelay);
        let shared = paper_raw("Shared", "https://arxiv.org/pdf/2401.1", "2024-01-01T00:00:00Z");
        let mut adapter = ScriptedAdapter::new(Normalizer::Paper, WritePolicy::InsertOrIgnore)
            .page("cs.LG", vec![shared.clone()])
            .page(
                "cs.DC",
                vec![
                    shared,
                    RawRecord::new().with("title", "No pdf link"),
                ],
            );

        let targets = [Target::plain("cs.LG"), Target::plain("cs.DC")];
        let report = driver.run_on(&mut adapter, &targets, today()).await.unwrap();

        assert_eq!(report.added, 1);
        let papers = store.query_papers(OrderBy::Insertion).await.unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].published_date, "2024-01-01");
        assert_eq!(papers[0].authors, "A, B");
    }

    #[tokio::test]
    async fn test_blog_run_replaces_previous_rows() {
        let store = Store::open_in_memory().await.unwrap();
        let driver = IngestDriver::new(&store, NoDelay);
        let policy = WritePolicy::ReplaceSource("Medium".to_string());
        let targets = [Target::plain("vllm")];

        let mut first = ScriptedAdapter::new(medium(), policy.clone()).page(
            "vllm",
            vec![blog_raw("https://medium.com/p/1"), blog_raw("https://medium.com/p/2")],
        );
        driver.run_on(&mut first, &targets, today()).await.unwrap();

        let mut second = ScriptedAdapter::new(medium(), policy)
            .page("vllm", vec![blog_raw("https://medium.com/p/3")]);
        let report = driver.run_on(&mut second, &targets, today()).await.unwrap();
        assert_eq!(report.replaced, 2);
        assert_eq!(report.added, 1);

        let posts = store
            .query_blogs(&BlogQuery {
                source: Some("Medium".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let urls: Vec<_> = posts.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["https://medium.com/p/3"]);
    }

    #[tokio::test]
    async fn test_run_persists_even_without_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.db");
        let store = Store::load(&path).await.unwrap();
        let driver = IngestDriver::new(&store, NoDelay);
        let mut adapter = ScriptedAdapter::new(Normalizer::Repo, WritePolicy::InsertOrIgnore);

        let report = driver
            .run_on(&mut adapter, &[Target::plain("gone/repo")], today())
            .await
            .unwrap();

        assert_eq!(report.failed_targets, 1);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_github_rate_limit_is_not_fatal() {
        let base = spawn_http_stub(vec![
            StubRoute {
                path: "/repos/x/y",
                status: 403,
                content_type: "application/json",
                body: r#"{"message":"API rate limit exceeded"}"#.to_string(),
            },
            StubRoute {
                path: "/repos/sgl-project/sglang",
                status: 200,
                content_type: "application/json",
                body: r#"{"name":"sglang","full_name":"sgl-project/sglang","stargazers_count":12000,"topics":["llm"]}"#
                    .to_string(),
            },
        ])
        .await;

        let store = Store::open_in_memory().await.unwrap();
        let driver = IngestDriver::new(&store, NoDelay);
        let mut adapter = GithubAdapter::new(base, None).unwrap();
        let targets = [Target::plain("x/y"), Target::plain("sgl-project/sglang")];

        let report = tokio_test::assert_ok!(driver.run(&mut adapter, &targets).await);
        assert_eq!(report.failed_targets, 1);
        assert_eq!(report.added, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].starts_with("GitHub: x/y hit the rate limit"));

        let repos = store.query_repos(OrderBy::Stars).await.unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].full_name, "sgl-project/sglang");
        assert_eq!(repos[0].topics, vec!["llm"]);
    }

    #[test]
    fn test_failure_messages() {
        let target = Target::plain("x/y");
        let rate_limited = failure_message("GitHub", &target, &FetchError::RateLimited);
        assert!(rate_limited.contains("x/y hit the rate limit"));
        assert!(rate_limited.contains("GITHUB_TOKEN"));

        assert_eq!(
            failure_message("GitHub", &target, &FetchError::NotFound),
            "GitHub: x/y does not exist"
        );
        assert_eq!(
            failure_message("arXiv", &Target::plain("cs.DC"), &FetchError::Status(503)),
            "arXiv: cs.DC failed: HTTP 503"
        );
    }
}

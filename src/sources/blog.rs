//! Rendered-page scraping for Medium and Zhihu.
//!
//! The origins differ only in URLs, selectors and thresholds, so each one is
//! a row in [`VARIANTS`] driven by the same adapter. The page-side script
//! only collects raw text; filtering, engagement parsing, dedup and ranking
//! happen here so they can be tested without a browser.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, FetchError, Result};
use crate::normalize::{canonical_url, BlogDefaults, Normalizer};

use super::{PageDriver, RawRecord, SourceAdapter, Target, WritePolicy};

/// CSS selectors handed to the page script. Without a card selector every
/// matching link is a candidate and its closest `div` is the context.
#[derive(Debug, Clone, Copy)]
pub struct SelectorSet {
    pub card: Option<&'static str>,
    pub link: &'static str,
    pub title: Option<&'static str>,
    pub author: Option<&'static str>,
    pub date: Option<&'static str>,
    pub excerpt: Option<&'static str>,
    pub engagement: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub struct BlogVariant {
    pub name: &'static str,
    pub source: &'static str,
    pub organization: &'static str,
    pub default_author: &'static str,
    pub summary_template: &'static str,
    /// `{query}` is replaced with the url-encoded target. `None` means the
    /// target locator already is the page URL.
    pub url_template: Option<&'static str>,
    pub href_pattern: &'static str,
    pub selectors: SelectorSet,
    pub min_engagement: u64,
    pub top_k: usize,
    pub scroll_cycles: usize,
    pub scroll_fraction: f64,
    pub settle: Duration,
    pub scroll_wait: Duration,
    pub target_delay: Duration,
    pub default_targets: &'static [(&'static str, &'static str)],
}

impl BlogVariant {
    pub fn defaults(&self) -> BlogDefaults {
        BlogDefaults {
            source: self.source.to_string(),
            organization: self.organization.to_string(),
            author: self.default_author.to_string(),
            summary_template: self.summary_template.to_string(),
            base_tag: "ai-infra".to_string(),
        }
    }

    pub fn targets(&self) -> Vec<Target> {
        self.default_targets
            .iter()
            .map(|(name, locator)| Target::new(*name, *locator))
            .collect()
    }

    pub fn page_url(&self, target: &Target) -> String {
        match self.url_template {
            Some(template) => template.replace("{query}", &urlencoding::encode(&target.locator)),
            None => target.locator.clone(),
        }
    }
}

const MEDIUM_CARD_SELECTORS: SelectorSet = SelectorSet {
    card: Some(r#"article, div[role="article"], .post-item"#),
    link: r#"a[href*="/p/"]"#,
    title: Some("h2, h3, .post-item-title"),
    author: Some(r#"a[href*="/@"], .post-item-author"#),
    date: Some("time, .post-item-date"),
    excerpt: Some(".post-item-excerpt, p, .summary"),
    engagement: Some(".claps, .post-item-claps"),
};

const MEDIUM_LINK_SELECTORS: SelectorSet = SelectorSet {
    card: None,
    link: r#"a[href*="/p/"]"#,
    title: Some("h2, h3, h4"),
    author: Some(r#"a[href*="/@"]"#),
    date: None,
    excerpt: None,
    engagement: None,
};

const ZHIHU_CARD_SELECTORS: SelectorSet = SelectorSet {
    card: Some(".TopicMainCard, .ContentItem, article, .zm-item"),
    link: r#"a[href*="/p/"], a[href*="/zhuanlan/"]"#,
    title: Some("h2, .Title, .zm-item-title a, .ContentItem-title a"),
    author: Some(".AuthorInfo-name, .UserLink-link"),
    date: Some(".ContentItem-time"),
    excerpt: Some(".RichContent-inner, .RichText"),
    engagement: Some(".VoteButton--up"),
};

const ZHIHU_LINK_SELECTORS: SelectorSet = SelectorSet {
    card: None,
    link: r#"a[href*="/p/"]"#,
    title: Some("h2, h3"),
    author: None,
    date: None,
    excerpt: None,
    engagement: None,
};

const MEDIUM_HREF: &str = r"^https?://([a-z0-9-]+\.)*medium\.com(/.*)?/p/";
const ZHIHU_HREF: &str = r"^https?://([a-z0-9-]+\.)*zhihu\.com(/.*)?/p/";

pub static VARIANTS: [BlogVariant; 4] = [
    BlogVariant {
        name: "medium-topics",
        source: "Medium",
        organization: "Medium",
        default_author: "Medium Author",
        summary_template: "Medium文章 (👏{n})",
        url_template: None,
        href_pattern: MEDIUM_HREF,
        selectors: MEDIUM_CARD_SELECTORS,
        min_engagement: 0,
        top_k: 12,
        scroll_cycles: 4,
        scroll_fraction: 0.8,
        settle: Duration::from_secs(5),
        scroll_wait: Duration::from_secs(3),
        target_delay: Duration::from_secs(5),
        default_targets: &[
            ("vLLM", "https://medium.com/tag/vllm"),
            ("LLM Inference", "https://medium.com/tag/llm-inference"),
            ("FlashAttention", "https://medium.com/tag/flash-attention"),
            ("Model Quantization", "https://medium.com/tag/model-quantization"),
            ("Distributed Training", "https://medium.com/tag/distributed-training"),
            ("GPU Optimization", "https://medium.com/tag/gpu-optimization"),
            ("DeepSeek", "https://medium.com/tag/deepseek"),
            ("TensorRT", "https://medium.com/tag/tensorrt"),
        ],
    },
    BlogVariant {
        name: "medium-search",
        source: "Medium",
        organization: "Medium",
        default_author: "Medium Author",
        summary_template: "Medium技术文章",
        url_template: Some("https://medium.com/search?q={query}"),
        href_pattern: MEDIUM_HREF,
        selectors: MEDIUM_LINK_SELECTORS,
        min_engagement: 0,
        top_k: 8,
        scroll_cycles: 3,
        scroll_fraction: 0.7,
        settle: Duration::from_secs(5),
        scroll_wait: Duration::from_secs(3),
        target_delay: Duration::from_secs(4),
        default_targets: &[
            ("vLLM inference optimization", "vLLM inference optimization"),
            ("FlashAttention GPU optimization", "FlashAttention GPU optimization"),
            ("DeepSeek V3 model", "DeepSeek V3 model"),
            ("TensorRT LLM", "TensorRT LLM"),
            ("LLM model quantization", "LLM model quantization"),
            ("distributed training GPU", "distributed training GPU"),
            ("LLM KV cache optimization", "LLM KV cache optimization"),
            ("continuous batching inference", "continuous batching inference"),
        ],
    },
    BlogVariant {
        name: "zhihu-topics",
        source: "知乎文章",
        organization: "知乎",
        default_author: "知乎用户",
        summary_template: "高赞文章 (👍{n})",
        url_template: None,
        href_pattern: ZHIHU_HREF,
        selectors: ZHIHU_CARD_SELECTORS,
        min_engagement: 200,
        top_k: 15,
        scroll_cycles: 3,
        scroll_fraction: 1.0,
        settle: Duration::from_secs(3),
        scroll_wait: Duration::from_millis(1500),
        target_delay: Duration::from_secs(3),
        default_targets: &[
            ("AI Infra", "https://www.zhihu.com/topic/19590316/newest?page=1"),
            ("机器学习", "https://www.zhihu.com/topic/19571750/newest?page=1"),
            ("深度学习", "https://www.zhihu.com/topic/19582815/newest?page=1"),
            ("大语言模型", "https://www.zhihu.com/topic/27081323/newest?page=1"),
            ("GPU计算", "https://www.zhihu.com/topic/20631794/newest?page=1"),
        ],
    },
    BlogVariant {
        name: "zhihu-search",
        source: "知乎文章",
        organization: "知乎",
        default_author: "知乎用户",
        summary_template: "AI Infra高赞技术文章 (👍{n})",
        url_template: Some("https://www.zhihu.com/search?type=content&q={query}"),
        href_pattern: ZHIHU_HREF,
        selectors: ZHIHU_LINK_SELECTORS,
        min_engagement: 200,
        top_k: 15,
        scroll_cycles: 3,
        scroll_fraction: 0.7,
        settle: Duration::from_secs(3),
        scroll_wait: Duration::from_secs(2),
        target_delay: Duration::from_secs(3),
        default_targets: &[
            ("vLLM PagedAttention", "vLLM PagedAttention"),
            ("FlashAttention 原理", "FlashAttention 原理"),
            ("DeepSeek-V3 解读", "DeepSeek-V3 解读"),
            ("TensorRT-LLM", "TensorRT-LLM"),
            ("LLM 推理优化", "LLM 推理优化"),
            ("DeepSpeed ZeRO", "DeepSpeed ZeRO"),
            ("模型量化 INT8", "模型量化 INT8"),
            ("分布式训练 GPU", "分布式训练 GPU"),
        ],
    },
];

pub fn variant(name: &str) -> Option<&'static BlogVariant> {
    VARIANTS.iter().find(|v| v.name == name)
}

const SCROLL_SCRIPT: &str =
    "window.scrollTo(0, document.body.scrollHeight * arguments[0]); return null;";

const EXTRACT_SCRIPT: &str = r#"
const cfg = arguments[0];
const text = (el) => (el && el.textContent ? el.textContent.trim() : '');
const pick = (root, sel) => (root && sel ? root.querySelector(sel) : null);
const clip = (s) => s.slice(0, 2000);
const out = [];
const cards = cfg.card ? Array.from(document.querySelectorAll(cfg.card)) : [];
for (const card of cards) {
  const link = pick(card, cfg.link);
  if (!link) continue;
  out.push({
    title: text(pick(card, cfg.title) || link),
    url: link.href || '',
    author: text(pick(card, cfg.author)),
    date: text(pick(card, cfg.date)),
    excerpt: text(pick(card, cfg.excerpt)),
    engagement: text(pick(card, cfg.engagement)),
    context: clip(text(card)),
  });
}
if (out.length === 0) {
  for (const link of document.querySelectorAll(cfg.link)) {
    const parent = link.closest('div') || link.parentElement;
    let title = text(link);
    if (title.length < 10) title = text(pick(parent, cfg.title));
    out.push({
      title: title,
      url: link.href || '',
      author: text(pick(parent, cfg.author)),
      date: '',
      excerpt: '',
      engagement: '',
      context: clip(text(parent)),
    });
  }
}
return out;
"#;

/// What the page script reports for one link.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DomCandidate {
    pub title: String,
    pub url: String,
    pub author: String,
    pub date: String,
    pub excerpt: String,
    pub engagement: String,
    pub context: String,
}

/// Waits around page loads.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub settle: Duration,
    pub scroll_wait: Duration,
}

#[cfg(test)]
impl Pacing {
    pub fn none() -> Self {
        Self {
            settle: Duration::ZERO,
            scroll_wait: Duration::ZERO,
        }
    }
}

pub struct BlogAdapter<D> {
    driver: D,
    variant: &'static BlogVariant,
    href_re: Regex,
    pacing: Pacing,
}

impl<D: PageDriver> BlogAdapter<D> {
    pub fn new(driver: D, variant: &'static BlogVariant) -> Result<Self> {
        let href_re = Regex::new(variant.href_pattern).map_err(|e| {
            AppError::Config(format!("bad href pattern for {}: {e}", variant.name))
        })?;
        Ok(Self {
            driver,
            variant,
            href_re,
            pacing: Pacing {
                settle: variant.settle,
                scroll_wait: variant.scroll_wait,
            },
        })
    }

    #[cfg(test)]
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    fn selector_args(&self) -> Value {
        let s = &self.variant.selectors;
        json!({
            "card": s.card,
            "link": s.link,
            "title": s.title,
            "author": s.author,
            "date": s.date,
            "excerpt": s.excerpt,
            "engagement": s.engagement,
        })
    }

    /// Keeps candidates whose URL matches the origin pattern, whose title is
    /// longer than 10 characters and whose engagement reaches the threshold.
    /// The first occurrence of a URL wins; the result is ranked by engagement
    /// and cut to top-K.
    pub fn select_candidates(
        &self,
        candidates: Vec<DomCandidate>,
        topic: &str,
    ) -> Vec<RawRecord> {
        let mut seen = HashSet::new();
        let mut kept: Vec<(u64, DomCandidate)> = Vec::new();

        for mut candidate in candidates {
            candidate.url = canonical_url(&candidate.url);
            if !self.href_re.is_match(&candidate.url) {
                continue;
            }
            if candidate.title.trim().chars().count() <= 10 {
                continue;
            }
            let engagement = engagement_of(&candidate);
            if engagement < self.variant.min_engagement {
                continue;
            }
            if !seen.insert(candidate.url.clone()) {
                continue;
            }
            kept.push((engagement, candidate));
        }

        kept.sort_by(|a, b| b.0.cmp(&a.0));
        kept.truncate(self.variant.top_k);

        kept.into_iter()
            .map(|(engagement, c)| {
                let mut raw = RawRecord::new()
                    .with("title", c.title)
                    .with("url", c.url)
                    .with("engagement", engagement)
                    .with("topic", topic);
                let optional = [
                    ("author", c.author),
                    ("published", c.date),
                    ("excerpt", c.excerpt),
                ];
                for (key, value) in optional {
                    if !value.trim().is_empty() {
                        raw.insert(key, value);
                    }
                }
                raw
            })
            .collect()
    }
}

impl<D: PageDriver> SourceAdapter for BlogAdapter<D> {
    fn label(&self) -> &str {
        self.variant.source
    }

    fn normalizer(&self) -> Normalizer {
        Normalizer::Blog(self.variant.defaults())
    }

    fn write_policy(&self) -> WritePolicy {
        WritePolicy::ReplaceSource(self.variant.source.to_string())
    }

    async fn fetch_candidates(
        &mut self,
        target: &Target,
    ) -> std::result::Result<Vec<RawRecord>, FetchError> {
        let url = self.variant.page_url(target);
        tracing::debug!("Opening {}", url);
        self.driver.navigate(&url).await?;
        tokio::time::sleep(self.pacing.settle).await;

        for _ in 0..self.variant.scroll_cycles {
            self.driver
                .execute(SCROLL_SCRIPT, vec![json!(self.variant.scroll_fraction)])
                .await?;
            tokio::time::sleep(self.pacing.scroll_wait).await;
        }

        let found = self
            .driver
            .execute(EXTRACT_SCRIPT, vec![self.selector_args()])
            .await?;
        let candidates: Vec<DomCandidate> = match found {
            Value::Null => Vec::new(),
            other => {
                serde_json::from_value(other).map_err(|e| FetchError::Parse(e.to_string()))?
            }
        };
        tracing::debug!("{} raw links on {}", candidates.len(), url);

        Ok(self.select_candidates(candidates, &target.name))
    }

    async fn finish(&mut self) {
        self.driver.close().await;
    }
}

fn count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{1,3}(?:,\d{3})+|\d+(?:\.\d+)?)\s*([kKmM万]?)")
            .expect("valid count pattern")
    })
}

fn labelled_count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:(\d{1,3}(?:,\d{3})+|\d+(?:\.\d+)?)\s*([km万]?)\s*(?:赞同|赞|upvotes?|claps?)|👍\s*(\d+))",
        )
        .expect("valid engagement pattern")
    })
}

/// The first number in `text`, honouring thousands separators and K/M/万
/// suffixes.
pub fn parse_count(text: &str) -> Option<u64> {
    let caps = count_re().captures(text)?;
    scaled(caps.get(1)?.as_str(), caps.get(2).map_or("", |m| m.as_str()))
}

/// A number followed by a vote/clap label ("1,234 赞同", "56 claps") or
/// preceded by 👍.
pub fn labelled_count(text: &str) -> Option<u64> {
    let caps = labelled_count_re().captures(text)?;
    if let Some(plain) = caps.get(3) {
        return plain.as_str().parse().ok();
    }
    scaled(caps.get(1)?.as_str(), caps.get(2).map_or("", |m| m.as_str()))
}

fn scaled(number: &str, suffix: &str) -> Option<u64> {
    let value: f64 = number.replace(',', "").parse().ok()?;
    let factor = match suffix {
        "k" | "K" => 1_000.0,
        "m" | "M" => 1_000_000.0,
        "万" => 10_000.0,
        _ => 1.0,
    };
    Some((value * factor).round() as u64)
}

fn engagement_of(candidate: &DomCandidate) -> u64 {
    if !candidate.engagement.trim().is_empty() {
        if let Some(n) = parse_count(&candidate.engagement) {
            return n;
        }
    }
    labelled_count(&candidate.context).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays canned `execute` results and records navigations.
    #[derive(Default)]
    struct FakeDriver {
        pages: VecDeque<std::result::Result<Value, FetchError>>,
        visited: Vec<String>,
        closed: bool,
    }

    impl PageDriver for FakeDriver {
        async fn navigate(&mut self, url: &str) -> std::result::Result<(), FetchError> {
            self.visited.push(url.to_string());
            Ok(())
        }

        async fn execute(
            &mut self,
            script: &str,
            _args: Vec<Value>,
        ) -> std::result::Result<Value, FetchError> {
            if script == SCROLL_SCRIPT {
                return Ok(Value::Null);
            }
            self.pages.pop_front().unwrap_or(Ok(Value::Null))
        }

        async fn close(&mut self) {
            self.closed = true;
        }
    }

    fn candidate(title: &str, url: &str, context: &str) -> DomCandidate {
        DomCandidate {
            title: title.to_string(),
            url: url.to_string(),
            context: context.to_string(),
            ..Default::default()
        }
    }

    fn adapter(name: &str) -> BlogAdapter<FakeDriver> {
        BlogAdapter::new(FakeDriver::default(), variant(name).unwrap())
            .unwrap()
            .with_pacing(Pacing::none())
    }

    #[test]
    fn test_variant_table() {
        for v in VARIANTS.iter() {
            assert!(Regex::new(v.href_pattern).is_ok(), "{}", v.name);
            assert!(!v.default_targets.is_empty(), "{}", v.name);
        }
        assert!(variant("medium-topics").is_some());
        assert!(variant("reddit").is_none());
    }

    #[test]
    fn test_page_url_encodes_keywords() {
        let v = variant("zhihu-search").unwrap();
        assert_eq!(
            v.page_url(&Target::plain("LLM 推理优化")),
            "https://www.zhihu.com/search?type=content&q=LLM%20%E6%8E%A8%E7%90%86%E4%BC%98%E5%8C%96"
        );
        let topics = variant("medium-topics").unwrap();
        assert_eq!(
            topics.page_url(&Target::new("vLLM", "https://medium.com/tag/vllm")),
            "https://medium.com/tag/vllm"
        );
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("1.2K"), Some(1200));
        assert_eq!(parse_count("3,456"), Some(3456));
        assert_eq!(parse_count("1.5万"), Some(15000));
        assert_eq!(parse_count("no digits"), None);
    }

    #[test]
    fn test_labelled_count() {
        assert_eq!(labelled_count("作者 · 1,234 赞同 · 56 评论"), Some(1234));
        assert_eq!(labelled_count("Published in X · 87 claps"), Some(87));
        assert_eq!(labelled_count("👍 450"), Some(450));
        assert_eq!(labelled_count("2024 年的总结"), None);
    }

    #[test]
    fn test_duplicate_urls_first_seen_wins() {
        let adapter = adapter("medium-topics");
        let picked = adapter.select_candidates(
            vec![
                candidate(
                    "First copy of the PagedAttention post",
                    "https://medium.com/@a/p/abc?source=tag",
                    "",
                ),
                candidate(
                    "Second copy with another title",
                    "https://medium.com/@a/p/abc?source=home",
                    "",
                ),
            ],
            "vLLM",
        );

        assert_eq!(picked.len(), 1);
        assert_eq!(
            picked[0].text("title").as_deref(),
            Some("First copy of the PagedAttention post")
        );
        assert_eq!(
            picked[0].text("url").as_deref(),
            Some("https://medium.com/@a/p/abc")
        );
        assert_eq!(picked[0].text("topic").as_deref(), Some("vLLM"));
    }

    #[test]
    fn test_filters_and_ranks_by_engagement() {
        let adapter = adapter("zhihu-topics");
        let picked = adapter.select_candidates(
            vec![
                candidate("低赞文章但标题足够长的一篇", "https://zhuanlan.zhihu.com/p/1", "150 赞同"),
                candidate("高赞文章：vLLM 原理深入解读", "https://zhuanlan.zhihu.com/p/2", "800 赞同"),
                candidate("更高赞：FlashAttention 全解析", "https://zhuanlan.zhihu.com/p/3", "2,400 赞同"),
                candidate("短标题", "https://zhuanlan.zhihu.com/p/4", "5000 赞同"),
                candidate("站外链接虽然赞很多也不要", "https://example.com/p/5", "9000 赞同"),
            ],
            "AI Infra",
        );

        let urls: Vec<_> = picked.iter().map(|r| r.text("url").unwrap()).collect();
        assert_eq!(
            urls,
            vec!["https://zhuanlan.zhihu.com/p/3", "https://zhuanlan.zhihu.com/p/2"]
        );
        assert_eq!(picked[0].count("engagement"), Some(2400));
    }

    #[test]
    fn test_top_k_truncates() {
        let adapter = adapter("medium-search");
        let candidates = (0..20)
            .map(|i| {
                candidate(
                    &format!("Continuous batching deep dive {i}"),
                    &format!("https://medium.com/p/{i}"),
                    "",
                )
            })
            .collect();

        let picked = adapter.select_candidates(candidates, "batching");
        assert_eq!(picked.len(), 8);
        assert_eq!(picked[0].text("url").as_deref(), Some("https://medium.com/p/0"));
    }

    #[tokio::test]
    async fn test_fetch_runs_scroll_cycles_and_extracts() {
        let mut adapter = adapter("medium-topics");
        adapter.driver.pages.push_back(Ok(json!([
            {
                "title": "Serving LLMs with vLLM at scale",
                "url": "https://medium.com/@b/p/xyz?source=tag_page",
                "author": "@writer",
                "date": "Mar 3, 2024",
                "excerpt": "How we serve",
                "engagement": "1.1K",
                "context": ""
            }
        ])));

        let target = Target::new("vLLM", "https://medium.com/tag/vllm");
        let raws = adapter.fetch_candidates(&target).await.unwrap();

        assert_eq!(adapter.driver.visited, vec!["https://medium.com/tag/vllm"]);
        assert_eq!(raws.len(), 1);
        assert_eq!(raws[0].count("engagement"), Some(1100));
        assert_eq!(raws[0].text("published").as_deref(), Some("Mar 3, 2024"));

        adapter.finish().await;
        assert!(adapter.driver.closed);
    }

    #[tokio::test]
    async fn test_fetch_propagates_browser_errors() {
        let mut adapter = adapter("zhihu-search");
        adapter
            .driver
            .pages
            .push_back(Err(FetchError::Browser("session deleted".to_string())));

        let result = adapter.fetch_candidates(&Target::plain("vLLM")).await;
        assert!(matches!(result, Err(FetchError::Browser(_))));
    }
}

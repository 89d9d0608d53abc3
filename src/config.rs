use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::sources::{BlogVariant, Target, ARXIV_API_URL, GITHUB_API_URL};

const APP_DIR: &str = "ai-infra-tracker";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_export_dir")]
    pub export_dir: String,

    /// Overridden by `GITHUB_TOKEN` when that is set.
    pub github_token: Option<String>,

    #[serde(default)]
    pub github: GithubConfig,

    #[serde(default)]
    pub arxiv: ArxivConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    /// Export file stem → blog source label, e.g. `medium = "Medium"`.
    #[serde(default = "default_export_sources")]
    pub export_sources: BTreeMap<String, String>,

    /// Per-variant target lists. Variants not listed here use their
    /// built-in targets.
    #[serde(default)]
    pub blog_targets: BTreeMap<String, Vec<Target>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_github_api")]
    pub api_base: String,

    #[serde(default = "default_repos")]
    pub repos: Vec<String>,

    #[serde(default = "default_github_delay")]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArxivConfig {
    #[serde(default = "default_arxiv_api")]
    pub api_base: String,

    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Entries kept per category, counted before incomplete ones are dropped.
    #[serde(default = "default_per_category_cap")]
    pub per_category_cap: usize,

    #[serde(default = "default_arxiv_delay")]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Address of an already running Chrome started with
    /// `--remote-debugging-port`. An empty string lets the WebDriver server
    /// launch its own browser, which has none of the user's logins.
    #[serde(default = "default_debugger_address")]
    pub debugger_address: Option<String>,

    #[serde(default = "default_page_load_timeout")]
    pub page_load_timeout_secs: u64,
}

fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn default_db_path() -> String {
    app_data_dir()
        .join("ai-infra-tracker.db")
        .to_string_lossy()
        .to_string()
}

fn default_export_dir() -> String {
    app_data_dir().join("export").to_string_lossy().to_string()
}

fn default_export_sources() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("medium".to_string(), "Medium".to_string()),
        ("zhihu".to_string(), "知乎文章".to_string()),
    ])
}

fn default_github_api() -> String {
    GITHUB_API_URL.to_string()
}

fn default_repos() -> Vec<String> {
    [
        "vllm-project/vllm",
        "sgl-project/sglang",
        "NVIDIA/TensorRT-LLM",
        "deepseek-ai/DeepSeek-V3",
        "flash-attention/flash-attention",
        "hpcaitech/ColossalAI",
        "microsoft/DeepSpeed",
        "meta-llama/llama",
        "QwenLM/Qwen",
        "THUDM/ChatGLM3",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_github_delay() -> u64 {
    1000
}

fn default_arxiv_api() -> String {
    ARXIV_API_URL.to_string()
}

fn default_categories() -> Vec<String> {
    vec!["cs.AI".to_string(), "cs.LG".to_string(), "cs.DC".to_string()]
}

fn default_max_results() -> u32 {
    30
}

fn default_per_category_cap() -> usize {
    20
}

fn default_arxiv_delay() -> u64 {
    2000
}

fn default_webdriver_url() -> String {
    "http://127.0.0.1:9515".to_string()
}

fn default_debugger_address() -> Option<String> {
    Some("127.0.0.1:9222".to_string())
}

fn default_page_load_timeout() -> u64 {
    60
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: default_github_api(),
            repos: default_repos(),
            delay_ms: default_github_delay(),
        }
    }
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            api_base: default_arxiv_api(),
            categories: default_categories(),
            max_results: default_max_results(),
            per_category_cap: default_per_category_cap(),
            delay_ms: default_arxiv_delay(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            debugger_address: default_debugger_address(),
            page_load_timeout_secs: default_page_load_timeout(),
        }
    }
}

impl BrowserConfig {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    /// `None` when no running browser should be attached.
    pub fn debugger_address(&self) -> Option<&str> {
        self.debugger_address
            .as_deref()
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            export_dir: default_export_dir(),
            github_token: None,
            github: GithubConfig::default(),
            arxiv: ArxivConfig::default(),
            browser: BrowserConfig::default(),
            export_sources: default_export_sources(),
            blog_targets: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Reads the default config file, writing one with defaults on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            tracing::info!("Wrote default config to {}", config_path.display());
            Ok(config)
        }
    }

    /// An explicitly named file must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AppError::Config(format!(
                "config file {} not found",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// A non-blank token from the environment replaces the file's token.
    pub fn apply_env_token(&mut self, env_token: Option<String>) {
        if let Some(token) = env_token.filter(|t| !t.trim().is_empty()) {
            self.github_token = Some(token);
        }
    }

    pub fn github_targets(&self) -> Vec<Target> {
        self.github.repos.iter().map(Target::plain).collect()
    }

    pub fn arxiv_targets(&self) -> Vec<Target> {
        self.arxiv.categories.iter().map(Target::plain).collect()
    }

    pub fn blog_targets(&self, variant: &BlogVariant) -> Vec<Target> {
        self.blog_targets
            .get(variant.name)
            .filter(|targets| !targets.is_empty())
            .cloned()
            .unwrap_or_else(|| variant.targets())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::variant;

    #[test]
    fn test_partial_file_gets_defaults() {
        let config: Config = toml::from_str(
            r#"
            db_path = "/tmp/tracker.db"

            [github]
            repos = ["a/b"]
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, "/tmp/tracker.db");
        assert_eq!(config.github.repos, vec!["a/b"]);
        assert_eq!(config.github.delay_ms, 1000);
        assert_eq!(config.github.api_base, GITHUB_API_URL);
        assert_eq!(config.arxiv.categories, vec!["cs.AI", "cs.LG", "cs.DC"]);
        assert_eq!(config.arxiv.per_category_cap, 20);
        assert_eq!(
            config.browser.debugger_address.as_deref(),
            Some("127.0.0.1:9222")
        );
        assert_eq!(config.export_sources["zhihu"], "知乎文章");
    }

    #[test]
    fn test_empty_debugger_address_disables_attach() {
        let config: Config = toml::from_str(
            r#"
            [browser]
            debugger_address = ""
            "#,
        )
        .unwrap();
        assert_eq!(config.browser.debugger_address(), None);

        let config: Config = toml::from_str("[browser]\nwebdriver_url = \"http://127.0.0.1:4444\"").unwrap();
        assert_eq!(config.browser.debugger_address(), Some("127.0.0.1:9222"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.github_token = Some("from-file".to_string());
        config.blog_targets.insert(
            "medium-search".to_string(),
            vec![Target::new("KV cache", "kv cache")],
        );
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.github_token.as_deref(), Some("from-file"));
        assert_eq!(loaded.github.repos.len(), 10);
        assert_eq!(
            loaded.blog_targets["medium-search"],
            vec![Target::new("KV cache", "kv cache")]
        );
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load_from(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_env_token_overrides_file() {
        let mut config = Config {
            github_token: Some("from-file".to_string()),
            ..Config::default()
        };

        config.apply_env_token(Some("  ".to_string()));
        assert_eq!(config.github_token.as_deref(), Some("from-file"));

        config.apply_env_token(Some("from-env".to_string()));
        assert_eq!(config.github_token.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_blog_targets_fall_back_to_variant() {
        let zhihu = variant("zhihu-search").unwrap();
        let mut config = Config::default();
        assert_eq!(config.blog_targets(zhihu), zhihu.targets());

        config
            .blog_targets
            .insert("zhihu-search".to_string(), vec![Target::plain("MoE")]);
        assert_eq!(config.blog_targets(zhihu), vec![Target::plain("MoE")]);
    }
}

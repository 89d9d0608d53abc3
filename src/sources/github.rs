use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::error::{FetchError, Result};
use crate::normalize::Normalizer;

use super::{RawRecord, SourceAdapter, Target};

pub const GITHUB_API_URL: &str = "https://api.github.com";
const USER_AGENT_STRING: &str = "ai-infra-tracker/1.0";

/// One `GET /repos/{owner}/{repo}` per target. No retries.
pub struct GithubAdapter {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl GithubAdapter {
    /// Without a token GitHub applies the anonymous rate limit.
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT_STRING)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    fn repo_url(&self, full_name: &str) -> String {
        format!("{}/repos/{}", self.api_base, full_name.trim_matches('/'))
    }
}

impl SourceAdapter for GithubAdapter {
    fn label(&self) -> &str {
        "GitHub"
    }

    fn normalizer(&self) -> Normalizer {
        Normalizer::Repo
    }

    async fn fetch_candidates(
        &mut self,
        target: &Target,
    ) -> std::result::Result<Vec<RawRecord>, FetchError> {
        let mut request = self.client.get(self.repo_url(&target.locator));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }

        match response.json::<Value>().await? {
            Value::Object(map) => Ok(vec![RawRecord::from(map)]),
            other => Err(FetchError::Parse(format!(
                "expected a repository object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

/// `None` for success statuses.
pub fn classify_status(status: StatusCode) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::FORBIDDEN => FetchError::RateLimited,
        StatusCode::NOT_FOUND => FetchError::NotFound,
        other => FetchError::Status(other.as_u16()),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

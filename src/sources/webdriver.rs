use std::time::Duration;

use reqwest::{Client, Method};
use serde_json::{json, Value};

use crate::error::{AppError, FetchError, Result};

/// The slice of browser control the blog adapter needs.
pub trait PageDriver {
    async fn navigate(&mut self, url: &str) -> std::result::Result<(), FetchError>;

    /// Runs `script` as a function body in the page; `args` are visible as
    /// `arguments[i]`. Returns whatever the script returns, as JSON.
    async fn execute(
        &mut self,
        script: &str,
        args: Vec<Value>,
    ) -> std::result::Result<Value, FetchError>;

    async fn close(&mut self);
}

/// A W3C WebDriver session on an already running driver (e.g. chromedriver).
/// With a debugger address the driver attaches to a Chrome the user started
/// with `--remote-debugging-port` instead of launching its own.
pub struct WebDriverSession {
    client: Client,
    session_url: String,
}

impl WebDriverSession {
    pub async fn attach(
        endpoint: &str,
        debugger_address: Option<&str>,
        page_load_timeout: Duration,
    ) -> Result<Self> {
        let endpoint = endpoint.trim_end_matches('/');
        let client = Client::builder()
            .timeout(page_load_timeout + Duration::from_secs(30))
            .build()?;

        let mut chrome_options = json!({});
        if let Some(addr) = debugger_address {
            chrome_options["debuggerAddress"] = json!(addr);
        }
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": chrome_options,
                    "timeouts": {
                        "pageLoad": page_load_timeout.as_millis() as u64,
                        "script": 30_000
                    }
                }
            }
        });

        let response = client
            .post(format!("{endpoint}/session"))
            .json(&capabilities)
            .send()
            .await
            .map_err(|e| AppError::Browser(format!("cannot reach WebDriver at {endpoint}: {e}")))?;
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| AppError::Browser(format!("bad session response: {e}")))?;

        if !status.is_success() {
            return Err(AppError::Browser(error_message(&payload)));
        }

        let session_id = payload["value"]["sessionId"]
            .as_str()
            .ok_or_else(|| AppError::Browser("session response has no sessionId".to_string()))?;
        tracing::info!("Attached to browser session {}", session_id);

        Ok(Self {
            client,
            session_url: format!("{endpoint}/session/{session_id}"),
        })
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Value,
    ) -> std::result::Result<Value, FetchError> {
        let url = format!("{}/{}", self.session_url, path);
        let response = self
            .client
            .request(method, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;
        let status = response.status();
        let mut payload: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Browser(format!("unreadable reply: {e}")))?;

        if !status.is_success() {
            return Err(FetchError::Browser(error_message(&payload)));
        }
        Ok(payload["value"].take())
    }
}

impl PageDriver for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> std::result::Result<(), FetchError> {
        self.command(Method::POST, "url", json!({ "url": url }))
            .await
            .map(|_| ())
    }

    async fn execute(
        &mut self,
        script: &str,
        args: Vec<Value>,
    ) -> std::result::Result<Value, FetchError> {
        self.command(
            Method::POST,
            "execute/sync",
            json!({ "script": script, "args": args }),
        )
        .await
    }

    /// Ends the session. An attached Chrome keeps running.
    async fn close(&mut self) {
        let result = self
            .client
            .delete(&self.session_url)
            .send()
            .await;
        if let Err(e) = result {
            tracing::debug!("Failed to end browser session: {}", e);
        }
    }
}

/// WebDriver errors come back as `{"value": {"error": ..., "message": ...}}`.
fn error_message(payload: &Value) -> String {
    let value = &payload["value"];
    let error = value["error"].as_str().unwrap_or("unknown error");
    match value["message"].as_str() {
        Some(message) => {
            let first_line = message.lines().next().unwrap_or_default();
            format!("{error}: {first_line}")
        }
        None => error.to_string(),
    }
}

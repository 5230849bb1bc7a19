//! `web_fetch` — SSRF-guarded HTTP GET with injection framing.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    config::{SettingsStore, ToolCategory},
    error::{CoreError, Result},
    security::{RiskLevel, domain_in_list, validate_url, validate_url_literal, wrap_untrusted},
};

use super::traits::{Tool, ToolResult};

/// Fetch timeout.
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
/// Response body cap in characters.
const BODY_CHARS: usize = 30_000;

pub struct WebFetchTool {
    settings: Arc<SettingsStore>,
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(concat!("talon/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { settings, client }
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL over HTTP GET and return the response body as text. \
         Only public http/https endpoints are reachable."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "The URL to fetch (http or https)." }
            },
            "required": ["url"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Web
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Low
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let raw = args
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'url'"))?;

        let settings = self.settings.get();

        // Scheme/literal checks always run; DNS resolution only under the
        // SSRF guard. The blocklist wins over everything.
        let url = if settings.security.ssrf_guard {
            validate_url(raw, settings.security.allow_localhost).await?
        } else {
            validate_url_literal(raw, settings.security.allow_localhost)?
        };
        if let Some(host) = url.host_str() {
            if domain_in_list(host, &settings.blocked_domains) {
                return Err(CoreError::security(format!("domain '{host}' is blocklisted")));
            }
            if !settings.allowed_domains.is_empty()
                && !domain_in_list(host, &settings.allowed_domains)
            {
                return Err(CoreError::security(format!(
                    "domain '{host}' is not on the allowlist"
                )));
            }
        }

        let response = self.client.get(url.as_str()).send().await?;
        let status = response.status();
        let body = response.text().await?;
        let body = crate::util::truncate_chars(&body, BODY_CHARS);

        let content = if settings.security.injection_guard {
            wrap_untrusted(&body, &format!("web:{}", url.host_str().unwrap_or("unknown")))
        } else {
            body
        };

        let output = format!("HTTP {status}\n\n{content}");
        if status.is_success() {
            Ok(ToolResult::ok(output))
        } else {
            Ok(ToolResult::err(output))
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

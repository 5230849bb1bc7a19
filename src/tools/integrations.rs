//! Integration tools: email, GitHub, Mastodon, Reddit.
//!
//! Each is double-gated: the runtime permission flag must be on *and* the
//! credential must be present, otherwise the call is refused before any
//! network traffic. Responses from these services are untrusted and come
//! back wrapped in the injection frame.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    config::{SettingsStore, ToolCategory},
    error::{CoreError, Result},
    security::{RiskLevel, wrap_untrusted},
    util::truncate_chars,
};

use super::traits::{Tool, ToolResult};

const RESPONSE_CHARS: usize = 10_000;

/// Named interface over the outbound mail transport (SMTP in production).
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .user_agent(concat!("talon/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

// ─── email_send ───────────────────────────────────────────────────────────────

pub struct EmailSendTool {
    settings: Arc<SettingsStore>,
    transport: Option<Arc<dyn MailTransport>>,
}

impl EmailSendTool {
    pub fn new(settings: Arc<SettingsStore>, transport: Option<Arc<dyn MailTransport>>) -> Self {
        Self { settings, transport }
    }
}

#[async_trait]
impl Tool for EmailSendTool {
    fn name(&self) -> &str {
        "email_send"
    }

    fn description(&self) -> &str {
        "Send an email through the configured account."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "to":      { "type": "string" },
                "subject": { "type": "string" },
                "body":    { "type": "string" }
            },
            "required": ["to", "subject", "body"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Email
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::High
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        if !self.settings.get().permissions.email {
            return Err(CoreError::security("email tools are disabled"));
        }
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| CoreError::security("no email account is configured"))?;

        let to = args
            .get("to")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'to'"))?;
        if !to.contains('@') || to.contains(char::is_whitespace) {
            return Err(CoreError::validation(format!("'{to}' is not a valid address")));
        }
        let subject = args
            .get("subject")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'subject'"))?;
        let body = args
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'body'"))?;

        transport.send(to, subject, body).await?;
        Ok(ToolResult::ok(format!("email sent to {to}")))
    }
}

// ─── email_read ───────────────────────────────────────────────────────────────

pub struct EmailReadTool {
    settings: Arc<SettingsStore>,
    inbox: Option<Arc<dyn crate::triggers::InboxClient>>,
}

impl EmailReadTool {
    pub fn new(
        settings: Arc<SettingsStore>,
        inbox: Option<Arc<dyn crate::triggers::InboxClient>>,
    ) -> Self {
        Self { settings, inbox }
    }
}

#[async_trait]
impl Tool for EmailReadTool {
    fn name(&self) -> &str {
        "email_read"
    }

    fn description(&self) -> &str {
        "List recent unseen messages in the configured inbox (headers only)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": { "type": "integer", "minimum": 1, "description": "Maximum messages (default 10)." }
            }
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Email
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        if !self.settings.get().permissions.email {
            return Err(CoreError::security("email tools are disabled"));
        }
        let inbox = self
            .inbox
            .as_ref()
            .ok_or_else(|| CoreError::security("no inbox account is configured"))?;
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;

        let messages = inbox.fetch_unseen(0).await?;
        if messages.is_empty() {
            return Ok(ToolResult::ok("inbox has no unseen messages"));
        }
        let lines: Vec<String> = messages
            .iter()
            .rev()
            .take(limit)
            .map(|m| format!("#{} {} — {} ({})", m.uid, m.from, m.subject, m.date))
            .collect();
        let listing = lines.join("\n");
        let content = if self.settings.get().security.injection_guard {
            wrap_untrusted(&listing, "inbox")
        } else {
            listing
        };
        Ok(ToolResult::ok(content))
    }
}

// ─── github_api ───────────────────────────────────────────────────────────────

pub struct GithubTool {
    settings: Arc<SettingsStore>,
    client: reqwest::Client,
}

impl GithubTool {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self { settings, client: http_client() }
    }
}

#[async_trait]
impl Tool for GithubTool {
    fn name(&self) -> &str {
        "github_api"
    }

    fn description(&self) -> &str {
        "Call the GitHub REST API (GET or POST) with the configured token, \
         e.g. path '/repos/owner/repo/issues'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "method": { "type": "string", "enum": ["GET", "POST"] },
                "path":   { "type": "string", "description": "API path starting with '/'." },
                "body":   { "type": "object" }
            },
            "required": ["path"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Social
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let settings = self.settings.get();
        if !settings.permissions.social {
            return Err(CoreError::security("social integrations are disabled"));
        }
        let token = settings
            .integrations
            .github_token
            .ok_or_else(|| CoreError::security("no GitHub token is configured"))?;

        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'path'"))?;
        if !path.starts_with('/') {
            return Err(CoreError::validation("path must start with '/'"));
        }
        let url = format!("https://api.github.com{path}");

        let request = match args.get("method").and_then(Value::as_str).unwrap_or("GET") {
            "GET" => self.client.get(&url),
            "POST" => {
                let body = args.get("body").cloned().unwrap_or_else(|| json!({}));
                self.client.post(&url).json(&body)
            }
            other => return Err(CoreError::validation(format!("unsupported method '{other}'"))),
        };

        let response = request
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        let status = response.status();
        let body = truncate_chars(&response.text().await?, RESPONSE_CHARS);
        let wrapped = if self.settings.get().security.injection_guard {
            wrap_untrusted(&body, "github")
        } else {
            body
        };
        let output = format!("HTTP {status}\n\n{wrapped}");
        if status.is_success() {
            Ok(ToolResult::ok(output))
        } else {
            Ok(ToolResult::err(output))
        }
    }
}

// ─── mastodon_post ────────────────────────────────────────────────────────────

pub struct MastodonPostTool {
    settings: Arc<SettingsStore>,
    client: reqwest::Client,
}

impl MastodonPostTool {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self { settings, client: http_client() }
    }
}

#[async_trait]
impl Tool for MastodonPostTool {
    fn name(&self) -> &str {
        "mastodon_post"
    }

    fn description(&self) -> &str {
        "Publish a status to the configured Mastodon account."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": { "type": "string", "maxLength": 500 }
            },
            "required": ["status"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Social
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::High
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let settings = self.settings.get();
        if !settings.permissions.social {
            return Err(CoreError::security("social integrations are disabled"));
        }
        let base = settings
            .integrations
            .mastodon_base_url
            .ok_or_else(|| CoreError::security("no Mastodon account is configured"))?;
        let token = settings
            .integrations
            .mastodon_token
            .ok_or_else(|| CoreError::security("no Mastodon token is configured"))?;

        let status = args
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'status'"))?;
        if status.chars().count() > 500 {
            return Err(CoreError::validation("status exceeds 500 characters"));
        }

        let response = self
            .client
            .post(format!("{}/api/v1/statuses", base.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {token}"))
            .json(&json!({"status": status}))
            .send()
            .await?;
        let code = response.status();
        if code.is_success() {
            Ok(ToolResult::ok("status posted"))
        } else {
            Ok(ToolResult::err(format!("Mastodon returned HTTP {code}")))
        }
    }
}

// ─── reddit_post ──────────────────────────────────────────────────────────────

pub struct RedditPostTool {
    settings: Arc<SettingsStore>,
    client: reqwest::Client,
}

impl RedditPostTool {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self { settings, client: http_client() }
    }
}

#[async_trait]
impl Tool for RedditPostTool {
    fn name(&self) -> &str {
        "reddit_post"
    }

    fn description(&self) -> &str {
        "Submit a text post to a subreddit with the configured account."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "subreddit": { "type": "string" },
                "title":     { "type": "string" },
                "text":      { "type": "string" }
            },
            "required": ["subreddit", "title", "text"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Social
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::High
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let settings = self.settings.get();
        if !settings.permissions.social {
            return Err(CoreError::security("social integrations are disabled"));
        }
        let token = settings
            .integrations
            .reddit_token
            .ok_or_else(|| CoreError::security("no Reddit token is configured"))?;

        let subreddit = args
            .get("subreddit")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'subreddit'"))?;
        let title = args
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'title'"))?;
        let text = args
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'text'"))?;

        let response = self
            .client
            .post("https://oauth.reddit.com/api/submit")
            .header("Authorization", format!("Bearer {token}"))
            .form(&[
                ("sr", subreddit),
                ("kind", "self"),
                ("title", title),
                ("text", text),
            ])
            .send()
            .await?;
        let code = response.status();
        if code.is_success() {
            Ok(ToolResult::ok(format!("posted to r/{subreddit}")))
        } else {
            Ok(ToolResult::err(format!("Reddit returned HTTP {code}")))
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

//! `browser_action` — headless Chrome behind the `browser` feature.
//!
//! Every request the page makes (subresources included) is intercepted and
//! checked against the URL validator; blocked targets fail at the network
//! layer. Arbitrary script evaluation is deliberately not offered.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use headless_chrome::{
    Browser, LaunchOptions,
    browser::{
        tab::{RequestInterceptor, RequestPausedDecision},
        transport::{SessionId, Transport},
    },
    protocol::cdp::{
        Fetch::{FailRequest, events::RequestPausedEvent},
        Network::ErrorReason,
        Page::CaptureScreenshotFormatOption,
    },
};
use serde_json::{Value, json};

use crate::{
    config::{SettingsStore, ToolCategory},
    error::{CoreError, Result},
    security::{RiskLevel, validate_url_literal, wrap_untrusted},
};

use super::traits::{Tool, ToolResult};

const TEXT_CHARS: usize = 30_000;

/// Interceptor applying the URL validator to every paused request.
struct GuardedInterceptor {
    allow_localhost: bool,
}

impl RequestInterceptor for GuardedInterceptor {
    fn intercept(
        &self,
        _transport: Arc<Transport>,
        _session_id: SessionId,
        event: RequestPausedEvent,
    ) -> RequestPausedDecision {
        let url = &event.params.request.url;
        match validate_url_literal(url, self.allow_localhost) {
            Ok(_) => RequestPausedDecision::Continue(None),
            Err(e) => {
                log::warn!("browser: blocked subresource {url}: {e}");
                RequestPausedDecision::Fail(FailRequest {
                    request_id: event.params.request_id,
                    error_reason: ErrorReason::AccessDenied,
                })
            }
        }
    }
}

struct BrowserState {
    _browser: Browser,
    tab: Arc<headless_chrome::Tab>,
}

pub struct BrowserActionTool {
    workspace: PathBuf,
    settings: Arc<SettingsStore>,
    state: Mutex<Option<BrowserState>>,
}

impl BrowserActionTool {
    pub fn new(workspace: PathBuf, settings: Arc<SettingsStore>) -> Self {
        Self {
            workspace,
            settings,
            state: Mutex::new(None),
        }
    }

    fn tab(&self) -> Result<Arc<headless_chrome::Tab>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.is_none() {
            let browser = Browser::new(
                LaunchOptions::default_builder()
                    .headless(true)
                    .build()
                    .map_err(|e| CoreError::transport(format!("browser launch options: {e}")))?,
            )
            .map_err(|e| CoreError::transport(format!("failed to launch browser: {e}")))?;
            let tab = browser
                .new_tab()
                .map_err(|e| CoreError::transport(format!("failed to open tab: {e}")))?;
            tab.enable_fetch(None, None)
                .map_err(|e| CoreError::transport(format!("fetch domain: {e}")))?;
            tab.enable_request_interception(Arc::new(GuardedInterceptor {
                allow_localhost: self.settings.get().security.allow_localhost,
            }))
            .map_err(|e| CoreError::transport(format!("request interception: {e}")))?;
            *state = Some(BrowserState { _browser: browser, tab });
        }
        state
            .as_ref()
            .map(|s| s.tab.clone())
            .ok_or_else(|| CoreError::transport("browser state missing"))
    }
}

#[async_trait]
impl Tool for BrowserActionTool {
    fn name(&self) -> &str {
        "browser_action"
    }

    fn description(&self) -> &str {
        "Drive a sandboxed headless browser. Actions: navigate(url), \
         screenshot, click(selector), type(selector, text), get_text."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action":   { "type": "string", "enum": ["navigate", "screenshot", "click", "type", "get_text"] },
                "url":      { "type": "string" },
                "selector": { "type": "string" },
                "text":     { "type": "string" }
            },
            "required": ["action"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Browser
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let action = args
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'action'"))?
            .to_string();
        let settings = self.settings.get();

        // Top-level navigation is validated up front (with DNS under the
        // SSRF guard); subresources are caught by the interceptor.
        if action == "navigate" {
            let url = args
                .get("url")
                .and_then(Value::as_str)
                .ok_or_else(|| CoreError::validation("navigate needs 'url'"))?;
            if settings.security.ssrf_guard {
                crate::security::validate_url(url, settings.security.allow_localhost).await?;
            } else {
                validate_url_literal(url, settings.security.allow_localhost)?;
            }
        }

        let tab = self.tab()?;
        let workspace = self.workspace.clone();
        let injection_guard = settings.security.injection_guard;
        let args = args.clone();

        tokio::task::spawn_blocking(move || -> Result<ToolResult> {
            match action.as_str() {
                "navigate" => {
                    let url = args.get("url").and_then(Value::as_str).unwrap_or_default();
                    tab.navigate_to(url)
                        .map_err(|e| CoreError::transport(format!("navigate failed: {e}")))?;
                    tab.wait_until_navigated()
                        .map_err(|e| CoreError::transport(format!("load failed: {e}")))?;
                    Ok(ToolResult::ok(format!("loaded {url}")))
                }
                "screenshot" => {
                    let png = tab
                        .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
                        .map_err(|e| CoreError::transport(format!("screenshot failed: {e}")))?;
                    let name = format!("screenshot-{}.png", chrono::Utc::now().format("%Y%m%dT%H%M%S"));
                    let path = workspace.join(&name);
                    std::fs::write(&path, png)
                        .map_err(|e| CoreError::transport(format!("cannot save screenshot: {e}")))?;
                    Ok(ToolResult::ok(format!("saved {name}")))
                }
                "click" => {
                    let selector = args
                        .get("selector")
                        .and_then(Value::as_str)
                        .ok_or_else(|| CoreError::validation("click needs 'selector'"))?;
                    tab.find_element(selector)
                        .map_err(|e| CoreError::validation(format!("selector not found: {e}")))?
                        .click()
                        .map_err(|e| CoreError::transport(format!("click failed: {e}")))?;
                    Ok(ToolResult::ok(format!("clicked '{selector}'")))
                }
                "type" => {
                    let selector = args
                        .get("selector")
                        .and_then(Value::as_str)
                        .ok_or_else(|| CoreError::validation("type needs 'selector'"))?;
                    let text = args
                        .get("text")
                        .and_then(Value::as_str)
                        .ok_or_else(|| CoreError::validation("type needs 'text'"))?;
                    tab.find_element(selector)
                        .map_err(|e| CoreError::validation(format!("selector not found: {e}")))?
                        .click()
                        .map_err(|e| CoreError::transport(format!("focus failed: {e}")))?;
                    tab.type_str(text)
                        .map_err(|e| CoreError::transport(format!("typing failed: {e}")))?;
                    Ok(ToolResult::ok(format!("typed into '{selector}'")))
                }
                "get_text" => {
                    let body = tab
                        .find_element("body")
                        .map_err(|e| CoreError::transport(format!("no body element: {e}")))?
                        .get_inner_text()
                        .map_err(|e| CoreError::transport(format!("text extraction failed: {e}")))?;
                    let body = crate::util::truncate_chars(&body, TEXT_CHARS);
                    let content = if injection_guard {
                        wrap_untrusted(&body, "browser")
                    } else {
                        body
                    };
                    Ok(ToolResult::ok(content))
                }
                other => Err(CoreError::validation(format!("unknown action '{other}'"))),
            }
        })
        .await
        .map_err(|e| CoreError::transport(format!("browser task panicked: {e}")))?
    }
}

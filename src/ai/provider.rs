//! The LLM provider seam.
//!
//! Concrete HTTP adapters (OpenAI-compatible, Anthropic, local runtimes) live
//! outside the core and implement [`LLMProvider`]; the core only ever sees
//! the unified request/response types.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::error::Result;

use super::types::{CompletionRequest, CompletionResponse};

/// Trait implemented by every LLM backend.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Complete a request and return the full unified response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Stable provider identifier (e.g. `"openai"`, `"anthropic"`, `"local"`).
    fn provider_name(&self) -> &str;
}

/// Providers registered at boot, addressable by id with a default fallback.
#[derive(Clone)]
pub struct ProviderSet {
    default_id: String,
    providers: HashMap<String, Arc<dyn LLMProvider>>,
}

impl ProviderSet {
    pub fn new(default_id: impl Into<String>, default_provider: Arc<dyn LLMProvider>) -> Self {
        let default_id = default_id.into();
        let mut providers = HashMap::new();
        providers.insert(default_id.clone(), default_provider);
        Self { default_id, providers }
    }

    pub fn register(&mut self, id: impl Into<String>, provider: Arc<dyn LLMProvider>) {
        self.providers.insert(id.into(), provider);
    }

    pub fn default_provider(&self) -> Arc<dyn LLMProvider> {
        self.providers[&self.default_id].clone()
    }

    /// Provider by id, falling back to the default when unknown (a routed
    /// tier whose backend is not configured degrades rather than fails).
    pub fn get(&self, id: &str) -> Arc<dyn LLMProvider> {
        self.providers
            .get(id)
            .cloned()
            .unwrap_or_else(|| self.default_provider())
    }

    pub fn has(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }
}

/// Placeholder wired in when no provider adapter is configured. Every call
/// fails with a transport error naming the fix, so the rest of the runtime
/// (gateway, event plane, stores) still comes up.
pub struct UnconfiguredProvider;

#[async_trait]
impl LLMProvider for UnconfiguredProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
        Err(crate::error::CoreError::transport(
            "no LLM provider configured; set LLM_PROVIDER and the matching API key",
        ))
    }

    fn provider_name(&self) -> &str {
        "unconfigured"
    }
}

// ─── Scripted provider (tests) ────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::*;
    use scripted::ScriptedProvider;

    #[tokio::test]
    async fn provider_set_falls_back_to_default() {
        let set = ProviderSet::new("openai", ScriptedProvider::text("hi"));
        assert!(set.has("openai"));
        assert!(!set.has("local"));
        let p = set.get("local");
        assert_eq!(p.provider_name(), "scripted");
    }

    #[tokio::test]
    async fn scripted_provider_replays_in_order() {
        use crate::ai::types::{CompletionRequest, CompletionResponse, Message};
        let p = ScriptedProvider::new(vec![
            CompletionResponse::text("one"),
            CompletionResponse::text("two"),
        ]);
        let req = CompletionRequest::new("m", vec![Message::user("x")]);
        assert_eq!(p.complete(req.clone()).await.unwrap().content, "one");
        assert_eq!(p.complete(req.clone()).await.unwrap().content, "two");
        assert_eq!(p.complete(req).await.unwrap().content, "No more responses");
        assert_eq!(p.request_count(), 3);
    }
}

//! `remember` / `recall` — thin wrappers over the memory collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{
    config::ToolCategory,
    error::{CoreError, Result},
    memory::Memory,
    security::RiskLevel,
};

use super::traits::{Tool, ToolResult};

pub struct RememberTool {
    memory: Arc<dyn Memory>,
}

impl RememberTool {
    pub fn new(memory: Arc<dyn Memory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for RememberTool {
    fn name(&self) -> &str {
        "remember"
    }

    fn description(&self) -> &str {
        "Store a fact in long-term memory under a namespaced key \
         (e.g. 'user:birthday')."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key":     { "type": "string", "description": "Namespaced key, e.g. 'user:timezone'." },
                "content": { "type": "string", "description": "The fact to remember." }
            },
            "required": ["key", "content"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Automation
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let key = args
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'key'"))?;
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'content'"))?;
        self.memory.store(key, content).await?;
        Ok(ToolResult::ok(format!("remembered '{key}'")))
    }
}

pub struct RecallTool {
    memory: Arc<dyn Memory>,
}

impl RecallTool {
    pub fn new(memory: Arc<dyn Memory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for RecallTool {
    fn name(&self) -> &str {
        "recall"
    }

    fn description(&self) -> &str {
        "Search long-term memory by keywords and return matching entries."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Keywords to search for." },
                "limit": { "type": "integer", "description": "Maximum entries (default 5).", "minimum": 1 }
            },
            "required": ["query"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Automation
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Low
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::validation("missing required argument 'query'"))?;
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(5) as usize;

        let entries = self.memory.recall(query, limit).await?;
        if entries.is_empty() {
            return Ok(ToolResult::ok("no matching memories"));
        }
        let lines: Vec<String> = entries
            .iter()
            .map(|e| format!("- {}: {}", e.key, e.content))
            .collect();
        Ok(ToolResult::ok(lines.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::KeywordMemory;

    #[tokio::test]
    async fn remember_then_recall() {
        let memory: Arc<dyn Memory> = Arc::new(KeywordMemory::new());
        let remember = RememberTool::new(memory.clone());
        let recall = RecallTool::new(memory);

        remember
            .execute(json!({"key": "user:city", "content": "Lisbon"}))
            .await
            .unwrap();
        let r = recall.execute(json!({"query": "Lisbon"})).await.unwrap();
        assert!(r.output.contains("user:city"));
    }

    #[tokio::test]
    async fn recall_empty_reports_no_matches() {
        let memory: Arc<dyn Memory> = Arc::new(KeywordMemory::new());
        let recall = RecallTool::new(memory);
        let r = recall.execute(json!({"query": "nothing"})).await.unwrap();
        assert_eq!(r.output, "no matching memories");
    }

    #[tokio::test]
    async fn missing_args_are_validation_errors() {
        let memory: Arc<dyn Memory> = Arc::new(KeywordMemory::new());
        assert!(RememberTool::new(memory.clone()).execute(json!({})).await.is_err());
        assert!(RecallTool::new(memory).execute(json!({})).await.is_err());
    }
}

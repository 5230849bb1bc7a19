//! Cost tools: query today's spend, configure the budget.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::{config::ToolCategory, cost::CostTracker, error::Result, security::RiskLevel};

use super::traits::{Tool, ToolResult};

pub struct GetUsageTool {
    cost: Arc<CostTracker>,
}

impl GetUsageTool {
    pub fn new(cost: Arc<CostTracker>) -> Self {
        Self { cost }
    }
}

#[async_trait]
impl Tool for GetUsageTool {
    fn name(&self) -> &str {
        "get_usage"
    }

    fn description(&self) -> &str {
        "Report today's LLM usage: call count, tokens, estimated cost, and \
         the configured budget."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Automation
    }

    fn risk(&self) -> RiskLevel {
        RiskLevel::Low
    }

    async fn execute(&self, _args: Value) -> Result<ToolResult> {
        let today = self.cost.today();
        let config = self.cost.config();
        Ok(ToolResult::ok(format!(
            "today: {} calls, {} in / {} out tokens, ${:.4} spent (budget ${:.2}/day, hard stop {})",
            today.call_count,
            today.input_tokens,
            today.output_tokens,
            today.cost,
            config.daily_budget,
            if config.hard_stop { "on" } else { "off" },
        )))
    }
}

pub struct ConfigureBudgetTool {
    cost: Arc<CostTracker>,
}

impl ConfigureBudgetTool {
    pub fn new(cost: Arc<CostTracker>) -> Self {
        Self { cost }
    }
}

#[async_trait]
impl Tool for ConfigureBudgetTool {
    fn name(&self) -> &str {
        "configure_budget"
    }

    fn description(&self) -> &str {
        "Set the daily (and optional weekly) LLM budget in USD and the \
         hard-stop flag."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "daily_budget":  { "type": "number", "minimum": 0 },
                "weekly_budget": { "type": "number", "minimum": 0 },
                "hard_stop":     { "type": "boolean" }
            }
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Automation
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let mut config = self.cost.config();
        if let Some(daily) = args.get("daily_budget").and_then(Value::as_f64) {
            config.daily_budget = daily;
        }
        if let Some(weekly) = args.get("weekly_budget").and_then(Value::as_f64) {
            config.weekly_budget = Some(weekly);
        }
        if let Some(hard) = args.get("hard_stop").and_then(Value::as_bool) {
            config.hard_stop = hard;
        }
        self.cost.set_config(config.clone())?;
        Ok(ToolResult::ok(format!(
            "budget set: ${:.2}/day{}, hard stop {}",
            config.daily_budget,
            config
                .weekly_budget
                .map(|w| format!(", ${w:.2}/week"))
                .unwrap_or_default(),
            if config.hard_stop { "on" } else { "off" },
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::BudgetConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn usage_report_includes_counts() {
        let dir = TempDir::new().unwrap();
        let cost = Arc::new(CostTracker::load(dir.path()).unwrap());
        cost.track_usage("m", crate::ai::TokenUsage { input_tokens: 10, output_tokens: 2 }, 0.001);

        let r = GetUsageTool::new(cost).execute(json!({})).await.unwrap();
        assert!(r.output.contains("1 calls"));
        assert!(r.output.contains("10 in"));
    }

    #[tokio::test]
    async fn configure_updates_persisted_budget() {
        let dir = TempDir::new().unwrap();
        let cost = Arc::new(CostTracker::load(dir.path()).unwrap());
        ConfigureBudgetTool::new(cost.clone())
            .execute(json!({"daily_budget": 1.5, "hard_stop": false}))
            .await
            .unwrap();

        let config = cost.config();
        assert_eq!(config.daily_budget, 1.5);
        assert!(!config.hard_stop);
        assert_eq!(config, BudgetConfig { daily_budget: 1.5, weekly_budget: None, hard_stop: false });
    }
}

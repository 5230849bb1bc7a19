//! Daily cost accounting and the budget hard-stop.
//!
//! Every LLM response is recorded here *before* the caller observes it, so
//! usage is monotonic. `costs.json` keeps the last 90 daily records;
//! `cost-config.json` holds the budget.

use std::{path::PathBuf, sync::RwLock};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{
    ai::TokenUsage,
    error::Result,
    util::{atomic_write, today_stamp},
};

const HISTORY_DAYS: usize = 90;

// ─── Records ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub call_count: u64,
}

/// One day of usage. Exactly one record exists per date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsage {
    pub date: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub call_count: u64,
    #[serde(default)]
    pub by_model: HashMap<String, ModelUsage>,
}

impl DailyUsage {
    fn empty(date: String) -> Self {
        Self {
            date,
            input_tokens: 0,
            output_tokens: 0,
            cost: 0.0,
            call_count: 0,
            by_model: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct BudgetConfig {
    /// USD per day.
    pub daily_budget: f64,
    /// Optional USD per rolling 7 days.
    pub weekly_budget: Option<f64>,
    /// Refuse new LLM calls once the budget is reached.
    pub hard_stop: bool,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_budget: 5.0,
            weekly_budget: None,
            hard_stop: true,
        }
    }
}

// ─── CostTracker ──────────────────────────────────────────────────────────────

pub struct CostTracker {
    costs_path: PathBuf,
    config_path: PathBuf,
    days: RwLock<Vec<DailyUsage>>,
    config: RwLock<BudgetConfig>,
}

impl CostTracker {
    pub fn load(workspace: &std::path::Path) -> Result<Self> {
        let costs_path = workspace.join("costs.json");
        let config_path = workspace.join("cost-config.json");

        let days: Vec<DailyUsage> = std::fs::read_to_string(&costs_path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        let config: BudgetConfig = std::fs::read_to_string(&config_path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();

        Ok(Self {
            costs_path,
            config_path,
            days: RwLock::new(days),
            config: RwLock::new(config),
        })
    }

    /// Record one LLM response. Creates today's record on first use.
    pub fn track_usage(&self, model: &str, usage: TokenUsage, cost: f64) {
        let today = today_stamp();
        {
            let mut days = self.days.write().unwrap_or_else(|e| e.into_inner());
            if !days.iter().any(|d| d.date == today) {
                days.push(DailyUsage::empty(today.clone()));
                if days.len() > HISTORY_DAYS {
                    let overflow = days.len() - HISTORY_DAYS;
                    days.drain(..overflow);
                }
            }
            let Some(day) = days.iter_mut().find(|d| d.date == today) else {
                return;
            };
            day.input_tokens += usage.input_tokens;
            day.output_tokens += usage.output_tokens;
            day.cost += cost;
            day.call_count += 1;

            let per_model = day.by_model.entry(model.to_string()).or_default();
            per_model.input_tokens += usage.input_tokens;
            per_model.output_tokens += usage.output_tokens;
            per_model.cost += cost;
            per_model.call_count += 1;
        }
        if let Err(e) = self.persist_days() {
            log::warn!("cost tracker: persist failed: {e}");
        }
    }

    /// Today's record (empty when nothing was tracked yet).
    pub fn today(&self) -> DailyUsage {
        let today = today_stamp();
        self.days
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|d| d.date == today)
            .cloned()
            .unwrap_or_else(|| DailyUsage::empty(today))
    }

    /// All retained daily records, oldest first.
    pub fn history(&self) -> Vec<DailyUsage> {
        self.days.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn config(&self) -> BudgetConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_config(&self, config: BudgetConfig) -> Result<()> {
        {
            let mut guard = self.config.write().unwrap_or_else(|e| e.into_inner());
            *guard = config;
        }
        let raw = serde_json::to_string_pretty(&self.config())?;
        atomic_write(&self.config_path, &raw)
    }

    /// False once the hard stop is active and today (or this week) has
    /// reached its budget.
    pub fn can_make_call(&self) -> bool {
        let config = self.config();
        if !config.hard_stop {
            return true;
        }
        let today = self.today();
        if today.cost >= config.daily_budget {
            return false;
        }
        if let Some(weekly) = config.weekly_budget
            && self.week_cost() >= weekly
        {
            return false;
        }
        true
    }

    /// Budget still available today (never negative).
    pub fn remaining_budget(&self) -> f64 {
        let config = self.config();
        (config.daily_budget - self.today().cost).max(0.0)
    }

    fn week_cost(&self) -> f64 {
        let days = self.days.read().unwrap_or_else(|e| e.into_inner());
        let cutoff = chrono::Utc::now().date_naive() - chrono::Duration::days(6);
        days.iter()
            .filter(|d| {
                chrono::NaiveDate::parse_from_str(&d.date, "%Y-%m-%d")
                    .map(|date| date >= cutoff)
                    .unwrap_or(false)
            })
            .map(|d| d.cost)
            .sum()
    }

    fn persist_days(&self) -> Result<()> {
        let snapshot = self.history();
        let raw = serde_json::to_string_pretty(&snapshot)?;
        atomic_write(&self.costs_path, &raw)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tracker(dir: &TempDir) -> CostTracker {
        CostTracker::load(dir.path()).unwrap()
    }

    #[test]
    fn usage_accumulates_into_one_daily_record() {
        let dir = TempDir::new().unwrap();
        let t = tracker(&dir);

        t.track_usage("m1", TokenUsage { input_tokens: 100, output_tokens: 10 }, 0.01);
        t.track_usage("m1", TokenUsage { input_tokens: 200, output_tokens: 20 }, 0.02);
        t.track_usage("m2", TokenUsage { input_tokens: 50, output_tokens: 5 }, 0.005);

        let today = t.today();
        assert_eq!(today.call_count, 3);
        assert_eq!(today.input_tokens, 350);
        assert_eq!(today.output_tokens, 35);
        assert!((today.cost - 0.035).abs() < 1e-9);
        assert_eq!(t.history().len(), 1);
    }

    #[test]
    fn call_count_equals_sum_of_per_model_counts() {
        let dir = TempDir::new().unwrap();
        let t = tracker(&dir);
        for i in 0..5 {
            let model = if i % 2 == 0 { "a" } else { "b" };
            t.track_usage(model, TokenUsage { input_tokens: 1, output_tokens: 1 }, 0.0);
        }
        let today = t.today();
        let per_model_total: u64 = today.by_model.values().map(|m| m.call_count).sum();
        assert_eq!(today.call_count, per_model_total);
    }

    #[test]
    fn usage_survives_reload() {
        let dir = TempDir::new().unwrap();
        {
            let t = tracker(&dir);
            t.track_usage("m", TokenUsage { input_tokens: 10, output_tokens: 1 }, 0.5);
        }
        let t2 = tracker(&dir);
        assert_eq!(t2.today().input_tokens, 10);
        assert!((t2.today().cost - 0.5).abs() < 1e-9);
    }

    #[test]
    fn hard_stop_refuses_once_budget_reached() {
        let dir = TempDir::new().unwrap();
        let t = tracker(&dir);
        t.set_config(BudgetConfig { daily_budget: 0.01, weekly_budget: None, hard_stop: true })
            .unwrap();

        assert!(t.can_make_call());
        t.track_usage("m", TokenUsage { input_tokens: 1000, output_tokens: 1000 }, 0.01);
        assert!(!t.can_make_call());
    }

    #[test]
    fn soft_budget_never_refuses() {
        let dir = TempDir::new().unwrap();
        let t = tracker(&dir);
        t.set_config(BudgetConfig { daily_budget: 0.01, weekly_budget: None, hard_stop: false })
            .unwrap();
        t.track_usage("m", TokenUsage { input_tokens: 1, output_tokens: 1 }, 100.0);
        assert!(t.can_make_call());
    }

    #[test]
    fn weekly_budget_enforced() {
        let dir = TempDir::new().unwrap();
        let t = tracker(&dir);
        t.set_config(BudgetConfig {
            daily_budget: 100.0,
            weekly_budget: Some(0.5),
            hard_stop: true,
        })
        .unwrap();
        t.track_usage("m", TokenUsage { input_tokens: 1, output_tokens: 1 }, 0.6);
        assert!(!t.can_make_call());
    }

    #[test]
    fn remaining_budget_clamps_at_zero() {
        let dir = TempDir::new().unwrap();
        let t = tracker(&dir);
        t.set_config(BudgetConfig { daily_budget: 0.1, weekly_budget: None, hard_stop: true })
            .unwrap();
        t.track_usage("m", TokenUsage { input_tokens: 1, output_tokens: 1 }, 5.0);
        assert_eq!(t.remaining_budget(), 0.0);
    }

    #[test]
    fn config_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        {
            let t = tracker(&dir);
            t.set_config(BudgetConfig { daily_budget: 2.5, weekly_budget: Some(10.0), hard_stop: false })
                .unwrap();
        }
        let t2 = tracker(&dir);
        let cfg = t2.config();
        assert_eq!(cfg.daily_budget, 2.5);
        assert_eq!(cfg.weekly_budget, Some(10.0));
        assert!(!cfg.hard_stop);
    }
}

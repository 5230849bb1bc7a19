//! `ModelRouter` — maps abstract model tiers to concrete provider+model
//! targets with price coefficients, and picks a tier per orchestrated
//! subtask.
//!
//! Routing rules, in order:
//! 1. `requires_privacy` → local tier if configured, otherwise balanced
//!    (with a warning in the rationale).
//! 2. remaining budget below [`LOW_BUDGET_THRESHOLD`] → cheapest tier.
//! 3. explicit tier request → that tier.
//! 4. complexity: 1–3 fast, 4–7 balanced, 8–10 reasoning.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::types::TokenUsage;

/// Remaining budget under which routing collapses to the cheapest tier.
pub const LOW_BUDGET_THRESHOLD: f64 = 0.10;

// ─── ModelTier ────────────────────────────────────────────────────────────────

/// Abstract capability/cost tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Fast,
    Balanced,
    Reasoning,
    Local,
}

impl ModelTier {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Some(Self::Fast),
            "balanced" => Some(Self::Balanced),
            "reasoning" => Some(Self::Reasoning),
            "local" => Some(Self::Local),
            _ => None,
        }
    }

    /// Tier for a 1–10 complexity score.
    pub fn for_complexity(complexity: u8) -> Self {
        match complexity {
            0..=3 => Self::Fast,
            4..=7 => Self::Balanced,
            _ => Self::Reasoning,
        }
    }
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModelTier::Fast => "fast",
            ModelTier::Balanced => "balanced",
            ModelTier::Reasoning => "reasoning",
            ModelTier::Local => "local",
        };
        write!(f, "{s}")
    }
}

// ─── ModelRoute ───────────────────────────────────────────────────────────────

/// A concrete provider + model pair with price coefficients (USD per 1K
/// tokens). The local tier carries zero coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRoute {
    pub tier: ModelTier,
    pub provider_id: String,
    pub model: String,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
}

impl ModelRoute {
    pub fn new(
        tier: ModelTier,
        provider_id: impl Into<String>,
        model: impl Into<String>,
        input_cost_per_1k: f64,
        output_cost_per_1k: f64,
    ) -> Self {
        Self {
            tier,
            provider_id: provider_id.into(),
            model: model.into(),
            input_cost_per_1k,
            output_cost_per_1k,
        }
    }

    /// Estimated cost in USD for the given usage on this route.
    pub fn cost_of(&self, usage: TokenUsage) -> f64 {
        (usage.input_tokens as f64 / 1000.0) * self.input_cost_per_1k
            + (usage.output_tokens as f64 / 1000.0) * self.output_cost_per_1k
    }
}

// ─── RouteDecision ────────────────────────────────────────────────────────────

/// The routed target plus a free-text rationale recorded on the sub-agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDecision {
    pub route: ModelRoute,
    pub rationale: String,
}

// ─── ModelRouter ──────────────────────────────────────────────────────────────

pub struct ModelRouter {
    routes: HashMap<ModelTier, ModelRoute>,
}

impl ModelRouter {
    pub fn new(routes: Vec<ModelRoute>) -> Self {
        Self {
            routes: routes.into_iter().map(|r| (r.tier, r)).collect(),
        }
    }

    /// Production defaults: small/mid/large hosted models, no local runtime.
    pub fn default_routes(provider_id: &str) -> Self {
        Self::new(vec![
            ModelRoute::new(ModelTier::Fast, provider_id, "gpt-4o-mini", 0.00015, 0.0006),
            ModelRoute::new(ModelTier::Balanced, provider_id, "claude-sonnet-4-5", 0.003, 0.015),
            ModelRoute::new(ModelTier::Reasoning, provider_id, "claude-opus-4-5", 0.015, 0.075),
        ])
    }

    /// Register (or replace) a route, e.g. a local runtime discovered at boot.
    pub fn set_route(&mut self, route: ModelRoute) {
        self.routes.insert(route.tier, route);
    }

    pub fn route_for(&self, tier: ModelTier) -> Option<&ModelRoute> {
        self.routes.get(&tier)
    }

    pub fn has_local(&self) -> bool {
        self.routes.contains_key(&ModelTier::Local)
    }

    /// All configured routes, fast → local.
    pub fn all(&self) -> Vec<&ModelRoute> {
        let order = [ModelTier::Fast, ModelTier::Balanced, ModelTier::Reasoning, ModelTier::Local];
        order.iter().filter_map(|t| self.routes.get(t)).collect()
    }

    /// The configured route with the lowest output price (the local tier wins
    /// when present — its coefficients are zero).
    fn cheapest(&self) -> &ModelRoute {
        let mut best: Option<&ModelRoute> = None;
        for route in self.routes.values() {
            match best {
                Some(current) if route.output_cost_per_1k >= current.output_cost_per_1k => {}
                _ => best = Some(route),
            }
        }
        best.unwrap_or_else(|| panic!("router configured with no routes"))
    }

    fn balanced_or_cheapest(&self) -> &ModelRoute {
        self.routes.get(&ModelTier::Balanced).unwrap_or_else(|| self.cheapest())
    }

    /// Pick a route for one planned subtask.
    pub fn route_subtask(
        &self,
        requires_privacy: bool,
        requested_tier: Option<ModelTier>,
        complexity: u8,
        remaining_budget: Option<f64>,
    ) -> RouteDecision {
        if requires_privacy {
            if let Some(local) = self.routes.get(&ModelTier::Local) {
                return RouteDecision {
                    route: local.clone(),
                    rationale: "privacy-sensitive subtask routed to the local runtime".into(),
                };
            }
            log::warn!("router: privacy requested but no local tier is configured");
            return RouteDecision {
                route: self.balanced_or_cheapest().clone(),
                rationale: "privacy requested but no local tier configured; using balanced".into(),
            };
        }

        if let Some(remaining) = remaining_budget
            && remaining < LOW_BUDGET_THRESHOLD
        {
            return RouteDecision {
                route: self.cheapest().clone(),
                rationale: format!("remaining budget ${remaining:.2} is low; using cheapest tier"),
            };
        }

        if let Some(tier) = requested_tier
            && let Some(route) = self.routes.get(&tier)
        {
            return RouteDecision {
                route: route.clone(),
                rationale: format!("subtask requested the {tier} tier"),
            };
        }

        let tier = ModelTier::for_complexity(complexity);
        let route = self
            .routes
            .get(&tier)
            .unwrap_or_else(|| self.balanced_or_cheapest())
            .clone();
        RouteDecision {
            rationale: format!("complexity {complexity} mapped to the {tier} tier"),
            route,
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

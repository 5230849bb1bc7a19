//! Plans and planned subtasks, the orchestration heuristic, and the
//! JSON-contract plan parser with its graceful degradation path.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{ai::ModelTier, error::CoreError, error::Result};

// ─── Roles / status ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubtaskRole {
    Researcher,
    Coder,
    Writer,
    Reviewer,
    #[default]
    Executor,
}

impl SubtaskRole {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "researcher" | "research" => Self::Researcher,
            "coder" | "code" | "developer" => Self::Coder,
            "writer" | "write" => Self::Writer,
            "reviewer" | "review" => Self::Reviewer,
            _ => Self::Executor,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Researcher => "researcher",
            Self::Coder => "coder",
            Self::Writer => "writer",
            Self::Reviewer => "reviewer",
            Self::Executor => "executor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Planning,
    Executing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

// ─── PlannedSubtask / Plan ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedSubtask {
    pub id: String,
    pub title: String,
    pub description: String,
    pub role: SubtaskRole,
    pub tier: ModelTier,
    /// Subtasks sharing a label run concurrently; labels run in
    /// lexicographic order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_group: Option<String>,
    pub complexity: u8,
    pub requires_privacy: bool,
    pub status: SubtaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Prerequisite subtask ids.
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub parent_task_id: String,
    pub objective: String,
    pub subtasks: Vec<PlannedSubtask>,
    pub status: PlanStatus,
}

impl Plan {
    pub fn new(parent_task_id: impl Into<String>, objective: impl Into<String>, subtasks: Vec<PlannedSubtask>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_task_id: parent_task_id.into(),
            objective: objective.into(),
            subtasks,
            status: PlanStatus::Planning,
        }
    }

    /// Dependency map: subtask id → prerequisite ids.
    pub fn dependencies(&self) -> HashMap<String, Vec<String>> {
        self.subtasks
            .iter()
            .map(|s| (s.id.clone(), s.depends_on.clone()))
            .collect()
    }
}

// ─── Heuristic ────────────────────────────────────────────────────────────────

/// Decide whether a `create_task` description warrants orchestration.
///
/// Fires on length (> 100 words) or on two independent complexity
/// indicators.
pub fn should_orchestrate(description: &str) -> bool {
    if description.split_whitespace().count() > 100 {
        return true;
    }
    let lower = description.to_lowercase();
    let mut indicators = 0;

    if lower.matches(" and ").count() >= 2 {
        indicators += 1;
    }
    if lower.contains("steps") {
        indicators += 1;
    }
    if lower.contains("first") && lower.contains("then") {
        indicators += 1;
    }
    if lower.contains("compare") && lower.contains("with") {
        indicators += 1;
    }
    if lower.contains("research") && lower.contains("write") {
        indicators += 1;
    }
    if lower.contains("analyze") && lower.contains("report") {
        indicators += 1;
    }
    if ["plan", "comprehensive", "multiple"].iter().any(|w| lower.contains(w)) {
        indicators += 1;
    }

    indicators >= 2
}

// ─── Planning prompt + parser ─────────────────────────────────────────────────

/// The JSON-only planning contract sent to the model.
pub fn planning_prompt(objective: &str) -> String {
    format!(
        "Decompose the following objective into subtasks for a team of \
         sub-agents. Respond with ONLY a JSON object, no prose:\n\
         {{\"subtasks\": [{{\n\
         \"title\": \"...\",\n\
         \"description\": \"...\",\n\
         \"role\": \"researcher|coder|writer|reviewer|executor\",\n\
         \"modelTier\": \"fast|balanced|reasoning|local\",\n\
         \"parallelGroup\": \"A\",            // optional; same letter = runs concurrently\n\
         \"complexity\": 5,                    // 1-10\n\
         \"requiresPrivacy\": false,\n\
         \"dependsOn\": [\"title of prerequisite\"]\n\
         }}]}}\n\n\
         Subtasks that depend on each other must go in later parallel groups \
         than their prerequisites.\n\n\
         Objective: {objective}"
    )
}

/// Pull the first JSON object out of a model reply (tolerates code fences
/// and prose around it).
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end >= start).then(|| &text[start..=end])
}

/// Parse the planning response into subtasks.
///
/// Errors become [`CoreError::Plan`]; the caller degrades to
/// [`fallback_plan`].
pub fn parse_plan_response(text: &str) -> Result<Vec<PlannedSubtask>> {
    let raw = extract_json(text).ok_or_else(|| CoreError::Plan("no JSON object in reply".into()))?;
    let doc: Value =
        serde_json::from_str(raw).map_err(|e| CoreError::Plan(format!("unparseable JSON: {e}")))?;
    let entries = doc
        .get("subtasks")
        .and_then(Value::as_array)
        .ok_or_else(|| CoreError::Plan("missing 'subtasks' array".into()))?;
    if entries.is_empty() {
        return Err(CoreError::Plan("empty subtask list".into()));
    }

    let mut subtasks = Vec::with_capacity(entries.len());
    let mut title_to_id: HashMap<String, String> = HashMap::new();
    for entry in entries {
        let title = entry
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::Plan("subtask without title".into()))?
            .to_string();
        let id = Uuid::new_v4().to_string();
        title_to_id.insert(title.clone(), id.clone());
        subtasks.push(PlannedSubtask {
            id,
            title,
            description: entry
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            role: SubtaskRole::parse(entry.get("role").and_then(Value::as_str).unwrap_or("")),
            tier: entry
                .get("modelTier")
                .and_then(Value::as_str)
                .and_then(ModelTier::parse)
                .unwrap_or(ModelTier::Balanced),
            parallel_group: entry
                .get("parallelGroup")
                .and_then(Value::as_str)
                .map(str::to_string),
            complexity: entry
                .get("complexity")
                .and_then(Value::as_u64)
                .map(|c| c.clamp(1, 10) as u8)
                .unwrap_or(5),
            requires_privacy: entry
                .get("requiresPrivacy")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            status: SubtaskStatus::Pending,
            result: None,
            depends_on: Vec::new(),
            assigned_agent: None,
        });
    }

    // Second pass: resolve dependsOn titles into ids (unknown titles are
    // dropped rather than failing the whole plan).
    for (subtask, entry) in subtasks.iter_mut().zip(entries) {
        if let Some(deps) = entry.get("dependsOn").and_then(Value::as_array) {
            subtask.depends_on = deps
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|title| title_to_id.get(title).cloned())
                .collect();
        }
    }

    ensure_acyclic(&subtasks)?;
    Ok(subtasks)
}

/// Reject plans whose dependency graph contains a cycle.
fn ensure_acyclic(subtasks: &[PlannedSubtask]) -> Result<()> {
    let deps: HashMap<&str, &[String]> = subtasks
        .iter()
        .map(|s| (s.id.as_str(), s.depends_on.as_slice()))
        .collect();

    // Iterative DFS with colouring: 0 unvisited, 1 in progress, 2 done.
    let mut colour: HashMap<&str, u8> = HashMap::new();
    for start in deps.keys() {
        if colour.get(start).copied().unwrap_or(0) != 0 {
            continue;
        }
        let mut stack = vec![(*start, 0usize)];
        colour.insert(start, 1);
        while let Some((node, next_child)) = stack.pop() {
            let children = deps.get(node).copied().unwrap_or(&[]);
            if next_child < children.len() {
                stack.push((node, next_child + 1));
                let child = children[next_child].as_str();
                match colour.get(child).copied().unwrap_or(0) {
                    0 => {
                        colour.insert(child, 1);
                        stack.push((child, 0));
                    }
                    1 => return Err(CoreError::Plan("dependency cycle detected".into())),
                    _ => {}
                }
            } else {
                colour.insert(node, 2);
            }
        }
    }
    Ok(())
}

/// Degradation path: the whole objective as one balanced-tier work item.
pub fn fallback_plan(objective: &str) -> Vec<PlannedSubtask> {
    vec![PlannedSubtask {
        id: Uuid::new_v4().to_string(),
        title: "Complete the objective".to_string(),
        description: objective.to_string(),
        role: SubtaskRole::Executor,
        tier: ModelTier::Balanced,
        parallel_group: None,
        complexity: 5,
        requires_privacy: false,
        status: SubtaskStatus::Pending,
        result: None,
        depends_on: Vec::new(),
        assigned_agent: None,
    }]
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Heuristic ────────────────────────────────────────────────────────

    #[test]
    fn short_simple_requests_stay_inline() {
        assert!(!should_orchestrate("What's the weather like?"));
        assert!(!should_orchestrate("Remind me to stretch"));
    }

    #[test]
    fn research_and_write_comparison_triggers() {
        assert!(should_orchestrate(
            "Research three renewable energy sources and write a comparison report with pros and cons"
        ));
    }

    #[test]
    fn long_requests_trigger_on_word_count() {
        let long = "word ".repeat(101);
        assert!(should_orchestrate(&long));
    }

    #[test]
    fn single_indicator_is_not_enough() {
        assert!(!should_orchestrate("Please research quantum computing"));
        assert!(!should_orchestrate("What steps does the recipe have?"));
    }

    #[test]
    fn first_then_plus_plan_triggers() {
        assert!(should_orchestrate(
            "First draft a plan for the migration, then execute it"
        ));
    }

    // ── Plan parsing ─────────────────────────────────────────────────────

    const PLAN_JSON: &str = r#"{"subtasks": [
        {"title": "Gather sources", "description": "Find papers", "role": "researcher",
         "modelTier": "fast", "parallelGroup": "A", "complexity": 2, "requiresPrivacy": false},
        {"title": "Write summary", "description": "Summarize", "role": "writer",
         "modelTier": "balanced", "complexity": 6, "dependsOn": ["Gather sources"]}
    ]}"#;

    #[test]
    fn parses_full_plan() {
        let subtasks = parse_plan_response(PLAN_JSON).unwrap();
        assert_eq!(subtasks.len(), 2);
        assert_eq!(subtasks[0].role, SubtaskRole::Researcher);
        assert_eq!(subtasks[0].tier, ModelTier::Fast);
        assert_eq!(subtasks[0].parallel_group.as_deref(), Some("A"));
        assert_eq!(subtasks[1].depends_on, vec![subtasks[0].id.clone()]);
    }

    #[test]
    fn tolerates_code_fences() {
        let fenced = format!("Here is the plan:\n```json\n{PLAN_JSON}\n```\nDone.");
        assert_eq!(parse_plan_response(&fenced).unwrap().len(), 2);
    }

    #[test]
    fn garbage_is_a_plan_error() {
        assert!(matches!(parse_plan_response("no json here"), Err(CoreError::Plan(_))));
        assert!(matches!(parse_plan_response("{\"subtasks\": []}"), Err(CoreError::Plan(_))));
        assert!(matches!(parse_plan_response("{\"other\": 1}"), Err(CoreError::Plan(_))));
    }

    #[test]
    fn unknown_dependency_titles_dropped() {
        let raw = r#"{"subtasks": [
            {"title": "A", "complexity": 3, "dependsOn": ["Nonexistent"]}
        ]}"#;
        let subtasks = parse_plan_response(raw).unwrap();
        assert!(subtasks[0].depends_on.is_empty());
    }

    #[test]
    fn dependency_cycle_rejected() {
        let raw = r#"{"subtasks": [
            {"title": "A", "dependsOn": ["B"]},
            {"title": "B", "dependsOn": ["A"]}
        ]}"#;
        assert!(matches!(parse_plan_response(raw), Err(CoreError::Plan(_))));
    }

    #[test]
    fn complexity_clamped_to_range() {
        let raw = r#"{"subtasks": [{"title": "A", "complexity": 99}]}"#;
        assert_eq!(parse_plan_response(raw).unwrap()[0].complexity, 10);
    }

    #[test]
    fn fallback_is_single_balanced_item() {
        let plan = fallback_plan("do the thing");
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].tier, ModelTier::Balanced);
        assert_eq!(plan[0].description, "do the thing");
    }
}

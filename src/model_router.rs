//! Per-reviewer model selection by diff size, §4.4.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::Result;

/// Hardcoded fallback used when no `model_routing.json` is present.
fn default_reviewer_models() -> HashMap<String, String> {
    let mut reviewers = HashMap::new();
    reviewers.insert("security".to_string(), "claude-opus-4-6".to_string());
    reviewers.insert(
        "correctness".to_string(),
        "claude-sonnet-4-5-20250929".to_string(),
    );
    reviewers.insert(
        "performance".to_string(),
        "claude-sonnet-4-5-20250929".to_string(),
    );
    reviewers.insert(
        "maintainability".to_string(),
        "claude-haiku-4-5-20251001".to_string(),
    );
    reviewers.insert("reliability".to_string(), "claude-opus-4-6".to_string());
    reviewers
}

/// The `auto_routing` block of the routing config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoRoutingConfig {
    /// Below this line count, every reviewer uses `small_model`.
    pub small_diff_lines: usize,
    /// At or above this line count, the large-diff rule applies.
    pub large_diff_lines: usize,
    /// Model used for small diffs, regardless of reviewer.
    pub small_model: String,
    /// Model used for medium diffs with no explicit override.
    pub medium_model: String,
    /// Model used for large diffs from high-stakes reviewers.
    pub large_high_stakes_model: String,
    /// Model used for large diffs from other reviewers.
    pub large_other_model: String,
    /// Reviewer ids treated as high-stakes for large diffs.
    pub high_stakes_reviewers: Vec<String>,
}

impl Default for AutoRoutingConfig {
    fn default() -> Self {
        Self {
            small_diff_lines: 50,
            large_diff_lines: 500,
            small_model: "claude-haiku-4-5-20251001".into(),
            medium_model: "claude-sonnet-4-5-20250929".into(),
            large_high_stakes_model: "claude-opus-4-6".into(),
            large_other_model: "claude-sonnet-4-5-20250929".into(),
            high_stakes_reviewers: vec!["security".into(), "reliability".into()],
        }
    }
}

/// Per-model `{input, output}` cost per 1K tokens, in USD.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelCost {
    /// Cost per 1K input tokens.
    pub input: f64,
    /// Cost per 1K output tokens.
    pub output: f64,
}

/// Full model-routing configuration, §6 `model_routing.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Model used when no reviewer-specific override applies.
    pub default: String,
    /// Explicit per-reviewer overrides for the medium-diff band.
    pub reviewers: HashMap<String, String>,
    /// Model used for Layer 2 cross-checks.
    pub validation_cross_check: String,
    /// Diff-size-driven auto routing rules.
    pub auto_routing: AutoRoutingConfig,
    /// Per-model cost table.
    pub model_costs: HashMap<String, ModelCost>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let mut model_costs = HashMap::new();
        model_costs.insert(
            "claude-opus-4-6".to_string(),
            ModelCost {
                input: 0.015,
                output: 0.075,
            },
        );
        model_costs.insert(
            "claude-sonnet-4-5-20250929".to_string(),
            ModelCost {
                input: 0.003,
                output: 0.015,
            },
        );
        model_costs.insert(
            "claude-haiku-4-5-20251001".to_string(),
            ModelCost {
                input: 0.00025,
                output: 0.00125,
            },
        );

        Self {
            default: "claude-sonnet-4-5-20250929".into(),
            reviewers: default_reviewer_models(),
            validation_cross_check: "claude-haiku-4-5-20251001".into(),
            auto_routing: AutoRoutingConfig::default(),
            model_costs,
        }
    }
}

impl RoutingConfig {
    /// Load a routing config from a JSON file, falling back to
    /// [`Default`] on any missing-file or malformed-JSON condition — the
    /// router must always be able to route, even with no config present.
    pub fn from_json_file(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|_| Self::default()),
            Err(_) => Self::default(),
        }
    }
}

/// Selects an LLM model per reviewer and diff size, §4.4.
#[derive(Debug, Clone)]
pub struct ModelRouter {
    config: RoutingConfig,
}

impl ModelRouter {
    /// Build a router from an explicit config.
    pub fn new(config: RoutingConfig) -> Self {
        Self { config }
    }

    /// Build a router from a JSON file, falling back to defaults.
    pub fn from_file(path: &Path) -> Self {
        Self::new(RoutingConfig::from_json_file(path))
    }

    /// Pick a model for a reviewer given the diff's line count, following
    /// the priority chain in §4.4 exactly:
    /// 1. small diff overrides everything with `small_model`;
    /// 2. large diff routes by high-stakes membership;
    /// 3. medium diff uses the explicit per-reviewer override, or `default`.
    pub fn get_model(&self, reviewer_id: &str, diff_lines: usize) -> String {
        let routing = &self.config.auto_routing;

        if diff_lines < routing.small_diff_lines {
            return routing.small_model.clone();
        }

        if diff_lines >= routing.large_diff_lines {
            return if routing
                .high_stakes_reviewers
                .iter()
                .any(|id| id == reviewer_id)
            {
                routing.large_high_stakes_model.clone()
            } else {
                routing.large_other_model.clone()
            };
        }

        self.config
            .reviewers
            .get(reviewer_id)
            .cloned()
            .unwrap_or_else(|| self.config.default.clone())
    }

    /// The model always used for Layer 2 cross-checks.
    pub fn get_cross_check_model(&self) -> String {
        self.config.validation_cross_check.clone()
    }

    /// Estimate the USD cost of a single reviewer call.
    pub fn estimate_cost(&self, reviewer_id: &str, diff_lines: usize, prompt_tokens: u64, completion_tokens: u64) -> Result<f64> {
        let model = self.get_model(reviewer_id, diff_lines);
        let cost = self
            .config
            .model_costs
            .get(&model)
            .copied()
            .unwrap_or(ModelCost {
                input: 0.0,
                output: 0.0,
            });
        let total = (prompt_tokens as f64 / 1000.0) * cost.input
            + (completion_tokens as f64 / 1000.0) * cost.output;
        Ok(total)
    }
}

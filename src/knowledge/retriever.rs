//! Two-tier (global + project) knowledge retrieval, §4.6.

use std::collections::HashMap;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::types::{SourceTier, TaggedResult};
use crate::knowledge::embeddings::EmbeddingProvider;
use crate::knowledge::rag_engine::RagEngine;
use crate::validator::HistoricalLookup;

static FILE_PATH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(?:---|\+\+\+)\s+[ab]/(.+)$").unwrap());
static PYTHON_DEF_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\+.*(?:def|class)\s+(\w+)").unwrap());
static JS_FUNC_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\+.*function\s+(\w+)").unwrap());
static IMPORT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\+\s*(?:import\s+(\w+)|from\s+(\w+))").unwrap());

/// Configuration for two-tier retrieval, §4.6.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Directory holding the global (shared-across-projects) store, if it
    /// exists.
    pub global_store_dir: Option<PathBuf>,
    /// Directory holding the project-local store, if it exists.
    pub project_store_dir: Option<PathBuf>,
    /// Default token budget for [`format_knowledge_section`].
    pub token_budget: usize,
    /// Default `top_k`.
    pub top_k: usize,
    /// Minimum similarity score kept after merging tiers.
    pub min_score: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            global_store_dir: None,
            project_store_dir: Some(PathBuf::from(".development/knowledge")),
            token_budget: 500,
            top_k: 5,
            min_score: 0.3,
        }
    }
}

/// Two-tier retrieval engine merging global and project-local knowledge.
pub struct KnowledgeRetriever {
    config: RetrievalConfig,
    global_engine: Option<RagEngine>,
    project_engine: Option<RagEngine>,
}

impl KnowledgeRetriever {
    /// Construct a retriever, opening a [`RagEngine`] for each tier that
    /// actually exists on disk. `make_provider` is invoked once per tier
    /// that needs opening, so each tier can use an independently fitted
    /// embedding provider.
    pub fn new<F>(config: RetrievalConfig, mut make_provider: F) -> Self
    where
        F: FnMut() -> Box<dyn EmbeddingProvider>,
    {
        let global_engine = config
            .global_store_dir
            .as_ref()
            .filter(|p| p.is_dir())
            .map(|p| RagEngine::new(p.clone(), make_provider()));
        let project_engine = config
            .project_store_dir
            .as_ref()
            .filter(|p| p.is_dir())
            .map(|p| RagEngine::new(p.clone(), make_provider()));

        Self {
            config,
            global_engine,
            project_engine,
        }
    }

    /// Extract a compact query string from a diff: file paths, Python
    /// `def`/`class` names and JS `function` names from added lines, and
    /// imported module names, in that order.
    pub fn extract_diff_signals(diff_content: &str) -> String {
        if diff_content.trim().is_empty() {
            return String::new();
        }

        let mut signals = Vec::new();
        for caps in FILE_PATH_PATTERN.captures_iter(diff_content) {
            signals.push(caps[1].to_string());
        }
        for caps in PYTHON_DEF_PATTERN.captures_iter(diff_content) {
            signals.push(caps[1].to_string());
        }
        for caps in JS_FUNC_PATTERN.captures_iter(diff_content) {
            signals.push(caps[1].to_string());
        }
        for caps in IMPORT_PATTERN.captures_iter(diff_content) {
            let module = caps.get(1).or_else(|| caps.get(2));
            if let Some(module) = module {
                signals.push(module.as_str().to_string());
            }
        }

        signals.join(" ")
    }

    /// Query both available tiers, merge by `chunk_id` keeping the higher
    /// score, drop anything below `min_score`, and return the top `top_k`
    /// sorted by score descending.
    pub fn retrieve(&mut self, reviewer_id: &str, diff_context: &str, top_k: Option<usize>) -> Vec<TaggedResult> {
        let effective_top_k = top_k.unwrap_or(self.config.top_k);

        let mut query = Self::extract_diff_signals(diff_context);
        if query.trim().is_empty() {
            query = diff_context.to_string();
        }
        if query.trim().is_empty() {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        if let Some(engine) = self.global_engine.as_mut() {
            for result in engine.query(reviewer_id, &query, effective_top_k) {
                candidates.push(TaggedResult {
                    chunk: result.chunk,
                    score: result.score as f64,
                    source_tier: SourceTier::Global,
                });
            }
        }
        if let Some(engine) = self.project_engine.as_mut() {
            for result in engine.query(reviewer_id, &query, effective_top_k) {
                candidates.push(TaggedResult {
                    chunk: result.chunk,
                    score: result.score as f64,
                    source_tier: SourceTier::Project,
                });
            }
        }

        let mut seen: HashMap<String, TaggedResult> = HashMap::new();
        for candidate in candidates {
            let id = candidate.chunk.chunk_id.clone();
            match seen.get(&id) {
                Some(existing) if existing.score >= candidate.score => {}
                _ => {
                    seen.insert(id, candidate);
                }
            }
        }

        let min_score = self.config.min_score;
        let mut merged: Vec<TaggedResult> = seen
            .into_values()
            .filter(|r| r.score >= min_score)
            .collect();
        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        merged.truncate(effective_top_k);
        merged
    }

    /// Format retrieval results as a `## Relevant Knowledge` markdown
    /// section, stopping before any entry that would exceed `token_budget`
    /// (approximated as 4 characters per token).
    pub fn format_knowledge_section(results: &[TaggedResult], token_budget: usize) -> String {
        if results.is_empty() || token_budget == 0 {
            return String::new();
        }

        let char_budget = token_budget * 4;
        let header = "## Relevant Knowledge\n\n";
        let mut output = header.to_string();
        let mut remaining = char_budget.saturating_sub(header.len());

        for result in results {
            let tag = match result.source_tier {
                SourceTier::Global => "global",
                SourceTier::Project => "project",
            };
            let entry = format!("- [{tag}] {}\n", result.chunk.text);
            if entry.len() > remaining {
                break;
            }
            output.push_str(&entry);
            remaining -= entry.len();
        }

        output
    }
}

/// Adapts a [`KnowledgeRetriever`] to the validator's [`HistoricalLookup`]
/// interface. `retrieve` needs `&mut self` — the embedding providers
/// mutate internal fit state — while Layer 3 only has a shared reference,
/// so the retriever is held behind a `RefCell`.
pub struct RetrieverLookup<'a>(pub &'a std::cell::RefCell<KnowledgeRetriever>);

impl<'a> HistoricalLookup for RetrieverLookup<'a> {
    fn query(&self, reviewer_id: &str, text: &str) -> Result<Vec<TaggedResult>, String> {
        match self.0.try_borrow_mut() {
            Ok(mut retriever) => Ok(retriever.retrieve(reviewer_id, text, None)),
            Err(_) => Err("knowledge retriever is already borrowed".into()),
        }
    }
}

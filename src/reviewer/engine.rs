//! Two-phase reviewer engine: build task prompts, then parse the
//! dispatcher's responses into structured results, §4.9.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::types::{RawFinding, ReviewerId};
use crate::model_router::ModelRouter;
use crate::reviewer::loader::ReviewerLoader;

const MAX_DIFF_CHARS: usize = 50_000;
const MAX_RESPONSE_CHARS: usize = 500_000;
const TRUNCATION_MARKER: &str = "\n[... truncated ...]\n";

static SCORE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"SCORE:\s*([\d.]+)").unwrap());
static SUMMARY_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"SUMMARY:\s*(.+)").unwrap());
static JSON_ARRAY_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[.*?\]").unwrap());
static FENCED_JSON_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap());
static BARE_OBJECT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)(\{[^{}]*\})").unwrap());

fn reviewer_name(id: ReviewerId) -> &'static str {
    match id {
        ReviewerId::Security => "Security Reviewer",
        ReviewerId::Correctness => "Correctness Reviewer",
        ReviewerId::Performance => "Performance Reviewer",
        ReviewerId::Maintainability => "Maintainability Reviewer",
        ReviewerId::Reliability => "Reliability Reviewer",
    }
}

/// A fully composed Phase-1 task specification.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    /// Which reviewer this task is for.
    pub reviewer_id: ReviewerId,
    /// Display name.
    pub reviewer_name: String,
    /// Fully composed prompt, with sanitization applied.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Whether this reviewer's domain matches the diff.
    pub relevant: bool,
    /// Approximate token count, `len(prompt) / 4`.
    pub token_count: usize,
    /// Model to route this task to, if a router or override was supplied.
    pub model: Option<String>,
}

/// A single reviewer's response, dispatched by the caller and handed back
/// for Phase 2 parsing.
#[derive(Debug, Clone)]
pub struct TaskResponse {
    /// Reviewer that produced this response.
    pub reviewer_id: String,
    /// Raw response text.
    pub response: String,
}

/// Parsed, structured result for one reviewer, §4.9 Phase 2.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewerResult {
    /// Reviewer id (kept as a string to tolerate unrecognized ids from a
    /// misbehaving dispatcher without failing the batch).
    pub reviewer_id: String,
    /// Display name.
    pub reviewer_name: String,
    /// Score in `[0, 10]`.
    pub score: f64,
    /// `score >= 7.0`.
    pub passed: bool,
    /// Findings extracted from the response.
    pub findings: Vec<RawFinding>,
    /// One-line summary.
    pub summary: String,
    /// Whether this reviewer was relevant to the diff.
    pub relevant: bool,
    /// Approximate prompt token count (0 for Phase-2-only results).
    pub token_count: usize,
}

/// A property to verify, injected into the prompt's "Properties to Verify"
/// section.
#[derive(Debug, Clone)]
pub struct PropertySpec {
    /// Property kind, e.g. `"INVARIANT"`.
    pub prop_type: String,
    /// Human-readable statement of the property.
    pub statement: String,
}

/// Replace triple-backtick runs with space-separated single backticks so a
/// reviewer-supplied diff or knowledge block cannot escape its own fenced
/// code block. A security invariant (§9), not a stylistic choice — applies
/// to every prompt-building path, not only this one.
pub fn neutralize_fences(text: &str) -> String {
    text.replace("```", "` ` `")
}

/// Truncate `text` to `MAX_DIFF_CHARS`, appending an explicit marker.
pub fn truncate_diff(text: &str) -> String {
    if text.len() <= MAX_DIFF_CHARS {
        return text.to_string();
    }
    let mut truncated = safe_prefix(text, MAX_DIFF_CHARS).to_string();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

/// Byte-index-safe prefix: finds the nearest char boundary at or before
/// `max_chars` bytes, so a multi-byte UTF-8 sequence is never split.
fn safe_prefix(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Two-phase engine driving reviewer prompt construction and response
/// parsing.
#[derive(Debug)]
pub struct ReviewerEngine {
    loader: ReviewerLoader,
}

impl ReviewerEngine {
    /// Build an engine that loads reviewer configs from `reviewers_dir`.
    pub fn new(reviewers_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            loader: ReviewerLoader::new(reviewers_dir),
        }
    }

    /// Phase 1: build one task spec per reviewer.
    ///
    /// `knowledge_section` lets the caller inject a retriever-formatted
    /// `## Relevant Knowledge` block per reviewer; when absent, a raw dump
    /// of the reviewer's `KNOWLEDGE.md` is used instead. `single_model`
    /// overrides `model_router` for every reviewer; without either, `model`
    /// is left `None`.
    pub fn prepare_review_tasks(
        &self,
        files: &[String],
        diff_content: &str,
        properties: &[PropertySpec],
        knowledge_section: Option<&std::collections::HashMap<String, String>>,
        model_router: Option<&ModelRouter>,
        single_model: Option<&str>,
    ) -> crate::core::errors::Result<Vec<TaskSpec>> {
        let configs = self.loader.load_all(if files.is_empty() { None } else { Some(files) })?;

        let diff_lines = if diff_content.is_empty() {
            0
        } else {
            diff_content.lines().count()
        };

        let tasks = configs
            .into_iter()
            .map(|config| {
                let prompt = build_task_prompt(
                    &config,
                    files,
                    diff_content,
                    properties,
                    knowledge_section.and_then(|m| m.get(config.id.as_str())),
                );
                let token_count = prompt.len() / 4;

                let model = single_model
                    .map(|m| m.to_string())
                    .or_else(|| model_router.map(|r| r.get_model(config.id.as_str(), diff_lines)));

                TaskSpec {
                    reviewer_id: config.id,
                    reviewer_name: reviewer_name(config.id).to_string(),
                    prompt,
                    temperature: config.temperature,
                    relevant: config.relevant,
                    token_count,
                    model,
                }
            })
            .collect();

        Ok(tasks)
    }

    /// Phase 2: parse dispatcher responses into structured results. Never
    /// raises on arbitrary input (P13).
    pub fn parse_results(responses: &[TaskResponse]) -> Vec<ReviewerResult> {
        responses.iter().map(parse_one_response).collect()
    }
}

fn build_task_prompt(
    config: &crate::core::types::ReviewerConfig,
    files: &[String],
    diff_content: &str,
    properties: &[PropertySpec],
    knowledge_section: Option<&str>,
) -> String {
    let mut parts: Vec<String> = vec![config.prompt.clone()];

    match knowledge_section {
        Some(section) if !section.is_empty() => {
            parts.push("\n---\n".to_string());
            parts.push(neutralize_fences(section));
        }
        _ => {
            if !config.knowledge.is_empty() {
                parts.push("\n---\n".to_string());
                parts.push("# Repository Knowledge\n".to_string());
                parts.push(neutralize_fences(&config.knowledge));
            }
        }
    }

    parts.push("\n---\n".to_string());
    parts.push("# Files to Review\n".to_string());
    if files.is_empty() {
        parts.push("No files specified.".to_string());
    } else {
        for file in files {
            parts.push(format!("- `{file}`"));
        }
    }

    if !diff_content.is_empty() {
        let sanitized = neutralize_fences(&truncate_diff(diff_content));
        parts.push("\n# Diff\n".to_string());
        parts.push("```diff".to_string());
        parts.push(sanitized);
        parts.push("```".to_string());
    }

    if !properties.is_empty() {
        parts.push("\n# Properties to Verify\n".to_string());
        for prop in properties {
            parts.push(format!("- **{}**: {}", prop.prop_type, prop.statement));
        }
    }

    parts.push("\n---\n".to_string());
    parts.push("# Instructions\n".to_string());
    parts.push(
        "Analyze the files and diff above according to your domain. Return your findings as a \
         JSON array of objects using the Output Format defined in your prompt. If you find no \
         issues, return an empty array `[]`.\nAfter the findings array, provide a brief summary \
         line starting with `SUMMARY:` and a score line starting with `SCORE:` (0-10)."
            .to_string(),
    );

    parts.join("\n")
}

fn parse_one_response(item: &TaskResponse) -> ReviewerResult {
    let reviewer_id = item.reviewer_id.clone();
    let reviewer_name = ReviewerId::parse(&reviewer_id)
        .map(|id| reviewer_name(id).to_string())
        .unwrap_or_else(|| format!("{} Reviewer", title_case(&reviewer_id)));

    if item.response.trim().is_empty() {
        return ReviewerResult {
            reviewer_id,
            reviewer_name,
            score: 0.0,
            passed: false,
            findings: Vec::new(),
            summary: "No response received from reviewer.".to_string(),
            relevant: true,
            token_count: 0,
        };
    }

    let response = item.response.as_str();
    let for_findings = safe_prefix(response, MAX_RESPONSE_CHARS);

    let findings = parse_findings(for_findings, &reviewer_id);
    let score = extract_score(&findings, response);
    let summary = extract_summary(&findings, response, &reviewer_id);

    ReviewerResult {
        reviewer_id,
        reviewer_name,
        score,
        passed: score >= 7.0,
        findings,
        summary,
        relevant: true,
        token_count: 0,
    }
}

fn parse_findings(response: &str, reviewer_id: &str) -> Vec<RawFinding> {
    if let Some(m) = JSON_ARRAY_PATTERN.find(response) {
        if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(m.as_str()) {
            let findings: Vec<RawFinding> = items
                .iter()
                .filter_map(|v| parse_finding_value(v, reviewer_id))
                .collect();
            if !findings.is_empty() {
                return findings;
            }
        }
    }

    let mut findings = Vec::new();
    let mut any_block = false;
    for caps in FENCED_JSON_PATTERN.captures_iter(response) {
        any_block = true;
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&caps[1]) {
            if let Some(f) = parse_finding_value(&value, reviewer_id) {
                findings.push(f);
            }
        }
    }
    if !any_block {
        for caps in BARE_OBJECT_PATTERN.captures_iter(response) {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&caps[1]) {
                if let Some(f) = parse_finding_value(&value, reviewer_id) {
                    findings.push(f);
                }
            }
        }
    }
    findings
}

fn parse_finding_value(value: &serde_json::Value, reviewer_id: &str) -> Option<RawFinding> {
    let obj = value.as_object()?;
    let get_str = |key: &str| obj.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let get_f64 = |key: &str| obj.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0);
    let get_u32 = |key: &str| obj.get(key).and_then(|v| v.as_u64()).unwrap_or(0) as u32;

    Some(RawFinding {
        file: get_str("file"),
        line_start: get_u32("line_start"),
        line_end: get_u32("line_end"),
        category: get_str("category"),
        severity: get_f64("severity"),
        confidence: get_f64("confidence"),
        description: get_str("description"),
        remediation: get_str("remediation"),
        reviewer_id: reviewer_id.to_string(),
    })
}

fn extract_score(findings: &[RawFinding], response: &str) -> f64 {
    if let Some(caps) = SCORE_PATTERN.captures(response) {
        if let Ok(score) = caps[1].parse::<f64>() {
            return score.clamp(0.0, 10.0);
        }
    }

    if findings.is_empty() {
        return 10.0;
    }

    let max_severity = findings.iter().map(|f| f.severity).fold(0.0_f64, f64::max);
    (10.0 - max_severity).max(0.0)
}

fn extract_summary(findings: &[RawFinding], response: &str, reviewer_id: &str) -> String {
    if let Some(caps) = SUMMARY_PATTERN.captures(response) {
        return caps[1].trim().to_string();
    }

    let title = title_case(reviewer_id);
    if findings.is_empty() {
        return format!("{title} review: no issues found.");
    }

    let count = findings.len();
    let high_sev = findings.iter().filter(|f| f.severity >= 7.0).count();
    if high_sev > 0 {
        format!("{title} review: {count} finding(s), {high_sev} high severity.")
    } else {
        format!("{title} review: {count} finding(s).")
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutralize_fences_prevents_fence_escape() {
        let input = "some text ```js\nalert(1)\n``` more";
        let sanitized = neutralize_fences(input);
        assert!(!sanitized.contains("```"));
    }

    #[test]
    fn truncate_diff_adds_marker_only_when_too_long() {
        let small = "x".repeat(100);
        assert_eq!(truncate_diff(&small), small);

        let big = "x".repeat(60_000);
        let truncated = truncate_diff(&big);
        assert!(truncated.contains("truncated"));
        assert!(truncated.len() < big.len());
    }

    #[test]
    fn s3_all_clean_responses_parse_to_zero_findings() {
        let responses = vec![TaskResponse {
            reviewer_id: "security".into(),
            response: "[]\nSCORE: 10.0\nSUMMARY: Clean.".into(),
        }];
        let results = ReviewerEngine::parse_results(&responses);
        assert_eq!(results[0].findings.len(), 0);
        assert_eq!(results[0].score, 10.0);
        assert_eq!(results[0].summary, "Clean.");
    }

    #[test]
    fn empty_response_fails_with_zero_score() {
        let responses = vec![TaskResponse {
            reviewer_id: "security".into(),
            response: "   ".into(),
        }];
        let results = ReviewerEngine::parse_results(&responses);
        assert_eq!(results[0].score, 0.0);
        assert!(!results[0].passed);
        assert!(results[0].summary.contains("No response"));
    }

    #[test]
    fn p13_parser_never_panics_on_garbage() {
        let responses = vec![TaskResponse {
            reviewer_id: "security".into(),
            response: "{{{ not json at all [[[ SCORE: nope".into(),
        }];
        let results = ReviewerEngine::parse_results(&responses);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn score_defaults_to_ten_minus_max_severity_without_score_line() {
        let responses = vec![TaskResponse {
            reviewer_id: "security".into(),
            response: r#"[{"file":"a.py","line_start":1,"category":"x","severity":6,"confidence":5,"description":"d","remediation":"r"}]"#.into(),
        }];
        let results = ReviewerEngine::parse_results(&responses);
        assert_eq!(results[0].findings.len(), 1);
        assert_eq!(results[0].score, 4.0);
    }

    #[test]
    fn findings_from_fenced_json_block_are_parsed() {
        let response = "Some text\n```json\n{\"file\":\"a.py\",\"line_start\":2,\"category\":\"x\",\"severity\":3,\"confidence\":4,\"description\":\"d\",\"remediation\":\"r\"}\n```\nSCORE: 8.0";
        let responses = vec![TaskResponse {
            reviewer_id: "correctness".into(),
            response: response.into(),
        }];
        let results = ReviewerEngine::parse_results(&responses);
        assert_eq!(results[0].findings.len(), 1);
        assert_eq!(results[0].score, 8.0);
    }
}

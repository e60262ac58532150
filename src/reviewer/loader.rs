//! Loads reviewer prompt/knowledge/temperature from disk and applies the
//! domain relevance gate, §4.8.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::errors::{ReviewError, Result};
use crate::core::types::{ReviewerConfig, ReviewerId};

static TEMPERATURE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)##\s+Temperature\s*\n+\s*([\d.]+)").unwrap());

fn default_temperature(id: ReviewerId) -> f64 {
    match id {
        ReviewerId::Security => 0.3,
        ReviewerId::Correctness => 0.5,
        ReviewerId::Performance => 0.4,
        ReviewerId::Maintainability => 0.6,
        ReviewerId::Reliability => 0.4,
    }
}

fn domain_extensions(id: ReviewerId) -> &'static [&'static str] {
    match id {
        ReviewerId::Security => &[
            ".py", ".js", ".ts", ".go", ".java", ".rb", ".php", ".sh", ".sql", ".yml", ".yaml",
            ".json", ".env", ".toml",
        ],
        ReviewerId::Correctness => &[".py", ".js", ".ts", ".go", ".java", ".rb", ".rs", ".c", ".cpp", ".cs"],
        ReviewerId::Performance => &[".py", ".js", ".ts", ".go", ".java", ".rs", ".sql", ".c", ".cpp"],
        ReviewerId::Maintainability => &["*"],
        ReviewerId::Reliability => &[".py", ".js", ".ts", ".go", ".java", ".rs", ".c", ".cpp"],
    }
}

/// Loads the five fixed reviewer configurations from a reviewers root.
#[derive(Debug)]
pub struct ReviewerLoader {
    reviewers_dir: PathBuf,
}

impl ReviewerLoader {
    /// Build a loader rooted at `reviewers_dir`.
    pub fn new(reviewers_dir: impl Into<PathBuf>) -> Self {
        Self {
            reviewers_dir: reviewers_dir.into(),
        }
    }

    /// Load all five reviewers, gating relevance against `diff_files`.
    /// `None` marks every reviewer relevant.
    pub fn load_all(&self, diff_files: Option<&[String]>) -> Result<Vec<ReviewerConfig>> {
        if !self.reviewers_dir.is_dir() {
            return Err(ReviewError::MissingReviewersDir {
                path: self.reviewers_dir.clone(),
            });
        }

        ReviewerId::ALL
            .iter()
            .map(|&id| self.load_one(id, diff_files))
            .collect()
    }

    /// Load a single reviewer by id.
    pub fn load_one(&self, id: ReviewerId, diff_files: Option<&[String]>) -> Result<ReviewerConfig> {
        let reviewer_dir = self.reviewers_dir.join(id.as_str());

        let prompt_path = reviewer_dir.join("PROMPT.md");
        let prompt = std::fs::read_to_string(&prompt_path).map_err(|_| ReviewError::MissingPrompt {
            reviewer_id: id.as_str().to_string(),
            path: prompt_path.clone(),
        })?;

        let knowledge_path = reviewer_dir.join("KNOWLEDGE.md");
        let knowledge = std::fs::read_to_string(&knowledge_path).unwrap_or_default();

        let temperature = parse_temperature(&prompt, id);
        let relevant = match diff_files {
            Some(files) => check_relevance(id, files),
            None => true,
        };

        Ok(ReviewerConfig {
            id,
            prompt,
            knowledge,
            temperature,
            relevant,
        })
    }

    /// Validate a reviewer id against the closed five-id set, for callers
    /// that accept ids from outside the type system (e.g. JSON configs).
    pub fn validate_id(reviewer_id: &str) -> Result<ReviewerId> {
        ReviewerId::parse(reviewer_id).ok_or_else(|| ReviewError::UnknownReviewer {
            reviewer_id: reviewer_id.to_string(),
        })
    }
}

fn parse_temperature(prompt: &str, id: ReviewerId) -> f64 {
    TEMPERATURE_PATTERN
        .captures(prompt)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .unwrap_or_else(|| default_temperature(id))
}

fn check_relevance(id: ReviewerId, diff_files: &[String]) -> bool {
    if diff_files.is_empty() {
        return true;
    }

    let extensions = domain_extensions(id);
    if extensions.contains(&"*") {
        return true;
    }

    diff_files.iter().any(|file| {
        let suffix = Path::new(file)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()));
        matches!(suffix, Some(s) if extensions.contains(&s.as_str()))
    })
}

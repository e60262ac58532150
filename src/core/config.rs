//! Engine-wide configuration, loaded once per process and threaded through
//! explicitly rather than read from globals (§9 "Global mutable state").

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::Result;

/// Aggregate configuration for a single engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root directory holding `<reviewer_id>/PROMPT.md` + `KNOWLEDGE.md`.
    pub reviewers_root: PathBuf,
    /// Global (shared-across-projects) knowledge store directory, if any.
    pub global_store_dir: Option<PathBuf>,
    /// Project-local knowledge store directory, if any.
    pub project_store_dir: Option<PathBuf>,
    /// Directory reports are written to.
    pub output_dir: PathBuf,
    /// Directory the bypass audit log lives in.
    pub audit_dir: PathBuf,
    /// Retrieval token budget, in approximate LLM tokens.
    pub token_budget: usize,
    /// Default `top_k` for retrieval.
    pub top_k: usize,
    /// Minimum similarity score kept after retrieval.
    pub min_score: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reviewers_root: PathBuf::from("reviewers"),
            global_store_dir: None,
            project_store_dir: Some(PathBuf::from(".review/knowledge")),
            output_dir: PathBuf::from(".review/reports"),
            audit_dir: PathBuf::from(".review/audit"),
            token_budget: 2000,
            top_k: 5,
            min_score: 0.3,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file, falling back to [`Default`] if
    /// the file is missing. Malformed YAML is a configuration error and
    /// propagates, since it indicates operator error rather than an
    /// auxiliary subsystem hiccup.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading engine config at {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&text)?;
        Ok(config)
    }
}

/// Result extension used to attach context to I/O errors, matching the
/// teacher's `ResultExt` convention.
trait WithContext<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> WithContext<T> for std::result::Result<T, std::io::Error> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| super::errors::ReviewError::io(f(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_budgets() {
        let config = EngineConfig::default();
        assert!(config.token_budget > 0);
        assert!(config.top_k > 0);
        assert!((0.0..=1.0).contains(&config.min_score));
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let config = EngineConfig::from_yaml_file(Path::new("/nonexistent/config.yaml")).unwrap();
        assert_eq!(config.reviewers_root, EngineConfig::default().reviewers_root);
    }
}

//! Emergency policy bypass with an append-only audit trail, §4.11.
//!
//! A bypass never touches the review result itself — it is an orthogonal,
//! durable record that a human chose to proceed despite a failing or
//! unreviewed gate.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use tracing::info;

use crate::core::errors::{ReviewError, Result};
use crate::core::types::{BypassRecord, Tier};

const AUDIT_FILE_NAME: &str = "BYPASS-AUDIT.json";

/// Append-only bypass audit log rooted at a directory.
#[derive(Debug, Clone)]
pub struct BypassAudit {
    audit_dir: PathBuf,
}

impl BypassAudit {
    /// Build an audit log writer rooted at `audit_dir`.
    pub fn new(audit_dir: impl Into<PathBuf>) -> Self {
        Self {
            audit_dir: audit_dir.into(),
        }
    }

    fn audit_path(&self) -> PathBuf {
        self.audit_dir.join(AUDIT_FILE_NAME)
    }

    /// Record a bypass. `reason` must be non-empty or this returns
    /// [`ReviewError::EmptyBypassReason`] without touching the audit file.
    pub fn create_bypass(
        &self,
        task_id: impl Into<String>,
        reason: impl Into<String>,
        bypassed_by: impl Into<String>,
        cs_at_bypass: Option<f64>,
        tier_at_bypass: Option<Tier>,
        timestamp: impl Into<String>,
    ) -> Result<BypassRecord> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(ReviewError::EmptyBypassReason);
        }

        let record = BypassRecord {
            task_id: task_id.into(),
            reason,
            bypassed_by: bypassed_by.into(),
            cs_at_bypass,
            tier_at_bypass,
            timestamp: timestamp.into(),
        };

        let mut trail = self.load_audit_trail();
        trail.push(record.clone());
        self.persist(&trail)?;
        info!(task_id = %record.task_id, "recorded emergency bypass");
        Ok(record)
    }

    /// Load the full audit trail, returning an empty vector if the file is
    /// absent or malformed rather than erroring — audit reads are
    /// best-effort, consistent with the rest of the engine's fail-open
    /// design for auxiliary data.
    pub fn load_audit_trail(&self) -> Vec<BypassRecord> {
        match fs::read_to_string(self.audit_path()) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Whether any bypass record exists for `task_id`.
    pub fn is_bypassed(&self, task_id: &str) -> bool {
        self.load_audit_trail().iter().any(|r| r.task_id == task_id)
    }

    fn persist(&self, trail: &[BypassRecord]) -> Result<()> {
        fs::create_dir_all(&self.audit_dir)?;
        let json = serde_json::to_string_pretty(trail)?;

        let tmp_parent = self.audit_dir.as_path();
        let mut tmp = tempfile::NamedTempFile::new_in(tmp_parent)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(self.audit_path())
            .map_err(|e| ReviewError::io("could not persist bypass audit log", e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s6_empty_reason_is_rejected_and_audit_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let audit = BypassAudit::new(dir.path());
        let err = audit
            .create_bypass("task-1", "", "alice", None, None, "2024-01-01T00:00:00Z")
            .unwrap_err();
        assert!(matches!(err, ReviewError::EmptyBypassReason));
        assert!(!audit.audit_path().exists());
    }

    #[test]
    fn create_bypass_appends_and_is_bypassed_reflects_it() {
        let dir = tempfile::tempdir().unwrap();
        let audit = BypassAudit::new(dir.path());
        audit
            .create_bypass(
                "task-1",
                "known false positive, approved by lead",
                "alice",
                Some(7.5),
                Some(Tier::Important),
                "2024-01-01T00:00:00Z",
            )
            .unwrap();

        assert!(audit.is_bypassed("task-1"));
        assert!(!audit.is_bypassed("task-2"));

        let trail = audit.load_audit_trail();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].bypassed_by, "alice");
    }

    #[test]
    fn bypasses_append_rather_than_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let audit = BypassAudit::new(dir.path());
        audit
            .create_bypass("task-1", "reason one", "alice", None, None, "t1")
            .unwrap();
        audit
            .create_bypass("task-2", "reason two", "bob", None, None, "t2")
            .unwrap();

        assert_eq!(audit.load_audit_trail().len(), 2);
    }

    #[test]
    fn missing_audit_file_yields_empty_trail() {
        let dir = tempfile::tempdir().unwrap();
        let audit = BypassAudit::new(dir.path());
        assert!(audit.load_audit_trail().is_empty());
        assert!(!audit.is_bypassed("anything"));
    }
}

//! Deduplication of raw reviewer findings into [`DeduplicatedFinding`]s, §4.1.
//!
//! Two findings merge into the same bucket iff they share a file and
//! category and their `line_start` values fall within the same
//! floor-to-multiple-of-3 bucket. This gives ±3-line tolerance for
//! reviewers that disagree slightly on where a finding begins.

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::core::types::{DeduplicatedFinding, RawFinding};

/// Stateless deduplicator. Kept as a unit struct so call sites read as
/// `Fingerprinter::deduplicate(...)`, matching the contract name in §4.1.
#[derive(Debug, Default, Clone, Copy)]
pub struct Fingerprinter;

impl Fingerprinter {
    /// Compute the fingerprint for a `(file, line_start, category)` triple.
    pub fn fingerprint(file: &str, line_start: u32, category: &str) -> String {
        let bucket = DeduplicatedFinding::bucket_line(line_start);
        let mut hasher = Sha256::new();
        hasher.update(file.as_bytes());
        hasher.update(b":");
        hasher.update(bucket.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(category.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Deduplicate a batch of raw findings, dropping malformed entries with
    /// a log rather than aborting. Never panics.
    pub fn deduplicate(findings: &[RawFinding]) -> Vec<DeduplicatedFinding> {
        // Group members by fingerprint, preserving first-seen order per
        // group for the description/remediation/reviewer_ids unions.
        let mut order: Vec<String> = Vec::new();
        let mut groups: std::collections::HashMap<String, Vec<&RawFinding>> =
            std::collections::HashMap::new();

        for finding in findings {
            if finding.file.is_empty() || finding.category.is_empty() {
                warn!(
                    file = %finding.file,
                    category = %finding.category,
                    "dropping malformed finding: missing file or category"
                );
                continue;
            }
            let fp = Self::fingerprint(&finding.file, finding.line_start, &finding.category);
            if !groups.contains_key(&fp) {
                order.push(fp.clone());
            }
            groups.entry(fp).or_default().push(finding);
        }

        let mut out: Vec<DeduplicatedFinding> = order
            .into_iter()
            .map(|fp| {
                let members = groups.remove(&fp).expect("group present for recorded key");
                merge_group(fp, members)
            })
            .collect();

        out.sort_by(|a, b| {
            b.severity
                .partial_cmp(&a.severity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out
    }
}

fn merge_group(fingerprint: String, mut members: Vec<&RawFinding>) -> DeduplicatedFinding {
    // Stable sort by severity descending, so the highest-severity member
    // is first and ties keep their relative input order (P2, §5 ordering
    // guarantee).
    members.sort_by(|a, b| {
        b.severity
            .partial_cmp(&a.severity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let primary = members[0];
    let severity = members
        .iter()
        .map(|f| f.severity)
        .fold(f64::MIN, f64::max);
    let confidence = members
        .iter()
        .map(|f| f.confidence)
        .fold(f64::MIN, f64::max);

    let mut descriptions = Vec::new();
    let mut remediation = Vec::new();
    let mut reviewer_ids = Vec::new();

    for member in &members {
        if !member.description.is_empty() && !descriptions.contains(&member.description) {
            descriptions.push(member.description.clone());
        }
        if !member.remediation.is_empty() && !remediation.contains(&member.remediation) {
            remediation.push(member.remediation.clone());
        }
        if !member.reviewer_id.is_empty() && !reviewer_ids.contains(&member.reviewer_id) {
            reviewer_ids.push(member.reviewer_id.clone());
        }
    }

    DeduplicatedFinding {
        fingerprint,
        file: primary.file.clone(),
        line_start: primary.line_start,
        line_end: crate::core::types::effective_line_end(primary),
        category: primary.category.clone(),
        severity,
        confidence,
        description: primary.description.clone(),
        descriptions,
        remediation,
        k: reviewer_ids.len(),
        reviewer_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(
        file: &str,
        line_start: u32,
        category: &str,
        severity: f64,
        confidence: f64,
        reviewer_id: &str,
    ) -> RawFinding {
        RawFinding {
            file: file.into(),
            line_start,
            line_end: line_start,
            category: category.into(),
            severity,
            confidence,
            description: format!("{category} at {file}:{line_start}"),
            remediation: "fix it".into(),
            reviewer_id: reviewer_id.into(),
        }
    }

    #[test]
    fn fingerprint_is_stable_within_a_three_line_bucket() {
        let a = Fingerprinter::fingerprint("app.py", 42, "sql-injection");
        let b = Fingerprinter::fingerprint("app.py", 43, "sql-injection");
        let c = Fingerprinter::fingerprint("app.py", 44, "sql-injection");
        let d = Fingerprinter::fingerprint("app.py", 45, "sql-injection");
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_ne!(c, d);
    }

    #[test]
    fn s4_duplicate_across_reviewers_merges() {
        let findings = vec![
            finding("app.py", 42, "sql-injection", 8.0, 9.0, "security"),
            finding("app.py", 43, "sql-injection", 7.5, 8.0, "correctness"),
        ];
        let deduped = Fingerprinter::deduplicate(&findings);
        assert_eq!(deduped.len(), 1);
        let merged = &deduped[0];
        assert_eq!(merged.k, 2);
        assert_eq!(merged.severity, 8.0);
        assert_eq!(merged.confidence, 9.0);
        assert_eq!(merged.reviewer_ids, vec!["security", "correctness"]);
    }

    #[test]
    fn malformed_findings_are_dropped_not_fatal() {
        let findings = vec![
            RawFinding {
                file: "".into(),
                line_start: 1,
                line_end: 1,
                category: "x".into(),
                severity: 1.0,
                confidence: 1.0,
                description: "".into(),
                remediation: "".into(),
                reviewer_id: "security".into(),
            },
            finding("ok.py", 10, "style", 2.0, 2.0, "maintainability"),
        ];
        let deduped = Fingerprinter::deduplicate(&findings);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].file, "ok.py");
    }

    #[test]
    fn different_category_does_not_merge() {
        let findings = vec![
            finding("app.py", 10, "sql-injection", 5.0, 5.0, "security"),
            finding("app.py", 10, "xss", 5.0, 5.0, "security"),
        ];
        assert_eq!(Fingerprinter::deduplicate(&findings).len(), 2);
    }

    #[test]
    fn sorted_by_severity_descending() {
        let findings = vec![
            finding("a.py", 1, "x", 2.0, 1.0, "security"),
            finding("b.py", 1, "y", 9.0, 1.0, "security"),
            finding("c.py", 1, "z", 5.0, 1.0, "security"),
        ];
        let deduped = Fingerprinter::deduplicate(&findings);
        let severities: Vec<f64> = deduped.iter().map(|f| f.severity).collect();
        assert_eq!(severities, vec![9.0, 5.0, 2.0]);
    }
}

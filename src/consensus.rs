//! Consensus Score calculation with the Minority Protection Rule, §4.3.
//!
//! This is the authoritative scoring formula from the specification, not
//! the persona-weighted-average approach the review skill historically
//! used — the two diverged once the Minority Protection Rule was
//! introduced, and this module implements only the current one.

use crate::core::types::{ConsensusScoreResult, DeduplicatedFinding, ScoredFinding, Tier};

/// Fixed number of reviewers the whole engine is built around.
pub const REVIEWER_COUNT: usize = 5;

const MINORITY_DOMAINS: [&str; 2] = ["security", "reliability"];
const MPR_R_MAX_THRESHOLD: f64 = 8.5;

/// Stateless calculator; see [`ConsensusScore::calculate`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsensusScore;

impl ConsensusScore {
    /// Compute the full [`ConsensusScoreResult`] from a batch of
    /// deduplicated findings.
    pub fn calculate(findings: &[DeduplicatedFinding]) -> ConsensusScoreResult {
        if findings.is_empty() {
            return ConsensusScoreResult {
                cs: 0.0,
                tier: Tier::Informational,
                findings: Vec::new(),
                r_bar: 0.0,
                r_max: 0.0,
                k_total: 0,
                n: REVIEWER_COUNT,
                passed: true,
                minority_protection_applied: false,
                summary: summarize(0.0, Tier::Informational, 0, true, false),
            };
        }

        let mut scored: Vec<ScoredFinding> = findings
            .iter()
            .map(|f| {
                let r_i = (f.severity * f.confidence / 10.0).clamp(0.0, 10.0);
                ScoredFinding {
                    finding: f.clone(),
                    r_i,
                    tier: Tier::classify(r_i),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.r_i
                .partial_cmp(&a.r_i)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.finding.file.cmp(&b.finding.file))
                .then_with(|| a.finding.line_start.cmp(&b.finding.line_start))
                .then_with(|| a.finding.category.cmp(&b.finding.category))
        });

        let r_bar = scored.iter().map(|s| s.r_i).sum::<f64>() / scored.len() as f64;
        let k_total: usize = scored.iter().map(|s| s.finding.k).sum();

        // scored[0] holds R_max after the sort above.
        let r_max_finding = &scored[0];
        let r_max = r_max_finding.r_i;

        let cs_raw = 0.5 * r_bar + 0.3 * r_bar * (k_total as f64 / REVIEWER_COUNT as f64) + 0.2 * r_max;

        let mpr_eligible = r_max_finding
            .finding
            .reviewer_ids
            .iter()
            .any(|id| MINORITY_DOMAINS.contains(&id.as_str()))
            && r_max >= MPR_R_MAX_THRESHOLD
            && r_max_finding.finding.k >= 1;

        let (cs_final, minority_protection_applied) = if mpr_eligible {
            let floor = 0.7 * r_max + 2.0;
            (cs_raw.max(floor), true)
        } else {
            (cs_raw, false)
        };

        let cs_final = cs_final.clamp(0.0, 10.0);
        let tier = Tier::classify(cs_final);
        let passed = tier.passes();

        ConsensusScoreResult {
            cs: cs_final,
            tier,
            summary: summarize(cs_final, tier, scored.len(), passed, minority_protection_applied),
            findings: scored,
            r_bar,
            r_max,
            k_total,
            n: REVIEWER_COUNT,
            passed,
            minority_protection_applied,
        }
    }
}

fn summarize(cs: f64, tier: Tier, count: usize, passed: bool, mpr: bool) -> String {
    let status = if passed { "review passed" } else { "review FAILED" };
    let mut s = format!(
        "CS={cs:.2} ({tier}): {count} finding{plural}, {status}",
        plural = if count == 1 { "" } else { "s" }
    );
    if mpr {
        s.push_str(", minority protection applied");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(
        file: &str,
        severity: f64,
        confidence: f64,
        k: usize,
        reviewer_ids: &[&str],
    ) -> DeduplicatedFinding {
        DeduplicatedFinding {
            fingerprint: "fp".into(),
            file: file.into(),
            line_start: 1,
            line_end: 1,
            category: "x".into(),
            severity,
            confidence,
            description: "d".into(),
            descriptions: vec!["d".into()],
            remediation: vec![],
            reviewer_ids: reviewer_ids.iter().map(|s| s.to_string()).collect(),
            k,
        }
    }

    #[test]
    fn p4_empty_input_yields_zero() {
        let result = ConsensusScore::calculate(&[]);
        assert_eq!(result.cs, 0.0);
        assert_eq!(result.tier, Tier::Informational);
        assert!(result.passed);
        assert!(result.findings.is_empty());
    }

    #[test]
    fn s1_single_security_finding_triggers_mpr() {
        let findings = vec![finding("app.py", 9.5, 10.0, 1, &["security"])];
        let result = ConsensusScore::calculate(&findings);
        assert!((result.r_max - 9.5).abs() < 1e-9);
        assert!((result.cs - 8.65).abs() < 1e-9);
        assert_eq!(result.tier, Tier::Important);
        assert!(!result.passed);
        assert!(result.minority_protection_applied);
    }

    #[test]
    fn s2_two_reviewer_agreement_passes() {
        let findings = vec![
            finding("a.py", 9.5, 9.0, 3, &["security", "correctness", "performance"]),
            finding("b.py", 6.0, 7.0, 2, &["maintainability", "reliability"]),
        ];
        let result = ConsensusScore::calculate(&findings);
        assert!((result.r_bar - 6.375).abs() < 1e-9);
        assert!((result.r_max - 8.55).abs() < 1e-9);
        assert_eq!(result.k_total, 5);
        assert!((result.cs - 6.81).abs() < 1e-2);
        assert_eq!(result.tier, Tier::Moderate);
        assert!(result.passed);
        assert!(!result.minority_protection_applied);
    }

    #[test]
    fn s5_mpr_only_fires_on_r_max_finding() {
        let findings = vec![
            finding("a.py", 5.0, 0.5, 1, &["security"]), // r_i = 0.25
            finding("b.py", 9.5, 10.0, 1, &["performance"]), // r_i = 9.5 == r_max
        ];
        let result = ConsensusScore::calculate(&findings);
        assert!((result.r_max - 9.5).abs() < 1e-9);
        assert!(!result.minority_protection_applied);
    }

    #[test]
    fn p3_cs_is_always_in_bounds() {
        let findings = vec![finding("a.py", 10.0, 10.0, 5, &["security", "reliability"])];
        let result = ConsensusScore::calculate(&findings);
        assert!(result.cs >= 0.0 && result.cs <= 10.0);
    }

    #[test]
    fn p5_mpr_never_lowers_the_score() {
        let mpr_fires = vec![finding("a.py", 9.5, 10.0, 1, &["reliability"])];
        let result = ConsensusScore::calculate(&mpr_fires);
        // raw CS for this single finding would be 0.5*9.5+0.3*9.5*0.2+0.2*9.5 = 7.22
        assert!(result.cs >= 7.22 - 1e-9);

        let mpr_silent = vec![finding("a.py", 9.5, 10.0, 1, &["performance"])];
        let silent_result = ConsensusScore::calculate(&mpr_silent);
        assert!((silent_result.cs - 7.22).abs() < 1e-2);
    }

    #[test]
    fn p12_classify_is_total_and_matches_boundaries() {
        assert_eq!(Tier::classify(-1.0), Tier::Informational);
        assert_eq!(Tier::classify(11.0), Tier::Critical);
    }

    #[test]
    fn mpr_requires_reviewer_in_protected_domain() {
        let findings = vec![finding("a.py", 9.0, 9.5, 1, &["maintainability"])];
        let result = ConsensusScore::calculate(&findings);
        assert!(!result.minority_protection_applied);
    }

    #[test]
    fn mpr_respects_r_max_threshold() {
        // r_i = 8.0 * 8.0 / 10 = 6.4, below the 8.5 MPR threshold.
        let findings = vec![finding("a.py", 8.0, 8.0, 1, &["security"])];
        let result = ConsensusScore::calculate(&findings);
        assert!(!result.minority_protection_applied);
    }
}

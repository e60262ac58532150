//! Ties fingerprinting, validation, and scoring into one request/response
//! pipeline, and renders the final markdown report, §4.10.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::consensus::ConsensusScore;
use crate::core::errors::{ReviewError, Result};
use crate::core::types::{ConsensusScoreResult, DeduplicatedFinding, RawFinding, ValidatedFinding};
use crate::doc_audit::{DocAuditReport, DocAuditor};
use crate::fingerprint::Fingerprinter;
use crate::model_router::ModelRouter;
use crate::reviewer::engine::{PropertySpec, ReviewerEngine, ReviewerResult, TaskSpec};
use crate::validator::{FindingValidator, HistoricalLookup};

/// Paths the engine refuses to write reports or audit logs under, even if
/// asked, §9 "Unsafe output paths".
const SENSITIVE_PATH_FRAGMENTS: [&str; 4] = [".ssh", ".aws", ".gnupg", "/etc"];

/// One review request: the task id, the files and diff under review, and
/// any properties reviewers should verify.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    /// Identifier for this review run, used in the report filename and any
    /// bypass record.
    pub task_id: String,
    /// Files touched by the diff under review.
    pub files: Vec<String>,
    /// Unified diff content, used for prompt composition and diff-size
    /// based model routing. Empty if the request has no diff.
    pub diff: String,
    /// Properties reviewers should verify, beyond their base prompt.
    pub properties: Vec<PropertySpec>,
}

/// The final product of a review run.
#[derive(Debug, Clone)]
pub struct ReviewResult {
    /// Task id this result belongs to.
    pub task_id: String,
    /// Consensus score and tier.
    pub consensus: ConsensusScoreResult,
    /// Every finding after validation.
    pub validated_findings: Vec<ValidatedFinding>,
    /// Rendered markdown report.
    pub report_markdown: String,
    /// Where the report was written, if a directory was supplied.
    pub report_path: Option<PathBuf>,
    /// Whether the review passed, mirroring `consensus.tier.passes()`.
    pub passed: bool,
    /// Documentation audit findings, if one was run for this request.
    pub doc_audit: Option<DocAuditReport>,
}

/// Drives the prepare -> finalize review pipeline. Holds the `ReviewerEngine`
/// (and thus the reviewers directory) needed for `prepare_review`;
/// `finalize_review` needs no instance state and stays an associated
/// function so it can be called straight off responses gathered elsewhere.
#[derive(Debug)]
pub struct Orchestrator {
    engine: ReviewerEngine,
}

impl Orchestrator {
    /// Build an orchestrator that loads reviewer configs from
    /// `reviewers_dir` for `prepare_review`.
    pub fn new(reviewers_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine: ReviewerEngine::new(reviewers_dir),
        }
    }

    /// Phase 1: build the five task specs for this request. `knowledge_section`
    /// and the model selection inputs are forwarded to
    /// [`ReviewerEngine::prepare_review_tasks`] unchanged.
    pub fn prepare_review(
        &self,
        request: &ReviewRequest,
        knowledge_section: Option<&HashMap<String, String>>,
        model_router: Option<&ModelRouter>,
        single_model: Option<&str>,
    ) -> Result<Vec<TaskSpec>> {
        self.engine.prepare_review_tasks(
            &request.files,
            &request.diff,
            &request.properties,
            knowledge_section,
            model_router,
            single_model,
        )
    }

    /// Run the full pipeline over a batch of per-reviewer results: flatten
    /// their findings, stamp `reviewer_id`, deduplicate, validate (with
    /// cross-check skipped by default, per §4.2's contract), score, and
    /// render a report. `skip_cross_check` defaults to `true` at this call
    /// site; pass `false` only if the caller has already resolved Layer 2
    /// cross-checks into the findings beforehand. `doc_audit` is optional:
    /// pass a report computed via [`DocAuditor::analyze`] to include a
    /// documentation-audit section, or `None` to omit it entirely.
    pub fn finalize_review(
        request: &ReviewRequest,
        reviewer_results: &[ReviewerResult],
        file_contents: &HashMap<String, String>,
        retriever: Option<&dyn HistoricalLookup>,
        doc_audit: Option<DocAuditReport>,
        output_dir: Option<&Path>,
    ) -> Result<ReviewResult> {
        let raw: Vec<RawFinding> = reviewer_results
            .iter()
            .flat_map(|r| r.findings.iter().cloned().map(|mut f| {
                if f.reviewer_id.is_empty() {
                    f.reviewer_id = r.reviewer_id.clone();
                }
                f
            }))
            .collect();

        let deduped: Vec<DeduplicatedFinding> = Fingerprinter::deduplicate(&raw);

        let validated: Vec<ValidatedFinding> = deduped
            .into_iter()
            .map(|finding| {
                let content = file_contents.get(&finding.file).map(String::as_str);
                FindingValidator::validate(finding, content, retriever, true)
            })
            .collect();

        // Scoring must see each finding's validated confidence, not the
        // pre-validation value buried in `ValidatedFinding.finding`.
        let for_scoring: Vec<DeduplicatedFinding> = validated
            .iter()
            .map(|v| {
                let mut finding = v.finding.clone();
                finding.confidence = v.confidence;
                finding
            })
            .collect();
        let consensus = ConsensusScore::calculate(&for_scoring);

        let report_markdown =
            render_report(request, reviewer_results, &validated, &consensus, doc_audit.as_ref());

        let report_path = match output_dir {
            Some(dir) => {
                let dir = validate_output_path(dir)?;
                std::fs::create_dir_all(dir)?;
                let path = dir.join(format!("REVIEW-{}.md", request.task_id));

                let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
                tmp.write_all(report_markdown.as_bytes())?;
                tmp.persist(&path)
                    .map_err(|e| ReviewError::io("could not persist review report", e.error))?;

                info!(path = %path.display(), "wrote review report");
                Some(path)
            }
            None => None,
        };

        let passed = consensus.passed;

        Ok(ReviewResult {
            task_id: request.task_id.clone(),
            consensus,
            validated_findings: validated,
            report_markdown,
            report_path,
            passed,
            doc_audit,
        })
    }
}

/// Reject output directories that are not absolute or that fall under a
/// sensitive root. Returns the validated path unchanged so callers can
/// chain it.
fn validate_output_path(path: &Path) -> Result<&Path> {
    if !path.is_absolute() {
        return Err(ReviewError::UnsafeOutputPath {
            path: path.to_path_buf(),
            reason: "path must be absolute".into(),
        });
    }

    let display = path.to_string_lossy();
    for fragment in SENSITIVE_PATH_FRAGMENTS {
        if display.contains(fragment) {
            return Err(ReviewError::UnsafeOutputPath {
                path: path.to_path_buf(),
                reason: format!("path touches sensitive root '{fragment}'"),
            });
        }
    }

    Ok(path)
}

fn render_report(
    request: &ReviewRequest,
    reviewer_results: &[ReviewerResult],
    validated: &[ValidatedFinding],
    consensus: &ConsensusScoreResult,
    doc_audit: Option<&DocAuditReport>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Review Report: {}\n\n", request.task_id));

    let status = if consensus.passed { "PASSED" } else { "FAILED" };
    out.push_str(&format!(
        "**Status:** {status}  \n**Consensus Score:** {:.2} ({})  \n{}\n\n",
        consensus.cs, consensus.tier, consensus.summary
    ));

    if consensus.minority_protection_applied {
        out.push_str(
            "> Minority protection applied: a single high-severity security or reliability \
             finding raised the floor on this score regardless of reviewer agreement.\n\n",
        );
    }

    out.push_str("## Reviewer Summaries\n\n");
    for result in reviewer_results {
        if !result.relevant {
            out.push_str(&format!(
                "- **{}**: skipped (not relevant to the changed files)\n",
                result.reviewer_name
            ));
            continue;
        }
        out.push_str(&format!(
            "- **{}**: {:.1}/10 — {}\n",
            result.reviewer_name, result.score, result.summary
        ));
    }
    out.push('\n');

    out.push_str("## Findings\n\n");
    if validated.is_empty() {
        out.push_str("No findings.\n\n");
    } else {
        let by_fingerprint: std::collections::HashMap<&str, &ValidatedFinding> = validated
            .iter()
            .map(|v| (v.finding.fingerprint.as_str(), v))
            .collect();

        out.push_str("| File | Line | Category | Severity | Confidence | k | Tier | Status | Description |\n");
        out.push_str("|---|---|---|---|---|---|---|---|---|\n");
        for scored in &consensus.findings {
            let Some(v) = by_fingerprint.get(scored.finding.fingerprint.as_str()) else {
                continue;
            };
            out.push_str(&format!(
                "| {} | {} | {} | {:.1} | {:.1} | {} | {} | {:?} | {} |\n",
                scored.finding.file,
                scored.finding.line_start,
                scored.finding.category,
                scored.finding.severity,
                v.confidence,
                scored.finding.k,
                scored.tier,
                v.validation_status,
                scored.finding.description.replace('|', "\\|")
            ));
        }
        out.push('\n');
    }

    if let Some(audit) = doc_audit {
        out.push_str("> Analysis-only: documentation gaps never block a review.\n\n");
        out.push_str(&DocAuditor::render(audit));
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ReviewerId;

    fn reviewer_result(id: &str, findings: Vec<RawFinding>, relevant: bool) -> ReviewerResult {
        ReviewerResult {
            reviewer_id: id.to_string(),
            reviewer_name: format!("{id} Reviewer"),
            score: 5.0,
            passed: false,
            findings,
            summary: "summary".into(),
            relevant,
            token_count: 0,
        }
    }

    fn raw_finding(file: &str, severity: f64, confidence: f64) -> RawFinding {
        RawFinding {
            file: file.into(),
            line_start: 1,
            line_end: 1,
            category: "sql-injection".into(),
            severity,
            confidence,
            description: "d".into(),
            remediation: "r".into(),
            reviewer_id: String::new(),
        }
    }

    #[test]
    fn validate_output_path_rejects_relative() {
        let err = validate_output_path(Path::new("relative/dir")).unwrap_err();
        assert!(matches!(err, ReviewError::UnsafeOutputPath { .. }));
    }

    #[test]
    fn validate_output_path_rejects_sensitive_roots() {
        let err = validate_output_path(Path::new("/root/.ssh/reports")).unwrap_err();
        assert!(matches!(err, ReviewError::UnsafeOutputPath { .. }));
    }

    #[test]
    fn validate_output_path_accepts_absolute_safe_path() {
        assert!(validate_output_path(Path::new("/tmp/reviews")).is_ok());
    }

    fn request(task_id: &str, files: Vec<String>) -> ReviewRequest {
        ReviewRequest {
            task_id: task_id.into(),
            files,
            diff: String::new(),
            properties: vec![],
        }
    }

    #[test]
    fn finalize_review_flattens_stamps_and_scores_findings() {
        let request = request("pr-1", vec!["app.py".into()]);
        let results = vec![
            reviewer_result(
                ReviewerId::Security.as_str(),
                vec![raw_finding("app.py", 9.0, 9.0)],
                true,
            ),
            reviewer_result(ReviewerId::Correctness.as_str(), vec![], true),
        ];
        let mut files = std::collections::HashMap::new();
        files.insert("app.py".to_string(), "x = db.query(user_input)\n".to_string());

        let result =
            Orchestrator::finalize_review(&request, &results, &files, None, None, None).unwrap();
        assert_eq!(result.validated_findings.len(), 1);
        assert_eq!(
            result.validated_findings[0].finding.reviewer_ids,
            vec!["security".to_string()]
        );
        assert_eq!(result.passed, result.consensus.passed);
        assert!(result.doc_audit.is_none());
        assert!(result.report_markdown.contains("pr-1"));
        assert!(result.report_markdown.contains(" k "));
        assert!(result.report_path.is_none());
    }

    #[test]
    fn finalize_review_reports_skipped_irrelevant_reviewers() {
        let request = request("pr-2", vec!["README.md".into()]);
        let results = vec![reviewer_result(ReviewerId::Security.as_str(), vec![], false)];
        let files = std::collections::HashMap::new();
        let result =
            Orchestrator::finalize_review(&request, &results, &files, None, None, None).unwrap();
        assert!(result.report_markdown.contains("skipped (not relevant"));
    }

    #[test]
    fn finalize_review_writes_report_to_output_dir_with_review_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let request = request("pr-3", vec![]);
        let results = vec![reviewer_result(ReviewerId::Security.as_str(), vec![], true)];
        let files = std::collections::HashMap::new();
        let result = Orchestrator::finalize_review(
            &request,
            &results,
            &files,
            None,
            None,
            Some(dir.path()),
        )
        .unwrap();
        let path = result.report_path.unwrap();
        assert!(path.exists());
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "REVIEW-pr-3.md");
    }

    #[test]
    fn finalize_review_scores_on_validated_confidence_not_raw_confidence() {
        // The finding cites a blank line, so Layer 1 cannot confirm it and
        // halves confidence from 8.0 to 4.0. Scoring must use that halved
        // value, not the raw 8.0 embedded in the pre-validation finding.
        let mut finding = raw_finding("app.py", 9.0, 8.0);
        finding.line_start = 1;
        let request = request("pr-4", vec!["app.py".into()]);
        let results = vec![reviewer_result(
            ReviewerId::Security.as_str(),
            vec![finding],
            true,
        )];
        let mut files = std::collections::HashMap::new();
        files.insert("app.py".to_string(), "\nx = db.query(raw_input)\n".to_string());

        let result =
            Orchestrator::finalize_review(&request, &results, &files, None, None, None).unwrap();
        let validated = &result.validated_findings[0];
        assert_eq!(validated.confidence, 4.0);
        let scored = &result.consensus.findings[0];
        assert_eq!(scored.finding.confidence, 4.0);
        assert_ne!(scored.finding.confidence, 8.0);
    }

    #[test]
    fn finalize_review_includes_doc_audit_section_when_supplied() {
        let request = request("pr-5", vec![]);
        let results = vec![reviewer_result(ReviewerId::Security.as_str(), vec![], true)];
        let files = std::collections::HashMap::new();
        let audit = crate::doc_audit::DocAuditor::analyze(
            "pr-5",
            &[],
            "",
            None,
            crate::doc_audit::read_file_lossy,
        );
        let result = Orchestrator::finalize_review(
            &request,
            &results,
            &files,
            None,
            Some(audit),
            None,
        )
        .unwrap();
        assert!(result.doc_audit.is_some());
        assert!(result.report_markdown.contains("Documentation Audit"));
    }

    #[test]
    fn prepare_review_builds_five_task_specs() {
        let reviewers_dir = tempfile::tempdir().unwrap();
        for id in [
            "security",
            "correctness",
            "performance",
            "maintainability",
            "reliability",
        ] {
            let dir = reviewers_dir.path().join(id);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("PROMPT.md"), format!("You are the {id} reviewer.")).unwrap();
        }
        let orchestrator = Orchestrator::new(reviewers_dir.path());
        let request = request("pr-6", vec!["app.py".into()]);
        let tasks = orchestrator.prepare_review(&request, None, None, None).unwrap();
        assert_eq!(tasks.len(), 5);
    }
}

//! Three-layer, fail-open finding validation, §4.2.
//!
//! Every layer is wrapped so an internal failure degrades the finding to
//! its prior state and logs, rather than raising. `validate` never panics
//! and never returns `Result` — there is nothing for a caller to handle.

use tracing::warn;

use crate::core::types::{DeduplicatedFinding, TaggedResult, ValidatedFinding, ValidationStatus};

/// Historical-lookup interface consumed by Layer 3. Implemented by
/// [`crate::knowledge::retriever::KnowledgeRetriever`]; kept as a trait here
/// so the validator does not depend on the knowledge module's internals.
pub trait HistoricalLookup {
    /// Query scoped to a single reviewer id, returning tagged chunks.
    /// Implementations that hit a backing store should surface failures as
    /// `Err` rather than panicking — the validator treats an `Err` the same
    /// as an empty result, per the fail-open contract.
    fn query(&self, reviewer_id: &str, text: &str) -> Result<Vec<TaggedResult>, String>;
}

/// Stateless validator. Grouped as a unit struct for a consistent call
/// surface (`FindingValidator::validate(...)`), matching §4.2's contract
/// name.
#[derive(Debug, Default, Clone, Copy)]
pub struct FindingValidator;

fn is_python_file(path: &str) -> bool {
    path.ends_with(".py")
}

fn is_blank_or_comment(line: &str, python: bool) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return true;
    }
    python && trimmed.starts_with('#')
}

impl FindingValidator {
    /// Run Layer 1 (structural) and Layer 3 (historical) against a
    /// deduplicated finding. Layer 2 (LLM cross-check) is never executed
    /// here — `skip_cross_check` is accepted for contract parity with §4.2
    /// but has no effect inside `validate`; callers that want a cross-check
    /// call [`build_cross_check_task`] and [`apply_cross_check_result`]
    /// themselves and feed the result back in.
    pub fn validate(
        finding: DeduplicatedFinding,
        file_content: Option<&str>,
        retriever: Option<&dyn HistoricalLookup>,
        _skip_cross_check: bool,
    ) -> ValidatedFinding {
        let mut confidence = finding.confidence;
        let mut notes = Vec::new();
        let mut status = ValidationStatus::Verified;

        match layer1_structural(&finding, file_content) {
            Ok(note) => {
                if let Some(note) = note {
                    notes.push(note);
                }
            }
            Err(reason) => {
                status = ValidationStatus::Unverified;
                confidence /= 2.0;
                notes.push(format!("layer1: {reason}"));
            }
        }

        if let Some(retriever) = retriever {
            match layer3_historical(&finding, retriever) {
                Layer3Outcome::Rejected => {
                    status = ValidationStatus::HistoricallyRejected;
                    notes.push("layer3: prior rejection found in knowledge base".into());
                }
                Layer3Outcome::Accepted => {
                    confidence = (confidence * 1.2).min(10.0);
                    notes.push("layer3: prior acceptance found in knowledge base".into());
                }
                Layer3Outcome::NoSignal => {}
                Layer3Outcome::Failed(reason) => {
                    warn!(error = %reason, "layer3 historical lookup failed, leaving finding unchanged");
                }
            }
        }

        confidence = confidence.clamp(0.0, 10.0);

        ValidatedFinding {
            finding,
            validation_status: status,
            confidence,
            validation_notes: notes,
            weight: status.weight(),
        }
    }

    /// Build the task specification for Layer 2's LLM cross-check. The
    /// engine never executes this itself; the caller dispatches it and
    /// feeds the response to [`apply_cross_check_result`]. The snippet is
    /// derived from `file_content` via [`extract_snippet`], not supplied by
    /// the caller.
    pub fn build_cross_check_task(
        finding: &DeduplicatedFinding,
        file_content: Option<&str>,
        cross_check_model: &str,
    ) -> CrossCheckTask {
        let snippet = extract_snippet(file_content, finding.line_start, finding.line_end);
        let prompt = format!(
            "Answer YES or NO on the first line: does the following code support this finding?\n\n\
             Finding: {}\n\nCode ({}:{}-{}):\n```\n{}\n```\n",
            finding.description, finding.file, finding.line_start, finding.line_end, snippet
        );
        CrossCheckTask {
            model: cross_check_model.to_string(),
            prompt,
        }
    }

    /// Apply a Layer 2 cross-check response to a previously validated
    /// finding. Case-insensitive on the first non-empty line: `NO` disputes
    /// the finding and shrinks confidence by 0.3x; `YES` or anything else
    /// leaves it unchanged.
    pub fn apply_cross_check_result(mut validated: ValidatedFinding, response: &str) -> ValidatedFinding {
        let first_line = response
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("");

        if first_line.eq_ignore_ascii_case("NO") {
            validated.validation_status = ValidationStatus::Disputed;
            validated.confidence = (validated.confidence * 0.3).clamp(0.0, 10.0);
            validated.weight = validated.validation_status.weight();
            validated
                .validation_notes
                .push("layer2: cross-check disputed the finding".into());
        }
        validated
    }
}

/// A Layer-2 task specification: model id plus a fully composed prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossCheckTask {
    /// Model this cross-check should be routed to.
    pub model: String,
    /// Fully composed prompt.
    pub prompt: String,
}

/// Pull the cited line range out of `file_content` for a Layer 2 prompt,
/// `lines[line_start-1 .. line_end]` inclusive and clamped to the file's
/// bounds. Missing content or an out-of-range `line_start` yields an empty
/// snippet rather than erroring.
pub fn extract_snippet(file_content: Option<&str>, line_start: u32, line_end: u32) -> String {
    let content = match file_content {
        Some(c) if !c.is_empty() => c,
        _ => return String::new(),
    };

    if line_start == 0 {
        return String::new();
    }

    let lines: Vec<&str> = content.lines().collect();
    let start = (line_start - 1) as usize;
    if start >= lines.len() {
        return String::new();
    }

    let end = (line_end.max(line_start) as usize).min(lines.len());
    lines[start..end].join("\n")
}

fn layer1_structural(
    finding: &DeduplicatedFinding,
    file_content: Option<&str>,
) -> Result<Option<String>, String> {
    let python = is_python_file(&finding.file);

    let content = match file_content {
        Some(c) => c.to_string(),
        None => match std::fs::read_to_string(&finding.file) {
            Ok(c) => c,
            Err(e) => return Err(format!("could not read {}: {e}", finding.file)),
        },
    };

    let lines: Vec<&str> = content.lines().collect();
    if finding.line_start == 0 || (finding.line_start as usize) > lines.len() {
        return Err(format!(
            "line {} out of range ({} lines in file)",
            finding.line_start,
            lines.len()
        ));
    }

    let line = lines[(finding.line_start - 1) as usize];
    if is_blank_or_comment(line, python) {
        return Err("cited line is blank or a comment".into());
    }

    Ok(None)
}

enum Layer3Outcome {
    Rejected,
    Accepted,
    NoSignal,
    Failed(String),
}

fn layer3_historical(finding: &DeduplicatedFinding, retriever: &dyn HistoricalLookup) -> Layer3Outcome {
    let reviewer_id = match finding.reviewer_ids.first() {
        Some(id) => id.clone(),
        None => return Layer3Outcome::NoSignal,
    };
    let query = format!("{} {}", finding.category, finding.description);

    let results = match retriever.query(&reviewer_id, &query) {
        Ok(r) => r,
        Err(reason) => return Layer3Outcome::Failed(reason),
    };

    if results.is_empty() {
        return Layer3Outcome::NoSignal;
    }

    let mut saw_accepted = false;
    for result in &results {
        let text = result.chunk.text.to_lowercase();
        if text.contains("rejected") {
            return Layer3Outcome::Rejected;
        }
        if text.contains("accepted") {
            saw_accepted = true;
        }
    }

    if saw_accepted {
        Layer3Outcome::Accepted
    } else {
        Layer3Outcome::NoSignal
    }
}

//! Documentation gap analysis, §4.12.
//!
//! Analysis-only: never modifies a file, never blocks a review. Any
//! internal failure degrades to an empty report with an explanatory
//! summary rather than propagating, matching the rest of the engine's
//! fail-open design.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;
use walkdir::WalkDir;

const KEY_DOCS: [&str; 2] = ["CLAUDE.md", "docs/README.md"];

static DEF_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:async\s+)?def\s+(\w+)").unwrap());
static CLASS_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^class\s+(\w+)").unwrap());

/// Confidence the gap analysis assigns a doc-file match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapConfidence {
    /// The changed file's exact path appears in the doc.
    High,
    /// Only the module's stem (file name without extension) appears.
    Medium,
}

impl std::fmt::Display for GapConfidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            GapConfidence::High => "high",
            GapConfidence::Medium => "medium",
        })
    }
}

/// A documentation file that may need updating alongside a changed source
/// file.
#[derive(Debug, Clone)]
pub struct DocGap {
    /// Doc file that may be stale.
    pub doc_file: String,
    /// Why this doc was flagged.
    pub reason: String,
    /// The changed file that triggered the match.
    pub changed_file: String,
    /// How confident the match is.
    pub confidence: GapConfidence,
}

/// A function or class added in the diff with no docstring, as
/// `file:line: def name`/`file:line: class name`.
pub type MissingDocstring = String;

/// Result of running the documentation audit over one review task.
#[derive(Debug, Clone)]
pub struct DocAuditReport {
    /// Task id this audit belongs to.
    pub task_id: String,
    /// Docs that may need updating.
    pub gaps: Vec<DocGap>,
    /// Added functions/classes with no docstring.
    pub missing_docstrings: Vec<MissingDocstring>,
    /// One-line human summary.
    pub summary: String,
}

/// Stateless gap analyzer. Grouped as a unit struct for a consistent call
/// surface, matching the engine's other analysis components.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocAuditor;

impl DocAuditor {
    /// Run the full gap analysis. Always returns a report — any internal
    /// failure degrades to an empty one rather than propagating.
    pub fn analyze(
        task_id: &str,
        files: &[String],
        diff_content: &str,
        docs_root: Option<&Path>,
        file_reader: impl Fn(&Path) -> Option<String>,
    ) -> DocAuditReport {
        let gaps = find_doc_gaps(files, docs_root, &file_reader);
        let missing_docstrings = find_missing_docstrings(files, diff_content, &file_reader);
        let summary = build_summary(&gaps, &missing_docstrings);

        DocAuditReport {
            task_id: task_id.to_string(),
            gaps,
            missing_docstrings,
            summary,
        }
    }

    /// Render the report as a `## Documentation Audit` markdown section,
    /// nested under the main review report rather than its own document.
    pub fn render(report: &DocAuditReport) -> String {
        let mut out = format!("## Documentation Audit: {}\n\n", report.task_id);

        out.push_str(&format!("### Documentation Gaps ({} items)\n\n", report.gaps.len()));
        if report.gaps.is_empty() {
            out.push_str("No documentation gaps found.\n");
        } else {
            out.push_str("| Doc File | Changed File | Reason | Confidence |\n");
            out.push_str("|---|---|---|---|\n");
            for gap in &report.gaps {
                out.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    gap.doc_file, gap.changed_file, gap.reason, gap.confidence
                ));
            }
        }

        out.push_str(&format!(
            "\n### Missing Docstrings ({} items)\n\n",
            report.missing_docstrings.len()
        ));
        if report.missing_docstrings.is_empty() {
            out.push_str("No missing docstrings found in changed code.\n");
        } else {
            for item in &report.missing_docstrings {
                out.push_str(&format!("- {item}\n"));
            }
        }

        out.push_str(&format!("\n### Summary\n\n{}\n", report.summary));
        out
    }
}

fn find_doc_gaps(
    files: &[String],
    docs_root: Option<&Path>,
    file_reader: &impl Fn(&Path) -> Option<String>,
) -> Vec<DocGap> {
    let docs_root = docs_root.unwrap_or_else(|| Path::new("docs"));

    let mut doc_files: Vec<PathBuf> = Vec::new();
    if docs_root.is_dir() {
        for entry in WalkDir::new(docs_root).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && entry.path().extension().is_some_and(|e| e == "md") {
                doc_files.push(entry.path().to_path_buf());
            }
        }
    }
    for key_doc in KEY_DOCS {
        let p = PathBuf::from(key_doc);
        if p.is_file() && !doc_files.contains(&p) {
            doc_files.push(p);
        }
    }

    if doc_files.is_empty() {
        return Vec::new();
    }

    let mut gaps = Vec::new();
    for changed_file in files {
        let module_name = Path::new(changed_file)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        for doc_path in &doc_files {
            let Some(content) = file_reader(doc_path) else {
                continue;
            };
            let doc_str = doc_path.to_string_lossy().to_string();

            if content.contains(changed_file.as_str()) {
                gaps.push(DocGap {
                    doc_file: doc_str,
                    reason: format!("Exact path '{changed_file}' found in doc"),
                    changed_file: changed_file.clone(),
                    confidence: GapConfidence::High,
                });
            } else if module_name.len() > 3 && content.to_lowercase().contains(&module_name.to_lowercase()) {
                gaps.push(DocGap {
                    doc_file: doc_str,
                    reason: format!("Module name '{module_name}' mentioned in doc"),
                    changed_file: changed_file.clone(),
                    confidence: GapConfidence::Medium,
                });
            }
        }
    }

    gaps
}

/// Functions/classes added in the diff without a docstring. Detection is
/// line-based, not an AST parse: the line immediately after a `def`/`class`
/// body's first statement is checked for an opening `"""`/`'''`. This is a
/// known limitation — a decorator, multi-line signature, or a non-docstring
/// first expression can produce a false positive or negative; the original
/// Python implementation used `ast.parse`, which this crate doesn't carry
/// a dependency for.
fn find_missing_docstrings(
    files: &[String],
    diff_content: &str,
    file_reader: &impl Fn(&Path) -> Option<String>,
) -> Vec<MissingDocstring> {
    if diff_content.trim().is_empty() {
        return Vec::new();
    }

    let mut added_names = std::collections::HashSet::new();
    for line in diff_content.lines() {
        if !line.starts_with('+') || line.starts_with("+++") {
            continue;
        }
        let stripped = line[1..].trim_start();
        if let Some(caps) = DEF_PATTERN.captures(stripped) {
            added_names.insert(caps[1].to_string());
        }
        if let Some(caps) = CLASS_PATTERN.captures(stripped) {
            added_names.insert(caps[1].to_string());
        }
    }

    if added_names.is_empty() {
        return Vec::new();
    }

    let mut missing = Vec::new();
    for file_path_str in files {
        if !file_path_str.ends_with(".py") {
            continue;
        }
        let path = Path::new(file_path_str);
        let Some(content) = file_reader(path) else {
            continue;
        };

        let lines: Vec<&str> = content.lines().collect();
        for (idx, line) in lines.iter().enumerate() {
            let trimmed = line.trim_start();
            let (kind, name) = if let Some(caps) = DEF_PATTERN.captures(trimmed) {
                ("def", caps[1].to_string())
            } else if let Some(caps) = CLASS_PATTERN.captures(trimmed) {
                ("class", caps[1].to_string())
            } else {
                continue;
            };

            if !added_names.contains(&name) {
                continue;
            }

            let has_docstring = lines[idx + 1..]
                .iter()
                .find(|l| !l.trim().is_empty())
                .is_some_and(|l| {
                    let t = l.trim_start();
                    t.starts_with("\"\"\"") || t.starts_with("'''")
                });

            if !has_docstring {
                missing.push(format!("{file_path_str}:{}: {kind} {name}", idx + 1));
            }
        }
    }

    missing
}

fn build_summary(gaps: &[DocGap], missing_docstrings: &[MissingDocstring]) -> String {
    let mut parts = Vec::new();

    if gaps.is_empty() {
        parts.push("No documentation gaps detected".to_string());
    } else {
        let high = gaps.iter().filter(|g| g.confidence == GapConfidence::High).count();
        let medium = gaps.iter().filter(|g| g.confidence == GapConfidence::Medium).count();
        parts.push(format!(
            "{} doc file(s) may need updating ({high} high, {medium} medium confidence)",
            gaps.len()
        ));
    }

    if !missing_docstrings.is_empty() {
        parts.push(format!(
            "{} function(s)/class(es) missing docstrings",
            missing_docstrings.len()
        ));
    }

    format!("{}.", parts.join(". "))
}

/// Best-effort file reader for [`DocAuditor::analyze`], logging and
/// returning `None` on any failure rather than propagating.
pub fn read_file_lossy(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "doc audit could not read file");
            None
        }
    }
}

//! Flags stale, bloated, contradictory, and orphaned knowledge entries,
//! §4.7.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static DATE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d{4}-\d{2}-\d{2})\]").unwrap());
static FILE_PATH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([a-zA-Z0-9_./-]+\.\w+)(?::\d+)?`").unwrap());

const STALE_THRESHOLD_DAYS: i64 = 90;
const BLOAT_THRESHOLD_ENTRIES: usize = 50;

const PATTERNS_FOUND_HEADER: &str = "## Patterns Found";
const FALSE_POSITIVES_HEADER: &str = "## False Positives to Avoid";

/// Severity of a detected drift signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftSeverity {
    /// Low-impact signal (orphaned reference).
    Low,
    /// Medium-impact signal (stale entry).
    Medium,
    /// High-impact signal (bloat, contradiction).
    High,
}

/// Category of drift detected in a knowledge file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftSignalType {
    /// Entry older than the staleness threshold.
    Stale,
    /// File has more entries than the bloat threshold.
    Bloated,
    /// Same file path appears in both Patterns Found and False Positives.
    Contradictory,
    /// Referenced file no longer exists in the project.
    Orphaned,
}

/// A single detected drift issue.
#[derive(Debug, Clone)]
pub struct DriftSignal {
    /// Reviewer whose knowledge file this came from.
    pub reviewer_id: String,
    /// Category of the signal.
    pub signal_type: DriftSignalType,
    /// Severity.
    pub severity: DriftSeverity,
    /// Human-readable description.
    pub description: String,
    /// Path of the offending knowledge file.
    pub file_path: PathBuf,
}

/// Aggregate recommendation across all reviewers' knowledge files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftRecommendation {
    /// No drift signals anywhere.
    Healthy,
    /// Stale or bloated entries exist, but nothing contradictory.
    NeedsPruning,
    /// A contradiction was found; a human should look at it.
    NeedsReview,
}

/// Summary of a drift analysis run.
#[derive(Debug, Clone, Default)]
pub struct DriftReport {
    /// All signals found, across every reviewer.
    pub signals: Vec<DriftSignal>,
    /// Total entry count across all scanned files.
    pub total_entries: usize,
    /// Count of reviewers with zero signals.
    pub healthy_count: usize,
    /// Overall recommendation.
    pub recommendation: Option<DriftRecommendation>,
}

/// Scans `KNOWLEDGE.md` files under a reviewers root for drift.
pub struct DriftDetector {
    reviewers_dir: PathBuf,
    project_root: PathBuf,
}

impl DriftDetector {
    /// Build a detector rooted at `reviewers_dir`, resolving orphan checks
    /// relative to `project_root`.
    pub fn new(reviewers_dir: impl Into<PathBuf>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            reviewers_dir: reviewers_dir.into(),
            project_root: project_root.into(),
        }
    }

    /// Run the full analysis across every discovered `KNOWLEDGE.md`.
    pub fn analyze(&self) -> DriftReport {
        let mut report = DriftReport::default();

        for (path, reviewer_id) in self.find_knowledge_files() {
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };

            let entries = count_entries(&content);
            report.total_entries += entries;

            let mut signals = self.check_staleness(&content, &path, &reviewer_id);
            signals.extend(self.check_bloat(entries, &path, &reviewer_id));
            signals.extend(self.check_contradictions(&content, &path, &reviewer_id));
            signals.extend(self.check_orphaned(&content, &path, &reviewer_id));

            if signals.is_empty() {
                report.healthy_count += 1;
            }
            report.signals.extend(signals);
        }

        report.recommendation = Some(compute_recommendation(&report));
        report
    }

    fn find_knowledge_files(&self) -> Vec<(PathBuf, String)> {
        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(&self.reviewers_dir)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.file_name() == "KNOWLEDGE.md" {
                if let Some(reviewer_id) = entry
                    .path()
                    .parent()
                    .and_then(|p| p.file_name())
                    .and_then(|n| n.to_str())
                {
                    out.push((entry.path().to_path_buf(), reviewer_id.to_string()));
                }
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    fn check_staleness(&self, content: &str, path: &Path, reviewer_id: &str) -> Vec<DriftSignal> {
        let today = Utc::now().date_naive();
        let cutoff = today - Duration::days(STALE_THRESHOLD_DAYS);
        let mut signals = Vec::new();

        for line in content.lines() {
            if !is_entry_line(line) {
                continue;
            }
            let Some(caps) = DATE_PATTERN.captures(line) else {
                continue;
            };
            let Ok(entry_date) = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d") else {
                continue;
            };
            if entry_date < cutoff {
                let age_days = (today - entry_date).num_days();
                signals.push(DriftSignal {
                    reviewer_id: reviewer_id.to_string(),
                    signal_type: DriftSignalType::Stale,
                    severity: DriftSeverity::Medium,
                    description: format!(
                        "entry is {age_days} days old (threshold: {STALE_THRESHOLD_DAYS})"
                    ),
                    file_path: path.to_path_buf(),
                });
            }
        }
        signals
    }

    fn check_bloat(&self, entry_count: usize, path: &Path, reviewer_id: &str) -> Vec<DriftSignal> {
        if entry_count > BLOAT_THRESHOLD_ENTRIES {
            vec![DriftSignal {
                reviewer_id: reviewer_id.to_string(),
                signal_type: DriftSignalType::Bloated,
                severity: DriftSeverity::High,
                description: format!(
                    "file has {entry_count} entries (threshold: {BLOAT_THRESHOLD_ENTRIES})"
                ),
                file_path: path.to_path_buf(),
            }]
        } else {
            Vec::new()
        }
    }

    fn check_contradictions(&self, content: &str, path: &Path, reviewer_id: &str) -> Vec<DriftSignal> {
        let sections = parse_sections(content);
        let patterns = extract_file_stems(sections.get(PATTERNS_FOUND_HEADER).map(String::as_str).unwrap_or(""));
        let false_positives =
            extract_file_stems(sections.get(FALSE_POSITIVES_HEADER).map(String::as_str).unwrap_or(""));

        let mut overlapping: Vec<&String> = patterns.intersection(&false_positives).collect();
        overlapping.sort();

        overlapping
            .into_iter()
            .map(|stem| DriftSignal {
                reviewer_id: reviewer_id.to_string(),
                signal_type: DriftSignalType::Contradictory,
                severity: DriftSeverity::High,
                description: format!(
                    "'{stem}' appears in both Patterns Found and False Positives — may be contradictory"
                ),
                file_path: path.to_path_buf(),
            })
            .collect()
    }

    fn check_orphaned(&self, content: &str, path: &Path, reviewer_id: &str) -> Vec<DriftSignal> {
        let stems = extract_file_stems(content);
        let mut stems: Vec<&String> = stems.iter().collect();
        stems.sort();

        stems
            .into_iter()
            .filter(|stem| !self.project_root.join(stem).exists())
            .map(|stem| DriftSignal {
                reviewer_id: reviewer_id.to_string(),
                signal_type: DriftSignalType::Orphaned,
                severity: DriftSeverity::Low,
                description: format!("referenced file '{stem}' no longer exists"),
                file_path: path.to_path_buf(),
            })
            .collect()
    }
}

fn is_entry_line(line: &str) -> bool {
    line.trim_start().starts_with("- ")
}

fn count_entries(content: &str) -> usize {
    content.lines().filter(|l| is_entry_line(l)).count()
}

fn parse_sections(content: &str) -> HashMap<String, String> {
    let mut sections = HashMap::new();
    let mut current_header: Option<String> = None;
    let mut current_lines: Vec<&str> = Vec::new();

    for line in content.lines() {
        if line.starts_with("## ") {
            if let Some(header) = current_header.take() {
                sections.insert(header, current_lines.join("\n"));
            }
            current_header = Some(line.trim().to_string());
            current_lines = Vec::new();
        } else {
            current_lines.push(line);
        }
    }
    if let Some(header) = current_header {
        sections.insert(header, current_lines.join("\n"));
    }
    sections
}

fn extract_file_stems(section_content: &str) -> HashSet<String> {
    FILE_PATH_PATTERN
        .captures_iter(section_content)
        .map(|caps| caps[1].to_string())
        .collect()
}

fn compute_recommendation(report: &DriftReport) -> DriftRecommendation {
    if report
        .signals
        .iter()
        .any(|s| s.signal_type == DriftSignalType::Contradictory)
    {
        DriftRecommendation::NeedsReview
    } else if report
        .signals
        .iter()
        .any(|s| matches!(s.signal_type, DriftSignalType::Bloated | DriftSignalType::Stale))
    {
        DriftRecommendation::NeedsPruning
    } else {
        DriftRecommendation::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_knowledge(dir: &Path, reviewer_id: &str, content: &str) {
        let reviewer_dir = dir.join(reviewer_id);
        fs::create_dir_all(&reviewer_dir).unwrap();
        fs::write(reviewer_dir.join("KNOWLEDGE.md"), content).unwrap();
    }

    #[test]
    fn stale_entries_are_flagged() {
        let dir = tempfile::tempdir().unwrap();
        write_knowledge(
            dir.path(),
            "security",
            "## Patterns Found\n- [2000-01-01] ancient finding\n",
        );
        let detector = DriftDetector::new(dir.path(), dir.path());
        let report = detector.analyze();
        assert!(report
            .signals
            .iter()
            .any(|s| s.signal_type == DriftSignalType::Stale));
    }

    #[test]
    fn bloated_file_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = String::from("## Patterns Found\n");
        for i in 0..60 {
            content.push_str(&format!("- [2024-01-01] entry {i}\n"));
        }
        write_knowledge(dir.path(), "security", &content);
        let detector = DriftDetector::new(dir.path(), dir.path());
        let report = detector.analyze();
        assert!(report
            .signals
            .iter()
            .any(|s| s.signal_type == DriftSignalType::Bloated));
    }

    #[test]
    fn contradictory_entries_drive_needs_review() {
        let dir = tempfile::tempdir().unwrap();
        write_knowledge(
            dir.path(),
            "security",
            "## Patterns Found\n- [2024-01-01] issue in `app.py:42`\n\
             ## False Positives to Avoid\n- [2024-01-02] false alarm in `app.py:10`\n",
        );
        let detector = DriftDetector::new(dir.path(), dir.path());
        let report = detector.analyze();
        assert!(report
            .signals
            .iter()
            .any(|s| s.signal_type == DriftSignalType::Contradictory));
        assert_eq!(report.recommendation, Some(DriftRecommendation::NeedsReview));
    }

    #[test]
    fn orphaned_references_are_low_severity() {
        let dir = tempfile::tempdir().unwrap();
        write_knowledge(
            dir.path(),
            "security",
            "## Patterns Found\n- [2024-01-01] issue in `missing.py:1`\n",
        );
        let detector = DriftDetector::new(dir.path(), dir.path());
        let report = detector.analyze();
        let signal = report
            .signals
            .iter()
            .find(|s| s.signal_type == DriftSignalType::Orphaned)
            .unwrap();
        assert_eq!(signal.severity, DriftSeverity::Low);
    }

    #[test]
    fn healthy_reviewer_increments_healthy_count() {
        let dir = tempfile::tempdir().unwrap();
        write_knowledge(
            dir.path(),
            "security",
            &format!("## Patterns Found\n- [{}] fresh entry\n", Utc::now().date_naive()),
        );
        let detector = DriftDetector::new(dir.path(), dir.path());
        let report = detector.analyze();
        assert_eq!(report.healthy_count, 1);
        assert_eq!(report.recommendation, Some(DriftRecommendation::Healthy));
    }
}

//! Shared data model types, §3.
//!
//! These are the wire and in-memory shapes that flow between components.
//! Nothing in this module does any work; it is the vocabulary the rest of
//! the crate shares.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The five fixed reviewer identities. Closed set — no sixth reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerId {
    /// Security-focused review.
    Security,
    /// Logic/correctness review.
    Correctness,
    /// Performance review.
    Performance,
    /// Maintainability/readability review.
    Maintainability,
    /// Reliability/operational-risk review.
    Reliability,
}

impl ReviewerId {
    /// All five reviewer ids, in a fixed canonical order.
    pub const ALL: [ReviewerId; 5] = [
        ReviewerId::Security,
        ReviewerId::Correctness,
        ReviewerId::Performance,
        ReviewerId::Maintainability,
        ReviewerId::Reliability,
    ];

    /// The string form used in file paths, JSON, and prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewerId::Security => "security",
            ReviewerId::Correctness => "correctness",
            ReviewerId::Performance => "performance",
            ReviewerId::Maintainability => "maintainability",
            ReviewerId::Reliability => "reliability",
        }
    }

    /// Parse a reviewer id from its string form.
    pub fn parse(s: &str) -> Option<ReviewerId> {
        match s {
            "security" => Some(ReviewerId::Security),
            "correctness" => Some(ReviewerId::Correctness),
            "performance" => Some(ReviewerId::Performance),
            "maintainability" => Some(ReviewerId::Maintainability),
            "reliability" => Some(ReviewerId::Reliability),
            _ => None,
        }
    }
}

impl fmt::Display for ReviewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity/risk tier, used for both the overall Consensus Score and
/// individual per-finding `R_i` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// `[0, 4)`
    Informational,
    /// `[4, 7)`
    Moderate,
    /// `[7, 9)`
    Important,
    /// `[9, 10]`
    Critical,
}

impl Tier {
    /// Classify a score in `[0, 10]` into its tier, per §3.
    pub fn classify(score: f64) -> Tier {
        if score >= 9.0 {
            Tier::Critical
        } else if score >= 7.0 {
            Tier::Important
        } else if score >= 4.0 {
            Tier::Moderate
        } else {
            Tier::Informational
        }
    }

    /// Whether a review at this tier is considered mergeable.
    pub fn passes(&self) -> bool {
        matches!(self, Tier::Informational | Tier::Moderate)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Informational => "informational",
            Tier::Moderate => "moderate",
            Tier::Important => "important",
            Tier::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A single finding as produced by one reviewer, before deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFinding {
    /// File path the finding cites.
    pub file: String,
    /// 1-based line the finding starts at.
    pub line_start: u32,
    /// 1-based line the finding ends at.
    #[serde(default)]
    pub line_end: u32,
    /// Finding category, e.g. `"sql-injection"`.
    pub category: String,
    /// Severity in `[0, 10]`.
    #[serde(default)]
    pub severity: f64,
    /// Confidence in `[0, 10]`.
    #[serde(default)]
    pub confidence: f64,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Suggested remediation.
    #[serde(default)]
    pub remediation: String,
    /// Reviewer that produced this finding.
    #[serde(default)]
    pub reviewer_id: String,
}

impl RawFinding {
    fn line_end_or_start(&self) -> u32 {
        if self.line_end == 0 {
            self.line_start
        } else {
            self.line_end
        }
    }
}

/// A group of raw findings merged by the Fingerprinter, §4.1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeduplicatedFinding {
    /// 64-hex-char dedup bucket identifier.
    pub fingerprint: String,
    /// File of the highest-severity member.
    pub file: String,
    /// Start line of the highest-severity member.
    pub line_start: u32,
    /// End line of the highest-severity member.
    pub line_end: u32,
    /// Shared category.
    pub category: String,
    /// Max severity across the group.
    pub severity: f64,
    /// Max confidence across the group.
    pub confidence: f64,
    /// Description of the highest-severity member.
    pub description: String,
    /// Order-preserving deduped union of all descriptions in the group.
    pub descriptions: Vec<String>,
    /// Order-preserving deduped union of all remediations in the group.
    pub remediation: Vec<String>,
    /// Distinct reviewer ids that contributed to this group.
    pub reviewer_ids: Vec<String>,
    /// `|reviewer_ids|`.
    pub k: usize,
}

impl DeduplicatedFinding {
    /// Build the bucket normalization used for fingerprinting: floor the
    /// line to a multiple of 3.
    pub fn bucket_line(line_start: u32) -> u32 {
        (line_start / 3) * 3
    }
}

/// Outcome of running a [`DeduplicatedFinding`] through the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    /// Layer 1 structural check passed.
    Verified,
    /// No layer could confirm the finding.
    Unverified,
    /// Layer 2 cross-check said no.
    Disputed,
    /// Layer 3 historical lookup found a prior rejection.
    HistoricallyRejected,
}

impl ValidationStatus {
    /// The deterministic weight map, §3/P7.
    pub fn weight(&self) -> f64 {
        match self {
            ValidationStatus::Verified => 1.0,
            ValidationStatus::Unverified => 0.5,
            ValidationStatus::Disputed => 0.2,
            ValidationStatus::HistoricallyRejected => 0.0,
        }
    }
}

/// A [`DeduplicatedFinding`] after validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedFinding {
    /// The finding, with `confidence` possibly updated by a validation
    /// layer.
    pub finding: DeduplicatedFinding,
    /// Final validation status.
    pub validation_status: ValidationStatus,
    /// Final confidence, always clamped to `[0, 10]`.
    pub confidence: f64,
    /// Notes accumulated across layers, for the report.
    pub validation_notes: Vec<String>,
    /// Weight derived from `validation_status`.
    pub weight: f64,
}

/// A deduplicated finding with its computed risk score, §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredFinding {
    /// The underlying finding.
    pub finding: DeduplicatedFinding,
    /// `clamp(severity * confidence / 10, 0, 10)`.
    pub r_i: f64,
    /// Tier derived from `r_i`.
    pub tier: Tier,
}

/// The result of running the Consensus Score calculator, §4.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusScoreResult {
    /// Final consensus score, after MPR.
    pub cs: f64,
    /// Tier classified from `cs`.
    pub tier: Tier,
    /// Scored findings, sorted by `r_i` descending (ties by
    /// `(file, line_start, category)`).
    pub findings: Vec<ScoredFinding>,
    /// Mean `r_i`.
    pub r_bar: f64,
    /// Max `r_i`.
    pub r_max: f64,
    /// Sum of `k` across findings.
    pub k_total: usize,
    /// Fixed reviewer count.
    pub n: usize,
    /// Whether the review passes the tier check.
    pub passed: bool,
    /// Whether the Minority Protection Rule fired.
    pub minority_protection_applied: bool,
    /// One-line human summary.
    pub summary: String,
}

/// Which section of a `KNOWLEDGE.md` a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeSection {
    /// `## Patterns Found`
    PatternsFound,
    /// `## False Positives to Avoid`
    FalsePositives,
    /// `## Incidents Prevented`
    IncidentsPrevented,
    /// `## Repository-Specific Rules`
    RepoRules,
    /// `## Codebase Context`
    CodebaseContext,
}

impl KnowledgeSection {
    /// Match a `##` header line (case-sensitive, trimmed) against the
    /// fixed section headers in the `KNOWLEDGE.md` grammar, §6.
    pub fn from_header(header: &str) -> Option<KnowledgeSection> {
        match header.trim() {
            "Patterns Found" => Some(KnowledgeSection::PatternsFound),
            "False Positives to Avoid" => Some(KnowledgeSection::FalsePositives),
            "Incidents Prevented" => Some(KnowledgeSection::IncidentsPrevented),
            "Repository-Specific Rules" => Some(KnowledgeSection::RepoRules),
            "Codebase Context" => Some(KnowledgeSection::CodebaseContext),
            _ => None,
        }
    }
}

/// One atomic, dated, sourced entry parsed out of a `KNOWLEDGE.md`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    /// The entry text.
    pub text: String,
    /// Which reviewer owns this knowledge file.
    pub reviewer_id: String,
    /// Which section the entry appeared under.
    pub section: KnowledgeSection,
    /// `YYYY-MM-DD` date of the entry.
    pub date: String,
    /// `(Source: ...)` suffix, or `"unknown"`.
    pub source: String,
    /// First 16 hex chars of `SHA-256(reviewer_id:section:date:source:text)`.
    pub chunk_id: String,
}

/// Which knowledge tier a retrieved chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    /// Shared across all projects.
    Global,
    /// Specific to this repository.
    Project,
}

/// A knowledge chunk annotated with its retrieval score and tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedResult {
    /// The retrieved chunk.
    pub chunk: KnowledgeChunk,
    /// Cosine similarity score in `[0, 1]`.
    pub score: f64,
    /// Which tier produced this result.
    pub source_tier: SourceTier,
}

/// A loaded reviewer configuration, §4.8.
#[derive(Debug, Clone)]
pub struct ReviewerConfig {
    /// Reviewer identity.
    pub id: ReviewerId,
    /// Contents of `PROMPT.md`.
    pub prompt: String,
    /// Contents of `KNOWLEDGE.md`, or `""` if absent.
    pub knowledge: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Whether this reviewer is relevant to the current diff's files.
    pub relevant: bool,
}

/// A durable record of a policy override, §4.11.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BypassRecord {
    /// Task the bypass applies to.
    pub task_id: String,
    /// Why the reviewer bypassed the gate.
    pub reason: String,
    /// Who performed the bypass.
    pub bypassed_by: String,
    /// The Consensus Score at the time of bypass, if a review ran.
    pub cs_at_bypass: Option<f64>,
    /// The tier at the time of bypass, if a review ran.
    pub tier_at_bypass: Option<Tier>,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

pub(crate) fn effective_line_end(f: &RawFinding) -> u32 {
    f.line_end_or_start()
}

//! Parses a `KNOWLEDGE.md` file into atomic, dated, sourced entries, §4.5.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::core::types::{KnowledgeChunk, KnowledgeSection};

static ENTRY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-\s+\[(\d{4}-\d{2}-\d{2})\]\s+(.+?)\s+\(Source:\s+(.+?)\)\s*$").unwrap()
});

static ENTRY_NO_SOURCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-\s+\[(\d{4}-\d{2}-\d{2})\]\s+(.+?)\s*$").unwrap());

/// Stateless parser; see [`KnowledgeChunker::parse`].
#[derive(Debug, Default, Clone, Copy)]
pub struct KnowledgeChunker;

impl KnowledgeChunker {
    /// Parse a `KNOWLEDGE.md` file's content into chunks for one reviewer.
    /// Unrecognized lines (non-`##` headers, non-`- [date] ...` entries)
    /// are skipped silently; parsing never fails.
    pub fn parse(content: &str, reviewer_id: &str) -> Vec<KnowledgeChunk> {
        let mut chunks = Vec::new();
        let mut current_section: Option<KnowledgeSection> = None;

        for line in content.lines() {
            let stripped = line.trim();

            if let Some(header) = stripped.strip_prefix("## ") {
                current_section = KnowledgeSection::from_header(header);
                continue;
            }

            let Some(section) = current_section else {
                continue;
            };

            if !stripped.starts_with("- ") {
                continue;
            }

            if let Some(chunk) = parse_entry(stripped, reviewer_id, section) {
                chunks.push(chunk);
            }
        }

        chunks
    }
}

fn parse_entry(line: &str, reviewer_id: &str, section: KnowledgeSection) -> Option<KnowledgeChunk> {
    if let Some(caps) = ENTRY_PATTERN.captures(line) {
        let date = caps[1].to_string();
        let text = caps[2].trim().to_string();
        let source = caps[3].trim().to_string();
        let chunk_id = make_chunk_id(reviewer_id, section, &date, &source, &text);
        return Some(KnowledgeChunk {
            text,
            reviewer_id: reviewer_id.to_string(),
            section,
            date,
            source,
            chunk_id,
        });
    }

    if let Some(caps) = ENTRY_NO_SOURCE_PATTERN.captures(line) {
        let date = caps[1].to_string();
        let text = caps[2].trim().to_string();
        let chunk_id = make_chunk_id(reviewer_id, section, &date, "unknown", &text);
        return Some(KnowledgeChunk {
            text,
            reviewer_id: reviewer_id.to_string(),
            section,
            date,
            source: "unknown".to_string(),
            chunk_id,
        });
    }

    None
}

fn section_key(section: KnowledgeSection) -> &'static str {
    match section {
        KnowledgeSection::PatternsFound => "patterns_found",
        KnowledgeSection::FalsePositives => "false_positives",
        KnowledgeSection::IncidentsPrevented => "incidents_prevented",
        KnowledgeSection::RepoRules => "repo_rules",
        KnowledgeSection::CodebaseContext => "codebase_context",
    }
}

fn make_chunk_id(reviewer_id: &str, section: KnowledgeSection, date: &str, source: &str, text: &str) -> String {
    let normalized_text: Vec<&str> = text.split_whitespace().collect();
    let normalized_text = normalized_text.join(" ");
    let raw = format!(
        "{reviewer_id}:{}:{date}:{source}:{normalized_text}",
        section_key(section)
    );
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# KNOWLEDGE.md -- Security Reviewer
## Patterns Found
- [2024-01-15] SQL injection via string formatting (Source: PR#42)
- [2024-02-01] Missing CSRF token on state-changing routes
## False Positives to Avoid
- [2024-01-20] Parameterized queries flagged incorrectly (Source: review)
## Incidents Prevented
## Repository-Specific Rules
## Codebase Context
";

    #[test]
    fn parses_entries_with_and_without_source() {
        let chunks = KnowledgeChunker::parse(SAMPLE, "security");
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].source, "PR#42");
        assert_eq!(chunks[1].source, "unknown");
        assert_eq!(chunks[0].section, KnowledgeSection::PatternsFound);
        assert_eq!(chunks[2].section, KnowledgeSection::FalsePositives);
    }

    #[test]
    fn empty_sections_produce_no_chunks() {
        let chunks = KnowledgeChunker::parse(SAMPLE, "security");
        assert!(!chunks
            .iter()
            .any(|c| c.section == KnowledgeSection::IncidentsPrevented));
    }

    #[test]
    fn chunk_id_is_deterministic_and_16_hex_chars() {
        let chunks = KnowledgeChunker::parse(SAMPLE, "security");
        let again = KnowledgeChunker::parse(SAMPLE, "security");
        assert_eq!(chunks[0].chunk_id, again[0].chunk_id);
        assert_eq!(chunks[0].chunk_id.len(), 16);
        assert!(chunks[0].chunk_id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn lines_before_any_header_are_skipped() {
        let content = "- [2024-01-01] orphaned entry (Source: x)\n## Patterns Found\n";
        let chunks = KnowledgeChunker::parse(content, "security");
        assert!(chunks.is_empty());
    }

    #[test]
    fn unrecognized_headers_swallow_their_entries() {
        let content = "## Unknown Section\n- [2024-01-01] should not be parsed\n";
        let chunks = KnowledgeChunker::parse(content, "security");
        assert!(chunks.is_empty());
    }
}

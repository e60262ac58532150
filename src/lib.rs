//! # consensus-review-core
//!
//! Core engine for a multi-reviewer consensus code-review system. Five
//! fixed reviewer personas (security, correctness, performance,
//! maintainability, reliability) each produce findings against a diff;
//! this crate fingerprints and deduplicates those findings, validates
//! them through a three-layer fail-open pipeline, combines them into a
//! single Consensus Score with minority protection for high-severity
//! security/reliability findings, routes reviewer work to models by diff
//! size, and retrieves repository-specific knowledge to ground each
//! reviewer's prompt.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                          │
//! ├───────────────┬───────────────┬───────────────┬──────────────┤
//! │  Reviewer      │ Fingerprinter │ FindingValidator│ ConsensusScore │
//! │  Engine/Loader │ (dedup)       │ (3-layer,       │ (MPR)          │
//! │  + ModelRouter │               │  fail-open)     │                │
//! ├───────────────┴───────────────┴───────────────┴──────────────┤
//! │              Knowledge (chunker, embeddings,                  │
//! │              vector store, RAG engine, retriever, drift)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │              DocAuditor (analysis-only)  │  Bypass audit     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use consensus_review_core::reviewer::engine::{ReviewerEngine, TaskResponse};
//! use consensus_review_core::orchestrator::{Orchestrator, ReviewRequest};
//! use std::collections::HashMap;
//!
//! # fn main() -> consensus_review_core::core::errors::Result<()> {
//! let engine = ReviewerEngine::new("reviewers");
//! let tasks = engine.prepare_review_tasks(
//!     &["src/app.py".to_string()],
//!     "+def handle(req):\n+    return req\n",
//!     &[],
//!     None,
//!     None,
//!     None,
//! )?;
//!
//! // Dispatch `tasks` to an LLM, then feed the responses back in:
//! let responses: Vec<TaskResponse> = tasks
//!     .iter()
//!     .map(|t| TaskResponse { reviewer_id: t.reviewer_id.as_str().to_string(), response: "[]\nSCORE: 10\nSUMMARY: clean".into() })
//!     .collect();
//! let results = ReviewerEngine::parse_results(&responses);
//!
//! let request = ReviewRequest {
//!     task_id: "pr-1".into(),
//!     files: vec!["src/app.py".into()],
//!     diff: "+def handle(req):\n+    return req\n".into(),
//!     properties: vec![],
//! };
//! let result =
//!     Orchestrator::finalize_review(&request, &results, &HashMap::new(), None, None, None)?;
//! println!("{}", result.consensus.summary);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::too_many_arguments)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

/// Shared error types, configuration, and data model.
pub mod core;

/// Fingerprinting and deduplication of raw findings, §4.1.
pub mod fingerprint;

/// Three-layer fail-open finding validation, §4.2.
pub mod validator;

/// Consensus Score calculation with the Minority Protection Rule, §4.3.
pub mod consensus;

/// Per-reviewer model routing by diff size, §4.4.
pub mod model_router;

/// Two-tier RAG knowledge retrieval: chunking, embeddings, vector store,
/// the RAG engine, the retriever, and drift detection, §4.5-§4.7.
pub mod knowledge;

/// Reviewer configuration loading and the two-phase review engine,
/// §4.8-§4.9.
pub mod reviewer;

/// Ties the pipeline together and renders the final markdown report,
/// §4.10.
pub mod orchestrator;

/// Documentation gap analysis, analysis-only, §4.12.
pub mod doc_audit;

/// Emergency policy bypass with an append-only audit trail, §4.11.
pub mod bypass;

pub use core::errors::{Result, ReviewError};

/// Library version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

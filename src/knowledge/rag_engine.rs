//! Ties chunking, embedding, and vector storage together per reviewer,
//! §4.5.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::core::types::KnowledgeChunk;
use crate::knowledge::chunker::KnowledgeChunker;
use crate::knowledge::embeddings::EmbeddingProvider;
use crate::knowledge::vector_store::{JsonVectorStore, VectorStore};

/// A query result with its similarity score.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// The retrieved chunk.
    pub chunk: KnowledgeChunk,
    /// Cosine similarity in `[0, 1]`.
    pub score: f32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileHashes(HashMap<String, String>);

/// Indexes `KNOWLEDGE.md` files into a vector store and serves similarity
/// queries scoped to a reviewer.
pub struct RagEngine {
    store_dir: PathBuf,
    hash_file: PathBuf,
    hashes: HashMap<String, String>,
    store: JsonVectorStore,
    provider: Box<dyn EmbeddingProvider>,
}

impl RagEngine {
    /// Open (or create) a RAG engine rooted at `store_dir`, using the
    /// supplied embedding provider for every future `embed`/`embed_query`
    /// call.
    pub fn new(store_dir: impl Into<PathBuf>, provider: Box<dyn EmbeddingProvider>) -> Self {
        let store_dir = store_dir.into();
        let _ = fs::create_dir_all(&store_dir);
        let hash_file = store_dir.join("file_hashes.json");
        let hashes = match fs::read_to_string(&hash_file) {
            Ok(text) => serde_json::from_str::<FileHashes>(&text).unwrap_or_default().0,
            Err(_) => HashMap::new(),
        };
        let store = JsonVectorStore::open(store_dir.join("vectors.json"));
        Self {
            store_dir,
            hash_file,
            hashes,
            store,
            provider,
        }
    }

    /// Collection name a reviewer's chunks are stored under.
    pub fn collection_name(reviewer_id: &str) -> String {
        format!("reviewer_{reviewer_id}")
    }

    fn compute_file_hash(path: &Path) -> Option<String> {
        let bytes = fs::read(path).ok()?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Some(format!("{:x}", hasher.finalize()))
    }

    /// Whether `knowledge_path`'s content hash differs from the one stored
    /// for `reviewer_id` at the last successful `index` call.
    pub fn needs_reindex(&self, reviewer_id: &str, knowledge_path: &Path) -> bool {
        match Self::compute_file_hash(knowledge_path) {
            Some(hash) => self.hashes.get(reviewer_id) != Some(&hash),
            None => true,
        }
    }

    fn save_hashes(&self) {
        let Ok(json) = serde_json::to_string(&FileHashes(self.hashes.clone())) else {
            return;
        };
        if fs::write(&self.hash_file, json).is_err() {
            warn!(path = %self.hash_file.display(), "could not persist knowledge file hashes");
        }
    }

    /// Parse, embed, and upsert one reviewer's `KNOWLEDGE.md`. Returns the
    /// number of chunks indexed. A file with zero parseable chunks indexes
    /// nothing and leaves the stored hash untouched.
    pub fn index(&mut self, reviewer_id: &str, knowledge_path: &Path) -> usize {
        let content = match fs::read_to_string(knowledge_path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %knowledge_path.display(), error = %e, "could not read knowledge file");
                return 0;
            }
        };

        let chunks = KnowledgeChunker::parse(&content, reviewer_id);
        if chunks.is_empty() {
            return 0;
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let ids: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
        let metadatas: Vec<serde_json::Value> = chunks
            .iter()
            .map(|c| serde_json::to_value(c).unwrap_or(serde_json::Value::Null))
            .collect();

        let embeddings: Vec<Vec<f32>> = self.provider.embed(&texts);
        self.store
            .upsert(&Self::collection_name(reviewer_id), &ids, &embeddings, &metadatas);

        if let Some(hash) = Self::compute_file_hash(knowledge_path) {
            self.hashes.insert(reviewer_id.to_string(), hash);
            self.save_hashes();
        }

        chunks.len()
    }

    /// Index every `<root>/<reviewer_id>/KNOWLEDGE.md` discovered under
    /// `root`. Returns the total chunks indexed across all reviewers.
    pub fn index_all(&mut self, root: &Path) -> usize {
        let mut total = 0;
        let Ok(entries) = fs::read_dir(root) else {
            return 0;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(reviewer_id) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let knowledge_path = path.join("KNOWLEDGE.md");
            if knowledge_path.is_file() {
                total += self.index(reviewer_id, &knowledge_path);
            }
        }
        total
    }

    /// Query a reviewer's collection, reconstructing [`KnowledgeChunk`]
    /// values from the stored metadata.
    pub fn query(&mut self, reviewer_id: &str, text: &str, top_k: usize) -> Vec<RetrievalResult> {
        let query_embedding = self.provider.embed_query(text);
        if query_embedding.is_empty() {
            return Vec::new();
        }
        self.store
            .query(&Self::collection_name(reviewer_id), &query_embedding, top_k)
            .into_iter()
            .filter_map(|(_, metadata, score)| {
                serde_json::from_value::<KnowledgeChunk>(metadata)
                    .ok()
                    .map(|chunk| RetrievalResult { chunk, score })
            })
            .collect()
    }

    /// Directory this engine persists its store under.
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::embeddings::TfIdfEmbeddingProvider;
    use std::io::Write;

    fn write_knowledge(dir: &Path, text: &str) -> PathBuf {
        let path = dir.join("KNOWLEDGE.md");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
        path
    }

    const SAMPLE: &str = "\
## Patterns Found
- [2024-01-15] SQL injection via string formatting (Source: PR#42)
- [2024-02-01] Missing CSRF token
";

    #[test]
    fn index_then_query_finds_relevant_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let knowledge_path = write_knowledge(dir.path(), SAMPLE);
        let mut engine = RagEngine::new(dir.path().join("store"), Box::new(TfIdfEmbeddingProvider::new()));
        let indexed = engine.index("security", &knowledge_path);
        assert_eq!(indexed, 2);

        let results = engine.query("security", "sql injection formatting", 5);
        assert!(!results.is_empty());
    }

    #[test]
    fn p9_reindex_trigger_follows_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let knowledge_path = write_knowledge(dir.path(), SAMPLE);
        let mut engine = RagEngine::new(dir.path().join("store"), Box::new(TfIdfEmbeddingProvider::new()));
        assert!(engine.needs_reindex("security", &knowledge_path));
        engine.index("security", &knowledge_path);
        assert!(!engine.needs_reindex("security", &knowledge_path));

        write_knowledge(dir.path(), &format!("{SAMPLE}\n- [2024-03-01] new entry\n"));
        assert!(engine.needs_reindex("security", &knowledge_path));
    }

    #[test]
    fn empty_knowledge_file_indexes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let knowledge_path = write_knowledge(dir.path(), "## Patterns Found\n");
        let mut engine = RagEngine::new(dir.path().join("store"), Box::new(TfIdfEmbeddingProvider::new()));
        assert_eq!(engine.index("security", &knowledge_path), 0);
    }

    #[test]
    fn index_all_discovers_every_reviewer_directory() {
        let dir = tempfile::tempdir().unwrap();
        let reviewers_root = dir.path().join("reviewers");
        fs::create_dir_all(reviewers_root.join("security")).unwrap();
        fs::create_dir_all(reviewers_root.join("performance")).unwrap();
        write_knowledge(&reviewers_root.join("security"), SAMPLE);
        write_knowledge(&reviewers_root.join("performance"), SAMPLE);

        let mut engine = RagEngine::new(dir.path().join("store"), Box::new(TfIdfEmbeddingProvider::new()));
        let total = engine.index_all(&reviewers_root);
        assert_eq!(total, 4);
    }
}

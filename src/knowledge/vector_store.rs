//! Persistent `{id -> (embedding, metadata)}` store with cosine top-k
//! query, §4.5/§9 "Vector-store backends".

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// One entry in a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    embedding: Vec<f32>,
    metadata: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Collection {
    ids: Vec<String>,
    entries: HashMap<String, Entry>,
}

/// The interface every vector-store backend implements: upsert, top-k
/// cosine query, and collection deletion. The JSON fallback below is
/// acceptable for small deployments; an HNSW-backed implementation can
/// satisfy the same trait as a drop-in upgrade.
pub trait VectorStore {
    /// Insert or overwrite entries by id within a collection.
    fn upsert(&mut self, collection: &str, ids: &[String], embeddings: &[Vec<f32>], metadatas: &[Value]);

    /// Top-k cosine-similarity query against a collection. Returns
    /// `(id, metadata, score)` tuples sorted by score descending.
    fn query(&self, collection: &str, query_embedding: &[f32], top_k: usize) -> Vec<(String, Value, f32)>;

    /// Drop an entire collection.
    fn delete_collection(&mut self, collection: &str);
}

/// JSON-file-backed vector store. Computes cosine similarity in memory;
/// persists the whole store as one JSON document on every mutation via a
/// write-to-temp-then-rename to avoid partial writes.
#[derive(Debug)]
pub struct JsonVectorStore {
    path: PathBuf,
    collections: HashMap<String, Collection>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OnDisk {
    collections: HashMap<String, OnDiskCollection>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OnDiskCollection {
    ids: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    metadatas: Vec<Value>,
}

impl JsonVectorStore {
    /// Open (or create) a JSON vector store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let collections = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<OnDisk>(&text) {
                Ok(on_disk) => on_disk
                    .collections
                    .into_iter()
                    .map(|(name, coll)| (name, from_on_disk(coll)))
                    .collect(),
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "vector store file malformed, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self { path, collections }
    }

    fn save(&self) {
        let on_disk = OnDisk {
            collections: self
                .collections
                .iter()
                .map(|(name, coll)| (name.clone(), to_on_disk(coll)))
                .collect(),
        };

        let Ok(json) = serde_json::to_string(&on_disk) else {
            warn!("failed to serialize vector store, skipping write");
            return;
        };

        if let Some(parent) = self.path.parent() {
            if fs::create_dir_all(parent).is_err() {
                warn!(path = %parent.display(), "could not create vector store directory");
                return;
            }
        }

        match tempfile::NamedTempFile::new_in(self.path.parent().unwrap_or_else(|| Path::new("."))) {
            Ok(mut tmp) => {
                use std::io::Write;
                if tmp.write_all(json.as_bytes()).is_ok() && tmp.persist(&self.path).is_err() {
                    warn!(path = %self.path.display(), "could not persist vector store write");
                }
            }
            Err(e) => warn!(error = %e, "could not create temp file for vector store"),
        }
    }
}

fn to_on_disk(coll: &Collection) -> OnDiskCollection {
    let mut embeddings = Vec::with_capacity(coll.ids.len());
    let mut metadatas = Vec::with_capacity(coll.ids.len());
    for id in &coll.ids {
        if let Some(entry) = coll.entries.get(id) {
            embeddings.push(entry.embedding.clone());
            metadatas.push(entry.metadata.clone());
        }
    }
    OnDiskCollection {
        ids: coll.ids.clone(),
        embeddings,
        metadatas,
    }
}

fn from_on_disk(coll: OnDiskCollection) -> Collection {
    let mut entries = HashMap::new();
    for ((id, embedding), metadata) in coll
        .ids
        .iter()
        .cloned()
        .zip(coll.embeddings.into_iter())
        .zip(coll.metadatas.into_iter())
    {
        entries.insert(id, Entry { embedding, metadata });
    }
    Collection {
        ids: coll.ids,
        entries,
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

impl VectorStore for JsonVectorStore {
    fn upsert(&mut self, collection: &str, ids: &[String], embeddings: &[Vec<f32>], metadatas: &[Value]) {
        let coll = self.collections.entry(collection.to_string()).or_default();
        for ((id, embedding), metadata) in ids.iter().zip(embeddings.iter()).zip(metadatas.iter()) {
            if !coll.entries.contains_key(id) {
                coll.ids.push(id.clone());
            }
            coll.entries.insert(
                id.clone(),
                Entry {
                    embedding: embedding.clone(),
                    metadata: metadata.clone(),
                },
            );
        }
        self.save();
    }

    fn query(&self, collection: &str, query_embedding: &[f32], top_k: usize) -> Vec<(String, Value, f32)> {
        let Some(coll) = self.collections.get(collection) else {
            return Vec::new();
        };
        let mut scored: Vec<(String, Value, f32)> = coll
            .ids
            .iter()
            .filter_map(|id| {
                coll.entries.get(id).map(|entry| {
                    let score = cosine_similarity(query_embedding, &entry.embedding);
                    (id.clone(), entry.metadata.clone(), score)
                })
            })
            .collect();
        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }

    fn delete_collection(&mut self, collection: &str) {
        self.collections.remove(collection);
        self.save();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_then_query_returns_top_k_by_cosine() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonVectorStore::open(dir.path().join("vectors.json"));
        store.upsert(
            "reviewer_security",
            &["a".into(), "b".into()],
            &[vec![1.0, 0.0], vec![0.0, 1.0]],
            &[Value::Null, Value::Null],
        );
        let results = store.query("reviewer_security", &[1.0, 0.0], 5);
        assert_eq!(results[0].0, "a");
        assert!(results[0].2 > results[1].2);
    }

    #[test]
    fn equal_ids_overwrite_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonVectorStore::open(dir.path().join("vectors.json"));
        store.upsert("c", &["a".into()], &[vec![1.0, 0.0]], &[Value::Null]);
        store.upsert("c", &["a".into()], &[vec![0.0, 1.0]], &[Value::Null]);
        let results = store.query("c", &[0.0, 1.0], 5);
        assert_eq!(results.len(), 1);
        assert!(results[0].2 > 0.99);
    }

    #[test]
    fn query_against_unknown_collection_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonVectorStore::open(dir.path().join("vectors.json"));
        assert!(store.query("nonexistent", &[1.0], 5).is_empty());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.json");
        {
            let mut store = JsonVectorStore::open(&path);
            store.upsert("c", &["a".into()], &[vec![1.0, 2.0]], &[Value::Null]);
        }
        let reopened = JsonVectorStore::open(&path);
        let results = reopened.query("c", &[1.0, 2.0], 1);
        assert_eq!(results.len(), 1);
    }
}

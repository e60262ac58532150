//! Text embedding backends, §4.5.
//!
//! Two interchangeable backends behind one trait: a semantic embedder
//! (expected to wrap a real model the integrator supplies) and a
//! keyword/TF-IDF fallback that needs no external model and works offline.

use std::collections::HashMap;

/// Common interface every embedding backend implements.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of documents.
    fn embed(&mut self, texts: &[String]) -> Vec<Vec<f32>>;

    /// Embed a single query string. Kept separate from `embed` since some
    /// backends (e.g. asymmetric dense retrievers) use a different prefix
    /// or projection for queries than for documents.
    fn embed_query(&mut self, text: &str) -> Vec<f32>;

    /// Output vector dimensionality.
    fn dimension(&self) -> usize;
}

/// A semantic embedder backed by an externally supplied scoring function.
/// The engine does not vendor an embedding model; callers plug one in by
/// implementing [`EmbeddingProvider`] directly, or use this adapter around
/// a closure for simple in-process models.
pub struct SemanticEmbeddingProvider<F> {
    dimension: usize,
    embed_fn: F,
}

impl<F> SemanticEmbeddingProvider<F>
where
    F: FnMut(&str) -> Vec<f32>,
{
    /// Build a semantic provider from a dimension and an embedding closure.
    pub fn new(dimension: usize, embed_fn: F) -> Self {
        Self { dimension, embed_fn }
    }
}

impl<F> EmbeddingProvider for SemanticEmbeddingProvider<F>
where
    F: FnMut(&str) -> Vec<f32> + Send + Sync,
{
    fn embed(&mut self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| (self.embed_fn)(t)).collect()
    }

    fn embed_query(&mut self, text: &str) -> Vec<f32> {
        (self.embed_fn)(text)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// A keyword/TF-IDF fallback provider. Must be fitted (via `embed`, which
/// builds the vocabulary and IDF table from the supplied corpus) before
/// `embed_query` produces meaningful vectors.
#[derive(Debug, Default, Clone)]
pub struct TfIdfEmbeddingProvider {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
    fitted: bool,
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|tok| !tok.is_empty())
        .map(|tok| tok.to_string())
        .collect()
}

impl TfIdfEmbeddingProvider {
    /// Build an unfitted provider.
    pub fn new() -> Self {
        Self::default()
    }

    fn term_frequencies(&self, tokens: &[String]) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.vocabulary.len()];
        for token in tokens {
            if let Some(&idx) = self.vocabulary.get(token) {
                vector[idx] += 1.0;
            }
        }
        let total: f32 = vector.iter().sum();
        if total > 0.0 {
            for value in &mut vector {
                *value /= total;
            }
        }
        vector
    }

    fn fit(&mut self, texts: &[String]) {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for text in texts {
            let mut seen = std::collections::HashSet::new();
            for token in tokenize(text) {
                if seen.insert(token.clone()) {
                    *doc_freq.entry(token).or_insert(0) += 1;
                }
            }
        }

        let mut vocabulary = HashMap::new();
        let mut idf = Vec::new();
        let n_docs = texts.len().max(1) as f32;
        for (idx, (term, df)) in doc_freq.into_iter().enumerate() {
            vocabulary.insert(term, idx);
            idf.push((n_docs / (1.0 + df as f32)).ln() + 1.0);
        }

        self.vocabulary = vocabulary;
        self.idf = idf;
        self.fitted = true;
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        let tf = self.term_frequencies(&tokens);
        tf.iter()
            .zip(self.idf.iter())
            .map(|(tf, idf)| tf * idf)
            .collect()
    }

    /// Whether `fit` has already run.
    pub fn is_fitted(&self) -> bool {
        self.fitted
    }
}

impl EmbeddingProvider for TfIdfEmbeddingProvider {
    fn embed(&mut self, texts: &[String]) -> Vec<Vec<f32>> {
        self.fit(texts);
        texts.iter().map(|t| self.vectorize(t)).collect()
    }

    fn embed_query(&mut self, text: &str) -> Vec<f32> {
        if !self.fitted {
            return Vec::new();
        }
        self.vectorize(text)
    }

    fn dimension(&self) -> usize {
        self.vocabulary.len()
    }
}

//! Vector Store
//!
//! In-memory store ranking documents by cosine distance to a query embedding.
//! Linear scan; registries are small enough that an ANN index is not needed.

use crate::error::{Result, SqlRagError};

/// Vector embedding (simple f32 vector)
pub type Embedding = Vec<f32>;

/// Document in the vector store
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub embedding: Embedding,
}

/// Search result from vector store
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: String,
    /// `1 - cosine similarity`; smaller is closer.
    pub distance: f32,
}

#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    documents: Vec<Document>,
    /// Fixed by the first document added.
    dimension: Option<usize>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document to the store
    pub fn add_document(&mut self, document: Document) -> Result<()> {
        let len = document.embedding.len();
        match self.dimension {
            Some(dimension) if dimension != len => {
                return Err(SqlRagError::Retrieval(format!(
                    "Embedding dimension {} for '{}' doesn't match store dimension {}",
                    len, document.id, dimension
                )));
            }
            None => self.dimension = Some(len),
            _ => {}
        }
        self.documents.push(document);
        Ok(())
    }

    /// Rank documents by ascending cosine distance and keep the closest `top_k`.
    /// Equal distances keep insertion order.
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        if self.documents.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        if let Some(dimension) = self.dimension {
            if query_embedding.len() != dimension {
                return Err(SqlRagError::Retrieval(format!(
                    "Query embedding dimension {} doesn't match store dimension {}",
                    query_embedding.len(),
                    dimension
                )));
            }
        }

        let mut results: Vec<SearchResult> = self
            .documents
            .iter()
            .map(|doc| SearchResult {
                id: doc.id.clone(),
                distance: 1.0 - cosine_similarity(query_embedding, &doc.embedding),
            })
            .collect();

        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results.truncate(top_k);

        Ok(results)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Compute cosine similarity between two vectors
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot_product / (norm_a * norm_b);
    // Non-finite components rank as unrelated.
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

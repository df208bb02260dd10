//! Semantic Index
//!
//! Two independent similarity collections built once from the registry:
//! one over table descriptions, one over `table.column` identifiers.

use crate::error::Result;
use crate::registry::SchemaRegistry;
use crate::schema_rag::embedder::Embedder;
use crate::schema_rag::vector_store::{Document, InMemoryVectorStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Nearest-neighbour lookup returning document ids, closest first.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn search(&self, text: &str, k: usize) -> Result<Vec<String>>;
}

/// A vector store paired with the embedder used to build it.
pub struct VectorCollection {
    name: String,
    store: InMemoryVectorStore,
    embedder: Arc<dyn Embedder>,
}

impl VectorCollection {
    /// Embed `entries` (id, text) in one batch and index them.
    pub async fn build(
        name: &str,
        embedder: Arc<dyn Embedder>,
        entries: Vec<(String, String)>,
    ) -> Result<Self> {
        let texts: Vec<String> = entries.iter().map(|(_, text)| text.clone()).collect();
        let embeddings = embedder.embed(&texts).await?;

        let mut store = InMemoryVectorStore::new();
        for ((id, _), embedding) in entries.into_iter().zip(embeddings) {
            store.add_document(Document { id, embedding })?;
        }

        info!("Built '{}' collection with {} documents", name, store.len());
        Ok(Self {
            name: name.to_string(),
            store,
            embedder,
        })
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[async_trait]
impl SimilaritySearch for VectorCollection {
    async fn search(&self, text: &str, k: usize) -> Result<Vec<String>> {
        debug!("Searching '{}' for top {}", self.name, k);
        let query_embedding = self.embedder.embed_text(text).await?;
        let results = self.store.search(&query_embedding, k)?;
        Ok(results.into_iter().map(|r| r.id).collect())
    }
}

/// Shared, read-only pair of collections consulted by the retriever.
#[derive(Clone)]
pub struct SemanticIndex {
    pub tables: Arc<dyn SimilaritySearch>,
    pub columns: Arc<dyn SimilaritySearch>,
}

impl SemanticIndex {
    pub fn new(tables: Arc<dyn SimilaritySearch>, columns: Arc<dyn SimilaritySearch>) -> Self {
        Self { tables, columns }
    }

    /// Build both collections from the registry.
    pub async fn build(registry: &SchemaRegistry, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let table_entries = registry
            .tables()
            .iter()
            .map(|t| {
                (
                    t.table_name.clone(),
                    format!("{}: {}", t.table_name, t.description),
                )
            })
            .collect();

        let column_entries = registry
            .columns()
            .iter()
            .map(|c| {
                let identifier = c.key().to_string();
                (identifier.clone(), identifier)
            })
            .collect();

        let tables = VectorCollection::build("table_registry", embedder.clone(), table_entries).await?;
        let columns = VectorCollection::build("column_registry", embedder, column_entries).await?;

        Ok(Self::new(Arc::new(tables), Arc::new(columns)))
    }
}

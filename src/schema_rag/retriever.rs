//! Schema RAG Retriever
//!
//! Picks the tables and columns relevant to a question: rank tables by
//! similarity, expand them through the relational mapping, then rank columns
//! globally and keep only those owned by an expanded table.

use crate::config::RetrievalConfig;
use crate::error::{Result, SqlRagError};
use crate::registry::{ColumnKey, SchemaRegistry};
use crate::schema_rag::index::SemanticIndex;
use itertools::Itertools;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Retrieved schema subset for a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievedContext {
    /// Tables from similarity ranking, closest first, before expansion.
    pub ranked_tables: Vec<String>,
    pub tables: HashSet<String>,
    pub columns: HashSet<ColumnKey>,
}

pub struct SchemaRetriever {
    registry: Arc<SchemaRegistry>,
    index: SemanticIndex,
    config: RetrievalConfig,
}

impl SchemaRetriever {
    pub fn new(registry: Arc<SchemaRegistry>, index: SemanticIndex, config: RetrievalConfig) -> Self {
        Self {
            registry,
            index,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub async fn retrieve(&self, question: &str) -> Result<RetrievedContext> {
        let ranked_tables = self.rank_tables(question).await?;
        let tables = expand_tables(&self.registry, &ranked_tables, self.config.expansion_depth);
        let columns = self.rank_columns(question, &tables).await?;

        info!(
            "Retrieved {} ranked tables, {} after expansion, {} columns",
            ranked_tables.len(),
            tables.len(),
            columns.len()
        );
        debug!("Ranked tables: {:?}, expanded: {:?}", ranked_tables, tables);

        Ok(RetrievedContext {
            ranked_tables,
            tables,
            columns,
        })
    }

    /// Top `k_tables` table names by ascending distance.
    pub async fn rank_tables(&self, question: &str) -> Result<Vec<String>> {
        let ranked = self
            .index
            .tables
            .search(question, self.config.k_tables)
            .await
            .map_err(|e| retrieval_error("table", e))?;

        // The collaborator is not trusted to honour k or to return unique ids.
        Ok(ranked
            .into_iter()
            .unique()
            .take(self.config.k_tables)
            .collect())
    }

    /// Columns ranked over the whole column index, then narrowed to the
    /// expanded table set by composite key.
    pub async fn rank_columns(
        &self,
        question: &str,
        tables: &HashSet<String>,
    ) -> Result<HashSet<ColumnKey>> {
        if tables.is_empty() {
            return Ok(HashSet::new());
        }

        let fan_out = tables.len() * self.config.k_columns_per_table;
        let identifiers = self
            .index
            .columns
            .search(question, fan_out)
            .await
            .map_err(|e| retrieval_error("column", e))?;

        Ok(filter_columns(&self.registry, &identifiers, tables))
    }
}

fn retrieval_error(collection: &str, cause: SqlRagError) -> SqlRagError {
    match cause {
        SqlRagError::Retrieval(msg) => {
            SqlRagError::Retrieval(format!("{} similarity search failed: {}", collection, msg))
        }
        other => SqlRagError::Retrieval(format!("{} similarity search failed: {}", collection, other)),
    }
}

/// Union `seeds` with their related tables, repeated `depth` times.
/// Depth 1 is the one-hop closure; related tables missing from the registry
/// are never added.
pub fn expand_tables(registry: &SchemaRegistry, seeds: &[String], depth: usize) -> HashSet<String> {
    let mut expanded: HashSet<String> = seeds.iter().cloned().collect();
    let mut frontier: Vec<String> = seeds.to_vec();

    for _ in 0..depth {
        let mut next = Vec::new();
        for table in &frontier {
            for related in registry.related_tables(table) {
                if expanded.insert(related.to_string()) {
                    next.push(related.to_string());
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    expanded
}

/// Keep identifiers that resolve to a registry column owned by one of `tables`.
pub fn filter_columns(
    registry: &SchemaRegistry,
    identifiers: &[String],
    tables: &HashSet<String>,
) -> HashSet<ColumnKey> {
    identifiers
        .iter()
        .filter_map(|id| registry.column_key(id))
        .filter(|key| tables.contains(&key.table))
        .cloned()
        .collect()
}

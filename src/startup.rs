//! Process-wide initialisation
//!
//! Builds the registry, semantic index, model client and query runner once.
//! Any failure here is fatal: the process must not serve with partial state.

use crate::config::AppConfig;
use crate::context::ContextAssembler;
use crate::db::{MySqlQueryRunner, QueryRunner};
use crate::error::{Result, SqlRagError};
use crate::explain::ExplanationGenerator;
use crate::llm::{LlmClient, TextGenerator};
use crate::pipeline::Orchestrator;
use crate::registry::SchemaRegistry;
use crate::schema_rag::{Embedder, SchemaEmbedder, SchemaRetriever, SemanticIndex};
use crate::synthesizer::SqlSynthesizer;
use std::sync::Arc;
use tracing::info;

/// External capabilities the pipeline is wired to.
pub struct Collaborators {
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn TextGenerator>,
    pub runner: Arc<dyn QueryRunner>,
}

impl Collaborators {
    /// Production collaborators: OpenAI-compatible HTTP clients and MySQL.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SqlRagError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            embedder: Arc::new(SchemaEmbedder::new(client.clone(), &config.llm)),
            llm: Arc::new(LlmClient::new(client, &config.llm)),
            runner: Arc::new(MySqlQueryRunner::new(config.db.clone())),
        })
    }
}

/// Load the registry, build the index and assemble the orchestrator.
pub async fn initialize(config: &AppConfig, collaborators: Collaborators) -> Result<Orchestrator> {
    let registry = Arc::new(SchemaRegistry::load(&config.registry_dir)?);

    info!("Building semantic index...");
    let index = SemanticIndex::build(&registry, collaborators.embedder)
        .await
        .map_err(|e| SqlRagError::Config(format!("Error initializing semantic index: {}", e)))?;
    info!("Semantic index ready");

    Ok(build_orchestrator(
        registry,
        index,
        collaborators.llm,
        collaborators.runner,
        config,
    ))
}

pub fn build_orchestrator(
    registry: Arc<SchemaRegistry>,
    index: SemanticIndex,
    llm: Arc<dyn TextGenerator>,
    runner: Arc<dyn QueryRunner>,
    config: &AppConfig,
) -> Orchestrator {
    Orchestrator::new(
        SchemaRetriever::new(registry.clone(), index, config.retrieval.clone()),
        ContextAssembler::new(registry),
        SqlSynthesizer::new(llm.clone()),
        runner,
        ExplanationGenerator::new(llm, config.explain_max_rows),
    )
}

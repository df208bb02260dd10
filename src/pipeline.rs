//! Orchestrator
//!
//! Runs retrieval, context assembly, SQL synthesis, execution and explanation
//! in order. The first failing stage stops the run; its error is already
//! classified by stage when it reaches the caller.

use crate::context::ContextAssembler;
use crate::db::{ExecutionResult, QueryRunner};
use crate::error::{Result, SqlRagError};
use crate::explain::ExplanationGenerator;
use crate::schema_rag::{RetrievedContext, SchemaRetriever};
use crate::synthesizer::SqlSynthesizer;
use std::sync::Arc;
use tracing::{error, info};

/// Everything a successful run produced. Only `explanation` is part of the
/// external response; the rest is kept for logging and the CLI.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub retrieved: RetrievedContext,
    pub context: String,
    pub sql: String,
    pub rows: ExecutionResult,
    pub explanation: String,
}

/// A failed run, with the candidate SQL when one had been generated.
#[derive(Debug)]
pub struct PipelineFailure {
    pub error: SqlRagError,
    pub sql: Option<String>,
}

impl From<SqlRagError> for PipelineFailure {
    fn from(error: SqlRagError) -> Self {
        Self { error, sql: None }
    }
}

pub struct Orchestrator {
    retriever: SchemaRetriever,
    assembler: ContextAssembler,
    synthesizer: SqlSynthesizer,
    runner: Arc<dyn QueryRunner>,
    explainer: ExplanationGenerator,
}

impl Orchestrator {
    pub fn new(
        retriever: SchemaRetriever,
        assembler: ContextAssembler,
        synthesizer: SqlSynthesizer,
        runner: Arc<dyn QueryRunner>,
        explainer: ExplanationGenerator,
    ) -> Self {
        Self {
            retriever,
            assembler,
            synthesizer,
            runner,
            explainer,
        }
    }

    /// Answer a question with a short explanation of its query result.
    pub async fn process(&self, question: &str) -> Result<String> {
        self.run(question)
            .await
            .map(|outcome| outcome.explanation)
            .map_err(|failure| failure.error)
    }

    /// Full run keeping intermediate artifacts.
    pub async fn run(&self, question: &str) -> std::result::Result<PipelineOutcome, PipelineFailure> {
        // Blank questions are rejected; otherwise the text flows on unchanged.
        if question.trim().is_empty() {
            return Err(SqlRagError::Input("Query must not be empty".to_string()).into());
        }
        info!("Processing question: {}", question);

        let retrieved = self
            .retriever
            .retrieve(question)
            .await
            .map_err(|e| log_failure("retrieval", e))?;

        let context = self.assembler.assemble(&retrieved.tables, &retrieved.columns);

        let sql = self
            .synthesizer
            .synthesize(question, &context)
            .await
            .map_err(|e| log_failure("sql synthesis", e))?;
        info!("Generated SQL: {}", sql);

        let rows = match self.runner.execute(&sql).await {
            Ok(rows) => rows,
            Err(e) => {
                let error = log_failure("execution", as_execution_error(e));
                return Err(PipelineFailure {
                    error,
                    sql: Some(sql),
                });
            }
        };
        info!("Query returned {} rows", rows.len());

        let explanation = match self.explainer.explain(question, &sql, &rows).await {
            Ok(text) => text,
            Err(e) => {
                return Err(PipelineFailure {
                    error: log_failure("explanation", e),
                    sql: Some(sql),
                });
            }
        };
        info!("Generated explanation");

        Ok(PipelineOutcome {
            retrieved,
            context,
            sql,
            rows,
            explanation,
        })
    }
}

/// Runner implementations are external; anything they raise is an execution failure.
fn as_execution_error(error: SqlRagError) -> SqlRagError {
    match error {
        SqlRagError::Execution(_) => error,
        other => SqlRagError::Execution(other.to_string()),
    }
}

fn log_failure(stage: &str, error: SqlRagError) -> SqlRagError {
    error!("Pipeline failed at {} ({}): {}", stage, error.kind(), error);
    error
}

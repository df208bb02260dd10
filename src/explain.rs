//! Explanation Generator
//!
//! Second, independent model call summarising an executed query's result.

use crate::db::ExecutionResult;
use crate::error::{Result, SqlRagError};
use crate::llm::TextGenerator;
use std::sync::Arc;

pub struct ExplanationGenerator {
    llm: Arc<dyn TextGenerator>,
    /// Rows beyond this are left out of the prompt; the total is still reported.
    max_rows: usize,
}

impl ExplanationGenerator {
    pub fn new(llm: Arc<dyn TextGenerator>, max_rows: usize) -> Self {
        Self { llm, max_rows }
    }

    pub fn build_prompt(&self, question: &str, sql: &str, result: &ExecutionResult) -> Result<String> {
        let shown = result.len().min(self.max_rows);
        let rows_json = serde_json::to_string(&result[..shown])
            .map_err(|e| SqlRagError::Generation(format!("Failed to serialize result rows: {}", e)))?;

        let truncation = if shown < result.len() {
            format!(" (first {} of {} rows)", shown, result.len())
        } else {
            String::new()
        };

        Ok(format!(
            r#"The SQL query is: {}
The result of the query is{}: {}

Please provide a summary explanation of the results in 2 lines.
The user query is: {}
Do not provide any other text like query, result, user query, etc."#,
            sql, truncation, rows_json, question
        ))
    }

    pub async fn explain(&self, question: &str, sql: &str, result: &ExecutionResult) -> Result<String> {
        let prompt = self.build_prompt(question, sql, result)?;
        let explanation = self.llm.complete(&prompt).await.map_err(|e| match e {
            SqlRagError::Generation(msg) => {
                SqlRagError::Generation(format!("Explanation failed: {}", msg))
            }
            other => SqlRagError::Generation(format!("Explanation failed: {}", other)),
        })?;
        Ok(explanation.trim().to_string())
    }
}

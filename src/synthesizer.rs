//! SQL Synthesizer
//!
//! One model call turning (question, schema context) into a candidate query.
//! The output is not validated; execution is the only correctness check.

use crate::error::{Result, SqlRagError};
use crate::llm::TextGenerator;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

lazy_static! {
    // A fence line with any language label, or an inline `sql` label.
    static ref LEADING_FENCE: Regex =
        Regex::new(r"(?i)^```(?:[a-z0-9_+-]*[ \t]*\r?\n|sql\b)?").unwrap();
}

const TRAILING_FENCE: &str = "```";

pub struct SqlSynthesizer {
    llm: Arc<dyn TextGenerator>,
}

impl SqlSynthesizer {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    pub fn build_prompt(&self, question: &str, context: &str) -> String {
        format!(
            r#"You are a SQL expert. Given the table context below and a natural language question, write a MySQL-compatible SQL query.

{}
User Question: {}

Return ONLY the SQL query without any explanation or comments:"#,
            context, question
        )
    }

    pub async fn synthesize(&self, question: &str, context: &str) -> Result<String> {
        let prompt = self.build_prompt(question, context);
        let response = self.llm.complete(&prompt).await.map_err(|e| match e {
            SqlRagError::Generation(msg) => {
                SqlRagError::Generation(format!("SQL generation failed: {}", msg))
            }
            other => SqlRagError::Generation(format!("SQL generation failed: {}", other)),
        })?;

        let sql = sanitize_sql(&response);
        debug!("Generated SQL: {}", sql);
        Ok(sql)
    }
}

/// Strip one leading code fence (with its language label and line break, if
/// any) and one trailing fence, then trim.
pub fn sanitize_sql(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = match LEADING_FENCE.find(trimmed) {
        Some(m) => &trimmed[m.end()..],
        None => trimmed,
    };
    let inner = inner.trim_end();
    inner
        .strip_suffix(TRAILING_FENCE)
        .unwrap_or(inner)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MockLlm {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl MockLlm {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for MockLlm {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl TextGenerator for FailingLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(SqlRagError::Generation("quota exceeded".to_string()))
        }
    }

    #[test]
    fn test_sanitize_fenced_sql() {
        assert_eq!(
            sanitize_sql("```sql\nSELECT COUNT(*) FROM loan;\n```"),
            "SELECT COUNT(*) FROM loan;"
        );
        assert_eq!(sanitize_sql("```SQL\nSELECT 1\n```\n"), "SELECT 1");
        assert_eq!(sanitize_sql("```\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(
            sanitize_sql("```mysql\nSELECT COUNT(*) FROM loan\n```"),
            "SELECT COUNT(*) FROM loan"
        );
        assert_eq!(sanitize_sql("```sqlite \r\nSELECT 1\r\n```"), "SELECT 1");
    }

    #[test]
    fn test_sanitize_unlabelled_inline_fence_keeps_query() {
        assert_eq!(sanitize_sql("```SELECT 1```"), "SELECT 1");
        assert_eq!(sanitize_sql("```sqlite_master```"), "sqlite_master");
    }

    #[test]
    fn test_sanitize_clean_input_unchanged() {
        let clean = "SELECT id FROM loan WHERE due_date < CURDATE()";
        assert_eq!(sanitize_sql(clean), clean);
        assert_eq!(sanitize_sql(&sanitize_sql(clean)), clean);
    }

    #[test]
    fn test_sanitize_strips_only_one_fence_each_side() {
        assert_eq!(sanitize_sql("```sql\n```sql SELECT 1```\n```"), "```sql SELECT 1```");
    }

    #[test]
    fn test_sanitize_single_sided_fence() {
        assert_eq!(sanitize_sql("```sql SELECT 1"), "SELECT 1");
        assert_eq!(sanitize_sql("SELECT 1\n```"), "SELECT 1");
    }

    #[test]
    fn test_prompt_embeds_context_and_question() {
        let synthesizer = SqlSynthesizer::new(MockLlm::new(""));
        let prompt = synthesizer.build_prompt("how many loans are overdue", "### Tables:\nloan: Loans\n");
        assert!(prompt.contains("### Tables:\nloan: Loans"));
        assert!(prompt.contains("User Question: how many loans are overdue"));
        assert!(prompt.contains("Return ONLY the SQL query"));
    }

    #[tokio::test]
    async fn test_synthesize_sanitizes_reply() {
        let llm = MockLlm::new("```sql\nSELECT COUNT(*) FROM loan\n```");
        let synthesizer = SqlSynthesizer::new(llm.clone());
        let sql = synthesizer.synthesize("count loans", "ctx").await.unwrap();
        assert_eq!(sql, "SELECT COUNT(*) FROM loan");
        assert_eq!(llm.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_synthesize_failure_is_generation_error() {
        let synthesizer = SqlSynthesizer::new(Arc::new(FailingLlm));
        let err = synthesizer.synthesize("count loans", "ctx").await.unwrap_err();
        assert!(matches!(err, SqlRagError::Generation(_)));
        assert!(err.to_string().contains("quota exceeded"));
    }
}

//! NLP-to-SQL API
//!
//! Request parsing and the mapping from pipeline results to HTTP status and
//! JSON body. No lower-level error text crosses this boundary unclassified.

use crate::error::{ErrorKind, Result, SqlRagError};
use crate::pipeline::{Orchestrator, PipelineFailure};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

pub const UNEXPECTED_ERROR: &str = "An unexpected error occurred";

#[derive(Debug, Serialize)]
pub struct NlpToSqlResponse {
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl ApiResponse {
    pub fn ok(body: serde_json::Value) -> Self {
        Self { status: 200, body }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }),
        }
    }
}

/// Extract the `query` string from a JSON request body.
pub fn parse_query(body: &[u8]) -> Result<String> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(SqlRagError::Input("Query is required in request body".to_string()));
    }

    let request: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| SqlRagError::Input(format!("Request body must be valid JSON: {}", e)))?;
    let object = request
        .as_object()
        .ok_or_else(|| SqlRagError::Input("Request body must be a JSON object".to_string()))?;

    match object.get("query") {
        None => Err(SqlRagError::Input("Query is required in request body".to_string())),
        Some(serde_json::Value::String(query)) if !query.trim().is_empty() => Ok(query.clone()),
        Some(serde_json::Value::String(_)) => {
            Err(SqlRagError::Input("Query must not be empty".to_string()))
        }
        Some(_) => Err(SqlRagError::Input("Query must be a string".to_string())),
    }
}

/// Map a classified error to its response.
pub fn error_response(err: &SqlRagError) -> ApiResponse {
    match err.kind() {
        ErrorKind::Input => ApiResponse::error(400, &err.to_string()),
        ErrorKind::Unclassified => ApiResponse::error(500, UNEXPECTED_ERROR),
        _ => ApiResponse::error(500, &err.to_string()),
    }
}

fn failure_response(failure: &PipelineFailure, include_sql: bool) -> ApiResponse {
    let mut response = error_response(&failure.error);
    if include_sql && failure.error.kind() == ErrorKind::Execution {
        if let Some(sql) = &failure.sql {
            response.body["sql"] = json!(sql);
        }
    }
    response
}

/// `POST /api/nlp-to-sql`
pub async fn handle_nlp_to_sql(
    orchestrator: Arc<Orchestrator>,
    body: &[u8],
    include_sql_on_error: bool,
) -> ApiResponse {
    let query = match parse_query(body) {
        Ok(query) => query,
        Err(e) => {
            error!("Rejected request: {}", e);
            return error_response(&e);
        }
    };
    info!("Received query: {}", query);

    // A panic inside the pipeline surfaces as a JoinError instead of tearing
    // down the connection task.
    let task = tokio::spawn(async move { orchestrator.run(&query).await });
    match task.await {
        Ok(Ok(outcome)) => {
            info!("Successfully processed query");
            let response = NlpToSqlResponse {
                explanation: outcome.explanation,
            };
            match serde_json::to_value(&response) {
                Ok(body) => ApiResponse::ok(body),
                Err(e) => error_response(&SqlRagError::from(e)),
            }
        }
        Ok(Err(failure)) => failure_response(&failure, include_sql_on_error),
        Err(join_error) => {
            error!("Pipeline task aborted: {}", join_error);
            ApiResponse::error(500, UNEXPECTED_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        assert_eq!(
            parse_query(br#"{"query": "how many loans are overdue"}"#).unwrap(),
            "how many loans are overdue"
        );
    }

    #[test]
    fn test_parse_query_rejects_bad_input() {
        let bodies: [&[u8]; 7] = [
            b"",
            br#"{}"#,
            br#"{"question": "x"}"#,
            br#"{"query": 42}"#,
            br#"{"query": "   "}"#,
            br#"not json"#,
            br#"["query"]"#,
        ];
        for body in bodies {
            let err = parse_query(body).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Input, "body: {:?}", body);
        }
    }

    #[test]
    fn test_error_response_mapping() {
        let input = error_response(&SqlRagError::Input("Query is required".to_string()));
        assert_eq!(input.status, 400);
        assert_eq!(input.body["error"], "Invalid input: Query is required");

        let stage = error_response(&SqlRagError::Retrieval("index down".to_string()));
        assert_eq!(stage.status, 500);
        assert!(stage.body["error"].as_str().unwrap().contains("index down"));

        let io = SqlRagError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        let unexpected = error_response(&io);
        assert_eq!(unexpected.status, 500);
        assert_eq!(unexpected.body["error"], UNEXPECTED_ERROR);
    }

    #[test]
    fn test_sql_attached_only_when_enabled() {
        let failure = PipelineFailure {
            error: SqlRagError::Execution("Unknown column".to_string()),
            sql: Some("SELECT nope FROM loan".to_string()),
        };
        assert!(failure_response(&failure, false).body.get("sql").is_none());
        assert_eq!(failure_response(&failure, true).body["sql"], "SELECT nope FROM loan");
    }
}

//! Query Runner
//!
//! Executes candidate SQL against MySQL and hands rows back as JSON maps.
//! Every driver failure (connection, syntax, permission, timeout) collapses
//! into a single `Execution` error.

use crate::config::DbConfig;
use crate::db::pool::{MySqlSource, ReconnectingPool};
use crate::error::{Result, SqlRagError};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row as _, TypeInfo};
use std::time::Duration;

/// One result row: column name to value.
pub type Row = serde_json::Map<String, Value>;

/// Rows in the order the store returned them. Empty is a valid result.
pub type ExecutionResult = Vec<Row>;

#[async_trait]
pub trait QueryRunner: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<ExecutionResult>;
}

pub struct MySqlQueryRunner {
    pool: ReconnectingPool<MySqlSource>,
    timeout: Duration,
}

impl MySqlQueryRunner {
    /// The pool is created on first use.
    pub fn new(config: DbConfig) -> Self {
        Self {
            timeout: config.query_timeout,
            pool: ReconnectingPool::new(MySqlSource::new(config)),
        }
    }

    async fn run(&self, sql: &str) -> Result<ExecutionResult> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(sql)
            .persistent(false)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| SqlRagError::Execution(format!("Error executing query: {}", e)))?;

        rows.iter()
            .map(|row| {
                row_to_json(row)
                    .map_err(|e| SqlRagError::Execution(format!("Failed to decode result row: {}", e)))
            })
            .collect()
    }
}

#[async_trait]
impl QueryRunner for MySqlQueryRunner {
    async fn execute(&self, sql: &str) -> Result<ExecutionResult> {
        match tokio::time::timeout(self.timeout, self.run(sql)).await {
            Ok(result) => result,
            Err(_) => Err(SqlRagError::Execution(format!(
                "Query timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

fn row_to_json(row: &MySqlRow) -> std::result::Result<Row, sqlx::Error> {
    let mut map = Row::new();
    for column in row.columns() {
        let value = decode_value(row, column.ordinal(), column.type_info().name())?;
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}

fn decode_value(row: &MySqlRow, idx: usize, type_name: &str) -> std::result::Result<Value, sqlx::Error> {
    let value = match type_name {
        "NULL" => None,
        "BOOLEAN" => row.try_get::<Option<bool>, _>(idx)?.map(Value::from),
        t if t.ends_with("UNSIGNED") => row.try_get::<Option<u64>, _>(idx)?.map(Value::from),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<Option<i64>, _>(idx)?.map(Value::from)
        }
        "YEAR" => row.try_get_unchecked::<Option<i64>, _>(idx)?.map(Value::from),
        "FLOAT" => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|f| Value::from(f as f64)),
        "DOUBLE" => row.try_get::<Option<f64>, _>(idx)?.map(Value::from),
        "DECIMAL" => row
            .try_get_unchecked::<Option<String>, _>(idx)?
            .map(|s| match s.parse::<serde_json::Number>() {
                Ok(n) => Value::Number(n),
                Err(_) => Value::String(s),
            }),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)?
            .map(|d| Value::String(d.to_string())),
        "DATETIME" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)?
            .map(|d| Value::String(d.to_string())),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)?
            .map(|d| Value::String(d.to_rfc3339())),
        "TIME" => row
            .try_get::<Option<chrono::NaiveTime>, _>(idx)?
            .map(|t| Value::String(t.to_string())),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => row
            .try_get_unchecked::<Option<Vec<u8>>, _>(idx)?
            .map(|b| Value::String(String::from_utf8_lossy(&b).into_owned())),
        _ => row
            .try_get_unchecked::<Option<String>, _>(idx)?
            .map(Value::String),
    };
    Ok(value.unwrap_or(Value::Null))
}

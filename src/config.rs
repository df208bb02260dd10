//! Process configuration
//!
//! Read once from the environment (after `.env` has been loaded by the binary).
//! Missing credentials are fatal: the process must not start without them.

use crate::error::{Result, SqlRagError};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Relational store connection parameters.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub charset: String,
    pub max_connections: u32,
    /// Bound on one query execution, reconnect included.
    pub query_timeout: Duration,
    /// Bound on taking a connection from the pool; a quarter of
    /// `query_timeout` so a failed acquire still leaves room to reconnect.
    pub acquire_timeout: Duration,
}

impl DbConfig {
    /// Store parameters only, for tools that never touch the model service.
    pub fn from_env() -> Result<Self> {
        Self::from_env_vars(&Env {
            lookup: |key: &str| std::env::var(key).ok(),
        })
    }

    fn from_env_vars<F>(env: &Env<F>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let query_timeout = Duration::from_secs(env.parse_or("QUERY_TIMEOUT_SECS", 30)?);
        if query_timeout.is_zero() {
            return Err(SqlRagError::Config("QUERY_TIMEOUT_SECS must be at least 1".to_string()));
        }

        Ok(Self {
            host: env.string_or("DB_HOST", "localhost"),
            port: env.parse_or("DB_PORT", 3306)?,
            user: env.required("DB_USER")?,
            password: env.string_or("DB_PASSWORD", ""),
            database: env.required("DB_NAME")?,
            charset: env.string_or("DB_CHARSET", "utf8mb4"),
            max_connections: env.parse_or("DB_MAX_CONNECTIONS", 5)?,
            query_timeout,
            acquire_timeout: acquire_timeout_for(query_timeout),
        })
    }
}

fn acquire_timeout_for(query_timeout: Duration) -> Duration {
    (query_timeout / 4).max(Duration::from_millis(250))
}

/// Generative model and embedding service settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub request_timeout: Duration,
    pub embedding_timeout: Duration,
}

/// Retrieval fan-out and expansion policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalConfig {
    pub k_tables: usize,
    pub k_columns_per_table: usize,
    /// Relational expansion depth; 1 is the one-hop closure.
    pub expansion_depth: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_tables: 3,
            k_columns_per_table: 5,
            expansion_depth: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub cors_origin: String,
    pub max_body_bytes: usize,
    /// Bound on reading one request's head and body.
    pub read_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db: DbConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
    pub registry_dir: PathBuf,
    pub explain_max_rows: usize,
    pub include_sql_on_error: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let db = DbConfig::from_env_vars(&env)?;

        let api_key = env
            .non_empty("LLM_API_KEY")
            .or_else(|| env.non_empty("OPENAI_API_KEY"))
            .ok_or_else(|| {
                SqlRagError::Config("LLM_API_KEY environment variable is not set".to_string())
            })?;

        let llm = LlmConfig {
            api_key,
            base_url: env
                .string_or("LLM_BASE_URL", "https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            model: env.string_or("LLM_MODEL", "gpt-4"),
            embedding_model: env.string_or("EMBEDDING_MODEL", "text-embedding-3-small"),
            request_timeout: Duration::from_secs(env.parse_or("LLM_TIMEOUT_SECS", 60)?),
            embedding_timeout: Duration::from_secs(env.parse_or("EMBEDDING_TIMEOUT_SECS", 30)?),
        };

        let defaults = RetrievalConfig::default();
        let retrieval = RetrievalConfig {
            k_tables: env.parse_or("RAG_K_TABLES", defaults.k_tables)?,
            k_columns_per_table: env
                .parse_or("RAG_K_COLUMNS_PER_TABLE", defaults.k_columns_per_table)?,
            expansion_depth: env.parse_or("RAG_EXPANSION_DEPTH", defaults.expansion_depth)?,
        };
        if retrieval.k_tables == 0 {
            return Err(SqlRagError::Config("RAG_K_TABLES must be at least 1".to_string()));
        }

        let server = ServerConfig {
            addr: env.string_or("SERVER_ADDR", "127.0.0.1:5000"),
            cors_origin: env.string_or("CORS_ORIGIN", "http://localhost:5173"),
            max_body_bytes: env.parse_or("MAX_BODY_BYTES", 1024 * 1024)?,
            read_timeout: Duration::from_secs(env.parse_or("READ_TIMEOUT_SECS", 10)?),
        };

        Ok(Self {
            db,
            llm,
            retrieval,
            server,
            registry_dir: PathBuf::from(env.string_or("REGISTRY_DIR", "registry")),
            explain_max_rows: env.parse_or("EXPLAIN_MAX_ROWS", 100)?,
            include_sql_on_error: env.parse_or("INCLUDE_SQL_ON_ERROR", false)?,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn non_empty(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.non_empty(key)
            .ok_or_else(|| SqlRagError::Config(format!("{} environment variable is not set", key)))
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.non_empty(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        match self.non_empty(key) {
            Some(raw) => raw
                .parse()
                .map_err(|e| SqlRagError::Config(format!("Invalid value for {}: {} ({})", key, raw, e))),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DB_USER", "app"),
        ("DB_NAME", "lending"),
        ("LLM_API_KEY", "sk-test"),
    ];

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.db.host, "localhost");
        assert_eq!(config.db.port, 3306);
        assert_eq!(config.db.charset, "utf8mb4");
        assert_eq!(config.db.query_timeout, Duration::from_secs(30));
        assert_eq!(config.server.read_timeout, Duration::from_secs(10));
        assert_eq!(config.retrieval, RetrievalConfig::default());
        assert_eq!(config.server.addr, "127.0.0.1:5000");
        assert_eq!(config.registry_dir, PathBuf::from("registry"));
        assert!(!config.include_sql_on_error);
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let err = AppConfig::from_lookup(lookup(&[("DB_USER", "app"), ("DB_NAME", "lending")]))
            .unwrap_err();
        assert!(matches!(err, SqlRagError::Config(_)));
        assert!(err.to_string().contains("LLM_API_KEY"));
    }

    #[test]
    fn test_openai_key_fallback() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DB_USER", "app"),
            ("DB_NAME", "lending"),
            ("OPENAI_API_KEY", "sk-fallback"),
        ]))
        .unwrap();
        assert_eq!(config.llm.api_key, "sk-fallback");
    }

    #[test]
    fn test_invalid_number_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("DB_PORT", "not-a-port"));
        let err = AppConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("DB_PORT"));
    }

    #[test]
    fn test_acquire_timeout_leaves_room_to_reconnect() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("QUERY_TIMEOUT_SECS", "8"));
        let db = AppConfig::from_lookup(lookup(&pairs)).unwrap().db;
        assert_eq!(db.acquire_timeout, Duration::from_secs(2));
        // First acquire, rebuild and retried acquire all fit in one query budget.
        assert!(db.acquire_timeout * 3 < db.query_timeout);

        assert_eq!(
            acquire_timeout_for(Duration::from_secs(1)),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_zero_query_timeout_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("QUERY_TIMEOUT_SECS", "0"));
        assert!(AppConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_zero_table_fanout_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RAG_K_TABLES", "0"));
        assert!(AppConfig::from_lookup(lookup(&pairs)).is_err());
    }
}

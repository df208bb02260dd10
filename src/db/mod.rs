//! Relational store access (MySQL via sqlx)

pub mod connection;
pub mod pool;
pub mod runner;

pub use connection::{connect_options, init_pool, DbPool};
pub use pool::{ConnectionSource, MySqlSource, ReconnectingPool};
pub use runner::{ExecutionResult, MySqlQueryRunner, QueryRunner, Row};

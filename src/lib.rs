pub mod api;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod explain;
pub mod llm;
pub mod pipeline;
pub mod registry;
pub mod schema_rag;
pub mod server;
pub mod startup;
pub mod synthesizer;

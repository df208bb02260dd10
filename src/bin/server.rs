//! HTTP server for the NLP-to-SQL endpoint

use anyhow::{Context, Result};
use clap::Parser;
use sql_rag::config::AppConfig;
use sql_rag::server::{self, AppState};
use sql_rag::startup::{self, Collaborators};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "Serve POST /api/nlp-to-sql")]
struct Args {
    /// Listen address (or set SERVER_ADDR)
    #[arg(long)]
    addr: Option<String>,

    /// Directory holding the registry JSON files (or set REGISTRY_DIR)
    #[arg(short, long)]
    registry_dir: Option<PathBuf>,

    /// Relational expansion depth (1 = direct neighbours only)
    #[arg(long)]
    expansion_depth: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = AppConfig::from_env().context("Invalid configuration")?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if let Some(dir) = args.registry_dir {
        config.registry_dir = dir;
    }
    if let Some(depth) = args.expansion_depth {
        config.retrieval.expansion_depth = depth;
    }

    info!("Starting NLP-to-SQL server");
    let collaborators = Collaborators::from_config(&config)?;
    let orchestrator = match startup::initialize(&config, collaborators).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("Startup failed: {}", e);
            return Err(e.into());
        }
    };

    let listener = TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.addr))?;
    info!("Server listening on http://{}", config.server.addr);

    let state = Arc::new(AppState {
        orchestrator: Arc::new(orchestrator),
        server: config.server.clone(),
        include_sql_on_error: config.include_sql_on_error,
    });

    server::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    info!("Server stopped");
    Ok(())
}

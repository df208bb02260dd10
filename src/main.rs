use anyhow::Result;
use clap::Parser;
use sql_rag::config::AppConfig;
use sql_rag::startup::{self, Collaborators};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sql-rag")]
#[command(about = "Answer a natural-language question against the configured database")]
struct Args {
    /// The question in natural language
    query: String,

    /// Directory holding the registry JSON files (or set REGISTRY_DIR)
    #[arg(short, long)]
    registry_dir: Option<PathBuf>,

    /// Number of tables taken from similarity ranking
    #[arg(long)]
    k_tables: Option<usize>,

    /// Relational expansion depth (1 = direct neighbours only)
    #[arg(long)]
    expansion_depth: Option<usize>,

    /// Print the generated SQL
    #[arg(long)]
    show_sql: bool,

    /// Print the raw result rows
    #[arg(long)]
    show_rows: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(dir) = args.registry_dir {
        config.registry_dir = dir;
    }
    if let Some(k) = args.k_tables {
        anyhow::ensure!(k > 0, "--k-tables must be at least 1");
        config.retrieval.k_tables = k;
    }
    if let Some(depth) = args.expansion_depth {
        config.retrieval.expansion_depth = depth;
    }

    let collaborators = Collaborators::from_config(&config)?;
    let orchestrator = startup::initialize(&config, collaborators).await?;

    info!("Query: {}", args.query);
    let outcome = match orchestrator.run(&args.query).await {
        Ok(outcome) => outcome,
        Err(failure) => {
            if let Some(sql) = &failure.sql {
                eprintln!("Attempted SQL:\n{}\n", sql);
            }
            return Err(failure.error.into());
        }
    };

    if args.show_sql {
        println!("Generated SQL:\n{}\n", outcome.sql);
    }
    if args.show_rows {
        println!(
            "Result ({} rows):\n{}\n",
            outcome.rows.len(),
            serde_json::to_string_pretty(&outcome.rows)?
        );
    }
    println!("Explanation:\n{}", outcome.explanation);

    Ok(())
}

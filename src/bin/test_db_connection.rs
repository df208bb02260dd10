//! Test MySQL database connection
//!
//! Run with: cargo run --bin test_db_connection

use anyhow::Result;
use sql_rag::config::DbConfig;
use sql_rag::db::init_pool;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let db = &DbConfig::from_env()?;

    println!("Testing MySQL connection...");
    println!("Connecting to: {}:{}/{} as {}", db.host, db.port, db.database, db.user);

    match init_pool(db).await {
        Ok(pool) => {
            let (version,): (String,) = sqlx::query_as("SELECT VERSION()").fetch_one(&pool).await?;
            println!("Connection successful! Server version: {}", version);

            let (table_count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = DATABASE()",
            )
            .fetch_one(&pool)
            .await?;
            println!("Tables in database: {}", table_count);

            pool.close().await;
            Ok(())
        }
        Err(e) => {
            eprintln!("Connection failed: {}", e);
            Err(e.into())
        }
    }
}

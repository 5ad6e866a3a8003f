// Database connection and pool management
// SQLite through sqlx; the schema is created in place by `migrate`.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_max_connections(database_url, 5).await
    }

    pub async fn with_max_connections(database_url: &str, max_connections: u32) -> Result<Self> {
        let db_path = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);

        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating database directory {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url {database_url}"))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("connecting to {database_url}"))?;

        info!("🗄️ Database connected: {}", db_path);
        Ok(Self { pool })
    }

    /// Private in-memory database. A single connection that never expires,
    /// since every new SQLite memory connection starts empty.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_accounts_sql = r"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                login TEXT NOT NULL UNIQUE,
                encrypted_secret TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'Idle',
                last_run_at TEXT,
                last_success_at TEXT,
                next_run_at TEXT,
                notes TEXT,
                created_at TEXT NOT NULL
            )
        ";

        let create_update_logs_sql = r"
            CREATE TABLE IF NOT EXISTS update_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                executed_at TEXT NOT NULL,
                outcome TEXT NOT NULL,
                duration_ms INTEGER NOT NULL DEFAULT 0,
                fields_edited TEXT NOT NULL DEFAULT '{}',
                detail TEXT NOT NULL DEFAULT '',
                FOREIGN KEY (account_id) REFERENCES accounts (id)
            )
        ";

        let create_indexes_sql = [
            "CREATE INDEX IF NOT EXISTS idx_accounts_active ON accounts (is_active)",
            "CREATE INDEX IF NOT EXISTS idx_update_logs_account ON update_logs (account_id)",
            "CREATE INDEX IF NOT EXISTS idx_update_logs_executed_at ON update_logs (executed_at)",
        ];

        sqlx::query(create_accounts_sql).execute(&self.pool).await?;
        sqlx::query(create_update_logs_sql).execute(&self.pool).await?;
        for sql in create_indexes_sql {
            sqlx::query(sql).execute(&self.pool).await?;
        }

        info!("✅ Database schema ready");
        Ok(())
    }
}

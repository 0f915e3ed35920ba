//! Schema migration runner.
//!
//! Each schema statement is applied once, inside a transaction, and recorded
//! in the `_migrations` table.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};

use super::schema;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Database query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration script failed to execute.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Migration runner for applying schema changes.
pub struct MigrationRunner {
    pool: SqlitePool,
}

impl MigrationRunner {
    /// Creates a new migration runner.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Runs all pending migrations.
    ///
    /// Idempotent: already recorded migrations are skipped and every
    /// statement uses `IF NOT EXISTS`.
    pub async fn run_migrations(&self) -> Result<usize, MigrationError> {
        self.ensure_migrations_table().await?;

        let mut applied = 0;
        for (idx, statement) in schema::all_schema_statements().iter().enumerate() {
            let migration_name = format!("schema_v1_part_{}", idx);

            if !self.is_migration_applied(&migration_name).await? {
                self.apply_migration(&migration_name, statement).await?;
                applied += 1;
            }
        }

        if applied > 0 {
            info!(applied, "Applied schema migrations");
        } else {
            debug!("Schema up to date");
        }
        Ok(applied)
    }

    async fn ensure_migrations_table(&self) -> Result<(), MigrationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                applied_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn is_migration_applied(&self, name: &str) -> Result<bool, MigrationError> {
        let result: Option<(i64,)> = sqlx::query_as("SELECT id FROM _migrations WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(result.is_some())
    }

    async fn apply_migration(&self, name: &str, sql: &str) -> Result<(), MigrationError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| MigrationError::MigrationFailed(format!("{}: {}", name, e)))?;

        sqlx::query("INSERT INTO _migrations (name, applied_at) VALUES (?1, ?2)")
            .bind(name)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Returns the applied migrations in application order.
    pub async fn list_applied_migrations(&self) -> Result<Vec<AppliedMigration>, MigrationError> {
        self.ensure_migrations_table().await?;

        let migrations: Vec<AppliedMigration> =
            sqlx::query_as("SELECT name, applied_at FROM _migrations ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(migrations)
    }

    /// Drops every table, including the migration log.
    ///
    /// **WARNING**: This will destroy all data.
    pub async fn reset_database(&self) -> Result<(), MigrationError> {
        let drop_statements = [
            "DROP TABLE IF EXISTS synthetic_data",
            "DROP TABLE IF EXISTS questions",
            "DROP TABLE IF EXISTS _migrations",
        ];

        for statement in drop_statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| MigrationError::MigrationFailed(format!("Drop failed: {}", e)))?;
        }

        Ok(())
    }
}

/// Record of an applied migration.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppliedMigration {
    /// Name of the migration.
    pub name: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
}

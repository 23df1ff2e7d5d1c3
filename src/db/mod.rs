//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for plants, care schedules and care tasks.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run embedded migrations
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS plants (
            id TEXT PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            species TEXT,
            location TEXT,
            image_url TEXT,
            is_hidden INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_plants (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            plant_id TEXT NOT NULL REFERENCES plants(id),
            frequency TEXT NOT NULL CHECK (frequency IN ('daily', 'weekly', 'monthly')),
            timezone TEXT NOT NULL,
            start_date TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS care_tasks (
            id TEXT PRIMARY KEY,
            user_plant_id TEXT NOT NULL REFERENCES user_plants(id),
            due_at TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'done')),
            completed_at TEXT,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_plants_created_at ON plants(created_at);
        CREATE INDEX IF NOT EXISTS idx_user_plants_user_id ON user_plants(user_id);
        CREATE INDEX IF NOT EXISTS idx_user_plants_plant_id ON user_plants(plant_id);
        CREATE INDEX IF NOT EXISTS idx_care_tasks_status_due_at ON care_tasks(status, due_at);
        CREATE INDEX IF NOT EXISTS idx_care_tasks_user_plant_id ON care_tasks(user_plant_id);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_care_tasks_one_pending_per_due
            ON care_tasks(user_plant_id, due_at) WHERE status = 'pending';
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

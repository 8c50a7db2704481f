//! Database initialization
//!
//! Opens (or creates) the shared SQLite database and creates every table the
//! intake pipeline touches. All `create_*_table` functions are idempotent so
//! startup can run them unconditionally, and integration tests can build the
//! same schema on an in-memory pool.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection pool and schema.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_connection(&pool).await?;
    create_all_tables(&pool).await?;
    seed_default_categories(&pool).await?;

    Ok(pool)
}

/// Session pragmas: referential integrity, WAL for concurrent webhook
/// deliveries, and a busy timeout instead of immediate SQLITE_BUSY.
pub async fn configure_connection(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;
    Ok(())
}

/// Create every fieldbook table (idempotent).
pub async fn create_all_tables(pool: &SqlitePool) -> Result<()> {
    create_workers_table(pool).await?;
    create_conversation_state_table(pool).await?;
    create_projects_table(pool).await?;
    create_categories_table(pool).await?;
    create_receipts_table(pool).await?;
    create_line_items_table(pool).await?;
    create_audit_log_table(pool).await?;
    create_processed_messages_table(pool).await?;
    create_unknown_contacts_table(pool).await?;
    Ok(())
}

/// Field workers, keyed by their stable messaging contact.
/// Workers are soft-deactivated, never deleted.
pub async fn create_workers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            contact TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            crew TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// One conversation state row per worker. `version` is the
/// optimistic-concurrency token: every transition rewrites the row with
/// version + 1, guarded by the version it read.
pub async fn create_conversation_state_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversation_state (
            worker_id INTEGER PRIMARY KEY REFERENCES workers(id),
            state TEXT NOT NULL DEFAULT 'idle',
            record_id INTEGER REFERENCES receipts(id),
            context TEXT,
            version INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_projects_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Spend categories. Entries referenced by receipts are soft-deactivated
/// rather than removed so historical labels survive.
pub async fn create_categories_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            display_order INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Structured intake records. Monetary columns are INTEGER cents.
/// `raw_extraction` keeps the recognition payload verbatim even after edits.
pub async fn create_receipts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS receipts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            worker_id INTEGER NOT NULL REFERENCES workers(id),
            project_id INTEGER REFERENCES projects(id),
            matched_project_name TEXT,
            project_match_score REAL,
            category_id INTEGER REFERENCES categories(id),
            vendor_name TEXT,
            vendor_city TEXT,
            vendor_state TEXT,
            purchase_date TEXT,
            subtotal_cents INTEGER,
            tax_cents INTEGER,
            total_cents INTEGER,
            payment_method TEXT,
            image_path TEXT,
            image_hash TEXT,
            raw_extraction TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            flag_reason TEXT,
            duplicate_of INTEGER REFERENCES receipts(id),
            is_missed_receipt INTEGER NOT NULL DEFAULT 0,
            context TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            confirmed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_line_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS line_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            receipt_id INTEGER NOT NULL REFERENCES receipts(id) ON DELETE CASCADE,
            item_name TEXT NOT NULL,
            quantity REAL NOT NULL DEFAULT 1,
            unit_cents INTEGER,
            extended_cents INTEGER,
            category_id INTEGER REFERENCES categories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Append-only field-level audit trail, one row per changed field.
pub async fn create_audit_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            receipt_id INTEGER NOT NULL REFERENCES receipts(id),
            field TEXT NOT NULL,
            old_value TEXT,
            new_value TEXT,
            actor TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Gateway message ids already handled. Repeat deliveries of the same id
/// (gateway retries) are acknowledged without reprocessing.
pub async fn create_processed_messages_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processed_messages (
            message_id TEXT PRIMARY KEY,
            processed_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Review queue of silenced attempts from unregistered senders.
pub async fn create_unknown_contacts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS unknown_contacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            contact TEXT NOT NULL,
            message_body TEXT,
            has_media INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Seed the category list on first run. The "Other" entry is the designated
/// fallback for the reconciliation cascade and must always exist.
pub async fn seed_default_categories(pool: &SqlitePool) -> Result<()> {
    const DEFAULTS: &[(&str, i64)] = &[
        ("Fuel", 1),
        ("Materials", 2),
        ("Food & Drinks", 3),
        ("Safety Gear", 4),
        ("Lodging", 5),
        ("Tools", 6),
        ("Other", 99),
    ];

    for (name, order) in DEFAULTS {
        sqlx::query("INSERT OR IGNORE INTO categories (name, display_order) VALUES (?, ?)")
            .bind(name)
            .bind(order)
            .execute(pool)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn schema_creation_is_idempotent() {
        let pool = memory_pool().await;
        create_all_tables(&pool).await.unwrap();
        create_all_tables(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert!(names.contains(&"workers"));
        assert!(names.contains(&"receipts"));
        assert!(names.contains(&"conversation_state"));
        assert!(names.contains(&"processed_messages"));
    }

    #[tokio::test]
    async fn init_database_creates_file_and_seeds() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data").join("fieldbook.db");

        let pool = init_database(&path).await.unwrap();
        assert!(path.exists());

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM categories")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(count >= 7, "default categories should be seeded");
    }

    #[tokio::test]
    async fn seeding_creates_fallback_category_once() {
        let pool = memory_pool().await;
        create_all_tables(&pool).await.unwrap();
        seed_default_categories(&pool).await.unwrap();
        seed_default_categories(&pool).await.unwrap();

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM categories WHERE name = 'Other'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }
}

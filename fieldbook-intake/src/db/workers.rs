//! Worker directory operations
//!
//! Lookup, contact normalization, and idempotent auto-registration.
//! Workers are soft-deactivated only; `is_active = 0` silences a contact
//! without losing the submission history hanging off the row.

use fieldbook_common::Result;
use sqlx::{FromRow, SqlitePool};
use tracing::info;

/// Display name given to workers registered before they introduce
/// themselves. A worker carrying this name is still owed the one-shot
/// "what's your name" exchange.
pub const PLACEHOLDER_NAME: &str = "Unknown";

#[derive(Debug, Clone, FromRow)]
pub struct Worker {
    pub id: i64,
    pub contact: String,
    pub display_name: String,
    pub crew: Option<String>,
    pub is_active: bool,
}

impl Worker {
    pub fn has_placeholder_name(&self) -> bool {
        self.display_name == PLACEHOLDER_NAME
    }
}

/// Normalize a contact identifier to +1XXXXXXXXXX form.
///
/// Handles 4075551234, 407-555-1234, (407) 555-1234, 1-407-555-1234 and the
/// already-normalized form. Anything else is returned unchanged.
pub fn normalize_contact(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 => format!("+1{}", digits),
        11 if digits.starts_with('1') => format!("+{}", digits),
        _ => raw.to_string(),
    }
}

fn last_ten_digits(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() >= 10 {
        Some(digits[digits.len() - 10..].to_string())
    } else {
        None
    }
}

/// Find a worker by contact identifier.
///
/// Exact match on the normalized form first; then a last-10-digits scan of
/// active workers that also repairs the stored contact to normalized form
/// so the next lookup takes the fast path.
pub async fn lookup_by_contact(pool: &SqlitePool, contact: &str) -> Result<Option<Worker>> {
    let normalized = normalize_contact(contact);

    let worker = sqlx::query_as::<_, Worker>(
        "SELECT id, contact, display_name, crew, is_active FROM workers WHERE contact = ?",
    )
    .bind(&normalized)
    .fetch_optional(pool)
    .await?;
    if worker.is_some() {
        return Ok(worker);
    }

    let Some(wanted) = last_ten_digits(contact) else {
        return Ok(None);
    };

    let candidates = sqlx::query_as::<_, Worker>(
        "SELECT id, contact, display_name, crew, is_active FROM workers WHERE is_active = 1",
    )
    .fetch_all(pool)
    .await?;

    for candidate in candidates {
        if last_ten_digits(&candidate.contact).as_deref() == Some(wanted.as_str()) {
            sqlx::query("UPDATE workers SET contact = ?, updated_at = datetime('now') WHERE id = ?")
                .bind(&normalized)
                .bind(candidate.id)
                .execute(pool)
                .await?;
            info!(
                worker_id = candidate.id,
                old = %candidate.contact,
                new = %normalized,
                "Repaired stored contact to normalized form"
            );
            return Ok(Some(Worker {
                contact: normalized,
                ..candidate
            }));
        }
    }

    Ok(None)
}

/// Register a worker, idempotently.
///
/// INSERT OR IGNORE against the UNIQUE contact plus a re-select: two
/// concurrent first messages from the same sender converge on one row, and
/// the second caller sees whatever the first wrote.
pub async fn register(pool: &SqlitePool, contact: &str, display_name: &str) -> Result<Worker> {
    let normalized = normalize_contact(contact);

    let inserted = sqlx::query("INSERT OR IGNORE INTO workers (contact, display_name) VALUES (?, ?)")
        .bind(&normalized)
        .bind(display_name)
        .execute(pool)
        .await?;

    let worker = sqlx::query_as::<_, Worker>(
        "SELECT id, contact, display_name, crew, is_active FROM workers WHERE contact = ?",
    )
    .bind(&normalized)
    .fetch_one(pool)
    .await?;

    if inserted.rows_affected() > 0 {
        info!(worker_id = worker.id, name = %display_name, contact = %normalized, "New worker registered");
    }
    Ok(worker)
}

/// Complete the one-shot name exchange for a placeholder-named worker.
pub async fn set_display_name(pool: &SqlitePool, worker_id: i64, name: &str) -> Result<()> {
    sqlx::query("UPDATE workers SET display_name = ?, updated_at = datetime('now') WHERE id = ?")
        .bind(name)
        .bind(worker_id)
        .execute(pool)
        .await?;
    info!(worker_id, name = %name, "Worker introduced themselves");
    Ok(())
}

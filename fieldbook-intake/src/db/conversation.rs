//! Conversation state persistence
//!
//! One versioned row per worker. Writes are compare-and-swap on the version
//! the transition read, so a concurrent transition can never be silently
//! overwritten even across processes; the in-process per-sender locks make
//! a lost CAS an anomaly rather than a routine event.

use crate::conversation::{ConvoState, StateTag};
use fieldbook_common::{Error, Result};
use sqlx::{Row, SqlitePool};

/// Load the worker's current state, creating the idle row on first use.
pub async fn load_state(pool: &SqlitePool, worker_id: i64) -> Result<ConvoState> {
    sqlx::query("INSERT OR IGNORE INTO conversation_state (worker_id, state) VALUES (?, 'idle')")
        .bind(worker_id)
        .execute(pool)
        .await?;

    let row = sqlx::query(
        "SELECT state, record_id, context, version FROM conversation_state WHERE worker_id = ?",
    )
    .bind(worker_id)
    .fetch_one(pool)
    .await?;

    let context: Option<String> = row.get("context");
    Ok(ConvoState {
        tag: StateTag::parse(row.get("state")),
        record_id: row.get("record_id"),
        context: context.and_then(|raw| serde_json::from_str(&raw).ok()),
        version: row.get("version"),
    })
}

/// Commit a transition with compare-and-swap on the version that was read.
///
/// Returns `Error::Conflict` when another transition got there first; the
/// caller reports "still working on your last message" instead of
/// clobbering the winner.
pub async fn save_state(
    pool: &SqlitePool,
    worker_id: i64,
    read_version: i64,
    tag: StateTag,
    record_id: Option<i64>,
    context: Option<&serde_json::Value>,
) -> Result<()> {
    let context_json = context.map(|c| c.to_string());

    let result = sqlx::query(
        r#"
        UPDATE conversation_state
        SET state = ?, record_id = ?, context = ?, version = version + 1,
            updated_at = datetime('now')
        WHERE worker_id = ? AND version = ?
        "#,
    )
    .bind(tag.as_str())
    .bind(record_id)
    .bind(context_json)
    .bind(worker_id)
    .bind(read_version)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::Conflict(format!(
            "conversation state for worker {} changed underneath version {}",
            worker_id, read_version
        )));
    }
    Ok(())
}

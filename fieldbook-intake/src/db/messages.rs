//! Inbound message bookkeeping
//!
//! Gateway-retry idempotency and the unknown-sender review queue.

use fieldbook_common::Result;
use sqlx::SqlitePool;
use tracing::warn;

/// Claim a gateway message id.
///
/// Returns `true` when this delivery is the first with that id. A `false`
/// means the gateway retried a message that was already handled; the caller
/// acknowledges and does nothing else. The INSERT OR IGNORE against the
/// primary key makes the claim atomic under concurrent deliveries.
pub async fn claim_message_id(pool: &SqlitePool, message_id: &str) -> Result<bool> {
    if message_id.is_empty() {
        // No id to dedupe on; process normally.
        return Ok(true);
    }
    let result = sqlx::query("INSERT OR IGNORE INTO processed_messages (message_id) VALUES (?)")
        .bind(message_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Queue a silenced attempt from an unregistered sender for human review.
pub async fn log_unknown_contact(
    pool: &SqlitePool,
    contact: &str,
    body: &str,
    has_media: bool,
) -> Result<()> {
    let truncated: String = body.chars().take(500).collect();
    sqlx::query(
        "INSERT INTO unknown_contacts (contact, message_body, has_media) VALUES (?, ?, ?)",
    )
    .bind(contact)
    .bind(truncated)
    .bind(has_media)
    .execute(pool)
    .await?;
    warn!(contact = %contact, "Unknown sender silenced and queued for review");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldbook_common::db::init::create_all_tables;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn second_claim_of_same_id_is_rejected() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        create_all_tables(&pool).await.unwrap();

        assert!(claim_message_id(&pool, "SM123").await.unwrap());
        assert!(!claim_message_id(&pool, "SM123").await.unwrap());
        assert!(claim_message_id(&pool, "SM124").await.unwrap());
    }

    #[tokio::test]
    async fn empty_id_always_processes() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        create_all_tables(&pool).await.unwrap();

        assert!(claim_message_id(&pool, "").await.unwrap());
        assert!(claim_message_id(&pool, "").await.unwrap());
    }
}

//! Record persistence
//!
//! The intake pipeline creates records as `pending` or `flagged` and never
//! moves them further; the remaining statuses belong to the review surface,
//! which reaches the same rows through the audited edit contract in
//! [`crate::db::audit`].

use fieldbook_common::Result;
use sqlx::{FromRow, SqlitePool};
use tracing::info;

/// Record lifecycle status, closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Pending,
    Confirmed,
    Flagged,
    Rejected,
    Deleted,
    Duplicate,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Confirmed => "confirmed",
            RecordStatus::Flagged => "flagged",
            RecordStatus::Rejected => "rejected",
            RecordStatus::Deleted => "deleted",
            RecordStatus::Duplicate => "duplicate",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(RecordStatus::Pending),
            "confirmed" => Some(RecordStatus::Confirmed),
            "flagged" => Some(RecordStatus::Flagged),
            "rejected" => Some(RecordStatus::Rejected),
            "deleted" => Some(RecordStatus::Deleted),
            "duplicate" => Some(RecordStatus::Duplicate),
            _ => None,
        }
    }
}

// Flag reasons written by the pipeline. The dashboard filters on these
// strings, so they change together with it.
pub const FLAG_DOWNLOAD_FAILED: &str = "Image download failed — gateway URL saved for retry";
pub const FLAG_UNREADABLE: &str = "Could not read receipt";
pub const FLAG_REJECTED_EXTRACTION: &str = "Submitter rejected extraction";
pub const FLAG_MANUAL_ENTRY: &str = "Manual entry — needs review";
pub const FLAG_MISSED_RECEIPT: &str = "Missed receipt";
pub const FLAG_MISSED_DETAILS: &str = "Missed receipt — details provided";
pub const FLAG_POSSIBLE_DUPLICATE: &str = "Possible duplicate — similar receipt already exists";
pub const FLAG_PROJECT_UNRESOLVED: &str = "Project not recognized — needs review";

/// A fully structured record ready to persist.
#[derive(Debug, Clone, Default)]
pub struct NewReceipt {
    pub worker_id: i64,
    pub project_id: Option<i64>,
    pub matched_project_name: Option<String>,
    pub project_match_score: Option<f64>,
    pub category_id: Option<i64>,
    pub vendor_name: Option<String>,
    pub vendor_city: Option<String>,
    pub vendor_state: Option<String>,
    pub purchase_date: Option<String>,
    pub subtotal_cents: Option<i64>,
    pub tax_cents: Option<i64>,
    pub total_cents: Option<i64>,
    pub payment_method: Option<String>,
    pub image_path: Option<String>,
    pub image_hash: Option<String>,
    pub raw_extraction: Option<String>,
    pub status: Option<RecordStatus>,
    pub flag_reason: Option<String>,
    pub duplicate_of: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub item_name: String,
    pub quantity: f64,
    pub unit_cents: Option<i64>,
    pub extended_cents: Option<i64>,
}

/// A persisted record, as read back for replies, edits, and tests.
#[derive(Debug, Clone, FromRow)]
pub struct ReceiptRow {
    pub id: i64,
    pub worker_id: i64,
    pub project_id: Option<i64>,
    pub matched_project_name: Option<String>,
    pub project_match_score: Option<f64>,
    pub category_id: Option<i64>,
    pub vendor_name: Option<String>,
    pub vendor_city: Option<String>,
    pub vendor_state: Option<String>,
    pub purchase_date: Option<String>,
    pub subtotal_cents: Option<i64>,
    pub tax_cents: Option<i64>,
    pub total_cents: Option<i64>,
    pub payment_method: Option<String>,
    pub image_path: Option<String>,
    pub image_hash: Option<String>,
    pub raw_extraction: Option<String>,
    pub status: String,
    pub flag_reason: Option<String>,
    pub duplicate_of: Option<i64>,
    pub is_missed_receipt: bool,
    pub context: Option<String>,
    pub confirmed_at: Option<String>,
}

/// Insert a record and its line items as one transaction.
///
/// Either the record lands complete with all its children or nothing lands.
pub async fn insert_receipt_with_items(
    pool: &SqlitePool,
    receipt: &NewReceipt,
    items: &[NewLineItem],
) -> Result<i64> {
    let mut tx = pool.begin().await?;

    let status = receipt.status.unwrap_or(RecordStatus::Pending);
    let result = sqlx::query(
        r#"
        INSERT INTO receipts
            (worker_id, project_id, matched_project_name, project_match_score,
             category_id, vendor_name, vendor_city, vendor_state, purchase_date,
             subtotal_cents, tax_cents, total_cents, payment_method,
             image_path, image_hash, raw_extraction, status, flag_reason, duplicate_of)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(receipt.worker_id)
    .bind(receipt.project_id)
    .bind(&receipt.matched_project_name)
    .bind(receipt.project_match_score)
    .bind(receipt.category_id)
    .bind(&receipt.vendor_name)
    .bind(&receipt.vendor_city)
    .bind(&receipt.vendor_state)
    .bind(&receipt.purchase_date)
    .bind(receipt.subtotal_cents)
    .bind(receipt.tax_cents)
    .bind(receipt.total_cents)
    .bind(&receipt.payment_method)
    .bind(&receipt.image_path)
    .bind(&receipt.image_hash)
    .bind(&receipt.raw_extraction)
    .bind(status.as_str())
    .bind(&receipt.flag_reason)
    .bind(receipt.duplicate_of)
    .execute(&mut *tx)
    .await?;

    let receipt_id = result.last_insert_rowid();

    for item in items {
        sqlx::query(
            r#"
            INSERT INTO line_items (receipt_id, item_name, quantity, unit_cents, extended_cents)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(receipt_id)
        .bind(&item.item_name)
        .bind(item.quantity)
        .bind(item.unit_cents)
        .bind(item.extended_cents)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!(
        receipt_id,
        worker_id = receipt.worker_id,
        vendor = receipt.vendor_name.as_deref().unwrap_or("?"),
        status = status.as_str(),
        items = items.len(),
        "Record created"
    );
    Ok(receipt_id)
}

/// Create a flagged record with no line items (failure paths, missed
/// receipts). The message is preserved, never dropped.
pub async fn create_flagged(
    pool: &SqlitePool,
    worker_id: i64,
    reason: &str,
    image_path: Option<&str>,
    caption: Option<&str>,
    is_missed_receipt: bool,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO receipts (worker_id, image_path, matched_project_name, status,
                              flag_reason, is_missed_receipt)
        VALUES (?, ?, ?, 'flagged', ?, ?)
        "#,
    )
    .bind(worker_id)
    .bind(image_path)
    .bind(caption)
    .bind(reason)
    .bind(is_missed_receipt)
    .execute(pool)
    .await?;

    let receipt_id = result.last_insert_rowid();
    info!(receipt_id, worker_id, reason, "Flagged record created");
    Ok(receipt_id)
}

/// Accept a record: `confirmed` status plus the acceptance timestamp.
pub async fn mark_confirmed(pool: &SqlitePool, receipt_id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE receipts SET status = 'confirmed', confirmed_at = datetime('now') WHERE id = ?",
    )
    .bind(receipt_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Flag a record with a reason.
pub async fn flag(pool: &SqlitePool, receipt_id: i64, reason: &str) -> Result<()> {
    sqlx::query("UPDATE receipts SET status = 'flagged', flag_reason = ? WHERE id = ?")
        .bind(reason)
        .bind(receipt_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Attach free text to a record's context blob under the given key.
pub async fn append_context_text(
    pool: &SqlitePool,
    receipt_id: i64,
    key: &str,
    text: &str,
) -> Result<()> {
    let existing: Option<(Option<String>,)> =
        sqlx::query_as("SELECT context FROM receipts WHERE id = ?")
            .bind(receipt_id)
            .fetch_optional(pool)
            .await?;

    let mut context = existing
        .and_then(|(raw,)| raw)
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
        .unwrap_or_else(|| serde_json::json!({}));
    if let Some(map) = context.as_object_mut() {
        map.insert(key.to_string(), serde_json::Value::String(text.to_string()));
    }

    sqlx::query("UPDATE receipts SET context = ? WHERE id = ?")
        .bind(context.to_string())
        .bind(receipt_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Fill a missed-receipt record with whatever the guided parse recovered.
pub async fn update_missed_details(
    pool: &SqlitePool,
    receipt_id: i64,
    vendor_name: Option<&str>,
    total_cents: Option<i64>,
    project_id: Option<i64>,
    matched_project_name: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE receipts
        SET vendor_name = COALESCE(?, vendor_name),
            total_cents = COALESCE(?, total_cents),
            project_id = COALESCE(?, project_id),
            matched_project_name = COALESCE(?, matched_project_name),
            flag_reason = ?
        WHERE id = ?
        "#,
    )
    .bind(vendor_name)
    .bind(total_cents)
    .bind(project_id)
    .bind(matched_project_name)
    .bind(FLAG_MISSED_DETAILS)
    .bind(receipt_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Look for an earlier record that this submission likely duplicates:
/// the same image bytes, or the same submitter + vendor + total + date.
/// Soft-retired records don't count.
pub async fn find_possible_duplicate(
    pool: &SqlitePool,
    worker_id: i64,
    vendor_name: Option<&str>,
    total_cents: Option<i64>,
    purchase_date: Option<&str>,
    image_hash: Option<&str>,
) -> Result<Option<i64>> {
    if let Some(hash) = image_hash {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM receipts
            WHERE image_hash = ? AND status NOT IN ('deleted', 'duplicate')
            ORDER BY id LIMIT 1
            "#,
        )
        .bind(hash)
        .fetch_optional(pool)
        .await?;
        if let Some((id,)) = row {
            return Ok(Some(id));
        }
    }

    let (Some(vendor), Some(total), Some(date)) = (vendor_name, total_cents, purchase_date) else {
        return Ok(None);
    };

    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT id FROM receipts
        WHERE worker_id = ? AND vendor_name = ? AND total_cents = ? AND purchase_date = ?
          AND status NOT IN ('deleted', 'duplicate')
        ORDER BY id LIMIT 1
        "#,
    )
    .bind(worker_id)
    .bind(vendor)
    .bind(total)
    .bind(date)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(id,)| id))
}

pub async fn get_receipt(pool: &SqlitePool, receipt_id: i64) -> Result<Option<ReceiptRow>> {
    let row = sqlx::query_as::<_, ReceiptRow>(
        r#"
        SELECT id, worker_id, project_id, matched_project_name, project_match_score,
               category_id, vendor_name, vendor_city, vendor_state, purchase_date,
               subtotal_cents, tax_cents, total_cents, payment_method, image_path,
               image_hash, raw_extraction, status, flag_reason, duplicate_of,
               is_missed_receipt, context, confirmed_at
        FROM receipts WHERE id = ?
        "#,
    )
    .bind(receipt_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn line_item_count(pool: &SqlitePool, receipt_id: i64) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM line_items WHERE receipt_id = ?")
        .bind(receipt_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_tags_round_trip() {
        for status in [
            RecordStatus::Pending,
            RecordStatus::Confirmed,
            RecordStatus::Flagged,
            RecordStatus::Rejected,
            RecordStatus::Deleted,
            RecordStatus::Duplicate,
        ] {
            assert_eq!(RecordStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RecordStatus::parse("in_review"), None);
    }
}

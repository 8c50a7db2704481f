//! Audited record edits
//!
//! The review surface edits records through this contract: every field
//! change lands as one append-only `audit_log` row, written in the same
//! transaction as the update itself. The raw extraction payload is never
//! touched by edits, so the original machine reading stays auditable.

use crate::db::receipts::ReceiptRow;
use fieldbook_common::{Error, Result};
use sqlx::SqlitePool;

/// One requested field change.
#[derive(Debug, Clone)]
pub struct FieldEdit {
    pub field: String,
    pub new_value: Option<String>,
}

/// Columns the edit contract may touch. `raw_extraction` is deliberately
/// absent, as are the identity and provenance columns.
const EDITABLE_FIELDS: &[&str] = &[
    "vendor_name",
    "vendor_city",
    "vendor_state",
    "purchase_date",
    "subtotal_cents",
    "tax_cents",
    "total_cents",
    "payment_method",
    "project_id",
    "matched_project_name",
    "category_id",
    "status",
    "flag_reason",
    "duplicate_of",
];

fn current_value(row: &ReceiptRow, field: &str) -> Option<String> {
    match field {
        "vendor_name" => row.vendor_name.clone(),
        "vendor_city" => row.vendor_city.clone(),
        "vendor_state" => row.vendor_state.clone(),
        "purchase_date" => row.purchase_date.clone(),
        "subtotal_cents" => row.subtotal_cents.map(|v| v.to_string()),
        "tax_cents" => row.tax_cents.map(|v| v.to_string()),
        "total_cents" => row.total_cents.map(|v| v.to_string()),
        "payment_method" => row.payment_method.clone(),
        "project_id" => row.project_id.map(|v| v.to_string()),
        "matched_project_name" => row.matched_project_name.clone(),
        "category_id" => row.category_id.map(|v| v.to_string()),
        "status" => Some(row.status.clone()),
        "flag_reason" => row.flag_reason.clone(),
        "duplicate_of" => row.duplicate_of.map(|v| v.to_string()),
        _ => None,
    }
}

/// Apply a set of field edits to a record, atomically, with one audit row
/// per field that actually changed.
pub async fn apply_field_edits(
    pool: &SqlitePool,
    receipt_id: i64,
    edits: &[FieldEdit],
    actor: &str,
) -> Result<usize> {
    let Some(row) = crate::db::receipts::get_receipt(pool, receipt_id).await? else {
        return Err(Error::NotFound(format!("receipt {}", receipt_id)));
    };

    for edit in edits {
        if !EDITABLE_FIELDS.contains(&edit.field.as_str()) {
            return Err(Error::InvalidInput(format!(
                "field '{}' is not editable",
                edit.field
            )));
        }
    }

    let mut tx = pool.begin().await?;
    let mut changed = 0usize;

    for edit in edits {
        let old_value = current_value(&row, &edit.field);
        if old_value == edit.new_value {
            continue;
        }

        // Column name is validated against EDITABLE_FIELDS above.
        let sql = format!("UPDATE receipts SET {} = ? WHERE id = ?", edit.field);
        sqlx::query(&sql)
            .bind(&edit.new_value)
            .bind(receipt_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO audit_log (receipt_id, field, old_value, new_value, actor)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(receipt_id)
        .bind(&edit.field)
        .bind(&old_value)
        .bind(&edit.new_value)
        .bind(actor)
        .execute(&mut *tx)
        .await?;

        changed += 1;
    }

    tx.commit().await?;
    Ok(changed)
}

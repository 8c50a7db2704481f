//! Record structuring and validation
//!
//! Turns the raw, untrusted recognition response into a typed record shape,
//! or the distinguished `ExtractionFailed` value. The caller never drops a
//! message over a bad payload: failure here becomes a flagged record with
//! zero line items.

use chrono::NaiveDate;
use fieldbook_common::money;
use serde_json::Value;
use thiserror::Error;

/// The payload could not be read as structured data at all.
#[derive(Debug, Error)]
#[error("extraction payload unreadable: {reason}")]
pub struct ExtractionFailed {
    pub reason: String,
    /// The payload as received, preserved for the flagged record
    pub raw: String,
}

/// Validated record shape produced from one extraction response.
#[derive(Debug, Clone, Default)]
pub struct ExtractedReceipt {
    pub vendor_name: Option<String>,
    pub vendor_city: Option<String>,
    pub vendor_state: Option<String>,
    /// Normalized YYYY-MM-DD; anything unparseable becomes None
    pub purchase_date: Option<String>,
    pub subtotal_cents: Option<i64>,
    pub tax_cents: Option<i64>,
    pub total_cents: Option<i64>,
    pub payment_method: Option<String>,
    /// The service's category suggestion, fed to the reconciliation cascade
    pub category_hint: Option<String>,
    pub line_items: Vec<ExtractedLineItem>,
    /// Verbatim payload, persisted for audit
    pub raw_payload: String,
}

#[derive(Debug, Clone)]
pub struct ExtractedLineItem {
    pub item_name: String,
    pub quantity: f64,
    pub unit_cents: Option<i64>,
    pub extended_cents: Option<i64>,
}

/// Strip markdown code fencing the service sometimes wraps around the JSON.
fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    trimmed
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn string_field(obj: &Value, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Monetary field to cents. Accepts JSON numbers and numeric-looking
/// strings ("42.17", "$42.17"); anything else is treated as unknown.
/// Missing stays None; zero is a valid amount, "unknown" is not.
fn money_field(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_f64().and_then(money::cents_from_f64),
        Value::String(s) => money::parse_cents(s),
        _ => None,
    }
}

fn quantity_field(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(q) if q.is_finite() && q > 0.0 => q,
        _ => 1.0,
    }
}

fn date_field(obj: &Value, key: &str) -> Option<String> {
    let raw = string_field(obj, key)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Parse and validate one raw extraction response.
pub fn structure_response(raw: &str) -> Result<ExtractedReceipt, ExtractionFailed> {
    let cleaned = strip_code_fences(raw);

    let parsed: Value = serde_json::from_str(&cleaned).map_err(|e| ExtractionFailed {
        reason: format!("not valid JSON: {}", e),
        raw: raw.to_string(),
    })?;

    if !parsed.is_object() {
        return Err(ExtractionFailed {
            reason: format!("expected a JSON object, got {}", json_kind(&parsed)),
            raw: raw.to_string(),
        });
    }

    let mut receipt = ExtractedReceipt {
        vendor_name: string_field(&parsed, "vendor_name"),
        vendor_city: string_field(&parsed, "vendor_city"),
        vendor_state: string_field(&parsed, "vendor_state"),
        purchase_date: date_field(&parsed, "purchase_date"),
        subtotal_cents: money_field(parsed.get("subtotal")),
        tax_cents: money_field(parsed.get("tax")),
        total_cents: money_field(parsed.get("total")),
        payment_method: string_field(&parsed, "payment_method"),
        category_hint: string_field(&parsed, "category"),
        line_items: Vec::new(),
        raw_payload: raw.to_string(),
    };

    // A missing total is recoverable when both parts are present.
    if receipt.total_cents.is_none() {
        if let (Some(subtotal), Some(tax)) = (receipt.subtotal_cents, receipt.tax_cents) {
            receipt.total_cents = subtotal.checked_add(tax);
        }
    }

    if let Some(items) = parsed.get("line_items").and_then(Value::as_array) {
        for item in items {
            if !item.is_object() {
                continue;
            }
            receipt.line_items.push(ExtractedLineItem {
                item_name: string_field(item, "item_name")
                    .unwrap_or_else(|| "Unknown item".to_string()),
                quantity: quantity_field(item.get("quantity")),
                unit_cents: money_field(item.get("unit_price")),
                extended_cents: money_field(item.get("extended_price")),
            });
        }
    }

    Ok(receipt)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

//! The intake pipeline
//!
//! Fetch → Extract → Structure → Reconcile → Persist, with every failure
//! short-circuiting into a flagged record. Nothing here is fatal: the worst
//! any stage can do is degrade the submission to "create a flagged record
//! and keep going."

use crate::conversation::StateTag;
use crate::config::ConfirmMode;
use crate::db::receipts::{self, NewLineItem, NewReceipt, RecordStatus};
use crate::db::reference;
use crate::db::workers::Worker;
use crate::services::reconcile;
use crate::services::media::{self, MIN_IMAGE_BYTES};
use crate::services::reply;
use crate::services::structurer;
use crate::types::InboundMessage;
use crate::AppState;
use fieldbook_common::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// What one pipeline run produced: the reply to send and where the
/// conversation goes next.
#[derive(Debug)]
pub struct IntakeOutcome {
    pub reply: String,
    pub next: StateTag,
    pub record_id: Option<i64>,
}

impl IntakeOutcome {
    fn idle(reply: String, record_id: i64) -> Self {
        Self {
            reply,
            next: StateTag::Idle,
            record_id: Some(record_id),
        }
    }
}

/// Run the full pipeline on an image submission.
pub async fn run_intake(
    state: &AppState,
    worker: &Worker,
    msg: &InboundMessage,
) -> Result<IntakeOutcome> {
    let Some(attachment) = msg.media.first() else {
        // Classification guarantees an attachment; degrade anyway.
        return Ok(IntakeOutcome {
            reply: reply::unrecognized(&worker.display_name),
            next: StateTag::Idle,
            record_id: None,
        });
    };
    let caption = Some(msg.body.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    // Stage 1: fetch the image from the gateway.
    let fetched = match state.fetcher.fetch(attachment).await {
        Ok(media) => media,
        Err(e) => {
            warn!(worker_id = worker.id, url = %attachment.url, error = %e, "Media retrieval failed");
            // The attachment URL is saved on the record for manual retry.
            let record_id = receipts::create_flagged(
                &state.db,
                worker.id,
                receipts::FLAG_DOWNLOAD_FAILED,
                Some(&attachment.url),
                caption.as_deref(),
                false,
            )
            .await?;
            return Ok(IntakeOutcome::idle(
                reply::download_failed(&worker.display_name),
                record_id,
            ));
        }
    };

    // Stage 2: persist the bytes before anything can go wrong downstream.
    let stored = match media::store_image(&state.config.media_dir(), &worker.display_name, &fetched)
    {
        Ok(stored) => stored,
        Err(e) => {
            warn!(worker_id = worker.id, error = %e, "Image storage failed");
            let record_id = receipts::create_flagged(
                &state.db,
                worker.id,
                receipts::FLAG_DOWNLOAD_FAILED,
                Some(&attachment.url),
                caption.as_deref(),
                false,
            )
            .await?;
            return Ok(IntakeOutcome::idle(
                reply::download_failed(&worker.display_name),
                record_id,
            ));
        }
    };

    let quality_prefix = if stored.byte_len < MIN_IMAGE_BYTES {
        info!(worker_id = worker.id, bytes = stored.byte_len, "Small image, quality advisory");
        format!("{}\n\n", reply::quality_warning())
    } else {
        String::new()
    };

    // Stage 3: external recognition call.
    let content_type = fetched.content_type.as_deref().unwrap_or("image/jpeg");
    let raw_response = match state.extractor.extract(&fetched.bytes, content_type).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(worker_id = worker.id, error = %e, "Extraction call failed");
            let record_id = flag_unreadable(&state.db, worker, &stored, caption.as_deref(), None)
                .await?;
            return Ok(IntakeOutcome::idle(
                format!("{}{}", quality_prefix, reply::could_not_read(&worker.display_name)),
                record_id,
            ));
        }
    };

    // Stage 4: structure and validate the untrusted payload.
    let extracted = match structurer::structure_response(&raw_response) {
        Ok(extracted) => extracted,
        Err(failed) => {
            warn!(worker_id = worker.id, reason = %failed.reason, "Extraction payload unreadable");
            let record_id = flag_unreadable(
                &state.db,
                worker,
                &stored,
                caption.as_deref(),
                Some(&failed.raw),
            )
            .await?;
            return Ok(IntakeOutcome::idle(
                format!("{}{}", quality_prefix, reply::could_not_read(&worker.display_name)),
                record_id,
            ));
        }
    };

    // Stage 5: reconcile against the reference lists.
    let projects = reference::active_projects(&state.db).await?;
    let project_match = caption
        .as_deref()
        .and_then(|c| reconcile::match_project(c, &projects));
    let project_unresolved = caption.is_some() && project_match.is_none();

    let categories = reference::active_categories(&state.db).await?;
    let category = reconcile::resolve_category(
        extracted.category_hint.as_deref(),
        extracted.vendor_name.as_deref(),
        &categories,
    );

    let duplicate_of = receipts::find_possible_duplicate(
        &state.db,
        worker.id,
        extracted.vendor_name.as_deref(),
        extracted.total_cents,
        extracted.purchase_date.as_deref(),
        Some(&stored.hash),
    )
    .await?;

    let (status, flag_reason) = if duplicate_of.is_some() {
        (RecordStatus::Flagged, Some(receipts::FLAG_POSSIBLE_DUPLICATE.to_string()))
    } else if project_unresolved {
        (RecordStatus::Flagged, Some(receipts::FLAG_PROJECT_UNRESOLVED.to_string()))
    } else {
        (RecordStatus::Pending, None)
    };

    // Stage 6: persist record + line items in one transaction.
    let new_receipt = NewReceipt {
        worker_id: worker.id,
        project_id: project_match.as_ref().map(|m| m.project_id),
        matched_project_name: caption.clone(),
        project_match_score: project_match.as_ref().map(|m| m.score),
        category_id: category.as_ref().map(|c| c.id),
        vendor_name: extracted.vendor_name.clone(),
        vendor_city: extracted.vendor_city.clone(),
        vendor_state: extracted.vendor_state.clone(),
        purchase_date: extracted.purchase_date.clone(),
        subtotal_cents: extracted.subtotal_cents,
        tax_cents: extracted.tax_cents,
        total_cents: extracted.total_cents,
        payment_method: extracted.payment_method.clone(),
        image_path: Some(stored.path.clone()),
        image_hash: Some(stored.hash.clone()),
        raw_extraction: Some(extracted.raw_payload.clone()),
        status: Some(status),
        flag_reason,
        duplicate_of,
    };
    let items: Vec<NewLineItem> = extracted
        .line_items
        .iter()
        .map(|item| NewLineItem {
            item_name: item.item_name.clone(),
            quantity: item.quantity,
            unit_cents: item.unit_cents,
            extended_cents: item.extended_cents,
        })
        .collect();

    let record_id = receipts::insert_receipt_with_items(&state.db, &new_receipt, &items).await?;

    // A YES/NO round-trip only makes sense for a clean pending record;
    // flagged ones are already routed to review.
    let wants_confirmation =
        status == RecordStatus::Pending && state.config.confirm_mode == ConfirmMode::ConfirmRequired;
    let summary_mode = if wants_confirmation {
        ConfirmMode::ConfirmRequired
    } else {
        ConfirmMode::AutoAccept
    };

    let project_label = project_match.as_ref().map(|m| m.name.as_str());
    let mut text = format!(
        "{}{}",
        quality_prefix,
        reply::receipt_summary(&extracted, &worker.display_name, project_label, summary_mode)
    );
    if duplicate_of.is_some() {
        text.push('\n');
        text.push_str(&reply::duplicate_warning());
    }

    info!(
        record_id,
        worker_id = worker.id,
        vendor = extracted.vendor_name.as_deref().unwrap_or("?"),
        status = status.as_str(),
        project = project_label.unwrap_or("-"),
        "Intake pipeline complete"
    );

    Ok(IntakeOutcome {
        reply: text,
        next: if wants_confirmation {
            StateTag::AwaitingConfirmation
        } else {
            StateTag::Idle
        },
        record_id: Some(record_id),
    })
}

/// Create the flagged "could not read" record shared by the extraction
/// failure paths. The raw payload, when there is one, is preserved.
async fn flag_unreadable(
    pool: &SqlitePool,
    worker: &Worker,
    stored: &crate::types::StoredImage,
    caption: Option<&str>,
    raw_payload: Option<&str>,
) -> Result<i64> {
    let receipt = NewReceipt {
        worker_id: worker.id,
        matched_project_name: caption.map(str::to_string),
        image_path: Some(stored.path.clone()),
        image_hash: Some(stored.hash.clone()),
        raw_extraction: raw_payload.map(str::to_string),
        status: Some(RecordStatus::Flagged),
        flag_reason: Some(receipts::FLAG_UNREADABLE.to_string()),
        ..Default::default()
    };
    receipts::insert_receipt_with_items(pool, &receipt, &[]).await
}

/// Start the guided missed-receipt flow: create the flagged no-image
/// record and ask for the four fields.
pub async fn begin_missed_receipt(
    pool: &SqlitePool,
    worker: &Worker,
    body: &str,
) -> Result<(i64, String)> {
    let record_id = receipts::create_flagged(
        pool,
        worker.id,
        receipts::FLAG_MISSED_RECEIPT,
        None,
        None,
        true,
    )
    .await?;
    receipts::append_context_text(pool, record_id, "missed_intro_text", body).await?;
    Ok((record_id, reply::missed_receipt_prompt(&worker.display_name)))
}

/// Preserve rejected-extraction free text on the record.
pub async fn store_manual_entry(
    pool: &SqlitePool,
    worker: &Worker,
    record_id: i64,
    body: &str,
) -> Result<String> {
    receipts::append_context_text(pool, record_id, "manual_entry_text", body).await?;
    receipts::flag(pool, record_id, receipts::FLAG_MANUAL_ENTRY).await?;
    info!(record_id, worker_id = worker.id, "Manual entry stored");
    Ok(reply::manual_entry_saved(&worker.display_name))
}

/// Best-effort capture of the guided missed-receipt fields.
pub async fn store_missed_details(
    pool: &SqlitePool,
    worker: &Worker,
    record_id: i64,
    body: &str,
) -> Result<String> {
    let details = crate::services::guided::parse_missed_details(body);

    let project_match = match details.project.as_deref() {
        Some(caption) => {
            let projects = reference::active_projects(pool).await?;
            reconcile::match_project(caption, &projects)
        }
        None => None,
    };

    receipts::update_missed_details(
        pool,
        record_id,
        details.store.as_deref(),
        details.amount_cents,
        project_match.as_ref().map(|m| m.project_id),
        details.project.as_deref(),
    )
    .await?;
    receipts::append_context_text(pool, record_id, "missed_details_text", body).await?;
    if let Some(items) = details.items.as_deref() {
        receipts::append_context_text(pool, record_id, "missed_items_text", items).await?;
    }

    info!(record_id, worker_id = worker.id, "Missed-receipt details captured");
    Ok(reply::missed_details_saved(&worker.display_name))
}

/// YES reply: accept the record.
pub async fn confirm_record(pool: &SqlitePool, worker: &Worker, record_id: i64) -> Result<String> {
    receipts::mark_confirmed(pool, record_id).await?;
    info!(record_id, worker_id = worker.id, "Record confirmed by submitter");
    Ok(reply::confirmed(&worker.display_name))
}

/// NO reply: flag the record and ask for retake-or-text.
pub async fn reject_record(pool: &SqlitePool, worker: &Worker, record_id: i64) -> Result<String> {
    receipts::flag(pool, record_id, receipts::FLAG_REJECTED_EXTRACTION).await?;
    info!(record_id, worker_id = worker.id, "Record rejected by submitter");
    Ok(reply::rejected(&worker.display_name))
}

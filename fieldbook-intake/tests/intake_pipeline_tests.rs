//! End-to-end pipeline tests driving the conversation router with stub
//! media and extraction services against a real (temp-file) database.

mod helpers;

use fieldbook_intake::config::ConfirmMode;
use fieldbook_intake::conversation::router::handle_message;
use fieldbook_intake::conversation::StateTag;
use fieldbook_intake::db::receipts::{
    line_item_count, FLAG_DOWNLOAD_FAILED, FLAG_MANUAL_ENTRY, FLAG_MISSED_DETAILS,
    FLAG_PROJECT_UNRESOLVED, FLAG_REJECTED_EXTRACTION, FLAG_UNREADABLE,
};
use fieldbook_intake::db::conversation::load_state;
use helpers::*;

const OMAR: &str = "+14075551234";

#[tokio::test]
async fn valid_submission_creates_pending_record_end_to_end() {
    let h = harness(
        ConfirmMode::AutoAccept,
        true,
        StubExtractor::payloads(&[home_depot_payload()]),
    )
    .await;
    seed_projects(&h.pool, &["Sparrow", "Falcon", "Hawk"]).await;
    let worker_id = register_worker(&h.pool, OMAR, "Omar").await;

    let reply = handle_message(
        &h.state,
        &photo_msg("SM001", OMAR, "Sparrow", "https://gw.example/m/1"),
    )
    .await
    .unwrap()
    .expect("worker should get a reply");

    assert!(reply.contains("Home Depot, Kissimmee FL — 02/18/26 — $42.17"), "got: {reply}");
    assert!(reply.contains("Project: Sparrow"));
    assert!(reply.contains("has been logged"));

    let records = receipts_for_worker(&h.pool, worker_id).await;
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.status, "pending");
    assert_eq!(record.total_cents, Some(4217));
    // total = subtotal + tax
    assert_eq!(
        record.total_cents,
        Some(record.subtotal_cents.unwrap() + record.tax_cents.unwrap())
    );
    assert_eq!(record.matched_project_name.as_deref(), Some("Sparrow"));
    assert!(record.project_id.is_some());
    assert!(record.project_match_score.unwrap() >= 0.85);
    assert_eq!(record.category_id, Some(category_id(&h.pool, "Materials").await));
    assert!(record.image_path.is_some());
    assert!(record.raw_extraction.is_some());
    assert_eq!(line_item_count(&h.pool, record.id).await.unwrap(), 2);

    let convo = load_state(&h.pool, worker_id).await.unwrap();
    assert_eq!(convo.tag, StateTag::Idle);
}

#[tokio::test]
async fn misspelled_caption_resolves_to_closest_project() {
    let h = harness(
        ConfirmMode::AutoAccept,
        true,
        StubExtractor::payloads(&[home_depot_payload()]),
    )
    .await;
    seed_projects(&h.pool, &["Sparrow", "Falcon"]).await;
    let worker_id = register_worker(&h.pool, OMAR, "Omar").await;

    let reply = handle_message(
        &h.state,
        &photo_msg("SM002", OMAR, "Sparow", "https://gw.example/m/2"),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(reply.contains("Project: Sparrow"));

    let record = &receipts_for_worker(&h.pool, worker_id).await[0];
    assert_eq!(record.status, "pending");
    assert!(record.project_id.is_some());
    // The raw caption is retained alongside the match
    assert_eq!(record.matched_project_name.as_deref(), Some("Sparow"));
}

#[tokio::test]
async fn unmatched_caption_leaves_project_unresolved_and_flags() {
    let h = harness(
        ConfirmMode::AutoAccept,
        true,
        StubExtractor::payloads(&[home_depot_payload()]),
    )
    .await;
    seed_projects(&h.pool, &["Sparrow", "Falcon"]).await;
    let worker_id = register_worker(&h.pool, OMAR, "Omar").await;

    handle_message(
        &h.state,
        &photo_msg("SM003", OMAR, "Zzqx", "https://gw.example/m/3"),
    )
    .await
    .unwrap();

    let record = &receipts_for_worker(&h.pool, worker_id).await[0];
    assert_eq!(record.project_id, None);
    assert_eq!(record.status, "flagged");
    assert_eq!(record.flag_reason.as_deref(), Some(FLAG_PROJECT_UNRESOLVED));
    assert_eq!(record.matched_project_name.as_deref(), Some("Zzqx"));
}

#[tokio::test]
async fn malformed_payload_still_creates_flagged_record() {
    let h = harness(
        ConfirmMode::AutoAccept,
        true,
        StubExtractor::payloads(&["I can't make out this receipt, sorry."]),
    )
    .await;
    let worker_id = register_worker(&h.pool, OMAR, "Omar").await;

    let reply = handle_message(
        &h.state,
        &photo_msg("SM004", OMAR, "", "https://gw.example/m/4"),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(reply.contains("couldn't read that receipt"));

    let records = receipts_for_worker(&h.pool, worker_id).await;
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.status, "flagged");
    assert_eq!(record.flag_reason.as_deref(), Some(FLAG_UNREADABLE));
    assert_eq!(line_item_count(&h.pool, record.id).await.unwrap(), 0);
    // The unreadable payload is preserved verbatim for review
    assert_eq!(
        record.raw_extraction.as_deref(),
        Some("I can't make out this receipt, sorry.")
    );
}

#[tokio::test]
async fn extraction_outage_degrades_to_flagged_record() {
    let h = harness(ConfirmMode::AutoAccept, true, StubExtractor::failing()).await;
    let worker_id = register_worker(&h.pool, OMAR, "Omar").await;

    let reply = handle_message(
        &h.state,
        &photo_msg("SM005", OMAR, "", "https://gw.example/m/5"),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(reply.contains("couldn't read that receipt"));

    let record = &receipts_for_worker(&h.pool, worker_id).await[0];
    assert_eq!(record.status, "flagged");
    assert_eq!(record.flag_reason.as_deref(), Some(FLAG_UNREADABLE));
    assert!(record.image_path.is_some());
}

#[tokio::test]
async fn media_download_failure_is_recorded_not_lost() {
    let h = harness_with_fetcher(
        ConfirmMode::AutoAccept,
        true,
        StubExtractor::payloads(&[home_depot_payload()]),
        std::sync::Arc::new(StubFetcher { fail: true }),
    )
    .await;
    let worker_id = register_worker(&h.pool, OMAR, "Omar").await;

    let reply = handle_message(
        &h.state,
        &photo_msg("SM006", OMAR, "Sparrow", "https://gw.example/m/6"),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(reply.contains("trouble downloading"));

    let record = &receipts_for_worker(&h.pool, worker_id).await[0];
    assert_eq!(record.status, "flagged");
    assert_eq!(record.flag_reason.as_deref(), Some(FLAG_DOWNLOAD_FAILED));
    // The gateway URL is saved on the record for manual retry
    assert_eq!(record.image_path.as_deref(), Some("https://gw.example/m/6"));
}

#[tokio::test]
async fn confirmation_flow_yes_accepts_the_record() {
    let h = harness(
        ConfirmMode::ConfirmRequired,
        true,
        StubExtractor::payloads(&[home_depot_payload()]),
    )
    .await;
    let worker_id = register_worker(&h.pool, OMAR, "Omar").await;

    let reply = handle_message(
        &h.state,
        &photo_msg("SM010", OMAR, "", "https://gw.example/m/10"),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(reply.contains("Reply YES to save or NO to flag"));

    let convo = load_state(&h.pool, worker_id).await.unwrap();
    assert_eq!(convo.tag, StateTag::AwaitingConfirmation);
    let record_id = convo.record_id.unwrap();

    let reply = handle_message(&h.state, &text_msg("SM011", OMAR, "YES"))
        .await
        .unwrap()
        .unwrap();
    assert!(reply.contains("Saved!"));

    let record = fieldbook_intake::db::receipts::get_receipt(&h.pool, record_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, "confirmed");
    assert!(record.confirmed_at.is_some());
    assert_eq!(load_state(&h.pool, worker_id).await.unwrap().tag, StateTag::Idle);
}

#[tokio::test]
async fn confirmation_flow_nope_flags_and_opens_manual_entry() {
    let h = harness(
        ConfirmMode::ConfirmRequired,
        true,
        StubExtractor::payloads(&[home_depot_payload()]),
    )
    .await;
    let worker_id = register_worker(&h.pool, OMAR, "Omar").await;

    handle_message(
        &h.state,
        &photo_msg("SM012", OMAR, "", "https://gw.example/m/12"),
    )
    .await
    .unwrap();
    let record_id = load_state(&h.pool, worker_id).await.unwrap().record_id.unwrap();

    let reply = handle_message(&h.state, &text_msg("SM013", OMAR, "NOPE"))
        .await
        .unwrap()
        .unwrap();
    assert!(reply.contains("Send a clearer photo"));

    let record = fieldbook_intake::db::receipts::get_receipt(&h.pool, record_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, "flagged");
    assert_eq!(record.flag_reason.as_deref(), Some(FLAG_REJECTED_EXTRACTION));

    let convo = load_state(&h.pool, worker_id).await.unwrap();
    assert_eq!(convo.tag, StateTag::AwaitingManualEntry);
    assert_eq!(convo.record_id, Some(record_id));

    // Free text lands on the record and the conversation idles.
    handle_message(
        &h.state,
        &text_msg("SM014", OMAR, "Home Depot, $42.17, lumber, Sparrow job"),
    )
    .await
    .unwrap();

    let record = fieldbook_intake::db::receipts::get_receipt(&h.pool, record_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.flag_reason.as_deref(), Some(FLAG_MANUAL_ENTRY));
    assert!(record.context.as_deref().unwrap().contains("manual_entry_text"));
    assert_eq!(load_state(&h.pool, worker_id).await.unwrap().tag, StateTag::Idle);
}

#[tokio::test]
async fn unclear_reply_during_confirmation_reprompts() {
    let h = harness(
        ConfirmMode::ConfirmRequired,
        true,
        StubExtractor::payloads(&[home_depot_payload()]),
    )
    .await;
    let worker_id = register_worker(&h.pool, OMAR, "Omar").await;

    handle_message(
        &h.state,
        &photo_msg("SM015", OMAR, "", "https://gw.example/m/15"),
    )
    .await
    .unwrap();

    let reply = handle_message(&h.state, &text_msg("SM016", OMAR, "maybe??"))
        .await
        .unwrap()
        .unwrap();
    assert!(reply.contains("reply YES to save or NO"));
    assert_eq!(
        load_state(&h.pool, worker_id).await.unwrap().tag,
        StateTag::AwaitingConfirmation
    );
}

#[tokio::test]
async fn fresh_image_during_confirmation_runs_independently() {
    let shell_payload = r#"{
        "vendor_name": "Shell",
        "purchase_date": "2026-02-19",
        "total": 18.50,
        "line_items": []
    }"#;
    let h = harness(
        ConfirmMode::ConfirmRequired,
        true,
        StubExtractor::payloads(&[home_depot_payload(), shell_payload]),
    )
    .await;
    let worker_id = register_worker(&h.pool, OMAR, "Omar").await;

    handle_message(
        &h.state,
        &photo_msg("SM020", OMAR, "", "https://gw.example/m/20"),
    )
    .await
    .unwrap();
    let first_record = load_state(&h.pool, worker_id).await.unwrap().record_id.unwrap();

    // A brand-new receipt image while awaiting confirmation is a fresh run.
    handle_message(
        &h.state,
        &photo_msg("SM021", OMAR, "", "https://gw.example/m/21"),
    )
    .await
    .unwrap();

    let records = receipts_for_worker(&h.pool, worker_id).await;
    assert_eq!(records.len(), 2);

    // The first record was neither consumed nor altered by the second run.
    let first = records.iter().find(|r| r.id == first_record).unwrap();
    assert_eq!(first.status, "pending");

    let convo = load_state(&h.pool, worker_id).await.unwrap();
    assert_eq!(convo.tag, StateTag::AwaitingConfirmation);
    assert_ne!(convo.record_id, Some(first_record));
}

#[tokio::test]
async fn missed_receipt_flow_captures_guided_details() {
    let h = harness(ConfirmMode::AutoAccept, true, StubExtractor::failing()).await;
    seed_projects(&h.pool, &["Sparrow"]).await;
    let worker_id = register_worker(&h.pool, OMAR, "Omar").await;

    let reply = handle_message(
        &h.state,
        &text_msg("SM030", OMAR, "I didn't get a receipt for the diesel"),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(reply.contains("the store, the amount"));

    let convo = load_state(&h.pool, worker_id).await.unwrap();
    assert_eq!(convo.tag, StateTag::AwaitingMissedDetails);
    let record_id = convo.record_id.unwrap();

    let reply = handle_message(
        &h.state,
        &text_msg("SM031", OMAR, "Shell station, $45.20, diesel, project Sparrow"),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(reply.contains("flagged it for review"));

    let record = fieldbook_intake::db::receipts::get_receipt(&h.pool, record_id)
        .await
        .unwrap()
        .unwrap();
    assert!(record.is_missed_receipt);
    assert_eq!(record.status, "flagged");
    assert_eq!(record.flag_reason.as_deref(), Some(FLAG_MISSED_DETAILS));
    assert_eq!(record.vendor_name.as_deref(), Some("Shell station"));
    assert_eq!(record.total_cents, Some(4520));
    assert!(record.project_id.is_some());
    assert_eq!(load_state(&h.pool, worker_id).await.unwrap().tag, StateTag::Idle);
}

#[tokio::test]
async fn category_cascade_suggestion_then_keyword_then_fallback() {
    let suggested = r#"{"vendor_name": "Bob's Widgets", "purchase_date": "2026-03-01",
                        "total": 10.00, "category": "Fuel", "line_items": []}"#;
    let keyword = r#"{"vendor_name": "Sunoco 441", "purchase_date": "2026-03-02",
                      "total": 20.00, "line_items": []}"#;
    let neither = r#"{"vendor_name": "Joe's Place", "purchase_date": "2026-03-03",
                      "total": 30.00, "line_items": []}"#;

    let h = harness(
        ConfirmMode::AutoAccept,
        true,
        StubExtractor::payloads(&[suggested, keyword, neither]),
    )
    .await;
    let worker_id = register_worker(&h.pool, OMAR, "Omar").await;

    for (i, url) in ["a", "b", "c"].iter().enumerate() {
        handle_message(
            &h.state,
            &photo_msg(&format!("SM04{}", i), OMAR, "", &format!("https://gw.example/m/{}", url)),
        )
        .await
        .unwrap();
    }

    let records = receipts_for_worker(&h.pool, worker_id).await;
    assert_eq!(records.len(), 3);
    let fuel = category_id(&h.pool, "Fuel").await;
    let other = category_id(&h.pool, "Other").await;
    // Suggestion beats the (non-matching) vendor name
    assert_eq!(records[0].category_id, Some(fuel));
    // No suggestion: the fuel-retailer keyword resolves it
    assert_eq!(records[1].category_id, Some(fuel));
    // Neither: the designated fallback
    assert_eq!(records[2].category_id, Some(other));
}

#[tokio::test]
async fn resending_the_same_image_is_flagged_as_duplicate() {
    let h = harness(
        ConfirmMode::AutoAccept,
        true,
        StubExtractor::payloads(&[home_depot_payload(), home_depot_payload()]),
    )
    .await;
    let worker_id = register_worker(&h.pool, OMAR, "Omar").await;

    handle_message(
        &h.state,
        &photo_msg("SM050", OMAR, "", "https://gw.example/m/50"),
    )
    .await
    .unwrap();
    // Same attachment URL → same stub bytes → same content hash.
    let reply = handle_message(
        &h.state,
        &photo_msg("SM051", OMAR, "", "https://gw.example/m/50"),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(reply.contains("already sent"));

    let records = receipts_for_worker(&h.pool, worker_id).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, "pending");
    assert_eq!(records[1].status, "flagged");
    assert_eq!(records[1].duplicate_of, Some(records[0].id));
}

#[tokio::test]
async fn whitelist_mode_silences_unknown_senders() {
    let h = harness(ConfirmMode::AutoAccept, false, StubExtractor::failing()).await;

    let reply = handle_message(&h.state, &text_msg("SM060", "+15550001111", "hello?"))
        .await
        .unwrap();
    assert_eq!(reply, None);
    assert_eq!(worker_count(&h.pool).await, 0);

    let (queued,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM unknown_contacts")
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(queued, 1);
}

#[tokio::test]
async fn first_contact_with_introduction_registers_by_name() {
    let h = harness(ConfirmMode::AutoAccept, true, StubExtractor::failing()).await;

    let reply = handle_message(&h.state, &text_msg("SM061", "+15550002222", "This is Omar"))
        .await
        .unwrap()
        .unwrap();
    assert!(reply.contains("Welcome to Fieldbook, Omar"));

    let worker = fieldbook_intake::db::workers::lookup_by_contact(&h.pool, "+15550002222")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(worker.display_name, "Omar");
}

#[tokio::test]
async fn first_contact_without_name_gets_the_one_shot_name_exchange() {
    let h = harness(ConfirmMode::AutoAccept, true, StubExtractor::failing()).await;
    let sender = "+15550003333";

    let reply = handle_message(&h.state, &text_msg("SM062", sender, "hey"))
        .await
        .unwrap()
        .unwrap();
    assert!(reply.contains("What's your name"));

    let reply = handle_message(&h.state, &text_msg("SM063", sender, "Rosa"))
        .await
        .unwrap()
        .unwrap();
    assert!(reply.contains("Welcome to Fieldbook, Rosa"));

    let worker = fieldbook_intake::db::workers::lookup_by_contact(&h.pool, sender)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(worker.display_name, "Rosa");
    // Idempotent on the contact: still a single row
    assert_eq!(worker_count(&h.pool).await, 1);
}

#[tokio::test]
async fn duplicate_gateway_delivery_is_a_noop() {
    let h = harness(
        ConfirmMode::AutoAccept,
        true,
        StubExtractor::payloads(&[home_depot_payload(), home_depot_payload()]),
    )
    .await;
    let worker_id = register_worker(&h.pool, OMAR, "Omar").await;

    let msg = photo_msg("SM070", OMAR, "", "https://gw.example/m/70");
    let first = handle_message(&h.state, &msg).await.unwrap();
    assert!(first.is_some());

    // The gateway retries the same message id.
    let second = handle_message(&h.state, &msg).await.unwrap();
    assert_eq!(second, None);

    assert_eq!(receipts_for_worker(&h.pool, worker_id).await.len(), 1);
}

#[tokio::test]
async fn inactive_worker_is_silenced() {
    let h = harness(ConfirmMode::AutoAccept, true, StubExtractor::failing()).await;
    let worker_id = register_worker(&h.pool, OMAR, "Omar").await;
    sqlx::query("UPDATE workers SET is_active = 0 WHERE id = ?")
        .bind(worker_id)
        .execute(&h.pool)
        .await
        .unwrap();

    let reply = handle_message(&h.state, &text_msg("SM080", OMAR, "hello"))
        .await
        .unwrap();
    assert_eq!(reply, None);
}

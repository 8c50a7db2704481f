//! Message routing
//!
//! The orchestrator behind the webhook: identifies the sender, serializes
//! their transitions, classifies the message, runs the pure transition
//! function, applies the resulting actions, and commits the new state with
//! compare-and-swap. Returns the reply text, or None when the sender gets
//! silence.

use crate::conversation::transition::{transition, Action, Classified, NextState};
use crate::conversation::StateTag;
use crate::db::{conversation as convo_db, messages, workers};
use crate::db::workers::{Worker, PLACEHOLDER_NAME};
use crate::services::{intake, reply};
use crate::types::InboundMessage;
use crate::AppState;
use fieldbook_common::{Error, Result};
use tracing::{info, warn};

/// Handle one inbound gateway message end to end.
pub async fn handle_message(state: &AppState, msg: &InboundMessage) -> Result<Option<String>> {
    // Gateway retries of an already-claimed id are acknowledged and dropped.
    if !messages::claim_message_id(&state.db, &msg.message_id).await? {
        info!(message_id = %msg.message_id, "Duplicate gateway delivery ignored");
        return Ok(None);
    }

    let contact = workers::normalize_contact(&msg.sender);

    // Serialize everything for this sender, registration included, so a
    // rapid second message waits for the first transition to commit.
    let lock = state.sender_lock(&contact).await;
    let _guard = lock.lock().await;

    let mut flow_msg: Option<InboundMessage> = None;
    let (worker, greeting) = match workers::lookup_by_contact(&state.db, &contact).await? {
        Some(worker) => (worker, None),
        None => {
            if !state.config.auto_register {
                messages::log_unknown_contact(&state.db, &contact, &msg.body, msg.has_media())
                    .await?;
                return Ok(None);
            }
            let (worker, greeting, intro_consumed) =
                register_new_sender(state, &contact, msg).await?;
            // Start at the rest state. An intro without a submission is
            // consumed by registration; a photo falls through to intake.
            convo_db::load_state(&state.db, worker.id).await?;
            if !msg.has_media() && !state.patterns.is_missed_receipt_phrase(&msg.body) {
                return Ok(Some(greeting.unwrap_or_default()));
            }
            if intro_consumed {
                // "This is Omar" + photo: the text named the sender, not a
                // project. Don't let it reach the caption matcher.
                flow_msg = Some(InboundMessage {
                    body: String::new(),
                    ..msg.clone()
                });
            }
            (worker, greeting)
        }
    };
    let msg = flow_msg.as_ref().unwrap_or(msg);

    if !worker.is_active {
        info!(worker_id = worker.id, contact = %contact, "Inactive worker attempted contact");
        return Ok(None);
    }

    let mut worker = worker;
    let convo = convo_db::load_state(&state.db, worker.id).await?;

    // One-shot name exchange: a placeholder-named worker's plain text is
    // their introduction, not a conversation trigger.
    if worker.has_placeholder_name() && !msg.has_media() {
        if let Some(name) = state.patterns.extract_introduced_name(&msg.body) {
            workers::set_display_name(&state.db, worker.id, &name).await?;
            worker.display_name = name.clone();
            if convo.tag == StateTag::Idle {
                return Ok(Some(reply::welcome(&name)));
            }
        }
    }

    let classified = classify(state, msg);
    let step = transition(&convo, &classified, state.config.confirm_mode);

    let (reply_text, next_tag, next_record) = apply_actions(state, &worker, msg, &step.actions).await?;

    let resolved = match step.next {
        NextState::Fixed(tag) => (tag, fixed_record_for(tag, &step.actions, next_record)),
        // The pipeline already decided based on mode and outcome.
        NextState::AfterIntake => (next_tag, next_record),
    };

    match convo_db::save_state(&state.db, worker.id, convo.version, resolved.0, resolved.1, None)
        .await
    {
        Ok(()) => {}
        Err(Error::Conflict(detail)) => {
            // Should not happen under the sender lock; refuse to clobber.
            warn!(worker_id = worker.id, detail = %detail, "Transition lost a concurrent write");
            return Ok(Some(reply::in_progress(&worker.display_name)));
        }
        Err(e) => return Err(e),
    }

    match greeting {
        Some(greeting) if reply_text.is_empty() => Ok(Some(greeting)),
        Some(greeting) => Ok(Some(format!("{}\n\n{}", greeting, reply_text))),
        None if reply_text.is_empty() => Ok(None),
        None => Ok(Some(reply_text)),
    }
}

fn classify(state: &AppState, msg: &InboundMessage) -> Classified {
    Classified {
        has_image: msg.has_media(),
        affirmative: state.patterns.is_affirmative(&msg.body),
        negative: state.patterns.is_negative(&msg.body),
        missed_phrase: state.patterns.is_missed_receipt_phrase(&msg.body),
    }
}

/// Register an unknown sender on first contact.
///
/// With a recognizable introduction the worker is registered by name and
/// welcomed; otherwise they get a placeholder row and are asked who they
/// are. Either way the message continues through the normal flow when it
/// carries a submission.
async fn register_new_sender(
    state: &AppState,
    contact: &str,
    msg: &InboundMessage,
) -> Result<(Worker, Option<String>, bool)> {
    let introduced = state.patterns.extract_introduced_name(&msg.body);
    let name = introduced.as_deref().unwrap_or(PLACEHOLDER_NAME);
    let worker = workers::register(&state.db, contact, name).await?;

    let greeting = if worker.has_placeholder_name() {
        reply::ask_name()
    } else {
        reply::welcome(&worker.display_name)
    };
    Ok((worker, Some(greeting), introduced.is_some()))
}

/// Record reference carried into the next state, for the fixed-target
/// transitions that keep pointing at an in-flight record.
fn fixed_record_for(tag: StateTag, actions: &[Action], created: Option<i64>) -> Option<i64> {
    match tag {
        StateTag::AwaitingManualEntry => actions.iter().find_map(|a| match a {
            Action::RejectRecord { record_id } => Some(*record_id),
            _ => None,
        }),
        StateTag::AwaitingConfirmation => actions.iter().find_map(|a| match a {
            Action::RepromptConfirmation { record_id } => Some(*record_id),
            _ => None,
        }),
        StateTag::AwaitingMissedDetails => created,
        StateTag::Idle => None,
    }
}

/// Apply the actions the transition produced. Returns the composed reply,
/// and for `RunIntake` the state and record the pipeline resolved to.
async fn apply_actions(
    state: &AppState,
    worker: &Worker,
    msg: &InboundMessage,
    actions: &[Action],
) -> Result<(String, StateTag, Option<i64>)> {
    let mut reply_text = String::new();
    let mut next_tag = StateTag::Idle;
    let mut next_record = None;

    for action in actions {
        let text = match action {
            Action::RunIntake => {
                let outcome = intake::run_intake(state, worker, msg).await?;
                next_tag = outcome.next;
                next_record = if outcome.next == StateTag::AwaitingConfirmation {
                    outcome.record_id
                } else {
                    None
                };
                outcome.reply
            }
            Action::BeginMissedReceipt => {
                let (record_id, text) =
                    intake::begin_missed_receipt(&state.db, worker, &msg.body).await?;
                next_record = Some(record_id);
                text
            }
            Action::ConfirmRecord { record_id } => {
                intake::confirm_record(&state.db, worker, *record_id).await?
            }
            Action::RejectRecord { record_id } => {
                intake::reject_record(&state.db, worker, *record_id).await?
            }
            Action::StoreManualEntry { record_id } => {
                intake::store_manual_entry(&state.db, worker, *record_id, &msg.body).await?
            }
            Action::StoreMissedDetails { record_id } => {
                intake::store_missed_details(&state.db, worker, *record_id, &msg.body).await?
            }
            Action::RepromptConfirmation { .. } => reply::confirm_reprompt(&worker.display_name),
            Action::ReplyUnrecognized => reply::unrecognized(&worker.display_name),
        };

        if !text.is_empty() {
            if !reply_text.is_empty() {
                reply_text.push_str("\n\n");
            }
            reply_text.push_str(&text);
        }
    }

    Ok((reply_text, next_tag, next_record))
}

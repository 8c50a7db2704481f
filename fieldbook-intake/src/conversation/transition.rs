//! The transition function
//!
//! Pure core of the state machine: given the current state and a classified
//! message, produce the next state and the actions the caller must apply.
//! No I/O happens here, which is what makes the full transition table
//! testable without a database.

use crate::config::ConfirmMode;
use crate::conversation::state::{ConvoState, StateTag};

/// A message reduced to the traits the transition table cares about.
///
/// Classification (via [`MessagePatterns`](super::MessagePatterns)) happens
/// once in the router; the transition function never sees raw text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Classified {
    pub has_image: bool,
    pub affirmative: bool,
    pub negative: bool,
    pub missed_phrase: bool,
}

/// Side effects the caller must apply, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run the full intake pipeline on the attached image
    RunIntake,
    /// Create a flagged missed-receipt record and prompt for details
    BeginMissedReceipt,
    /// Mark the in-flight record accepted, timestamped
    ConfirmRecord { record_id: i64 },
    /// Mark the in-flight record rejected-by-submitter and ask for
    /// retake-or-text
    RejectRecord { record_id: i64 },
    /// Preserve the free text on the rejected record and flag it for review
    StoreManualEntry { record_id: i64 },
    /// Best-effort parse the guided missed-receipt fields into the record
    StoreMissedDetails { record_id: i64 },
    /// Re-send the YES/NO prompt; the reply matched neither
    RepromptConfirmation { record_id: i64 },
    /// Nothing matched in idle; send the generic pointer
    ReplyUnrecognized,
}

/// Where the conversation goes after the actions are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextState {
    Fixed(StateTag),
    /// The intake pipeline decides: `AwaitingConfirmation` on a successful
    /// extraction in confirm mode, `Idle` otherwise (including every
    /// failure path).
    AfterIntake,
}

/// One transition: the next state plus the actions that produce it.
#[derive(Debug, Clone)]
pub struct Step {
    pub next: NextState,
    pub actions: Vec<Action>,
}

impl Step {
    fn fixed(next: StateTag, actions: Vec<Action>) -> Self {
        Self {
            next: NextState::Fixed(next),
            actions,
        }
    }
}

/// The transition table.
///
/// An attached image starts a fresh, independent intake run from any state:
/// a worker sitting in `awaiting_confirmation` (or asked for manual text)
/// who sends a new photo is submitting, not replying, and the pending
/// record must neither block nor absorb the new one.
pub fn transition(current: &ConvoState, msg: &Classified, _mode: ConfirmMode) -> Step {
    if msg.has_image {
        return Step {
            next: NextState::AfterIntake,
            actions: vec![Action::RunIntake],
        };
    }

    match (current.tag, current.record_id) {
        (StateTag::AwaitingConfirmation, Some(record_id)) => {
            if msg.affirmative {
                Step::fixed(StateTag::Idle, vec![Action::ConfirmRecord { record_id }])
            } else if msg.negative {
                Step::fixed(
                    StateTag::AwaitingManualEntry,
                    vec![Action::RejectRecord { record_id }],
                )
            } else {
                Step::fixed(
                    StateTag::AwaitingConfirmation,
                    vec![Action::RepromptConfirmation { record_id }],
                )
            }
        }
        (StateTag::AwaitingManualEntry, Some(record_id)) => Step::fixed(
            StateTag::Idle,
            vec![Action::StoreManualEntry { record_id }],
        ),
        (StateTag::AwaitingMissedDetails, Some(record_id)) => Step::fixed(
            StateTag::Idle,
            vec![Action::StoreMissedDetails { record_id }],
        ),
        // Idle, or an awaiting state whose record reference was lost:
        // treat as idle free text rather than erroring.
        _ => {
            if msg.missed_phrase {
                Step::fixed(
                    StateTag::AwaitingMissedDetails,
                    vec![Action::BeginMissedReceipt],
                )
            } else {
                Step::fixed(StateTag::Idle, vec![Action::ReplyUnrecognized])
            }
        }
    }
}

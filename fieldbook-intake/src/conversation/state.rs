//! Conversation state representation

use serde_json::Value;

/// The closed set of conversation states.
///
/// `Idle` is the rest state between submissions and is reachable from every
/// other state. An unknown stored tag deserializes to `Idle` rather than
/// failing: a corrupt row must never strand a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTag {
    Idle,
    /// A record summary went out and the worker owes a YES/NO reply
    AwaitingConfirmation,
    /// The worker rejected the extraction and owes retake-or-text details
    AwaitingManualEntry,
    /// The worker reported a missing receipt and owes the guided fields
    AwaitingMissedDetails,
}

impl StateTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateTag::Idle => "idle",
            StateTag::AwaitingConfirmation => "awaiting_confirmation",
            StateTag::AwaitingManualEntry => "awaiting_manual_entry",
            StateTag::AwaitingMissedDetails => "awaiting_missed_details",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "awaiting_confirmation" => StateTag::AwaitingConfirmation,
            "awaiting_manual_entry" => StateTag::AwaitingManualEntry,
            "awaiting_missed_details" => StateTag::AwaitingMissedDetails,
            _ => StateTag::Idle,
        }
    }
}

/// One worker's current conversation state, as read from its versioned row.
#[derive(Debug, Clone)]
pub struct ConvoState {
    pub tag: StateTag,
    /// In-flight record the state refers to, if any
    pub record_id: Option<i64>,
    /// Opaque context blob for multi-turn flows
    pub context: Option<Value>,
    /// Optimistic-concurrency token; incremented on every committed write
    pub version: i64,
}

impl ConvoState {
    pub fn idle() -> Self {
        Self {
            tag: StateTag::Idle,
            record_id: None,
            context: None,
            version: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for tag in [
            StateTag::Idle,
            StateTag::AwaitingConfirmation,
            StateTag::AwaitingManualEntry,
            StateTag::AwaitingMissedDetails,
        ] {
            assert_eq!(StateTag::parse(tag.as_str()), tag);
        }
    }

    #[test]
    fn unknown_tag_falls_back_to_idle() {
        assert_eq!(StateTag::parse("awaiting_language"), StateTag::Idle);
        assert_eq!(StateTag::parse(""), StateTag::Idle);
    }
}

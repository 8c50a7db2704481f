//! Per-worker conversation state machine
//!
//! `state` defines the closed state set and the versioned row shape,
//! `patterns` the pluggable free-text matchers, `transition` the pure
//! (side-effect free) transition function, and `router` the orchestrator
//! that applies the resulting actions against the database and services.

pub mod patterns;
pub mod router;
pub mod state;
pub mod transition;

pub use patterns::{DefaultPatterns, MessagePatterns};
pub use state::{ConvoState, StateTag};
pub use transition::{transition, Action, Classified, NextState, Step};

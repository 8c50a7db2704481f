//! Database access for fieldbook-intake
//!
//! Schema creation lives in `fieldbook_common::db::init`; the modules here
//! are the typed operations the pipeline performs against it.

pub mod audit;
pub mod conversation;
pub mod messages;
pub mod receipts;
pub mod reference;
pub mod workers;

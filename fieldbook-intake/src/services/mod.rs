//! Intake pipeline services
//!
//! Each stage of Fetch → Extract → Structure → Reconcile → Persist lives in
//! its own module; `intake` chains them and maps every failure into the
//! appropriate flagged-record path.

pub mod extraction;
pub mod guided;
pub mod intake;
pub mod media;
pub mod reconcile;
pub mod reply;
pub mod structurer;

pub use extraction::{ExtractError, ReceiptExtractor, VisionExtractor};
pub use media::{GatewayMediaFetcher, MediaError, MediaFetcher};
pub use structurer::{ExtractedLineItem, ExtractedReceipt, ExtractionFailed};

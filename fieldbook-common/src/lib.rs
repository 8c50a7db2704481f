//! Shared library for fieldbook services
//!
//! Holds the pieces every fieldbook module needs: the common error type,
//! configuration resolution, database initialization, and the integral-cents
//! money representation.

pub mod config;
pub mod db;
pub mod error;
pub mod money;

pub use error::{Error, Result};

//! SiteCheck Common Library
//!
//! Shared domain types for the SiteCheck engine and its command-line front end.

pub mod types;

pub use types::*;

/// SiteCheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

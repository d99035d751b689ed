//! Shared utility functions.
//!
//! This module contains reusable utilities used across the codebase:
//! - `text`: whitespace/company-name normalization and tokenization
//! - `time`: UTC clock and RFC3339 formatting
//! - `ids`: opaque run/session identifiers

pub mod ids;
pub mod text;
pub mod time;

//! # PCV Common Library
//!
//! Shared code for the packed content verifier:
//! - Error type used by library code
//! - Configuration loading and root folder resolution
//! - Result record model and database initialization
//! - Live session channels and their SSE rendering
//! - Timestamp utilities

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};

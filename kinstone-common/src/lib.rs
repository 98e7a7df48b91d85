//! # Kinstone Common Library
//!
//! Shared code for the Kinstone fusion service:
//! - Error taxonomy
//! - Data model (pieces, inventory entries, fusion records, rewards)
//! - Configuration loading
//! - Database pool creation, schema and migrations

pub mod config;
pub mod db;
pub mod error;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, ErrorKind, Result};

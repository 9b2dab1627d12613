//! # POSLens Common Library
//!
//! Shared code for the POSLens analytics workspace including:
//! - Database schema management and row models
//! - Common error type
//! - Configuration loading (database path resolution)
//! - Calendar/timezone utilities used by every aggregation job

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};

//! # POSLens Analytics Engine
//!
//! The aggregation and materialization core: transforms the append-only
//! transaction fact table into query-ready pre-aggregates per tenant and
//! serves dashboard queries from either the pre-aggregates or the raw
//! facts.
//!
//! - `rollup` — the four derived-table builders (menu item rollups,
//!   hourly summaries, branch summaries, item pairs)
//! - `refresh` — the per-tenant refresh orchestrator and audit trail
//! - `query` — stateless parameterized dashboard reads
//! - `exclusion` — the single exclusion-resolution interface
//! - `facts` — read access to the fact store
//!
//! Callers are expected to have authorized the tenant before invoking
//! anything here; tenant identifiers arrive as opaque parameters.

pub mod error;
pub mod exclusion;
pub mod facts;
pub mod query;
pub mod refresh;
pub mod rollup;
pub mod tenants;

pub use error::{Error, Result};

//! Derived-table builders
//!
//! Each builder owns exactly one derived table and fully recomputes it
//! for one tenant per refresh: delete the tenant's rows, insert the new
//! generation, all inside one transaction. A failed builder rolls back
//! and leaves the previous generation intact.

pub mod branch;
pub mod hourly;
pub mod menu_items;
pub mod pairs;

use serde::{Deserialize, Serialize};

/// Rows deleted and inserted by one builder run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub rows_deleted: u64,
    pub rows_inserted: u64,
}

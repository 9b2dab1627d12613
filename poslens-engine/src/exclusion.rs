//! Exclusion resolution
//!
//! Two exclusion signals exist: a per-transaction `excluded` flag and
//! the tenant's named-item registry (`excluded_items`). This module is
//! the one place that combines them: a row is excluded if either signal
//! says so. Every builder and query path consults this resolver —
//! nothing re-derives exclusion semantics on its own.
//!
//! Registry item names are stored lowercased so the in-memory check and
//! the SQL fragment used by fact scans agree on case-insensitive
//! matching.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::debug;

/// One registry entry, as returned by [`list_excluded_items`]
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExcludedItem {
    pub item_name: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Resolved exclusion state for one tenant, loaded once per job
#[derive(Debug, Clone)]
pub struct ExclusionFilter {
    names: HashSet<String>,
}

impl ExclusionFilter {
    /// Load the tenant's registry
    pub async fn load(pool: &SqlitePool, tenant_id: &str) -> Result<Self> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT item_name FROM excluded_items WHERE tenant_id = ?")
                .bind(tenant_id)
                .fetch_all(pool)
                .await?;

        debug!(tenant_id = %tenant_id, entries = names.len(), "Loaded exclusion registry");

        Ok(Self {
            names: names.into_iter().collect(),
        })
    }

    /// An empty filter (registry has no entries)
    pub fn empty() -> Self {
        Self {
            names: HashSet::new(),
        }
    }

    /// Union of both exclusion signals
    pub fn is_excluded(&self, row_flag: bool, item_name: &str) -> bool {
        row_flag || self.names.contains(&item_name.to_lowercase())
    }

    /// Number of registry entries
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Add an item to the tenant's exclusion registry
///
/// Takes effect at the next refresh; it does not trigger one.
pub async fn add_excluded_item(
    pool: &SqlitePool,
    tenant_id: &str,
    item_name: &str,
    reason: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO excluded_items (tenant_id, item_name, reason) VALUES (?, ?, ?)",
    )
    .bind(tenant_id)
    .bind(item_name.to_lowercase())
    .bind(reason)
    .execute(pool)
    .await?;

    Ok(())
}

/// Remove an item from the registry; returns whether an entry existed
pub async fn remove_excluded_item(
    pool: &SqlitePool,
    tenant_id: &str,
    item_name: &str,
) -> Result<bool> {
    let result = sqlx::query("DELETE FROM excluded_items WHERE tenant_id = ? AND item_name = ?")
        .bind(tenant_id)
        .bind(item_name.to_lowercase())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// List the tenant's registry entries
pub async fn list_excluded_items(pool: &SqlitePool, tenant_id: &str) -> Result<Vec<ExcludedItem>> {
    let items = sqlx::query_as::<_, ExcludedItem>(
        "SELECT item_name, reason, created_at FROM excluded_items WHERE tenant_id = ? ORDER BY item_name",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_flag_alone_excludes() {
        let filter = ExclusionFilter::empty();
        assert!(filter.is_excluded(true, "Coffee"));
        assert!(!filter.is_excluded(false, "Coffee"));
    }

    #[test]
    fn registry_membership_is_case_insensitive() {
        let filter = ExclusionFilter {
            names: ["staff meal".to_string()].into_iter().collect(),
        };
        assert!(filter.is_excluded(false, "Staff Meal"));
        assert!(filter.is_excluded(false, "STAFF MEAL"));
        assert!(!filter.is_excluded(false, "Staff Meals"));
    }

    #[test]
    fn either_signal_suffices() {
        let filter = ExclusionFilter {
            names: ["voided".to_string()].into_iter().collect(),
        };
        assert!(filter.is_excluded(true, "Coffee"));
        assert!(filter.is_excluded(false, "Voided"));
    }
}

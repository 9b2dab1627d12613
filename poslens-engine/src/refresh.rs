//! Refresh Orchestrator
//!
//! Sequences the four derived-table builders for one tenant. Refreshes
//! for different tenants run fully in parallel; a tenant's own refresh
//! is serialized through a per-tenant lock, so a second request queues
//! behind the one in flight rather than interleaving delete+insert
//! passes on the same tables.
//!
//! Every run is recorded in refresh_runs: running on entry, then
//! succeeded or failed with per-table row counts. Readers of the derived
//! tables see the last completed refresh — the read path is eventually
//! consistent with live transaction writes by design.

use crate::error::{Error, Result};
use crate::rollup::{branch, hourly, menu_items, pairs, TableCounts};
use crate::tenants::get_tenant;
use chrono::{DateTime, Utc};
use poslens_common::db::models::RefreshRun;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

const DEFAULT_REFRESH_TIMEOUT_MS: i64 = 120_000;

/// Outcome of one tenant refresh
#[derive(Debug, Clone, Serialize)]
pub struct RefreshResult {
    pub run_id: String,
    pub tenant_id: String,
    pub menu_item_rollups: TableCounts,
    pub hourly_summaries: TableCounts,
    pub branch_summaries: TableCounts,
    pub item_pairs: TableCounts,
    pub duration_ms: u64,
}

/// Owns the per-tenant refresh locks
#[derive(Default)]
pub struct RefreshCoordinator {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    async fn tenant_lock(&self, tenant_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run a full refresh of all derived tables for one tenant
    ///
    /// The four builders run concurrently; each one's delete+insert is
    /// a single transaction, so a failing builder leaves its table's
    /// previous generation intact.
    pub async fn run_tenant_refresh(
        &self,
        pool: &SqlitePool,
        tenant_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<RefreshResult> {
        let tenant = get_tenant(pool, tenant_id).await?;

        let lock = self.tenant_lock(tenant_id).await;
        let _guard = lock.lock().await;

        let run_id = Uuid::new_v4().to_string();
        insert_run(pool, &run_id, tenant_id).await?;

        let budget_ms = poslens_common::db::get_setting_i64(
            pool,
            "refresh_timeout_ms",
            DEFAULT_REFRESH_TIMEOUT_MS,
        )
        .await? as u64;

        info!(tenant_id = %tenant_id, run_id = %run_id, "Starting tenant refresh");
        let started = Instant::now();

        let work = async {
            tokio::join!(
                menu_items::rebuild(pool, &tenant, as_of),
                hourly::rebuild(pool, &tenant, as_of),
                branch::rebuild(pool, &tenant, as_of),
                pairs::rebuild(pool, &tenant, as_of),
            )
        };

        let outcome = tokio::time::timeout(std::time::Duration::from_millis(budget_ms), work).await;

        let (rollups, hourly, branches, item_pairs) = match outcome {
            Ok(results) => results,
            Err(_) => {
                let err = Error::Timeout { budget_ms };
                finalize_run(pool, &run_id, "failed", "{}", Some(&err.to_string())).await?;
                error!(tenant_id = %tenant_id, run_id = %run_id, budget_ms, "Refresh timed out");
                return Err(err);
            }
        };

        let mut counts: HashMap<&str, TableCounts> = HashMap::new();
        let mut failure: Option<(&str, Error)> = None;
        for (table, result) in [
            ("menu_item_rollups", rollups),
            ("hourly_summaries", hourly),
            ("branch_summaries", branches),
            ("item_pairs", item_pairs),
        ] {
            match result {
                Ok(table_counts) => {
                    counts.insert(table, table_counts);
                }
                Err(e) => {
                    if failure.is_none() {
                        failure = Some((table, e));
                    }
                }
            }
        }

        let counts_json = serde_json::to_string(&counts).unwrap_or_else(|_| "{}".to_string());

        if let Some((table, source)) = failure {
            let err = Error::Refresh {
                table: table.to_string(),
                source: Box::new(source),
            };
            finalize_run(pool, &run_id, "failed", &counts_json, Some(&err.to_string())).await?;
            error!(tenant_id = %tenant_id, run_id = %run_id, table = %table, "Refresh failed");
            return Err(err);
        }

        finalize_run(pool, &run_id, "succeeded", &counts_json, None).await?;

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            tenant_id = %tenant_id,
            run_id = %run_id,
            duration_ms,
            "Tenant refresh completed"
        );

        Ok(RefreshResult {
            run_id,
            tenant_id: tenant_id.to_string(),
            menu_item_rollups: counts["menu_item_rollups"],
            hourly_summaries: counts["hourly_summaries"],
            branch_summaries: counts["branch_summaries"],
            item_pairs: counts["item_pairs"],
            duration_ms,
        })
    }
}

async fn insert_run(pool: &SqlitePool, run_id: &str, tenant_id: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO refresh_runs (guid, tenant_id, state, started_at) VALUES (?, ?, 'running', ?)",
    )
    .bind(run_id)
    .bind(tenant_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

async fn finalize_run(
    pool: &SqlitePool,
    run_id: &str,
    state: &str,
    counts_json: &str,
    error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE refresh_runs SET state = ?, table_counts = ?, error = ?, finished_at = ? WHERE guid = ?",
    )
    .bind(state)
    .bind(counts_json)
    .bind(error)
    .bind(Utc::now())
    .bind(run_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Most recent refresh run for a tenant, if any
pub async fn last_run(pool: &SqlitePool, tenant_id: &str) -> Result<Option<RefreshRun>> {
    let run = sqlx::query_as::<_, RefreshRun>(
        "SELECT guid, tenant_id, state, table_counts, error, started_at, finished_at \
         FROM refresh_runs WHERE tenant_id = ? ORDER BY started_at DESC LIMIT 1",
    )
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?;

    Ok(run)
}

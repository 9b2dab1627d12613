//! Read access to the transaction fact table
//!
//! The engine consumes the fact store, it does not own it: everything
//! here is a filtered scan except [`rollback_batch`], which removes an
//! import batch wholesale via its batch identifier.
//!
//! Date filters are tenant-local calendar dates (buckets are local), so
//! scans apply a coarse UTC bound in SQL and the exact local-date filter
//! in Rust after the one UTC-to-local conversion.

use crate::error::Result;
use crate::exclusion::ExclusionFilter;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use poslens_common::db::models::FactRow;
use poslens_common::time::local_date;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

/// Filter shape shared by every fact scan
#[derive(Debug, Clone, Default)]
pub struct FactFilter {
    /// Inclusive tenant-local start date
    pub from: Option<NaiveDate>,
    /// Inclusive tenant-local end date
    pub to: Option<NaiveDate>,
    pub branches: Vec<String>,
    pub categories: Vec<String>,
}

/// Fetch non-excluded fact rows for a tenant
///
/// Applies the per-row flag in SQL and the named-item registry through
/// the [`ExclusionFilter`] resolver, so both exclusion signals are
/// honored on every scan.
pub async fn fetch_facts(
    pool: &SqlitePool,
    tenant_id: &str,
    filter: &FactFilter,
    tz: Tz,
) -> Result<Vec<FactRow>> {
    let exclusions = ExclusionFilter::load(pool, tenant_id).await?;

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT receipt_id, item_name, category, branch, quantity, unit_price, \
         gross_revenue, sold_at, excluded FROM transactions WHERE tenant_id = ",
    );
    qb.push_bind(tenant_id.to_string());
    qb.push(" AND excluded = 0");

    // Coarse UTC bounds; a local date can reach at most one day across
    // the UTC boundary in either direction
    if let Some(from) = filter.from {
        let lo = Utc.from_utc_datetime(
            &(from - Duration::days(1))
                .and_hms_opt(0, 0, 0)
                .unwrap_or_default(),
        );
        qb.push(" AND sold_at >= ");
        qb.push_bind(lo);
    }
    if let Some(to) = filter.to {
        let hi = Utc.from_utc_datetime(
            &(to + Duration::days(2))
                .and_hms_opt(0, 0, 0)
                .unwrap_or_default(),
        );
        qb.push(" AND sold_at < ");
        qb.push_bind(hi);
    }

    if !filter.branches.is_empty() {
        qb.push(" AND branch IN (");
        let mut sep = qb.separated(", ");
        for branch in &filter.branches {
            sep.push_bind(branch.clone());
        }
        sep.push_unseparated(")");
    }
    if !filter.categories.is_empty() {
        qb.push(" AND category IN (");
        let mut sep = qb.separated(", ");
        for category in &filter.categories {
            sep.push_bind(category.clone());
        }
        sep.push_unseparated(")");
    }

    qb.push(" ORDER BY sold_at, receipt_id, item_name");

    let mut rows: Vec<FactRow> = qb.build_query_as().fetch_all(pool).await?;

    rows.retain(|row| {
        if exclusions.is_excluded(row.excluded, &row.item_name) {
            return false;
        }
        let date = local_date(row.sold_at, tz);
        if let Some(from) = filter.from {
            if date < from {
                return false;
            }
        }
        if let Some(to) = filter.to {
            if date > to {
                return false;
            }
        }
        true
    });

    Ok(rows)
}

/// Delete every transaction belonging to an import batch
///
/// Returns the number of rows removed. Derived tables are not touched;
/// the caller is expected to refresh the tenant afterwards.
pub async fn rollback_batch(pool: &SqlitePool, tenant_id: &str, batch_id: &str) -> Result<u64> {
    let result =
        sqlx::query("DELETE FROM transactions WHERE tenant_id = ? AND import_batch_id = ?")
            .bind(tenant_id)
            .bind(batch_id)
            .execute(pool)
            .await?;

    tracing::info!(
        tenant_id = %tenant_id,
        batch_id = %batch_id,
        rows = result.rows_affected(),
        "Rolled back import batch"
    );

    Ok(result.rows_affected())
}

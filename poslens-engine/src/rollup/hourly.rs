//! Hourly Summary Builder
//!
//! Buckets every non-excluded transaction into (local date, local hour,
//! branch, category) using the tenant's configured timezone. The
//! UTC-to-local conversion happens exactly once, in
//! `poslens_common::time::local_parts` — SQLite never sees a timezone.
//! The sum of all bucket revenues for a date range equals the sum of
//! non-excluded transactions in that range.

use crate::error::Result;
use crate::facts::{self, FactFilter};
use crate::rollup::TableCounts;
use crate::tenants::tenant_tz;
use chrono::{DateTime, NaiveDate, Utc};
use poslens_common::db::models::Tenant;
use poslens_common::time::local_parts;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tracing::info;

/// Coarse category normalization carried on every bucket
pub fn macro_category(category: &str) -> &'static str {
    const BEVERAGE: &[&str] = &[
        "beverage", "beverages", "drink", "drinks", "coffee", "tea", "juice", "juices",
        "smoothie", "smoothies", "soda", "beer", "wine", "cocktail", "cocktails",
    ];
    let lowered = category.trim().to_lowercase();
    if lowered.is_empty() || lowered == "uncategorized" || lowered == "other" || lowered == "misc" {
        "other"
    } else if BEVERAGE.contains(&lowered.as_str()) {
        "beverage"
    } else {
        "food"
    }
}

#[derive(Default)]
struct Bucket {
    day_of_week: u32,
    revenue: i64,
    quantity: i64,
    line_count: i64,
}

/// Rebuild the tenant's hourly_summaries table
pub async fn rebuild(
    pool: &SqlitePool,
    tenant: &Tenant,
    _as_of: DateTime<Utc>,
) -> Result<TableCounts> {
    let tz = tenant_tz(tenant);
    let rows = facts::fetch_facts(pool, &tenant.guid, &FactFilter::default(), tz).await?;

    // (date, hour, branch, category) -> totals; BTreeMap keeps the
    // insert order deterministic across refreshes
    let mut buckets: BTreeMap<(NaiveDate, u32, String, String), Bucket> = BTreeMap::new();
    for row in &rows {
        let parts = local_parts(row.sold_at, tz);
        let bucket = buckets
            .entry((parts.date, parts.hour, row.branch.clone(), row.category.clone()))
            .or_default();
        bucket.day_of_week = parts.weekday;
        bucket.revenue += row.gross_revenue;
        bucket.quantity += row.quantity;
        bucket.line_count += 1;
    }

    let mut tx = pool.begin().await?;

    let deleted = sqlx::query("DELETE FROM hourly_summaries WHERE tenant_id = ?")
        .bind(&tenant.guid)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let inserted = buckets.len() as u64;
    for ((date, hour, branch, category), bucket) in &buckets {
        sqlx::query(
            r#"
            INSERT INTO hourly_summaries (
                tenant_id, date, hour, day_of_week, branch, category,
                macro_category, revenue, quantity, line_count
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tenant.guid)
        .bind(date)
        .bind(*hour as i64)
        .bind(bucket.day_of_week as i64)
        .bind(branch)
        .bind(category)
        .bind(macro_category(category))
        .bind(bucket.revenue)
        .bind(bucket.quantity)
        .bind(bucket.line_count)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!(
        tenant_id = %tenant.guid,
        rows_deleted = deleted,
        rows_inserted = inserted,
        "Rebuilt hourly summaries"
    );

    Ok(TableCounts {
        rows_deleted: deleted,
        rows_inserted: inserted,
    })
}

//! Branch Summary Builder
//!
//! Produces three independently keyed granularities (daily, weekly,
//! monthly) per branch from one pass over the fact rows. Each summary
//! row embeds its ranked top-10 item list and category breakdown as
//! JSON columns, so dashboard reads never join against per-item detail.

use crate::error::Result;
use crate::facts::{self, FactFilter};
use crate::rollup::TableCounts;
use crate::tenants::tenant_tz;
use chrono::{DateTime, NaiveDate, Utc};
use poslens_common::db::models::{CategoryTotals, Tenant, TopItem};
use poslens_common::time::{div_round, local_date, month_start, week_start};
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashSet};
use tracing::info;

/// How many items each summary row ranks
const TOP_ITEMS: usize = 10;

const PERIOD_TYPES: [&str; 3] = ["daily", "weekly", "monthly"];

#[derive(Default)]
struct PeriodAccum {
    revenue: i64,
    transaction_count: i64,
    receipts: HashSet<String>,
    // item name -> (quantity, revenue)
    items: BTreeMap<String, (i64, i64)>,
    categories: BTreeMap<String, CategoryTotals>,
}

/// Rank a period's items: quantity, then revenue, then name
fn top_items(items: &BTreeMap<String, (i64, i64)>) -> Vec<TopItem> {
    let mut ranked: Vec<TopItem> = items
        .iter()
        .map(|(name, (quantity, revenue))| TopItem {
            name: name.clone(),
            quantity: *quantity,
            revenue: *revenue,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.quantity
            .cmp(&a.quantity)
            .then(b.revenue.cmp(&a.revenue))
            .then(a.name.cmp(&b.name))
    });
    ranked.truncate(TOP_ITEMS);
    ranked
}

/// Map a local sale date onto a period start for the given granularity
fn period_start(period_type: &str, date: NaiveDate) -> NaiveDate {
    match period_type {
        "weekly" => week_start(date),
        "monthly" => month_start(date),
        _ => date,
    }
}

/// Rebuild the tenant's branch_summaries table (all three granularities)
pub async fn rebuild(
    pool: &SqlitePool,
    tenant: &Tenant,
    _as_of: DateTime<Utc>,
) -> Result<TableCounts> {
    let tz = tenant_tz(tenant);
    let rows = facts::fetch_facts(pool, &tenant.guid, &FactFilter::default(), tz).await?;

    // (period_type, period_start, branch) -> accumulated totals
    let mut periods: BTreeMap<(&'static str, NaiveDate, String), PeriodAccum> = BTreeMap::new();
    for row in &rows {
        let date = local_date(row.sold_at, tz);
        for period_type in PERIOD_TYPES {
            let start = period_start(period_type, date);
            let accum = periods
                .entry((period_type, start, row.branch.clone()))
                .or_default();
            accum.revenue += row.gross_revenue;
            accum.transaction_count += 1;
            accum.receipts.insert(row.receipt_id.clone());
            let item = accum.items.entry(row.item_name.clone()).or_insert((0, 0));
            item.0 += row.quantity;
            item.1 += row.gross_revenue;
            let category = accum.categories.entry(row.category.clone()).or_default();
            category.revenue += row.gross_revenue;
            category.quantity += row.quantity;
        }
    }

    let mut tx = pool.begin().await?;

    let deleted = sqlx::query("DELETE FROM branch_summaries WHERE tenant_id = ?")
        .bind(&tenant.guid)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let inserted = periods.len() as u64;
    for ((period_type, start, branch), accum) in &periods {
        let receipt_count = accum.receipts.len() as i64;
        let avg_ticket = if receipt_count > 0 {
            div_round(accum.revenue, receipt_count)
        } else {
            0
        };
        let top_items_json = serde_json::to_string(&top_items(&accum.items))
            .map_err(|e| crate::error::Error::Compute(format!("top items encoding: {}", e)))?;
        let categories_json = serde_json::to_string(&accum.categories)
            .map_err(|e| crate::error::Error::Compute(format!("category encoding: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO branch_summaries (
                tenant_id, period_type, period_start, branch, revenue,
                transaction_count, receipt_count, avg_ticket, top_items,
                category_breakdown
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tenant.guid)
        .bind(period_type)
        .bind(start)
        .bind(branch)
        .bind(accum.revenue)
        .bind(accum.transaction_count)
        .bind(receipt_count)
        .bind(avg_ticket)
        .bind(top_items_json)
        .bind(categories_json)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!(
        tenant_id = %tenant.guid,
        rows_deleted = deleted,
        rows_inserted = inserted,
        "Rebuilt branch summaries"
    );

    Ok(TableCounts {
        rows_deleted: deleted,
        rows_inserted: inserted,
    })
}

//! Menu engineering listing and item performance summary
//!
//! Menu engineering reads the lifetime rollup table (date range and
//! branch/category filters do not apply to lifetime metrics and are
//! ignored). The performance summary is per-range and always scans the
//! facts, since the summary tables carry no per-item detail.

use super::{fetch_fact_rows, prepare, share_pct, with_budget, DateRange, QueryParams, QuerySource};
use crate::error::Result;
use chrono::{DateTime, Utc};
use poslens_common::db::models::MenuItemRollup;
use poslens_common::time::div_round;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Serialize)]
pub struct MenuEngineering {
    pub tenant_id: String,
    /// Rollup rows, highest revenue first
    pub items: Vec<MenuItemRollup>,
    /// Items per quadrant; empty when no quadrants were assigned
    pub quadrant_counts: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemStat {
    pub item_name: String,
    pub quantity: i64,
    pub revenue: i64,
    pub share_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    pub range: DateRange,
    pub source: QuerySource,
    pub total_revenue: i64,
    pub total_quantity: i64,
    pub receipt_count: i64,
    pub avg_ticket: i64,
    pub top_by_revenue: Vec<ItemStat>,
    pub top_by_quantity: Vec<ItemStat>,
}

const TOP_ITEMS: usize = 10;

pub async fn menu_engineering(
    pool: &SqlitePool,
    tenant_id: &str,
    params: &QueryParams,
    as_of: DateTime<Utc>,
) -> Result<MenuEngineering> {
    // prepare still validates the tenant and any range the caller sent
    let ctx = prepare(pool, tenant_id, params, as_of).await?;
    let budget_ms = ctx.budget_ms;

    with_budget(budget_ms, async {
        let items = sqlx::query_as::<_, MenuItemRollup>(
            "SELECT item_name, total_quantity, total_revenue, avg_price, order_count, \
             first_sale_date, last_sale_date, months_active, days_since_last_sale, \
             is_core_menu, is_current_menu, quadrant \
             FROM menu_item_rollups WHERE tenant_id = ? \
             ORDER BY total_revenue DESC, item_name",
        )
        .bind(&ctx.tenant.guid)
        .fetch_all(pool)
        .await?;

        let mut quadrant_counts: BTreeMap<String, i64> = BTreeMap::new();
        for item in &items {
            if let Some(quadrant) = &item.quadrant {
                *quadrant_counts.entry(quadrant.clone()).or_insert(0) += 1;
            }
        }

        Ok(MenuEngineering {
            tenant_id: ctx.tenant.guid.clone(),
            items,
            quadrant_counts,
        })
    })
    .await
}

pub async fn performance_summary(
    pool: &SqlitePool,
    tenant_id: &str,
    params: &QueryParams,
    as_of: DateTime<Utc>,
) -> Result<PerformanceSummary> {
    let ctx = prepare(pool, tenant_id, params, as_of).await?;
    let budget_ms = ctx.budget_ms;

    with_budget(budget_ms, async {
        let source = ctx.choose_source(pool, true, true).await?;
        let rows = fetch_fact_rows(pool, &ctx).await?;

        let total_revenue: i64 = rows.iter().map(|r| r.gross_revenue).sum();
        let total_quantity: i64 = rows.iter().map(|r| r.quantity).sum();
        let receipt_count = rows
            .iter()
            .map(|r| r.receipt_id.as_str())
            .collect::<HashSet<_>>()
            .len() as i64;

        // item -> (quantity, revenue)
        let mut items: BTreeMap<String, (i64, i64)> = BTreeMap::new();
        for row in &rows {
            let entry = items.entry(row.item_name.clone()).or_insert((0, 0));
            entry.0 += row.quantity;
            entry.1 += row.gross_revenue;
        }

        let stats: Vec<ItemStat> = items
            .into_iter()
            .map(|(item_name, (quantity, revenue))| ItemStat {
                item_name,
                quantity,
                revenue,
                share_pct: share_pct(revenue, total_revenue),
            })
            .collect();

        let mut top_by_revenue = stats.clone();
        top_by_revenue.sort_by(|a, b| {
            b.revenue
                .cmp(&a.revenue)
                .then_with(|| a.item_name.cmp(&b.item_name))
        });
        top_by_revenue.truncate(TOP_ITEMS);

        let mut top_by_quantity = stats;
        top_by_quantity.sort_by(|a, b| {
            b.quantity
                .cmp(&a.quantity)
                .then_with(|| a.item_name.cmp(&b.item_name))
        });
        top_by_quantity.truncate(TOP_ITEMS);

        Ok(PerformanceSummary {
            range: ctx.range,
            source,
            total_revenue,
            total_quantity,
            receipt_count,
            avg_ticket: if receipt_count > 0 {
                div_round(total_revenue, receipt_count)
            } else {
                0
            },
            top_by_revenue,
            top_by_quantity,
        })
    })
    .await
}

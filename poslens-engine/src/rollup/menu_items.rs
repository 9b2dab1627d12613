//! Menu Item Aggregator
//!
//! Produces one lifetime rollup row per (tenant, item) with a BCG-style
//! quadrant classification: each item's total quantity and average price
//! are compared against the tenant-wide medians. Medians are taken over
//! all non-excluded items (not core-menu-only). When the rollup set is
//! empty the median is undefined and quadrant assignment is skipped
//! entirely rather than raised as an error.

use crate::error::Result;
use crate::facts::{self, FactFilter};
use crate::rollup::TableCounts;
use crate::tenants::tenant_tz;
use chrono::{DateTime, NaiveDate, Utc};
use poslens_common::db::models::Tenant;
use poslens_common::time::{div_round, local_date, whole_months_between};
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// Months an item must have been on the menu to count as core
const CORE_MENU_MONTHS: i64 = 6;

/// Days since last sale within which an item is still "current"
const CURRENT_MENU_DAYS: i64 = 30;

/// Profitability/popularity classification relative to tenant medians
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    Star,
    Plowhorse,
    Puzzle,
    Dog,
}

impl Quadrant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quadrant::Star => "star",
            Quadrant::Plowhorse => "plowhorse",
            Quadrant::Puzzle => "puzzle",
            Quadrant::Dog => "dog",
        }
    }
}

/// Classify one item against the tenant medians
pub fn classify(quantity: i64, price: i64, median_quantity: i64, median_price: i64) -> Quadrant {
    match (quantity >= median_quantity, price >= median_price) {
        (true, true) => Quadrant::Star,
        (true, false) => Quadrant::Plowhorse,
        (false, true) => Quadrant::Puzzle,
        (false, false) => Quadrant::Dog,
    }
}

/// Median of a set of values; the mean of the two middle values for
/// even-sized sets. None when the set is empty.
pub fn median(values: &[i64]) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some(div_round(sorted[mid - 1] + sorted[mid], 2))
    }
}

struct ItemAccum {
    total_quantity: i64,
    total_revenue: i64,
    receipts: HashSet<String>,
    first_sale: NaiveDate,
    last_sale: NaiveDate,
}

struct RollupRow {
    item_name: String,
    total_quantity: i64,
    total_revenue: i64,
    avg_price: i64,
    order_count: i64,
    first_sale: NaiveDate,
    last_sale: NaiveDate,
    months_active: i64,
    days_since_last_sale: i64,
    is_core_menu: bool,
    is_current_menu: bool,
    quadrant: Option<Quadrant>,
}

/// Rebuild the tenant's menu_item_rollups table
pub async fn rebuild(
    pool: &SqlitePool,
    tenant: &Tenant,
    as_of: DateTime<Utc>,
) -> Result<TableCounts> {
    let tz = tenant_tz(tenant);
    let today = local_date(as_of, tz);

    let rows = facts::fetch_facts(pool, &tenant.guid, &FactFilter::default(), tz).await?;

    // Group by item name; BTreeMap keeps insert order deterministic
    let mut items: BTreeMap<String, ItemAccum> = BTreeMap::new();
    for row in &rows {
        let date = local_date(row.sold_at, tz);
        let entry = items.entry(row.item_name.clone()).or_insert(ItemAccum {
            total_quantity: 0,
            total_revenue: 0,
            receipts: HashSet::new(),
            first_sale: date,
            last_sale: date,
        });
        entry.total_quantity += row.quantity;
        entry.total_revenue += row.gross_revenue;
        entry.receipts.insert(row.receipt_id.clone());
        if date < entry.first_sale {
            entry.first_sale = date;
        }
        if date > entry.last_sale {
            entry.last_sale = date;
        }
    }

    let mut rollups: Vec<RollupRow> = items
        .into_iter()
        .map(|(item_name, accum)| {
            let avg_price = if accum.total_quantity > 0 {
                div_round(accum.total_revenue, accum.total_quantity)
            } else {
                0
            };
            let months_active = whole_months_between(accum.first_sale, accum.last_sale).max(1);
            let days_since_last_sale = (today - accum.last_sale).num_days();
            RollupRow {
                item_name,
                total_quantity: accum.total_quantity,
                total_revenue: accum.total_revenue,
                avg_price,
                order_count: accum.receipts.len() as i64,
                first_sale: accum.first_sale,
                last_sale: accum.last_sale,
                months_active,
                days_since_last_sale,
                is_core_menu: whole_months_between(accum.first_sale, accum.last_sale)
                    >= CORE_MENU_MONTHS,
                is_current_menu: days_since_last_sale <= CURRENT_MENU_DAYS,
                quadrant: None,
            }
        })
        .collect();

    // Quadrants are assigned to every row or to none: with an empty
    // rollup set the median is undefined, so classification is skipped
    let quantities: Vec<i64> = rollups.iter().map(|r| r.total_quantity).collect();
    let prices: Vec<i64> = rollups.iter().map(|r| r.avg_price).collect();
    match (median(&quantities), median(&prices)) {
        (Some(median_quantity), Some(median_price)) => {
            for rollup in &mut rollups {
                rollup.quadrant = Some(classify(
                    rollup.total_quantity,
                    rollup.avg_price,
                    median_quantity,
                    median_price,
                ));
            }
        }
        _ => {
            debug!(
                tenant_id = %tenant.guid,
                "Empty rollup set, skipping quadrant assignment"
            );
        }
    }

    let mut tx = pool.begin().await?;

    let deleted = sqlx::query("DELETE FROM menu_item_rollups WHERE tenant_id = ?")
        .bind(&tenant.guid)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    for rollup in &rollups {
        sqlx::query(
            r#"
            INSERT INTO menu_item_rollups (
                tenant_id, item_name, total_quantity, total_revenue, avg_price,
                order_count, first_sale_date, last_sale_date, months_active,
                days_since_last_sale, is_core_menu, is_current_menu, quadrant
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tenant.guid)
        .bind(&rollup.item_name)
        .bind(rollup.total_quantity)
        .bind(rollup.total_revenue)
        .bind(rollup.avg_price)
        .bind(rollup.order_count)
        .bind(rollup.first_sale)
        .bind(rollup.last_sale)
        .bind(rollup.months_active)
        .bind(rollup.days_since_last_sale)
        .bind(rollup.is_core_menu)
        .bind(rollup.is_current_menu)
        .bind(rollup.quadrant.map(|q| q.as_str()))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!(
        tenant_id = %tenant.guid,
        rows_deleted = deleted,
        rows_inserted = rollups.len(),
        "Rebuilt menu item rollups"
    );

    Ok(TableCounts {
        rows_deleted: deleted,
        rows_inserted: rollups.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_matches_quadrant_definitions() {
        // A: quantity=100, price=500 vs medians 75/750 -> Plowhorse
        assert_eq!(classify(100, 500, 75, 750), Quadrant::Plowhorse);
        // B: quantity=50, price=1000 -> Puzzle
        assert_eq!(classify(50, 1000, 75, 750), Quadrant::Puzzle);
        assert_eq!(classify(100, 1000, 75, 750), Quadrant::Star);
        assert_eq!(classify(50, 500, 75, 750), Quadrant::Dog);
    }

    #[test]
    fn classify_at_median_counts_as_high() {
        assert_eq!(classify(75, 750, 75, 750), Quadrant::Star);
    }

    #[test]
    fn median_odd_set() {
        assert_eq!(median(&[3, 1, 2]), Some(2));
    }

    #[test]
    fn median_even_set_averages_middles() {
        assert_eq!(median(&[1, 2, 3, 4]), Some(3)); // 2.5 rounds up
        assert_eq!(median(&[10, 20]), Some(15));
    }

    #[test]
    fn median_empty_is_none() {
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn median_single_value() {
        assert_eq!(median(&[7]), Some(7));
    }
}

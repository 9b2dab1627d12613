//! Pair Analyzer (market basket)
//!
//! Counting co-occurring item pairs is quadratic in items per receipt,
//! so every input is bounded: the analysis window is clamped to a
//! trailing maximum, line items are deduplicated to one (receipt, item)
//! tuple before pairing, receipts with an outsized distinct-item count
//! are skipped (they still count toward the support denominator), and
//! the output is frequency-filtered and capped before it is stored.
//!
//! Pairs are emitted with item_a strictly less than item_b, so no
//! self-pairs and no double-counted unordered pairs exist.

use crate::error::Result;
use crate::facts::{self, FactFilter};
use crate::rollup::TableCounts;
use crate::tenants::tenant_tz;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use poslens_common::db::models::{ItemPairRow, Tenant};
use poslens_common::time::local_date;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{info, warn};

/// Cost bounds for one analysis run, loaded from settings
#[derive(Debug, Clone, Copy)]
pub struct PairLimits {
    /// Maximum trailing window length in days
    pub window_days: i64,
    /// Minimum co-occurrence frequency for a pair to be reported
    pub min_frequency: i64,
    /// Maximum number of pairs reported, by descending frequency
    pub top_n: usize,
    /// Receipts with more distinct items than this are skipped
    pub max_receipt_items: usize,
}

impl Default for PairLimits {
    fn default() -> Self {
        Self {
            window_days: 90,
            min_frequency: 3,
            top_n: 50,
            max_receipt_items: 50,
        }
    }
}

/// Load analyzer bounds from the settings table
pub async fn load_limits(pool: &SqlitePool) -> Result<PairLimits> {
    let defaults = PairLimits::default();
    Ok(PairLimits {
        window_days: poslens_common::db::get_setting_i64(pool, "pair_window_days", defaults.window_days).await?,
        min_frequency: poslens_common::db::get_setting_i64(pool, "pair_min_frequency", defaults.min_frequency).await?,
        top_n: poslens_common::db::get_setting_i64(pool, "pair_top_n", defaults.top_n as i64).await? as usize,
        max_receipt_items: poslens_common::db::get_setting_i64(
            pool,
            "pair_max_receipt_items",
            defaults.max_receipt_items as i64,
        )
        .await? as usize,
    })
}

/// The clamped analysis window (inclusive tenant-local dates)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Clamp a requested window to at most `window_days` trailing days
///
/// A request longer than the cap keeps its end date and moves the start
/// forward to `end - window_days`.
pub fn clamp_window(
    requested_start: Option<NaiveDate>,
    end: NaiveDate,
    window_days: i64,
) -> PairWindow {
    let earliest = end - Duration::days(window_days);
    let start = match requested_start {
        Some(start) if start > earliest => start,
        _ => earliest,
    };
    PairWindow { start, end }
}

/// Result of one pair analysis run
#[derive(Debug, Clone)]
pub struct PairAnalysis {
    pub pairs: Vec<ItemPairRow>,
    /// Distinct receipts observed in the window (the support denominator)
    pub total_receipts: i64,
    pub window: PairWindow,
    pub skipped_receipts: u64,
}

/// Run the pair analysis over a clamped window
pub async fn analyze(
    pool: &SqlitePool,
    tenant: &Tenant,
    window: PairWindow,
    limits: &PairLimits,
) -> Result<PairAnalysis> {
    let tz = tenant_tz(tenant);
    let filter = FactFilter {
        from: Some(window.start),
        to: Some(window.end),
        ..FactFilter::default()
    };
    let rows = facts::fetch_facts(pool, &tenant.guid, &filter, tz).await?;

    // Deduplicate to one (receipt, item) tuple: a receipt may carry
    // multiple line items of the same name
    let mut receipts: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for row in &rows {
        receipts
            .entry(row.receipt_id.clone())
            .or_default()
            .insert(row.item_name.clone());
    }

    let total_receipts = receipts.len() as i64;
    let mut skipped_receipts = 0u64;
    let mut frequencies: HashMap<(String, String), i64> = HashMap::new();

    for items in receipts.values() {
        if items.len() > limits.max_receipt_items {
            // Still counted in total_receipts above
            skipped_receipts += 1;
            continue;
        }
        // BTreeSet iterates sorted, so a < b holds by construction
        let items: Vec<&String> = items.iter().collect();
        for i in 0..items.len() {
            for j in (i + 1)..items.len() {
                *frequencies
                    .entry((items[i].clone(), items[j].clone()))
                    .or_insert(0) += 1;
            }
        }
    }

    if skipped_receipts > 0 {
        warn!(
            tenant_id = %tenant.guid,
            skipped = skipped_receipts,
            max_items = limits.max_receipt_items,
            "Skipped oversized receipts during pair analysis"
        );
    }

    let mut pairs: Vec<ItemPairRow> = frequencies
        .into_iter()
        .filter(|(_, frequency)| *frequency >= limits.min_frequency)
        .map(|((item_a, item_b), frequency)| ItemPairRow {
            item_a,
            item_b,
            frequency,
            support: if total_receipts > 0 {
                frequency as f64 / total_receipts as f64
            } else {
                0.0
            },
            window_start: window.start,
            window_end: window.end,
        })
        .collect();

    pairs.sort_by(|a, b| {
        b.frequency
            .cmp(&a.frequency)
            .then_with(|| a.item_a.cmp(&b.item_a))
            .then_with(|| a.item_b.cmp(&b.item_b))
    });
    pairs.truncate(limits.top_n);

    Ok(PairAnalysis {
        pairs,
        total_receipts,
        window,
        skipped_receipts,
    })
}

/// Rebuild the tenant's item_pairs table over the default trailing window
pub async fn rebuild(
    pool: &SqlitePool,
    tenant: &Tenant,
    as_of: DateTime<Utc>,
) -> Result<TableCounts> {
    let tz = tenant_tz(tenant);
    let limits = load_limits(pool).await?;
    let window = clamp_window(None, local_date(as_of, tz), limits.window_days);
    let analysis = analyze(pool, tenant, window, &limits).await?;

    let mut tx = pool.begin().await?;

    let deleted = sqlx::query("DELETE FROM item_pairs WHERE tenant_id = ?")
        .bind(&tenant.guid)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    for pair in &analysis.pairs {
        sqlx::query(
            r#"
            INSERT INTO item_pairs (
                tenant_id, item_a, item_b, frequency, support,
                window_start, window_end
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tenant.guid)
        .bind(&pair.item_a)
        .bind(&pair.item_b)
        .bind(pair.frequency)
        .bind(pair.support)
        .bind(pair.window_start)
        .bind(pair.window_end)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!(
        tenant_id = %tenant.guid,
        rows_deleted = deleted,
        rows_inserted = analysis.pairs.len(),
        receipts = analysis.total_receipts,
        "Rebuilt item pairs"
    );

    Ok(TableCounts {
        rows_deleted: deleted,
        rows_inserted: analysis.pairs.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn clamp_caps_long_windows() {
        // A 200-day request keeps its end and loses its early start
        let window = clamp_window(Some(date(2025, 1, 1)), date(2025, 7, 20), 90);
        assert_eq!(window.end, date(2025, 7, 20));
        assert_eq!(window.start, date(2025, 7, 20) - Duration::days(90));
    }

    #[test]
    fn clamp_keeps_short_windows() {
        let window = clamp_window(Some(date(2025, 7, 1)), date(2025, 7, 20), 90);
        assert_eq!(window.start, date(2025, 7, 1));
        assert_eq!(window.end, date(2025, 7, 20));
    }

    #[test]
    fn clamp_defaults_to_full_window() {
        let window = clamp_window(None, date(2025, 7, 20), 90);
        assert_eq!(window.start, date(2025, 7, 20) - Duration::days(90));
    }
}

//! Frequently co-purchased item bundles
//!
//! Served from the precomputed item_pairs table when the caller asks
//! for the default window, otherwise by running the pair analysis live
//! (still clamped to the trailing window cap). Both paths carry support
//! as a fraction in [0, 1]; the percentage field is converted in
//! exactly one place here.

use super::{prepare, with_budget, DateRange, QueryParams};
use crate::error::Result;
use crate::rollup::pairs::{self, PairWindow};
use chrono::{DateTime, Utc};
use poslens_common::db::models::ItemPairRow;
use serde::Serialize;
use sqlx::SqlitePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleSource {
    Precomputed,
    Live,
}

#[derive(Debug, Clone, Serialize)]
pub struct Bundle {
    pub item_a: String,
    pub item_b: String,
    pub frequency: i64,
    /// Fraction of window receipts containing both items, in [0, 1]
    pub support: f64,
    /// The same value as a percentage, rounded to one decimal
    pub support_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Bundles {
    pub range: DateRange,
    pub source: BundleSource,
    pub bundles: Vec<Bundle>,
}

fn to_bundle(row: ItemPairRow) -> Bundle {
    Bundle {
        item_a: row.item_a,
        item_b: row.item_b,
        frequency: row.frequency,
        support: row.support,
        support_pct: (row.support * 1000.0).round() / 10.0,
    }
}

pub async fn bundles(
    pool: &SqlitePool,
    tenant_id: &str,
    params: &QueryParams,
    as_of: DateTime<Utc>,
) -> Result<Bundles> {
    let ctx = prepare(pool, tenant_id, params, as_of).await?;
    let budget_ms = ctx.budget_ms;

    with_budget(budget_ms, async {
        let limits = pairs::load_limits(pool).await?;

        if ctx.is_default_range {
            let rows = sqlx::query_as::<_, ItemPairRow>(
                "SELECT item_a, item_b, frequency, support, window_start, window_end \
                 FROM item_pairs WHERE tenant_id = ? \
                 ORDER BY frequency DESC, item_a, item_b",
            )
            .bind(&ctx.tenant.guid)
            .fetch_all(pool)
            .await?;

            if !rows.is_empty() {
                let range = DateRange {
                    from: rows[0].window_start,
                    to: rows[0].window_end,
                };
                return Ok(Bundles {
                    range,
                    source: BundleSource::Precomputed,
                    bundles: rows.into_iter().map(to_bundle).collect(),
                });
            }
            // No precomputed generation yet; fall through to live analysis
        }

        let window = pairs::clamp_window(Some(ctx.range.from), ctx.range.to, limits.window_days);
        let analysis = pairs::analyze(pool, &ctx.tenant, window, &limits).await?;
        let PairWindow { start, end } = analysis.window;

        Ok(Bundles {
            range: DateRange { from: start, to: end },
            source: BundleSource::Live,
            bundles: analysis.pairs.into_iter().map(to_bundle).collect(),
        })
    })
    .await
}

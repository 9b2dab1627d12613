//! Dayparting and time-of-day heatmap
//!
//! Both views bucket by tenant-local hour; the summary path reads the
//! precomputed local-hour buckets, the fact path converts each UTC
//! timestamp exactly once.

use super::{
    fetch_fact_rows, fetch_summaries, prepare, share_pct, with_budget, DateRange, QueryParams,
    QuerySource,
};
use crate::error::Result;
use chrono::{DateTime, Utc};
use poslens_common::time::local_parts;
use serde::Serialize;
use sqlx::SqlitePool;

pub const DAYPART_NAMES: [&str; 4] = ["breakfast", "lunch", "dinner", "late_night"];

/// Named local-time bucket for an hour of day
pub fn daypart_for_hour(hour: u32) -> &'static str {
    match hour {
        6..=10 => "breakfast",
        11..=14 => "lunch",
        15..=20 => "dinner",
        _ => "late_night",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DaypartBucket {
    pub daypart: &'static str,
    pub revenue: i64,
    pub quantity: i64,
    pub line_count: i64,
    pub share_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dayparting {
    pub range: DateRange,
    pub source: QuerySource,
    pub total_revenue: i64,
    pub dayparts: Vec<DaypartBucket>,
}

/// Revenue by (day of week, hour); rows are Monday..Sunday, columns 0..23
#[derive(Debug, Clone, Serialize)]
pub struct Heatmap {
    pub range: DateRange,
    pub source: QuerySource,
    pub revenue: Vec<Vec<i64>>,
}

/// Per-(weekday, hour) revenue/quantity/lines, shared by both views here
async fn hourly_grid(
    pool: &SqlitePool,
    ctx: &super::QueryContext,
    source: QuerySource,
) -> Result<[[(i64, i64, i64); 24]; 7]> {
    let mut grid = [[(0i64, 0i64, 0i64); 24]; 7];
    match source {
        QuerySource::Summaries => {
            for row in fetch_summaries(pool, ctx).await? {
                let cell = &mut grid[row.day_of_week as usize][row.hour as usize];
                cell.0 += row.revenue;
                cell.1 += row.quantity;
                cell.2 += row.line_count;
            }
        }
        QuerySource::Facts => {
            for row in fetch_fact_rows(pool, ctx).await? {
                let parts = local_parts(row.sold_at, ctx.tz);
                let cell = &mut grid[parts.weekday as usize][parts.hour as usize];
                cell.0 += row.gross_revenue;
                cell.1 += row.quantity;
                cell.2 += 1;
            }
        }
    }
    Ok(grid)
}

pub async fn dayparting(
    pool: &SqlitePool,
    tenant_id: &str,
    params: &QueryParams,
    as_of: DateTime<Utc>,
) -> Result<Dayparting> {
    let ctx = prepare(pool, tenant_id, params, as_of).await?;
    let budget_ms = ctx.budget_ms;

    with_budget(budget_ms, async {
        let source = ctx.choose_source(pool, false, false).await?;
        let grid = hourly_grid(pool, &ctx, source).await?;

        let mut totals: [(i64, i64, i64); 4] = [(0, 0, 0); 4];
        for row in &grid {
            for (hour, cell) in row.iter().enumerate() {
                let idx = DAYPART_NAMES
                    .iter()
                    .position(|name| *name == daypart_for_hour(hour as u32))
                    .unwrap_or(3);
                totals[idx].0 += cell.0;
                totals[idx].1 += cell.1;
                totals[idx].2 += cell.2;
            }
        }

        let total_revenue: i64 = totals.iter().map(|t| t.0).sum();
        let dayparts = DAYPART_NAMES
            .iter()
            .zip(totals.iter())
            .map(|(name, (revenue, quantity, lines))| DaypartBucket {
                daypart: name,
                revenue: *revenue,
                quantity: *quantity,
                line_count: *lines,
                share_pct: share_pct(*revenue, total_revenue),
            })
            .collect();

        Ok(Dayparting {
            range: ctx.range,
            source,
            total_revenue,
            dayparts,
        })
    })
    .await
}

pub async fn heatmap(
    pool: &SqlitePool,
    tenant_id: &str,
    params: &QueryParams,
    as_of: DateTime<Utc>,
) -> Result<Heatmap> {
    let ctx = prepare(pool, tenant_id, params, as_of).await?;
    let budget_ms = ctx.budget_ms;

    with_budget(budget_ms, async {
        let source = ctx.choose_source(pool, false, false).await?;
        let grid = hourly_grid(pool, &ctx, source).await?;

        let revenue = grid
            .iter()
            .map(|row| row.iter().map(|cell| cell.0).collect())
            .collect();

        Ok(Heatmap {
            range: ctx.range,
            source,
            revenue,
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daypart_boundaries() {
        assert_eq!(daypart_for_hour(5), "late_night");
        assert_eq!(daypart_for_hour(6), "breakfast");
        assert_eq!(daypart_for_hour(10), "breakfast");
        assert_eq!(daypart_for_hour(11), "lunch");
        assert_eq!(daypart_for_hour(14), "lunch");
        assert_eq!(daypart_for_hour(15), "dinner");
        assert_eq!(daypart_for_hour(20), "dinner");
        assert_eq!(daypart_for_hour(21), "late_night");
        assert_eq!(daypart_for_hour(23), "late_night");
        assert_eq!(daypart_for_hour(0), "late_night");
    }
}

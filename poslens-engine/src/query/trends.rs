//! Revenue trends
//!
//! One daily series, re-grouped into ISO-week and calendar-month
//! buckets. Best day is the revenue maximum; worst day deliberately
//! ignores zero-revenue days, since a day with no trade is a closure,
//! not a bad trading day.

use super::{
    fetch_fact_rows, fetch_summaries, prepare, with_budget, DateRange, QueryParams, QuerySource,
};
use crate::error::Result;
use chrono::{DateTime, NaiveDate, Utc};
use poslens_common::time::{local_date, month_start, week_start};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub period_start: NaiveDate,
    pub revenue: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Trends {
    pub range: DateRange,
    pub source: QuerySource,
    pub daily: Vec<TrendPoint>,
    pub weekly: Vec<TrendPoint>,
    pub monthly: Vec<TrendPoint>,
    pub best_day: Option<TrendPoint>,
    pub worst_day: Option<TrendPoint>,
}

/// Re-group a daily series by an arbitrary period-start mapping
fn regroup(daily: &[TrendPoint], start_of: impl Fn(NaiveDate) -> NaiveDate) -> Vec<TrendPoint> {
    let mut grouped: BTreeMap<NaiveDate, (i64, i64)> = BTreeMap::new();
    for point in daily {
        let entry = grouped.entry(start_of(point.period_start)).or_insert((0, 0));
        entry.0 += point.revenue;
        entry.1 += point.quantity;
    }
    grouped
        .into_iter()
        .map(|(period_start, (revenue, quantity))| TrendPoint {
            period_start,
            revenue,
            quantity,
        })
        .collect()
}

/// Extrema over the daily series; worst excludes zero-revenue days
fn extrema(daily: &[TrendPoint]) -> (Option<TrendPoint>, Option<TrendPoint>) {
    let best = daily.iter().copied().max_by_key(|p| p.revenue);
    let worst = daily
        .iter()
        .copied()
        .filter(|p| p.revenue > 0)
        .min_by_key(|p| p.revenue);
    (best, worst)
}

pub async fn trends(
    pool: &SqlitePool,
    tenant_id: &str,
    params: &QueryParams,
    as_of: DateTime<Utc>,
) -> Result<Trends> {
    let ctx = prepare(pool, tenant_id, params, as_of).await?;
    let budget_ms = ctx.budget_ms;

    with_budget(budget_ms, async {
        let source = ctx.choose_source(pool, false, false).await?;

        let mut by_date: BTreeMap<NaiveDate, (i64, i64)> = BTreeMap::new();
        match source {
            QuerySource::Summaries => {
                for row in fetch_summaries(pool, &ctx).await? {
                    let entry = by_date.entry(row.date).or_insert((0, 0));
                    entry.0 += row.revenue;
                    entry.1 += row.quantity;
                }
            }
            QuerySource::Facts => {
                for row in fetch_fact_rows(pool, &ctx).await? {
                    let entry = by_date.entry(local_date(row.sold_at, ctx.tz)).or_insert((0, 0));
                    entry.0 += row.gross_revenue;
                    entry.1 += row.quantity;
                }
            }
        }

        let daily: Vec<TrendPoint> = by_date
            .into_iter()
            .map(|(period_start, (revenue, quantity))| TrendPoint {
                period_start,
                revenue,
                quantity,
            })
            .collect();

        let weekly = regroup(&daily, week_start);
        let monthly = regroup(&daily, month_start);
        let (best_day, worst_day) = extrema(&daily);

        Ok(Trends {
            range: ctx.range,
            source,
            daily,
            weekly,
            monthly,
            best_day,
            worst_day,
        })
    })
    .await
}

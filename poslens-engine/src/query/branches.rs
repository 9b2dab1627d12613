//! Branch and category comparisons
//!
//! Each branch's and category's share is reported as a percentage of
//! the filtered total, rounded to one decimal place.

use super::{
    fetch_fact_rows, fetch_summaries, prepare, share_pct, with_budget, DateRange, QueryParams,
    QuerySource,
};
use crate::error::Result;
use crate::rollup::hourly::macro_category;
use chrono::{DateTime, Utc};
use poslens_common::time::div_round;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Serialize)]
pub struct BranchStat {
    pub branch: String,
    pub revenue: i64,
    pub receipt_count: i64,
    pub avg_ticket: i64,
    pub share_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Branches {
    pub range: DateRange,
    pub source: QuerySource,
    pub total_revenue: i64,
    pub branches: Vec<BranchStat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryStat {
    pub category: String,
    pub macro_category: String,
    pub revenue: i64,
    pub quantity: i64,
    pub share_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Categories {
    pub range: DateRange,
    pub source: QuerySource,
    pub total_revenue: i64,
    pub categories: Vec<CategoryStat>,
}

/// Per-branch daily receipt counts from the branch summaries
async fn summary_branch_receipts(
    pool: &SqlitePool,
    ctx: &super::QueryContext,
) -> Result<HashMap<String, i64>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT branch, COALESCE(SUM(receipt_count), 0) FROM branch_summaries \
         WHERE period_type = 'daily' AND tenant_id = ",
    );
    qb.push_bind(ctx.tenant.guid.clone());
    qb.push(" AND period_start >= ");
    qb.push_bind(ctx.range.from);
    qb.push(" AND period_start <= ");
    qb.push_bind(ctx.range.to);
    if !ctx.params.branches.is_empty() {
        qb.push(" AND branch IN (");
        let mut sep = qb.separated(", ");
        for branch in &ctx.params.branches {
            sep.push_bind(branch.clone());
        }
        sep.push_unseparated(")");
    }
    qb.push(" GROUP BY branch");

    let rows: Vec<(String, i64)> = qb.build_query_as().fetch_all(pool).await?;
    Ok(rows.into_iter().collect())
}

pub async fn branches(
    pool: &SqlitePool,
    tenant_id: &str,
    params: &QueryParams,
    as_of: DateTime<Utc>,
) -> Result<Branches> {
    let ctx = prepare(pool, tenant_id, params, as_of).await?;
    let budget_ms = ctx.budget_ms;

    with_budget(budget_ms, async {
        let source = ctx.choose_source(pool, true, false).await?;

        // branch -> (revenue, receipts)
        let mut stats: BTreeMap<String, (i64, i64)> = BTreeMap::new();
        match source {
            QuerySource::Summaries => {
                for row in fetch_summaries(pool, &ctx).await? {
                    stats.entry(row.branch.clone()).or_insert((0, 0)).0 += row.revenue;
                }
                for (branch, receipts) in summary_branch_receipts(pool, &ctx).await? {
                    stats.entry(branch).or_insert((0, 0)).1 = receipts;
                }
            }
            QuerySource::Facts => {
                let rows = fetch_fact_rows(pool, &ctx).await?;
                let mut receipts: HashMap<String, HashSet<&str>> = HashMap::new();
                for row in &rows {
                    stats.entry(row.branch.clone()).or_insert((0, 0)).0 += row.gross_revenue;
                    receipts
                        .entry(row.branch.clone())
                        .or_default()
                        .insert(row.receipt_id.as_str());
                }
                for (branch, ids) in receipts {
                    stats.entry(branch).or_insert((0, 0)).1 = ids.len() as i64;
                }
            }
        }

        let total_revenue: i64 = stats.values().map(|(revenue, _)| revenue).sum();
        let mut branches: Vec<BranchStat> = stats
            .into_iter()
            .map(|(branch, (revenue, receipt_count))| BranchStat {
                branch,
                revenue,
                receipt_count,
                avg_ticket: if receipt_count > 0 {
                    div_round(revenue, receipt_count)
                } else {
                    0
                },
                share_pct: share_pct(revenue, total_revenue),
            })
            .collect();
        branches.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.branch.cmp(&b.branch)));

        Ok(Branches {
            range: ctx.range,
            source,
            total_revenue,
            branches,
        })
    })
    .await
}

pub async fn categories(
    pool: &SqlitePool,
    tenant_id: &str,
    params: &QueryParams,
    as_of: DateTime<Utc>,
) -> Result<Categories> {
    let ctx = prepare(pool, tenant_id, params, as_of).await?;
    let budget_ms = ctx.budget_ms;

    with_budget(budget_ms, async {
        let source = ctx.choose_source(pool, false, false).await?;

        // category -> (revenue, quantity)
        let mut stats: BTreeMap<String, (i64, i64)> = BTreeMap::new();
        match source {
            QuerySource::Summaries => {
                for row in fetch_summaries(pool, &ctx).await? {
                    let entry = stats.entry(row.category.clone()).or_insert((0, 0));
                    entry.0 += row.revenue;
                    entry.1 += row.quantity;
                }
            }
            QuerySource::Facts => {
                for row in fetch_fact_rows(pool, &ctx).await? {
                    let entry = stats.entry(row.category.clone()).or_insert((0, 0));
                    entry.0 += row.gross_revenue;
                    entry.1 += row.quantity;
                }
            }
        }

        let total_revenue: i64 = stats.values().map(|(revenue, _)| revenue).sum();
        let mut categories: Vec<CategoryStat> = stats
            .into_iter()
            .map(|(category, (revenue, quantity))| CategoryStat {
                macro_category: macro_category(&category).to_string(),
                category,
                revenue,
                quantity,
                share_pct: share_pct(revenue, total_revenue),
            })
            .collect();
        categories
            .sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.category.cmp(&b.category)));

        Ok(Categories {
            range: ctx.range,
            source,
            total_revenue,
            categories,
        })
    })
    .await
}

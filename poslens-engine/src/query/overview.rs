//! Overview KPIs

use super::{
    fetch_fact_rows, fetch_summaries, prepare, summary_receipt_count, with_budget, DateRange,
    QueryParams, QuerySource,
};
use crate::error::Result;
use chrono::{DateTime, Utc};
use poslens_common::time::div_round;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;

/// Headline numbers for the dashboard landing view
#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub tenant_id: String,
    pub range: DateRange,
    pub source: QuerySource,
    pub total_revenue: i64,
    pub total_quantity: i64,
    pub line_count: i64,
    pub receipt_count: i64,
    /// total_revenue / receipt_count, 0 when there are no receipts
    pub avg_ticket: i64,
}

pub async fn overview(
    pool: &SqlitePool,
    tenant_id: &str,
    params: &QueryParams,
    as_of: DateTime<Utc>,
) -> Result<Overview> {
    let ctx = prepare(pool, tenant_id, params, as_of).await?;
    let budget_ms = ctx.budget_ms;

    with_budget(budget_ms, async {
        let source = ctx.choose_source(pool, true, false).await?;

        let (total_revenue, total_quantity, line_count, receipt_count) = match source {
            QuerySource::Summaries => {
                let rows = fetch_summaries(pool, &ctx).await?;
                let revenue: i64 = rows.iter().map(|r| r.revenue).sum();
                let quantity: i64 = rows.iter().map(|r| r.quantity).sum();
                let lines: i64 = rows.iter().map(|r| r.line_count).sum();
                let receipts = summary_receipt_count(pool, &ctx).await?;
                (revenue, quantity, lines, receipts)
            }
            QuerySource::Facts => {
                let rows = fetch_fact_rows(pool, &ctx).await?;
                let revenue: i64 = rows.iter().map(|r| r.gross_revenue).sum();
                let quantity: i64 = rows.iter().map(|r| r.quantity).sum();
                let lines = rows.len() as i64;
                let receipts = rows
                    .iter()
                    .map(|r| r.receipt_id.as_str())
                    .collect::<HashSet<_>>()
                    .len() as i64;
                (revenue, quantity, lines, receipts)
            }
        };

        let avg_ticket = if receipt_count > 0 {
            div_round(total_revenue, receipt_count)
        } else {
            0
        };

        Ok(Overview {
            tenant_id: ctx.tenant.guid.clone(),
            range: ctx.range,
            source,
            total_revenue,
            total_quantity,
            line_count,
            receipt_count,
            avg_ticket,
        })
    })
    .await
}

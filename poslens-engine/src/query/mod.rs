//! Query Aggregation Layer
//!
//! Stateless parameterized reads serving dashboard views. Every query
//! accepts the same filter shape (optional date range, optional
//! branch/category filters) plus an explicit `as_of` timestamp, and
//! runs under a time budget loaded from settings. Filters a given query
//! does not support are accepted and ignored.
//!
//! Each query has exactly one public entry point with an internal
//! source selector: the common default window is served from the
//! pre-aggregated summary tables, anything else falls back to a raw
//! fact scan. Derived tables reflect the last completed refresh, so the
//! summary path is eventually consistent with live writes.

pub mod branches;
pub mod bundles;
pub mod dayparting;
pub mod menu;
pub mod overview;
pub mod trends;

use crate::error::{Error, Result};
use crate::facts::{self, FactFilter};
use crate::tenants::{get_tenant, tenant_tz};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use poslens_common::db::models::{FactRow, HourlySummaryRow, Tenant};
use poslens_common::time::local_date;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::future::Future;

const DEFAULT_QUERY_TIMEOUT_MS: i64 = 30_000;
const DEFAULT_WINDOW_DAYS: i64 = 90;

/// Filter shape shared by every query kind
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    /// Inclusive tenant-local start date
    pub from: Option<NaiveDate>,
    /// Inclusive tenant-local end date
    pub to: Option<NaiveDate>,
    pub branches: Vec<String>,
    pub categories: Vec<String>,
}

/// Resolved inclusive date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Which storage a query was answered from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuerySource {
    Summaries,
    Facts,
}

/// Everything a query implementation needs, resolved once up front
pub(crate) struct QueryContext {
    pub tenant: Tenant,
    pub tz: Tz,
    pub range: DateRange,
    pub is_default_range: bool,
    pub budget_ms: u64,
    pub params: QueryParams,
}

/// Validate parameters and resolve range, timezone, and time budget
pub(crate) async fn prepare(
    pool: &SqlitePool,
    tenant_id: &str,
    params: &QueryParams,
    as_of: DateTime<Utc>,
) -> Result<QueryContext> {
    if let (Some(from), Some(to)) = (params.from, params.to) {
        if from > to {
            return Err(Error::Validation(format!(
                "Invalid date range: {} is after {}",
                from, to
            )));
        }
    }

    let tenant = get_tenant(pool, tenant_id).await?;
    let tz = tenant_tz(&tenant);
    let today = local_date(as_of, tz);

    let window_days = poslens_common::db::get_setting_i64(
        pool,
        "default_query_window_days",
        DEFAULT_WINDOW_DAYS,
    )
    .await?;
    let default_from = today - Duration::days(window_days - 1);

    let range = DateRange {
        from: params.from.unwrap_or(default_from),
        to: params.to.unwrap_or(today),
    };
    let is_default_range = range.from == default_from && range.to == today;

    let budget_ms =
        poslens_common::db::get_setting_i64(pool, "query_timeout_ms", DEFAULT_QUERY_TIMEOUT_MS)
            .await? as u64;

    Ok(QueryContext {
        tenant,
        tz,
        range,
        is_default_range,
        budget_ms,
        params: params.clone(),
    })
}

impl QueryContext {
    /// Pick the storage to answer from
    ///
    /// The summary tables carry no per-item detail and no per-category
    /// receipt counts, so queries needing those fall back to the facts,
    /// as does any range other than the default window, and any tenant
    /// that has never completed a refresh.
    pub(crate) async fn choose_source(
        &self,
        pool: &SqlitePool,
        needs_receipts: bool,
        needs_items: bool,
    ) -> Result<QuerySource> {
        if needs_items || !self.is_default_range {
            return Ok(QuerySource::Facts);
        }
        if needs_receipts && !self.params.categories.is_empty() {
            return Ok(QuerySource::Facts);
        }
        let has_summaries: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM hourly_summaries WHERE tenant_id = ?)")
                .bind(&self.tenant.guid)
                .fetch_one(pool)
                .await?;
        if has_summaries {
            Ok(QuerySource::Summaries)
        } else {
            Ok(QuerySource::Facts)
        }
    }

    pub(crate) fn fact_filter(&self) -> FactFilter {
        FactFilter {
            from: Some(self.range.from),
            to: Some(self.range.to),
            branches: self.params.branches.clone(),
            categories: self.params.categories.clone(),
        }
    }
}

/// Run a query body under the configured time budget
pub(crate) async fn with_budget<T, F>(budget_ms: u64, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(std::time::Duration::from_millis(budget_ms), fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout { budget_ms }),
    }
}

/// Fetch hourly summary rows matching the context's range and filters
pub(crate) async fn fetch_summaries(
    pool: &SqlitePool,
    ctx: &QueryContext,
) -> Result<Vec<HourlySummaryRow>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT date, hour, day_of_week, branch, category, macro_category, \
         revenue, quantity, line_count FROM hourly_summaries WHERE tenant_id = ",
    );
    qb.push_bind(ctx.tenant.guid.clone());
    qb.push(" AND date >= ");
    qb.push_bind(ctx.range.from);
    qb.push(" AND date <= ");
    qb.push_bind(ctx.range.to);

    if !ctx.params.branches.is_empty() {
        qb.push(" AND branch IN (");
        let mut sep = qb.separated(", ");
        for branch in &ctx.params.branches {
            sep.push_bind(branch.clone());
        }
        sep.push_unseparated(")");
    }
    if !ctx.params.categories.is_empty() {
        qb.push(" AND category IN (");
        let mut sep = qb.separated(", ");
        for category in &ctx.params.categories {
            sep.push_bind(category.clone());
        }
        sep.push_unseparated(")");
    }

    qb.push(" ORDER BY date, hour, branch, category");

    let rows = qb.build_query_as().fetch_all(pool).await?;
    Ok(rows)
}

/// Fetch raw fact rows matching the context's range and filters
pub(crate) async fn fetch_fact_rows(pool: &SqlitePool, ctx: &QueryContext) -> Result<Vec<FactRow>> {
    facts::fetch_facts(pool, &ctx.tenant.guid, &ctx.fact_filter(), ctx.tz).await
}

/// Sum of daily receipt counts from the branch summaries (the summary
/// path's receipt source; receipts never span branches)
pub(crate) async fn summary_receipt_count(pool: &SqlitePool, ctx: &QueryContext) -> Result<i64> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT COALESCE(SUM(receipt_count), 0) FROM branch_summaries \
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

    let count: i64 = qb.build_query_scalar().fetch_one(pool).await?;
    Ok(count)
}

/// Percentage of `part` in `total`, rounded to one decimal place
pub(crate) fn share_pct(part: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 * 1000.0 / total as f64).round() / 10.0
}

//! Database row models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A restaurant business; all data and derived state is partitioned by
/// tenant
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tenant {
    pub guid: String,
    pub name: String,
    /// IANA timezone name, e.g. "Asia/Jakarta"
    pub timezone: String,
}

/// One sold line item from the fact table
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FactRow {
    pub receipt_id: String,
    pub item_name: String,
    pub category: String,
    pub branch: String,
    pub quantity: i64,
    pub unit_price: i64,
    /// Subtotal + tax + allocated service charge + discount (discount is
    /// non-positive), integer minor currency units
    pub gross_revenue: i64,
    pub sold_at: DateTime<Utc>,
    pub excluded: bool,
}

/// Per-item lifetime rollup, fully recomputed each refresh
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MenuItemRollup {
    pub item_name: String,
    pub total_quantity: i64,
    pub total_revenue: i64,
    pub avg_price: i64,
    pub order_count: i64,
    pub first_sale_date: NaiveDate,
    pub last_sale_date: NaiveDate,
    pub months_active: i64,
    pub days_since_last_sale: i64,
    pub is_core_menu: bool,
    pub is_current_menu: bool,
    /// star / plowhorse / puzzle / dog, NULL when no median was defined
    pub quadrant: Option<String>,
}

/// One hourly pre-aggregation bucket (tenant-local calendar)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HourlySummaryRow {
    pub date: NaiveDate,
    pub hour: i64,
    /// Monday = 0 through Sunday = 6
    pub day_of_week: i64,
    pub branch: String,
    pub category: String,
    pub macro_category: String,
    pub revenue: i64,
    pub quantity: i64,
    pub line_count: i64,
}

/// Ranked entry of a branch summary's top-items list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopItem {
    pub name: String,
    pub quantity: i64,
    pub revenue: i64,
}

/// Revenue/quantity totals for one category inside a branch summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub revenue: i64,
    pub quantity: i64,
}

/// One branch summary row; `top_items` and `category_breakdown` are the
/// JSON-serialized compound columns
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BranchSummaryRow {
    pub period_type: String,
    pub period_start: NaiveDate,
    pub branch: String,
    pub revenue: i64,
    pub transaction_count: i64,
    pub receipt_count: i64,
    pub avg_ticket: i64,
    pub top_items: String,
    pub category_breakdown: String,
}

impl BranchSummaryRow {
    /// Decode the embedded top-items list
    pub fn decode_top_items(&self) -> Vec<TopItem> {
        serde_json::from_str(&self.top_items).unwrap_or_default()
    }

    /// Decode the embedded category breakdown
    pub fn decode_category_breakdown(&self) -> std::collections::BTreeMap<String, CategoryTotals> {
        serde_json::from_str(&self.category_breakdown).unwrap_or_default()
    }
}

/// One co-occurring item pair within the analysis window
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ItemPairRow {
    pub item_a: String,
    pub item_b: String,
    /// Distinct receipts containing both items
    pub frequency: i64,
    /// frequency / total receipts in the window, always in [0, 1]
    pub support: f64,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
}

/// Refresh audit row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RefreshRun {
    pub guid: String,
    pub tenant_id: String,
    pub state: String,
    /// JSON map of table name to {rows_deleted, rows_inserted}
    pub table_counts: String,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

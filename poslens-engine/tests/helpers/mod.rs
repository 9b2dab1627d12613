//! Shared test fixtures: throwaway databases and fact-row seeding
#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

pub struct TestDb {
    // Held so the tempdir outlives the pool
    #[allow(dead_code)]
    pub dir: tempfile::TempDir,
    pub pool: SqlitePool,
}

pub async fn test_db() -> TestDb {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = poslens_common::db::init_database(&dir.path().join("test.db"))
        .await
        .expect("init database");
    TestDb { dir, pool }
}

pub async fn create_tenant(pool: &SqlitePool, timezone: &str) -> String {
    poslens_engine::tenants::create_tenant(pool, "Test Restaurant", timezone)
        .await
        .expect("create tenant")
        .guid
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_sale(
    pool: &SqlitePool,
    tenant_id: &str,
    receipt_id: &str,
    item_name: &str,
    category: &str,
    branch: &str,
    quantity: i64,
    gross_revenue: i64,
    sold_at: DateTime<Utc>,
) {
    insert_sale_full(
        pool,
        tenant_id,
        receipt_id,
        item_name,
        category,
        branch,
        quantity,
        gross_revenue,
        sold_at,
        false,
        None,
    )
    .await;
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_sale_full(
    pool: &SqlitePool,
    tenant_id: &str,
    receipt_id: &str,
    item_name: &str,
    category: &str,
    branch: &str,
    quantity: i64,
    gross_revenue: i64,
    sold_at: DateTime<Utc>,
    excluded: bool,
    import_batch_id: Option<&str>,
) {
    let unit_price = if quantity > 0 { gross_revenue / quantity } else { 0 };
    sqlx::query(
        r#"
        INSERT INTO transactions (
            guid, tenant_id, receipt_id, item_name, category, branch,
            quantity, unit_price, gross_revenue, sold_at, excluded, import_batch_id
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id)
    .bind(receipt_id)
    .bind(item_name)
    .bind(category)
    .bind(branch)
    .bind(quantity)
    .bind(unit_price)
    .bind(gross_revenue)
    .bind(sold_at)
    .bind(excluded)
    .bind(import_batch_id)
    .execute(pool)
    .await
    .expect("insert sale");
}

pub fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) {
    sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
        .bind(value)
        .bind(key)
        .execute(pool)
        .await
        .expect("set setting");
}

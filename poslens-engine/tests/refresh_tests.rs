//! Refresh orchestrator and builder integration tests

mod helpers;

use helpers::*;
use poslens_engine::error::Error;
use poslens_engine::refresh::RefreshCoordinator;
use poslens_engine::{exclusion, facts};

/// Sum of hourly bucket revenue must equal the sum of non-excluded
/// transactions, with both exclusion signals honored
#[tokio::test]
async fn hourly_summaries_conserve_revenue() {
    let db = test_db().await;
    let tenant = create_tenant(&db.pool, "UTC").await;
    let as_of = ts(2025, 8, 6, 12, 0);

    insert_sale(&db.pool, &tenant, "r1", "Coffee", "beverage", "main", 2, 9000, ts(2025, 7, 1, 8, 30)).await;
    insert_sale(&db.pool, &tenant, "r1", "Croissant", "pastry", "main", 1, 4000, ts(2025, 7, 1, 8, 30)).await;
    insert_sale(&db.pool, &tenant, "r2", "Coffee", "beverage", "main", 1, 4500, ts(2025, 7, 1, 12, 10)).await;
    insert_sale(&db.pool, &tenant, "r3", "Burger", "mains", "uptown", 1, 12000, ts(2025, 7, 2, 19, 0)).await;

    // Excluded by the per-row flag
    insert_sale_full(&db.pool, &tenant, "r4", "Voided Thing", "mains", "main", 1, 99999, ts(2025, 7, 2, 20, 0), true, None).await;
    // Excluded by the named-item registry
    insert_sale(&db.pool, &tenant, "r5", "Staff Meal", "mains", "main", 1, 5000, ts(2025, 7, 3, 13, 0)).await;
    exclusion::add_excluded_item(&db.pool, &tenant, "Staff Meal", Some("internal")).await.unwrap();

    let coordinator = RefreshCoordinator::new();
    coordinator.run_tenant_refresh(&db.pool, &tenant, as_of).await.unwrap();

    let hourly_total: i64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(revenue), 0) FROM hourly_summaries WHERE tenant_id = ?")
            .bind(&tenant)
            .fetch_one(&db.pool)
            .await
            .unwrap();
    assert_eq!(hourly_total, 9000 + 4000 + 4500 + 12000);

    // Neither excluded item may appear anywhere downstream
    let rollup_names: Vec<String> =
        sqlx::query_scalar("SELECT item_name FROM menu_item_rollups WHERE tenant_id = ?")
            .bind(&tenant)
            .fetch_all(&db.pool)
            .await
            .unwrap();
    assert!(!rollup_names.contains(&"Staff Meal".to_string()));
    assert!(!rollup_names.contains(&"Voided Thing".to_string()));
}

/// A known UTC timestamp must land in its tenant-local hour bucket:
/// 23:30 UTC is 06:30 the next day in Asia/Jakarta (UTC+7)
#[tokio::test]
async fn hourly_bucket_uses_tenant_local_time() {
    let db = test_db().await;
    let tenant = create_tenant(&db.pool, "Asia/Jakarta").await;

    insert_sale(&db.pool, &tenant, "r1", "Nasi Goreng", "mains", "main", 1, 35000, ts(2025, 7, 1, 23, 30)).await;

    let coordinator = RefreshCoordinator::new();
    coordinator.run_tenant_refresh(&db.pool, &tenant, ts(2025, 8, 6, 12, 0)).await.unwrap();

    let (bucket_date, hour, day_of_week): (String, i64, i64) = sqlx::query_as(
        "SELECT date, hour, day_of_week FROM hourly_summaries WHERE tenant_id = ?",
    )
    .bind(&tenant)
    .fetch_one(&db.pool)
    .await
    .unwrap();

    assert_eq!(bucket_date, "2025-07-02");
    assert_eq!(hour, 6);
    assert_eq!(day_of_week, 2); // July 2nd 2025 is a Wednesday
}

/// Quadrants follow the median comparisons and are assigned to every row
#[tokio::test]
async fn quadrants_match_median_classification() {
    let db = test_db().await;
    let tenant = create_tenant(&db.pool, "UTC").await;

    // quantities {100, 50, 75} -> median 75; prices {500, 1000, 750} -> median 750
    insert_sale(&db.pool, &tenant, "r1", "Alpha", "mains", "main", 100, 50000, ts(2025, 7, 1, 12, 0)).await;
    insert_sale(&db.pool, &tenant, "r2", "Beta", "mains", "main", 50, 50000, ts(2025, 7, 1, 12, 0)).await;
    insert_sale(&db.pool, &tenant, "r3", "Gamma", "mains", "main", 75, 56250, ts(2025, 7, 1, 12, 0)).await;

    let coordinator = RefreshCoordinator::new();
    coordinator.run_tenant_refresh(&db.pool, &tenant, ts(2025, 8, 6, 12, 0)).await.unwrap();

    let rows: Vec<(String, Option<String>)> =
        sqlx::query_as("SELECT item_name, quadrant FROM menu_item_rollups WHERE tenant_id = ?")
            .bind(&tenant)
            .fetch_all(&db.pool)
            .await
            .unwrap();

    let quadrant = |name: &str| {
        rows.iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, q)| q.clone())
    };
    // quantity >= median, price < median
    assert_eq!(quadrant("Alpha").as_deref(), Some("plowhorse"));
    // quantity < median, price >= median
    assert_eq!(quadrant("Beta").as_deref(), Some("puzzle"));
    assert_eq!(quadrant("Gamma").as_deref(), Some("star"));
    // Totality: every non-excluded row got a quadrant
    assert!(rows.iter().all(|(_, q)| q.is_some()));
}

/// Core-menu and current-menu recency boundaries are inclusive
#[tokio::test]
async fn menu_flags_boundaries() {
    let db = test_db().await;
    let tenant = create_tenant(&db.pool, "UTC").await;
    let as_of = ts(2025, 8, 6, 12, 0);

    // Exactly 6 months 0 days active
    insert_sale(&db.pool, &tenant, "r1", "Old Faithful", "mains", "main", 1, 1000, ts(2025, 2, 6, 12, 0)).await;
    insert_sale(&db.pool, &tenant, "r2", "Old Faithful", "mains", "main", 1, 1000, ts(2025, 8, 6, 10, 0)).await;
    // One day short of 6 months
    insert_sale(&db.pool, &tenant, "r3", "Newcomer", "mains", "main", 1, 1000, ts(2025, 2, 7, 12, 0)).await;
    insert_sale(&db.pool, &tenant, "r4", "Newcomer", "mains", "main", 1, 1000, ts(2025, 8, 6, 10, 0)).await;
    // Last sold exactly 30 days before as_of
    insert_sale(&db.pool, &tenant, "r5", "Thirty", "mains", "main", 1, 1000, ts(2025, 7, 7, 12, 0)).await;
    // Last sold 31 days before as_of
    insert_sale(&db.pool, &tenant, "r6", "ThirtyOne", "mains", "main", 1, 1000, ts(2025, 7, 6, 12, 0)).await;

    let coordinator = RefreshCoordinator::new();
    coordinator.run_tenant_refresh(&db.pool, &tenant, as_of).await.unwrap();

    let rows: Vec<(String, bool, bool, i64)> = sqlx::query_as(
        "SELECT item_name, is_core_menu, is_current_menu, days_since_last_sale \
         FROM menu_item_rollups WHERE tenant_id = ?",
    )
    .bind(&tenant)
    .fetch_all(&db.pool)
    .await
    .unwrap();

    let find = |name: &str| rows.iter().find(|(n, ..)| n == name).unwrap();
    assert!(find("Old Faithful").1, "6 months 0 days must be core");
    assert!(!find("Newcomer").1, "5 months 30 days must not be core");
    assert!(find("Thirty").2, "30 days ago must still be current");
    assert_eq!(find("Thirty").3, 30);
    assert!(!find("ThirtyOne").2, "31 days ago must not be current");
}

/// Two refreshes with no intervening writes produce identical derived rows
#[tokio::test]
async fn refresh_is_idempotent() {
    let db = test_db().await;
    let tenant = create_tenant(&db.pool, "Asia/Jakarta").await;
    let as_of = ts(2025, 8, 6, 12, 0);

    for day in 1..=20 {
        let receipt = format!("r{}", day);
        insert_sale(&db.pool, &tenant, &receipt, "Coffee", "beverage", "main", 2, 9000, ts(2025, 7, day, 8, 15)).await;
        insert_sale(&db.pool, &tenant, &receipt, "Croissant", "pastry", "main", 1, 4000, ts(2025, 7, day, 8, 15)).await;
        if day % 2 == 0 {
            insert_sale(&db.pool, &tenant, &format!("s{}", day), "Burger", "mains", "uptown", 1, 12000, ts(2025, 7, day, 13, 0)).await;
        }
    }

    async fn snapshot(pool: &sqlx::SqlitePool, tenant: &str) -> Vec<String> {
        let mut all = Vec::new();
        let rollups: Vec<(String, i64, i64, i64, i64, String, String, i64, i64, bool, bool, Option<String>)> =
            sqlx::query_as(
                "SELECT item_name, total_quantity, total_revenue, avg_price, order_count, \
                 first_sale_date, last_sale_date, months_active, days_since_last_sale, \
                 is_core_menu, is_current_menu, quadrant \
                 FROM menu_item_rollups WHERE tenant_id = ? ORDER BY item_name",
            )
            .bind(tenant)
            .fetch_all(pool)
            .await
            .unwrap();
        all.extend(rollups.iter().map(|r| format!("{:?}", r)));

        let hourly: Vec<(String, i64, i64, String, String, String, i64, i64, i64)> = sqlx::query_as(
            "SELECT date, hour, day_of_week, branch, category, macro_category, revenue, quantity, line_count \
             FROM hourly_summaries WHERE tenant_id = ? ORDER BY date, hour, branch, category",
        )
        .bind(tenant)
        .fetch_all(pool)
        .await
        .unwrap();
        all.extend(hourly.iter().map(|r| format!("{:?}", r)));

        let branches: Vec<(String, String, String, i64, i64, i64, i64, String, String)> = sqlx::query_as(
            "SELECT period_type, period_start, branch, revenue, transaction_count, receipt_count, \
             avg_ticket, top_items, category_breakdown \
             FROM branch_summaries WHERE tenant_id = ? ORDER BY period_type, period_start, branch",
        )
        .bind(tenant)
        .fetch_all(pool)
        .await
        .unwrap();
        all.extend(branches.iter().map(|r| format!("{:?}", r)));

        let pairs: Vec<(String, String, i64, f64, String, String)> = sqlx::query_as(
            "SELECT item_a, item_b, frequency, support, window_start, window_end \
             FROM item_pairs WHERE tenant_id = ? ORDER BY item_a, item_b",
        )
        .bind(tenant)
        .fetch_all(pool)
        .await
        .unwrap();
        all.extend(pairs.iter().map(|r| format!("{:?}", r)));
        all
    }

    let coordinator = RefreshCoordinator::new();
    let first = coordinator.run_tenant_refresh(&db.pool, &tenant, as_of).await.unwrap();
    let snap_one = snapshot(&db.pool, &tenant).await;

    let second = coordinator.run_tenant_refresh(&db.pool, &tenant, as_of).await.unwrap();
    let snap_two = snapshot(&db.pool, &tenant).await;

    assert_eq!(snap_one, snap_two);
    // The second pass replaces exactly what the first inserted
    assert_eq!(second.menu_item_rollups.rows_deleted, first.menu_item_rollups.rows_inserted);
    assert_eq!(second.hourly_summaries.rows_deleted, first.hourly_summaries.rows_inserted);
    assert_eq!(second.branch_summaries.rows_deleted, first.branch_summaries.rows_inserted);
    assert_eq!(second.item_pairs.rows_deleted, first.item_pairs.rows_inserted);
}

/// Branch summaries carry period starts, top items, and category maps
#[tokio::test]
async fn branch_summaries_embed_compound_values() {
    let db = test_db().await;
    let tenant = create_tenant(&db.pool, "UTC").await;

    // Thursday 2025-07-03: week starts Monday 2025-06-30, month starts 2025-07-01
    insert_sale(&db.pool, &tenant, "r1", "Coffee", "beverage", "main", 3, 13500, ts(2025, 7, 3, 9, 0)).await;
    insert_sale(&db.pool, &tenant, "r1", "Croissant", "pastry", "main", 1, 4000, ts(2025, 7, 3, 9, 0)).await;
    insert_sale(&db.pool, &tenant, "r2", "Coffee", "beverage", "main", 1, 4500, ts(2025, 7, 3, 10, 0)).await;

    let coordinator = RefreshCoordinator::new();
    coordinator.run_tenant_refresh(&db.pool, &tenant, ts(2025, 8, 6, 12, 0)).await.unwrap();

    let rows: Vec<(String, String, i64, i64, i64, i64, String, String)> = sqlx::query_as(
        "SELECT period_type, period_start, revenue, transaction_count, receipt_count, avg_ticket, \
         top_items, category_breakdown \
         FROM branch_summaries WHERE tenant_id = ? AND branch = 'main' ORDER BY period_type",
    )
    .bind(&tenant)
    .fetch_all(&db.pool)
    .await
    .unwrap();

    assert_eq!(rows.len(), 3);
    let daily = rows.iter().find(|r| r.0 == "daily").unwrap();
    let weekly = rows.iter().find(|r| r.0 == "weekly").unwrap();
    let monthly = rows.iter().find(|r| r.0 == "monthly").unwrap();

    assert_eq!(daily.1, "2025-07-03");
    assert_eq!(weekly.1, "2025-06-30");
    assert_eq!(monthly.1, "2025-07-01");

    assert_eq!(daily.2, 22000);
    assert_eq!(daily.3, 3); // line items
    assert_eq!(daily.4, 2); // receipts
    assert_eq!(daily.5, 11000); // 22000 / 2

    let top: Vec<serde_json::Value> = serde_json::from_str(&daily.6).unwrap();
    assert_eq!(top[0]["name"], "Coffee");
    assert_eq!(top[0]["quantity"], 4);
    let cats: serde_json::Value = serde_json::from_str(&daily.7).unwrap();
    assert_eq!(cats["beverage"]["revenue"], 18000);
    assert_eq!(cats["pastry"]["quantity"], 1);
}

/// A refresh records a succeeded audit row with per-table counts
#[tokio::test]
async fn refresh_run_is_audited() {
    let db = test_db().await;
    let tenant = create_tenant(&db.pool, "UTC").await;
    insert_sale(&db.pool, &tenant, "r1", "Coffee", "beverage", "main", 1, 4500, ts(2025, 7, 1, 9, 0)).await;

    let coordinator = RefreshCoordinator::new();
    let result = coordinator.run_tenant_refresh(&db.pool, &tenant, ts(2025, 8, 6, 12, 0)).await.unwrap();

    let run = poslens_engine::refresh::last_run(&db.pool, &tenant).await.unwrap().unwrap();
    assert_eq!(run.guid, result.run_id);
    assert_eq!(run.state, "succeeded");
    assert!(run.finished_at.is_some());
    let counts: serde_json::Value = serde_json::from_str(&run.table_counts).unwrap();
    assert_eq!(counts["menu_item_rollups"]["rows_inserted"], 1);
}

/// Unknown tenants are a validation error, not a silent no-op
#[tokio::test]
async fn refresh_rejects_unknown_tenant() {
    let db = test_db().await;
    let coordinator = RefreshCoordinator::new();
    let err = coordinator
        .run_tenant_refresh(&db.pool, "no-such-tenant", ts(2025, 8, 6, 12, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

/// A refresh over an empty fact table succeeds with zero rows and no quadrants
#[tokio::test]
async fn refresh_of_empty_tenant_skips_quadrants() {
    let db = test_db().await;
    let tenant = create_tenant(&db.pool, "UTC").await;

    let coordinator = RefreshCoordinator::new();
    let result = coordinator.run_tenant_refresh(&db.pool, &tenant, ts(2025, 8, 6, 12, 0)).await.unwrap();

    assert_eq!(result.menu_item_rollups.rows_inserted, 0);
    assert_eq!(result.hourly_summaries.rows_inserted, 0);
    assert_eq!(result.branch_summaries.rows_inserted, 0);
    assert_eq!(result.item_pairs.rows_inserted, 0);
}

/// Import-batch rollback deletes exactly the batch's rows
#[tokio::test]
async fn rollback_batch_removes_only_its_rows() {
    let db = test_db().await;
    let tenant = create_tenant(&db.pool, "UTC").await;

    insert_sale_full(&db.pool, &tenant, "r1", "Coffee", "beverage", "main", 1, 4500, ts(2025, 7, 1, 9, 0), false, Some("batch-1")).await;
    insert_sale_full(&db.pool, &tenant, "r2", "Tea", "beverage", "main", 1, 4000, ts(2025, 7, 1, 10, 0), false, Some("batch-1")).await;
    insert_sale_full(&db.pool, &tenant, "r3", "Burger", "mains", "main", 1, 12000, ts(2025, 7, 1, 11, 0), false, Some("batch-2")).await;

    let deleted = facts::rollback_batch(&db.pool, &tenant, "batch-1").await.unwrap();
    assert_eq!(deleted, 2);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE tenant_id = ?")
        .bind(&tenant)
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(remaining, 1);
}

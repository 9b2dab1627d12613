//! Database initialization
//!
//! Creates the schema on first run and is safe to re-run on every
//! startup: every statement is `IF NOT EXISTS` and default settings are
//! seeded idempotently.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL mode keeps interactive queries responsive while a refresh
    // rewrites derived tables on another connection
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_settings_table(&pool).await?;
    create_tenants_table(&pool).await?;
    create_transactions_table(&pool).await?;
    create_excluded_items_table(&pool).await?;

    // Derived tables, one per builder
    create_menu_item_rollups_table(&pool).await?;
    create_hourly_summaries_table(&pool).await?;
    create_branch_summaries_table(&pool).await?;
    create_item_pairs_table(&pool).await?;

    // Refresh audit trail
    create_refresh_runs_table(&pool).await?;

    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create the settings table
///
/// Stores engine tunables as key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the tenants table
///
/// One row per restaurant business. The IANA timezone drives every
/// UTC-to-local conversion in the aggregation jobs.
pub async fn create_tenants_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tenants (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            timezone TEXT NOT NULL DEFAULT 'UTC',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the transactions fact table
///
/// Append-mostly: rows are immutable once written except for the
/// `excluded` flag, and `import_batch_id` which exists for import
/// rollback. All monetary values are integer minor currency units.
pub async fn create_transactions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            guid TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(guid) ON DELETE CASCADE,
            receipt_id TEXT NOT NULL,
            item_name TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'uncategorized',
            branch TEXT NOT NULL DEFAULT 'main',
            quantity INTEGER NOT NULL DEFAULT 1,
            unit_price INTEGER NOT NULL DEFAULT 0,
            gross_revenue INTEGER NOT NULL DEFAULT 0,
            sold_at TEXT NOT NULL,
            excluded INTEGER NOT NULL DEFAULT 0,
            import_batch_id TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (quantity >= 0),
            CHECK (excluded IN (0, 1))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_tenant_sold ON transactions(tenant_id, sold_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_tenant_receipt ON transactions(tenant_id, receipt_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_tenant_batch ON transactions(tenant_id, import_batch_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the excluded_items registry
///
/// Item names are stored lowercased so the SQL and in-memory exclusion
/// paths agree on case-insensitive matching.
pub async fn create_excluded_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS excluded_items (
            tenant_id TEXT NOT NULL REFERENCES tenants(guid) ON DELETE CASCADE,
            item_name TEXT NOT NULL,
            reason TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (tenant_id, item_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the menu_item_rollups derived table
///
/// One lifetime rollup row per (tenant, item), fully recomputed each
/// refresh.
pub async fn create_menu_item_rollups_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS menu_item_rollups (
            tenant_id TEXT NOT NULL REFERENCES tenants(guid) ON DELETE CASCADE,
            item_name TEXT NOT NULL,
            total_quantity INTEGER NOT NULL DEFAULT 0,
            total_revenue INTEGER NOT NULL DEFAULT 0,
            avg_price INTEGER NOT NULL DEFAULT 0,
            order_count INTEGER NOT NULL DEFAULT 0,
            first_sale_date TEXT NOT NULL,
            last_sale_date TEXT NOT NULL,
            months_active INTEGER NOT NULL DEFAULT 1,
            days_since_last_sale INTEGER NOT NULL DEFAULT 0,
            is_core_menu INTEGER NOT NULL DEFAULT 0,
            is_current_menu INTEGER NOT NULL DEFAULT 0,
            quadrant TEXT,
            PRIMARY KEY (tenant_id, item_name),
            CHECK (quadrant IS NULL OR quadrant IN ('star', 'plowhorse', 'puzzle', 'dog'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the hourly_summaries derived table
///
/// One row per (tenant, local date, local hour, branch, category)
/// bucket; day_of_week and macro_category are carried denormalized for
/// heatmap/dayparting reads.
pub async fn create_hourly_summaries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS hourly_summaries (
            tenant_id TEXT NOT NULL REFERENCES tenants(guid) ON DELETE CASCADE,
            date TEXT NOT NULL,
            hour INTEGER NOT NULL,
            day_of_week INTEGER NOT NULL,
            branch TEXT NOT NULL,
            category TEXT NOT NULL,
            macro_category TEXT NOT NULL,
            revenue INTEGER NOT NULL DEFAULT 0,
            quantity INTEGER NOT NULL DEFAULT 0,
            line_count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (tenant_id, date, hour, branch, category),
            CHECK (hour >= 0 AND hour <= 23),
            CHECK (day_of_week >= 0 AND day_of_week <= 6)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_hourly_tenant_date ON hourly_summaries(tenant_id, date)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the branch_summaries derived table
///
/// Three independent granularities share the table, discriminated by
/// period_type. Top items and the category breakdown are embedded as
/// JSON so reads never pay an O(periods x items) join.
pub async fn create_branch_summaries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS branch_summaries (
            tenant_id TEXT NOT NULL REFERENCES tenants(guid) ON DELETE CASCADE,
            period_type TEXT NOT NULL,
            period_start TEXT NOT NULL,
            branch TEXT NOT NULL,
            revenue INTEGER NOT NULL DEFAULT 0,
            transaction_count INTEGER NOT NULL DEFAULT 0,
            receipt_count INTEGER NOT NULL DEFAULT 0,
            avg_ticket INTEGER NOT NULL DEFAULT 0,
            top_items TEXT NOT NULL DEFAULT '[]',
            category_breakdown TEXT NOT NULL DEFAULT '{}',
            PRIMARY KEY (tenant_id, period_type, period_start, branch),
            CHECK (period_type IN ('daily', 'weekly', 'monthly'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_branch_summaries_period ON branch_summaries(tenant_id, period_type, period_start)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the item_pairs derived table
///
/// item_a sorts strictly before item_b, so each unordered pair appears
/// once and self-pairs cannot exist.
pub async fn create_item_pairs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS item_pairs (
            tenant_id TEXT NOT NULL REFERENCES tenants(guid) ON DELETE CASCADE,
            item_a TEXT NOT NULL,
            item_b TEXT NOT NULL,
            frequency INTEGER NOT NULL DEFAULT 0,
            support REAL NOT NULL DEFAULT 0.0,
            window_start TEXT NOT NULL,
            window_end TEXT NOT NULL,
            PRIMARY KEY (tenant_id, item_a, item_b),
            CHECK (item_a < item_b),
            CHECK (support >= 0.0 AND support <= 1.0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the refresh_runs audit table
pub async fn create_refresh_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS refresh_runs (
            guid TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(guid) ON DELETE CASCADE,
            state TEXT NOT NULL DEFAULT 'pending',
            table_counts TEXT NOT NULL DEFAULT '{}',
            error TEXT,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            CHECK (state IN ('pending', 'running', 'succeeded', 'failed'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_refresh_runs_tenant ON refresh_runs(tenant_id, started_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
///
/// Ensures all engine tunables exist with default values; NULL values
/// are reset to defaults.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // Time budgets
    ensure_setting(pool, "query_timeout_ms", "30000").await?;
    ensure_setting(pool, "refresh_timeout_ms", "120000").await?;

    // Query layer defaults
    ensure_setting(pool, "default_query_window_days", "90").await?;

    // Pair analyzer bounds
    ensure_setting(pool, "pair_window_days", "90").await?;
    ensure_setting(pool, "pair_min_frequency", "3").await?;
    ensure_setting(pool, "pair_top_n", "50").await?;
    ensure_setting(pool, "pair_max_receipt_items", "50").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the
/// default.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if !exists {
        // INSERT OR IGNORE handles concurrent initialization races
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;
        return Ok(());
    }

    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if value.is_none() {
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;
        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}

/// Read an integer setting, falling back to a default on absence or
/// malformed content
pub async fn get_setting_i64(pool: &SqlitePool, key: &str, default: i64) -> Result<i64> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?
        .flatten();

    Ok(value.and_then(|v| v.parse().ok()).unwrap_or(default))
}

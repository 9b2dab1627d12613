//! Operator CLI for the POSLens analytics engine
//!
//! Thin argument-parsing shell over the library: regenerate a tenant's
//! derived tables, run dashboard queries, manage the exclusion
//! registry, roll back import batches. Results print as JSON.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use poslens_engine::query::QueryParams;
use poslens_engine::refresh::RefreshCoordinator;
use poslens_engine::{exclusion, facts, query, refresh, tenants};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "poslens-engine", about = "POSLens analytics engine operator CLI")]
struct Cli {
    /// Database file path (falls back to POSLENS_DB, then config file)
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild all derived tables for one tenant
    Refresh {
        #[arg(long)]
        tenant: String,
    },
    /// Run a dashboard query
    Query {
        kind: QueryKind,
        #[arg(long)]
        tenant: String,
        #[arg(long, value_parser = parse_date)]
        from: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,
        #[arg(long = "branch")]
        branches: Vec<String>,
        #[arg(long = "category")]
        categories: Vec<String>,
    },
    /// Show the most recent refresh run for a tenant
    LastRun {
        #[arg(long)]
        tenant: String,
    },
    /// Manage the tenant's excluded-items registry
    Exclude {
        #[command(subcommand)]
        action: ExcludeAction,
    },
    /// Delete all transactions of one import batch
    RollbackBatch {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        batch: String,
    },
    /// Register a new tenant
    CreateTenant {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "UTC")]
        timezone: String,
    },
}

#[derive(Subcommand)]
enum ExcludeAction {
    Add {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        item: String,
        #[arg(long)]
        reason: Option<String>,
    },
    Remove {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        item: String,
    },
    List {
        #[arg(long)]
        tenant: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum QueryKind {
    Overview,
    Dayparting,
    Heatmap,
    Categories,
    PerformanceSummary,
    Trends,
    Branches,
    Bundles,
    MenuEngineering,
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("invalid date '{}': {}", s, e))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let db_path = poslens_common::config::resolve_database_path(cli.db.as_deref())?;
    let pool = poslens_common::db::init_database(&db_path).await?;

    let as_of = poslens_common::time::now();

    match cli.command {
        Command::Refresh { tenant } => {
            let coordinator = RefreshCoordinator::new();
            let result = coordinator.run_tenant_refresh(&pool, &tenant, as_of).await?;
            print_json(&result)?;
        }
        Command::Query {
            kind,
            tenant,
            from,
            to,
            branches,
            categories,
        } => {
            let params = QueryParams {
                from,
                to,
                branches,
                categories,
            };
            match kind {
                QueryKind::Overview => {
                    print_json(&query::overview::overview(&pool, &tenant, &params, as_of).await?)?
                }
                QueryKind::Dayparting => print_json(
                    &query::dayparting::dayparting(&pool, &tenant, &params, as_of).await?,
                )?,
                QueryKind::Heatmap => {
                    print_json(&query::dayparting::heatmap(&pool, &tenant, &params, as_of).await?)?
                }
                QueryKind::Categories => {
                    print_json(&query::branches::categories(&pool, &tenant, &params, as_of).await?)?
                }
                QueryKind::PerformanceSummary => print_json(
                    &query::menu::performance_summary(&pool, &tenant, &params, as_of).await?,
                )?,
                QueryKind::Trends => {
                    print_json(&query::trends::trends(&pool, &tenant, &params, as_of).await?)?
                }
                QueryKind::Branches => {
                    print_json(&query::branches::branches(&pool, &tenant, &params, as_of).await?)?
                }
                QueryKind::Bundles => {
                    print_json(&query::bundles::bundles(&pool, &tenant, &params, as_of).await?)?
                }
                QueryKind::MenuEngineering => print_json(
                    &query::menu::menu_engineering(&pool, &tenant, &params, as_of).await?,
                )?,
            }
        }
        Command::LastRun { tenant } => {
            print_json(&refresh::last_run(&pool, &tenant).await?)?;
        }
        Command::Exclude { action } => match action {
            ExcludeAction::Add {
                tenant,
                item,
                reason,
            } => {
                exclusion::add_excluded_item(&pool, &tenant, &item, reason.as_deref()).await?;
                print_json(&serde_json::json!({ "excluded": item }))?;
            }
            ExcludeAction::Remove { tenant, item } => {
                let removed = exclusion::remove_excluded_item(&pool, &tenant, &item).await?;
                print_json(&serde_json::json!({ "removed": removed }))?;
            }
            ExcludeAction::List { tenant } => {
                print_json(&exclusion::list_excluded_items(&pool, &tenant).await?)?;
            }
        },
        Command::RollbackBatch { tenant, batch } => {
            let deleted = facts::rollback_batch(&pool, &tenant, &batch).await?;
            print_json(&serde_json::json!({ "rows_deleted": deleted }))?;
        }
        Command::CreateTenant { name, timezone } => {
            print_json(&tenants::create_tenant(&pool, &name, &timezone).await?)?;
        }
    }

    Ok(())
}

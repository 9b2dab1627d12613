//! Tenant lookup and timezone resolution
//!
//! The engine never re-derives tenant context from ambient state: every
//! operation receives an already-authorized tenant identifier and fails
//! with a validation error when it does not exist.

use crate::error::{Error, Result};
use chrono_tz::Tz;
use poslens_common::db::models::Tenant;
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

/// Fetch a tenant by guid
pub async fn get_tenant(pool: &SqlitePool, tenant_id: &str) -> Result<Tenant> {
    sqlx::query_as::<_, Tenant>("SELECT guid, name, timezone FROM tenants WHERE guid = ?")
        .bind(tenant_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::Validation(format!("Unknown tenant: {}", tenant_id)))
}

/// Resolve a tenant's configured timezone
///
/// An unparseable timezone degrades to UTC with a warning instead of
/// failing the whole job.
pub fn tenant_tz(tenant: &Tenant) -> Tz {
    match poslens_common::time::parse_tz(&tenant.timezone) {
        Some(tz) => tz,
        None => {
            warn!(
                tenant_id = %tenant.guid,
                timezone = %tenant.timezone,
                "Unparseable tenant timezone, falling back to UTC"
            );
            chrono_tz::UTC
        }
    }
}

/// Register a new tenant
pub async fn create_tenant(pool: &SqlitePool, name: &str, timezone: &str) -> Result<Tenant> {
    if poslens_common::time::parse_tz(timezone).is_none() {
        return Err(Error::Validation(format!("Unknown timezone: {}", timezone)));
    }

    let guid = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO tenants (guid, name, timezone) VALUES (?, ?, ?)")
        .bind(&guid)
        .bind(name)
        .bind(timezone)
        .execute(pool)
        .await?;

    Ok(Tenant {
        guid,
        name: name.to_string(),
        timezone: timezone.to_string(),
    })
}

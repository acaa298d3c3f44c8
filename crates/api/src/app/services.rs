//! Store selection and service wiring.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use tenantbill_infra::services::BillingServices;
use tenantbill_infra::store::{
    PostgresInvoiceStore, PostgresTenantStore, PostgresTransactionSource, postgres,
};

use crate::config::ApiConfig;

/// Wire the billing services. `DATABASE_URL` selects the Postgres document
/// stores (schema applied on startup) with database transactions around every
/// tenant mutation; otherwise everything lives in memory.
pub async fn build_services(config: &ApiConfig) -> anyhow::Result<BillingServices> {
    let Some(database_url) = config.database_url.as_deref() else {
        info!("DATABASE_URL not set; using in-memory stores");
        return Ok(BillingServices::in_memory(config.billing.clone()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;
    postgres::migrate(&pool)
        .await
        .context("failed to apply billing schema")?;
    info!(
        max_connections = config.database_max_connections,
        "using Postgres document stores"
    );

    Ok(BillingServices::with_transactions(
        Arc::new(PostgresTenantStore::new(pool.clone())),
        Arc::new(PostgresInvoiceStore::new(pool.clone())),
        Arc::new(PostgresTransactionSource::new(pool)),
        config.billing.clone(),
    ))
}

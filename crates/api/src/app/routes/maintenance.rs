use std::sync::Arc;

use axum::{Router, extract::Extension, http::StatusCode, routing::post};

use tenantbill_infra::services::BillingServices;

use super::respond;

pub fn router() -> Router {
    Router::new().route("/resync", post(resync_all))
}

/// Reconcile every tenant; per-tenant failures are counted in the report.
pub async fn resync_all(
    Extension(services): Extension<Arc<BillingServices>>,
) -> axum::response::Response {
    respond(StatusCode::OK, services.reconciliation.resync_all().await)
}

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};

use tenantbill_infra::services::BillingServices;

use super::respond;
use crate::app::dto;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_tenant).get(list_tenants))
        .route("/:id", get(get_tenant).patch(update_tenant))
        .route("/:id/invoices", post(create_invoice).get(list_invoices))
        .route("/:id/resync", post(resync_tenant))
}

pub async fn register_tenant(
    Extension(services): Extension<Arc<BillingServices>>,
    Json(body): Json<dto::RegisterTenantRequest>,
) -> axum::response::Response {
    let profile = match body.into_profile() {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    respond(StatusCode::CREATED, services.tenants.register(profile).await)
}

pub async fn list_tenants(
    Extension(services): Extension<Arc<BillingServices>>,
) -> axum::response::Response {
    respond(StatusCode::OK, services.tenants.list().await)
}

pub async fn get_tenant(
    Extension(services): Extension<Arc<BillingServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let tenant_id = match dto::parse_tenant_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.tenants.get(tenant_id).await)
}

pub async fn update_tenant(
    Extension(services): Extension<Arc<BillingServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateTenantRequest>,
) -> axum::response::Response {
    let tenant_id = match dto::parse_tenant_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let current = match services.tenants.get(tenant_id).await {
        Ok(t) => t,
        Err(e) => return crate::app::errors::billing_error_to_response(e),
    };
    let profile = match body.apply_to(&current) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services.tenants.update_profile(tenant_id, profile).await,
    )
}

pub async fn create_invoice(
    Extension(services): Extension<Arc<BillingServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::CreateInvoiceRequest>,
) -> axum::response::Response {
    let tenant_id = match dto::parse_tenant_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let period = match dto::parse_period(&body.period) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::CREATED,
        services.lifecycle.create_invoice(tenant_id, period).await,
    )
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<BillingServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let tenant_id = match dto::parse_tenant_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.lifecycle.list_invoices(tenant_id).await)
}

pub async fn resync_tenant(
    Extension(services): Extension<Arc<BillingServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let tenant_id = match dto::parse_tenant_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.reconciliation.resync(tenant_id).await)
}

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post, put},
};

use tenantbill_infra::services::BillingServices;

use super::respond;
use crate::app::dto;

pub fn router() -> Router {
    Router::new()
        .route("/:id", get(get_invoice).delete(delete_invoice))
        .route("/:id/line-items", put(update_line_items))
        .route("/:id/status", post(transition_status))
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<BillingServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.lifecycle.get_invoice(invoice_id).await)
}

pub async fn update_line_items(
    Extension(services): Extension<Arc<BillingServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateLineItemsRequest>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services
            .lifecycle
            .update_line_items(invoice_id, body.line_items)
            .await,
    )
}

pub async fn transition_status(
    Extension(services): Extension<Arc<BillingServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::TransitionStatusRequest>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let status = match dto::parse_status(&body.status) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        StatusCode::OK,
        services.lifecycle.transition_status(invoice_id, status).await,
    )
}

pub async fn delete_invoice(
    Extension(services): Extension<Arc<BillingServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id = match dto::parse_invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.lifecycle.delete_invoice(invoice_id).await)
}

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};

use tenantbill_infra::services::BillingServices;

use super::respond;
use crate::app::dto;

/// Batch passes and the read-only period preview. The period is always explicit.
pub fn router() -> Router {
    Router::new()
        .route("/:period/invoices", post(create_for_period))
        .route("/:period/mark-sent", post(mark_sent_for_period))
        .route("/:period/preview", get(preview))
        .route("/:period/documents", get(documents))
}

pub async fn create_for_period(
    Extension(services): Extension<Arc<BillingServices>>,
    Path(period): Path<String>,
) -> axum::response::Response {
    let period = match dto::parse_period(&period) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.batch.create_for_period(&period).await)
}

pub async fn mark_sent_for_period(
    Extension(services): Extension<Arc<BillingServices>>,
    Path(period): Path<String>,
) -> axum::response::Response {
    let period = match dto::parse_period(&period) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.batch.mark_sent_for_period(&period).await)
}

pub async fn preview(
    Extension(services): Extension<Arc<BillingServices>>,
    Path(period): Path<String>,
) -> axum::response::Response {
    let period = match dto::parse_period(&period) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.batch.preview(&period).await)
}

/// Preview entries with the issuer block, as consumed by the invoice renderer.
pub async fn documents(
    Extension(services): Extension<Arc<BillingServices>>,
    Path(period): Path<String>,
) -> axum::response::Response {
    let period = match dto::parse_period(&period) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(StatusCode::OK, services.preview.documents(&period).await)
}

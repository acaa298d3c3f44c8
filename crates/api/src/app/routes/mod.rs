use axum::Router;

pub mod billing;
pub mod invoices;
pub mod maintenance;
pub mod system;
pub mod tenants;

/// Router for all operator endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/tenants", tenants::router())
        .nest("/invoices", invoices::router())
        .nest("/billing", billing::router())
        .nest("/maintenance", maintenance::router())
}

/// JSON body with `status`, or the mapped error response.
pub(crate) fn respond<T: serde::Serialize>(
    status: axum::http::StatusCode,
    result: Result<T, tenantbill_infra::services::BillingError>,
) -> axum::response::Response {
    use axum::response::IntoResponse;

    match result {
        Ok(body) => (status, axum::Json(body)).into_response(),
        Err(e) => crate::app::errors::billing_error_to_response(e),
    }
}

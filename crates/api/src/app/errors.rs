use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use tenantbill_infra::services::BillingError;

pub fn billing_error_to_response(err: BillingError) -> axum::response::Response {
    match err {
        BillingError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        BillingError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        e @ BillingError::TenantNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "tenant_not_found", e.to_string())
        }
        e @ BillingError::InvoiceNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "invoice_not_found", e.to_string())
        }
        BillingError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        e @ BillingError::MissingPeriodInvoice { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "missing_period_invoice", e.to_string())
        }
        BillingError::Store(e) => {
            tracing::error!(error = %e, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

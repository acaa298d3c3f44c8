use serde::{Deserialize, Deserializer};

use axum::http::StatusCode;
use tenantbill_billing::{BillingPeriod, InvoiceStatus, LineItem, Plan, Tenant, TenantProfile};
use tenantbill_core::{InvoiceId, TenantId};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTenantRequest {
    pub name: String,
    #[serde(default)]
    pub plan: Option<String>,
    pub billing_email: String,
}

/// Partial profile edit. `plan: null` clears the plan; an absent field keeps it.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTenantRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub plan: Option<Option<String>>,
    pub billing_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub period: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLineItemsRequest {
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionStatusRequest {
    pub status: String,
}

/// Distinguishes an explicit `null` from an absent field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// -------------------------
// Mapping helpers
// -------------------------

impl RegisterTenantRequest {
    pub fn into_profile(self) -> Result<TenantProfile, axum::response::Response> {
        Ok(TenantProfile {
            name: self.name,
            plan: parse_plan(self.plan.as_deref())?,
            billing_email: self.billing_email,
        })
    }
}

impl UpdateTenantRequest {
    /// Merge the edit onto the tenant's current profile.
    pub fn apply_to(self, current: &Tenant) -> Result<TenantProfile, axum::response::Response> {
        let mut profile = current.profile();
        if let Some(name) = self.name {
            profile.name = name;
        }
        if let Some(plan) = self.plan {
            profile.plan = parse_plan(plan.as_deref())?;
        }
        if let Some(email) = self.billing_email {
            profile.billing_email = email;
        }
        Ok(profile)
    }
}

fn parse_plan(raw: Option<&str>) -> Result<Option<Plan>, axum::response::Response> {
    raw.map(|s| {
        s.parse().map_err(|_| {
            errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_plan",
                "plan must be one of: free, standard, pro",
            )
        })
    })
    .transpose()
}

pub fn parse_tenant_id(raw: &str) -> Result<TenantId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid tenant id"))
}

pub fn parse_invoice_id(raw: &str) -> Result<InvoiceId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid invoice id"))
}

pub fn parse_period(raw: &str) -> Result<BillingPeriod, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_period",
            format!("period must be YYYY-MM, got '{raw}'"),
        )
    })
}

pub fn parse_status(raw: &str) -> Result<InvoiceStatus, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_status",
            "status must be one of: unbilled, billed, paid",
        )
    })
}

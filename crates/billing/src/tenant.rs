use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tenantbill_core::{Entity, TenantId};

use crate::invoice::InvoiceStatus;
use crate::period::BillingPeriod;
use crate::plan::Plan;

/// Cached summary of a tenant's latest invoice.
///
/// Derived data: written only by reconciliation, never by profile edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastBilling {
    pub period: BillingPeriod,
    pub status: InvoiceStatus,
    pub updated_at: DateTime<Utc>,
}

impl LastBilling {
    /// Compare the projected fields, ignoring `updated_at`.
    pub fn same_summary(&self, period: &BillingPeriod, status: InvoiceStatus) -> bool {
        &self.period == period && self.status == status
    }
}

/// User-editable tenant fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantProfile {
    pub name: String,
    #[serde(default)]
    pub plan: Option<Plan>,
    pub billing_email: String,
}

/// Tenant aggregate document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    id: TenantId,
    name: String,
    #[serde(default)]
    plan: Option<Plan>,
    billing_email: String,
    /// Absent (not null) when the tenant has no invoice records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_billing: Option<LastBilling>,
}

impl Tenant {
    pub fn new(id: TenantId, profile: TenantProfile) -> Self {
        Self {
            id,
            name: profile.name,
            plan: profile.plan,
            billing_email: profile.billing_email,
            last_billing: None,
        }
    }

    pub fn id_typed(&self) -> TenantId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plan(&self) -> Option<Plan> {
        self.plan
    }

    pub fn billing_email(&self) -> &str {
        &self.billing_email
    }

    pub fn last_billing(&self) -> Option<&LastBilling> {
        self.last_billing.as_ref()
    }

    pub fn profile(&self) -> TenantProfile {
        TenantProfile {
            name: self.name.clone(),
            plan: self.plan,
            billing_email: self.billing_email.clone(),
        }
    }

    /// Overwrite profile fields only; `last_billing` is preserved.
    pub fn apply_profile(&mut self, profile: TenantProfile) {
        self.name = profile.name;
        self.plan = profile.plan;
        self.billing_email = profile.billing_email;
    }

    pub fn set_last_billing(&mut self, last_billing: LastBilling) {
        self.last_billing = Some(last_billing);
    }

    pub fn clear_last_billing(&mut self) {
        self.last_billing = None;
    }
}

impl Entity for Tenant {
    type Id = TenantId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

use tracing::{info, instrument};

use tenantbill_billing::{Tenant, TenantProfile};
use tenantbill_core::TenantId;

use crate::store::SharedTenantStore;

use super::BillingError;

/// Tenant registration and profile edits. Never touches `lastBilling`.
#[derive(Clone)]
pub struct TenantAdminService {
    tenants: SharedTenantStore,
}

impl TenantAdminService {
    pub fn new(tenants: SharedTenantStore) -> Self {
        Self { tenants }
    }

    #[instrument(skip(self, profile), fields(name = %profile.name), err)]
    pub async fn register(&self, profile: TenantProfile) -> Result<Tenant, BillingError> {
        let profile = normalize(profile)?;
        let tenant = Tenant::new(TenantId::new(), profile);
        self.tenants.insert(tenant.clone()).await?;
        info!(tenant_id = %tenant.id_typed(), "tenant registered");
        Ok(tenant)
    }

    /// Overwrite name, plan and billing email.
    #[instrument(skip(self, profile), fields(tenant_id = %tenant_id), err)]
    pub async fn update_profile(
        &self,
        tenant_id: TenantId,
        profile: TenantProfile,
    ) -> Result<Tenant, BillingError> {
        let profile = normalize(profile)?;
        if !self.tenants.update_profile(tenant_id, profile).await? {
            return Err(BillingError::TenantNotFound(tenant_id));
        }
        self.get(tenant_id).await
    }

    pub async fn get(&self, tenant_id: TenantId) -> Result<Tenant, BillingError> {
        self.tenants
            .get(tenant_id)
            .await?
            .ok_or(BillingError::TenantNotFound(tenant_id))
    }

    pub async fn list(&self) -> Result<Vec<Tenant>, BillingError> {
        Ok(self.tenants.list().await?)
    }
}

fn normalize(profile: TenantProfile) -> Result<TenantProfile, BillingError> {
    let name = profile.name.trim();
    if name.is_empty() {
        return Err(BillingError::Validation("name must not be empty".to_string()));
    }
    let email = profile.billing_email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
        _ => {
            return Err(BillingError::Validation(
                "billingEmail must be an email address".to_string(),
            ));
        }
    }
    Ok(TenantProfile {
        name: name.to_string(),
        plan: profile.plan,
        billing_email: email.to_string(),
    })
}

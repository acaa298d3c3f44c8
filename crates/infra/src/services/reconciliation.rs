use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, instrument};

use tenantbill_billing::{LastBilling, latest_billing};
use tenantbill_core::TenantId;

use crate::store::{SharedTenantStore, SharedTransactionSource, TenantTransaction};

use super::BillingError;

/// Result of one reconciliation pass for a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "lastBilling", rename_all = "lowercase")]
pub enum ReconcileOutcome {
    /// Stored summary already matched; nothing was written.
    Unchanged,
    Updated(LastBilling),
    /// Tenant has no records; the field was removed.
    Cleared,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub tenants: usize,
    pub updated: usize,
    pub cleared: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Recomputes `Tenant.lastBilling` from the tenant's invoice set.
///
/// This is the only writer of `lastBilling`. Lifecycle mutations call
/// [`ReconciliationEngine::reconcile`] inside their own tenant transaction;
/// [`ReconciliationEngine::resync`] opens one for repairs.
#[derive(Clone)]
pub struct ReconciliationEngine {
    tenants: SharedTenantStore,
    transactions: SharedTransactionSource,
}

impl ReconciliationEngine {
    pub fn new(tenants: SharedTenantStore, transactions: SharedTransactionSource) -> Self {
        Self {
            tenants,
            transactions,
        }
    }

    /// Repair entry point: reconciles in a transaction of its own.
    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub async fn resync(&self, tenant_id: TenantId) -> Result<ReconcileOutcome, BillingError> {
        let mut tx = self.transactions.begin(tenant_id).await?;
        let outcome = self.reconcile(tx.as_mut()).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Recompute and write the summary within `tx`. Reads the invoice set through
    /// the same transaction, so the caller's uncommitted mutation is included.
    pub(crate) async fn reconcile(
        &self,
        tx: &mut dyn TenantTransaction,
    ) -> Result<ReconcileOutcome, BillingError> {
        let tenant_id = tx.tenant_id();
        let tenant = tx
            .tenant()
            .await?
            .ok_or(BillingError::TenantNotFound(tenant_id))?;
        let records = tx.invoices().await?;

        let outcome = match latest_billing(&records) {
            None if tenant.last_billing().is_none() => ReconcileOutcome::Unchanged,
            None => {
                if !tx.clear_last_billing().await? {
                    return Err(BillingError::TenantNotFound(tenant_id));
                }
                ReconcileOutcome::Cleared
            }
            Some(latest)
                if tenant
                    .last_billing()
                    .is_some_and(|lb| lb.same_summary(latest.period(), latest.status())) =>
            {
                ReconcileOutcome::Unchanged
            }
            Some(latest) => {
                let summary = LastBilling {
                    period: latest.period().clone(),
                    status: latest.status(),
                    updated_at: Utc::now(),
                };
                if !tx.set_last_billing(summary.clone()).await? {
                    return Err(BillingError::TenantNotFound(tenant_id));
                }
                ReconcileOutcome::Updated(summary)
            }
        };

        match &outcome {
            ReconcileOutcome::Updated(lb) => info!(
                tenant_id = %tenant_id,
                period = %lb.period,
                status = %lb.status,
                invoice_count = records.len(),
                "lastBilling updated"
            ),
            ReconcileOutcome::Cleared => info!(tenant_id = %tenant_id, "lastBilling cleared"),
            ReconcileOutcome::Unchanged => {}
        }
        Ok(outcome)
    }

    /// Maintenance sweep over every tenant. Per-tenant failures are logged and counted.
    #[instrument(skip(self), err)]
    pub async fn resync_all(&self) -> Result<SweepReport, BillingError> {
        let tenants = self.tenants.list().await?;
        let mut report = SweepReport {
            tenants: tenants.len(),
            ..SweepReport::default()
        };

        for tenant in tenants {
            let tenant_id = tenant.id_typed();
            match self.resync(tenant_id).await {
                Ok(ReconcileOutcome::Updated(_)) => report.updated += 1,
                Ok(ReconcileOutcome::Cleared) => report.cleared += 1,
                Ok(ReconcileOutcome::Unchanged) => report.unchanged += 1,
                Err(e) => {
                    error!(tenant_id = %tenant_id, error = %e, "resync failed during sweep");
                    report.failed += 1;
                }
            }
        }

        info!(
            tenants = report.tenants,
            updated = report.updated,
            cleared = report.cleared,
            unchanged = report.unchanged,
            failed = report.failed,
            "resync sweep finished"
        );
        Ok(report)
    }
}

use std::future::Future;
use std::sync::Arc;

use futures::{StreamExt, stream};
use serde::Serialize;
use tracing::{error, info, instrument};

use tenantbill_billing::{BillingPeriod, eligible_for_creation, eligible_for_mark_sent};
use tenantbill_core::TenantId;

use crate::config::BillingConfig;
use crate::store::SharedTenantStore;

use super::{BillingError, BillingPreviewAggregator, Guarded, InvoiceLifecycleService, PreviewEntry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub tenant_id: TenantId,
    pub error: String,
}

/// Outcome of one batch pass.
///
/// `eligible` counts the tenants the summary filter selected, and
/// `eligible == succeeded + skipped + failed`. A tenant is skipped when the
/// re-check inside its transaction finds it no longer qualifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub period: BillingPeriod,
    pub eligible: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    fn new(period: BillingPeriod, eligible: usize) -> Self {
        Self {
            period,
            eligible,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            failures: Vec::new(),
        }
    }
}

/// Bulk operations over every eligible tenant of a period.
///
/// Each tenant runs its own lifecycle pipeline; a failing tenant is logged and
/// counted and never stops the pass. Eligibility is read from `lastBilling`
/// and checked again inside each tenant's transaction, so re-running a pass is
/// safe and a concurrent manual edit is never overwritten.
#[derive(Clone)]
pub struct BatchBillingOrchestrator {
    tenants: SharedTenantStore,
    lifecycle: InvoiceLifecycleService,
    preview: BillingPreviewAggregator,
    config: Arc<BillingConfig>,
}

impl BatchBillingOrchestrator {
    pub fn new(
        tenants: SharedTenantStore,
        lifecycle: InvoiceLifecycleService,
        preview: BillingPreviewAggregator,
        config: Arc<BillingConfig>,
    ) -> Self {
        Self {
            tenants,
            lifecycle,
            preview,
            config,
        }
    }

    /// Create the period's invoice for every billable tenant not yet billed for it.
    #[instrument(skip(self), fields(period = %period), err)]
    pub async fn create_for_period(&self, period: &BillingPeriod) -> Result<BatchReport, BillingError> {
        let eligible: Vec<TenantId> = self
            .tenants
            .list()
            .await?
            .iter()
            .filter(|t| eligible_for_creation(t, period))
            .map(|t| t.id_typed())
            .collect();

        let report = self
            .run(period, eligible, |tenant_id| {
                self.lifecycle.create_if_missing(tenant_id, period)
            })
            .await;

        info!(
            eligible = report.eligible,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            "batch invoice creation finished"
        );
        Ok(report)
    }

    /// Move every `{period, unbilled}` tenant's record for the period to `billed`.
    #[instrument(skip(self), fields(period = %period), err)]
    pub async fn mark_sent_for_period(
        &self,
        period: &BillingPeriod,
    ) -> Result<BatchReport, BillingError> {
        let eligible: Vec<TenantId> = self
            .tenants
            .list_by_last_billing_period(period)
            .await?
            .iter()
            .filter(|t| eligible_for_mark_sent(t, period))
            .map(|t| t.id_typed())
            .collect();

        let report = self
            .run(period, eligible, |tenant_id| {
                self.lifecycle.mark_period_sent(tenant_id, period)
            })
            .await;

        info!(
            eligible = report.eligible,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            "batch mark-sent finished"
        );
        Ok(report)
    }

    pub async fn preview(&self, period: &BillingPeriod) -> Result<Vec<PreviewEntry>, BillingError> {
        self.preview.preview(period).await
    }

    async fn run<F, Fut>(
        &self,
        period: &BillingPeriod,
        eligible: Vec<TenantId>,
        pipeline: F,
    ) -> BatchReport
    where
        F: Fn(TenantId) -> Fut,
        Fut: Future<Output = Result<Guarded, BillingError>>,
    {
        let mut report = BatchReport::new(period.clone(), eligible.len());

        let results: Vec<(TenantId, Result<Guarded, BillingError>)> = stream::iter(eligible)
            .map(|tenant_id| {
                let fut = pipeline(tenant_id);
                async move { (tenant_id, fut.await) }
            })
            .buffer_unordered(self.config.batch_concurrency.max(1))
            .collect()
            .await;

        for (tenant_id, result) in results {
            match result {
                Ok(Guarded::Applied(_)) => report.succeeded += 1,
                Ok(Guarded::Skipped) => report.skipped += 1,
                Err(e) => {
                    error!(tenant_id = %tenant_id, period = %period, error = %e, "tenant pipeline failed");
                    report.failed += 1;
                    report.failures.push(BatchFailure {
                        tenant_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        report.failures.sort_by_key(|f| f.tenant_id);
        report
    }
}

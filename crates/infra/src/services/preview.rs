use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use tracing::{instrument, warn};

use tenantbill_billing::{BillingPeriod, InvoiceAmounts, InvoiceRecord, Tenant, record_for_period};

use crate::config::{BillingConfig, IssuerInfo};
use crate::store::{SharedInvoiceStore, SharedTenantStore};

use super::BillingError;

/// One tenant/invoice pair of a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewEntry {
    pub tenant: Tenant,
    pub invoice: InvoiceRecord,
    pub amounts: InvoiceAmounts,
}

/// Input handed to the external invoice renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDocument {
    pub tenant: Tenant,
    pub invoice: InvoiceRecord,
    pub issuer: IssuerInfo,
    pub amounts: InvoiceAmounts,
}

/// Read-only join of tenants and their invoice for one period.
#[derive(Clone)]
pub struct BillingPreviewAggregator {
    tenants: SharedTenantStore,
    invoices: SharedInvoiceStore,
    config: Arc<BillingConfig>,
}

impl BillingPreviewAggregator {
    pub fn new(
        tenants: SharedTenantStore,
        invoices: SharedInvoiceStore,
        config: Arc<BillingConfig>,
    ) -> Self {
        Self {
            tenants,
            invoices,
            config,
        }
    }

    /// Tenants whose `lastBilling.period` is `period`, with that period's record,
    /// ordered by tenant name.
    #[instrument(skip(self), fields(period = %period), err)]
    pub async fn preview(&self, period: &BillingPeriod) -> Result<Vec<PreviewEntry>, BillingError> {
        let tenants = self.tenants.list_by_last_billing_period(period).await?;

        let mut entries: Vec<PreviewEntry> = stream::iter(tenants)
            .map(|tenant| self.entry_for(tenant, period))
            .buffered(self.config.batch_concurrency.max(1))
            .try_filter_map(|entry| async move { Ok(entry) })
            .try_collect()
            .await?;

        entries.sort_by(|a, b| {
            a.tenant
                .name()
                .cmp(b.tenant.name())
                .then_with(|| a.tenant.id_typed().cmp(&b.tenant.id_typed()))
        });
        Ok(entries)
    }

    /// Preview entries wrapped with the configured issuer block.
    pub async fn documents(
        &self,
        period: &BillingPeriod,
    ) -> Result<Vec<InvoiceDocument>, BillingError> {
        let issuer = &self.config.issuer;
        Ok(self
            .preview(period)
            .await?
            .into_iter()
            .map(|entry| InvoiceDocument {
                tenant: entry.tenant,
                invoice: entry.invoice,
                issuer: issuer.clone(),
                amounts: entry.amounts,
            })
            .collect())
    }

    async fn entry_for(
        &self,
        tenant: Tenant,
        period: &BillingPeriod,
    ) -> Result<Option<PreviewEntry>, BillingError> {
        let records = self
            .invoices
            .list_for_period(tenant.id_typed(), period)
            .await?;
        let Some(invoice) = record_for_period(&records, period).cloned() else {
            warn!(
                tenant_id = %tenant.id_typed(),
                period = %period,
                "lastBilling names a period without a record; skipping"
            );
            return Ok(None);
        };
        let amounts = invoice.breakdown()?;
        Ok(Some(PreviewEntry {
            tenant,
            invoice,
            amounts,
        }))
    }
}

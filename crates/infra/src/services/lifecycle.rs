use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use tenantbill_billing::{
    BillingPeriod, InvoiceRecord, InvoiceStatus, LineItem, Plan, Tenant, eligible_for_creation,
    eligible_for_mark_sent, record_for_period,
};
use tenantbill_core::{InvoiceId, TenantId};

use crate::config::BillingConfig;
use crate::store::{
    SharedInvoiceStore, SharedTenantStore, SharedTransactionSource, TenantTransaction,
};

use super::{BillingError, ReconciliationEngine};

/// Result of a conditional write made on behalf of a batch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded {
    Applied(InvoiceRecord),
    /// The tenant no longer qualified once its transaction was open.
    Skipped,
}

/// Create, edit, transition and delete single invoice records.
///
/// Every mutation runs in one tenant transaction together with the
/// reconciliation it triggers. A failed reconciliation fails the whole
/// operation; on transactional backends the mutation is rolled back with it.
#[derive(Clone)]
pub struct InvoiceLifecycleService {
    tenants: SharedTenantStore,
    invoices: SharedInvoiceStore,
    transactions: SharedTransactionSource,
    reconciliation: ReconciliationEngine,
    config: Arc<BillingConfig>,
}

impl InvoiceLifecycleService {
    pub fn new(
        tenants: SharedTenantStore,
        invoices: SharedInvoiceStore,
        transactions: SharedTransactionSource,
        reconciliation: ReconciliationEngine,
        config: Arc<BillingConfig>,
    ) -> Self {
        Self {
            tenants,
            invoices,
            transactions,
            reconciliation,
            config,
        }
    }

    /// Create the plan-priced `unbilled` record for `period`.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, period = %period), err)]
    pub async fn create_invoice(
        &self,
        tenant_id: TenantId,
        period: BillingPeriod,
    ) -> Result<InvoiceRecord, BillingError> {
        let mut tx = self.transactions.begin(tenant_id).await?;
        let tenant = load_tenant(tx.as_mut()).await?;
        let plan = billable_plan(&tenant)?;

        if !self.config.allow_duplicate_periods
            && !tx.invoices_for_period(&period).await?.is_empty()
        {
            return Err(BillingError::Conflict(format!(
                "tenant {tenant_id} already has an invoice for {period}"
            )));
        }

        let record = self.insert_plan_invoice(tx.as_mut(), plan, period).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Batch variant of [`Self::create_invoice`]: skips the tenant when it no
    /// longer passes the creation filter or already has a record for `period`.
    /// Never creates a duplicate, whatever `allow_duplicate_periods` says.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, period = %period), err)]
    pub async fn create_if_missing(
        &self,
        tenant_id: TenantId,
        period: &BillingPeriod,
    ) -> Result<Guarded, BillingError> {
        let mut tx = self.transactions.begin(tenant_id).await?;
        let tenant = load_tenant(tx.as_mut()).await?;

        if !eligible_for_creation(&tenant, period)
            || !tx.invoices_for_period(period).await?.is_empty()
        {
            info!("tenant no longer eligible or already billed for the period; skipped");
            return Ok(Guarded::Skipped);
        }

        let plan = billable_plan(&tenant)?;
        let record = self
            .insert_plan_invoice(tx.as_mut(), plan, period.clone())
            .await?;
        tx.commit().await?;
        Ok(Guarded::Applied(record))
    }

    /// Replace line items and recompute the amount. Status is untouched, and
    /// `lastBilling` carries no amount, so no reconciliation runs.
    #[instrument(skip(self, line_items), fields(invoice_id = %invoice_id, line_count = line_items.len()), err)]
    pub async fn update_line_items(
        &self,
        invoice_id: InvoiceId,
        line_items: Vec<LineItem>,
    ) -> Result<InvoiceRecord, BillingError> {
        let (mut tx, mut record) = self.open_for_record(invoice_id).await?;

        let amounts = record.replace_line_items(line_items, self.config.tax)?;
        if !tx.replace_invoice(&record).await? {
            return Err(BillingError::InvoiceNotFound(invoice_id));
        }
        tx.commit().await?;
        info!(
            tenant_id = %record.tenant_id(),
            subtotal = amounts.subtotal,
            tax = amounts.tax,
            amount = amounts.amount,
            "line items replaced"
        );
        Ok(record)
    }

    /// Set any status; no transition is forbidden.
    #[instrument(skip(self), fields(invoice_id = %invoice_id, status = %status), err)]
    pub async fn transition_status(
        &self,
        invoice_id: InvoiceId,
        status: InvoiceStatus,
    ) -> Result<InvoiceRecord, BillingError> {
        let (mut tx, mut record) = self.open_for_record(invoice_id).await?;

        let previous = record.set_status(status);
        if !tx.replace_invoice(&record).await? {
            return Err(BillingError::InvoiceNotFound(invoice_id));
        }
        self.reconciliation.reconcile(tx.as_mut()).await?;
        tx.commit().await?;
        info!(
            tenant_id = %record.tenant_id(),
            period = %record.period(),
            from = %previous,
            to = %status,
            "invoice status changed"
        );
        Ok(record)
    }

    /// Move the tenant's record for `period` from `unbilled` to `billed`.
    ///
    /// Eligibility is checked again inside the transaction: if the summary no
    /// longer says `{period, unbilled}` or the record has moved on (for example
    /// a payment landed after the batch selected the tenant), nothing is
    /// written to the record and the tenant is skipped. A summary pointing at a
    /// missing record is repaired and reported as
    /// [`BillingError::MissingPeriodInvoice`].
    #[instrument(skip(self), fields(tenant_id = %tenant_id, period = %period), err)]
    pub async fn mark_period_sent(
        &self,
        tenant_id: TenantId,
        period: &BillingPeriod,
    ) -> Result<Guarded, BillingError> {
        let mut tx = self.transactions.begin(tenant_id).await?;
        let tenant = load_tenant(tx.as_mut()).await?;
        if !eligible_for_mark_sent(&tenant, period) {
            return Ok(Guarded::Skipped);
        }

        let records = tx.invoices_for_period(period).await?;
        let Some(mut record) = record_for_period(&records, period).cloned() else {
            warn!("lastBilling points at a missing record; resyncing");
            self.reconciliation.reconcile(tx.as_mut()).await?;
            tx.commit().await?;
            return Err(BillingError::MissingPeriodInvoice {
                tenant_id,
                period: period.clone(),
            });
        };

        if record.status() != InvoiceStatus::Unbilled {
            info!(status = %record.status(), "record is no longer unbilled; skipped");
            self.reconciliation.reconcile(tx.as_mut()).await?;
            tx.commit().await?;
            return Ok(Guarded::Skipped);
        }

        record.set_status(InvoiceStatus::Billed);
        if !tx.replace_invoice(&record).await? {
            return Err(BillingError::InvoiceNotFound(record.id_typed()));
        }
        self.reconciliation.reconcile(tx.as_mut()).await?;
        tx.commit().await?;
        info!(invoice_id = %record.id_typed(), "invoice marked sent");
        Ok(Guarded::Applied(record))
    }

    /// Remove a record. The only path that can move `lastBilling` backwards
    /// or remove it.
    #[instrument(skip(self), fields(invoice_id = %invoice_id), err)]
    pub async fn delete_invoice(&self, invoice_id: InvoiceId) -> Result<InvoiceRecord, BillingError> {
        let (mut tx, _) = self.open_for_record(invoice_id).await?;

        let removed = tx
            .delete_invoice(invoice_id)
            .await?
            .ok_or(BillingError::InvoiceNotFound(invoice_id))?;
        self.reconciliation.reconcile(tx.as_mut()).await?;
        tx.commit().await?;
        info!(
            tenant_id = %removed.tenant_id(),
            period = %removed.period(),
            "invoice deleted"
        );
        Ok(removed)
    }

    pub async fn get_invoice(&self, invoice_id: InvoiceId) -> Result<InvoiceRecord, BillingError> {
        self.invoices
            .get(invoice_id)
            .await?
            .ok_or(BillingError::InvoiceNotFound(invoice_id))
    }

    /// A tenant's records, newest period first.
    pub async fn list_invoices(&self, tenant_id: TenantId) -> Result<Vec<InvoiceRecord>, BillingError> {
        if self.tenants.get(tenant_id).await?.is_none() {
            return Err(BillingError::TenantNotFound(tenant_id));
        }
        let mut records = self.invoices.list_for_tenant(tenant_id).await?;
        records.sort_by(|a, b| b.recency_key().cmp(&a.recency_key()));
        Ok(records)
    }

    /// Open the owning tenant's transaction and re-read the record inside it.
    async fn open_for_record(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<(Box<dyn TenantTransaction>, InvoiceRecord), BillingError> {
        let tenant_id = self.get_invoice(invoice_id).await?.tenant_id();
        let mut tx = self.transactions.begin(tenant_id).await?;
        let record = tx
            .invoice(invoice_id)
            .await?
            .ok_or(BillingError::InvoiceNotFound(invoice_id))?;
        Ok((tx, record))
    }

    async fn insert_plan_invoice(
        &self,
        tx: &mut dyn TenantTransaction,
        plan: Plan,
        period: BillingPeriod,
    ) -> Result<InvoiceRecord, BillingError> {
        let record = InvoiceRecord::for_plan(
            InvoiceId::new(),
            tx.tenant_id(),
            period,
            plan,
            &self.config.prices,
            self.config.tax,
            Utc::now(),
        )?;
        tx.insert_invoice(record.clone()).await?;
        self.reconciliation.reconcile(tx).await?;
        info!(
            invoice_id = %record.id_typed(),
            plan = %plan,
            amount = record.amount(),
            "invoice created"
        );
        Ok(record)
    }
}

async fn load_tenant(tx: &mut dyn TenantTransaction) -> Result<Tenant, BillingError> {
    let tenant_id = tx.tenant_id();
    tx.tenant()
        .await?
        .ok_or(BillingError::TenantNotFound(tenant_id))
}

fn billable_plan(tenant: &Tenant) -> Result<Plan, BillingError> {
    tenant.plan().ok_or_else(|| {
        BillingError::Validation(format!("tenant {} has no plan", tenant.id_typed()))
    })
}

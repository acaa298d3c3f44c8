//! Billing application services.
//!
//! Every mutating path follows the same pipeline:
//!
//! ```text
//! begin tenant transaction -> mutate invoices -> ReconciliationEngine::reconcile -> commit
//! ```
//!
//! `Tenant.lastBilling` is written from exactly one place,
//! [`ReconciliationEngine`].

pub mod batch;
pub mod lifecycle;
pub mod preview;
pub mod reconciliation;
pub mod tenants;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use thiserror::Error;

use tenantbill_billing::BillingPeriod;
use tenantbill_core::{DomainError, InvoiceId, TenantId};

use crate::config::BillingConfig;
use crate::locks::LockingTransactionSource;
use crate::store::{
    InMemoryInvoiceStore, InMemoryTenantStore, SharedInvoiceStore, SharedTenantStore,
    SharedTransactionSource, StoreError,
};

pub use batch::{BatchBillingOrchestrator, BatchFailure, BatchReport};
pub use lifecycle::{Guarded, InvoiceLifecycleService};
pub use preview::{BillingPreviewAggregator, InvoiceDocument, PreviewEntry};
pub use reconciliation::{ReconcileOutcome, ReconciliationEngine, SweepReport};
pub use tenants::TenantAdminService;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("tenant {0} not found")]
    TenantNotFound(TenantId),

    #[error("invoice {0} not found")]
    InvoiceNotFound(InvoiceId),

    #[error("conflict: {0}")]
    Conflict(String),

    /// `lastBilling` names a period for which the tenant has no record.
    #[error("tenant {tenant_id} has no invoice for {period}")]
    MissingPeriodInvoice {
        tenant_id: TenantId,
        period: BillingPeriod,
    },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for BillingError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Duplicate(msg) => BillingError::Conflict(msg),
            other => BillingError::Store(other),
        }
    }
}

impl From<DomainError> for BillingError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => BillingError::Validation(msg),
            DomainError::InvalidId(msg) => BillingError::Validation(msg),
            DomainError::InvariantViolation(msg) => BillingError::InvariantViolation(msg),
        }
    }
}

/// All billing services wired over one pair of stores.
#[derive(Clone)]
pub struct BillingServices {
    pub tenants: TenantAdminService,
    pub lifecycle: InvoiceLifecycleService,
    pub reconciliation: ReconciliationEngine,
    pub batch: BatchBillingOrchestrator,
    pub preview: BillingPreviewAggregator,
    config: Arc<BillingConfig>,
}

impl BillingServices {
    /// Services over stores without native transactions; tenant writes are
    /// serialized in-process.
    pub fn new(
        tenant_store: SharedTenantStore,
        invoice_store: SharedInvoiceStore,
        config: BillingConfig,
    ) -> Self {
        let transactions = Arc::new(LockingTransactionSource::new(
            tenant_store.clone(),
            invoice_store.clone(),
        ));
        Self::with_transactions(tenant_store, invoice_store, transactions, config)
    }

    pub fn with_transactions(
        tenant_store: SharedTenantStore,
        invoice_store: SharedInvoiceStore,
        transactions: SharedTransactionSource,
        config: BillingConfig,
    ) -> Self {
        let config = Arc::new(config);

        let reconciliation = ReconciliationEngine::new(tenant_store.clone(), transactions.clone());
        let lifecycle = InvoiceLifecycleService::new(
            tenant_store.clone(),
            invoice_store.clone(),
            transactions,
            reconciliation.clone(),
            config.clone(),
        );
        let preview =
            BillingPreviewAggregator::new(tenant_store.clone(), invoice_store, config.clone());
        let batch = BatchBillingOrchestrator::new(
            tenant_store.clone(),
            lifecycle.clone(),
            preview.clone(),
            config.clone(),
        );
        let tenants = TenantAdminService::new(tenant_store);

        Self {
            tenants,
            lifecycle,
            reconciliation,
            batch,
            preview,
            config,
        }
    }

    /// Services over fresh in-memory stores.
    pub fn in_memory(config: BillingConfig) -> Self {
        Self::new(
            Arc::new(InMemoryTenantStore::new()),
            Arc::new(InMemoryInvoiceStore::new()),
            config,
        )
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }
}

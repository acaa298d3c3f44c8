//! Per-tenant mutual exclusion for "mutate, then reconcile" sequences.
//!
//! Two concurrent mutations of the same tenant could otherwise interleave their
//! reconciliation reads and writes and leave `lastBilling` reflecting a stale
//! invoice set. Different tenants never contend.
//!
//! [`LockingTransactionSource`] turns any pair of stores into a
//! [`TransactionSource`] by holding the tenant's lock for the lifetime of the
//! transaction. It is the transaction backend for stores without native
//! transactions (the in-memory ones). Writes are applied immediately and are
//! not undone when an uncommitted transaction is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use tenantbill_billing::{BillingPeriod, InvoiceRecord, LastBilling, Tenant};
use tenantbill_core::{InvoiceId, TenantId};

use crate::store::{
    SharedInvoiceStore, SharedTenantStore, StoreError, TenantTransaction, TransactionSource,
};

/// Registry of one async mutex per tenant id, created on first use.
#[derive(Debug, Default)]
pub struct TenantLocks {
    locks: Mutex<HashMap<TenantId, Arc<AsyncMutex<()>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `tenant_id`. Released on drop.
    pub async fn acquire(&self, tenant_id: TenantId) -> OwnedMutexGuard<()> {
        let lock = {
            // A poisoned registry only means another thread panicked while
            // inserting; the map itself is still usable.
            let mut map = match self.locks.lock() {
                Ok(map) => map,
                Err(poisoned) => poisoned.into_inner(),
            };
            map.entry(tenant_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// In-process tenant transactions over plain stores.
#[derive(Clone)]
pub struct LockingTransactionSource {
    tenants: SharedTenantStore,
    invoices: SharedInvoiceStore,
    locks: Arc<TenantLocks>,
}

impl LockingTransactionSource {
    pub fn new(tenants: SharedTenantStore, invoices: SharedInvoiceStore) -> Self {
        Self {
            tenants,
            invoices,
            locks: Arc::new(TenantLocks::new()),
        }
    }
}

#[async_trait]
impl TransactionSource for LockingTransactionSource {
    async fn begin(&self, tenant_id: TenantId) -> Result<Box<dyn TenantTransaction>, StoreError> {
        let guard = self.locks.acquire(tenant_id).await;
        Ok(Box::new(LockedTenant {
            tenant_id,
            tenants: self.tenants.clone(),
            invoices: self.invoices.clone(),
            guard: Some(guard),
        }))
    }
}

struct LockedTenant {
    tenant_id: TenantId,
    tenants: SharedTenantStore,
    invoices: SharedInvoiceStore,
    guard: Option<OwnedMutexGuard<()>>,
}

impl LockedTenant {
    fn ensure_open(&self) -> Result<(), StoreError> {
        match self.guard {
            Some(_) => Ok(()),
            None => Err(StoreError::Backend(format!(
                "transaction for tenant {} already committed",
                self.tenant_id
            ))),
        }
    }
}

#[async_trait]
impl TenantTransaction for LockedTenant {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    async fn tenant(&mut self) -> Result<Option<Tenant>, StoreError> {
        self.ensure_open()?;
        self.tenants.get(self.tenant_id).await
    }

    async fn invoice(&mut self, invoice_id: InvoiceId) -> Result<Option<InvoiceRecord>, StoreError> {
        self.ensure_open()?;
        let record = self.invoices.get(invoice_id).await?;
        Ok(record.filter(|r| r.tenant_id() == self.tenant_id))
    }

    async fn invoices(&mut self) -> Result<Vec<InvoiceRecord>, StoreError> {
        self.ensure_open()?;
        self.invoices.list_for_tenant(self.tenant_id).await
    }

    async fn invoices_for_period(
        &mut self,
        period: &BillingPeriod,
    ) -> Result<Vec<InvoiceRecord>, StoreError> {
        self.ensure_open()?;
        self.invoices.list_for_period(self.tenant_id, period).await
    }

    async fn insert_invoice(&mut self, record: InvoiceRecord) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.invoices.insert(record).await
    }

    async fn replace_invoice(&mut self, record: &InvoiceRecord) -> Result<bool, StoreError> {
        self.ensure_open()?;
        self.invoices.replace(record).await
    }

    async fn delete_invoice(
        &mut self,
        invoice_id: InvoiceId,
    ) -> Result<Option<InvoiceRecord>, StoreError> {
        self.ensure_open()?;
        self.invoices.delete(invoice_id).await
    }

    async fn set_last_billing(&mut self, last_billing: LastBilling) -> Result<bool, StoreError> {
        self.ensure_open()?;
        self.tenants.set_last_billing(self.tenant_id, last_billing).await
    }

    async fn clear_last_billing(&mut self) -> Result<bool, StoreError> {
        self.ensure_open()?;
        self.tenants.clear_last_billing(self.tenant_id).await
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.guard = None;
        Ok(())
    }
}

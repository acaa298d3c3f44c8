//! Shared fixtures for service tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use tenantbill_billing::{
    BillingPeriod, InvoiceRecord, InvoiceStatus, LineItem, Plan, TaxRule, Tenant, TenantProfile,
};
use tenantbill_core::{InvoiceId, TenantId};

use crate::config::BillingConfig;
use crate::store::{InMemoryInvoiceStore, InMemoryTenantStore, InvoiceStore, StoreError, TenantStore};

use super::BillingServices;

pub(crate) fn period(s: &str) -> BillingPeriod {
    s.parse().unwrap()
}

/// Invoice store that fails every write for selected tenants.
#[derive(Default)]
pub(crate) struct FlakyInvoiceStore {
    inner: InMemoryInvoiceStore,
    failing: Mutex<HashSet<TenantId>>,
}

impl FlakyInvoiceStore {
    fn check(&self, tenant_id: TenantId) -> Result<(), StoreError> {
        if self.failing.lock().unwrap().contains(&tenant_id) {
            return Err(StoreError::Backend(format!("injected failure for {tenant_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl InvoiceStore for FlakyInvoiceStore {
    async fn insert(&self, record: InvoiceRecord) -> Result<(), StoreError> {
        self.check(record.tenant_id())?;
        self.inner.insert(record).await
    }

    async fn get(&self, invoice_id: InvoiceId) -> Result<Option<InvoiceRecord>, StoreError> {
        self.inner.get(invoice_id).await
    }

    async fn list_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<InvoiceRecord>, StoreError> {
        self.inner.list_for_tenant(tenant_id).await
    }

    async fn list_for_period(
        &self,
        tenant_id: TenantId,
        period: &BillingPeriod,
    ) -> Result<Vec<InvoiceRecord>, StoreError> {
        self.inner.list_for_period(tenant_id, period).await
    }

    async fn replace(&self, record: &InvoiceRecord) -> Result<bool, StoreError> {
        self.check(record.tenant_id())?;
        self.inner.replace(record).await
    }

    async fn delete(&self, invoice_id: InvoiceId) -> Result<Option<InvoiceRecord>, StoreError> {
        self.inner.delete(invoice_id).await
    }
}

pub(crate) struct Fixture {
    pub services: BillingServices,
    tenant_store: Arc<InMemoryTenantStore>,
    invoice_store: Arc<FlakyInvoiceStore>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(BillingConfig::default())
    }

    pub fn with_config(config: BillingConfig) -> Self {
        let tenant_store = Arc::new(InMemoryTenantStore::new());
        let invoice_store = Arc::new(FlakyInvoiceStore::default());
        let services = BillingServices::new(tenant_store.clone(), invoice_store.clone(), config);
        Self {
            services,
            tenant_store,
            invoice_store,
        }
    }

    pub async fn tenant(&self, name: &str, plan: Option<Plan>) -> TenantId {
        self.services
            .tenants
            .register(TenantProfile {
                name: name.to_string(),
                plan,
                billing_email: format!("{}@tenants.test", name.to_lowercase().replace(' ', "-")),
            })
            .await
            .unwrap()
            .id_typed()
    }

    /// Insert a record directly, bypassing the lifecycle service and reconciliation.
    pub async fn seed_invoice(
        &self,
        tenant_id: TenantId,
        period_str: &str,
        status: InvoiceStatus,
    ) -> InvoiceRecord {
        let mut record = InvoiceRecord::issue(
            InvoiceId::new(),
            tenant_id,
            period(period_str),
            vec![LineItem::new("Seeded", 1000, 1)],
            TaxRule::default(),
            Utc::now(),
        )
        .unwrap();
        record.set_status(status);
        self.invoice_store.insert(record.clone()).await.unwrap();
        record
    }

    /// Remove every record of a tenant without reconciling.
    pub async fn wipe_invoices(&self, tenant_id: TenantId) {
        for record in self.invoice_store.list_for_tenant(tenant_id).await.unwrap() {
            self.invoice_store.delete(record.id_typed()).await.unwrap();
        }
    }

    pub async fn invoice_count(&self, tenant_id: TenantId) -> usize {
        self.invoice_store.list_for_tenant(tenant_id).await.unwrap().len()
    }

    pub fn fail_writes_for(&self, tenant_id: TenantId) {
        self.invoice_store.failing.lock().unwrap().insert(tenant_id);
    }

    pub async fn tenant_doc(&self, tenant_id: TenantId) -> Tenant {
        self.tenant_store.get(tenant_id).await.unwrap().unwrap()
    }

    /// Overwrite `lastBilling` directly to simulate a stale or corrupt projection.
    pub async fn force_last_billing(
        &self,
        tenant_id: TenantId,
        period_str: &str,
        status: InvoiceStatus,
    ) {
        self.tenant_store
            .set_last_billing(
                tenant_id,
                tenantbill_billing::LastBilling {
                    period: period(period_str),
                    status,
                    updated_at: Utc::now(),
                },
            )
            .await
            .unwrap();
    }

    pub async fn last_billing(&self, tenant_id: TenantId) -> Option<(BillingPeriod, InvoiceStatus)> {
        self.tenant_doc(tenant_id)
            .await
            .last_billing()
            .map(|lb| (lb.period.clone(), lb.status))
    }
}

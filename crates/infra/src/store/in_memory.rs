use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use tenantbill_billing::{BillingPeriod, InvoiceRecord, LastBilling, Tenant, TenantProfile};
use tenantbill_core::{Entity, InvoiceId, TenantId};

use super::{InvoiceStore, StoreError, TenantStore};

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

/// Documents keyed by their entity id.
#[derive(Debug)]
struct DocumentMap<E: Entity> {
    inner: RwLock<HashMap<E::Id, E>>,
}

impl<E: Entity> Default for DocumentMap<E> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<E> DocumentMap<E>
where
    E: Entity + Clone,
    E::Id: Ord,
{
    fn insert(&self, doc: E, kind: &str) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let id = *doc.id();
        if map.contains_key(&id) {
            return Err(StoreError::Duplicate(format!("{kind} {id}")));
        }
        map.insert(id, doc);
        Ok(())
    }

    fn get(&self, id: &E::Id) -> Result<Option<E>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.get(id).cloned())
    }

    /// Matching documents, ordered by id.
    fn filter<P>(&self, predicate: P) -> Result<Vec<E>, StoreError>
    where
        P: Fn(&E) -> bool,
    {
        let map = self.inner.read().map_err(|_| poisoned())?;
        let mut docs: Vec<E> = map.values().filter(|d| predicate(d)).cloned().collect();
        docs.sort_by_key(|d| *d.id());
        Ok(docs)
    }

    /// Apply `f` in place. Returns `false` if the document is missing.
    fn update<F>(&self, id: &E::Id, f: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut E),
    {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        match map.get_mut(id) {
            Some(doc) => {
                f(doc);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove(&self, id: &E::Id) -> Result<Option<E>, StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        Ok(map.remove(id))
    }
}

/// In-memory tenant collection for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryTenantStore {
    docs: DocumentMap<Tenant>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn insert(&self, tenant: Tenant) -> Result<(), StoreError> {
        self.docs.insert(tenant, "tenant")
    }

    async fn get(&self, tenant_id: TenantId) -> Result<Option<Tenant>, StoreError> {
        self.docs.get(&tenant_id)
    }

    async fn list(&self) -> Result<Vec<Tenant>, StoreError> {
        self.docs.filter(|_| true)
    }

    async fn list_by_last_billing_period(
        &self,
        period: &BillingPeriod,
    ) -> Result<Vec<Tenant>, StoreError> {
        self.docs
            .filter(|t| t.last_billing().is_some_and(|lb| &lb.period == period))
    }

    async fn update_profile(
        &self,
        tenant_id: TenantId,
        profile: TenantProfile,
    ) -> Result<bool, StoreError> {
        self.docs.update(&tenant_id, |t| t.apply_profile(profile))
    }

    async fn set_last_billing(
        &self,
        tenant_id: TenantId,
        last_billing: LastBilling,
    ) -> Result<bool, StoreError> {
        self.docs
            .update(&tenant_id, |t| t.set_last_billing(last_billing))
    }

    async fn clear_last_billing(&self, tenant_id: TenantId) -> Result<bool, StoreError> {
        self.docs.update(&tenant_id, Tenant::clear_last_billing)
    }
}

/// In-memory invoice collection for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryInvoiceStore {
    docs: DocumentMap<InvoiceRecord>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvoiceStore for InMemoryInvoiceStore {
    async fn insert(&self, record: InvoiceRecord) -> Result<(), StoreError> {
        self.docs.insert(record, "invoice")
    }

    async fn get(&self, invoice_id: InvoiceId) -> Result<Option<InvoiceRecord>, StoreError> {
        self.docs.get(&invoice_id)
    }

    async fn list_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<InvoiceRecord>, StoreError> {
        self.docs.filter(|r| r.tenant_id() == tenant_id)
    }

    async fn list_for_period(
        &self,
        tenant_id: TenantId,
        period: &BillingPeriod,
    ) -> Result<Vec<InvoiceRecord>, StoreError> {
        self.docs
            .filter(|r| r.tenant_id() == tenant_id && r.period() == period)
    }

    async fn replace(&self, record: &InvoiceRecord) -> Result<bool, StoreError> {
        self.docs
            .update(&record.id_typed(), |existing| *existing = record.clone())
    }

    async fn delete(&self, invoice_id: InvoiceId) -> Result<Option<InvoiceRecord>, StoreError> {
        self.docs.remove(&invoice_id)
    }
}

//! Document-store boundary for tenants and their invoice records.
//!
//! Layout mirrors a schemaless document database:
//!
//! ```text
//! tenants/{tenantId}                       -> Tenant (with optional lastBilling)
//! tenants/{tenantId}/invoices/{invoiceId}  -> InvoiceRecord
//! ```
//!
//! No referential integrity is assumed between the two collections. Keeping
//! `lastBilling` consistent with the invoice set is the job of
//! [`crate::services::ReconciliationEngine`].
//!
//! Every write that can move `lastBilling` goes through a [`TenantTransaction`]:
//! the invoice mutation and the reconciliation write share one tenant-scoped
//! unit of work, exclusive per tenant.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use tenantbill_billing::{BillingPeriod, InvoiceRecord, LastBilling, Tenant, TenantProfile};
use tenantbill_core::{InvoiceId, TenantId};

pub use in_memory::{InMemoryInvoiceStore, InMemoryTenantStore};
pub use postgres::{PostgresInvoiceStore, PostgresTenantStore, PostgresTransactionSource};

/// Storage operation error.
///
/// These are **infrastructure errors**; missing documents are reported through
/// `Option`/`bool` return values instead.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("document serialization failed: {0}")]
    Serialization(String),

    #[error("duplicate document: {0}")]
    Duplicate(String),
}

/// Tenant aggregate collection.
///
/// Profile edits and `lastBilling` writes are separate field-level operations so
/// neither writer can overwrite the other's fields.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Insert a new tenant document. Fails with `Duplicate` if the id exists.
    async fn insert(&self, tenant: Tenant) -> Result<(), StoreError>;

    async fn get(&self, tenant_id: TenantId) -> Result<Option<Tenant>, StoreError>;

    async fn list(&self) -> Result<Vec<Tenant>, StoreError>;

    /// Tenants whose `lastBilling.period` equals `period`.
    async fn list_by_last_billing_period(
        &self,
        period: &BillingPeriod,
    ) -> Result<Vec<Tenant>, StoreError>;

    /// Overwrite name/plan/billingEmail only. Returns `false` if the tenant is missing.
    async fn update_profile(
        &self,
        tenant_id: TenantId,
        profile: TenantProfile,
    ) -> Result<bool, StoreError>;

    /// Set the `lastBilling` field. Returns `false` if the tenant is missing.
    async fn set_last_billing(
        &self,
        tenant_id: TenantId,
        last_billing: LastBilling,
    ) -> Result<bool, StoreError>;

    /// Delete the `lastBilling` field. Returns `false` if the tenant is missing.
    async fn clear_last_billing(&self, tenant_id: TenantId) -> Result<bool, StoreError>;
}

/// Per-tenant invoice collection.
///
/// Ids are unique across tenants, so single records are addressed by id alone.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Insert a new record. Fails with `Duplicate` if the id exists.
    async fn insert(&self, record: InvoiceRecord) -> Result<(), StoreError>;

    async fn get(&self, invoice_id: InvoiceId) -> Result<Option<InvoiceRecord>, StoreError>;

    /// All records of a tenant, in no particular order.
    async fn list_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<InvoiceRecord>, StoreError>;

    async fn list_for_period(
        &self,
        tenant_id: TenantId,
        period: &BillingPeriod,
    ) -> Result<Vec<InvoiceRecord>, StoreError>;

    /// Replace an existing record. Returns `false` if it no longer exists.
    async fn replace(&self, record: &InvoiceRecord) -> Result<bool, StoreError>;

    /// Remove a record, returning it if it existed.
    async fn delete(&self, invoice_id: InvoiceId) -> Result<Option<InvoiceRecord>, StoreError>;
}

/// Exclusive, tenant-scoped unit of work over both collections.
///
/// While one transaction for a tenant is open, no other transaction for that
/// tenant can begin. Writes become visible to other readers on [`commit`];
/// dropping an uncommitted transaction discards them where the backend can.
///
/// [`commit`]: TenantTransaction::commit
#[async_trait]
pub trait TenantTransaction: Send {
    fn tenant_id(&self) -> TenantId;

    async fn tenant(&mut self) -> Result<Option<Tenant>, StoreError>;

    /// A record of this tenant. Records of other tenants read as `None`.
    async fn invoice(&mut self, invoice_id: InvoiceId) -> Result<Option<InvoiceRecord>, StoreError>;

    async fn invoices(&mut self) -> Result<Vec<InvoiceRecord>, StoreError>;

    async fn invoices_for_period(
        &mut self,
        period: &BillingPeriod,
    ) -> Result<Vec<InvoiceRecord>, StoreError>;

    async fn insert_invoice(&mut self, record: InvoiceRecord) -> Result<(), StoreError>;

    async fn replace_invoice(&mut self, record: &InvoiceRecord) -> Result<bool, StoreError>;

    async fn delete_invoice(
        &mut self,
        invoice_id: InvoiceId,
    ) -> Result<Option<InvoiceRecord>, StoreError>;

    async fn set_last_billing(&mut self, last_billing: LastBilling) -> Result<bool, StoreError>;

    async fn clear_last_billing(&mut self) -> Result<bool, StoreError>;

    /// Make the writes durable. Any further call on this transaction fails.
    async fn commit(&mut self) -> Result<(), StoreError>;
}

/// Opens [`TenantTransaction`]s, waiting while another one holds the tenant.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn begin(&self, tenant_id: TenantId) -> Result<Box<dyn TenantTransaction>, StoreError>;
}

pub type SharedTenantStore = Arc<dyn TenantStore>;
pub type SharedInvoiceStore = Arc<dyn InvoiceStore>;
pub type SharedTransactionSource = Arc<dyn TransactionSource>;

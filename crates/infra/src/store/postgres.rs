//! Postgres-backed document stores.
//!
//! Tenants and invoice records are stored as JSONB documents (see
//! `migrations/0001_billing_documents.sql`). Field-level tenant writes use
//! `jsonb_set`, `||` and `-` so a profile edit never rewrites `lastBilling` and
//! a reconciliation write never rewrites the profile.
//!
//! [`PostgresTransactionSource`] runs each tenant unit of work in one database
//! transaction that starts with `SELECT ... FOR UPDATE` on the tenant row, so
//! the invoice mutation and the `lastBilling` write commit together and
//! writers for the same tenant serialize across every process sharing the
//! database.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / Other | N/A | `Backend` |
//! | Column decode | N/A | `Serialization` |

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};

use tenantbill_billing::{BillingPeriod, InvoiceRecord, LastBilling, Tenant, TenantProfile};
use tenantbill_core::{InvoiceId, TenantId};

use super::{InvoiceStore, StoreError, TenantStore, TenantTransaction, TransactionSource};

/// Apply the document schema. Statements are idempotent.
#[instrument(skip(pool), err)]
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(include_str!("../../migrations/0001_billing_documents.sql"))
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("migrate", e))?;
    Ok(())
}

/// Postgres tenant collection (`tenants` table).
#[derive(Debug, Clone)]
pub struct PostgresTenantStore {
    pool: Arc<PgPool>,
}

impl PostgresTenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn patch(
        &self,
        operation: &str,
        sql: &str,
        tenant_id: TenantId,
        value: Option<serde_json::Value>,
    ) -> Result<bool, StoreError> {
        let mut query = sqlx::query(sql).bind(tenant_id.as_uuid());
        if let Some(value) = value {
            query = query.bind(value);
        }
        let result = query
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TenantStore for PostgresTenantStore {
    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.id_typed()), err)]
    async fn insert(&self, tenant: Tenant) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO tenants (id, doc) VALUES ($1, $2)")
            .bind(tenant.id_typed().as_uuid())
            .bind(to_doc(&tenant)?)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_tenant", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn get(&self, tenant_id: TenantId) -> Result<Option<Tenant>, StoreError> {
        let row = sqlx::query("SELECT doc FROM tenants WHERE id = $1")
            .bind(tenant_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_tenant", e))?;
        row.as_ref().map(from_row).transpose()
    }

    #[instrument(skip(self), fields(row_count = tracing::field::Empty), err)]
    async fn list(&self) -> Result<Vec<Tenant>, StoreError> {
        let rows = sqlx::query("SELECT doc FROM tenants ORDER BY id ASC")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_tenants", e))?;
        Span::current().record("row_count", rows.len());
        rows.iter().map(from_row).collect()
    }

    #[instrument(skip(self), fields(period = %period), err)]
    async fn list_by_last_billing_period(
        &self,
        period: &BillingPeriod,
    ) -> Result<Vec<Tenant>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT doc
            FROM tenants
            WHERE doc -> 'lastBilling' ->> 'period' = $1
            ORDER BY id ASC
            "#,
        )
        .bind(period.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_by_last_billing_period", e))?;
        rows.iter().map(from_row).collect()
    }

    #[instrument(skip(self, profile), fields(tenant_id = %tenant_id), err)]
    async fn update_profile(
        &self,
        tenant_id: TenantId,
        profile: TenantProfile,
    ) -> Result<bool, StoreError> {
        self.patch(
            "update_profile",
            "UPDATE tenants SET doc = doc || $2, updated_at = now() WHERE id = $1",
            tenant_id,
            Some(to_doc(&profile)?),
        )
        .await
    }

    #[instrument(skip(self, last_billing), fields(tenant_id = %tenant_id, period = %last_billing.period), err)]
    async fn set_last_billing(
        &self,
        tenant_id: TenantId,
        last_billing: LastBilling,
    ) -> Result<bool, StoreError> {
        self.patch(
            "set_last_billing",
            "UPDATE tenants SET doc = jsonb_set(doc, '{lastBilling}', $2, true), updated_at = now() WHERE id = $1",
            tenant_id,
            Some(to_doc(&last_billing)?),
        )
        .await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn clear_last_billing(&self, tenant_id: TenantId) -> Result<bool, StoreError> {
        self.patch(
            "clear_last_billing",
            "UPDATE tenants SET doc = doc - 'lastBilling', updated_at = now() WHERE id = $1",
            tenant_id,
            None,
        )
        .await
    }
}

/// Postgres invoice collection (`tenant_invoices` table).
#[derive(Debug, Clone)]
pub struct PostgresInvoiceStore {
    pool: Arc<PgPool>,
}

impl PostgresInvoiceStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl InvoiceStore for PostgresInvoiceStore {
    #[instrument(
        skip(self, record),
        fields(invoice_id = %record.id_typed(), tenant_id = %record.tenant_id(), period = %record.period()),
        err
    )]
    async fn insert(&self, record: InvoiceRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tenant_invoices (id, tenant_id, period, created_at, doc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id_typed().as_uuid())
        .bind(record.tenant_id().as_uuid())
        .bind(record.period().as_str())
        .bind(record.created_at())
        .bind(to_doc(&record)?)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_invoice", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id), err)]
    async fn get(&self, invoice_id: InvoiceId) -> Result<Option<InvoiceRecord>, StoreError> {
        let row = sqlx::query("SELECT doc FROM tenant_invoices WHERE id = $1")
            .bind(invoice_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_invoice", e))?;
        row.as_ref().map(from_row).transpose()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn list_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<InvoiceRecord>, StoreError> {
        let rows = sqlx::query("SELECT doc FROM tenant_invoices WHERE tenant_id = $1")
            .bind(tenant_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_for_tenant", e))?;
        rows.iter().map(from_row).collect()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, period = %period), err)]
    async fn list_for_period(
        &self,
        tenant_id: TenantId,
        period: &BillingPeriod,
    ) -> Result<Vec<InvoiceRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT doc FROM tenant_invoices WHERE tenant_id = $1 AND period = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(period.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_for_period", e))?;
        rows.iter().map(from_row).collect()
    }

    #[instrument(skip(self, record), fields(invoice_id = %record.id_typed()), err)]
    async fn replace(&self, record: &InvoiceRecord) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE tenant_invoices SET doc = $2 WHERE id = $1")
            .bind(record.id_typed().as_uuid())
            .bind(to_doc(record)?)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("replace_invoice", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id), err)]
    async fn delete(&self, invoice_id: InvoiceId) -> Result<Option<InvoiceRecord>, StoreError> {
        let row = sqlx::query("DELETE FROM tenant_invoices WHERE id = $1 RETURNING doc")
            .bind(invoice_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_invoice", e))?;
        row.as_ref().map(from_row).transpose()
    }
}

/// Tenant transactions backed by Postgres transactions.
#[derive(Debug, Clone)]
pub struct PostgresTransactionSource {
    pool: Arc<PgPool>,
}

impl PostgresTransactionSource {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl TransactionSource for PostgresTransactionSource {
    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn begin(&self, tenant_id: TenantId) -> Result<Box<dyn TenantTransaction>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        // Row lock on the tenant; a missing tenant locks nothing and reads as `None`.
        sqlx::query("SELECT id FROM tenants WHERE id = $1 FOR UPDATE")
            .bind(tenant_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_tenant", e))?;
        Ok(Box::new(PostgresTenantTransaction {
            tenant_id,
            tx: Some(tx),
        }))
    }
}

/// Rolled back on drop unless committed.
struct PostgresTenantTransaction {
    tenant_id: TenantId,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresTenantTransaction {
    fn conn(&mut self) -> Result<&mut PgConnection, StoreError> {
        let tenant_id = self.tenant_id;
        self.tx.as_deref_mut().ok_or_else(|| {
            StoreError::Backend(format!("transaction for tenant {tenant_id} already committed"))
        })
    }

    async fn patch_tenant(
        &mut self,
        operation: &str,
        sql: &str,
        value: Option<serde_json::Value>,
    ) -> Result<bool, StoreError> {
        let tenant_id = self.tenant_id;
        let mut query = sqlx::query(sql).bind(tenant_id.as_uuid());
        if let Some(value) = value {
            query = query.bind(value);
        }
        let result = query
            .execute(self.conn()?)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TenantTransaction for PostgresTenantTransaction {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    async fn tenant(&mut self) -> Result<Option<Tenant>, StoreError> {
        let tenant_id = self.tenant_id;
        let row = sqlx::query("SELECT doc FROM tenants WHERE id = $1")
            .bind(tenant_id.as_uuid())
            .fetch_optional(self.conn()?)
            .await
            .map_err(|e| map_sqlx_error("tx_get_tenant", e))?;
        row.as_ref().map(from_row).transpose()
    }

    async fn invoice(&mut self, invoice_id: InvoiceId) -> Result<Option<InvoiceRecord>, StoreError> {
        let tenant_id = self.tenant_id;
        let row = sqlx::query("SELECT doc FROM tenant_invoices WHERE id = $1 AND tenant_id = $2")
            .bind(invoice_id.as_uuid())
            .bind(tenant_id.as_uuid())
            .fetch_optional(self.conn()?)
            .await
            .map_err(|e| map_sqlx_error("tx_get_invoice", e))?;
        row.as_ref().map(from_row).transpose()
    }

    async fn invoices(&mut self) -> Result<Vec<InvoiceRecord>, StoreError> {
        let tenant_id = self.tenant_id;
        let rows = sqlx::query("SELECT doc FROM tenant_invoices WHERE tenant_id = $1")
            .bind(tenant_id.as_uuid())
            .fetch_all(self.conn()?)
            .await
            .map_err(|e| map_sqlx_error("tx_list_for_tenant", e))?;
        rows.iter().map(from_row).collect()
    }

    async fn invoices_for_period(
        &mut self,
        period: &BillingPeriod,
    ) -> Result<Vec<InvoiceRecord>, StoreError> {
        let tenant_id = self.tenant_id;
        let rows = sqlx::query(
            "SELECT doc FROM tenant_invoices WHERE tenant_id = $1 AND period = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(period.as_str())
        .fetch_all(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("tx_list_for_period", e))?;
        rows.iter().map(from_row).collect()
    }

    async fn insert_invoice(&mut self, record: InvoiceRecord) -> Result<(), StoreError> {
        let doc = to_doc(&record)?;
        sqlx::query(
            r#"
            INSERT INTO tenant_invoices (id, tenant_id, period, created_at, doc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id_typed().as_uuid())
        .bind(record.tenant_id().as_uuid())
        .bind(record.period().as_str())
        .bind(record.created_at())
        .bind(doc)
        .execute(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("tx_insert_invoice", e))?;
        Ok(())
    }

    async fn replace_invoice(&mut self, record: &InvoiceRecord) -> Result<bool, StoreError> {
        let doc = to_doc(record)?;
        let result = sqlx::query("UPDATE tenant_invoices SET doc = $2 WHERE id = $1")
            .bind(record.id_typed().as_uuid())
            .bind(doc)
            .execute(self.conn()?)
            .await
            .map_err(|e| map_sqlx_error("tx_replace_invoice", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_invoice(
        &mut self,
        invoice_id: InvoiceId,
    ) -> Result<Option<InvoiceRecord>, StoreError> {
        let tenant_id = self.tenant_id;
        let row = sqlx::query(
            "DELETE FROM tenant_invoices WHERE id = $1 AND tenant_id = $2 RETURNING doc",
        )
        .bind(invoice_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_optional(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("tx_delete_invoice", e))?;
        row.as_ref().map(from_row).transpose()
    }

    async fn set_last_billing(&mut self, last_billing: LastBilling) -> Result<bool, StoreError> {
        let doc = to_doc(&last_billing)?;
        self.patch_tenant(
            "tx_set_last_billing",
            "UPDATE tenants SET doc = jsonb_set(doc, '{lastBilling}', $2, true), updated_at = now() WHERE id = $1",
            Some(doc),
        )
        .await
    }

    async fn clear_last_billing(&mut self) -> Result<bool, StoreError> {
        self.patch_tenant(
            "tx_clear_last_billing",
            "UPDATE tenants SET doc = doc - 'lastBilling', updated_at = now() WHERE id = $1",
            None,
        )
        .await
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tenant_id = self.tenant_id;
        let tx = self.tx.take().ok_or_else(|| {
            StoreError::Backend(format!("transaction for tenant {tenant_id} already committed"))
        })?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }
}

fn to_doc<T: Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn from_row<T: DeserializeOwned>(row: &PgRow) -> Result<T, StoreError> {
    let doc: serde_json::Value = row
        .try_get("doc")
        .map_err(|e| StoreError::Serialization(format!("failed to read doc column: {e}")))?;
    serde_json::from_value(doc).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

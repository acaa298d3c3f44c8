use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tenantbill_core::{DomainError, Entity, InvoiceId, TenantId};

use crate::line_item::{InvoiceAmounts, LineItem};
use crate::period::BillingPeriod;
use crate::plan::{Plan, PlanPriceTable, TaxRule};

/// Invoice status lifecycle.
///
/// `unbilled` is set at creation, `billed` once the invoice was sent, `paid`
/// after payment confirmation. No transition between the three is forbidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Unbilled,
    Billed,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Unbilled => "unbilled",
            InvoiceStatus::Billed => "billed",
            InvoiceStatus::Paid => "paid",
        }
    }
}

impl core::str::FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unbilled" => Ok(InvoiceStatus::Unbilled),
            "billed" => Ok(InvoiceStatus::Billed),
            "paid" => Ok(InvoiceStatus::Paid),
            _ => Err(DomainError::validation(
                "status must be one of: unbilled, billed, paid",
            )),
        }
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One billing-period charge document scoped to a tenant.
///
/// Invariant: `amount == subtotal + tax` of `line_items`. Every mutation that
/// touches line items goes through [`InvoiceRecord::replace_line_items`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRecord {
    id: InvoiceId,
    tenant_id: TenantId,
    period: BillingPeriod,
    amount: u64,
    status: InvoiceStatus,
    line_items: Vec<LineItem>,
    created_at: DateTime<Utc>,
}

impl InvoiceRecord {
    /// Build a new `unbilled` record from explicit line items.
    pub fn issue(
        id: InvoiceId,
        tenant_id: TenantId,
        period: BillingPeriod,
        line_items: Vec<LineItem>,
        tax_rule: TaxRule,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let amounts = InvoiceAmounts::compute(&line_items, tax_rule)?;
        Ok(Self {
            id,
            tenant_id,
            period,
            amount: amounts.amount,
            status: InvoiceStatus::Unbilled,
            line_items,
            created_at,
        })
    }

    /// Build the default record for a plan: a single line item priced from the table.
    pub fn for_plan(
        id: InvoiceId,
        tenant_id: TenantId,
        period: BillingPeriod,
        plan: Plan,
        prices: &PlanPriceTable,
        tax_rule: TaxRule,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let line = LineItem::new(format!("{} plan", plan.label()), prices.price_of(plan), 1)
            .with_detail(format!("Billing period {period}"));
        Self::issue(id, tenant_id, period, vec![line], tax_rule, created_at)
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn period(&self) -> &BillingPeriod {
        &self.period
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Amount breakdown as charged: subtotal from the line items, tax as the
    /// remainder of the stored `amount`.
    pub fn breakdown(&self) -> Result<InvoiceAmounts, DomainError> {
        let mut subtotal: u64 = 0;
        for item in &self.line_items {
            subtotal = subtotal
                .checked_add(item.line_total()?)
                .ok_or_else(|| DomainError::invariant("invoice subtotal overflow"))?;
        }
        Ok(InvoiceAmounts {
            subtotal,
            tax: self.amount.saturating_sub(subtotal),
            amount: self.amount,
        })
    }

    /// Replace line items and recompute `amount`. Status is left untouched.
    pub fn replace_line_items(
        &mut self,
        line_items: Vec<LineItem>,
        tax_rule: TaxRule,
    ) -> Result<InvoiceAmounts, DomainError> {
        let amounts = InvoiceAmounts::compute(&line_items, tax_rule)?;
        self.line_items = line_items;
        self.amount = amounts.amount;
        Ok(amounts)
    }

    /// Set the status, returning the previous one.
    pub fn set_status(&mut self, status: InvoiceStatus) -> InvoiceStatus {
        core::mem::replace(&mut self.status, status)
    }

    /// Ordering key used whenever one record must be chosen among several; the
    /// maximum wins (latest period, then most recently created, then highest id).
    pub fn recency_key(&self) -> (&BillingPeriod, DateTime<Utc>, InvoiceId) {
        (&self.period, self.created_at, self.id)
    }
}

impl Entity for InvoiceRecord {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

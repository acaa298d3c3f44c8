//! Billing domain module.
//!
//! This crate contains business rules for tenant invoices and the `lastBilling`
//! summary, implemented purely as deterministic domain logic (no IO, no HTTP,
//! no storage).

pub mod invoice;
pub mod line_item;
pub mod period;
pub mod plan;
pub mod projection;
pub mod tenant;

pub use invoice::{InvoiceRecord, InvoiceStatus};
pub use line_item::{InvoiceAmounts, LineItem};
pub use period::BillingPeriod;
pub use plan::{Plan, PlanPriceTable, TaxRule};
pub use projection::{
    eligible_for_creation, eligible_for_mark_sent, latest_billing, record_for_period,
};
pub use tenant::{LastBilling, Tenant, TenantProfile};

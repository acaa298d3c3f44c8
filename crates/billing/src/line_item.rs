use serde::{Deserialize, Serialize};

use tenantbill_core::DomainError;

use crate::plan::TaxRule;

/// One charge line on an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Price in smallest currency unit.
    pub unit_price: u64,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(name: impl Into<String>, unit_price: u64, quantity: u32) -> Self {
        Self {
            name: name.into(),
            detail: None,
            unit_price,
            quantity,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn line_total(&self) -> Result<u64, DomainError> {
        self.unit_price
            .checked_mul(self.quantity as u64)
            .ok_or_else(|| DomainError::invariant("line item amount overflow"))
    }
}

/// Amount breakdown derived from line items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceAmounts {
    pub subtotal: u64,
    pub tax: u64,
    pub amount: u64,
}

impl InvoiceAmounts {
    /// Validate `items` and compute `subtotal`, `tax` and `amount = subtotal + tax`.
    pub fn compute(items: &[LineItem], tax_rule: TaxRule) -> Result<Self, DomainError> {
        validate_line_items(items)?;

        let mut subtotal: u64 = 0;
        for item in items {
            subtotal = subtotal
                .checked_add(item.line_total()?)
                .ok_or_else(|| DomainError::invariant("invoice subtotal overflow"))?;
        }

        let tax = tax_rule.tax_on(subtotal)?;
        let amount = subtotal
            .checked_add(tax)
            .ok_or_else(|| DomainError::invariant("invoice amount overflow"))?;

        Ok(Self {
            subtotal,
            tax,
            amount,
        })
    }
}

fn validate_line_items(items: &[LineItem]) -> Result<(), DomainError> {
    if items.is_empty() {
        return Err(DomainError::validation(
            "invoice must have at least one line item",
        ));
    }
    for (idx, item) in items.iter().enumerate() {
        if item.name.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "line item {} must have a name",
                idx + 1
            )));
        }
        if item.quantity == 0 {
            return Err(DomainError::validation(format!(
                "line item {} quantity must be positive",
                idx + 1
            )));
        }
    }
    Ok(())
}

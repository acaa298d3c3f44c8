use serde::{Deserialize, Serialize};

use tenantbill_core::DomainError;

/// Subscription plan of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Standard,
    Pro,
}

impl Plan {
    /// Free tenants are never picked up by batch invoice creation.
    pub fn is_billable(self) -> bool {
        self != Plan::Free
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Standard => "standard",
            Plan::Pro => "pro",
        }
    }

    /// Human label used in seeded line items.
    pub fn label(self) -> &'static str {
        match self {
            Plan::Free => "Free",
            Plan::Standard => "Standard",
            Plan::Pro => "Pro",
        }
    }
}

impl core::str::FromStr for Plan {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "standard" => Ok(Plan::Standard),
            "pro" => Ok(Plan::Pro),
            _ => Err(DomainError::validation(
                "plan must be one of: free, standard, pro",
            )),
        }
    }
}

impl core::fmt::Display for Plan {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed monthly price per plan, in the smallest currency unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPriceTable {
    pub free: u64,
    pub standard: u64,
    pub pro: u64,
}

impl Default for PlanPriceTable {
    fn default() -> Self {
        Self {
            free: 0,
            standard: 5_000,
            pro: 15_000,
        }
    }
}

impl PlanPriceTable {
    pub fn price_of(&self, plan: Plan) -> u64 {
        match plan {
            Plan::Free => self.free,
            Plan::Standard => self.standard,
            Plan::Pro => self.pro,
        }
    }
}

/// Flat-percentage tax, floored to the smallest currency unit.
///
/// Serialized as the bare percentage; deserializing applies the same range
/// check as [`TaxRule::flat_percent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct TaxRule {
    percent: u32,
}

impl TaxRule {
    pub fn flat_percent(percent: u32) -> Result<Self, DomainError> {
        if percent > 100 {
            return Err(DomainError::validation(format!(
                "tax percent must be within 0..=100, got {percent}"
            )));
        }
        Ok(Self { percent })
    }

    pub fn percent(&self) -> u32 {
        self.percent
    }

    /// `floor(subtotal * percent / 100)`.
    pub fn tax_on(&self, subtotal: u64) -> Result<u64, DomainError> {
        let scaled = (subtotal as u128) * (self.percent as u128) / 100;
        u64::try_from(scaled).map_err(|_| DomainError::invariant("tax overflow"))
    }
}

impl TryFrom<u32> for TaxRule {
    type Error = DomainError;

    fn try_from(percent: u32) -> Result<Self, Self::Error> {
        Self::flat_percent(percent)
    }
}

impl From<TaxRule> for u32 {
    fn from(rule: TaxRule) -> Self {
        rule.percent
    }
}

impl Default for TaxRule {
    fn default() -> Self {
        Self { percent: 10 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_free_plan_is_not_billable() {
        assert!(!Plan::Free.is_billable());
        assert!(Plan::Standard.is_billable());
        assert!(Plan::Pro.is_billable());
    }

    #[test]
    fn plan_parses_case_insensitively() {
        assert_eq!("PRO".parse::<Plan>().unwrap(), Plan::Pro);
        assert!("enterprise".parse::<Plan>().is_err());
    }

    #[test]
    fn default_tax_floors_ten_percent() {
        let tax = TaxRule::default();
        assert_eq!(tax.tax_on(2500).unwrap(), 250);
        assert_eq!(tax.tax_on(2509).unwrap(), 250);
        assert_eq!(tax.tax_on(9).unwrap(), 0);
    }

    #[test]
    fn tax_rule_rejects_rates_above_100() {
        assert!(TaxRule::flat_percent(101).is_err());
        assert_eq!(TaxRule::flat_percent(8).unwrap().tax_on(1000).unwrap(), 80);
    }

    #[test]
    fn tax_rule_deserialization_is_range_checked() {
        let rule: TaxRule = serde_json::from_str("8").unwrap();
        assert_eq!(rule.percent(), 8);
        assert_eq!(serde_json::to_string(&rule).unwrap(), "8");

        let err = serde_json::from_str::<TaxRule>("250").unwrap_err();
        assert!(err.to_string().contains("0..=100"));
        assert!(serde_json::from_str::<TaxRule>(r#"{"percent":250}"#).is_err());
    }

    #[test]
    fn price_table_lookup() {
        let table = PlanPriceTable::default();
        assert_eq!(table.price_of(Plan::Free), 0);
        assert_eq!(table.price_of(Plan::Pro), 15_000);
    }
}

use core::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use tenantbill_core::DomainError;

/// A monthly billing period, formatted `YYYY-MM`.
///
/// The fixed-width format makes string order equal chronological order, so the
/// derived `Ord` is all the projection needs to find the latest period.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BillingPeriod(String);

impl BillingPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, DomainError> {
        if !(1..=12).contains(&month) {
            return Err(DomainError::validation(format!(
                "billing period month out of range: {month}"
            )));
        }
        if !(0..=9999).contains(&year) {
            return Err(DomainError::validation(format!(
                "billing period year out of range: {year}"
            )));
        }
        Ok(Self(format!("{year:04}-{month:02}")))
    }

    /// The period containing `at` (UTC).
    pub fn from_date(at: DateTime<Utc>) -> Self {
        Self(format!("{:04}-{:02}", at.year(), at.month()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn year(&self) -> i32 {
        self.0[..4].parse().unwrap_or_default()
    }

    pub fn month(&self) -> u32 {
        self.0[5..].parse().unwrap_or_default()
    }
}

impl FromStr for BillingPeriod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::validation(format!("billing period must be YYYY-MM, got '{s}'"));

        let bytes = s.as_bytes();
        if bytes.len() != 7 || bytes[4] != b'-' {
            return Err(invalid());
        }
        if !bytes[..4].iter().chain(&bytes[5..]).all(u8::is_ascii_digit) {
            return Err(invalid());
        }

        let year: i32 = s[..4].parse().map_err(|_| invalid())?;
        let month: u32 = s[5..].parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for BillingPeriod {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BillingPeriod> for String {
    fn from(value: BillingPeriod) -> Self {
        value.0
    }
}

impl core::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn parses_well_formed_period() {
        let p: BillingPeriod = "2026-02".parse().unwrap();
        assert_eq!(p.as_str(), "2026-02");
        assert_eq!(p.year(), 2026);
        assert_eq!(p.month(), 2);
    }

    #[test]
    fn rejects_malformed_periods() {
        for bad in ["2026-2", "2026/02", "26-02", "2026-13", "2026-00", "abcd-ef", "", "2026-021"] {
            assert!(
                matches!(bad.parse::<BillingPeriod>(), Err(DomainError::Validation(_))),
                "expected '{bad}' to be rejected"
            );
        }
    }

    #[test]
    fn from_date_uses_utc_month() {
        let at = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(BillingPeriod::from_date(at).as_str(), "2025-12");
    }

    #[test]
    fn serde_rejects_invalid_strings() {
        let ok: BillingPeriod = serde_json::from_str("\"2026-01\"").unwrap();
        assert_eq!(ok.as_str(), "2026-01");
        assert!(serde_json::from_str::<BillingPeriod>("\"2026-1\"").is_err());
    }

    proptest! {
        #[test]
        fn string_order_matches_chronological_order(
            y1 in 1900i32..2200, m1 in 1u32..=12,
            y2 in 1900i32..2200, m2 in 1u32..=12,
        ) {
            let a = BillingPeriod::new(y1, m1).unwrap();
            let b = BillingPeriod::new(y2, m2).unwrap();
            prop_assert_eq!(a.cmp(&b), (y1, m1).cmp(&(y2, m2)));
        }
    }
}

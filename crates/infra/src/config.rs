//! Billing configuration.
//!
//! Every value has a default, so an empty environment yields a usable config.

use std::env;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tenantbill_billing::{PlanPriceTable, TaxRule};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

/// Sender block printed on rendered invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerInfo {
    pub name: String,
    pub address: String,
    pub email: String,
}

impl Default for IssuerInfo {
    fn default() -> Self {
        Self {
            name: "Tenant Billing".to_string(),
            address: String::new(),
            email: "billing@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub prices: PlanPriceTable,
    pub tax: TaxRule,
    /// Tenant pipelines run concurrently during a batch pass. Never below 1.
    pub batch_concurrency: usize,
    /// Allow more than one record per `(tenant, period)`.
    pub allow_duplicate_periods: bool,
    pub issuer: IssuerInfo,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            prices: PlanPriceTable::default(),
            tax: TaxRule::default(),
            batch_concurrency: 8,
            allow_duplicate_periods: false,
            issuer: IssuerInfo::default(),
        }
    }
}

impl BillingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let prices = PlanPriceTable {
            free: defaults.prices.free,
            standard: parse_or(&lookup, "BILLING_PRICE_STANDARD", defaults.prices.standard)?,
            pro: parse_or(&lookup, "BILLING_PRICE_PRO", defaults.prices.pro)?,
        };

        let percent = parse_or(&lookup, "BILLING_TAX_PERCENT", defaults.tax.percent())?;
        let tax = TaxRule::flat_percent(percent).map_err(|e| ConfigError::InvalidValue {
            key: "BILLING_TAX_PERCENT",
            message: e.to_string(),
        })?;

        let issuer = IssuerInfo {
            name: lookup("BILLING_ISSUER_NAME").unwrap_or(defaults.issuer.name),
            address: lookup("BILLING_ISSUER_ADDRESS").unwrap_or(defaults.issuer.address),
            email: lookup("BILLING_ISSUER_EMAIL").unwrap_or(defaults.issuer.email),
        };

        let config = Self {
            prices,
            tax,
            batch_concurrency: parse_or(
                &lookup,
                "BILLING_BATCH_CONCURRENCY",
                defaults.batch_concurrency,
            )?,
            allow_duplicate_periods: parse_or(
                &lookup,
                "BILLING_ALLOW_DUPLICATE_PERIODS",
                defaults.allow_duplicate_periods,
            )?,
            issuer,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BILLING_BATCH_CONCURRENCY",
                message: "must be at least 1".to_string(),
            });
        }
        if self.tax.percent() > 100 {
            return Err(ConfigError::InvalidValue {
                key: "BILLING_TAX_PERCENT",
                message: "must not exceed 100".to_string(),
            });
        }
        if self.issuer.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "BILLING_ISSUER_NAME",
                message: "must not be blank".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key,
                message: e.to_string(),
            }),
    }
}

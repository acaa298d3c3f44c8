//! Process configuration for the API binary.

use std::net::SocketAddr;

use thiserror::Error;

use tenantbill_infra::config::{BillingConfig, ConfigError};

#[derive(Debug, Error)]
pub enum ApiConfigError {
    #[error("invalid BIND_ADDR '{value}': {message}")]
    BindAddr { value: String, message: String },

    #[error("invalid DATABASE_MAX_CONNECTIONS '{0}'")]
    MaxConnections(String),

    #[error(transparent)]
    Billing(#[from] ConfigError),
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    /// Selects the Postgres stores when set; otherwise in-memory stores are used.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub billing: BillingConfig,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ApiConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_addr = lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let bind_addr = raw_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ApiConfigError::BindAddr {
                value: raw_addr.clone(),
                message: e.to_string(),
            })?;

        let database_max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ApiConfigError::MaxConnections(raw.clone()))?,
            None => 10,
        };

        Ok(Self {
            bind_addr,
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections,
            billing: BillingConfig::from_lookup(&lookup)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_in_memory_on_port_8080() {
        let config = ApiConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.database_url.is_none());
        assert_eq!(config.billing.batch_concurrency, 8);
    }

    #[test]
    fn database_url_selects_postgres_and_blank_is_ignored() {
        let config = ApiConfig::from_lookup(|key| {
            (key == "DATABASE_URL").then(|| "postgres://localhost/billing".to_string())
        })
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/billing"));

        let config =
            ApiConfig::from_lookup(|key| (key == "DATABASE_URL").then(|| "  ".to_string())).unwrap();
        assert!(config.database_url.is_none());
    }

    #[test]
    fn bad_bind_addr_is_reported() {
        let err = ApiConfig::from_lookup(|key| (key == "BIND_ADDR").then(|| "nowhere".to_string()))
            .unwrap_err();
        assert!(matches!(err, ApiConfigError::BindAddr { .. }));
    }
}

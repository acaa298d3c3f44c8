//! Infrastructure layer: document stores, per-tenant locks, config, billing services.

pub mod config;
pub mod locks;
pub mod services;
pub mod store;

#[cfg(test)]
mod integration_tests;

//! `tenantbill-core`: identifiers and the domain error model shared by every crate.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::DomainError;
pub use id::{InvoiceId, TenantId};

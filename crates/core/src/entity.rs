//! Entity trait: identity + continuity across state changes.

/// A persisted document with a stable identity.
///
/// Tenants and invoice records both implement this; stores key documents by `id()`.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

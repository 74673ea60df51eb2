//! Domain layer - Core relay types with no external service dependencies.

/// Reference-counted symbol subscription registry.
pub mod subscription;

/// Canonical normalized event schema.
pub mod events;

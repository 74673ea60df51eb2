//! Application layer - Relay coordination and port definitions.

/// Port interfaces for external collaborators.
pub mod ports;

/// Session/subscription coordination services.
pub mod services;

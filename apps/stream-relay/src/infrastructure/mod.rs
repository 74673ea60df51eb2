//! Infrastructure layer - Adapters and external integrations.

/// Configuration loading.
pub mod config;

/// Health check and status HTTP endpoint.
pub mod health;

/// Prometheus metrics.
pub mod metrics;

/// Vendor message normalization.
pub mod normalize;

/// Polygon stream integration.
pub mod polygon;

/// Feed-to-session delivery task.
pub mod relay;

/// OpenTelemetry tracing.
pub mod telemetry;

/// Viewer session WebSocket server.
pub mod ws;

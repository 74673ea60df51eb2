#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Stream Relay - Market Data Multiplexer
//!
//! A relay service that maintains a single WebSocket connection to
//! Polygon's stock stream and multiplexes normalized market data events to
//! multiple downstream viewer sessions, reference-counting symbol
//! subscriptions across sessions. The upstream connection exists only on
//! demand: the first subscription opens it, the last release closes it.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Core relay types
//!   - `subscription`: Reference-counted symbol registry
//!   - `events`: Canonical normalized event schema
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Upstream feed interface
//!   - `services`: Session and subscription coordination
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `polygon`: Vendor WebSocket connection actor
//!   - `normalize`: Vendor message to canonical event mapping
//!   - `relay`: Feed-to-session delivery task
//!   - `ws`: Viewer session WebSocket server
//!   - `config`: Configuration loading
//!   - `health`: Health check and status HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! Polygon WS ──► Connection ──► Delivery ──► Session 1
//!                  Actor         Task    ├─► Session 2
//!                                        └─► Session N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core relay types with no external service dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::events::{EventKind, NormalizedEvent};
pub use domain::subscription::{
    AddDependent, RemoveDependent, SessionId, Symbol, SymbolRegistry,
};

// Application layer
pub use application::ports::{FeedError, SubscribeOutcome, UpstreamFeed};
pub use application::services::{PublishOutcome, RelayService, RelayStats, reason};

// Infrastructure config
pub use infrastructure::config::{ApiKey, ConfigError, RelayConfig, ServerSettings};

// Upstream feed (for integration tests)
pub use infrastructure::polygon::{
    ConnectionState, FeedConfig, FeedConnection, FeedEvent, FeedHandle, FeedState, ReconnectPolicy,
};

// Delivery and session servers
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::relay::BroadcastRelay;
pub use infrastructure::ws::{WsServer, WsServerError, WsServerState};
pub use infrastructure::ws::messages::{ClientCommand, ServerMessage, SubscriptionsPayload};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};

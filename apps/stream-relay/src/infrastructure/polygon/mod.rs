//! Polygon stream integration: wire schema, frame codec, reconnection
//! policy, and the demand-driven connection actor.

/// Connection actor and feed handle.
pub mod client;

/// Inbound frame decoding.
pub mod codec;

/// Vendor wire message schema.
pub mod messages;

/// Bounded backoff policy.
pub mod reconnect;

pub use client::{ConnectionState, FeedConfig, FeedConnection, FeedEvent, FeedHandle, FeedState};
pub use reconnect::ReconnectPolicy;

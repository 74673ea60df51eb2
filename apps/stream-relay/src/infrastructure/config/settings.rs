//! Relay Configuration Settings
//!
//! Configuration types for the stream relay, loaded from environment
//! variables.

use std::time::Duration;

use crate::infrastructure::polygon::{FeedConfig, ReconnectPolicy};

/// Polygon API credential.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a raw key.
    #[must_use]
    pub const fn new(key: String) -> Self {
        Self(key)
    }

    /// Expose the raw key for the auth handshake.
    #[must_use]
    pub fn reveal(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ApiKey").field(&"[REDACTED]").finish()
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Viewer session WebSocket port.
    pub ws_port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ws_port: 8090,
            health_port: 8091,
        }
    }
}

/// Upstream feed connection settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Interval between outbound pings on an open connection.
    pub ping_interval: Duration,
    /// Ceiling on the connect-plus-auth handshake.
    pub handshake_timeout: Duration,
    /// Delay before the first reconnection attempt.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Connection attempts allowed before declaring the feed degraded.
    pub max_reconnect_attempts: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 10,
        }
    }
}

/// Channel capacity settings.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Capacity of the feed-to-delivery event channel.
    pub feed_events_capacity: usize,
    /// Per-session outbound message buffer.
    pub session_buffer: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            feed_events_capacity: 1_024,
            session_buffer: 256,
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Polygon API credential.
    pub api_key: ApiKey,
    /// Vendor WebSocket URL.
    pub polygon_url: String,
    /// Server port settings.
    pub server: ServerSettings,
    /// Upstream feed settings.
    pub feed: FeedSettings,
    /// Channel capacity settings.
    pub channels: ChannelSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing
    /// or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("POLYGON_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("POLYGON_KEY".to_string()))?;

        if api_key.is_empty() {
            return Err(ConfigError::EmptyValue("POLYGON_KEY".to_string()));
        }

        let polygon_url = std::env::var("POLYGON_WS_URL")
            .unwrap_or_else(|_| "wss://socket.polygon.io/stocks".to_string());

        let server = ServerSettings {
            ws_port: parse_env_u16("STREAM_RELAY_WS_PORT", ServerSettings::default().ws_port),
            health_port: parse_env_u16(
                "STREAM_RELAY_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let feed = FeedSettings {
            ping_interval: parse_env_duration_secs(
                "STREAM_RELAY_PING_INTERVAL_SECS",
                FeedSettings::default().ping_interval,
            ),
            handshake_timeout: parse_env_duration_secs(
                "STREAM_RELAY_HANDSHAKE_TIMEOUT_SECS",
                FeedSettings::default().handshake_timeout,
            ),
            reconnect_delay_initial: parse_env_duration_millis(
                "STREAM_RELAY_RECONNECT_DELAY_INITIAL_MS",
                FeedSettings::default().reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                "STREAM_RELAY_RECONNECT_DELAY_MAX_SECS",
                FeedSettings::default().reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_env_f64(
                "STREAM_RELAY_RECONNECT_DELAY_MULTIPLIER",
                FeedSettings::default().reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: parse_env_u32(
                "STREAM_RELAY_MAX_RECONNECT_ATTEMPTS",
                FeedSettings::default().max_reconnect_attempts,
            ),
        };

        let channels = ChannelSettings {
            feed_events_capacity: parse_env_usize(
                "STREAM_RELAY_FEED_EVENTS_CAPACITY",
                ChannelSettings::default().feed_events_capacity,
            ),
            session_buffer: parse_env_usize(
                "STREAM_RELAY_SESSION_BUFFER",
                ChannelSettings::default().session_buffer,
            ),
        };

        Ok(Self {
            api_key: ApiKey::new(api_key),
            polygon_url,
            server,
            feed,
            channels,
        })
    }

    /// Build the connection actor configuration.
    #[must_use]
    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            url: self.polygon_url.clone(),
            api_key: self.api_key.reveal().to_string(),
            reconnect: ReconnectPolicy {
                base_delay: self.feed.reconnect_delay_initial,
                max_delay: self.feed.reconnect_delay_max,
                multiplier: self.feed.reconnect_delay_multiplier,
                max_attempts: self.feed.max_reconnect_attempts,
                jitter: ReconnectPolicy::default().jitter,
            },
            ping_interval: self.feed.ping_interval,
            handshake_timeout: self.feed.handshake_timeout,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

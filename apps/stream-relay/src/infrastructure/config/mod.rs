//! Configuration Module
//!
//! Configuration loading for the relay service.

mod settings;

pub use settings::{
    ApiKey, ChannelSettings, ConfigError, FeedSettings, RelayConfig, ServerSettings,
};

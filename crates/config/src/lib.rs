//! Configuration for the bridge: schema, file discovery and environment overrides.

pub mod env;
pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{discover_and_load, load_config},
    schema::{
        AnnounceConfig, BridgeConfig, RoutingConfig, SendConfig, ServerConfig, SessionConfig,
        TransportConfig, WebhookConfig,
    },
};

//! WhatsApp bridge core: session lifecycle, readiness-gated sends and the
//! inbound message pipeline.
//!
//! The transport itself is reached through [`wabridge_channels::TransportProvider`];
//! [`sidecar::SidecarProvider`] is the stock implementation.

pub mod announce;
pub mod bridge;
pub mod clock;
pub mod commands;
pub mod credentials;
pub mod extract;
pub mod lifecycle;
pub mod reconnect;
pub mod router;
pub mod send;
pub mod sidecar;
pub mod state;
pub mod webhook;

pub use {
    bridge::Bridge,
    credentials::CredentialStore,
    lifecycle::{LifecycleManager, LifecycleOptions},
    send::{SendError, SendGateway},
    sidecar::SidecarProvider,
    state::{ConnectionState, SessionState},
};

//! HTTP control plane for the bridge.
//!
//! Reads connection state and calls into the lifecycle manager and the send
//! gateway; it never talks to the transport directly.
//!
//! Routes:
//! - `GET /health`, `GET /qr`
//! - `GET /sendText`, `POST /send-private`, `POST /send-group`
//! - `POST /logout`, `POST /reset-session`

pub mod auth;
pub mod error;
pub mod server;
pub mod state;

pub use {
    server::{build_app, start_gateway},
    state::AppState,
};

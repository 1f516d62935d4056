use {secrecy::Secret, wabridge_whatsapp::Bridge};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub bridge: Bridge,
    /// Bearer token for the authenticated send routes. `None` leaves them open.
    pub send_token: Option<Secret<String>>,
}

impl AppState {
    pub fn new(bridge: Bridge, send_token: Option<String>) -> Self {
        Self {
            bridge,
            send_token: send_token.filter(|t| !t.is_empty()).map(Secret::new),
        }
    }
}

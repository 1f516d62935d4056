use thiserror::Error;

/// Failure reported by a transport session.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("{0}")]
    Provider(String),
}

impl TransportError {
    /// Whether the failure means the underlying connection went away.
    ///
    /// Some providers only surface string errors, so the message text is
    /// inspected as well.
    pub fn is_connection_closed(&self) -> bool {
        match self {
            Self::ConnectionClosed => true,
            Self::Provider(msg) => {
                msg.contains("Connection Closed") || msg.contains("Sock is closed")
            },
        }
    }
}

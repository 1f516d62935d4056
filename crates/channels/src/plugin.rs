use std::sync::Arc;

use {anyhow::Result, async_trait::async_trait, tokio::sync::mpsc};

use crate::{
    address::Jid,
    error::TransportError,
    event::{OutboundContent, TransportEvent},
};

/// Channel on which a live session reports its events, in delivery order.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Opens transport sessions. Implemented by the external provider adapter.
#[async_trait]
pub trait TransportProvider: Send + Sync {
    /// Provider identifier, used in logs.
    fn id(&self) -> &str;

    /// Open a new session, resuming from `credentials` when present.
    ///
    /// The returned session pushes every event to `events` until it is closed.
    async fn connect(
        &self,
        credentials: Option<serde_json::Value>,
        events: EventSender,
    ) -> Result<Arc<dyn TransportSession>>;
}

/// A live transport connection.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Deliver `content` to `to`.
    async fn send(&self, to: &Jid, content: &OutboundContent) -> Result<(), TransportError>;

    /// End the session gracefully. Stored credentials are left alone.
    async fn end_session(&self) -> Result<(), TransportError>;

    /// Tear down the connection without any protocol-level goodbye.
    async fn close(&self);
}

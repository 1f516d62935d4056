//! Transport provider contract.
//!
//! The chat transport (device pairing, session crypto, wire framing) lives
//! outside this workspace. A provider implements [`TransportProvider`] and
//! reports everything that happens on the wire as [`TransportEvent`]s;
//! outbound traffic goes through [`TransportSession::send`].

pub mod address;
pub mod error;
pub mod event;
pub mod plugin;

pub use {
    address::Jid,
    error::TransportError,
    event::{
        CloseReason, ConnectionUpdate, InboundMessage, MessageKey, MessagePayload,
        OutboundContent, TransportEvent,
    },
    plugin::{EventSender, TransportProvider, TransportSession},
};

//! Frame codec between websocket frames and relay envelopes.
//!
//! Only text frames carry envelopes. Control frames are answered by axum
//! itself, binary frames are not part of the protocol.

use axum::extract::ws::Message;

use crate::domain::event::EventMessage;

/// What the receive loop should do with one inbound frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame to hand to the connection session.
    Text(String),
    /// The peer closed the connection.
    Close,
    /// Nothing to do.
    Skip,
}

pub fn decode(frame: Message) -> Inbound {
    match frame {
        Message::Text(text) => Inbound::Text(text),
        Message::Close(_) => Inbound::Close,
        Message::Binary(bytes) => {
            tracing::warn!(len = bytes.len(), "binary frame ignored");
            Inbound::Skip
        }
        Message::Ping(_) | Message::Pong(_) => Inbound::Skip,
    }
}

pub fn encode(message: &EventMessage) -> Result<Message, serde_json::Error> {
    Ok(Message::Text(message.to_json()?))
}

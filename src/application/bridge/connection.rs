//! Outbound side of one duplex connection.
//!
//! The transport owns the socket; the relay only ever holds a
//! [`ConnectionHandle`], which queues messages for the transport's send
//! task. Sends never block: a full or closed queue is reported to the
//! caller, who logs and moves on.

use tokio::sync::mpsc;

use crate::domain::event::EventMessage;
use crate::domain::foundation::ConnectionId;

/// Why a queued send did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("outbound queue is full")]
    Full,

    #[error("connection is closed")]
    Closed,
}

/// Cloneable sender half for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<EventMessage>,
}

impl ConnectionHandle {
    /// Creates a handle plus the receiver the transport drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EventMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: ConnectionId::new(),
                sender,
            },
            receiver,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a message without waiting.
    pub fn send(&self, message: EventMessage) -> Result<(), SendError> {
        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// True once the transport dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

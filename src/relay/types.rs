use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio_tungstenite::tungstenite::{self, Bytes, Message, Utf8Bytes};

/// Relay errors
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("connection registry is no longer running")]
    RegistryClosed,
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle identifying one live connection.
///
/// Ids come from a process-wide counter, so two connections never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{:08x}", self.0)
    }
}

#[cfg(test)]
impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Payload forwarded to other participants, untouched.
///
/// Both variants are reference counted, so cloning one per recipient is O(1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Text(Utf8Bytes),
    Binary(Bytes),
}

impl OutboundMessage {
    /// Create a text message from any string type
    pub fn text(s: impl Into<Utf8Bytes>) -> Self {
        Self::Text(s.into())
    }

    pub fn binary(b: impl Into<Bytes>) -> Self {
        Self::Binary(b.into())
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert into the tungstenite frame written to the socket
    pub fn into_message(self) -> Message {
        match self {
            Self::Text(text) => Message::Text(text),
            Self::Binary(bytes) => Message::Binary(bytes),
        }
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self::Text(Utf8Bytes::from(s))
    }
}

impl From<Vec<u8>> for OutboundMessage {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(b))
    }
}

/// Outcome of a single fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients whose outbound queue accepted the message.
    pub delivered: usize,
    /// Recipients skipped because their outbound queue was full.
    pub dropped: usize,
    /// Recipients removed because their outbound queue was closed.
    pub evicted: usize,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.dropped + self.evicted
    }
}

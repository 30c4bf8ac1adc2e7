//! The datagram transport seam.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use repgraph::ClientId;

/// Why a datagram could not be handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection is gone.
    Closed,
    /// The send queue is full.
    Full,
    Other { reason: String },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed"),
            Self::Full => write!(f, "send queue full"),
            Self::Other { reason } => write!(f, "{reason}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Unreliable datagram delivery to connected clients.
///
/// A successful `send` only means the datagram was accepted; it may still
/// be lost in transit.
pub trait Transport {
    fn send(&mut self, client: ClientId, bytes: &[u8]) -> Result<(), TransportError>;
}

/// In-memory transport that queues datagrams per client.
///
/// Used for loopback runs and tests. Clients can be marked as failing to
/// exercise per-connection error handling.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    queues: HashMap<ClientId, VecDeque<Vec<u8>>>,
    failing: HashSet<ClientId>,
    sent_bytes: usize,
    sent_datagrams: usize,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later send to `client` fail with [`TransportError::Closed`].
    pub fn fail(&mut self, client: ClientId) {
        self.failing.insert(client);
    }

    /// Takes all datagrams queued for `client`, oldest first.
    pub fn drain(&mut self, client: ClientId) -> Vec<Vec<u8>> {
        self.queues
            .get_mut(&client)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn pending(&self, client: ClientId) -> usize {
        self.queues.get(&client).map_or(0, VecDeque::len)
    }

    #[must_use]
    pub const fn sent_bytes(&self) -> usize {
        self.sent_bytes
    }

    #[must_use]
    pub const fn sent_datagrams(&self) -> usize {
        self.sent_datagrams
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, client: ClientId, bytes: &[u8]) -> Result<(), TransportError> {
        if self.failing.contains(&client) {
            return Err(TransportError::Closed);
        }
        self.sent_bytes += bytes.len();
        self.sent_datagrams += 1;
        self.queues
            .entry(client)
            .or_default()
            .push_back(bytes.to_vec());
        Ok(())
    }
}

//! Identities shared across the protocol.
//!
//! Client trees and windows are identified by small `Copy` values so they can
//! key the side-tables the service keeps instead of holding references into
//! the window arena.

use std::fmt;

/// Identity of a connected client tree. `ClientId::SERVER` (0) is reserved for
/// windows created directly by the privileged process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ClientId(pub u32);

impl ClientId {
    pub const SERVER: ClientId = ClientId(0);

    pub fn is_server(self) -> bool {
        self == Self::SERVER
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-wide unique window identity: the creating client plus an id scoped
/// to that client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowId {
    pub client_id: ClientId,
    pub local_id: u32,
}

impl WindowId {
    pub const fn new(client_id: ClientId, local_id: u32) -> Self {
        Self {
            client_id,
            local_id,
        }
    }

    /// Packs the id into the 64-bit form used on the wire.
    pub fn to_transport(self) -> u64 {
        ((self.client_id.0 as u64) << 32) | self.local_id as u64
    }

    pub fn from_transport(value: u64) -> Self {
        Self {
            client_id: ClientId((value >> 32) as u32),
            local_id: value as u32,
        }
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.client_id.0, self.local_id)
    }
}

/// Correlation id supplied by a client with each request and echoed back in
/// `ChangeCompleted`.
pub type ChangeId = u32;

/// Id attached to each input event sent to a client; the client acks with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub u32);

/// Compositor-visible surface identity of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameSinkId {
    pub client_id: ClientId,
    pub sink_id: u32,
}

impl fmt::Display for FrameSinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameSinkId({}, {})", self.client_id.0, self.sink_id)
    }
}

/// Client-allocated surface id accompanying a bounds change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalSurfaceId(pub u64);

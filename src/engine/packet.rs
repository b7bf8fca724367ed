//! Transient packet model and connection-loss events.
//!
//! Packets are visualization-facing side effects of the pipeline: they are
//! created, walk a three-stage FSM on clock callbacks, and are discarded once
//! the Delivered stage has been observed. They are never persisted and never
//! feed back into the translation table.

use super::endpoint::Endpoint;
use super::table::EntryId;
use std::fmt;

/// Identifier of an in-flight packet, unique for the engine's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketId(pub u64);

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pkt#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Delivery stage of a packet as it crosses the simulated router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PacketStage {
    Created,
    Translating,
    Delivered,
}

impl PacketStage {
    /// Next stage in the FSM, or `None` once Delivered.
    pub fn next(self) -> Option<Self> {
        match self {
            PacketStage::Created => Some(PacketStage::Translating),
            PacketStage::Translating => Some(PacketStage::Delivered),
            PacketStage::Delivered => None,
        }
    }
}

/// A packet crossing the router in either direction.
///
/// `from`/`to` are the endpoints as presented on the side the packet enters
/// from; `translated` is the endpoint the router rewrites to: the public
/// endpoint for outbound traffic, the private endpoint for inbound.
#[derive(Debug, Clone)]
pub struct Packet {
    pub id: PacketId,
    pub entry_id: EntryId,
    pub direction: Direction,
    pub from: Endpoint,
    pub to: Endpoint,
    pub translated: Endpoint,
    pub stage: PacketStage,
}

/// Why an inbound delivery attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLostReason {
    /// The translation entry expired (or was removed) before the response
    /// arrived.
    EntryExpired,
}

impl fmt::Display for ConnectionLostReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionLostReason::EntryExpired => {
                write!(f, "NAT entry expired before response arrived")
            }
        }
    }
}

/// Emitted once per failed inbound delivery attempt. A valid outcome of the
/// simulated protocol, not an engine error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionLostEvent {
    /// The would-be responder.
    pub source: Endpoint,
    /// The public endpoint the response targeted.
    pub target: Endpoint,
    pub reason: ConnectionLostReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_fsm_order() {
        assert_eq!(PacketStage::Created.next(), Some(PacketStage::Translating));
        assert_eq!(
            PacketStage::Translating.next(),
            Some(PacketStage::Delivered)
        );
        assert_eq!(PacketStage::Delivered.next(), None);
        assert!(PacketStage::Created < PacketStage::Delivered);
    }

    #[test]
    fn test_lost_reason_message() {
        let reason = ConnectionLostReason::EntryExpired;
        assert!(reason.to_string().contains("NAT entry expired"));
    }
}

//! Simulation engine components
//!
//! The translation-table lifecycle and the packet pipeline around it:
//! clock/timer service, port allocation, entry store with timed expiry, and
//! the outbound/inbound packet flows exposed through `NatEngine`.

mod clock;
mod endpoint;
mod packet;
mod pipeline;
mod port_alloc;
mod table;

pub use clock::{after, every, now, TimerHandle};
pub use endpoint::{parse_ipv4, parse_port, Endpoint};
pub use packet::{
    ConnectionLostEvent, ConnectionLostReason, Direction, Packet, PacketId, PacketStage,
};
pub use pipeline::{EngineConfig, EngineEvent, NatEngine, OutboundRequest};
pub use port_alloc::{PortAllocator, DEFAULT_PORT_BASE, PORT_MAX};
pub use table::{
    EntryId, EntryStatus, SweepOutcome, TranslationEntry, TranslationTable,
    DEFAULT_ENTRY_TIMEOUT, DEFAULT_GRACE_PERIOD,
};

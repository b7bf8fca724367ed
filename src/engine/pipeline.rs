//! Packet pipeline and the observer boundary.
//!
//! `NatEngine` drives the two-phase flow: a validated outbound send
//! allocates a public port, records a translation, and walks an outbound
//! packet across the router; if auto-response is on, an inbound delivery
//! attempt is scheduled and races the entry's expiry. The attempt re-resolves
//! the entry by id at fire time — never from a snapshot taken at schedule
//! time — so a sweep transition or manual removal mid-flight is always
//! observed.

use super::clock::{self, TimerHandle};
use super::endpoint::{parse_ipv4, parse_port, Endpoint};
use super::packet::{
    ConnectionLostEvent, ConnectionLostReason, Direction, Packet, PacketId, PacketStage,
};
use super::port_alloc::{PortAllocator, DEFAULT_PORT_BASE, PORT_MAX};
use super::table::{
    EntryId, EntryStatus, TranslationEntry, TranslationTable, DEFAULT_ENTRY_TIMEOUT,
    DEFAULT_GRACE_PERIOD,
};
use crate::telemetry::MetricsRegistry;
use crate::Result;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Engine tunables. Defaults model a typical home-router NAPT profile.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Public address outbound traffic is rewritten to.
    pub public_ip: Ipv4Addr,
    /// First public port handed out.
    pub port_base: u16,
    /// Last allocatable public port.
    pub port_max: u16,
    /// Active lifetime of a translation entry.
    pub entry_timeout: Duration,
    /// How long an Expired entry stays visible before eviction.
    pub grace_period: Duration,
    /// Period of the expiration sweep. Must be short relative to the grace
    /// period to bound the staleness window.
    pub sweep_interval: Duration,
    /// Pacing between packet stage transitions (observational only).
    pub stage_delay: Duration,
    /// Time for the outbound trip to complete before the remote server's
    /// response delay starts counting.
    pub response_transit: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            public_ip: Ipv4Addr::new(203, 0, 113, 5),
            port_base: DEFAULT_PORT_BASE,
            port_max: PORT_MAX,
            entry_timeout: DEFAULT_ENTRY_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            sweep_interval: Duration::from_secs(1),
            stage_delay: Duration::from_millis(500),
            response_transit: Duration::from_millis(1500),
        }
    }
}

/// An outbound packet description as submitted by the presentation layer.
///
/// Address and port fields arrive as raw strings and are validated before
/// any engine state changes.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub private_ip: String,
    pub private_port: String,
    pub dest_ip: String,
    pub dest_port: String,
    /// Schedule a simulated response for this flow.
    pub auto_response: bool,
    /// How long the remote server takes to answer.
    pub response_delay: Duration,
}

/// State-change notifications for the presentation layer.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    EntryAdded(TranslationEntry),
    EntryExpired(EntryId),
    /// Manual removal, clear, or post-grace eviction.
    EntryRemoved(EntryId),
    PacketStageChanged(Packet),
    ConnectionLost(ConnectionLostEvent),
}

/// Handle to a running NAT simulation engine.
///
/// Cheap to clone; all clones share one table, allocator, and timeline. Must
/// be created inside a tokio runtime (the expiration sweep is a spawned
/// task, cancelled when the last handle drops or on `shutdown`).
#[derive(Clone)]
pub struct NatEngine {
    shared: Arc<Shared>,
}

struct Shared {
    config: EngineConfig,
    metrics: Arc<MetricsRegistry>,
    state: Mutex<State>,
    subscribers: Mutex<Vec<UnboundedSender<EngineEvent>>>,
    sweep_timer: Mutex<Option<TimerHandle>>,
}

struct State {
    table: TranslationTable,
    ports: PortAllocator,
    in_flight: Vec<Packet>,
    next_packet_id: u64,
    last_connection_lost: Option<ConnectionLostEvent>,
}

impl State {
    /// Create a packet for `entry` in `direction` and add it to the
    /// in-flight set at the Created stage.
    fn new_packet(&mut self, entry: &TranslationEntry, direction: Direction) -> Packet {
        let id = PacketId(self.next_packet_id);
        self.next_packet_id += 1;

        let packet = match direction {
            Direction::Outbound => Packet {
                id,
                entry_id: entry.id,
                direction,
                from: entry.private,
                to: entry.dest,
                translated: entry.public,
                stage: PacketStage::Created,
            },
            Direction::Inbound => Packet {
                id,
                entry_id: entry.id,
                direction,
                from: entry.dest,
                to: entry.public,
                translated: entry.private,
                stage: PacketStage::Created,
            },
        };
        self.in_flight.push(packet.clone());
        packet
    }
}

enum InboundOutcome {
    Delivered(Packet),
    Lost(ConnectionLostEvent),
}

impl NatEngine {
    pub fn new(config: EngineConfig, metrics: Arc<MetricsRegistry>) -> Self {
        let sweep_interval = config.sweep_interval;
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                table: TranslationTable::new(config.entry_timeout, config.grace_period),
                ports: PortAllocator::new(config.port_base, config.port_max),
                in_flight: Vec::new(),
                next_packet_id: 0,
                last_connection_lost: None,
            }),
            config,
            metrics,
            subscribers: Mutex::new(Vec::new()),
            sweep_timer: Mutex::new(None),
        });

        // The sweep holds only a weak reference so the engine can drop while
        // a tick is still scheduled.
        let weak = Arc::downgrade(&shared);
        let timer = clock::every(sweep_interval, move || {
            if let Some(shared) = weak.upgrade() {
                shared.run_sweep();
            }
        });
        *shared.sweep_timer.lock().unwrap() = Some(timer);

        Self { shared }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        self.shared.metrics.clone()
    }

    /// Register an observer. Events from this point on are delivered in
    /// emission order; closed receivers are pruned on the next emit.
    pub fn subscribe(&self) -> UnboundedReceiver<EngineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Validate and send an outbound packet, creating a translation entry.
    ///
    /// On validation failure the call is a complete no-op: no entry is
    /// created and no public port is consumed.
    pub fn send_outbound(&self, request: &OutboundRequest) -> Result<EntryId> {
        let parsed: Result<(Endpoint, Endpoint)> = (|| {
            let private = Endpoint::new(
                parse_ipv4("private_ip", &request.private_ip)?,
                parse_port("private_port", &request.private_port)?,
            );
            let dest = Endpoint::new(
                parse_ipv4("dest_ip", &request.dest_ip)?,
                parse_port("dest_port", &request.dest_port)?,
            );
            Ok((private, dest))
        })();

        let (private, dest) = match parsed {
            Ok(endpoints) => endpoints,
            Err(e) => {
                self.shared.metrics.requests_rejected.inc();
                warn!("outbound request rejected: {}", e);
                return Err(e);
            }
        };

        let (entry, packet, table_size) = {
            let mut state = self.shared.state.lock().unwrap();
            let port = state.ports.allocate()?;
            let public = Endpoint::new(self.shared.config.public_ip, port);
            let entry = state.table.insert(private, public, dest, clock::now())?.clone();
            state.last_connection_lost = None;
            let packet = state.new_packet(&entry, Direction::Outbound);
            (entry, packet, state.table.len())
        };

        self.shared.metrics.ports_allocated.inc();
        self.shared.metrics.entries_created.inc();
        self.shared.metrics.set_table_size(table_size);
        info!(
            "{}: {} -> {} translated via {}",
            entry.id, entry.private, entry.dest, entry.public
        );

        self.shared.emit(EngineEvent::EntryAdded(entry.clone()));
        self.shared.emit(EngineEvent::PacketStageChanged(packet.clone()));
        self.shared.schedule_stages(packet.id);

        if request.auto_response {
            let delay = request.response_delay + self.shared.config.response_transit;
            // Only the id crosses into the callback for the liveness
            // decision; the endpoint copies are for event display when the
            // entry is already gone at fire time.
            let (id, responder, target) = (entry.id, entry.dest, entry.public);
            let weak = Arc::downgrade(&self.shared);
            clock::after(delay, move || {
                if let Some(shared) = weak.upgrade() {
                    shared.inbound_attempt(id, responder, target);
                }
            });
            debug!("{}: inbound response scheduled in {:?}", entry.id, delay);
        }

        Ok(entry.id)
    }

    /// Manually evict an entry, independent of timers. A scheduled inbound
    /// attempt for it will find nothing and report a lost connection.
    pub fn remove_entry(&self, id: EntryId) -> bool {
        let removed = {
            let mut state = self.shared.state.lock().unwrap();
            let removed = state.table.remove(id);
            if removed {
                self.shared.metrics.set_table_size(state.table.len());
            }
            removed
        };

        if removed {
            self.shared.metrics.entries_removed.inc();
            info!("{} removed manually", id);
            self.shared.emit(EngineEvent::EntryRemoved(id));
        }
        removed
    }

    /// Drop every entry and in-flight packet and restore the port allocator
    /// to its base. The only path that resets port allocation.
    pub fn clear(&self) {
        let removed = {
            let mut state = self.shared.state.lock().unwrap();
            let removed = state.table.clear();
            state.ports.reset();
            state.in_flight.clear();
            state.last_connection_lost = None;
            removed
        };

        self.shared.metrics.set_table_size(0);
        info!("translation table cleared ({} entries dropped)", removed.len());
        for id in removed {
            self.shared.emit(EngineEvent::EntryRemoved(id));
        }
    }

    /// Live entries (Active and Expired-not-yet-evicted), insertion order.
    pub fn list_entries(&self) -> Vec<TranslationEntry> {
        self.shared.state.lock().unwrap().table.entries().to_vec()
    }

    /// Packets that have not yet reached the Delivered stage.
    pub fn list_in_flight(&self) -> Vec<Packet> {
        self.shared.state.lock().unwrap().in_flight.clone()
    }

    /// Time until the entry expires, zero once overdue, `None` if the entry
    /// is not in the live set.
    pub fn remaining_time(&self, id: EntryId) -> Option<Duration> {
        let state = self.shared.state.lock().unwrap();
        let timeout = state.table.entry_timeout();
        state
            .table
            .lookup(id)
            .map(|e| e.remaining(clock::now(), timeout))
    }

    /// The most recent lost-connection outcome, cleared by the next send and
    /// by `clear`.
    pub fn last_connection_lost(&self) -> Option<ConnectionLostEvent> {
        self.shared.state.lock().unwrap().last_connection_lost.clone()
    }

    /// The public port the next send will be assigned, if the range is not
    /// exhausted.
    pub fn next_public_port(&self) -> Option<u16> {
        self.shared.state.lock().unwrap().ports.next_port()
    }

    /// Stop the expiration sweep. In-flight scheduled deliveries still fire
    /// and re-check the table as usual.
    pub fn shutdown(&self) {
        if let Some(timer) = self.shared.sweep_timer.lock().unwrap().take() {
            timer.cancel();
        }
    }
}

impl Shared {
    fn emit(&self, event: EngineEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Periodic expiration sweep: Active entries past the timeout become
    /// Expired, entries past timeout + grace are evicted.
    fn run_sweep(&self) {
        let (outcome, table_size) = {
            let mut state = self.state.lock().unwrap();
            let outcome = state.table.sweep(clock::now());
            (outcome, state.table.len())
        };

        if outcome.is_empty() {
            return;
        }
        self.metrics.set_table_size(table_size);

        for id in outcome.expired {
            self.metrics.entries_expired.inc();
            debug!("{} expired", id);
            self.emit(EngineEvent::EntryExpired(id));
        }
        for id in outcome.evicted {
            self.metrics.entries_evicted.inc();
            debug!("{} evicted after grace period", id);
            self.emit(EngineEvent::EntryRemoved(id));
        }
    }

    /// Walk a packet through Translating and Delivered, one stage per
    /// `stage_delay`.
    fn schedule_stages(self: &Arc<Self>, packet_id: PacketId) {
        for step in 1..=2u32 {
            let weak = Arc::downgrade(self);
            clock::after(self.config.stage_delay * step, move || {
                if let Some(shared) = weak.upgrade() {
                    shared.advance_packet(packet_id);
                }
            });
        }
    }

    fn advance_packet(&self, packet_id: PacketId) {
        let advanced = {
            let mut state = self.state.lock().unwrap();
            let pos = match state.in_flight.iter().position(|p| p.id == packet_id) {
                Some(pos) => pos,
                // Cleared mid-flight; nothing left to observe.
                None => return,
            };
            let next = match state.in_flight[pos].stage.next() {
                Some(next) => next,
                None => return,
            };
            state.in_flight[pos].stage = next;
            let packet = state.in_flight[pos].clone();
            if next == PacketStage::Delivered {
                state.in_flight.remove(pos);
            }
            packet
        };

        if advanced.stage == PacketStage::Delivered {
            self.metrics.packets_delivered.inc();
        }
        debug!("{} reached {:?}", advanced.id, advanced.stage);
        self.emit(EngineEvent::PacketStageChanged(advanced));
    }

    /// The delayed inbound delivery attempt. Fires once; always re-resolves
    /// the entry by id against the current table.
    fn inbound_attempt(self: &Arc<Self>, entry_id: EntryId, responder: Endpoint, target: Endpoint) {
        let now = clock::now();
        let outcome = {
            let mut state = self.state.lock().unwrap();
            let timeout = state.table.entry_timeout();
            // The age re-check uses the sweep's exact threshold: a stale
            // Active status between sweep ticks must not let a late
            // response through.
            let live = match state.table.lookup(entry_id) {
                Some(e) if e.status == EntryStatus::Active && !e.expired_by(now, timeout) => {
                    Some(e.clone())
                }
                _ => None,
            };

            match live {
                Some(entry) => {
                    state.table.mark_matched(entry_id);
                    InboundOutcome::Delivered(state.new_packet(&entry, Direction::Inbound))
                }
                None => {
                    let event = ConnectionLostEvent {
                        source: responder,
                        target,
                        reason: ConnectionLostReason::EntryExpired,
                    };
                    state.last_connection_lost = Some(event.clone());
                    InboundOutcome::Lost(event)
                }
            }
        };

        match outcome {
            InboundOutcome::Delivered(packet) => {
                info!(
                    "{}: inbound response {} -> {} delivered to {}",
                    entry_id, packet.from, packet.to, packet.translated
                );
                self.emit(EngineEvent::PacketStageChanged(packet.clone()));
                self.schedule_stages(packet.id);
            }
            InboundOutcome::Lost(event) => {
                self.metrics.connections_lost.inc();
                warn!(
                    "{}: response from {} dropped: {}",
                    entry_id, event.source, event.reason
                );
                self.emit(EngineEvent::ConnectionLost(event));
            }
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Ok(slot) = self.sweep_timer.get_mut() {
            if let Some(timer) = slot.take() {
                timer.cancel();
            }
        }
    }
}

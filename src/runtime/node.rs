//! Node/router orchestrator (spec.md §4.5, §5): owns the transport, one
//! algorithm instance behind a single re-entrant lock, the router-level
//! `msg_id` dedup set, and runs the receive loop plus the periodic tick.
//!
//! Shaped after `runtime::daemon::RouterDaemon`'s receive-with-timeout +
//! tick loop (`handle_packet`, `apply_outputs`), generalized from one
//! hard-coded protocol and direct UDP I/O to the two-variant
//! [`RoutingAlgorithm`] and the [`Transport`] capability.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, info, warn};

use crate::algorithm::{Action, NeighborInfo, RoutingAlgorithm};
use crate::model::packet::{Packet, BROADCAST, TYPE_ECHO, TYPE_ECHO_REPLY, TYPE_MESSAGE};
use crate::model::seen_set::SeenSet;
use crate::transport::Transport;

const DEFAULT_MESSAGE_TTL: i64 = 5;
const DELIVERY_LOG_CAPACITY: usize = 256;

/// A message the algorithm handed "upward" (spec.md §4.3: "consume
/// (deliver upward)") instead of forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub from: String,
    pub kind: String,
    pub payload: String,
}

/// Wall-clock seconds since the epoch (spec.md §5: "uses wall-clock
/// seconds... a non-monotonic clock is acceptable").
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

pub struct Node {
    self_id: String,
    transport: Box<dyn Transport>,
    neighbors: Vec<String>,
    algo: ReentrantMutex<RefCell<Box<dyn RoutingAlgorithm>>>,
    router_seen: Mutex<SeenSet<String>>,
    deliveries: Mutex<VecDeque<DeliveredMessage>>,
    running: AtomicBool,
}

impl Node {
    pub fn new(
        self_id: impl Into<String>,
        algo: Box<dyn RoutingAlgorithm>,
        transport: Box<dyn Transport>,
        neighbors: Vec<String>,
        router_seen_capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            self_id: self_id.into(),
            transport,
            neighbors,
            algo: ReentrantMutex::new(RefCell::new(algo)),
            router_seen: Mutex::new(SeenSet::new(router_seen_capacity)),
            deliveries: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(true),
        })
    }

    /// Drains the messages the algorithm handed "upward" since the last
    /// call (spec.md §4.3's "deliver upward").
    pub fn take_deliveries(&self) -> Vec<DeliveredMessage> {
        self.deliveries.lock().drain(..).collect()
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn neighbors(&self) -> &[String] {
        &self.neighbors
    }

    pub fn routes(&self) -> BTreeMap<String, String> {
        let guard = self.algo.lock();
        guard.borrow().routes_snapshot()
    }

    pub fn algorithm_name(&self) -> &'static str {
        let guard = self.algo.lock();
        let name = guard.borrow().get_name();
        name
    }

    /// Spawns the receive loop and the tick loop on background threads and
    /// blocks until [`Node::shutdown`] is called (spec.md §5: "at least
    /// three logical activities concurrently").
    pub fn run(self: &Arc<Self>, tick_interval: Duration) {
        let receiver = Arc::clone(self);
        let receive_handle = thread::spawn(move || receiver.receive_loop());

        let ticker = Arc::clone(self);
        let tick_handle = thread::spawn(move || ticker.tick_loop(tick_interval));

        let _ = receive_handle.join();
        let _ = tick_handle.join();
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.transport.close();
    }

    fn receive_loop(&self) {
        while self.running.load(Ordering::Relaxed) {
            match self.transport.receive() {
                Ok((bytes, from_neighbor)) => self.handle_frame(&bytes, &from_neighbor),
                Err(err) => {
                    if self.running.load(Ordering::Relaxed) {
                        warn!("transport receive failure: {err}");
                    }
                    break;
                }
            }
        }
    }

    fn tick_loop(&self, tick_interval: Duration) {
        while self.running.load(Ordering::Relaxed) {
            thread::sleep(tick_interval);
            if !self.running.load(Ordering::Relaxed) {
                break;
            }
            self.tick(now_secs());
        }
    }

    /// Decode -> dedup -> algorithm call -> action dispatch (spec.md §4.5).
    pub fn handle_frame(&self, bytes: &[u8], from_neighbor: &str) {
        let mut pkt = match Packet::decode(bytes) {
            Ok(pkt) => pkt,
            Err(err) => {
                debug!("drop malformed packet from {from_neighbor}: {err}");
                return;
            }
        };

        {
            let id = pkt.ensure_msg_id().to_string();
            let mut seen = self.router_seen.lock();
            if !seen.insert(id) {
                return;
            }
        }

        let action = {
            let guard = self.algo.lock();
            guard
                .borrow_mut()
                .process_packet(&mut pkt, from_neighbor, now_secs())
        };

        let is_echo_to_self = pkt.kind == TYPE_ECHO && pkt.to_addr == self.self_id;
        let deliverable = matches!(pkt.kind.as_str(), TYPE_MESSAGE | TYPE_ECHO | TYPE_ECHO_REPLY);
        if action == Action::None && pkt.to_addr == self.self_id && deliverable {
            self.record_delivery(&pkt);
        }

        self.dispatch(action, pkt.clone(), from_neighbor);

        if is_echo_to_self {
            self.originate(&pkt.from_addr, TYPE_ECHO_REPLY, String::new(), DEFAULT_MESSAGE_TTL);
        }
    }

    fn record_delivery(&self, pkt: &Packet) {
        let mut deliveries = self.deliveries.lock();
        if deliveries.len() >= DELIVERY_LOG_CAPACITY {
            deliveries.pop_front();
        }
        deliveries.push_back(DeliveredMessage {
            from: pkt.from_addr.clone(),
            kind: pkt.kind.clone(),
            payload: pkt.payload.clone(),
        });
    }

    fn dispatch(&self, action: Action, mut pkt: Packet, from_neighbor: &str) {
        match action {
            Action::None => {}
            Action::Flood | Action::FloodLsa => {
                pkt.decrement_ttl();
                if pkt.ttl <= 0 {
                    debug!("drop flooded packet: ttl expired");
                    return;
                }
                self.flood(&pkt, from_neighbor);
            }
            Action::Unicast(next_hop) => {
                pkt.decrement_ttl();
                if pkt.ttl <= 0 {
                    debug!("drop unicast packet: ttl expired");
                    return;
                }
                if let Ok(bytes) = pkt.encode() {
                    if let Err(err) = self.transport.send_unicast(&next_hop, &bytes) {
                        warn!("unicast send to {next_hop} failed: {err}");
                    }
                }
            }
        }
    }

    fn flood(&self, pkt: &Packet, from_neighbor: &str) {
        let Ok(bytes) = pkt.encode() else { return };
        for neighbor in &self.neighbors {
            if neighbor == from_neighbor || neighbor == &pkt.from_addr {
                continue;
            }
            if let Err(err) = self.transport.send_unicast(neighbor, &bytes) {
                warn!("flood send to {neighbor} failed: {err}");
            }
        }
    }

    /// Periodic maintenance + timer-driven packet origination (spec.md
    /// §4.5 "On periodic tick").
    pub fn tick(&self, now: f64) {
        let (hello, lsa) = {
            let guard = self.algo.lock();
            let mut algo = guard.borrow_mut();
            algo.check_neighbor_timeouts(now);
            algo.age_lsa_database(now);

            let hello = if algo.should_send_hello(now) {
                algo.create_hello_packet(now)
            } else {
                None
            };
            let lsa = if algo.should_send_lsa(now) {
                algo.create_lsa_packet(now)
            } else {
                None
            };
            (hello, lsa)
        };

        if let Some(pkt) = hello {
            self.self_originate_broadcast(pkt);
        }
        if let Some(pkt) = lsa {
            self.self_originate_broadcast(pkt);
        }
    }

    /// Sends a self-originated packet without going through the flood
    /// path (receivers don't retransmit HELLO/LSA-origin packets the
    /// algorithm already marked as self-seen).
    fn self_originate_broadcast(&self, mut pkt: Packet) {
        let id = pkt.ensure_msg_id().to_string();
        self.router_seen.lock().insert(id);
        let Ok(bytes) = pkt.encode() else { return };
        if let Err(err) = self.transport.send_broadcast(&bytes) {
            warn!("broadcast send failed: {err}");
        }
    }

    /// Entry point for CLI-originated `send`/`echo` (spec.md §4.5
    /// "Originated packets").
    pub fn originate(&self, to: &str, kind: &str, payload: String, initial_ttl: i64) {
        let proto = self.algorithm_name();
        let mut pkt = Packet::new(proto, kind, self.self_id.clone(), to, initial_ttl);
        pkt.ensure_msg_id();
        pkt.set_path(Vec::new());
        pkt.payload = payload;

        let id = pkt.msg_id().unwrap_or_default().to_string();
        self.router_seen.lock().insert(id);

        let next_hop = {
            let guard = self.algo.lock();
            guard.borrow().get_next_hop(to)
        };

        pkt.decrement_ttl();
        if pkt.ttl <= 0 {
            debug!("drop originated packet to {to}: ttl expired before the first hop");
            return;
        }

        let Ok(bytes) = pkt.encode() else {
            warn!("failed to encode originated packet to {to}");
            return;
        };

        let result = match next_hop {
            Some(neighbor) => self.transport.send_unicast(&neighbor, &bytes),
            None => self.transport.send_broadcast(&bytes),
        };
        if let Err(err) = result {
            warn!("originate to {to} failed: {err}");
        }
    }

    /// Seeds per-neighbor liveness directly (used at startup before the
    /// first HELLO has been exchanged).
    pub fn update_neighbor(&self, id: &str, info: NeighborInfo) {
        let guard = self.algo.lock();
        guard.borrow_mut().update_neighbor(id, info, now_secs());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::flooding::FloodingStrategy;
    use crate::algorithm::lsr::{LsrStrategy, LsrTimers};
    use crate::model::packet::TYPE_INFO;
    use crate::transport::pubsub::{Broker, PubSubTransport};

    fn make_node(id: &str, neighbors: Vec<String>, broker: &Arc<Broker>, lsr: bool) -> Arc<Node> {
        let algo: Box<dyn RoutingAlgorithm> = if lsr {
            Box::new(LsrStrategy::new(id, LsrTimers::default()))
        } else {
            Box::new(FloodingStrategy::new(id))
        };
        let transport = Box::new(PubSubTransport::new(id, neighbors.clone(), broker.clone()));
        Node::new(id, algo, transport, neighbors, 50_000)
    }

    #[test]
    fn flooding_forwards_to_all_but_inbound_neighbor() {
        let broker = Broker::new();
        let a = make_node("A", vec!["B".into(), "C".into()], &broker, false);
        let b = make_node("B", vec!["A".into()], &broker, false);
        let c = make_node("C", vec!["A".into()], &broker, false);

        let mut pkt = Packet::new("flooding", TYPE_MESSAGE, "Z", "Q", 5);
        let bytes = pkt.encode().unwrap();
        pkt.ensure_msg_id();

        a.handle_frame(&bytes, "B");

        let (got_c, from_c) = c.transport.receive().unwrap();
        assert_eq!(from_c, "A");
        let decoded = Packet::decode(&got_c).unwrap();
        assert_eq!(decoded.ttl, 4);

        // B is excluded because it was the inbound neighbor.
        b.transport.close();
        assert!(b.transport.receive().is_err());
    }

    #[test]
    fn duplicate_msg_id_is_dropped_without_flooding() {
        let broker = Broker::new();
        let a = make_node("A", vec!["B".into()], &broker, false);
        let b = make_node("B", vec!["A".into()], &broker, false);

        let mut pkt = Packet::new("flooding", TYPE_MESSAGE, "Z", "Q", 5);
        pkt.ensure_msg_id();
        let bytes = pkt.encode().unwrap();

        a.handle_frame(&bytes, "C");
        let _ = b.transport.receive().unwrap();

        a.handle_frame(&bytes, "C");
        b.transport.close();
        assert!(b.transport.receive().is_err());
    }

    #[test]
    fn originate_unicasts_when_lsr_has_a_route() {
        let broker = Broker::new();
        let a = make_node("A", vec!["B".into()], &broker, true);
        let b = make_node("B", vec!["A".into()], &broker, true);

        a.update_neighbor("B", NeighborInfo { cost: Some(1) });

        let mut lsa = Packet::new("lsr", TYPE_INFO, "B", BROADCAST, 16);
        lsa.payload = serde_json::json!({"origin": "B", "seq": 1, "neighbors": {"A": 1}}).to_string();
        let lsa_bytes = lsa.encode().unwrap();
        a.handle_frame(&lsa_bytes, "B");

        a.originate("B", TYPE_MESSAGE, "hi".to_string(), DEFAULT_MESSAGE_TTL);
        let (bytes, from) = b.transport.receive().unwrap();
        assert_eq!(from, "A");
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded.payload, "hi");
    }

    #[test]
    fn message_addressed_to_self_is_recorded_as_a_delivery() {
        let broker = Broker::new();
        let a = make_node("A", vec!["B".into()], &broker, false);

        let mut pkt = Packet::new("flooding", TYPE_MESSAGE, "B", "A", 5);
        pkt.payload = "hi A".to_string();
        let bytes = pkt.encode().unwrap();
        a.handle_frame(&bytes, "B");

        let delivered = a.take_deliveries();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].payload, "hi A");
        assert!(a.take_deliveries().is_empty());
    }
}

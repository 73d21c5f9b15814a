//! In-process publish/subscribe transport: every node registers an inbox
//! with a shared [`Broker`] and sends by looking up the destination's
//! inbox directly. Simulates the "publish/subscribe fabric" spec.md §1
//! treats as an external collaborator, for running several nodes in one
//! process (the bundled lab harness, integration tests).
//!
//! Shaped after the `Arc<RwLock<..>>` registry + channel pattern in
//! `runtime::mgmt`, generalized from an HTTP status broker to a frame
//! broker.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::RouteError;
use crate::transport::{Transport, UNKNOWN_LINK};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

struct Frame {
    bytes: Vec<u8>,
    from_neighbor: String,
}

/// Process-wide registry of node inboxes. Shared by every
/// [`PubSubTransport`] created against it.
pub struct Broker {
    inboxes: Mutex<BTreeMap<String, Sender<Frame>>>,
}

impl Broker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inboxes: Mutex::new(BTreeMap::new()),
        })
    }

    fn register(&self, node_id: &str) -> Receiver<Frame> {
        let (tx, rx) = mpsc::channel();
        self.inboxes.lock().unwrap().insert(node_id.to_string(), tx);
        rx
    }

    fn deliver(&self, to: &str, frame: Frame) -> Result<(), RouteError> {
        let inboxes = self.inboxes.lock().unwrap();
        match inboxes.get(to) {
            Some(tx) => tx
                .send(frame)
                .map_err(|_| RouteError::TransportFailure(format!("inbox for {to} closed"))),
            None => Err(RouteError::TransportFailure(format!("no such node: {to}"))),
        }
    }
}

pub struct PubSubTransport {
    self_id: String,
    neighbors: Vec<String>,
    broker: Arc<Broker>,
    receiver: Receiver<Frame>,
    closed: AtomicBool,
}

impl PubSubTransport {
    pub fn new(self_id: impl Into<String>, neighbors: Vec<String>, broker: Arc<Broker>) -> Self {
        let self_id = self_id.into();
        let receiver = broker.register(&self_id);
        Self {
            self_id,
            neighbors,
            broker,
            receiver,
            closed: AtomicBool::new(false),
        }
    }
}

impl Transport for PubSubTransport {
    fn send_unicast(&self, neighbor_id: &str, bytes: &[u8]) -> Result<(), RouteError> {
        self.broker.deliver(
            neighbor_id,
            Frame {
                bytes: bytes.to_vec(),
                from_neighbor: self.self_id.clone(),
            },
        )
    }

    fn send_broadcast(&self, bytes: &[u8]) -> Result<(), RouteError> {
        let mut last_err = None;
        for neighbor in &self.neighbors {
            if let Err(err) = self.send_unicast(neighbor, bytes) {
                last_err = Some(err);
            }
        }
        match last_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn receive(&self) -> Result<(Vec<u8>, String), RouteError> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(RouteError::TransportFailure("transport closed".into()));
            }
            match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(frame) => {
                    let label = if frame.from_neighbor.is_empty() {
                        UNKNOWN_LINK.to_string()
                    } else {
                        frame.from_neighbor
                    };
                    return Ok((frame.bytes, label));
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(RouteError::TransportFailure("inbox disconnected".into()))
                }
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unicast_delivers_to_named_inbox() {
        let broker = Broker::new();
        let a = PubSubTransport::new("A", vec!["B".to_string()], broker.clone());
        let b = PubSubTransport::new("B", vec!["A".to_string()], broker);

        a.send_unicast("B", b"hello").unwrap();
        let (bytes, from) = b.receive().unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(from, "A");
    }

    #[test]
    fn broadcast_reaches_every_configured_neighbor() {
        let broker = Broker::new();
        let a = PubSubTransport::new("A", vec!["B".to_string(), "C".to_string()], broker.clone());
        let b = PubSubTransport::new("B", vec!["A".to_string()], broker.clone());
        let c = PubSubTransport::new("C", vec!["A".to_string()], broker);

        a.send_broadcast(b"hi").unwrap();
        assert_eq!(b.receive().unwrap().0, b"hi");
        assert_eq!(c.receive().unwrap().0, b"hi");
    }

    #[test]
    fn send_to_unregistered_node_fails() {
        let broker = Broker::new();
        let a = PubSubTransport::new("A", vec!["Z".to_string()], broker);
        let err = a.send_unicast("Z", b"hi").unwrap_err();
        assert!(matches!(err, RouteError::TransportFailure(_)));
    }

    #[test]
    fn close_unblocks_receive() {
        let broker = Broker::new();
        let a = PubSubTransport::new("A", Vec::new(), broker);
        a.close();
        let err = a.receive().unwrap_err();
        assert!(matches!(err, RouteError::TransportFailure(_)));
    }
}

//! UDP-socket transport between real, separate processes. A direct
//! generalization of `runtime::transport::UdpTransport`
//! (bind/recv-with-timeout/send) to multi-neighbor fan-out and a
//! `from_neighbor` label resolved by reverse address lookup, per
//! spec.md §6's names config (`{node_id: {host, port}}`).

use std::collections::BTreeMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::RouteError;
use crate::transport::{Transport, UNKNOWN_LINK};

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const DEFAULT_RECV_BUF: usize = 64 * 1024;

pub struct UdpMeshTransport {
    socket: UdpSocket,
    neighbor_addrs: BTreeMap<String, SocketAddr>,
    addr_to_id: BTreeMap<SocketAddr, String>,
    recv_buf_size: usize,
    closed: AtomicBool,
}

impl UdpMeshTransport {
    pub fn bind(
        bind_address: &str,
        bind_port: u16,
        neighbor_addrs: BTreeMap<String, SocketAddr>,
    ) -> Result<Self, RouteError> {
        Self::bind_with_buf(bind_address, bind_port, neighbor_addrs, DEFAULT_RECV_BUF)
    }

    pub fn bind_with_buf(
        bind_address: &str,
        bind_port: u16,
        neighbor_addrs: BTreeMap<String, SocketAddr>,
        recv_buf_size: usize,
    ) -> Result<Self, RouteError> {
        let socket = UdpSocket::bind((bind_address, bind_port))
            .map_err(|err| RouteError::TransportFailure(err.to_string()))?;
        let addr_to_id = neighbor_addrs
            .iter()
            .map(|(id, addr)| (*addr, id.clone()))
            .collect();
        Ok(Self {
            socket,
            neighbor_addrs,
            addr_to_id,
            recv_buf_size,
            closed: AtomicBool::new(false),
        })
    }
}

impl Transport for UdpMeshTransport {
    fn send_unicast(&self, neighbor_id: &str, bytes: &[u8]) -> Result<(), RouteError> {
        let addr = self
            .neighbor_addrs
            .get(neighbor_id)
            .ok_or_else(|| RouteError::TransportFailure(format!("unknown neighbor: {neighbor_id}")))?;
        self.socket
            .send_to(bytes, addr)
            .map(|_| ())
            .map_err(|err| RouteError::TransportFailure(err.to_string()))
    }

    fn send_broadcast(&self, bytes: &[u8]) -> Result<(), RouteError> {
        let mut last_err = None;
        for addr in self.neighbor_addrs.values() {
            if let Err(err) = self
                .socket
                .send_to(bytes, addr)
                .map(|_| ())
                .map_err(|err| RouteError::TransportFailure(err.to_string()))
            {
                last_err = Some(err);
            }
        }
        match last_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn receive(&self) -> Result<(Vec<u8>, String), RouteError> {
        self.socket
            .set_read_timeout(Some(POLL_INTERVAL))
            .map_err(|err| RouteError::TransportFailure(err.to_string()))?;
        let mut buf = vec![0_u8; self.recv_buf_size];
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(RouteError::TransportFailure("transport closed".into()));
            }
            match self.socket.recv_from(&mut buf) {
                Ok((n, addr)) => {
                    let label = self
                        .addr_to_id
                        .get(&addr)
                        .cloned()
                        .unwrap_or_else(|| UNKNOWN_LINK.to_string());
                    return Ok((buf[..n].to_vec(), label));
                }
                Err(err)
                    if err.kind() == std::io::ErrorKind::WouldBlock
                        || err.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue
                }
                Err(err) => return Err(RouteError::TransportFailure(err.to_string())),
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

//! The `Transport` capability (spec.md §6): opaque frame delivery between
//! a node and its directly configured neighbors. Out of the core per
//! spec.md §1 ("physical/logical message substrate ... interfaces only");
//! the orchestrator only ever calls through this trait.

pub mod pubsub;
pub mod udp_mesh;

use crate::error::RouteError;

/// Returned by [`Transport::receive`] when the substrate can't identify
/// which link a frame arrived on (spec.md §6).
pub const UNKNOWN_LINK: &str = "unknown";

pub trait Transport: Send {
    fn send_unicast(&self, neighbor_id: &str, bytes: &[u8]) -> Result<(), RouteError>;

    fn send_broadcast(&self, bytes: &[u8]) -> Result<(), RouteError>;

    /// Blocks until a frame arrives or the transport is closed. Returns
    /// `(bytes, from_neighbor_label)`; the label is [`UNKNOWN_LINK`] when
    /// the substrate can't identify the sending link.
    fn receive(&self) -> Result<(Vec<u8>, String), RouteError>;

    /// Idempotent.
    fn close(&self);
}

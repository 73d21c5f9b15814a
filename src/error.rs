//! Domain error kinds for the routing core (spec.md §7).
//!
//! None of these are fatal: the orchestrator logs and drops on every
//! variant. They exist as a typed enum (rather than bare `anyhow::Error`)
//! so call sites can match on *why* a packet was dropped.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("stale or duplicate LSA from {origin} seq={seq}")]
    StaleOrDuplicateLsa { origin: String, seq: i64 },

    #[error("spoofed LSA: payload origin {payload_origin} != sender {sender}")]
    SpoofedLsa {
        payload_origin: String,
        sender: String,
    },

    #[error("path loop detected for self_id={self_id}")]
    PathLoop { self_id: String },

    #[error("ttl expired")]
    TtlExpired,

    #[error("no route to {destination}")]
    NoRoute { destination: String },

    #[error("transport failure: {0}")]
    TransportFailure(String),
}

//! # Chronolink Networking
//!
//! Session synchronization for the countdown core.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   identify/join    ┌──────────────────┐
//! │ SessionClient│ ─────────────────► │   SessionHost    │
//! │  (replica)   │ ◄───────────────── │  (authority)     │
//! │              │  tick / fulltick   │                  │
//! │  roster copy │   action / pong    │  roster + tick   │
//! └──────┬───────┘                    └────────┬─────────┘
//!        │                                     │
//!        └───────── Transport (trait) ─────────┘
//!              line-delimited JSON envelopes
//! ```
//!
//! The client never advances the countdown itself. It replaces its roster
//! wholesale from every inbound snapshot, so any divergence lasts at most
//! one broadcast. Both sides are sans-IO state machines pumped by the
//! embedder; the transport trait keeps TCP and in-memory channels
//! interchangeable.

#![deny(unsafe_code)]

pub mod backoff;
pub mod client;
pub mod host;
pub mod transport;

pub use backoff::ReconnectBackoff;
pub use client::{ClientConfig, ClientEvent, JoinError, SessionClient, SessionView, Stage};
pub use host::{HostConfig, SessionHost};
pub use transport::{
    ChannelConnector, ChannelTransport, Connector, TcpAcceptor, TcpConnector, TcpTransport,
    Transport, TransportError, TransportEvent,
};

use std::time::Duration;

/// Time between latency probes once a session is established.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// First reconnect delay after a dropped connection.
pub const RECONNECT_INITIAL_DELAY: Duration = Duration::from_millis(250);

/// Ceiling for the doubled reconnect delay.
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(8);

/// The error text the authority broadcasts when tearing a session down.
///
/// Clients receiving it stop reconnecting; any other error keeps the
/// session alive.
pub const SESSION_ENDED: &str = "session ended";

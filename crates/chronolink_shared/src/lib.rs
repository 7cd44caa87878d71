//! # Chronolink Shared Types
//!
//! Wire protocol and snapshot types shared between the session client and
//! the session authority.
//!
//! Every message on the wire is a JSON text envelope:
//!
//! ```text
//! { "type": "<kind>", "message": <kind-specific payload> }
//! ```
//!
//! Both sides must agree on these definitions; nothing in this crate knows
//! about transports, clocks, or schedulers.

#![deny(unsafe_code)]

pub mod protocol;
pub mod team;

pub use protocol::{ActionEnvelope, JoinResult, Role, WireAction, WireMessage};
pub use team::{Speed, TeamSnapshot, TeamState};

//! The envelope protocol spoken between client and authority.
//!
//! Both directions use the same shape, serialized as JSON text:
//!
//! ```text
//! { "type": "<kind>", "message": <payload> }
//! ```
//!
//! Snapshot-bearing kinds (`tick`, `fulltick`, `team-config`) always carry a
//! full team array. The receiving side replaces its roster wholesale, which
//! keeps replicas convergent without field-level merge rules.

use serde::{Deserialize, Serialize};

use crate::team::TeamSnapshot;

/// Capability tier granted by the authority on join.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May submit state-changing actions.
    Admin,
    /// Read-only replica.
    #[default]
    Viewer,
}

/// Payload of a `join_result` envelope.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResult {
    /// Whether the join was accepted.
    pub success: bool,
    /// Capability granted to this client.
    #[serde(default)]
    pub role: Role,
    /// Number of clients currently in the session, including this one.
    #[serde(default)]
    pub user_count: u32,
    /// Team roster definition; the client re-arms from it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Vec<TeamSnapshot>>,
    /// Live tick state at join time, applied after `config`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Vec<TeamSnapshot>>,
    /// Human-readable reason when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// A named action applied to a set of team indices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireAction {
    /// Action tag, e.g. `start`, `add:-30`, `speed:2`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Zero-based indices of the affected teams.
    pub index: Vec<usize>,
}

/// Payload of an `action` envelope, both directions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEnvelope {
    /// Session this action belongs to; mismatches are discarded.
    pub session_id: String,
    /// The action itself.
    pub action: WireAction,
}

/// Every message kind that can cross the wire, in either direction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum WireMessage {
    /// Client presents its bearer credential.
    #[serde(rename = "identify")]
    Identify(String),
    /// Authority acknowledges the credential (implicit success).
    #[serde(rename = "identify_result")]
    IdentifyResult,
    /// Client asks to join a named session.
    #[serde(rename = "join")]
    Join(String),
    /// Authority answers a join request.
    #[serde(rename = "join_result")]
    JoinResult(JoinResult),
    /// A control action, client-to-authority or rebroadcast.
    #[serde(rename = "action")]
    Action(ActionEnvelope),
    /// Incremental authoritative state broadcast.
    #[serde(rename = "tick")]
    Tick(Vec<TeamSnapshot>),
    /// Full authoritative state broadcast, used after reconnects.
    #[serde(rename = "fulltick")]
    FullTick(Vec<TeamSnapshot>),
    /// Roster structure change broadcast.
    #[serde(rename = "team-config")]
    TeamConfig(Vec<TeamSnapshot>),
    /// Number of connected clients, as a decimal string.
    #[serde(rename = "user-count")]
    UserCount(String),
    /// Latency probe.
    #[serde(rename = "ping")]
    Ping,
    /// Latency probe reply.
    #[serde(rename = "pong")]
    Pong,
    /// Human-readable error surfaced as a notification.
    #[serde(rename = "error")]
    Error(String),
    /// Human-readable notice surfaced as a notification.
    #[serde(rename = "info")]
    Info(String),
}

impl WireMessage {
    /// Serializes this message to envelope text.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses envelope text into a message.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

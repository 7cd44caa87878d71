//! # Session Client
//!
//! The replica side of a session: handshake, heartbeat, reconnect, and
//! wholesale absorption of authoritative snapshots.
//!
//! ## Lifecycle
//!
//! ```text
//! Disconnected ─ join() ─► Connecting ─► Identifying ─► Joining ─► InSession
//!       ▲                      │              │            │           │
//!       │                      │   (backoff)  │            │           │
//!       └── leave()            └──◄───────────┴─ drop ─────┴───────────┘
//! ```
//!
//! Failure stages carry negative codes so an embedder can render every
//! terminal state from one number. The client is sans-IO: nothing happens
//! between calls to [`SessionClient::pump`].

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use chronolink_core::{
    Action, ActionDispatcher, CoreEvent, EventChannel, Team, TeamRoster,
};
use chronolink_shared::{
    ActionEnvelope, JoinResult, Role, TeamSnapshot, TeamState, WireAction, WireMessage,
};
use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use thiserror::Error;

use crate::backoff::ReconnectBackoff;
use crate::transport::{Connector, Transport, TransportEvent};
use crate::{HEARTBEAT_INTERVAL, RECONNECT_INITIAL_DELAY, RECONNECT_MAX_DELAY, SESSION_ENDED};

/// Where the client is in the session lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Stage {
    /// Not attached to any session.
    #[default]
    Disconnected,
    /// Dialing, or waiting out a reconnect delay.
    Connecting,
    /// Connected, waiting for the credential to be acknowledged.
    Identifying,
    /// Identified, waiting for the join verdict.
    Joining,
    /// Joined; the roster tracks the authority.
    InSession,
    /// Gave up dialing after the configured number of attempts.
    ConnectionFailed,
    /// The authority refused the join.
    JoinFailed,
    /// The authority ended the session.
    SessionEnded,
}

impl Stage {
    /// Numeric code: the forward path counts up from zero, terminal
    /// failures are negative.
    #[must_use]
    pub const fn code(self) -> i8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Identifying => 2,
            Self::Joining => 3,
            Self::InSession => 4,
            Self::ConnectionFailed => -1,
            Self::JoinFailed => -2,
            Self::SessionEnded => -3,
        }
    }

    /// Whether this is a terminal failure stage.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        self.code() < 0
    }
}

/// Session-level notifications for the embedder.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    /// The lifecycle stage changed.
    StageChanged(Stage),
    /// The authority refused the join, with its reason.
    JoinFailed(String),
    /// An authoritative action broadcast was applied to the replica.
    ActionBroadcast {
        /// The action.
        action: Action,
        /// Indices it named.
        indices: Vec<usize>,
    },
    /// The session population changed.
    UserCount(u32),
    /// A heartbeat round trip completed, in milliseconds.
    Latency(f64),
    /// The authority surfaced an error notice.
    ServerError(String),
    /// The authority surfaced an informational notice.
    Info(String),
}

/// Tunables for the session client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Bearer credential presented at identify time.
    pub credential: String,
    /// Time between latency probes.
    pub heartbeat_interval: std::time::Duration,
    /// First reconnect delay.
    pub reconnect_initial: std::time::Duration,
    /// Ceiling for the doubled reconnect delay.
    pub reconnect_max: std::time::Duration,
    /// Dial attempts before giving up; `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            credential: String::new(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            reconnect_initial: RECONNECT_INITIAL_DELAY,
            reconnect_max: RECONNECT_MAX_DELAY,
            max_reconnect_attempts: None,
        }
    }
}

impl ClientConfig {
    /// Default tunables with the given credential.
    #[must_use]
    pub fn with_credential(credential: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            ..Self::default()
        }
    }
}

/// Errors starting a join attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    /// The credential is empty; the authority would refuse it anyway.
    #[error("credential must not be empty")]
    MissingCredential,
}

/// A read-only snapshot of the client, shareable across threads.
///
/// The client refreshes it on every observable change, so render loops can
/// read the latest state without pumping or draining events.
#[derive(Clone, Debug, Default)]
pub struct SessionView {
    /// Current lifecycle stage.
    pub stage: Stage,
    /// Last measured heartbeat round trip, if any.
    pub latency_ms: Option<f64>,
    /// Session population as last broadcast.
    pub user_count: u32,
    /// The replica roster.
    pub teams: Vec<TeamSnapshot>,
}

type JoinFailedHandler = Box<dyn FnMut(String) + Send>;

/// The replica endpoint of a countdown session.
pub struct SessionClient {
    config: ClientConfig,
    connector: Box<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    stage: Stage,
    session_id: String,
    admin_role: bool,
    roster: TeamRoster,
    dispatcher: ActionDispatcher,
    core_events: EventChannel<CoreEvent>,
    events: EventChannel<ClientEvent>,
    backoff: ReconnectBackoff,
    attempts: u32,
    next_dial: Option<Instant>,
    next_ping: Option<Instant>,
    ping_sent: Option<Instant>,
    latency_ms: Option<f64>,
    user_count: u32,
    on_join_failed: Option<JoinFailedHandler>,
    view: Arc<RwLock<SessionView>>,
}

impl SessionClient {
    /// Creates a detached client that will dial through `connector`.
    #[must_use]
    pub fn new(connector: Box<dyn Connector>, config: ClientConfig) -> Self {
        let core_events = EventChannel::unbounded();
        let dispatcher = ActionDispatcher::new(core_events.sender());
        let backoff = ReconnectBackoff::new(config.reconnect_initial, config.reconnect_max);
        Self {
            config,
            connector,
            transport: None,
            stage: Stage::Disconnected,
            session_id: String::new(),
            admin_role: false,
            roster: TeamRoster::new(),
            dispatcher,
            core_events,
            events: EventChannel::unbounded(),
            backoff,
            attempts: 0,
            next_dial: None,
            next_ping: None,
            ping_sent: None,
            latency_ms: None,
            user_count: 0,
            on_join_failed: None,
            view: Arc::new(RwLock::new(SessionView::default())),
        }
    }

    /// Current lifecycle stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Whether the authority granted this client the admin role.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.admin_role
    }

    /// Last measured heartbeat round trip in milliseconds.
    ///
    /// Goes stale rather than blank when probes stop being answered.
    #[must_use]
    pub const fn latency_ms(&self) -> Option<f64> {
        self.latency_ms
    }

    /// Session population as last broadcast by the authority.
    #[must_use]
    pub const fn user_count(&self) -> u32 {
        self.user_count
    }

    /// Read access to the replica roster.
    #[must_use]
    pub fn roster(&self) -> &TeamRoster {
        &self.roster
    }

    /// A receiver of session notifications.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<ClientEvent> {
        self.events.receiver()
    }

    /// A receiver of countdown core notifications.
    #[must_use]
    pub fn subscribe_core(&self) -> Receiver<CoreEvent> {
        self.core_events.receiver()
    }

    /// A shared handle to the read-only view of this client.
    #[must_use]
    pub fn view(&self) -> Arc<RwLock<SessionView>> {
        Arc::clone(&self.view)
    }

    /// Starts joining the named session.
    ///
    /// `on_failed` fires with the authority's reason if the join is refused.
    /// The credential is checked locally first; an empty one never reaches
    /// the wire.
    pub fn join(
        &mut self,
        session_id: impl Into<String>,
        on_failed: impl FnMut(String) + Send + 'static,
    ) -> Result<(), JoinError> {
        if self.config.credential.trim().is_empty() {
            return Err(JoinError::MissingCredential);
        }
        self.session_id = session_id.into();
        self.on_join_failed = Some(Box::new(on_failed));
        self.admin_role = false;
        self.attempts = 0;
        self.backoff.reset();
        self.set_stage(Stage::Connecting);
        self.dial(Instant::now());
        Ok(())
    }

    /// Detaches from the session and closes the connection.
    pub fn leave(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.next_dial = None;
        self.next_ping = None;
        self.ping_sent = None;
        self.set_stage(Stage::Disconnected);
    }

    /// Submits an action for the teams at `indices`.
    ///
    /// Admins apply it locally at send time; the authoritative echo is then
    /// a no-op. Viewers only transmit, and the authority will refuse them.
    /// Returns whether the action was transmitted.
    pub fn send_action(&mut self, action: &Action, indices: &[usize]) -> bool {
        if self.stage != Stage::InSession {
            return false;
        }
        if self.admin_role {
            self.dispatcher
                .dispatch(&mut self.roster, action, indices, SystemTime::now());
            self.refresh_view();
        }
        let message = WireMessage::Action(ActionEnvelope {
            session_id: self.session_id.clone(),
            action: WireAction {
                kind: action.to_string(),
                index: indices.to_vec(),
            },
        });
        match self.transport.as_mut() {
            Some(transport) => send_on(transport.as_mut(), &message),
            None => false,
        }
    }

    /// One turn of the client state machine.
    ///
    /// Dials when a reconnect is due, fires the heartbeat when due, and
    /// drains everything the transport has received.
    pub fn pump(&mut self, now: Instant) {
        if self.transport.is_none() {
            if let Some(at) = self.next_dial {
                if now >= at {
                    self.next_dial = None;
                    self.dial(now);
                }
            }
        }

        if self.stage == Stage::InSession && self.ping_sent.is_none() {
            if let Some(at) = self.next_ping {
                if now >= at {
                    if let Some(transport) = self.transport.as_mut() {
                        if send_on(transport.as_mut(), &WireMessage::Ping) {
                            self.ping_sent = Some(now);
                        }
                    }
                }
            }
        }

        let Some(mut transport) = self.transport.take() else {
            return;
        };
        let mut keep = true;
        while let Some(event) = transport.poll() {
            match event {
                TransportEvent::Connected => {
                    let credential = self.config.credential.clone();
                    send_on(transport.as_mut(), &WireMessage::Identify(credential));
                    self.set_stage(Stage::Identifying);
                }
                TransportEvent::Message(line) => {
                    keep = self.handle_line(transport.as_mut(), &line, now);
                }
                TransportEvent::Disconnected => {
                    tracing::debug!("connection dropped");
                    keep = false;
                    self.connection_lost(now);
                }
                TransportEvent::Error(reason) => {
                    tracing::warn!("transport failed: {reason}");
                    keep = false;
                    self.connection_lost(now);
                }
            }
            if !keep {
                break;
            }
        }
        if keep {
            self.transport = Some(transport);
        } else {
            transport.close();
        }
    }

    fn dial(&mut self, now: Instant) {
        if let Some(max) = self.config.max_reconnect_attempts {
            if self.attempts >= max {
                tracing::warn!("giving up after {max} connection attempts");
                self.set_stage(Stage::ConnectionFailed);
                return;
            }
        }
        self.attempts += 1;
        match self.connector.connect() {
            Ok(transport) => {
                self.transport = Some(transport);
            }
            Err(e) => {
                tracing::warn!("dial failed: {e}");
                self.connection_lost(now);
            }
        }
    }

    /// A live connection went away. Schedules the next dial unless a
    /// terminal stage was already reached.
    fn connection_lost(&mut self, now: Instant) {
        self.transport = None;
        self.next_ping = None;
        self.ping_sent = None;
        if self.stage.is_failure() || self.stage == Stage::Disconnected {
            return;
        }
        let delay = self.backoff.next_delay();
        self.next_dial = Some(now + delay);
        self.set_stage(Stage::Connecting);
    }

    fn handle_line(&mut self, transport: &mut dyn Transport, line: &str, now: Instant) -> bool {
        let message = match WireMessage::decode(line) {
            Ok(message) => message,
            Err(e) => {
                if self.stage == Stage::InSession {
                    tracing::warn!("unreadable message in session: {e}");
                    self.events
                        .send(ClientEvent::ServerError(format!("unreadable message: {e}")));
                    return true;
                }
                // Handshake garbage means this is not a countdown authority.
                self.fail_join("unrecognized reply from authority".to_string());
                return false;
            }
        };

        match message {
            WireMessage::IdentifyResult => {
                if self.stage == Stage::Identifying {
                    send_on(transport, &WireMessage::Join(self.session_id.clone()));
                    self.set_stage(Stage::Joining);
                }
                true
            }
            WireMessage::JoinResult(result) => self.handle_join_result(result, now),
            WireMessage::Action(envelope) => {
                if envelope.session_id == self.session_id {
                    self.apply_broadcast(&envelope.action);
                } else {
                    tracing::debug!(
                        "discarding action for other session {}",
                        envelope.session_id
                    );
                }
                true
            }
            WireMessage::Tick(snapshots) | WireMessage::FullTick(snapshots) => {
                self.absorb(&snapshots, SystemTime::now());
                true
            }
            WireMessage::TeamConfig(config) => {
                self.roster.configure(&config);
                self.core_events.send(CoreEvent::RosterReplaced);
                self.refresh_view();
                true
            }
            WireMessage::UserCount(text) => {
                match text.trim().parse::<u32>() {
                    Ok(count) => {
                        self.user_count = count;
                        self.events.send(ClientEvent::UserCount(count));
                        self.refresh_view();
                    }
                    Err(_) => tracing::warn!("unreadable user count: {text}"),
                }
                true
            }
            WireMessage::Ping => {
                send_on(transport, &WireMessage::Pong);
                true
            }
            WireMessage::Pong => {
                if let Some(sent) = self.ping_sent.take() {
                    let ms = now.duration_since(sent).as_secs_f64() * 1000.0;
                    self.latency_ms = Some(ms);
                    self.events.send(ClientEvent::Latency(ms));
                    self.refresh_view();
                }
                self.next_ping = Some(now + self.config.heartbeat_interval);
                true
            }
            WireMessage::Error(text) => {
                if text == SESSION_ENDED {
                    self.next_dial = None;
                    self.set_stage(Stage::SessionEnded);
                    return false;
                }
                if self.stage == Stage::Identifying || self.stage == Stage::Joining {
                    self.fail_join(text);
                    return false;
                }
                self.events.send(ClientEvent::ServerError(text));
                true
            }
            WireMessage::Info(text) => {
                self.events.send(ClientEvent::Info(text));
                true
            }
            WireMessage::Identify(_) | WireMessage::Join(_) => {
                tracing::debug!("ignoring request-kind message from authority");
                true
            }
        }
    }

    fn handle_join_result(&mut self, result: JoinResult, now: Instant) -> bool {
        if !result.success {
            let reason = result
                .error_message
                .unwrap_or_else(|| "join refused".to_string());
            self.fail_join(reason);
            return false;
        }

        self.admin_role = result.role == Role::Admin;
        if let Some(config) = result.config {
            self.roster.configure(&config);
        }
        if let Some(state) = result.state {
            self.absorb(&state, SystemTime::now());
        }
        self.user_count = result.user_count;
        self.events.send(ClientEvent::UserCount(result.user_count));
        self.attempts = 0;
        self.backoff.reset();
        self.next_ping = Some(now + self.config.heartbeat_interval);
        self.ping_sent = None;
        self.set_stage(Stage::InSession);
        true
    }

    /// Applies an authoritative action broadcast to the replica.
    ///
    /// Admins skip it; they already applied the action at send time, and
    /// replaying a non-idempotent adjustment would double it.
    fn apply_broadcast(&mut self, wire: &WireAction) {
        if self.admin_role {
            return;
        }
        match wire.kind.parse::<Action>() {
            Ok(action) => {
                self.dispatcher
                    .dispatch(&mut self.roster, &action, &wire.index, SystemTime::now());
                self.events.send(ClientEvent::ActionBroadcast {
                    action,
                    indices: wire.index.clone(),
                });
                self.refresh_view();
            }
            Err(e) => tracing::warn!("dropping broadcast action: {e}"),
        }
    }

    /// Replaces the roster wholesale, computing finish drift first.
    ///
    /// When the authority reports a team finished that this replica still
    /// had running, the difference between the authoritative finish instant
    /// and the finish this replica would have predicted is recorded on the
    /// team as its final drift. Inbound snapshots never carry that value,
    /// so it is carried across replacements for as long as the team stays
    /// finished; a rearm broadcast clears it with the rest of the run.
    fn absorb(&mut self, snapshots: &[TeamSnapshot], wall: SystemTime) {
        let mut drifts = Vec::new();
        for (index, snap) in snapshots.iter().enumerate() {
            if snap.state != TeamState::Finished || snap.drift_ms.is_some() {
                continue;
            }
            let Some(local) = self.roster.get(index) else {
                continue;
            };
            if let Some(existing) = local.final_drift_ms {
                drifts.push((index, existing));
                continue;
            }
            if local.state == TeamState::Finished {
                continue;
            }
            let Some(authoritative) = snap.finish_time else {
                continue;
            };
            if let Some(predicted) = predicted_finish_ms(local, wall) {
                drifts.push((index, authoritative - predicted));
            }
        }

        self.roster.replace_all(snapshots);
        for (index, drift) in drifts {
            if let Some(team) = self.roster.get_mut(index) {
                team.final_drift_ms = Some(drift);
            }
        }
        self.core_events.send(CoreEvent::RosterReplaced);
        self.refresh_view();
    }

    fn fail_join(&mut self, reason: String) {
        tracing::info!("join failed: {reason}");
        self.next_dial = None;
        self.events.send(ClientEvent::JoinFailed(reason.clone()));
        if let Some(handler) = self.on_join_failed.as_mut() {
            handler(reason);
        }
        self.set_stage(Stage::JoinFailed);
    }

    fn set_stage(&mut self, stage: Stage) {
        if self.stage == stage {
            return;
        }
        tracing::debug!("stage {:?} -> {:?}", self.stage, stage);
        self.stage = stage;
        self.events.send(ClientEvent::StageChanged(stage));
        self.refresh_view();
    }

    fn refresh_view(&self) {
        let mut view = self.view.write();
        view.stage = self.stage;
        view.latency_ms = self.latency_ms;
        view.user_count = self.user_count;
        view.teams = self.roster.snapshots();
    }
}

fn send_on(transport: &mut dyn Transport, message: &WireMessage) -> bool {
    match message.encode() {
        Ok(line) => match transport.send(&line) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("send failed: {e}");
                false
            }
        },
        Err(e) => {
            tracing::warn!("encode failed: {e}");
            false
        }
    }
}

/// The instant this replica expects `team` to finish, in epoch milliseconds.
fn predicted_finish_ms(team: &Team, wall: SystemTime) -> Option<i64> {
    let now_ms = i64::try_from(wall.duration_since(UNIX_EPOCH).ok()?.as_millis()).ok()?;
    #[allow(clippy::cast_possible_truncation)]
    let remaining_ms = (f64::from(team.time_left) / team.speed.multiplier() * 1000.0) as i64;
    Some(now_ms + remaining_ms)
}

//! # Session Host
//!
//! The authority for one session: it owns the only countdown that actually
//! runs, admits clients through the identify/join handshake, and keeps every
//! replica converged by broadcasting snapshots.
//!
//! ## Admission
//!
//! ```text
//! identify(credential)      non-empty, else the peer is refused
//! join(session id)          must match; admin iff credential matches
//! ```
//!
//! Only admins may submit actions. Each accepted action is rebroadcast to
//! every member, followed by a full snapshot so replicas converge even if a
//! broadcast is lost or applied divergently.

use std::time::{Instant, SystemTime};

use chronolink_core::{
    export_csv, ActionDispatcher, CoreEvent, EventChannel, SchedulerConfig, TeamRoster,
    TickScheduler,
};
use chronolink_shared::{JoinResult, Role, TeamSnapshot, WireMessage};
use crossbeam_channel::Receiver;

use crate::transport::{Transport, TransportEvent};
use crate::SESSION_ENDED;

/// Tunables for the session authority.
#[derive(Clone, Debug)]
pub struct HostConfig {
    /// The session name clients must ask for.
    pub session_id: String,
    /// Credential that grants the admin role at join time.
    pub admin_credential: String,
    /// Countdown commit timing.
    pub scheduler: SchedulerConfig,
}

impl HostConfig {
    /// Default timing with the given session name and admin credential.
    #[must_use]
    pub fn new(session_id: impl Into<String>, admin_credential: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            admin_credential: admin_credential.into(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// One connected client and what it has proven so far.
struct Peer {
    transport: Box<dyn Transport>,
    credential: Option<String>,
    joined: bool,
    admin: bool,
    alive: bool,
}

impl Peer {
    fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            credential: None,
            joined: false,
            admin: false,
            alive: true,
        }
    }

    fn send(&mut self, message: &WireMessage) {
        let Ok(line) = message.encode() else {
            return;
        };
        if self.transport.send(&line).is_err() {
            self.alive = false;
        }
    }
}

/// The authoritative endpoint of one countdown session.
pub struct SessionHost {
    config: HostConfig,
    roster: TeamRoster,
    scheduler: TickScheduler,
    dispatcher: ActionDispatcher,
    events: EventChannel<CoreEvent>,
    peers: Vec<Peer>,
}

impl SessionHost {
    /// Creates a host for one session with the given team configuration.
    #[must_use]
    pub fn new(config: HostConfig, teams: &[TeamSnapshot]) -> Self {
        let mut roster = TeamRoster::new();
        roster.configure(teams);
        let events = EventChannel::unbounded();
        let dispatcher = ActionDispatcher::new(events.sender());
        let scheduler = TickScheduler::new(config.scheduler);
        Self {
            config,
            roster,
            scheduler,
            dispatcher,
            events,
            peers: Vec::new(),
        }
    }

    /// Read access to the authoritative roster.
    #[must_use]
    pub fn roster(&self) -> &TeamRoster {
        &self.roster
    }

    /// Number of joined members.
    #[must_use]
    pub fn user_count(&self) -> u32 {
        u32::try_from(self.peers.iter().filter(|p| p.joined).count()).unwrap_or(u32::MAX)
    }

    /// A receiver of countdown core notifications.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.events.receiver()
    }

    /// Renders the authoritative roster as a checksummed CSV report.
    #[must_use]
    pub fn export_csv(&self) -> String {
        export_csv(self.roster.teams())
    }

    /// Adopts a freshly accepted connection.
    pub fn accept(&mut self, transport: Box<dyn Transport>) {
        self.peers.push(Peer::new(transport));
    }

    /// Replaces the team configuration, re-arming every team.
    ///
    /// Members learn about the structural change through a `team-config`
    /// broadcast and replace their rosters wholesale.
    pub fn set_teams(&mut self, teams: &[TeamSnapshot]) {
        self.roster.configure(teams);
        self.events.send(CoreEvent::RosterReplaced);
        self.broadcast(&WireMessage::TeamConfig(self.roster.config_snapshots()));
    }

    /// One turn of the authority: advance the countdown, service every peer.
    pub fn pump(&mut self, now: Instant) {
        let committed = self.scheduler.poll(
            &mut self.roster,
            &self.events.sender(),
            now,
            SystemTime::now(),
        );
        if committed {
            self.broadcast(&WireMessage::Tick(self.roster.snapshots()));
        }

        let members_before = self.user_count();
        for index in 0..self.peers.len() {
            self.service_peer(index);
        }
        self.peers.retain(|p| p.alive);
        if self.user_count() != members_before {
            self.broadcast_user_count();
        }
    }

    /// Ends the session: every member is told and every connection closed.
    pub fn shutdown(&mut self) {
        tracing::info!("session {} ending", self.config.session_id);
        self.broadcast(&WireMessage::Error(SESSION_ENDED.to_string()));
        for peer in &mut self.peers {
            peer.transport.close();
        }
        self.peers.clear();
    }

    fn service_peer(&mut self, index: usize) {
        loop {
            let Some(event) = self.peers[index].transport.poll() else {
                return;
            };
            match event {
                TransportEvent::Connected => {}
                TransportEvent::Message(line) => self.handle_line(index, &line),
                TransportEvent::Disconnected | TransportEvent::Error(_) => {
                    self.peers[index].alive = false;
                    return;
                }
            }
            if !self.peers[index].alive {
                return;
            }
        }
    }

    fn handle_line(&mut self, index: usize, line: &str) {
        let message = match WireMessage::decode(line) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!("dropping unreadable message: {e}");
                return;
            }
        };

        match message {
            WireMessage::Identify(credential) => self.handle_identify(index, credential),
            WireMessage::Join(session_id) => self.handle_join(index, &session_id),
            WireMessage::Action(envelope) => {
                if envelope.session_id != self.config.session_id {
                    tracing::debug!("dropping action for session {}", envelope.session_id);
                    return;
                }
                self.handle_action(index, &envelope.action.kind, &envelope.action.index);
            }
            WireMessage::Ping => self.peers[index].send(&WireMessage::Pong),
            other => {
                tracing::debug!("ignoring {other:?} from client");
            }
        }
    }

    fn handle_identify(&mut self, index: usize, credential: String) {
        if credential.trim().is_empty() {
            self.peers[index].send(&WireMessage::Error("identify refused".to_string()));
            self.peers[index].alive = false;
            return;
        }
        self.peers[index].credential = Some(credential);
        self.peers[index].send(&WireMessage::IdentifyResult);
    }

    fn handle_join(&mut self, index: usize, session_id: &str) {
        if self.peers[index].credential.is_none() {
            self.peers[index].send(&WireMessage::Error("identify first".to_string()));
            self.peers[index].alive = false;
            return;
        }
        if session_id != self.config.session_id {
            self.peers[index].send(&WireMessage::JoinResult(JoinResult {
                success: false,
                error_message: Some("no such session".to_string()),
                ..JoinResult::default()
            }));
            return;
        }

        let admin = self.peers[index].credential.as_deref()
            == Some(self.config.admin_credential.as_str());
        self.peers[index].joined = true;
        self.peers[index].admin = admin;

        let result = JoinResult {
            success: true,
            role: if admin { Role::Admin } else { Role::Viewer },
            user_count: self.user_count(),
            config: Some(self.roster.config_snapshots()),
            state: Some(self.roster.snapshots()),
            error_message: None,
        };
        self.peers[index].send(&WireMessage::JoinResult(result));
        self.broadcast_user_count();
    }

    fn handle_action(&mut self, index: usize, kind: &str, indices: &[usize]) {
        if !self.peers[index].admin {
            self.peers[index].send(&WireMessage::Error("not authorized".to_string()));
            return;
        }
        match self
            .dispatcher
            .dispatch_tag(&mut self.roster, kind, indices, SystemTime::now())
        {
            Ok(_) => {
                // Rebroadcast the action, then a full snapshot so replicas
                // converge even if they mishandle the action itself.
                self.broadcast(&WireMessage::Action(chronolink_shared::ActionEnvelope {
                    session_id: self.config.session_id.clone(),
                    action: chronolink_shared::WireAction {
                        kind: kind.to_string(),
                        index: indices.to_vec(),
                    },
                }));
                self.broadcast(&WireMessage::FullTick(self.roster.snapshots()));
            }
            Err(e) => {
                tracing::warn!("refusing action from admin: {e}");
                self.peers[index].send(&WireMessage::Error(e.to_string()));
            }
        }
    }

    fn broadcast(&mut self, message: &WireMessage) {
        let Ok(line) = message.encode() else {
            return;
        };
        for peer in self.peers.iter_mut().filter(|p| p.joined && p.alive) {
            if peer.transport.send(&line).is_err() {
                peer.alive = false;
            }
        }
    }

    fn broadcast_user_count(&mut self) {
        let count = self.user_count();
        self.broadcast(&WireMessage::UserCount(count.to_string()));
    }
}

//! # Local Runtime
//!
//! The standalone assembly of roster, scheduler and dispatcher, for running
//! countdowns without any session attached. The session layer builds the
//! same pieces itself; this type exists so a local-only embedder gets the
//! full behavior from one handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime};

use chronolink_shared::TeamSnapshot;
use crossbeam_channel::Receiver;

use crate::dispatch::{Action, ActionDispatcher};
use crate::events::{CoreEvent, EventChannel};
use crate::export::export_csv;
use crate::roster::TeamRoster;
use crate::scheduler::{SchedulerConfig, TickScheduler};

/// A self-driving countdown engine for local mode.
#[derive(Debug)]
pub struct LocalRuntime {
    roster: TeamRoster,
    scheduler: TickScheduler,
    dispatcher: ActionDispatcher,
    events: EventChannel<CoreEvent>,
}

impl LocalRuntime {
    /// Creates a runtime from a team configuration, every team armed.
    #[must_use]
    pub fn new(config: &[TeamSnapshot]) -> Self {
        Self::with_scheduler(config, SchedulerConfig::default())
    }

    /// Creates a runtime with explicit scheduler timing.
    #[must_use]
    pub fn with_scheduler(config: &[TeamSnapshot], scheduler: SchedulerConfig) -> Self {
        let mut roster = TeamRoster::new();
        roster.configure(config);
        let events = EventChannel::unbounded();
        let dispatcher = ActionDispatcher::new(events.sender());
        Self {
            roster,
            scheduler: TickScheduler::new(scheduler),
            dispatcher,
            events,
        }
    }

    /// Read access to the roster.
    #[must_use]
    pub fn roster(&self) -> &TeamRoster {
        &self.roster
    }

    /// One wake-up of the countdown loop. Returns whether a tick committed.
    pub fn pump(&mut self, now: Instant) -> bool {
        self.scheduler
            .poll(&mut self.roster, &self.events.sender(), now, SystemTime::now())
    }

    /// Applies an action to the teams at `indices`.
    ///
    /// Returns the number of teams whose state changed.
    pub fn dispatch(&mut self, action: &Action, indices: &[usize]) -> usize {
        self.dispatcher
            .dispatch(&mut self.roster, action, indices, SystemTime::now())
    }

    /// Applies an action to every team.
    pub fn dispatch_all(&mut self, action: &Action) -> usize {
        let indices = self.roster.all_indices();
        self.dispatch(action, &indices)
    }

    /// Wire snapshots of every team.
    #[must_use]
    pub fn snapshots(&self) -> Vec<TeamSnapshot> {
        self.roster.snapshots()
    }

    /// A receiver of runtime notifications.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.events.receiver()
    }

    /// Renders the current roster as a checksummed CSV report.
    #[must_use]
    pub fn export_csv(&self) -> String {
        export_csv(self.roster.teams())
    }

    /// Drives the countdown loop until `stop` is set.
    ///
    /// Sleeps the configured wake interval between polls. Intended to run on
    /// a dedicated thread; all other methods stay with the owning thread.
    pub fn run(&mut self, stop: &AtomicBool) {
        let wake = self.scheduler.config().wake_interval;
        while !stop.load(Ordering::Relaxed) {
            self.pump(Instant::now());
            std::thread::sleep(wake);
        }
    }
}

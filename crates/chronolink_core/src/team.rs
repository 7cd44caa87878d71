//! # Team Countdown Model
//!
//! The data and transition rules for one countdown entity.
//!
//! ## Design
//!
//! - Transitions are pure and total: an invalid transition is a no-op,
//!   never an error
//! - The caller learns from the returned [`Transition`] whether anything
//!   changed and whether the team finished on this call, so completion
//!   notices fire exactly once per run
//! - Wall-clock instants are passed in, never read here

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chronolink_shared::{Speed, TeamSnapshot, TeamState};

use crate::dispatch::Action;

/// Outcome of applying one event to one team.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Transition {
    /// Whether any observable field changed.
    pub changed: bool,
    /// Whether the team entered `Finished` on this call.
    pub finished: bool,
}

impl Transition {
    /// The no-op transition.
    pub const NONE: Self = Self {
        changed: false,
        finished: false,
    };

    fn merge(self, other: Self) -> Self {
        Self {
            changed: self.changed || other.changed,
            finished: self.finished || other.finished,
        }
    }
}

/// One independently controllable countdown.
#[derive(Clone, Debug, PartialEq)]
pub struct Team {
    /// Display name.
    pub name: String,
    /// Configured countdown length in seconds.
    pub base_time: u32,
    /// Seconds remaining.
    pub time_left: u32,
    /// Lifecycle state.
    pub state: TeamState,
    /// Speed multiplier.
    pub speed: Speed,
    /// Real seconds spent running; advancing adds `1/speed`.
    pub time_running: f64,
    /// Real seconds spent paused; advancing adds `1/speed`.
    pub time_paused: f64,
    /// Total seconds granted by adjustments.
    pub time_added: u32,
    /// Total seconds removed by adjustments.
    pub time_subtracted: u32,
    /// Instant the current run started.
    pub start_time: Option<SystemTime>,
    /// Instant the countdown finished.
    pub finish_time: Option<SystemTime>,
    /// Session mode only: authoritative minus locally predicted finish
    /// instant, in milliseconds.
    pub final_drift_ms: Option<i64>,
}

impl Team {
    /// Creates a team armed at its base time.
    #[must_use]
    pub fn new(name: impl Into<String>, base_time: u32) -> Self {
        Self {
            name: name.into(),
            base_time,
            time_left: base_time,
            state: TeamState::Ready,
            speed: Speed::One,
            time_running: 0.0,
            time_paused: 0.0,
            time_added: 0,
            time_subtracted: 0,
            start_time: None,
            finish_time: None,
            final_drift_ms: None,
        }
    }

    /// Applies one action, returning what happened.
    ///
    /// Invalid transitions are no-ops. `now` stamps `start_time` and
    /// `finish_time` where the transition calls for it.
    pub fn apply(&mut self, action: &Action, now: SystemTime) -> Transition {
        match action {
            Action::Start => self.start(now),
            Action::Pause => self.pause(),
            Action::Unpause => self.unpause(),
            Action::Finish => self.finish(now),
            Action::Add(seconds) => self.add_time(*seconds, now),
            Action::Rearm => self.rearm(),
            Action::SetSpeed(speed) => self.set_speed(*speed),
        }
    }

    fn start(&mut self, now: SystemTime) -> Transition {
        if self.base_time == 0 {
            return Transition::NONE;
        }
        match self.state {
            TeamState::Paused => {
                self.state = TeamState::Running;
                Transition {
                    changed: true,
                    finished: false,
                }
            }
            TeamState::Ready => {
                self.start_time = Some(now);
                self.time_left = self.base_time;
                self.state = TeamState::Running;
                Transition {
                    changed: true,
                    finished: false,
                }
            }
            TeamState::Running | TeamState::Finished => Transition::NONE,
        }
    }

    fn pause(&mut self) -> Transition {
        if self.state == TeamState::Running {
            self.state = TeamState::Paused;
            return Transition {
                changed: true,
                finished: false,
            };
        }
        Transition::NONE
    }

    fn unpause(&mut self) -> Transition {
        if self.state == TeamState::Paused {
            self.state = TeamState::Running;
            return Transition {
                changed: true,
                finished: false,
            };
        }
        Transition::NONE
    }

    fn finish(&mut self, now: SystemTime) -> Transition {
        if self.state == TeamState::Finished {
            return Transition::NONE;
        }
        self.state = TeamState::Finished;
        self.finish_time = Some(now);
        Transition {
            changed: true,
            finished: true,
        }
    }

    fn add_time(&mut self, seconds: i64, now: SystemTime) -> Transition {
        let old = i64::from(self.time_left);
        // Saturate at both ends: an oversized positive payload pins at
        // u32::MAX rather than wrapping through zero.
        let new = old.saturating_add(seconds).clamp(0, i64::from(u32::MAX));
        #[allow(clippy::cast_possible_truncation)]
        let applied = (new - old).unsigned_abs() as u32;
        self.time_left = u32::try_from(new).unwrap_or(u32::MAX);

        // Bucket the clamped delta, not the requested one.
        if seconds > 0 {
            self.time_added = self.time_added.saturating_add(applied);
        } else {
            self.time_subtracted = self.time_subtracted.saturating_add(applied);
        }

        let mut transition = Transition {
            changed: applied > 0,
            finished: false,
        };
        if self.time_left == 0 {
            transition = transition.merge(self.finish(now));
        }
        transition
    }

    fn rearm(&mut self) -> Transition {
        self.state = TeamState::Ready;
        self.time_left = self.base_time;
        self.time_running = 0.0;
        self.time_paused = 0.0;
        self.time_added = 0;
        self.time_subtracted = 0;
        self.start_time = None;
        self.finish_time = None;
        self.speed = Speed::One;
        self.final_drift_ms = None;
        Transition {
            changed: true,
            finished: false,
        }
    }

    fn set_speed(&mut self, speed: Speed) -> Transition {
        let changed = self.speed != speed;
        self.speed = speed;
        Transition {
            changed,
            finished: false,
        }
    }

    /// Advances this team by one committed tick cycle.
    ///
    /// Running teams lose one second and accrue `1/speed` of running time;
    /// paused teams accrue `1/speed` of paused time. A running team hitting
    /// zero finishes here, exactly once.
    pub(crate) fn advance(&mut self, now: SystemTime) -> Transition {
        match self.state {
            TeamState::Running if self.time_left > 0 => {
                self.time_left -= 1;
                self.time_running += 1.0 / self.speed.multiplier();
                let mut transition = Transition {
                    changed: true,
                    finished: false,
                };
                if self.time_left == 0 {
                    transition = transition.merge(self.finish(now));
                }
                transition
            }
            TeamState::Paused if self.time_left > 0 => {
                self.time_paused += 1.0 / self.speed.multiplier();
                Transition {
                    changed: true,
                    finished: false,
                }
            }
            _ => Transition::NONE,
        }
    }

    /// Builds the wire snapshot of this team.
    #[must_use]
    pub fn snapshot(&self) -> TeamSnapshot {
        TeamSnapshot {
            name: self.name.clone(),
            base_time: self.base_time,
            time_left: self.time_left,
            state: self.state,
            speed: self.speed,
            time_running: self.time_running,
            time_paused: self.time_paused,
            time_added: self.time_added,
            time_subtracted: self.time_subtracted,
            start_time: self.start_time.and_then(epoch_ms),
            finish_time: self.finish_time.and_then(epoch_ms),
            drift_ms: self.final_drift_ms,
        }
    }

    /// Rebuilds a team from an authoritative snapshot, wholesale.
    #[must_use]
    pub fn from_snapshot(snap: &TeamSnapshot) -> Self {
        Self {
            name: snap.name.clone(),
            base_time: snap.base_time,
            time_left: snap.time_left,
            state: snap.state,
            speed: snap.speed,
            time_running: snap.time_running,
            time_paused: snap.time_paused,
            time_added: snap.time_added,
            time_subtracted: snap.time_subtracted,
            start_time: snap.start_time.and_then(from_epoch_ms),
            finish_time: snap.finish_time.and_then(from_epoch_ms),
            final_drift_ms: snap.drift_ms,
        }
    }

    /// Rebuilds a team from a configuration entry, armed and at rest.
    #[must_use]
    pub fn from_config(snap: &TeamSnapshot) -> Self {
        Self::new(snap.name.clone(), snap.base_time)
    }
}

fn epoch_ms(t: SystemTime) -> Option<i64> {
    t.duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| i64::try_from(d.as_millis()).ok())
}

fn from_epoch_ms(ms: i64) -> Option<SystemTime> {
    u64::try_from(ms)
        .ok()
        .map(|ms| UNIX_EPOCH + Duration::from_millis(ms))
}

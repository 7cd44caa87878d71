//! # Action Dispatcher
//!
//! The single entry point for applying a named action to a batch of teams.
//!
//! Both local control surfaces and the session layer funnel through
//! [`ActionDispatcher::dispatch`]: locally for optimistic application, and
//! again when an authoritative broadcast arrives (the transitions are no-ops
//! by then, so re-application is harmless).
//!
//! Validation failures stay quiet per item: a malformed tag drops the whole
//! action, an out-of-range index skips that index only. One structured
//! notification is emitted per batch, never per team; rendering toast text
//! from it is the presentation layer's job.

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use chronolink_shared::Speed;
use crossbeam_channel::Sender;

use crate::error::ActionParseError;
use crate::events::CoreEvent;
use crate::roster::TeamRoster;

/// A control action, parsed from its wire tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Begin or resume the countdown.
    Start,
    /// Halt a running countdown.
    Pause,
    /// Resume a paused countdown.
    Unpause,
    /// End the countdown immediately.
    Finish,
    /// Reset to base time and clear all accumulators.
    Rearm,
    /// Adjust remaining time by a signed number of seconds.
    Add(i64),
    /// Change the speed multiplier.
    SetSpeed(Speed),
}

impl Action {
    /// The tag half of the wire form, without payload.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
            Self::Finish => "finish",
            Self::Rearm => "rearm",
            Self::Add(_) => "add",
            Self::SetSpeed(_) => "speed",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add(seconds) => write!(f, "add:{seconds}"),
            Self::SetSpeed(speed) => write!(f, "speed:{speed}"),
            other => f.write_str(other.tag()),
        }
    }
}

impl FromStr for Action {
    type Err = ActionParseError;

    /// Parses `start|pause|unpause|finish|rearm|add:<signed-int>|speed:<s>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, payload) = match s.split_once(':') {
            Some((tag, payload)) => (tag, Some(payload)),
            None => (s, None),
        };

        match tag {
            "start" => Ok(Self::Start),
            "pause" => Ok(Self::Pause),
            "unpause" => Ok(Self::Unpause),
            "finish" => Ok(Self::Finish),
            "rearm" => Ok(Self::Rearm),
            "add" => {
                let payload = payload.ok_or(ActionParseError::MissingPayload("add"))?;
                let seconds =
                    payload
                        .parse::<i64>()
                        .map_err(|_| ActionParseError::MalformedPayload {
                            action: "add",
                            payload: payload.to_string(),
                        })?;
                Ok(Self::Add(seconds))
            }
            "speed" => {
                let payload = payload.ok_or(ActionParseError::MissingPayload("speed"))?;
                let value =
                    payload
                        .parse::<f64>()
                        .map_err(|_| ActionParseError::MalformedPayload {
                            action: "speed",
                            payload: payload.to_string(),
                        })?;
                Speed::from_multiplier(value)
                    .map(Self::SetSpeed)
                    .ok_or(ActionParseError::InvalidSpeed(value))
            }
            other => Err(ActionParseError::UnknownAction(other.to_string())),
        }
    }
}

/// Applies action batches to a roster and reports them on the event channel.
#[derive(Clone, Debug)]
pub struct ActionDispatcher {
    notifications: Sender<CoreEvent>,
}

impl ActionDispatcher {
    /// Creates a dispatcher reporting on the given channel.
    #[must_use]
    pub fn new(notifications: Sender<CoreEvent>) -> Self {
        Self { notifications }
    }

    /// Applies `action` to every team named by `indices`.
    ///
    /// Out-of-range indices are skipped. Returns the number of teams whose
    /// state actually changed. Emits one [`CoreEvent::ActionApplied`] for the
    /// batch plus a [`CoreEvent::TeamFinished`] per team that finished.
    pub fn dispatch(
        &self,
        roster: &mut TeamRoster,
        action: &Action,
        indices: &[usize],
        now: SystemTime,
    ) -> usize {
        let mut affected = Vec::with_capacity(indices.len());
        let mut changed = 0;

        for &index in indices {
            let Some(team) = roster.get_mut(index) else {
                tracing::debug!("dispatch {action}: index {index} out of range, skipped");
                continue;
            };
            affected.push(index);
            let transition = team.apply(action, now);
            if transition.changed {
                changed += 1;
            }
            if transition.finished {
                let name = team.name.clone();
                tracing::info!("team {name} finished");
                let _ = self
                    .notifications
                    .try_send(CoreEvent::TeamFinished { index, name });
            }
        }

        if !affected.is_empty() {
            let _ = self.notifications.try_send(CoreEvent::ActionApplied {
                action: *action,
                indices: affected,
            });
        }
        changed
    }

    /// Parses a wire tag and dispatches it.
    ///
    /// A malformed tag drops the action with no state change.
    pub fn dispatch_tag(
        &self,
        roster: &mut TeamRoster,
        tag: &str,
        indices: &[usize],
        now: SystemTime,
    ) -> Result<usize, ActionParseError> {
        let action = tag.parse::<Action>()?;
        Ok(self.dispatch(roster, &action, indices, now))
    }
}

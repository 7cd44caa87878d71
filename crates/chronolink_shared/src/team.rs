//! Team snapshot types shared between client and authority.
//!
//! A [`TeamSnapshot`] is the wire form of one countdown entity. Snapshots are
//! always exchanged as whole arrays and applied wholesale on the receiving
//! side, never merged field-by-field.

use std::fmt;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Lifecycle state of one countdown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamState {
    /// Armed at base time, not yet started.
    #[default]
    Ready,
    /// Counting down.
    Running,
    /// Halted with time remaining.
    Paused,
    /// Countdown complete (reached zero or finished explicitly).
    Finished,
}

impl fmt::Display for TeamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// Countdown speed multiplier.
///
/// Serialized on the wire as the bare number (`0.5`, `1`, `2`, `4`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Speed {
    /// Half real-time.
    Half,
    /// Real-time.
    #[default]
    One,
    /// Double real-time.
    Two,
    /// Quadruple real-time.
    Four,
}

impl Speed {
    /// All valid speeds, slowest first.
    pub const ALL: [Self; 4] = [Self::Half, Self::One, Self::Two, Self::Four];

    /// Multiplier applied to real elapsed time.
    #[inline]
    #[must_use]
    pub const fn multiplier(self) -> f64 {
        match self {
            Self::Half => 0.5,
            Self::One => 1.0,
            Self::Two => 2.0,
            Self::Four => 4.0,
        }
    }

    /// Scheduler phase divisor: a team advances on commit cycles where
    /// `phase % divisor == 0`, so faster speeds advance more often.
    #[inline]
    #[must_use]
    pub const fn divisor(self) -> u8 {
        match self {
            Self::Half => 8,
            Self::One => 4,
            Self::Two => 2,
            Self::Four => 1,
        }
    }

    /// Looks up the speed for a multiplier value.
    ///
    /// Returns `None` for anything outside `{0.5, 1, 2, 4}`.
    #[must_use]
    pub fn from_multiplier(value: f64) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| (s.multiplier() - value).abs() < f64::EPSILON)
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Half => "0.5",
            Self::One => "1",
            Self::Two => "2",
            Self::Four => "4",
        };
        f.write_str(s)
    }
}

impl Serialize for Speed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.multiplier())
    }
}

impl<'de> Deserialize<'de> for Speed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Self::from_multiplier(value)
            .ok_or_else(|| DeError::custom(format!("invalid speed multiplier: {value}")))
    }
}

/// Wire form of one team's full state.
///
/// `config` payloads only carry meaningful `name`/`base_time`; the receiving
/// side re-arms everything else. `tick`/`fulltick` payloads carry live state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSnapshot {
    /// Display name of the team.
    pub name: String,
    /// Configured countdown length in seconds.
    pub base_time: u32,
    /// Seconds remaining.
    pub time_left: u32,
    /// Lifecycle state.
    #[serde(default)]
    pub state: TeamState,
    /// Speed multiplier.
    #[serde(default)]
    pub speed: Speed,
    /// Real seconds spent running (accumulates `1/speed` per countdown second).
    #[serde(default)]
    pub time_running: f64,
    /// Real seconds spent paused.
    #[serde(default)]
    pub time_paused: f64,
    /// Total seconds added by adjustments.
    #[serde(default)]
    pub time_added: u32,
    /// Total seconds removed by adjustments.
    #[serde(default)]
    pub time_subtracted: u32,
    /// Start instant, milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    /// Finish instant, milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<i64>,
    /// Authoritative-vs-predicted finish deviation in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_ms: Option<i64>,
}

impl TeamSnapshot {
    /// Creates a bare configuration snapshot (name and base time only).
    #[must_use]
    pub fn config(name: impl Into<String>, base_time: u32) -> Self {
        Self {
            name: name.into(),
            base_time,
            time_left: base_time,
            ..Self::default()
        }
    }
}

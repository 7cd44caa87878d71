//! # Chronolink Core
//!
//! The countdown state machine that both local mode and session mode run on.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    CHRONOLINK CORE                      │
//! ├─────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌──────────────┐   ┌──────────────┐  │
//! │  │ Team Model │◄──│ Tick         │   │ Action       │  │
//! │  │ (pure)     │   │ Scheduler    │   │ Dispatcher   │  │
//! │  └────────────┘   └──────────────┘   └──────────────┘  │
//! │        ▲                 │                  │           │
//! │        │          ┌──────▼──────────────────▼───────┐   │
//! │        └──────────│        Team Roster             │   │
//! │                   │  (wholesale snapshot replace)  │   │
//! │                   └──────────────┬─────────────────┘   │
//! │                                  │                      │
//! │                      CoreEvent channel (subscribe)      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! In local mode the scheduler here owns the countdown. In session mode the
//! remote authority runs the identical logic and the local roster is a read
//! replica updated only by inbound snapshots.
//!
//! All mutation is single-threaded and cooperative: the scheduler poll, any
//! action dispatch, and any snapshot replacement run to completion before the
//! next event is handled, so the roster never needs locking inside this crate.

#![deny(unsafe_code)]

pub mod dispatch;
pub mod error;
pub mod events;
pub mod export;
pub mod local;
pub mod roster;
pub mod scheduler;
pub mod team;

// Re-exports for convenience
pub use dispatch::{Action, ActionDispatcher};
pub use error::{ActionParseError, CsvVerifyError};
pub use events::{CoreEvent, EventChannel};
pub use export::{export_csv, verify_csv};
pub use local::LocalRuntime;
pub use roster::TeamRoster;
pub use scheduler::{SchedulerConfig, TickScheduler};
pub use team::{Team, Transition};

pub use chronolink_shared::{Speed, TeamSnapshot, TeamState};

use std::time::Duration;

/// Wake-up period of the scheduling loop.
///
/// The loop wakes often and commits rarely; most wake-ups only check how much
/// wall time has elapsed.
pub const TICK_WAKE_INTERVAL: Duration = Duration::from_millis(5);

/// Minimum wall time between committed tick cycles.
///
/// Intentionally just under 250 ms so the loop commits in bursts and
/// tolerates timer jitter instead of drifting behind it.
pub const COMMIT_THRESHOLD: Duration = Duration::from_millis(248);

/// Length of the commit phase cycle.
///
/// The slowest speed advances once per full cycle; the phase/divisor pairing
/// keeps every speed at exact integer-second granularity over any
/// multiple-of-8 number of commits.
pub const PHASE_MODULUS: u8 = 8;

/// Modulus of the CSV export checksum.
pub const CSV_CHECKSUM_MODULUS: u32 = 1997;

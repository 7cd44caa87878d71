//! # Tick Scheduler
//!
//! Turns a fast wake-up loop into slow, exact countdown commits.
//!
//! ## Cadence
//!
//! The loop wakes every [`TICK_WAKE_INTERVAL`](crate::TICK_WAKE_INTERVAL) but
//! only commits once at least [`COMMIT_THRESHOLD`](crate::COMMIT_THRESHOLD)
//! of wall time has passed. Each commit advances a phase counter modulo
//! [`PHASE_MODULUS`](crate::PHASE_MODULUS); a team advances on a commit only
//! when the phase divides evenly by its speed's divisor:
//!
//! ```text
//! speed 0.5  divisor 8   advances 1 commit in 8
//! speed 1    divisor 4   advances 1 commit in 4
//! speed 2    divisor 2   advances 1 commit in 2
//! speed 4    divisor 1   advances every commit
//! ```
//!
//! Over any multiple-of-8 run of commits every speed lands exactly on its
//! nominal rate, with no fractional-second carry to accumulate error.

use std::time::{Instant, SystemTime};

use crossbeam_channel::Sender;

use crate::events::CoreEvent;
use crate::roster::TeamRoster;
use crate::{COMMIT_THRESHOLD, PHASE_MODULUS, TICK_WAKE_INTERVAL};

/// Timing knobs for the scheduling loop.
#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    /// How often the loop wakes to check elapsed time.
    pub wake_interval: std::time::Duration,
    /// Minimum wall time between commits.
    pub commit_threshold: std::time::Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wake_interval: TICK_WAKE_INTERVAL,
            commit_threshold: COMMIT_THRESHOLD,
        }
    }
}

/// The commit clock driving every local countdown.
#[derive(Debug)]
pub struct TickScheduler {
    config: SchedulerConfig,
    phase: u8,
    last_commit: Instant,
}

impl TickScheduler {
    /// Creates a scheduler whose threshold window starts now.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self::starting_at(config, Instant::now())
    }

    /// Creates a scheduler whose threshold window starts at `start`.
    #[must_use]
    pub fn starting_at(config: SchedulerConfig, start: Instant) -> Self {
        Self {
            config,
            phase: 0,
            last_commit: start,
        }
    }

    /// The configured timing knobs.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Current position in the commit phase cycle.
    #[must_use]
    pub const fn phase(&self) -> u8 {
        self.phase
    }

    /// One wake-up of the loop.
    ///
    /// Commits if the threshold has elapsed since the last commit, otherwise
    /// does nothing. Returns whether a commit happened.
    pub fn poll(
        &mut self,
        roster: &mut TeamRoster,
        notifications: &Sender<CoreEvent>,
        now: Instant,
        wall: SystemTime,
    ) -> bool {
        if now.duration_since(self.last_commit) < self.config.commit_threshold {
            return false;
        }
        self.last_commit = now;
        self.commit(roster, notifications, wall);
        true
    }

    /// One committed tick cycle, unconditionally.
    ///
    /// Advances the phase, then every team whose divisor the phase satisfies.
    /// Emits a [`CoreEvent::TeamFinished`] per completion and one
    /// [`CoreEvent::TickCommitted`] if any team changed. Returns whether any
    /// team changed.
    pub fn commit(
        &mut self,
        roster: &mut TeamRoster,
        notifications: &Sender<CoreEvent>,
        wall: SystemTime,
    ) -> bool {
        self.phase = (self.phase + 1) % PHASE_MODULUS;

        let mut updated = false;
        for (index, team) in roster.teams_mut().iter_mut().enumerate() {
            if self.phase % team.speed.divisor() != 0 {
                continue;
            }
            let transition = team.advance(wall);
            if transition.changed {
                updated = true;
            }
            if transition.finished {
                let name = team.name.clone();
                tracing::info!("team {name} ran out");
                let _ = notifications.try_send(CoreEvent::TeamFinished { index, name });
            }
        }

        if updated {
            let _ = notifications.try_send(CoreEvent::TickCommitted);
        }
        updated
    }
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Action;
    use crate::events::EventChannel;
    use crate::team::Team;
    use chronolink_shared::{Speed, TeamState};
    use std::time::Duration;

    fn running_roster(base_time: u32, speed: Speed) -> TeamRoster {
        let mut roster = TeamRoster::from_teams(vec![Team::new("A", base_time)]);
        let now = SystemTime::now();
        roster.get_mut(0).unwrap().apply(&Action::Start, now);
        roster.get_mut(0).unwrap().apply(&Action::SetSpeed(speed), now);
        roster
    }

    fn commits(scheduler: &mut TickScheduler, roster: &mut TeamRoster, n: usize) {
        let events = EventChannel::unbounded();
        let sender = events.sender();
        for _ in 0..n {
            scheduler.commit(roster, &sender, SystemTime::now());
        }
    }

    #[test]
    fn test_poll_respects_commit_threshold() {
        let start = Instant::now();
        let mut scheduler = TickScheduler::starting_at(SchedulerConfig::default(), start);
        let mut roster = running_roster(600, Speed::One);
        let events = EventChannel::unbounded();
        let sender = events.sender();

        assert!(!scheduler.poll(&mut roster, &sender, start + Duration::from_millis(200), SystemTime::now()));
        assert!(scheduler.poll(&mut roster, &sender, start + Duration::from_millis(250), SystemTime::now()));
        // The window restarts at the commit.
        assert!(!scheduler.poll(&mut roster, &sender, start + Duration::from_millis(400), SystemTime::now()));
    }

    #[test]
    fn test_speed_one_decrements_once_per_four_commits() {
        let mut scheduler = TickScheduler::default();
        let mut roster = running_roster(600, Speed::One);

        // Every window of 4 consecutive commits hits the divisor exactly once.
        for _ in 0..6 {
            let before = roster.teams()[0].time_left;
            commits(&mut scheduler, &mut roster, 4);
            assert_eq!(roster.teams()[0].time_left, before - 1);
        }
    }

    #[test]
    fn test_speed_half_decrements_once_per_eight_commits_never_twice() {
        let mut scheduler = TickScheduler::default();
        let mut roster = running_roster(600, Speed::Half);

        for _ in 0..4 {
            let before = roster.teams()[0].time_left;
            commits(&mut scheduler, &mut roster, 8);
            assert_eq!(roster.teams()[0].time_left, before - 1);
        }
    }

    #[test]
    fn test_speed_four_decrements_every_commit() {
        let mut scheduler = TickScheduler::default();
        let mut roster = running_roster(600, Speed::Four);

        commits(&mut scheduler, &mut roster, 8);
        assert_eq!(roster.teams()[0].time_left, 600 - 8);
    }

    #[test]
    fn test_rates_exact_over_multiple_of_eight_commits() {
        let mut scheduler = TickScheduler::default();
        let now = SystemTime::now();
        let mut roster = TeamRoster::from_teams(vec![
            Team::new("half", 600),
            Team::new("one", 600),
            Team::new("two", 600),
            Team::new("four", 600),
        ]);
        let speeds = [Speed::Half, Speed::One, Speed::Two, Speed::Four];
        for (i, speed) in speeds.iter().enumerate() {
            roster.get_mut(i).unwrap().apply(&Action::Start, now);
            roster.get_mut(i).unwrap().apply(&Action::SetSpeed(*speed), now);
        }

        commits(&mut scheduler, &mut roster, 24);
        assert_eq!(roster.teams()[0].time_left, 600 - 3);
        assert_eq!(roster.teams()[1].time_left, 600 - 6);
        assert_eq!(roster.teams()[2].time_left, 600 - 12);
        assert_eq!(roster.teams()[3].time_left, 600 - 24);
    }

    #[test]
    fn test_paused_team_accrues_at_its_divisor() {
        let mut scheduler = TickScheduler::default();
        let now = SystemTime::now();
        let mut roster = TeamRoster::from_teams(vec![Team::new("A", 600)]);
        roster.get_mut(0).unwrap().apply(&Action::Start, now);
        roster.get_mut(0).unwrap().apply(&Action::Pause, now);

        commits(&mut scheduler, &mut roster, 8);
        let team = &roster.teams()[0];
        assert_eq!(team.time_left, 600);
        assert_eq!(team.time_paused, 2.0);
    }

    #[test]
    fn test_commit_reports_finish() {
        let mut scheduler = TickScheduler::default();
        let mut roster = running_roster(1, Speed::Four);
        let events = EventChannel::unbounded();
        let sender = events.sender();

        scheduler.commit(&mut roster, &sender, SystemTime::now());
        assert_eq!(roster.teams()[0].state, TeamState::Finished);

        let mut finishes = 0;
        while let Some(event) = events.try_recv() {
            if matches!(event, CoreEvent::TeamFinished { index: 0, .. }) {
                finishes += 1;
            }
        }
        assert_eq!(finishes, 1);
    }

    #[test]
    fn test_idle_roster_commits_quietly() {
        let mut scheduler = TickScheduler::default();
        let mut roster = TeamRoster::from_teams(vec![Team::new("A", 600)]);
        let events = EventChannel::unbounded();
        let sender = events.sender();

        for _ in 0..8 {
            assert!(!scheduler.commit(&mut roster, &sender, SystemTime::now()));
        }
        assert!(events.try_recv().is_none());
    }
}

//! # Team Roster
//!
//! The ordered list of teams and its two replacement operations.
//!
//! Authoritative snapshots always replace the roster wholesale, last writer
//! wins on the full list, never a field-by-field merge. That keeps every
//! replica convergent after reconnects and makes optimistic local updates
//! safe to overwrite.

use chronolink_shared::TeamSnapshot;

use crate::team::Team;

/// The ordered collection of countdown teams.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TeamRoster {
    teams: Vec<Team>,
}

impl TeamRoster {
    /// Creates an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a roster from existing teams.
    #[must_use]
    pub fn from_teams(teams: Vec<Team>) -> Self {
        Self { teams }
    }

    /// Number of teams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.teams.len()
    }

    /// Whether the roster has no teams.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    /// Read access to the teams, in roster order.
    #[must_use]
    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    /// The team at `index`, if in range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Team> {
        self.teams.get(index)
    }

    /// Mutable access to the team at `index`, if in range.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Team> {
        self.teams.get_mut(index)
    }

    /// Mutable access to all teams, for the scheduler's commit pass.
    pub(crate) fn teams_mut(&mut self) -> &mut [Team] {
        &mut self.teams
    }

    /// Every roster index, for "apply to all" batches.
    #[must_use]
    pub fn all_indices(&self) -> Vec<usize> {
        (0..self.teams.len()).collect()
    }

    /// Rebuilds the roster from a configuration, every team armed at rest.
    pub fn configure(&mut self, config: &[TeamSnapshot]) {
        self.teams = config.iter().map(Team::from_config).collect();
    }

    /// Replaces the roster wholesale from authoritative snapshots.
    pub fn replace_all(&mut self, snapshots: &[TeamSnapshot]) {
        self.teams = snapshots.iter().map(Team::from_snapshot).collect();
    }

    /// The wire snapshot of every team, in roster order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<TeamSnapshot> {
        self.teams.iter().map(Team::snapshot).collect()
    }

    /// Configuration snapshots (name and base time, armed) of every team.
    #[must_use]
    pub fn config_snapshots(&self) -> Vec<TeamSnapshot> {
        self.teams
            .iter()
            .map(|t| TeamSnapshot::config(t.name.clone(), t.base_time))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronolink_shared::{Speed, TeamState};

    #[test]
    fn test_configure_arms_all_teams() {
        let mut roster = TeamRoster::new();
        roster.configure(&[
            TeamSnapshot {
                name: "A".to_string(),
                base_time: 60,
                time_left: 12,
                state: TeamState::Running,
                speed: Speed::Four,
                ..TeamSnapshot::default()
            },
            TeamSnapshot::config("B", 90),
        ]);

        assert_eq!(roster.len(), 2);
        for team in roster.teams() {
            assert_eq!(team.state, TeamState::Ready);
            assert_eq!(team.speed, Speed::One);
            assert_eq!(team.time_left, team.base_time);
        }
    }

    #[test]
    fn test_replace_all_is_wholesale() {
        let mut roster = TeamRoster::from_teams(vec![Team::new("A", 60), Team::new("B", 60)]);

        // The replacement list is shorter and disagrees everywhere; the
        // local roster must not keep anything.
        roster.replace_all(&[TeamSnapshot {
            name: "C".to_string(),
            base_time: 10,
            time_left: 4,
            state: TeamState::Paused,
            ..TeamSnapshot::default()
        }]);

        assert_eq!(roster.len(), 1);
        assert_eq!(roster.teams()[0].name, "C");
        assert_eq!(roster.teams()[0].state, TeamState::Paused);
    }

    #[test]
    fn test_snapshot_round_trip_preserves_order() {
        let roster = TeamRoster::from_teams(vec![
            Team::new("first", 10),
            Team::new("second", 20),
            Team::new("third", 30),
        ]);
        let snaps = roster.snapshots();
        let mut rebuilt = TeamRoster::new();
        rebuilt.replace_all(&snaps);
        assert_eq!(rebuilt, roster);
    }
}

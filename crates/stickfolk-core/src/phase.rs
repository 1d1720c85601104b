//! The Forming → Holding → Disbanding crowd cycle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::PhaseDurations;
use crate::geometry::Position;

/// Identifier of a crowd, allocated from a counter that restarts at 1 each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Phase {
    /// Agents have been clustered and walk toward their rally points.
    #[default]
    Forming,
    /// One crowd state machine runs per group.
    Holding,
    /// Groups have been dissolved; everyone wanders individually.
    Disbanding,
}

impl Phase {
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Forming => Self::Holding,
            Self::Holding => Self::Disbanding,
            Self::Disbanding => Self::Forming,
        }
    }

    #[must_use]
    pub fn duration(self, durations: &PhaseDurations) -> u32 {
        match self {
            Self::Forming => durations.forming,
            Self::Holding => durations.holding,
            Self::Disbanding => durations.disbanding,
        }
    }
}

/// Phase clock plus the group-id counter and rally points of the current cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseController {
    phase: Phase,
    timer: u32,
    next_group_id: u32,
    rally_points: BTreeMap<GroupId, Position>,
}

impl Default for PhaseController {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: Phase::Forming,
            timer: 0,
            next_group_id: 1,
            rally_points: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn timer(&self) -> u32 {
        self.timer
    }

    #[must_use]
    pub fn next_group_id(&self) -> u32 {
        self.next_group_id
    }

    #[must_use]
    pub fn rally_points(&self) -> &BTreeMap<GroupId, Position> {
        &self.rally_points
    }

    #[must_use]
    pub fn rally_point(&self, group: GroupId) -> Option<Position> {
        self.rally_points.get(&group).copied()
    }

    /// Clustering runs on the first tick of every Forming phase.
    #[must_use]
    pub fn should_cluster(&self) -> bool {
        self.phase == Phase::Forming && self.timer == 0
    }

    /// Hand out the next group id and remember its rally point.
    pub fn allocate_group(&mut self, rally_point: Position) -> GroupId {
        let id = GroupId(self.next_group_id);
        self.next_group_id += 1;
        self.rally_points.insert(id, rally_point);
        id
    }

    /// Count one tick; once the timer passes the phase budget, enter the next phase.
    ///
    /// Entering Disbanding forgets every group and restarts the id counter.
    pub fn advance(&mut self, durations: &PhaseDurations) -> Option<Phase> {
        self.timer += 1;
        if self.timer <= self.phase.duration(durations) {
            return None;
        }
        self.phase = self.phase.next();
        self.timer = 0;
        if self.phase == Phase::Disbanding {
            self.next_group_id = 1;
            self.rally_points.clear();
        }
        Some(self.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn durations() -> PhaseDurations {
        PhaseDurations {
            forming: 5,
            holding: 3,
            disbanding: 2,
        }
    }

    #[test]
    fn forming_lasts_exactly_its_budget() {
        let durations = durations();
        let mut controller = PhaseController::new();
        assert!(controller.should_cluster());
        for _ in 0..durations.forming {
            assert_eq!(controller.advance(&durations), None);
            assert_eq!(controller.phase(), Phase::Forming);
        }
        assert_eq!(controller.advance(&durations), Some(Phase::Holding));
    }

    #[test]
    fn full_cycle_resets_the_counter() {
        let durations = durations();
        let mut controller = PhaseController::new();
        let first = controller.allocate_group(Position::new(1.0, 1.0));
        let second = controller.allocate_group(Position::new(2.0, 2.0));
        assert_eq!((first, second), (GroupId(1), GroupId(2)));
        assert_eq!(controller.next_group_id(), 3);

        let mut seen = Vec::new();
        for _ in 0..20 {
            if let Some(phase) = controller.advance(&durations) {
                seen.push(phase);
                match phase {
                    Phase::Disbanding => {
                        assert_eq!(controller.next_group_id(), 1);
                        assert!(controller.rally_points().is_empty());
                    }
                    Phase::Forming => assert!(controller.should_cluster()),
                    Phase::Holding => assert!(!controller.should_cluster()),
                }
            }
        }
        assert_eq!(
            &seen[..3],
            &[Phase::Holding, Phase::Disbanding, Phase::Forming]
        );
    }
}

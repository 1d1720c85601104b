//! Personality-specific Markov transition tables for individual agents.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::BehaviorDurations;

/// Fixed per-agent trait selecting which transition table drives the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Personality {
    Hostile,
    Curious,
    Loner,
}

impl Personality {
    pub const ALL: [Self; 3] = [Self::Hostile, Self::Curious, Self::Loner];

    /// Uniformly random personality.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.random_range(0..Self::ALL.len())]
    }
}

/// Behavior states of the individual-agent state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BehaviorState {
    Idle,
    #[default]
    Wander,
    Chase,
    Investigate,
    SeekQuiet,
    Rest,
    RunAway,
}

impl BehaviorState {
    /// Ticks spent in this state before the transition table is consulted.
    #[must_use]
    pub fn duration(self, durations: &BehaviorDurations) -> u32 {
        match self {
            Self::Idle => durations.idle,
            Self::Wander => durations.wander,
            Self::Chase => durations.chase,
            Self::Investigate => durations.investigate,
            Self::SeekQuiet => durations.seek_quiet,
            Self::Rest => durations.rest,
            Self::RunAway => durations.run_away,
        }
    }
}

type Row = &'static [(BehaviorState, f32)];

use BehaviorState::{Chase, Idle, Investigate, Rest, RunAway, SeekQuiet, Wander};

const HOSTILE: &[(BehaviorState, Row)] = &[
    (Idle, &[(Wander, 0.4), (Chase, 0.5), (Rest, 0.1)]),
    (Wander, &[(Chase, 0.5), (Wander, 0.3), (Idle, 0.1), (Rest, 0.1)]),
    (Chase, &[(Wander, 0.5), (Chase, 0.3), (Idle, 0.2)]),
    (Investigate, &[(Chase, 0.6), (Wander, 0.4)]),
    (SeekQuiet, &[(Wander, 0.6), (Chase, 0.4)]),
    (Rest, &[(Wander, 0.6), (Chase, 0.4)]),
    (RunAway, &[(Wander, 0.7), (Chase, 0.3)]),
];

const CURIOUS: &[(BehaviorState, Row)] = &[
    (Idle, &[(Investigate, 0.5), (Wander, 0.4), (Rest, 0.1)]),
    (Wander, &[(Investigate, 0.5), (Wander, 0.3), (Idle, 0.1), (Rest, 0.1)]),
    (Investigate, &[(Wander, 0.5), (Investigate, 0.3), (Idle, 0.2)]),
    (Chase, &[(Investigate, 0.5), (Wander, 0.5)]),
    (SeekQuiet, &[(Wander, 0.7), (Investigate, 0.3)]),
    (Rest, &[(Wander, 0.7), (Investigate, 0.3)]),
    (RunAway, &[(Wander, 1.0)]),
];

// Loners never pick Chase or Investigate; those rows are intentionally absent.
const LONER: &[(BehaviorState, Row)] = &[
    (Idle, &[(SeekQuiet, 0.4), (Rest, 0.3), (Wander, 0.3)]),
    (Wander, &[(SeekQuiet, 0.5), (Wander, 0.3), (Rest, 0.2)]),
    (SeekQuiet, &[(Rest, 0.5), (Idle, 0.3), (Wander, 0.2)]),
    (Rest, &[(Idle, 0.4), (Wander, 0.3), (SeekQuiet, 0.3)]),
    (RunAway, &[(SeekQuiet, 0.7), (Wander, 0.3)]),
];

fn table(personality: Personality) -> &'static [(BehaviorState, Row)] {
    match personality {
        Personality::Hostile => HOSTILE,
        Personality::Curious => CURIOUS,
        Personality::Loner => LONER,
    }
}

/// Transition row for `state`, if the personality defines one.
#[must_use]
pub fn transition_row(personality: Personality, state: BehaviorState) -> Option<Row> {
    table(personality)
        .iter()
        .find(|(from, _)| *from == state)
        .map(|(_, row)| *row)
}

/// Pick an entry by cumulative weight; leftover mass falls to the last entry.
pub fn sample_row<R: Rng + ?Sized>(row: Row, rng: &mut R) -> Option<BehaviorState> {
    let (last, _) = row.last()?;
    let draw: f32 = rng.random();
    let mut cumulative = 0.0;
    for &(state, weight) in row {
        cumulative += weight;
        if draw < cumulative {
            return Some(state);
        }
    }
    Some(*last)
}

/// Draw the next state, or `None` when the table has no usable row.
pub fn sample_next<R: Rng + ?Sized>(
    personality: Personality,
    state: BehaviorState,
    rng: &mut R,
) -> Option<BehaviorState> {
    transition_row(personality, state).and_then(|row| sample_row(row, rng))
}

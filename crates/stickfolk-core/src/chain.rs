//! Follower chains: joint sequences that trail a moving target under distance and
//! bend constraints. Predator spines are built from these.

use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};

use crate::geometry::{NEAR_ZERO, Position, wrap_unsigned_angle};

/// Normalize an angle into `[0, 2π)`.
#[must_use]
pub fn simplify_angle(angle: f32) -> f32 {
    wrap_unsigned_angle(angle)
}

/// Signed difference `anchor - angle`, wrapped into `(-π, π]`.
#[must_use]
pub fn relative_angle_diff(angle: f32, anchor: f32) -> f32 {
    PI - simplify_angle(angle + PI - anchor)
}

/// Clamp `angle` to within `constraint` of `anchor`, snapping to whichever bound it overshot.
#[must_use]
pub fn constrain_angle(angle: f32, anchor: f32, constraint: f32) -> f32 {
    let diff = relative_angle_diff(angle, anchor);
    if diff.abs() <= constraint {
        simplify_angle(angle)
    } else if diff > constraint {
        simplify_angle(anchor - constraint)
    } else {
        simplify_angle(anchor + constraint)
    }
}

/// Move `pos` onto the circle of radius `distance` around `anchor`.
#[must_use]
pub fn constrain_distance(pos: Position, anchor: Position, distance: f32) -> Position {
    let dir = (pos - anchor).normalize_or_zero();
    anchor + dir * distance
}

/// Ordered joints resolved each tick to follow a target point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowerChain {
    joints: Vec<Position>,
    angles: Vec<f32>,
    link_size: f32,
    angle_constraint: f32,
}

impl FollowerChain {
    /// Lay `joint_count` joints down a vertical line starting at `origin`.
    ///
    /// An `angle_constraint` of `2π` or more leaves the joints unconstrained.
    #[must_use]
    pub fn new(origin: Position, joint_count: usize, link_size: f32, angle_constraint: f32) -> Self {
        let joint_count = joint_count.max(1);
        let joints = (0..joint_count)
            .map(|i| Position::new(origin.x, origin.y + link_size * i as f32))
            .collect();
        Self {
            joints,
            angles: vec![0.0; joint_count],
            link_size,
            angle_constraint: angle_constraint.min(TAU),
        }
    }

    #[must_use]
    pub fn joints(&self) -> &[Position] {
        &self.joints
    }

    #[must_use]
    pub fn angles(&self) -> &[f32] {
        &self.angles
    }

    #[must_use]
    pub fn head(&self) -> Position {
        self.joints[0]
    }

    #[must_use]
    pub fn link_size(&self) -> f32 {
        self.link_size
    }

    #[must_use]
    pub fn angle_constraint(&self) -> f32 {
        self.angle_constraint
    }

    /// Snap the head to `target` and drag the rest of the chain behind it.
    pub fn resolve(&mut self, target: Position) {
        let head = self.joints[0];
        if head.distance_sq(target) > NEAR_ZERO * NEAR_ZERO {
            self.angles[0] = head.angle_to(target);
        }
        self.joints[0] = target;

        for i in 1..self.joints.len() {
            let prev = self.joints[i - 1];
            let raw = self.joints[i].angle_to(prev);
            let theta = constrain_angle(raw, self.angles[i - 1], self.angle_constraint);
            self.angles[i] = theta;
            self.joints[i] = prev - Position::from_angle(theta) * self.link_size;
        }
    }

    /// Distance-only two-pass resolve: pull the head to `target`, then pin the tail to `anchor`.
    pub fn fabrik_resolve(&mut self, target: Position, anchor: Position) {
        let last = self.joints.len() - 1;

        self.joints[0] = target;
        for i in 1..=last {
            self.joints[i] = constrain_distance(self.joints[i], self.joints[i - 1], self.link_size);
        }

        self.joints[last] = anchor;
        for i in (0..last).rev() {
            self.joints[i] = constrain_distance(self.joints[i], self.joints[i + 1], self.link_size);
        }

        for i in 0..last {
            self.angles[i] = self.joints[i + 1].angle_to(self.joints[i]);
        }
        if last > 0 {
            self.angles[last] = self.angles[last - 1];
        }
    }
}

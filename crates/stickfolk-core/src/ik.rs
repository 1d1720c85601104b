//! Analytic two-bone inverse kinematics.

use std::f32::consts::PI;

use crate::geometry::{NEAR_ZERO, Position};

/// Joint angles produced by [`solve_two_bone`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoBoneSolution {
    /// World angle of the first bone.
    pub hip_angle: f32,
    /// Interior angle at the middle joint, always in `[0, π]`.
    pub knee_angle: f32,
}

impl TwoBoneSolution {
    /// World angles `(upper, lower)` for a parent/child bone pair.
    #[must_use]
    pub fn joint_angles(self) -> (f32, f32) {
        (self.hip_angle, self.hip_angle + (PI - self.knee_angle))
    }
}

fn guarded(denominator: f32) -> f32 {
    if denominator.abs() < NEAR_ZERO {
        1.0
    } else {
        denominator
    }
}

/// Place the end of a `l1`/`l2` chain rooted at `root` as close to `target` as it can reach.
///
/// The target distance is clamped to `[|l1 - l2|, l1 + l2]`, so a solution always exists.
#[must_use]
pub fn solve_two_bone(root: Position, l1: f32, l2: f32, target: Position) -> TwoBoneSolution {
    let dx = target.x - root.x;
    let dy = target.y - root.y;
    let dist = dx.hypot(dy);
    let r = dist.max((l1 - l2).abs()).min(l1 + l2);

    let cos_knee = (l1 * l1 + l2 * l2 - r * r) / guarded(2.0 * l1 * l2);
    let knee_angle = cos_knee.clamp(-1.0, 1.0).acos();

    let cos_alpha = (r * r + l1 * l1 - l2 * l2) / guarded(2.0 * r * l1);
    let alpha = cos_alpha.clamp(-1.0, 1.0).acos();

    TwoBoneSolution {
        hip_angle: dy.atan2(dx) - alpha,
        knee_angle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn effector(root: Position, l1: f32, l2: f32, solution: TwoBoneSolution) -> Position {
        let (upper, lower) = solution.joint_angles();
        root.offset(upper, l1).offset(lower, l2)
    }

    #[test]
    fn reachable_target_is_hit_exactly() {
        let root = Position::new(10.0, 10.0);
        let target = Position::new(25.0, 30.0);
        let solution = solve_two_bone(root, 20.0, 20.0, target);
        assert!(effector(root, 20.0, 20.0, solution).distance(target) < 1e-3);
    }

    #[test]
    fn out_of_reach_target_straightens_the_limb() {
        let root = Position::new(0.0, 0.0);
        let solution = solve_two_bone(root, 20.0, 20.0, Position::new(0.0, 100.0));
        assert!(solution.knee_angle > PI - 1e-3);
        let foot = effector(root, 20.0, 20.0, solution);
        assert!(foot.distance(Position::new(0.0, 40.0)) < 1e-3);
    }

    #[test]
    fn target_on_root_is_finite() {
        let root = Position::new(3.0, 4.0);
        let solution = solve_two_bone(root, 20.0, 20.0, root);
        assert!(solution.hip_angle.is_finite());
        assert!(solution.knee_angle.is_finite());
        assert!(effector(root, 20.0, 20.0, solution).distance(root) < 1e-3);
    }

    proptest! {
        #[test]
        fn knee_in_range_and_foot_within_reach(
            l1 in 0.5f32..50.0,
            l2 in 0.5f32..50.0,
            rx in -200.0f32..200.0,
            ry in -200.0f32..200.0,
            tx in -400.0f32..400.0,
            ty in -400.0f32..400.0,
        ) {
            let root = Position::new(rx, ry);
            let solution = solve_two_bone(root, l1, l2, Position::new(tx, ty));
            prop_assert!(solution.knee_angle >= 0.0 && solution.knee_angle <= PI);
            let reach = effector(root, l1, l2, solution).distance(root);
            let tolerance = 1e-3 * (l1 + l2);
            prop_assert!(reach >= (l1 - l2).abs() - tolerance);
            prop_assert!(reach <= l1 + l2 + tolerance);
        }
    }
}

//! IK-driven posing of the stick figure.
//!
//! Every pose writes link angles and roots into the agent's [`Skeleton`]. Locomotion poses
//! share one stepping routine parameterised by a [`GaitProfile`]; transient events each
//! get a vignette. Continuity across state changes comes from two sources: the step
//! cycle only ever advances with distance travelled, and the active gait profile plus
//! `stride_blend` ease toward their targets instead of switching outright.

use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI, TAU};

use crate::behavior::BehaviorState;
use crate::config::GaitTuning;
use crate::geometry::{Position, smoothstep};
use crate::ik::solve_two_bone;
use crate::skeleton::{LinkId, Skeleton, StickmanRig};
use crate::stickman::EventKind;

/// Stepping parameters for one style of locomotion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaitProfile {
    /// Horizontal foot travel over one step cycle.
    pub stride: f32,
    /// Peak foot lift during the swing half of the cycle.
    pub lift: f32,
    /// Forward torso lean in radians.
    pub lean: f32,
    /// Peak upper-arm swing in radians.
    pub arm_swing: f32,
}

impl GaitProfile {
    pub const WALK: Self = Self {
        stride: 12.0,
        lift: 8.0,
        lean: 0.05,
        arm_swing: 0.8,
    };
    pub const RUN: Self = Self {
        stride: 20.0,
        lift: 10.0,
        lean: 0.2,
        arm_swing: 1.0,
    };
    pub const FLEE: Self = Self {
        stride: 24.0,
        lift: 12.0,
        lean: 0.3,
        arm_swing: 1.3,
    };

    /// Component-wise interpolation toward `other`.
    #[must_use]
    pub fn lerp(self, other: Self, t: f32) -> Self {
        let mix = |a: f32, b: f32| a + (b - a) * t;
        Self {
            stride: mix(self.stride, other.stride),
            lift: mix(self.lift, other.lift),
            lean: mix(self.lean, other.lean),
            arm_swing: mix(self.arm_swing, other.arm_swing),
        }
    }
}

impl Default for GaitProfile {
    fn default() -> Self {
        Self::WALK
    }
}

/// Posing function selector; one variant per distinct vignette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoseKind {
    /// Standing or walking; `stride_blend` decides how much stepping shows.
    Walk,
    Run,
    Flee,
    Caught,
    CaughtVictim,
    Investigated,
    InvestigatedTarget,
}

impl PoseKind {
    /// Pose for an agent, with any active event taking precedence over the behavior state.
    #[must_use]
    pub fn select(state: BehaviorState, event: Option<EventKind>) -> Self {
        match event {
            Some(EventKind::Caught) => Self::Caught,
            Some(EventKind::CaughtVictim) => Self::CaughtVictim,
            Some(EventKind::Investigated) => Self::Investigated,
            Some(EventKind::InvestigatedTarget) => Self::InvestigatedTarget,
            None => match state {
                BehaviorState::Chase => Self::Run,
                BehaviorState::RunAway => Self::Flee,
                _ => Self::Walk,
            },
        }
    }

    /// Gait the locomotion poses ease toward; vignettes stand still.
    #[must_use]
    pub const fn gait(self) -> Option<GaitProfile> {
        match self {
            Self::Walk => Some(GaitProfile::WALK),
            Self::Run => Some(GaitProfile::RUN),
            Self::Flee => Some(GaitProfile::FLEE),
            _ => None,
        }
    }
}

/// Per-agent animation state carried between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseState {
    /// Accumulated step phase in radians; advances with distance moved.
    pub step_cycle: f32,
    /// How much stepping is shown, in `[0, 1]`.
    pub stride_blend: f32,
    /// Gait currently being displayed.
    pub gait: GaitProfile,
    /// `1.0` when facing right, `-1.0` when facing left.
    pub facing: f32,
    /// Local animation clock driving breathing motion.
    pub clock: u64,
}

impl Default for PoseState {
    fn default() -> Self {
        Self {
            step_cycle: 0.0,
            stride_blend: 0.0,
            gait: GaitProfile::WALK,
            facing: 1.0,
            clock: 0,
        }
    }
}

impl PoseState {
    /// Advance the step cycle and ease the blend toward the current motion.
    pub fn advance(&mut self, velocity: Position, kind: PoseKind, tuning: &GaitTuning) {
        self.clock = self.clock.wrapping_add(1);
        let speed = velocity.length();
        self.step_cycle = (self.step_cycle + speed * tuning.step_cycle_rate).rem_euclid(TAU);
        if velocity.x.abs() > tuning.moving_threshold * 0.5 {
            self.facing = velocity.x.signum();
        }

        let moving = speed > tuning.moving_threshold && kind.gait().is_some();
        let goal = if moving { 1.0 } else { 0.0 };
        self.stride_blend += (goal - self.stride_blend).clamp(-tuning.blend_rate, tuning.blend_rate);
        if let Some(target) = kind.gait() {
            self.gait = self.gait.lerp(target, tuning.blend_rate);
        }
    }
}

/// Event-specific inputs for the vignettes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VignetteInput {
    /// Fraction of the event elapsed, in `[0, 1]`.
    pub progress: f32,
    /// World angle from the agent toward its event partner.
    pub heading: f32,
}

/// Pose the skeleton of an agent standing at `position` (the neck).
pub fn apply_pose(
    skeleton: &mut Skeleton,
    rig: &StickmanRig,
    position: Position,
    kind: PoseKind,
    state: &PoseState,
    vignette: Option<VignetteInput>,
    tuning: &GaitTuning,
) {
    let vignette = vignette.unwrap_or(VignetteInput {
        progress: 0.0,
        heading: 0.0,
    });
    match kind {
        PoseKind::Walk | PoseKind::Run | PoseKind::Flee => {
            pose_locomotion(skeleton, rig, position, state, tuning);
        }
        PoseKind::Caught => pose_caught(skeleton, rig, position, state, vignette, tuning),
        PoseKind::CaughtVictim => pose_caught_victim(skeleton, rig, position, state, vignette, tuning),
        PoseKind::Investigated => pose_investigated(skeleton, rig, position, state, vignette, tuning),
        PoseKind::InvestigatedTarget => {
            pose_investigated_target(skeleton, rig, position, state, vignette, tuning);
        }
    }
}

fn bob(state: &PoseState, tuning: &GaitTuning) -> f32 {
    let walk = state.step_cycle.sin() * tuning.walk_bob * state.stride_blend;
    let idle = (state.clock as f32 * tuning.idle_bob_rate).sin() * tuning.idle_bob;
    walk + idle * (1.0 - state.stride_blend)
}

fn place_torso(skeleton: &mut Skeleton, rig: &StickmanRig, neck: Position, lean: f32) {
    skeleton.set_root(rig.torso, neck);
    skeleton.set_angle(rig.torso, FRAC_PI_2 + lean);
    skeleton.set_root(rig.shoulders, skeleton.start(rig.torso));
}

/// Foot target for one leg at `phase` (radians) of the step cycle.
fn foot_target(hip: Position, phase: f32, gait: GaitProfile, blend: f32, facing: f32) -> Position {
    let ground = hip.y + StickmanRig::THIGH_LENGTH + StickmanRig::SHIN_LENGTH;
    let step = phase.rem_euclid(TAU) / TAU;
    // Swing forward through the first half, then slide back under the hip while planted.
    let (reach, lift) = if step < 0.5 {
        (2.0 * step - 0.5, (step * TAU).sin() * gait.lift)
    } else {
        (1.5 - 2.0 * step, 0.0)
    };
    Position::new(
        hip.x + reach * gait.stride * blend * facing,
        ground - lift * blend,
    )
}

fn pose_legs(skeleton: &mut Skeleton, rig: &StickmanRig, state: &PoseState) {
    let hip = skeleton.end(rig.torso);
    let legs = [
        (rig.left_thigh, rig.left_shin, state.step_cycle),
        (rig.right_thigh, rig.right_shin, state.step_cycle + PI),
    ];
    for (thigh, shin, phase) in legs {
        let target = foot_target(hip, phase, state.gait, state.stride_blend, state.facing);
        let solution = solve_two_bone(
            hip,
            skeleton.length(thigh),
            skeleton.length(shin),
            target,
        );
        let (upper, lower) = solution.joint_angles();
        skeleton.set_angle(thigh, upper);
        skeleton.set_angle(shin, lower);
    }
}

fn set_arm(skeleton: &mut Skeleton, upper: LinkId, lower: LinkId, angle: f32, fold: f32) {
    skeleton.set_angle(upper, angle);
    skeleton.set_angle(lower, angle + fold);
}

/// Shared stepping pose for standing, walking, running and fleeing.
fn pose_locomotion(
    skeleton: &mut Skeleton,
    rig: &StickmanRig,
    position: Position,
    state: &PoseState,
    tuning: &GaitTuning,
) {
    let neck = position + Position::new(0.0, bob(state, tuning));
    let lean = state.gait.lean * state.facing * state.stride_blend;
    place_torso(skeleton, rig, neck, -lean);
    pose_legs(skeleton, rig, state);

    // Each arm swings against the leg on the opposite side.
    let swing = (state.step_cycle.sin() * state.gait.arm_swing * state.stride_blend)
        .clamp(-state.gait.arm_swing, state.gait.arm_swing);
    let fold = tuning.forearm_fold * state.facing * state.stride_blend;
    set_arm(skeleton, rig.left_upper_arm, rig.left_lower_arm, FRAC_PI_2 - swing, -fold);
    set_arm(skeleton, rig.right_upper_arm, rig.right_lower_arm, FRAC_PI_2 + swing, -fold);
}

fn pose_caught(
    skeleton: &mut Skeleton,
    rig: &StickmanRig,
    position: Position,
    state: &PoseState,
    input: VignetteInput,
    tuning: &GaitTuning,
) {
    // Celebratory hop with both arms thrown up.
    let hop = (input.progress * TAU * 3.0).sin().abs() * 4.0;
    let neck = position + Position::new(0.0, bob(state, tuning) - hop);
    place_torso(skeleton, rig, neck, 0.0);
    pose_legs(skeleton, rig, state);
    let wave = (input.progress * TAU * 4.0).sin() * 0.3;
    set_arm(skeleton, rig.left_upper_arm, rig.left_lower_arm, -FRAC_PI_2 - 0.6 + wave, -0.3);
    set_arm(skeleton, rig.right_upper_arm, rig.right_lower_arm, -FRAC_PI_2 + 0.6 - wave, 0.3);
}

fn pose_caught_victim(
    skeleton: &mut Skeleton,
    rig: &StickmanRig,
    position: Position,
    state: &PoseState,
    input: VignetteInput,
    _tuning: &GaitTuning,
) {
    place_torso(skeleton, rig, position, 0.0);
    pose_legs(skeleton, rig, state);
    set_arm(skeleton, rig.left_upper_arm, rig.left_lower_arm, FRAC_PI_2 - 0.4, 0.0);
    set_arm(skeleton, rig.right_upper_arm, rig.right_lower_arm, FRAC_PI_2 + 0.4, 0.0);

    // Topple about the ankle, away from whoever made the catch.
    let away = if input.heading.cos() >= 0.0 { -1.0 } else { 1.0 };
    let tip = smoothstep(input.progress) * FRAC_PI_2 * away;
    let ankle = skeleton.end(rig.left_shin);
    skeleton.rotate_about(ankle, tip);
}

fn pose_investigated(
    skeleton: &mut Skeleton,
    rig: &StickmanRig,
    position: Position,
    state: &PoseState,
    input: VignetteInput,
    tuning: &GaitTuning,
) {
    let toward = if input.heading.cos() >= 0.0 { 1.0 } else { -1.0 };
    let lean = smoothstep(input.progress * 4.0) * 0.25 * toward;
    let neck = position + Position::new(0.0, bob(state, tuning));
    place_torso(skeleton, rig, neck, -lean);
    pose_legs(skeleton, rig, state);
    // One arm reaches out and pokes.
    let poke = (input.progress * TAU * 3.0).sin() * 0.15;
    let reach = input.heading + poke;
    set_arm(skeleton, rig.right_upper_arm, rig.right_lower_arm, reach, 0.0);
    set_arm(skeleton, rig.left_upper_arm, rig.left_lower_arm, FRAC_PI_2, 0.0);
}

fn pose_investigated_target(
    skeleton: &mut Skeleton,
    rig: &StickmanRig,
    position: Position,
    state: &PoseState,
    input: VignetteInput,
    tuning: &GaitTuning,
) {
    // Startled shrug that settles as the event runs out.
    let startle = 1.0 - smoothstep(input.progress);
    let jitter = (input.progress * TAU * 6.0).sin() * 0.2 * startle;
    let neck = position + Position::new(0.0, bob(state, tuning) - 3.0 * startle);
    place_torso(skeleton, rig, neck, 0.0);
    pose_legs(skeleton, rig, state);
    let spread = 0.3 + 0.9 * startle;
    set_arm(
        skeleton,
        rig.left_upper_arm,
        rig.left_lower_arm,
        FRAC_PI_2 + spread + jitter,
        -0.8 * startle,
    );
    set_arm(
        skeleton,
        rig.right_upper_arm,
        rig.right_lower_arm,
        FRAC_PI_2 - spread - jitter,
        0.8 * startle,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rig() -> (Skeleton, StickmanRig) {
        StickmanRig::build(Position::new(0.0, 0.0)).expect("rig builds")
    }

    fn feet(skeleton: &Skeleton, rig: &StickmanRig) -> [Position; 2] {
        [skeleton.end(rig.left_shin), skeleton.end(rig.right_shin)]
    }

    #[test]
    fn still_agent_stands_straight() {
        let (mut skeleton, rig) = rig();
        let tuning = GaitTuning::default();
        let state = PoseState::default();
        apply_pose(&mut skeleton, &rig, Position::new(0.0, 0.0), PoseKind::Walk, &state, None, &tuning);
        for foot in feet(&skeleton, &rig) {
            assert!((foot.x).abs() < 1e-3);
        }
        assert!((skeleton.angle(rig.left_shin) - FRAC_PI_2).abs() < 1e-3);
    }

    #[test]
    fn walking_keeps_limbs_connected_and_in_reach() {
        let (mut skeleton, rig) = rig();
        let tuning = GaitTuning::default();
        let mut state = PoseState::default();
        let velocity = Position::new(1.2, 0.0);
        let mut position = Position::new(0.0, 0.0);
        for _ in 0..200 {
            position += velocity;
            state.advance(velocity, PoseKind::Walk, &tuning);
            apply_pose(&mut skeleton, &rig, position, PoseKind::Walk, &state, None, &tuning);
            let hip = skeleton.end(rig.torso);
            for foot in feet(&skeleton, &rig) {
                assert!(hip.distance(foot) <= 40.0 + 1e-3);
            }
            assert!(skeleton.start(rig.left_shin).distance(skeleton.end(rig.left_thigh)) < 1e-4);
        }
        assert!(state.stride_blend > 0.99);
    }

    #[test]
    fn switching_gait_does_not_snap_the_feet() {
        let (mut skeleton, rig) = rig();
        let tuning = GaitTuning::default();
        let mut state = PoseState::default();
        let velocity = Position::new(1.0, 0.0);
        let position = Position::new(0.0, 0.0);
        for _ in 0..60 {
            state.advance(velocity, PoseKind::Walk, &tuning);
        }
        apply_pose(&mut skeleton, &rig, position, PoseKind::Walk, &state, None, &tuning);
        let mut previous = feet(&skeleton, &rig);
        for _ in 0..30 {
            state.advance(velocity * 2.0, PoseKind::Flee, &tuning);
            apply_pose(&mut skeleton, &rig, position, PoseKind::Flee, &state, None, &tuning);
            let current = feet(&skeleton, &rig);
            for (before, after) in previous.iter().zip(current.iter()) {
                assert!(before.distance(*after) < 12.0, "foot jumped {}", before.distance(*after));
            }
            previous = current;
        }
    }

    #[test]
    fn starting_an_event_mid_stride_eases_the_legs_down() {
        let (mut skeleton, rig) = rig();
        let tuning = GaitTuning::default();
        let mut state = PoseState::default();
        let velocity = Position::new(1.3, 0.0);
        let mut position = Position::ORIGIN;
        for _ in 0..45 {
            position += velocity;
            state.advance(velocity, PoseKind::Walk, &tuning);
        }
        apply_pose(&mut skeleton, &rig, position, PoseKind::Walk, &state, None, &tuning);
        let relative = |skeleton: &Skeleton| {
            let hip = skeleton.end(rig.torso);
            feet(skeleton, &rig).map(|foot| foot - hip)
        };
        let mut previous = relative(&skeleton);

        for tick in 0..40 {
            state.advance(Position::ORIGIN, PoseKind::Caught, &tuning);
            let input = VignetteInput {
                progress: tick as f32 / 40.0,
                heading: 0.0,
            };
            apply_pose(&mut skeleton, &rig, position, PoseKind::Caught, &state, Some(input), &tuning);
            let current = relative(&skeleton);
            for (before, after) in previous.iter().zip(current.iter()) {
                let jump = before.distance(*after);
                assert!(jump < 3.0, "foot jumped {jump} on tick {tick}");
            }
            previous = current;
        }
        assert!(state.stride_blend < 1e-6);
    }

    #[test]
    fn stopping_fades_the_stride_out_gradually() {
        let tuning = GaitTuning::default();
        let mut state = PoseState::default();
        for _ in 0..30 {
            state.advance(Position::new(1.0, 0.0), PoseKind::Walk, &tuning);
        }
        let before = state.stride_blend;
        state.advance(Position::ORIGIN, PoseKind::Walk, &tuning);
        assert!(state.stride_blend < before);
        assert!(before - state.stride_blend <= tuning.blend_rate + 1e-6);
    }

    #[test]
    fn victim_ends_up_lying_down_away_from_partner() {
        let (mut skeleton, rig) = rig();
        let tuning = GaitTuning::default();
        let state = PoseState::default();
        let upright_ankle = Position::new(0.0, 70.0);
        let input = VignetteInput {
            progress: 1.0,
            heading: 0.0,
        };
        apply_pose(&mut skeleton, &rig, Position::ORIGIN, PoseKind::CaughtVictim, &state, Some(input), &tuning);
        let neck = skeleton.start(rig.torso);
        assert!(skeleton.end(rig.left_shin).distance(upright_ankle) < 1e-3);
        // Partner sits to the right, so the head lands on the left at ankle height.
        assert!(neck.x < -60.0);
        assert!((neck.y - upright_ankle.y).abs() < 1e-2);
    }

    #[test]
    fn select_prefers_events() {
        assert_eq!(
            PoseKind::select(BehaviorState::Chase, Some(EventKind::Caught)),
            PoseKind::Caught
        );
        assert_eq!(PoseKind::select(BehaviorState::RunAway, None), PoseKind::Flee);
        assert_eq!(PoseKind::select(BehaviorState::Idle, None), PoseKind::Walk);
    }
}

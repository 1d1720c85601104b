use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};

use crate::WorldStateError;

/// Static configuration for a Stickfolk world.
///
/// Every value is fixed for the lifetime of a world; drivers may load overrides from JSON
/// before construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StickfolkConfig {
    /// Width of the spawn area / predator arena in world units.
    pub world_width: f32,
    /// Height of the spawn area / predator arena in world units.
    pub world_height: f32,
    /// Optional RNG seed for reproducible worlds.
    pub rng_seed: Option<u64>,
    /// Maximum number of recent tick summaries retained in-memory.
    pub history_capacity: usize,
    pub agent: AgentTuning,
    pub durations: BehaviorDurations,
    pub gait: GaitTuning,
    pub predator: PredatorTuning,
    pub crowd: CrowdTuning,
    pub phases: PhaseDurations,
}

impl Default for StickfolkConfig {
    fn default() -> Self {
        Self {
            world_width: 1_600.0,
            world_height: 1_000.0,
            rng_seed: None,
            history_capacity: 256,
            agent: AgentTuning::default(),
            durations: BehaviorDurations::default(),
            gait: GaitTuning::default(),
            predator: PredatorTuning::default(),
            crowd: CrowdTuning::default(),
            phases: PhaseDurations::default(),
        }
    }
}

/// Individual stickman movement and perception constants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentTuning {
    /// Lower bound of the per-agent base walking speed (units per tick).
    pub walk_speed_min: f32,
    /// Upper bound of the per-agent base walking speed.
    pub walk_speed_max: f32,
    /// Lower bound of the per-agent wander radius.
    pub wander_radius_min: f32,
    /// Upper bound of the per-agent wander radius.
    pub wander_radius_max: f32,
    /// Distance at which a walking agent counts as arrived.
    pub arrival_buffer: f32,
    /// Radius searched for chase / investigate targets.
    pub detection_radius: f32,
    /// Predator head distance that forces an agent to run away.
    pub flee_distance: f32,
    /// Speed multiplier while fleeing a predator.
    pub predator_flee_multiplier: f32,
    /// Speed multiplier while fleeing a hostile chaser.
    pub chaser_flee_multiplier: f32,
    /// Speed multiplier while chasing.
    pub chase_multiplier: f32,
    /// Arrival buffer multiplier used by investigators.
    pub investigate_buffer_scale: f32,
    /// Number of candidate points scored when seeking a quiet spot.
    pub quiet_candidates: usize,
    /// Distance from the agent at which quiet candidates are sampled.
    pub quiet_search_radius: f32,
    /// Radius used to score the crowding around a quiet candidate.
    pub quiet_density_radius: f32,
    /// Velocity damping applied each tick while stationary.
    pub idle_damping: f32,
    /// Length of each transient event vignette, in ticks.
    pub event_duration: u32,
}

impl Default for AgentTuning {
    fn default() -> Self {
        Self {
            walk_speed_min: 0.6,
            walk_speed_max: 1.3,
            wander_radius_min: 50.0,
            wander_radius_max: 150.0,
            arrival_buffer: 12.0,
            detection_radius: 250.0,
            flee_distance: 220.0,
            predator_flee_multiplier: 2.0,
            chaser_flee_multiplier: 1.5,
            chase_multiplier: 2.0,
            investigate_buffer_scale: 1.5,
            quiet_candidates: 8,
            quiet_search_radius: 150.0,
            quiet_density_radius: 80.0,
            idle_damping: 0.9,
            event_duration: 90,
        }
    }
}

/// Per-state duration budgets (ticks) after which the transition table is consulted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BehaviorDurations {
    pub idle: u32,
    pub wander: u32,
    pub chase: u32,
    pub investigate: u32,
    pub seek_quiet: u32,
    pub rest: u32,
    pub run_away: u32,
}

impl Default for BehaviorDurations {
    fn default() -> Self {
        Self {
            idle: 90,
            wander: 240,
            chase: 300,
            investigate: 240,
            seek_quiet: 300,
            rest: 180,
            run_away: 120,
        }
    }
}

/// Step-cycle and limb-posing constants shared by every gait.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GaitTuning {
    /// Step-cycle radians gained per unit of distance travelled.
    pub step_cycle_rate: f32,
    /// Amplitude of the torso bob while walking.
    pub walk_bob: f32,
    /// Amplitude of the breathing bob while standing.
    pub idle_bob: f32,
    /// Breathing bob frequency (radians per tick).
    pub idle_bob_rate: f32,
    /// How quickly stride and swing fade in or out per tick.
    pub blend_rate: f32,
    /// Offset between upper and lower arm angles.
    pub forearm_fold: f32,
    /// Speed below which an agent is considered standing.
    pub moving_threshold: f32,
}

impl Default for GaitTuning {
    fn default() -> Self {
        Self {
            step_cycle_rate: 0.3,
            walk_bob: 1.5,
            idle_bob: 0.5,
            idle_bob_rate: 0.02,
            blend_rate: 0.1,
            forearm_fold: 0.5,
            moving_threshold: 0.05,
        }
    }
}

/// Predator body, steering, and spawn constants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PredatorTuning {
    /// Half-width of the body at each vertebra; the spine has two extra tail joints.
    pub body_radii: Vec<f32>,
    /// Spine segment length.
    pub spacing: f32,
    /// Maximum bend between consecutive spine joints (radians).
    pub angle_constraint: f32,
    /// Mouth radius as a multiple of the first body radius.
    pub mouth_scale: f32,
    /// Lower bound of the per-predator lookahead step.
    pub speed_min: f32,
    /// Upper bound of the per-predator lookahead step.
    pub speed_max: f32,
    /// Distance to the wander circle ahead of the head.
    pub wander_circle_distance: f32,
    /// Radius of the wander circle.
    pub wander_circle_radius: f32,
    /// Maximum random-walk change of the wander offset per tick.
    pub wander_jitter: f32,
    /// Heading interpolation factor toward the wander point.
    pub wander_turn_rate: f32,
    /// Heading interpolation factor toward the flocking direction.
    pub flock_turn_rate: f32,
    /// Radius inside which other predators contribute flocking forces.
    pub boid_radius: f32,
    pub separation_weight: f32,
    pub alignment_weight: f32,
    pub cohesion_weight: f32,
    /// Soft leash around each home anchor.
    pub roam_radius: f32,
    /// One predator is allowed per this many live agents.
    pub agents_per_predator: usize,
    /// Hard cap on live predators spawned by density.
    pub max_predators: usize,
    /// Distance outside the world rectangle at which predators appear.
    pub spawn_margin: f32,
    /// Distance inside the world rectangle of a new predator's home anchor.
    pub home_inset: f32,
}

impl Default for PredatorTuning {
    fn default() -> Self {
        Self {
            body_radii: vec![68.0, 81.0, 84.0, 83.0, 77.0, 64.0, 51.0, 38.0, 32.0, 19.0],
            spacing: 64.0,
            angle_constraint: std::f32::consts::PI / 8.0,
            mouth_scale: 1.2,
            speed_min: 12.0,
            speed_max: 20.0,
            wander_circle_distance: 20.0,
            wander_circle_radius: 10.0,
            wander_jitter: 0.3,
            wander_turn_rate: 0.2,
            flock_turn_rate: 0.05,
            boid_radius: 200.0,
            separation_weight: 1.5,
            alignment_weight: 1.0,
            cohesion_weight: 1.0,
            roam_radius: 1_500.0,
            agents_per_predator: 15,
            max_predators: 4,
            spawn_margin: 300.0,
            home_inset: 200.0,
        }
    }
}

/// Clustering and crowd state-machine constants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CrowdTuning {
    /// Neighborhood radius for density clustering.
    pub eps: f32,
    /// Neighbors (excluding self) required for a core point.
    pub min_pts: usize,
    /// Rally point distance band from the cluster centroid, in multiples of `eps`.
    pub rally_band: (f32, f32),
    /// Rally points closer than this are pushed apart.
    pub rally_min_separation: f32,
    /// Radius around the crowd centroid that triggers a flee on predator contact.
    pub predator_detection_radius: f32,
    /// Radius around the centroid in which roam centers are picked.
    pub roam_radius: f32,
    /// Per-member scatter around a shared roam / quiet center.
    pub member_jitter: f32,
    /// Weight of the hostile share when sampling a chase.
    pub chase_bias: f32,
    /// Weight of the loner share when sampling a quiet search.
    pub quiet_bias: f32,
    /// Speed multiplier for a fleeing crowd.
    pub flee_multiplier: f32,
    /// Crowds with fewer live members than this dissolve.
    pub min_members: usize,
    pub roam_duration: u32,
    pub chase_duration: u32,
    pub flee_duration: u32,
    pub seek_quiet_duration: u32,
}

impl Default for CrowdTuning {
    fn default() -> Self {
        Self {
            eps: 90.0,
            min_pts: 2,
            rally_band: (1.5, 3.0),
            rally_min_separation: 180.0,
            predator_detection_radius: 320.0,
            roam_radius: 200.0,
            member_jitter: 40.0,
            chase_bias: 0.7,
            quiet_bias: 0.7,
            flee_multiplier: 1.5,
            min_members: 2,
            roam_duration: 240,
            chase_duration: 300,
            flee_duration: 150,
            seek_quiet_duration: 240,
        }
    }
}

/// Fixed lengths (ticks) of the three crowd phases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhaseDurations {
    pub forming: u32,
    pub holding: u32,
    pub disbanding: u32,
}

impl Default for PhaseDurations {
    fn default() -> Self {
        Self {
            forming: 300,
            holding: 900,
            disbanding: 60,
        }
    }
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

fn non_negative(value: f32) -> bool {
    value.is_finite() && value >= 0.0
}

impl StickfolkConfig {
    /// Check that every tunable lies in a usable range.
    pub fn validate(&self) -> Result<(), WorldStateError> {
        if !positive(self.world_width) || !positive(self.world_height) {
            return Err(WorldStateError::InvalidConfig(
                "world dimensions must be positive",
            ));
        }
        let agent = &self.agent;
        if !positive(agent.walk_speed_min) || agent.walk_speed_max < agent.walk_speed_min {
            return Err(WorldStateError::InvalidConfig(
                "walk speed range must be positive and ordered",
            ));
        }
        if !positive(agent.wander_radius_min) || agent.wander_radius_max < agent.wander_radius_min
        {
            return Err(WorldStateError::InvalidConfig(
                "wander radius range must be positive and ordered",
            ));
        }
        if !positive(agent.arrival_buffer)
            || !positive(agent.detection_radius)
            || !positive(agent.flee_distance)
            || !positive(agent.quiet_search_radius)
            || !positive(agent.quiet_density_radius)
        {
            return Err(WorldStateError::InvalidConfig("agent radii must be positive"));
        }
        if agent.quiet_candidates == 0 {
            return Err(WorldStateError::InvalidConfig(
                "quiet_candidates must be at least 1",
            ));
        }
        if agent.event_duration == 0 {
            return Err(WorldStateError::InvalidConfig(
                "event_duration must be positive",
            ));
        }
        if ![
            agent.predator_flee_multiplier,
            agent.chaser_flee_multiplier,
            agent.chase_multiplier,
            agent.investigate_buffer_scale,
            agent.idle_damping,
        ]
        .into_iter()
        .all(non_negative)
        {
            return Err(WorldStateError::InvalidConfig(
                "agent multipliers must be finite and non-negative",
            ));
        }
        let gait = &self.gait;
        if !positive(gait.blend_rate) {
            return Err(WorldStateError::InvalidConfig("gait blend_rate must be positive"));
        }
        if ![
            gait.step_cycle_rate,
            gait.walk_bob,
            gait.idle_bob,
            gait.idle_bob_rate,
            gait.moving_threshold,
        ]
        .into_iter()
        .all(non_negative)
            || !gait.forearm_fold.is_finite()
        {
            return Err(WorldStateError::InvalidConfig(
                "gait constants must be finite and non-negative",
            ));
        }
        let predator = &self.predator;
        if predator.body_radii.is_empty() || !predator.body_radii.iter().all(|r| positive(*r)) {
            return Err(WorldStateError::InvalidConfig(
                "predator body_radii must be non-empty and positive",
            ));
        }
        if !positive(predator.spacing) || !positive(predator.roam_radius) {
            return Err(WorldStateError::InvalidConfig(
                "predator spacing and roam_radius must be positive",
            ));
        }
        if !positive(predator.speed_min) || predator.speed_max < predator.speed_min {
            return Err(WorldStateError::InvalidConfig(
                "predator speed range must be positive and ordered",
            ));
        }
        if !positive(predator.angle_constraint) || !positive(predator.mouth_scale) {
            return Err(WorldStateError::InvalidConfig(
                "predator angle_constraint and mouth_scale must be positive",
            ));
        }
        if ![
            predator.wander_circle_distance,
            predator.wander_circle_radius,
            predator.wander_jitter,
            predator.wander_turn_rate,
            predator.flock_turn_rate,
            predator.boid_radius,
            predator.separation_weight,
            predator.alignment_weight,
            predator.cohesion_weight,
            predator.spawn_margin,
            predator.home_inset,
        ]
        .into_iter()
        .all(non_negative)
        {
            return Err(WorldStateError::InvalidConfig(
                "predator steering constants must be finite and non-negative",
            ));
        }
        if predator.agents_per_predator == 0 {
            return Err(WorldStateError::InvalidConfig(
                "agents_per_predator must be at least 1",
            ));
        }
        let crowd = &self.crowd;
        if !positive(crowd.eps) || crowd.min_pts == 0 {
            return Err(WorldStateError::InvalidConfig(
                "clustering eps and min_pts must be positive",
            ));
        }
        if !positive(crowd.rally_band.0) || crowd.rally_band.1 < crowd.rally_band.0 {
            return Err(WorldStateError::InvalidConfig(
                "rally_band must be positive and ordered",
            ));
        }
        if ![
            crowd.rally_min_separation,
            crowd.predator_detection_radius,
            crowd.roam_radius,
            crowd.member_jitter,
            crowd.chase_bias,
            crowd.quiet_bias,
            crowd.flee_multiplier,
        ]
        .into_iter()
        .all(non_negative)
        {
            return Err(WorldStateError::InvalidConfig(
                "crowd radii and weights must be finite and non-negative",
            ));
        }
        if crowd.min_members == 0 {
            return Err(WorldStateError::InvalidConfig("min_members must be at least 1"));
        }
        if self.phases.forming == 0 || self.phases.holding == 0 || self.phases.disbanding == 0 {
            return Err(WorldStateError::InvalidConfig(
                "phase durations must be positive",
            ));
        }
        Ok(())
    }

    /// RNG seeded from `rng_seed`, or from OS entropy when no seed is configured.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

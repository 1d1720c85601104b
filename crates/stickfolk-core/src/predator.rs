//! Fish-like predators: a follower-chain spine steered by flocking plus a home-bound wander.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use crate::chain::FollowerChain;
use crate::config::PredatorTuning;
use crate::geometry::{NEAR_ZERO, Position, lerp_angle};

/// Read-only view of a predator used while another predator steers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredatorView {
    pub head: Position,
    pub heading: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predator {
    spine: FollowerChain,
    heading: f32,
    /// Lookahead distance travelled by the head each tick.
    speed: f32,
    wander_angle: f32,
    home: Position,
    body_radii: Vec<f32>,
    mouth_radius: f32,
}

impl Predator {
    /// Create a predator whose spine hangs from `origin`, anchored to `home`.
    pub fn new<R: Rng + ?Sized>(
        origin: Position,
        home: Position,
        tuning: &PredatorTuning,
        rng: &mut R,
    ) -> Self {
        let body_radii = tuning.body_radii.clone();
        let mouth_radius = body_radii.first().copied().unwrap_or(0.0) * tuning.mouth_scale;
        Self {
            spine: FollowerChain::new(
                origin,
                body_radii.len() + 2,
                tuning.spacing,
                tuning.angle_constraint,
            ),
            heading: rng.random_range(0.0..TAU),
            speed: rng.random_range(tuning.speed_min..=tuning.speed_max),
            wander_angle: 0.0,
            home,
            body_radii,
            mouth_radius,
        }
    }

    #[must_use]
    pub fn head(&self) -> Position {
        self.spine.head()
    }

    #[must_use]
    pub fn heading(&self) -> f32 {
        self.heading
    }

    /// Point the predator in a new direction without moving it.
    pub fn set_heading(&mut self, heading: f32) {
        self.heading = heading;
    }

    #[must_use]
    pub fn speed(&self) -> f32 {
        self.speed
    }

    #[must_use]
    pub fn home(&self) -> Position {
        self.home
    }

    #[must_use]
    pub fn mouth_radius(&self) -> f32 {
        self.mouth_radius
    }

    #[must_use]
    pub fn body_radii(&self) -> &[f32] {
        &self.body_radii
    }

    #[must_use]
    pub fn spine(&self) -> &FollowerChain {
        &self.spine
    }

    #[must_use]
    pub fn view(&self) -> PredatorView {
        PredatorView {
            head: self.head(),
            heading: self.heading,
        }
    }

    /// Outline point beside vertebra `vertebra`: its body radius plus `length_offset`,
    /// at `angle_offset` from the spine direction.
    #[must_use]
    pub fn side_point(&self, vertebra: usize, angle_offset: f32, length_offset: f32) -> Option<Position> {
        let joint = *self.spine.joints().get(vertebra)?;
        let angle = *self.spine.angles().get(vertebra)?;
        let width = self.body_radii.get(vertebra).copied().unwrap_or(0.0) + length_offset;
        Some(joint.offset(angle + angle_offset, width))
    }

    /// Weighted separation, alignment and cohesion from neighbours inside the boid radius.
    ///
    /// Views sitting exactly on this predator's head (including its own) are ignored.
    #[must_use]
    pub fn flocking_steer(&self, others: &[PredatorView], tuning: &PredatorTuning) -> Position {
        let head = self.head();
        let radius_sq = tuning.boid_radius * tuning.boid_radius;
        let mut separation = Position::ORIGIN;
        let mut alignment = Position::ORIGIN;
        let mut cohesion = Position::ORIGIN;
        let mut count = 0usize;

        for other in others {
            let offset = other.head - head;
            let dist_sq = offset.length_sq();
            if dist_sq <= 0.0 || dist_sq >= radius_sq {
                continue;
            }
            count += 1;
            separation = separation - offset * (1.0 / dist_sq);
            alignment += Position::from_angle(other.heading);
            cohesion += other.head;
        }

        if count == 0 {
            return Position::ORIGIN;
        }
        let n = count as f32;
        let separation = (separation * (1.0 / n)).normalize_or_zero() * tuning.separation_weight;
        let alignment = (alignment * (1.0 / n)).normalize_or_zero() * tuning.alignment_weight;
        let cohesion = (cohesion * (1.0 / n) - head).normalize_or_zero() * tuning.cohesion_weight;
        separation + alignment + cohesion
    }

    /// Advance the wander circle and return the next head target, clamped to the nearest
    /// home's roam radius when it would leave all of them.
    pub fn wander_target<R: Rng + ?Sized>(
        &mut self,
        homes: &[Position],
        tuning: &PredatorTuning,
        rng: &mut R,
    ) -> Position {
        let head = self.head();
        let circle_center = head.offset(self.heading, tuning.wander_circle_distance);
        self.wander_angle += rng.random_range(-1.0..=1.0) * tuning.wander_jitter;
        let on_circle = circle_center.offset(self.wander_angle, tuning.wander_circle_radius);
        self.heading = lerp_angle(self.heading, head.angle_to(on_circle), tuning.wander_turn_rate);

        let lookahead = head.offset(self.heading, self.speed);
        let Some(clamped) = clamp_to_homes(lookahead, homes, tuning.roam_radius) else {
            return lookahead;
        };
        self.heading = head.angle_to(clamped);
        clamped
    }

    /// Flocking, then wander, then drag the spine toward the resulting target.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        others: &[PredatorView],
        homes: &[Position],
        tuning: &PredatorTuning,
        rng: &mut R,
    ) {
        let steer = self.flocking_steer(others, tuning);
        if steer.length() > NEAR_ZERO {
            let desired = steer.y.atan2(steer.x);
            self.heading = lerp_angle(self.heading, desired, tuning.flock_turn_rate);
        }
        let target = self.wander_target(homes, tuning, rng);
        self.spine.resolve(target);
    }
}

/// Project `point` onto the roam circle it overshoots least, or `None` when it already
/// lies inside some home's circle (or there are no homes).
#[must_use]
pub fn clamp_to_homes(point: Position, homes: &[Position], roam_radius: f32) -> Option<Position> {
    let radius_sq = roam_radius * roam_radius;
    if homes.is_empty() || homes.iter().any(|home| home.distance_sq(point) <= radius_sq) {
        return None;
    }
    let best = homes
        .iter()
        .copied()
        .min_by(|a, b| a.distance_sq(point).total_cmp(&b.distance_sq(point)))?;
    let direction = (point - best).normalize_or_zero();
    Some(best + direction * roam_radius)
}

/// Random point on the border of the world rectangle grown by `margin`, and the home
/// anchor `inset` back inside the world.
pub fn edge_spawn<R: Rng + ?Sized>(
    width: f32,
    height: f32,
    margin: f32,
    inset: f32,
    rng: &mut R,
) -> (Position, Position) {
    let (min_x, max_x) = (-margin, width + margin);
    let (min_y, max_y) = (-margin, height + margin);
    let span_x = max_x - min_x;
    let span_y = max_y - min_y;
    let t = rng.random_range(0.0..(2.0 * (span_x + span_y)).max(NEAR_ZERO));
    let origin = if t < span_x {
        Position::new(min_x + t, min_y)
    } else if t < span_x + span_y {
        Position::new(max_x, min_y + (t - span_x))
    } else if t < 2.0 * span_x + span_y {
        Position::new(max_x - (t - span_x - span_y), max_y)
    } else {
        Position::new(min_x, max_y - (t - 2.0 * span_x - span_y))
    };
    (origin, home_for(origin, width, height, inset))
}

/// Project `point` into the world rectangle shrunk by `inset` on every side.
#[must_use]
pub fn home_for(point: Position, width: f32, height: f32, inset: f32) -> Position {
    let clamp = |value: f32, extent: f32| {
        let lo = inset.min(extent * 0.5);
        let hi = (extent - inset).max(extent * 0.5);
        value.clamp(lo, hi)
    };
    Position::new(clamp(point.x, width), clamp(point.y, height))
}

//! Planar vectors, angle wrapping, and the simulation clock.

use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};
use std::ops::{Add, AddAssign, Mul, Sub};

/// Lengths below this are treated as zero when normalizing.
pub const NEAR_ZERO: f32 = 1e-6;

/// High level simulation clock (ticks processed since the world was created).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// World-space point (y grows downward, matching screen space).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const ORIGIN: Self = Self::new(0.0, 0.0);

    /// Construct a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along `angle`.
    #[must_use]
    pub fn from_angle(angle: f32) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    #[must_use]
    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    #[must_use]
    pub fn length_sq(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (other - self).length()
    }

    #[must_use]
    pub fn distance_sq(self, other: Self) -> f32 {
        (other - self).length_sq()
    }

    /// Heading from `self` toward `other`.
    #[must_use]
    pub fn angle_to(self, other: Self) -> f32 {
        (other.y - self.y).atan2(other.x - self.x)
    }

    /// Point `len` units away along `angle`.
    #[must_use]
    pub fn offset(self, angle: f32, len: f32) -> Self {
        self + Self::from_angle(angle) * len
    }

    #[must_use]
    pub fn lerp(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }

    /// Normalized copy; near-zero vectors are divided by 1 so they stay finite.
    #[must_use]
    pub fn normalize_or_zero(self) -> Self {
        let len = self.length();
        let divisor = if len < NEAR_ZERO { 1.0 } else { len };
        Self::new(self.x / divisor, self.y / divisor)
    }

    /// Rotate this point about `pivot` by `angle` radians.
    #[must_use]
    pub fn rotate_about(self, pivot: Self, angle: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        let d = self - pivot;
        Self::new(
            pivot.x + d.x * cos - d.y * sin,
            pivot.y + d.x * sin + d.y * cos,
        )
    }

    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    #[must_use]
    pub fn as_tuple(self) -> (f32, f32) {
        (self.x, self.y)
    }
}

impl Add for Position {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Position {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Position {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Position {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// Wrap an angle into `(-π, π]`.
#[must_use]
pub fn wrap_signed_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = wrap_unsigned_angle(angle);
    if wrapped > PI { wrapped - TAU } else { wrapped }
}

/// Wrap an angle into `[0, 2π)`.
#[must_use]
pub fn wrap_unsigned_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs.
    if wrapped >= TAU { 0.0 } else { wrapped }
}

/// Interpolate from `from` toward `to` along the shorter arc.
#[must_use]
pub fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    from + wrap_signed_angle(to - from) * t
}

/// Cubic ease used by the animation vignettes.
#[must_use]
pub fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Centroid of a set of points; `None` when the set is empty.
#[must_use]
pub fn centroid<I>(points: I) -> Option<Position>
where
    I: IntoIterator<Item = Position>,
{
    let mut sum = Position::ORIGIN;
    let mut count = 0usize;
    for point in points {
        sum += point;
        count += 1;
    }
    (count > 0).then(|| sum * (1.0 / count as f32))
}

//! Spatial indexing abstractions for agent neighborhood queries.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors emitted by spatial index implementations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g., non-positive cell size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Common behaviour exposed by neighborhood indices.
pub trait NeighborhoodIndex {
    /// Rebuild internal structures from agent positions.
    fn rebuild(&mut self, positions: &[(f32, f32)]) -> Result<(), IndexError>;

    /// Visit neighbors of `agent_idx` within the provided squared radius.
    ///
    /// The agent itself is never visited.
    fn neighbors_within(
        &self,
        agent_idx: usize,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    );

    /// Visit every indexed point within the squared radius of an arbitrary location.
    fn points_within(
        &self,
        center: (f32, f32),
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    );
}

/// Unbounded uniform grid: points are bucketed by the integer cell containing them.
///
/// Agents may be spawned anywhere on an infinite canvas, so buckets live in a hash map
/// rather than a dense array sized to world bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniformGridIndex {
    /// Edge length of each grid cell used for bucketing agents.
    pub cell_size: f32,
    #[serde(skip)]
    positions: Vec<(f32, f32)>,
    #[serde(skip)]
    buckets: HashMap<(i32, i32), Vec<usize>>,
}

impl UniformGridIndex {
    /// Create a new uniform grid with the provided cell size.
    #[must_use]
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            positions: Vec::new(),
            buckets: HashMap::new(),
        }
    }

    /// Number of points indexed by the last rebuild.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true when the last rebuild indexed no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Position recorded for `idx` by the last rebuild.
    #[must_use]
    pub fn position(&self, idx: usize) -> Option<(f32, f32)> {
        self.positions.get(idx).copied()
    }

    /// Count the points within `radius` of `center`.
    #[must_use]
    pub fn count_within(&self, center: (f32, f32), radius: f32) -> usize {
        let mut count = 0usize;
        self.points_within(center, radius * radius, &mut |_, _| count += 1);
        count
    }

    /// Index of the closest point to `center` within `radius`, skipping `exclude`.
    #[must_use]
    pub fn nearest_within(
        &self,
        center: (f32, f32),
        radius: f32,
        exclude: &dyn Fn(usize) -> bool,
    ) -> Option<usize> {
        let mut best: Option<(usize, OrderedFloat<f32>)> = None;
        self.points_within(center, radius * radius, &mut |idx, dist_sq| {
            if exclude(idx) {
                return;
            }
            match best {
                Some((best_idx, best_sq)) if (best_sq, best_idx) <= (dist_sq, idx) => {}
                _ => best = Some((idx, dist_sq)),
            }
        });
        best.map(|(idx, _)| idx)
    }

    fn cell_of(&self, x: f32, y: f32) -> (i32, i32) {
        (
            (x / self.cell_size).floor() as i32,
            (y / self.cell_size).floor() as i32,
        )
    }

    fn visit_cells(
        &self,
        center: (f32, f32),
        radius_sq: f32,
        skip: Option<usize>,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    ) {
        if self.positions.is_empty() || !radius_sq.is_finite() || radius_sq < 0.0 {
            return;
        }
        let radius = radius_sq.sqrt();
        let (min_cx, min_cy) = self.cell_of(center.0 - radius, center.1 - radius);
        let (max_cx, max_cy) = self.cell_of(center.0 + radius, center.1 + radius);

        // Huge radii would walk mostly empty cells; scan the points directly instead.
        let span = (i64::from(max_cx) - i64::from(min_cx) + 1)
            * (i64::from(max_cy) - i64::from(min_cy) + 1);
        if span > self.buckets.len() as i64 * 4 {
            for (idx, &(x, y)) in self.positions.iter().enumerate() {
                if Some(idx) == skip {
                    continue;
                }
                let dx = x - center.0;
                let dy = y - center.1;
                let dist_sq = dx * dx + dy * dy;
                if dist_sq <= radius_sq {
                    visitor(idx, OrderedFloat(dist_sq));
                }
            }
            return;
        }

        for cx in min_cx..=max_cx {
            for cy in min_cy..=max_cy {
                let Some(bucket) = self.buckets.get(&(cx, cy)) else {
                    continue;
                };
                for &idx in bucket {
                    if Some(idx) == skip {
                        continue;
                    }
                    let (x, y) = self.positions[idx];
                    let dx = x - center.0;
                    let dy = y - center.1;
                    let dist_sq = dx * dx + dy * dy;
                    if dist_sq <= radius_sq {
                        visitor(idx, OrderedFloat(dist_sq));
                    }
                }
            }
        }
    }
}

impl Default for UniformGridIndex {
    fn default() -> Self {
        Self::new(50.0)
    }
}

impl NeighborhoodIndex for UniformGridIndex {
    fn rebuild(&mut self, positions: &[(f32, f32)]) -> Result<(), IndexError> {
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(IndexError::InvalidConfig("cell_size must be positive"));
        }
        self.positions.clear();
        self.positions.extend_from_slice(positions);
        for bucket in self.buckets.values_mut() {
            bucket.clear();
        }
        for (idx, &(x, y)) in positions.iter().enumerate() {
            let cell = self.cell_of(x, y);
            self.buckets.entry(cell).or_default().push(idx);
        }
        self.buckets.retain(|_, bucket| !bucket.is_empty());
        Ok(())
    }

    fn neighbors_within(
        &self,
        agent_idx: usize,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    ) {
        let Some(center) = self.position(agent_idx) else {
            return;
        };
        self.visit_cells(center, radius_sq, Some(agent_idx), visitor);
    }

    fn points_within(
        &self,
        center: (f32, f32),
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    ) {
        self.visit_cells(center, radius_sq, None, visitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_neighbors(index: &UniformGridIndex, idx: usize, radius: f32) -> Vec<usize> {
        let mut found = Vec::new();
        index.neighbors_within(idx, radius * radius, &mut |other, _| found.push(other));
        found.sort_unstable();
        found
    }

    #[test]
    fn rejects_non_positive_cell_size() {
        let mut index = UniformGridIndex::new(0.0);
        assert_eq!(
            index.rebuild(&[(0.0, 0.0)]),
            Err(IndexError::InvalidConfig("cell_size must be positive"))
        );
    }

    #[test]
    fn neighbors_exclude_self_and_far_points() {
        let mut index = UniformGridIndex::new(10.0);
        index
            .rebuild(&[(0.0, 0.0), (3.0, 4.0), (50.0, 50.0), (-4.0, -3.0)])
            .expect("rebuild");
        assert_eq!(collect_neighbors(&index, 0, 5.0), vec![1, 3]);
        assert!(collect_neighbors(&index, 2, 5.0).is_empty());
    }

    #[test]
    fn neighbors_cross_cell_boundaries_and_negative_coordinates() {
        let mut index = UniformGridIndex::new(4.0);
        index
            .rebuild(&[(-0.5, -0.5), (0.5, 0.5), (-7.9, 0.0)])
            .expect("rebuild");
        assert_eq!(collect_neighbors(&index, 0, 2.0), vec![1]);
        assert_eq!(collect_neighbors(&index, 0, 8.0), vec![1, 2]);
    }

    #[test]
    fn visitor_reports_squared_distance() {
        let mut index = UniformGridIndex::new(5.0);
        index.rebuild(&[(0.0, 0.0), (3.0, 4.0)]).expect("rebuild");
        let mut seen = Vec::new();
        index.points_within((0.0, 0.0), 100.0, &mut |idx, dist_sq| seen.push((idx, dist_sq)));
        seen.sort();
        assert_eq!(seen, vec![(0, OrderedFloat(0.0)), (1, OrderedFloat(25.0))]);
    }

    #[test]
    fn large_radius_falls_back_to_linear_scan() {
        let mut index = UniformGridIndex::new(1.0);
        index
            .rebuild(&[(0.0, 0.0), (500.0, 0.0), (0.0, -900.0)])
            .expect("rebuild");
        assert_eq!(index.count_within((0.0, 0.0), 1_000.0), 3);
    }

    #[test]
    fn nearest_within_honours_exclusion() {
        let mut index = UniformGridIndex::new(10.0);
        index
            .rebuild(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)])
            .expect("rebuild");
        assert_eq!(index.nearest_within((0.0, 0.0), 5.0, &|idx| idx == 0), Some(1));
        assert_eq!(index.nearest_within((0.0, 0.0), 0.5, &|idx| idx == 0), None);
    }

    #[test]
    fn rebuild_replaces_previous_contents() {
        let mut index = UniformGridIndex::new(10.0);
        index.rebuild(&[(0.0, 0.0), (1.0, 1.0)]).expect("rebuild");
        index.rebuild(&[(100.0, 100.0)]).expect("rebuild");
        assert_eq!(index.len(), 1);
        assert_eq!(index.count_within((0.0, 0.0), 5.0), 0);
        assert_eq!(index.count_within((100.0, 100.0), 5.0), 1);
    }
}

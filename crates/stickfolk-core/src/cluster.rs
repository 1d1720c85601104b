//! Density-based clustering of agent positions and rally-point planning.

use ordered_float::OrderedFloat;
use rand::Rng;
use std::collections::VecDeque;
use std::f32::consts::TAU;
use stickfolk_index::{IndexError, NeighborhoodIndex, UniformGridIndex};

use crate::geometry::{NEAR_ZERO, Position};

/// DBSCAN over `positions`.
///
/// A point is a core point when at least `min_pts` other points lie within `eps`.
/// Clusters grow through core points only; a border point joins the cluster of its
/// nearest core neighbour (ties broken by the core's coordinates), so the partition
/// does not depend on input order.
/// Returns one label per input point: `Some(cluster)` with clusters numbered densely from
/// zero, or `None` for noise.
pub fn dbscan(
    positions: &[(f32, f32)],
    eps: f32,
    min_pts: usize,
) -> Result<Vec<Option<usize>>, IndexError> {
    let mut index = UniformGridIndex::new(eps);
    index.rebuild(positions)?;
    let eps_sq = eps * eps;
    let neighbors: Vec<Vec<(usize, OrderedFloat<f32>)>> = (0..positions.len())
        .map(|idx| {
            let mut found = Vec::new();
            index.neighbors_within(idx, eps_sq, &mut |other, dist_sq| {
                found.push((other, dist_sq));
            });
            found
        })
        .collect();
    let core: Vec<bool> = neighbors.iter().map(|n| n.len() >= min_pts).collect();

    let mut labels = vec![None; positions.len()];
    let mut next_cluster = 0usize;
    let mut queue = VecDeque::new();

    for seed in 0..positions.len() {
        if !core[seed] || labels[seed].is_some() {
            continue;
        }
        let cluster = next_cluster;
        next_cluster += 1;
        labels[seed] = Some(cluster);
        queue.push_back(seed);

        while let Some(point) = queue.pop_front() {
            for &(other, _) in &neighbors[point] {
                if core[other] && labels[other].is_none() {
                    labels[other] = Some(cluster);
                    queue.push_back(other);
                }
            }
        }
    }

    for point in 0..positions.len() {
        if core[point] {
            continue;
        }
        let label = neighbors[point]
            .iter()
            .filter(|(other, _)| core[*other])
            .min_by_key(|(other, dist_sq)| {
                let (x, y) = positions[*other];
                (*dist_sq, OrderedFloat(x), OrderedFloat(y))
            })
            .and_then(|(other, _)| labels[*other]);
        labels[point] = label;
    }
    Ok(labels)
}

/// One rally point per centroid at a random angle and a distance in
/// `[band.0 * eps, band.1 * eps]`, then a single pass pushing close pairs apart.
pub fn plan_rally_points<R: Rng + ?Sized>(
    centroids: &[Position],
    eps: f32,
    band: (f32, f32),
    min_separation: f32,
    rng: &mut R,
) -> Vec<Position> {
    let (near, far) = (band.0 * eps, band.1 * eps);
    let mut points: Vec<Position> = centroids
        .iter()
        .map(|centroid| {
            let angle = rng.random_range(0.0..TAU);
            let radius = rng.random_range(near..=far.max(near));
            centroid.offset(angle, radius)
        })
        .collect();

    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let offset = points[j] - points[i];
            let dist = offset.length();
            if dist >= min_separation {
                continue;
            }
            let axis = if dist > NEAR_ZERO {
                offset * (1.0 / dist)
            } else {
                Position::from_angle(rng.random_range(0.0..TAU))
            };
            let push = (min_separation - dist) * 0.5;
            points[i] = points[i] - axis * push;
            points[j] = points[j] + axis * push;
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::SmallRng, seq::SliceRandom};
    use std::collections::BTreeSet;

    fn blob(cx: f32, cy: f32, n: usize) -> Vec<(f32, f32)> {
        (0..n).map(|i| (cx + (i % 3) as f32 * 15.0, cy + (i / 3) as f32 * 15.0)).collect()
    }

    /// Clusters as sets of point identities, independent of label numbering.
    fn partition(points: &[(f32, f32)], labels: &[Option<usize>]) -> BTreeSet<BTreeSet<(i64, i64)>> {
        let key = |p: (f32, f32)| ((p.0 * 100.0) as i64, (p.1 * 100.0) as i64);
        let clusters = labels.iter().flatten().copied().max().map_or(0, |m| m + 1);
        (0..clusters)
            .map(|c| {
                points
                    .iter()
                    .zip(labels)
                    .filter(|(_, label)| **label == Some(c))
                    .map(|(p, _)| key(*p))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn separates_blobs_and_marks_noise() {
        let mut points = blob(0.0, 0.0, 6);
        points.extend(blob(500.0, 500.0, 5));
        points.push((2_000.0, 2_000.0));
        let labels = dbscan(&points, 40.0, 2).expect("clustering");
        assert!(labels[..6].iter().all(|l| *l == Some(0)));
        assert!(labels[6..11].iter().all(|l| *l == Some(1)));
        assert_eq!(labels[11], None);
    }

    #[test]
    fn minimum_neighbors_excludes_self() {
        // A lone pair: each point has exactly one neighbour.
        let points = [(0.0, 0.0), (10.0, 0.0)];
        assert_eq!(dbscan(&points, 20.0, 2).expect("clustering"), vec![None, None]);
        assert_eq!(
            dbscan(&points, 20.0, 1).expect("clustering"),
            vec![Some(0), Some(0)]
        );
    }

    #[test]
    fn partition_is_independent_of_input_order() {
        let mut points = blob(0.0, 0.0, 9);
        points.extend(blob(300.0, 0.0, 4));
        points.extend(blob(0.0, 400.0, 7));
        points.push((900.0, 900.0));
        points.push((-700.0, 50.0));
        let expected = partition(&points, &dbscan(&points, 30.0, 2).expect("clustering"));
        assert_eq!(expected.len(), 3);

        let mut rng = SmallRng::seed_from_u64(17);
        for _ in 0..10 {
            points.shuffle(&mut rng);
            let labels = dbscan(&points, 30.0, 2).expect("clustering");
            assert_eq!(partition(&points, &labels), expected);
        }
    }

    #[test]
    fn contested_border_point_joins_the_same_cluster_in_any_order() {
        let left = [(0.0, 0.0), (5.0, 0.0), (0.0, 5.0), (5.0, 5.0)];
        let right = [(30.0, 0.0), (35.0, 0.0), (30.0, 5.0), (35.0, 5.0)];
        let border = (17.5, 0.0);

        let mut left_first: Vec<(f32, f32)> = left.iter().chain(&right).copied().collect();
        left_first.push(border);
        let mut right_first: Vec<(f32, f32)> = right.iter().chain(&left).copied().collect();
        right_first.push(border);

        let a = dbscan(&left_first, 13.0, 3).expect("clustering");
        let b = dbscan(&right_first, 13.0, 3).expect("clustering");
        assert_eq!(partition(&left_first, &a), partition(&right_first, &b));
        // Equidistant cores: the lower coordinate wins.
        assert_eq!(a[8], a[1]);
        assert_eq!(b[8], b[5]);
    }

    #[test]
    fn border_points_never_bridge_clusters() {
        // The border point reaches both blobs but must not merge them.
        let mut points = vec![(0.0, 0.0), (5.0, 0.0), (0.0, 5.0), (5.0, 5.0)];
        points.extend([(30.0, 0.0), (35.0, 0.0), (30.0, 5.0), (35.0, 5.0)]);
        points.push((17.5, 0.0));
        let labels = dbscan(&points, 13.0, 3).expect("clustering");
        assert_eq!(partition(&points, &labels).len(), 2);
        assert_ne!(labels[0], labels[4]);
    }

    #[test]
    fn invalid_eps_is_an_error() {
        assert!(dbscan(&[(0.0, 0.0)], 0.0, 2).is_err());
    }

    #[test]
    fn rally_points_land_in_band_when_far_apart() {
        let mut rng = SmallRng::seed_from_u64(5);
        let centroids = [Position::new(0.0, 0.0), Position::new(5_000.0, 0.0)];
        let rally = plan_rally_points(&centroids, 90.0, (1.5, 3.0), 180.0, &mut rng);
        for (point, centroid) in rally.iter().zip(&centroids) {
            let d = point.distance(*centroid);
            assert!((135.0 - 1e-3..=270.0 + 1e-3).contains(&d), "distance {d}");
        }
    }

    #[test]
    fn close_rally_points_are_pushed_apart() {
        let mut rng = SmallRng::seed_from_u64(8);
        let centroids = [Position::new(0.0, 0.0), Position::new(1.0, 0.0)];
        let rally = plan_rally_points(&centroids, 10.0, (1.0, 1.0), 500.0, &mut rng);
        assert!(rally[0].distance(rally[1]) >= 500.0 - 1e-2);
    }
}

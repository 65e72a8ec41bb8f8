use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;

use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};

use super::{check_cancel, ClusterBackend, Grouping, GroupingParams};
use crate::constants::{EARTH_RADIUS_M, WORLD_LAT_MAX, WORLD_LON_MAX};
use crate::distance::haversine_distance;
use crate::error::{ClusterError, Result};
use crate::point::LocationPoint;

/// [lon, lat] in degrees, tagged with the input index.
type IndexedPoint = GeomWithData<[f64; 2], usize>;

// Widens search boxes slightly so float rounding never drops a point that
// sits exactly on the epsilon boundary.
const ENVELOPE_SLACK: f64 = 1.0 + 1e-9;

/// Density-based clustering (DBSCAN) over an R-tree.
///
/// Candidates come from a degree bounding box around each point and are
/// confirmed with the haversine distance. Points are visited in input order,
/// so a border point reachable from two clusters joins the one seeded first.
#[derive(Debug, Default, Clone, Copy)]
pub struct DensityBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Unvisited,
    Noise,
    Cluster(usize),
}

struct NeighborIndex<'a> {
    points: &'a [LocationPoint],
    valid: Vec<bool>,
    tree: RTree<IndexedPoint>,
    epsilon_m: f64,
}

impl<'a> NeighborIndex<'a> {
    fn build(points: &'a [LocationPoint], epsilon_m: f64) -> Self {
        let valid: Vec<bool> = points.iter().map(|p| p.has_valid_coordinates()).collect();
        let entries: Vec<IndexedPoint> = points
            .iter()
            .enumerate()
            .filter(|(i, _)| valid[*i])
            .map(|(i, p)| GeomWithData::new([p.longitude, p.latitude], i))
            .collect();
        Self {
            points,
            valid,
            tree: RTree::bulk_load(entries),
            epsilon_m,
        }
    }

    /// Indices within epsilon of point `i`, itself included, ascending.
    fn neighbors(&self, i: usize) -> Vec<usize> {
        if !self.valid[i] {
            return vec![i];
        }
        let p = &self.points[i];
        let mut out = Vec::new();
        for envelope in search_envelopes(p.latitude, p.longitude, self.epsilon_m) {
            for item in self.tree.locate_in_envelope(&envelope) {
                let q = &self.points[item.data];
                let dist = haversine_distance(p.latitude, p.longitude, q.latitude, q.longitude);
                if dist <= self.epsilon_m {
                    out.push(item.data);
                }
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// Degree boxes covering every point within `epsilon_m` of (lat, lon).
///
/// Returns two boxes when the longitude window crosses the antimeridian and a
/// full-longitude box when the search cap touches a pole.
fn search_envelopes(lat: f64, lon: f64, epsilon_m: f64) -> Vec<AABB<[f64; 2]>> {
    let angular = epsilon_m / EARTH_RADIUS_M * ENVELOPE_SLACK;
    let dlat = angular.to_degrees();
    let lat_min = (lat - dlat).max(-WORLD_LAT_MAX);
    let lat_max = (lat + dlat).min(WORLD_LAT_MAX);

    let full = |lat_min: f64, lat_max: f64| {
        vec![AABB::from_corners(
            [-WORLD_LON_MAX, lat_min],
            [WORLD_LON_MAX, lat_max],
        )]
    };

    if lat + dlat >= WORLD_LAT_MAX || lat - dlat <= -WORLD_LAT_MAX {
        return full(lat_min, lat_max);
    }
    let ratio = angular.sin() / lat.to_radians().cos();
    if !ratio.is_finite() || ratio >= 1.0 {
        return full(lat_min, lat_max);
    }
    let dlon = ratio.asin().to_degrees() * ENVELOPE_SLACK;
    let lon_min = lon - dlon;
    let lon_max = lon + dlon;

    let mut out = vec![AABB::from_corners(
        [lon_min.max(-WORLD_LON_MAX), lat_min],
        [lon_max.min(WORLD_LON_MAX), lat_max],
    )];
    if lon_min < -WORLD_LON_MAX {
        out.push(AABB::from_corners(
            [lon_min + 360.0, lat_min],
            [WORLD_LON_MAX, lat_max],
        ));
    }
    if lon_max > WORLD_LON_MAX {
        out.push(AABB::from_corners(
            [-WORLD_LON_MAX, lat_min],
            [lon_max - 360.0, lat_max],
        ));
    }
    out
}

/// Queue each unclaimed point at most once per run.
fn enqueue(
    candidates: Vec<usize>,
    labels: &[Label],
    queued: &mut [bool],
    queue: &mut VecDeque<usize>,
) {
    for k in candidates {
        if !queued[k] && matches!(labels[k], Label::Unvisited | Label::Noise) {
            queued[k] = true;
            queue.push_back(k);
        }
    }
}

impl ClusterBackend for DensityBackend {
    fn name(&self) -> &'static str {
        "density"
    }

    fn group(
        &self,
        points: &[LocationPoint],
        params: &GroupingParams,
        cancel: Option<&AtomicBool>,
    ) -> Result<Grouping> {
        let index = NeighborIndex::build(points, params.epsilon_m);
        let n = points.len();
        let mut labels = vec![Label::Unvisited; n];
        let mut queued = vec![false; n];
        let mut next_cluster = 0usize;

        for i in 0..n {
            check_cancel(cancel)?;
            if labels[i] != Label::Unvisited {
                continue;
            }
            let neighbors = index.neighbors(i);
            if neighbors.len() < params.min_samples {
                labels[i] = Label::Noise;
                continue;
            }

            let cluster_id = next_cluster;
            next_cluster += 1;
            labels[i] = Label::Cluster(cluster_id);
            queued[i] = true;

            let mut queue = VecDeque::new();
            enqueue(neighbors, &labels, &mut queued, &mut queue);
            while let Some(j) = queue.pop_front() {
                let was_noise = labels[j] == Label::Noise;
                labels[j] = Label::Cluster(cluster_id);
                if was_noise {
                    // Already known not to be core: border point.
                    continue;
                }
                let expansion = index.neighbors(j);
                if expansion.len() >= params.min_samples {
                    enqueue(expansion, &labels, &mut queued, &mut queue);
                }
            }
        }

        let mut grouping = Grouping {
            groups: vec![Vec::new(); next_cluster],
            noise: Vec::new(),
        };
        for (i, label) in labels.into_iter().enumerate() {
            match label {
                Label::Cluster(c) => grouping.groups[c].push(i),
                Label::Noise => grouping.noise.push(i),
                Label::Unvisited => {
                    return Err(ClusterError::Internal(format!(
                        "point {i} was never visited"
                    )))
                }
            }
        }
        Ok(grouping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_DEG_PER_M: f64 = 1.0 / 111_194.93;

    fn params(epsilon_m: f64, min_samples: usize) -> GroupingParams {
        GroupingParams {
            epsilon_m,
            min_samples,
        }
    }

    #[test]
    fn points_are_queued_once() {
        let labels = [Label::Unvisited, Label::Noise, Label::Cluster(0), Label::Unvisited];
        let mut queued = vec![false; labels.len()];
        let mut queue = VecDeque::new();
        enqueue(vec![0, 1, 2, 3], &labels, &mut queued, &mut queue);
        enqueue(vec![3, 1, 0], &labels, &mut queued, &mut queue);
        assert_eq!(queue, VecDeque::from(vec![0, 1, 3]));
    }

    #[test]
    fn dense_blob_forms_one_cluster() {
        let points: Vec<LocationPoint> = (0..400)
            .map(|i| LocationPoint::new(0.0, (i % 20) as f64 * TEST_DEG_PER_M))
            .collect();
        let grouping = DensityBackend.group(&points, &params(50.0, 5), None).unwrap();
        assert_eq!(grouping.groups.len(), 1);
        assert_eq!(grouping.groups[0].len(), 400);
    }

    #[test]
    fn chains_connect_transitively() {
        let points: Vec<LocationPoint> = (0..5)
            .map(|i| LocationPoint::new(0.0, i as f64 * 40.0 * TEST_DEG_PER_M))
            .collect();
        let grouping = DensityBackend.group(&points, &params(50.0, 2), None).unwrap();
        assert_eq!(grouping.groups, vec![vec![0, 1, 2, 3, 4]]);
        assert!(grouping.noise.is_empty());
    }

    #[test]
    fn border_point_is_not_expanded() {
        // 0..3 dense, 4 is a border of 3, 5 is within reach of 4 only.
        let offsets_m = [0.0, 5.0, 10.0, 15.0, 58.0, 100.0];
        let points: Vec<LocationPoint> = offsets_m
            .iter()
            .map(|m| LocationPoint::new(0.0, m * TEST_DEG_PER_M))
            .collect();
        let grouping = DensityBackend.group(&points, &params(45.0, 4), None).unwrap();
        assert_eq!(grouping.groups, vec![vec![0, 1, 2, 3, 4]]);
        assert_eq!(grouping.noise, vec![5]);
    }

    #[test]
    fn early_noise_point_becomes_border_later() {
        // Point 0 is visited first and has too few neighbours, then gets
        // claimed by the cluster seeded at point 1.
        let offsets_m = [-40.0, 0.0, 5.0, 10.0];
        let points: Vec<LocationPoint> = offsets_m
            .iter()
            .map(|m| LocationPoint::new(0.0, m * TEST_DEG_PER_M))
            .collect();
        let grouping = DensityBackend.group(&points, &params(42.0, 4), None).unwrap();
        assert_eq!(grouping.groups, vec![vec![0, 1, 2, 3]]);
        assert!(grouping.noise.is_empty());
    }

    #[test]
    fn neighbours_found_across_antimeridian() {
        let points = vec![
            LocationPoint::new(10.0, 179.9998),
            LocationPoint::new(10.0, -179.9998),
        ];
        let grouping = DensityBackend.group(&points, &params(100.0, 2), None).unwrap();
        assert_eq!(grouping.groups, vec![vec![0, 1]]);
    }

    #[test]
    fn neighbours_found_near_pole() {
        let points = vec![
            LocationPoint::new(89.9995, 0.0),
            LocationPoint::new(89.9995, 150.0),
        ];
        let grouping = DensityBackend.group(&points, &params(200.0, 2), None).unwrap();
        assert_eq!(grouping.groups, vec![vec![0, 1]]);
    }

    #[test]
    fn invalid_points_are_noise() {
        let points = vec![
            LocationPoint::new(0.0, 0.0),
            LocationPoint::new(f64::NAN, f64::NAN),
            LocationPoint::new(0.0, 0.0),
        ];
        let grouping = DensityBackend.group(&points, &params(10.0, 2), None).unwrap();
        assert_eq!(grouping.groups, vec![vec![0, 2]]);
        assert_eq!(grouping.noise, vec![1]);
    }

    #[test]
    fn envelope_covers_epsilon_boundary() {
        let boxes = search_envelopes(45.0, 7.0, 1000.0);
        assert_eq!(boxes.len(), 1);
        let lower = boxes[0].lower();
        let upper = boxes[0].upper();
        let dlat = (1000.0 / EARTH_RADIUS_M).to_degrees();
        assert!(upper[1] - 45.0 >= dlat);
        assert!(45.0 - lower[1] >= dlat);
        // Longitude window widens with latitude.
        assert!(upper[0] - 7.0 > dlat);
    }
}

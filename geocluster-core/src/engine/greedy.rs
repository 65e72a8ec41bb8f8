use std::sync::atomic::AtomicBool;

use super::{check_cancel, ClusterBackend, Grouping, GroupingParams};
use crate::distance::haversine_distance;
use crate::error::Result;
use crate::point::LocationPoint;

/// Seed-based grouping, O(n²), no spatial index.
///
/// Each unprocessed point seeds a group and absorbs every later unprocessed
/// point within epsilon of the seed. Absorbed points do not pull in their own
/// neighbours, so a chain of points spaced just under epsilon splits into
/// several groups. Groups smaller than `min_samples` are noise.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyBackend;

impl ClusterBackend for GreedyBackend {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn group(
        &self,
        points: &[LocationPoint],
        params: &GroupingParams,
        cancel: Option<&AtomicBool>,
    ) -> Result<Grouping> {
        let n = points.len();
        let valid: Vec<bool> = points.iter().map(|p| p.has_valid_coordinates()).collect();
        let mut processed = vec![false; n];
        let mut grouping = Grouping::default();

        for i in 0..n {
            check_cancel(cancel)?;
            if processed[i] {
                continue;
            }
            processed[i] = true;
            let seed = &points[i];
            let mut group = vec![i];
            if valid[i] {
                for j in (i + 1)..n {
                    if processed[j] || !valid[j] {
                        continue;
                    }
                    let other = &points[j];
                    let dist = haversine_distance(
                        seed.latitude,
                        seed.longitude,
                        other.latitude,
                        other.longitude,
                    );
                    if dist <= params.epsilon_m {
                        group.push(j);
                        processed[j] = true;
                    }
                }
            }
            if group.len() >= params.min_samples {
                grouping.groups.push(group);
            } else {
                grouping.noise.extend(group);
            }
        }

        grouping.noise.sort_unstable();
        Ok(grouping)
    }
}

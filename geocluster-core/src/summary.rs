use std::collections::BTreeMap;

use serde::Serialize;

use crate::cluster::{Coordinate, TimeSpan};
use crate::engine::ClusterResult;
use crate::significance::SignificanceLabel;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterOverview {
    pub id: usize,
    pub size: usize,
    pub center: Coordinate,
    pub radius_meters: f64,
    pub time_span: TimeSpan,
    pub sources: BTreeMap<String, usize>,
    pub most_common_source: Option<String>,
    /// `None` until the cluster has been analyzed.
    pub significance: Option<SignificanceLabel>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub num_clusters: usize,
    pub total_clustered_locations: usize,
    pub total_noise_points: usize,
    pub clusters: Vec<ClusterOverview>,
}

impl ClusterSummary {
    pub fn from_result(result: &ClusterResult) -> Self {
        let clusters = result
            .clusters
            .iter()
            .enumerate()
            .map(|(id, c)| ClusterOverview {
                id,
                size: c.len(),
                center: c.center(),
                radius_meters: c.radius_m(),
                time_span: c.time_span(),
                sources: c.source_histogram().clone(),
                most_common_source: c.most_common_source().map(str::to_string),
                significance: c.significance().map(|s| s.label),
            })
            .collect();
        Self {
            num_clusters: result.clusters.len(),
            total_clustered_locations: result.clustered_count(),
            total_noise_points: result.noise.len(),
            clusters,
        }
    }
}

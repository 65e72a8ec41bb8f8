//! Clustering engine: partitions points into clusters plus an explicit noise set.
//!
//! The backend is picked once when the engine is built. `cluster()` never
//! fails: insufficient data, invalid coordinates, cancellation and backend
//! errors all degrade to a well-formed result carrying [`Notice`]s that the
//! caller is expected to surface.

#[cfg(feature = "spatial-index")]
mod density;
mod greedy;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cluster::{Cluster, ClusterExport};
use crate::config::{BackendKind, ClusterConfig};
use crate::error::{ClusterError, Result};
use crate::point::LocationPoint;
use crate::significance::SignificanceAnalyzer;

#[cfg(feature = "spatial-index")]
pub use density::DensityBackend;
pub use greedy::GreedyBackend;

// Invalid points logged individually before switching to a summary line.
const MAX_INVALID_WARNINGS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupingParams {
    pub epsilon_m: f64,
    pub min_samples: usize,
}

/// Backend output: groups and noise as indices into the input slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grouping {
    pub groups: Vec<Vec<usize>>,
    pub noise: Vec<usize>,
}

pub trait ClusterBackend: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn group(
        &self,
        points: &[LocationPoint],
        params: &GroupingParams,
        cancel: Option<&AtomicBool>,
    ) -> Result<Grouping>;
}

pub(crate) fn check_cancel(cancel: Option<&AtomicBool>) -> Result<()> {
    match cancel {
        Some(flag) if flag.load(Ordering::Relaxed) => Err(ClusterError::Cancelled),
        _ => Ok(()),
    }
}

/// Conditions a caller should surface because result reliability differs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    FallbackBackend { requested: BackendKind, reason: String },
    InsufficientData { have: usize, need: usize },
    InvalidCoordinates { count: usize },
    Cancelled,
    Aborted { reason: String },
}

impl Notice {
    /// True when every input point was returned as noise without clustering.
    pub fn is_all_noise(&self) -> bool {
        matches!(
            self,
            Notice::InsufficientData { .. } | Notice::Cancelled | Notice::Aborted { .. }
        )
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::FallbackBackend { requested, reason } => write!(
                f,
                "degraded mode: requested '{}' backend unavailable ({}), using greedy fallback",
                requested.as_str(),
                reason
            ),
            Notice::InsufficientData { have, need } => write!(
                f,
                "not enough points to cluster (have {have}, need {need}); all points returned as noise"
            ),
            Notice::InvalidCoordinates { count } => write!(
                f,
                "{count} point(s) with invalid coordinates excluded from distance comparisons"
            ),
            Notice::Cancelled => write!(f, "clustering cancelled; all points returned as noise"),
            Notice::Aborted { reason } => write!(
                f,
                "clustering failed ({reason}); all points returned as noise"
            ),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClusterResult {
    pub clusters: Vec<Cluster>,
    pub noise: Vec<LocationPoint>,
    pub notices: Vec<Notice>,
    pub backend: &'static str,
}

impl ClusterResult {
    fn all_noise(points: &[LocationPoint], notices: Vec<Notice>, backend: &'static str) -> Self {
        Self {
            clusters: Vec::new(),
            noise: points.to_vec(),
            notices,
            backend,
        }
    }

    pub fn point_count(&self) -> usize {
        self.clustered_count() + self.noise.len()
    }

    pub fn clustered_count(&self) -> usize {
        self.clusters.iter().map(Cluster::len).sum()
    }

    pub fn is_degraded(&self) -> bool {
        !self.notices.is_empty()
    }

    /// Attach a significance report to every cluster.
    pub fn annotate(&mut self, analyzer: &SignificanceAnalyzer) {
        for cluster in &mut self.clusters {
            cluster.analyze(analyzer);
        }
    }

    /// Interchange forms; clusters without a stored report are labelled by `analyzer`.
    pub fn exports(&self, analyzer: &SignificanceAnalyzer) -> Vec<ClusterExport> {
        self.clusters.iter().map(|c| c.export(analyzer)).collect()
    }
}

#[derive(Debug)]
pub struct ClusterEngine {
    config: ClusterConfig,
    backend: Box<dyn ClusterBackend>,
    fallback: Option<Notice>,
    cancel: Option<Arc<AtomicBool>>,
    last: Option<ClusterResult>,
}

impl ClusterEngine {
    pub fn new(config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        let (backend, fallback) = match config.backend {
            BackendKind::Greedy => (Box::new(GreedyBackend) as Box<dyn ClusterBackend>, None),
            requested => match density_backend() {
                Ok(backend) => (backend, None),
                Err(err) => {
                    warn!(
                        "{}; falling back to greedy clustering (degraded mode)",
                        err
                    );
                    let notice = Notice::FallbackBackend {
                        requested,
                        reason: err.to_string(),
                    };
                    (Box::new(GreedyBackend) as Box<dyn ClusterBackend>, Some(notice))
                }
            },
        };
        debug!(backend = backend.name(), "cluster engine ready");
        Ok(Self {
            config,
            backend,
            fallback,
            cancel: None,
            last: None,
        })
    }

    /// Share a flag the backends poll once per seed; setting it ends the run
    /// with every point as noise.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn is_degraded(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn analyzer(&self) -> SignificanceAnalyzer {
        SignificanceAnalyzer::from_config(&self.config)
    }

    pub fn last_result(&self) -> Option<&ClusterResult> {
        self.last.as_ref()
    }

    /// Cluster with the configured epsilon and `min_samples`.
    pub fn cluster(&mut self, points: &[LocationPoint]) -> &ClusterResult {
        let params = GroupingParams {
            epsilon_m: self.config.epsilon_meters,
            min_samples: self.config.min_samples,
        };
        let result = self.run(points, &params);
        self.last.insert(result)
    }

    /// Cluster with explicit parameters for this run only.
    pub fn cluster_with(
        &mut self,
        points: &[LocationPoint],
        epsilon_m: f64,
        min_samples: usize,
    ) -> &ClusterResult {
        let params = GroupingParams {
            epsilon_m,
            min_samples,
        };
        let result = self.run(points, &params);
        self.last.insert(result)
    }

    fn run(&self, points: &[LocationPoint], params: &GroupingParams) -> ClusterResult {
        let backend = self.backend.name();
        let mut notices: Vec<Notice> = self.fallback.iter().cloned().collect();

        if !params.epsilon_m.is_finite() || params.epsilon_m <= 0.0 || params.min_samples == 0 {
            let err = ClusterError::Config(format!(
                "epsilon_m={} min_samples={}",
                params.epsilon_m, params.min_samples
            ));
            error!("{}", err);
            notices.push(Notice::Aborted {
                reason: err.to_string(),
            });
            return ClusterResult::all_noise(points, notices, backend);
        }

        let need = params.min_samples.max(self.config.min_dataset_size);
        if points.len() < need {
            let err = ClusterError::InsufficientData {
                have: points.len(),
                need,
            };
            warn!("{}; returning all points as noise", err);
            notices.push(Notice::InsufficientData {
                have: points.len(),
                need,
            });
            return ClusterResult::all_noise(points, notices, backend);
        }

        let invalid = log_invalid_points(points);
        if invalid > 0 {
            notices.push(Notice::InvalidCoordinates { count: invalid });
        }

        let grouping = self
            .backend
            .group(points, params, self.cancel.as_deref())
            .and_then(|g| check_partition(&g, points.len()).map(|_| g));
        let grouping = match grouping {
            Ok(g) => g,
            Err(ClusterError::Cancelled) => {
                warn!(backend = backend, "clustering cancelled; returning all points as noise");
                notices.push(Notice::Cancelled);
                return ClusterResult::all_noise(points, notices, backend);
            }
            Err(err) => {
                error!(backend = backend, "clustering failed: {}", err);
                notices.push(Notice::Aborted {
                    reason: err.to_string(),
                });
                return ClusterResult::all_noise(points, notices, backend);
            }
        };

        let mut groups = grouping.groups;
        for group in &mut groups {
            group.sort_unstable();
        }
        groups.sort_by_key(|g| g.first().copied().unwrap_or(usize::MAX));
        let clusters: Vec<Cluster> = groups
            .iter()
            .map(|g| Cluster::new(g.iter().map(|&i| points[i].clone()).collect()))
            .collect();
        let mut noise_idx = grouping.noise;
        noise_idx.sort_unstable();
        let noise: Vec<LocationPoint> = noise_idx.iter().map(|&i| points[i].clone()).collect();

        info!(
            backend = backend,
            clusters = clusters.len(),
            noise = noise.len(),
            "clustered {} points",
            points.len()
        );
        ClusterResult {
            clusters,
            noise,
            notices,
            backend,
        }
    }
}

#[cfg(feature = "spatial-index")]
fn density_backend() -> Result<Box<dyn ClusterBackend>> {
    Ok(Box::new(DensityBackend))
}

#[cfg(not(feature = "spatial-index"))]
fn density_backend() -> Result<Box<dyn ClusterBackend>> {
    Err(ClusterError::BackendUnavailable(
        "built without the spatial-index feature".to_string(),
    ))
}

fn log_invalid_points(points: &[LocationPoint]) -> usize {
    let mut count = 0;
    for (index, p) in points.iter().enumerate() {
        if p.has_valid_coordinates() {
            continue;
        }
        count += 1;
        if count <= MAX_INVALID_WARNINGS {
            let err = ClusterError::InvalidCoordinate {
                index,
                latitude: p.latitude,
                longitude: p.longitude,
            };
            warn!("{}; excluded from distance comparisons", err);
        }
    }
    if count > MAX_INVALID_WARNINGS {
        warn!("{} points with invalid coordinates in total", count);
    }
    count
}

/// Every input index must appear exactly once across groups and noise.
fn check_partition(grouping: &Grouping, n: usize) -> Result<()> {
    let mut seen = vec![false; n];
    let all = grouping.groups.iter().flatten().chain(grouping.noise.iter());
    for &i in all {
        if i >= n {
            return Err(ClusterError::Internal(format!(
                "backend returned index {i} for {n} points"
            )));
        }
        if seen[i] {
            return Err(ClusterError::Internal(format!(
                "backend assigned point {i} twice"
            )));
        }
        seen[i] = true;
    }
    if let Some(missing) = seen.iter().position(|s| !s) {
        return Err(ClusterError::Internal(format!(
            "backend dropped point {missing}"
        )));
    }
    if grouping.groups.iter().any(|g| g.is_empty()) {
        return Err(ClusterError::Internal("backend returned an empty group".into()));
    }
    Ok(())
}

//! Spatial clustering of timestamped location points with heuristic
//! significance labels.
//!
//! All distances are in meters. The engine is a pure in-memory transform:
//! no I/O, no global state.

pub mod cluster;
pub mod config;
pub mod constants;
pub mod distance;
pub mod engine;
pub mod error;
pub mod grid;
pub mod point;
pub mod significance;
pub mod summary;

pub use cluster::{Cluster, ClusterExport, Coordinate, TimeSpan};
pub use config::{BackendKind, ClusterConfig};
pub use distance::{haversine_distance, is_valid_coordinate};
pub use engine::{ClusterBackend, ClusterEngine, ClusterResult, GreedyBackend, Notice};
#[cfg(feature = "spatial-index")]
pub use engine::DensityBackend;
pub use error::{ClusterError, Result};
pub use grid::{density_grid, DensityGrid, GridBounds};
pub use point::LocationPoint;
pub use significance::{
    SignificanceAnalyzer, SignificanceCriteria, SignificanceLabel, SignificanceReport, TimeOfDay,
};
pub use summary::{ClusterOverview, ClusterSummary};

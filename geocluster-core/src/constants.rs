pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const WORLD_LAT_MAX: f64 = 90.0;
pub const WORLD_LON_MAX: f64 = 180.0;

pub const DEFAULT_EPSILON_M: f64 = 50.0;
pub const DEFAULT_MIN_SAMPLES: usize = 5;
pub const DEFAULT_MIN_DATASET_SIZE: usize = 0;
pub const DEFAULT_VISIT_GAP_SECONDS: i64 = 6 * 3600;

// Significance thresholds. Hand-tuned; calibration candidates.
pub const MIN_MEMBERS_FOR_SIGNIFICANCE: usize = 5;
pub const RESIDENCE_MIN_TIMESTAMPED: usize = 10;
pub const FREQUENT_MIN_MEMBERS: usize = 20;

pub const DEFAULT_SIGNIFICANT_MIN_DURATION_SECONDS: i64 = 3600;
pub const DEFAULT_SIGNIFICANT_MIN_VISITS: usize = 3;

pub const GRID_PADDING_FRACTION: f64 = 0.1;
pub const GRID_MIN_PADDING_DEG: f64 = 0.01;
pub const DEFAULT_GRID_RESOLUTION: usize = 100;

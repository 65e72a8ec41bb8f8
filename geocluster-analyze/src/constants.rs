pub const DEFAULT_MIN_POINTS: usize = 10;
pub const DEFAULT_MIN_VISITS: usize = 3;
pub const DEFAULT_MIN_DURATION_MINUTES: i64 = 60;
pub const SECS_PER_HOUR: f64 = 3600.0;
pub const DEFAULT_LOG_FILTER: &str = "geocluster_core=info,geocluster_analyze=info";

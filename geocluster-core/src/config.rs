use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_EPSILON_M, DEFAULT_MIN_DATASET_SIZE, DEFAULT_MIN_SAMPLES, DEFAULT_VISIT_GAP_SECONDS,
};
use crate::error::{ClusterError, Result};

/// Which clustering backend the engine should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Density backend when the spatial index is compiled in, greedy otherwise.
    #[default]
    Auto,
    Density,
    Greedy,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Auto => "auto",
            BackendKind::Density => "density",
            BackendKind::Greedy => "greedy",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendKind::Auto),
            "density" | "dbscan" => Ok(BackendKind::Density),
            "greedy" | "simple" => Ok(BackendKind::Greedy),
            other => Err(ClusterError::Config(format!("unknown backend '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClusterConfig {
    #[serde(default = "default_epsilon_meters")]
    pub epsilon_meters: f64,
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_visit_gap_seconds")]
    pub visit_gap_seconds: i64,
    /// Datasets smaller than this short-circuit to all-noise. 0 disables the check.
    #[serde(default)]
    pub min_dataset_size: usize,
    #[serde(default)]
    pub backend: BackendKind,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            epsilon_meters: DEFAULT_EPSILON_M,
            min_samples: DEFAULT_MIN_SAMPLES,
            visit_gap_seconds: DEFAULT_VISIT_GAP_SECONDS,
            min_dataset_size: DEFAULT_MIN_DATASET_SIZE,
            backend: BackendKind::Auto,
        }
    }
}

impl ClusterConfig {
    pub fn new(epsilon_meters: f64, min_samples: usize) -> Self {
        Self {
            epsilon_meters,
            min_samples,
            ..Self::default()
        }
    }

    pub fn with_min_dataset_size(mut self, min_dataset_size: usize) -> Self {
        self.min_dataset_size = min_dataset_size;
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_visit_gap_seconds(mut self, seconds: i64) -> Self {
        self.visit_gap_seconds = seconds;
        self
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(path)?;
        let cfg: ClusterConfig = serde_json::from_slice(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.epsilon_meters.is_finite() || self.epsilon_meters <= 0.0 {
            return Err(ClusterError::Config(format!(
                "epsilon_meters must be a positive finite number, got {}",
                self.epsilon_meters
            )));
        }
        if self.min_samples == 0 {
            return Err(ClusterError::Config("min_samples must be > 0".into()));
        }
        if self.visit_gap_seconds < 0 {
            return Err(ClusterError::Config(
                "visit_gap_seconds must not be negative".into(),
            ));
        }
        if chrono::Duration::try_seconds(self.visit_gap_seconds).is_none() {
            return Err(ClusterError::Config(format!(
                "visit_gap_seconds out of range, got {}",
                self.visit_gap_seconds
            )));
        }
        Ok(())
    }

    /// Smallest input size that is clustered at all.
    pub fn minimum_points(&self) -> usize {
        self.min_samples.max(self.min_dataset_size)
    }
}

fn default_epsilon_meters() -> f64 {
    DEFAULT_EPSILON_M
}

fn default_min_samples() -> usize {
    DEFAULT_MIN_SAMPLES
}

fn default_visit_gap_seconds() -> i64 {
    DEFAULT_VISIT_GAP_SECONDS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let cfg: ClusterConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, ClusterConfig::default());
    }

    #[test]
    fn partial_json_overrides_fields() {
        let cfg: ClusterConfig =
            serde_json::from_str(r#"{"epsilon_meters":250,"backend":"greedy","min_dataset_size":10}"#)
                .unwrap();
        assert_eq!(cfg.epsilon_meters, 250.0);
        assert_eq!(cfg.backend, BackendKind::Greedy);
        assert_eq!(cfg.min_samples, DEFAULT_MIN_SAMPLES);
        assert_eq!(cfg.minimum_points(), 10);
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(ClusterConfig::new(0.0, 2).validate().is_err());
        assert!(ClusterConfig::new(f64::NAN, 2).validate().is_err());
        assert!(ClusterConfig::new(100.0, 0).validate().is_err());
        assert!(ClusterConfig::new(100.0, 2)
            .with_visit_gap_seconds(-1)
            .validate()
            .is_err());
        assert!(ClusterConfig::new(100.0, 2)
            .with_visit_gap_seconds(i64::MAX / 2)
            .validate()
            .is_err());
        assert!(ClusterConfig::new(100.0, 2).validate().is_ok());
    }

    #[test]
    fn backend_kind_parses_aliases() {
        assert_eq!("DBSCAN".parse::<BackendKind>().unwrap(), BackendKind::Density);
        assert_eq!("simple".parse::<BackendKind>().unwrap(), BackendKind::Greedy);
        assert!("kmeans".parse::<BackendKind>().is_err());
    }

    #[test]
    fn load_reads_and_validates_file() {
        let path = std::env::temp_dir().join(format!(
            "geocluster-config-{}.json",
            std::process::id()
        ));
        fs::write(&path, r#"{"epsilon_meters":-5}"#).unwrap();
        assert!(matches!(
            ClusterConfig::load(&path),
            Err(ClusterError::Config(_))
        ));
        fs::write(&path, r#"{"epsilon_meters":75,"min_samples":3}"#).unwrap();
        let cfg = ClusterConfig::load(&path).unwrap();
        assert_eq!(cfg.min_samples, 3);
        let _ = fs::remove_file(&path);
    }
}

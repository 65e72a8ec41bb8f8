use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::distance::is_valid_coordinate;

/// A single observed location, as supplied by an upstream producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub context: String,
}

impl LocationPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp: None,
            source: String::new(),
            context: String::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn has_valid_coordinates(&self) -> bool {
        is_valid_coordinate(self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_missing_optional_fields() {
        let p: LocationPoint = serde_json::from_str(r#"{"latitude":1.5,"longitude":2.5}"#).unwrap();
        assert_eq!(p.latitude, 1.5);
        assert!(p.timestamp.is_none());
        assert!(p.source.is_empty());
        assert!(p.context.is_empty());
    }

    #[test]
    fn parses_rfc3339_timestamp_with_offset() {
        let p: LocationPoint = serde_json::from_str(
            r#"{"latitude":0,"longitude":0,"timestamp":"2024-03-02T22:15:00+01:00","source":"exif"}"#,
        )
        .unwrap();
        let ts = p.timestamp.unwrap();
        assert_eq!(ts.offset().local_minus_utc(), 3600);
        assert_eq!(p.source, "exif");
    }

    #[test]
    fn flags_invalid_coordinates() {
        assert!(LocationPoint::new(45.0, 7.0).has_valid_coordinates());
        assert!(!LocationPoint::new(f64::NAN, 7.0).has_valid_coordinates());
        assert!(!LocationPoint::new(45.0, 181.0).has_valid_coordinates());
    }
}

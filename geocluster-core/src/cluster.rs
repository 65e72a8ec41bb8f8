use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::distance::haversine_distance;
use crate::point::LocationPoint;
use crate::significance::{SignificanceAnalyzer, SignificanceReport};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
}

impl TimeSpan {
    pub fn duration(&self) -> Option<Duration> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// A group of points with derived center, radius and time span.
///
/// Derived attributes are recomputed on every membership change, so they are
/// always consistent with `members`. Not synchronized: callers sharing one
/// cluster across threads must lock it themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    members: Vec<LocationPoint>,
    center: Coordinate,
    radius_m: f64,
    time_span: TimeSpan,
    sources: BTreeMap<String, usize>,
    significance: Option<SignificanceReport>,
}

impl Cluster {
    pub fn new(members: Vec<LocationPoint>) -> Self {
        let mut cluster = Self {
            members,
            center: Coordinate {
                latitude: 0.0,
                longitude: 0.0,
            },
            radius_m: 0.0,
            time_span: TimeSpan::default(),
            sources: BTreeMap::new(),
            significance: None,
        };
        cluster.recompute();
        cluster
    }

    pub fn members(&self) -> &[LocationPoint] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn center(&self) -> Coordinate {
        self.center
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    pub fn time_span(&self) -> TimeSpan {
        self.time_span
    }

    pub fn source_histogram(&self) -> &BTreeMap<String, usize> {
        &self.sources
    }

    pub fn significance(&self) -> Option<&SignificanceReport> {
        self.significance.as_ref()
    }

    /// Source label with the most members; ties go to the label seen first
    /// in member order.
    pub fn most_common_source(&self) -> Option<&str> {
        let mut best: Option<(&str, usize)> = None;
        for m in &self.members {
            let count = self.sources.get(&m.source).copied().unwrap_or(0);
            match best {
                Some((_, best_count)) if count <= best_count => {}
                _ => best = Some((m.source.as_str(), count)),
            }
        }
        best.map(|(s, _)| s)
    }

    /// Rebuild center, radius, time span and source counts from `members`.
    ///
    /// Members with invalid coordinates still count toward membership but are
    /// left out of the geometry. Any stored significance is dropped since it
    /// no longer matches the membership.
    pub fn recompute(&mut self) {
        self.significance = None;
        self.sources.clear();
        for m in &self.members {
            *self.sources.entry(m.source.clone()).or_insert(0) += 1;
        }

        let mut start: Option<DateTime<FixedOffset>> = None;
        let mut end: Option<DateTime<FixedOffset>> = None;
        for ts in self.members.iter().filter_map(|m| m.timestamp) {
            start = Some(start.map_or(ts, |s| s.min(ts)));
            end = Some(end.map_or(ts, |e| e.max(ts)));
        }
        self.time_span = TimeSpan { start, end };

        let valid: Vec<&LocationPoint> = self
            .members
            .iter()
            .filter(|m| m.has_valid_coordinates())
            .collect();
        if valid.is_empty() {
            if let Some(first) = self.members.first() {
                self.center = Coordinate {
                    latitude: first.latitude,
                    longitude: first.longitude,
                };
            }
            self.radius_m = 0.0;
            return;
        }

        let n = valid.len() as f64;
        let lat = valid.iter().map(|m| m.latitude).sum::<f64>() / n;
        let lon = valid.iter().map(|m| m.longitude).sum::<f64>() / n;
        self.center = Coordinate {
            latitude: lat,
            longitude: lon,
        };

        let mut max_dist = 0.0;
        for m in &valid {
            let dist = haversine_distance(lat, lon, m.latitude, m.longitude);
            if dist > max_dist {
                max_dist = dist;
            }
        }
        self.radius_m = max_dist;
    }

    pub fn add(&mut self, point: LocationPoint) {
        self.members.push(point);
        self.recompute();
    }

    pub fn merge(&mut self, other: Cluster) {
        self.members.extend(other.members);
        self.recompute();
    }

    pub fn analyze(&mut self, analyzer: &SignificanceAnalyzer) -> &SignificanceReport {
        let report = analyzer.analyze(self);
        self.significance.insert(report)
    }

    /// Interchange form. A stored report is reused; otherwise `analyzer`
    /// labels the cluster for this export only.
    pub fn export(&self, analyzer: &SignificanceAnalyzer) -> ClusterExport {
        let significance = match &self.significance {
            Some(report) => report.clone(),
            None => analyzer.analyze(self),
        };
        ClusterExport {
            center: self.center,
            radius_meters: self.radius_m,
            member_count: self.members.len(),
            time_span: self.time_span,
            significance,
            members: self.members.clone(),
        }
    }
}

/// Plain interchange form handed to renderers, exporters and persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterExport {
    pub center: Coordinate,
    pub radius_meters: f64,
    pub member_count: usize,
    pub time_span: TimeSpan,
    pub significance: SignificanceReport,
    pub members: Vec<LocationPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::significance::SignificanceLabel;
    use chrono::TimeZone;

    const TEST_EPSILON: f64 = 1e-6;

    fn utc(day: u32, hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 5, day, hour, 0, 0)
            .unwrap()
    }

    fn assert_radius_consistent(cluster: &Cluster) {
        let c = cluster.center();
        let expected = cluster
            .members()
            .iter()
            .map(|m| haversine_distance(c.latitude, c.longitude, m.latitude, m.longitude))
            .fold(0.0, f64::max);
        assert!((cluster.radius_m() - expected).abs() < TEST_EPSILON);
    }

    #[test]
    fn single_member_has_zero_radius() {
        let cluster = Cluster::new(vec![LocationPoint::new(48.85, 2.35)]);
        assert_eq!(cluster.radius_m(), 0.0);
        assert_eq!(cluster.center().latitude, 48.85);
        assert_eq!(cluster.center().longitude, 2.35);
    }

    #[test]
    fn center_is_mean_and_radius_is_max_distance() {
        let cluster = Cluster::new(vec![
            LocationPoint::new(10.0, 20.0),
            LocationPoint::new(10.002, 20.0),
            LocationPoint::new(10.001, 20.003),
        ]);
        assert!((cluster.center().latitude - 10.001).abs() < TEST_EPSILON);
        assert!((cluster.center().longitude - 20.001).abs() < TEST_EPSILON);
        assert!(cluster.radius_m() > 0.0);
        assert_radius_consistent(&cluster);
    }

    #[test]
    fn add_and_merge_recompute() {
        let mut cluster = Cluster::new(vec![LocationPoint::new(0.0, 0.0)]);
        cluster.add(LocationPoint::new(0.0, 0.001));
        assert_eq!(cluster.len(), 2);
        assert!((cluster.center().longitude - 0.0005).abs() < TEST_EPSILON);
        assert_radius_consistent(&cluster);

        let other = Cluster::new(vec![
            LocationPoint::new(0.001, 0.0),
            LocationPoint::new(0.001, 0.001),
        ]);
        cluster.merge(other);
        assert_eq!(cluster.len(), 4);
        assert!((cluster.center().latitude - 0.0005).abs() < TEST_EPSILON);
        assert_radius_consistent(&cluster);
    }

    #[test]
    fn time_span_skips_untimestamped_members() {
        let cluster = Cluster::new(vec![
            LocationPoint::new(1.0, 1.0).with_timestamp(utc(3, 10)),
            LocationPoint::new(1.0, 1.0),
            LocationPoint::new(1.0, 1.0).with_timestamp(utc(1, 8)),
            LocationPoint::new(1.0, 1.0).with_timestamp(utc(2, 23)),
        ]);
        let span = cluster.time_span();
        assert_eq!(span.start, Some(utc(1, 8)));
        assert_eq!(span.end, Some(utc(3, 10)));
        assert_eq!(span.duration(), Some(Duration::hours(50)));
        assert_eq!(cluster.len(), 4);
    }

    #[test]
    fn untimestamped_cluster_has_empty_span() {
        let cluster = Cluster::new(vec![LocationPoint::new(1.0, 1.0)]);
        assert_eq!(cluster.time_span(), TimeSpan::default());
        assert!(cluster.time_span().duration().is_none());
    }

    #[test]
    fn source_histogram_and_most_common_source() {
        let cluster = Cluster::new(vec![
            LocationPoint::new(1.0, 1.0).with_source("exif"),
            LocationPoint::new(1.0, 1.0).with_source("gpx"),
            LocationPoint::new(1.0, 1.0).with_source("gpx"),
            LocationPoint::new(1.0, 1.0).with_source("csv"),
            LocationPoint::new(1.0, 1.0).with_source("csv"),
        ]);
        assert_eq!(cluster.source_histogram()["gpx"], 2);
        assert_eq!(cluster.source_histogram()["exif"], 1);
        assert_eq!(cluster.most_common_source(), Some("gpx"));
    }

    #[test]
    fn most_common_source_tie_goes_to_first_seen() {
        let cluster = Cluster::new(vec![
            LocationPoint::new(1.0, 1.0).with_source("photos"),
            LocationPoint::new(1.0, 1.0).with_source("checkins"),
            LocationPoint::new(1.0, 1.0).with_source("checkins"),
            LocationPoint::new(1.0, 1.0).with_source("photos"),
        ]);
        assert_eq!(cluster.most_common_source(), Some("photos"));
        assert_eq!(Cluster::new(Vec::new()).most_common_source(), None);
    }

    #[test]
    fn invalid_members_are_left_out_of_geometry() {
        let cluster = Cluster::new(vec![
            LocationPoint::new(5.0, 5.0),
            LocationPoint::new(f64::NAN, 5.0),
            LocationPoint::new(5.0, 5.002),
        ]);
        assert_eq!(cluster.len(), 3);
        assert!((cluster.center().longitude - 5.001).abs() < TEST_EPSILON);
        assert!(cluster.radius_m().is_finite());
    }

    #[test]
    fn export_labels_with_the_given_analyzer() {
        // Two bursts four hours apart: one visit under a 6 h gap, two under 1 h.
        let cluster = Cluster::new(
            [8, 8, 8, 12, 12]
                .iter()
                .map(|h| LocationPoint::new(1.0, 1.0).with_timestamp(utc(1, *h)))
                .collect(),
        );
        assert_eq!(cluster.export(&SignificanceAnalyzer::default()).significance.visits, 1);
        assert_eq!(cluster.export(&SignificanceAnalyzer::new(3600)).significance.visits, 2);
        assert!(cluster.significance().is_none());
    }

    #[test]
    fn membership_change_drops_stale_significance() {
        let mut cluster = Cluster::new(vec![LocationPoint::new(1.0, 1.0)]);
        cluster.analyze(&SignificanceAnalyzer::default());
        assert!(cluster.significance().is_some());
        cluster.add(LocationPoint::new(1.0, 1.0));
        assert!(cluster.significance().is_none());
    }

    #[test]
    fn export_uses_interchange_keys() {
        let cluster = Cluster::new(vec![
            LocationPoint::new(40.0, -74.0)
                .with_timestamp(utc(1, 9))
                .with_source("exif")
                .with_context("photo"),
            LocationPoint::new(40.0001, -74.0001),
        ]);
        let export = cluster.export(&SignificanceAnalyzer::default());
        assert_eq!(export.member_count, 2);
        assert_eq!(export.significance.label, SignificanceLabel::Unknown);

        let value = serde_json::to_value(&export).unwrap();
        for key in [
            "center",
            "radius_meters",
            "member_count",
            "time_span",
            "significance",
            "members",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert!(value["center"]["latitude"].is_number());
        assert!(value["time_span"]["start"].is_string());
        assert!(value["significance"]["visits"].is_number());
        assert!(value["significance"]["time_of_day_histogram"].is_object());
        assert!(value["members"][1]["timestamp"].is_null());
        assert_eq!(value["members"][0]["context"], "photo");
        assert!(value["significance"].get("most_common_time").is_none());

        let back: ClusterExport = serde_json::from_value(value).unwrap();
        assert_eq!(back.member_count, 2);
        assert_eq!(back.members[0].source, "exif");
        assert_eq!(back.time_span, export.time_span);
    }
}

//! Heuristic behavioral labels for clusters.
//!
//! The analyzer looks only at member timestamps: hour-of-day bands, weekday
//! frequencies and the number of separate visits. Labels are best-effort and
//! never authoritative.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::config::ClusterConfig;
use crate::constants::{
    DEFAULT_SIGNIFICANT_MIN_DURATION_SECONDS, DEFAULT_SIGNIFICANT_MIN_VISITS,
    DEFAULT_VISIT_GAP_SECONDS, FREQUENT_MIN_MEMBERS, MIN_MEMBERS_FOR_SIGNIFICANCE,
    RESIDENCE_MIN_TIMESTAMPED,
};

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    /// Tie-break order for "most common" selection.
    pub const ALL: [TimeOfDay; 4] = [
        TimeOfDay::Morning,
        TimeOfDay::Afternoon,
        TimeOfDay::Evening,
        TimeOfDay::Night,
    ];

    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=21 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }

    fn index(&self) -> usize {
        match self {
            TimeOfDay::Morning => 0,
            TimeOfDay::Afternoon => 1,
            TimeOfDay::Evening => 2,
            TimeOfDay::Night => 3,
        }
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignificanceLabel {
    #[serde(rename = "Unknown")]
    Unknown,
    #[serde(rename = "likely workplace or regular morning location")]
    Workplace,
    #[serde(rename = "likely residence")]
    Residence,
    #[serde(rename = "possible weekend activity location")]
    WeekendActivity,
    #[serde(rename = "frequently visited location")]
    FrequentlyVisited,
    #[serde(rename = "regular visited location")]
    RegularlyVisited,
}

impl SignificanceLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignificanceLabel::Unknown => "Unknown",
            SignificanceLabel::Workplace => "likely workplace or regular morning location",
            SignificanceLabel::Residence => "likely residence",
            SignificanceLabel::WeekendActivity => "possible weekend activity location",
            SignificanceLabel::FrequentlyVisited => "frequently visited location",
            SignificanceLabel::RegularlyVisited => "regular visited location",
        }
    }
}

impl std::fmt::Display for SignificanceLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceReport {
    pub visits: usize,
    pub label: SignificanceLabel,
    pub time_of_day_histogram: BTreeMap<String, usize>,
    pub day_of_week_histogram: BTreeMap<String, usize>,
    #[serde(skip)]
    pub most_common_time: Option<TimeOfDay>,
    #[serde(skip)]
    pub most_common_day: Option<Weekday>,
}

impl SignificanceReport {
    fn unknown() -> Self {
        Self::from_counts(0, SignificanceLabel::Unknown, &[0; 4], &[0; 7], None, None)
    }

    fn from_counts(
        visits: usize,
        label: SignificanceLabel,
        bands: &[usize; 4],
        days: &[usize; 7],
        most_common_time: Option<TimeOfDay>,
        most_common_day: Option<Weekday>,
    ) -> Self {
        let time_of_day_histogram = TimeOfDay::ALL
            .iter()
            .map(|band| (band.as_str().to_string(), bands[band.index()]))
            .collect();
        let day_of_week_histogram = WEEKDAYS
            .iter()
            .enumerate()
            .map(|(i, day)| (weekday_name(*day).to_string(), days[i]))
            .collect();
        Self {
            visits,
            label,
            time_of_day_histogram,
            day_of_week_histogram,
            most_common_time,
            most_common_day,
        }
    }
}

/// Minimum duration OR minimum visit count for a cluster to count as significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignificanceCriteria {
    pub min_duration: Duration,
    pub min_visits: usize,
}

impl Default for SignificanceCriteria {
    fn default() -> Self {
        Self {
            min_duration: Duration::seconds(DEFAULT_SIGNIFICANT_MIN_DURATION_SECONDS),
            min_visits: DEFAULT_SIGNIFICANT_MIN_VISITS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignificanceAnalyzer {
    visit_gap: Duration,
}

impl Default for SignificanceAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_VISIT_GAP_SECONDS)
    }
}

impl SignificanceAnalyzer {
    /// Out-of-range gaps saturate to the largest representable duration.
    pub fn new(visit_gap_seconds: i64) -> Self {
        let visit_gap = Duration::try_seconds(visit_gap_seconds.max(0)).unwrap_or(Duration::MAX);
        Self { visit_gap }
    }

    pub fn from_config(cfg: &ClusterConfig) -> Self {
        Self::new(cfg.visit_gap_seconds)
    }

    pub fn visit_gap(&self) -> Duration {
        self.visit_gap
    }

    pub fn analyze(&self, cluster: &Cluster) -> SignificanceReport {
        let timestamps: Vec<DateTime<FixedOffset>> = cluster
            .members()
            .iter()
            .filter_map(|m| m.timestamp)
            .collect();
        if cluster.len() < MIN_MEMBERS_FOR_SIGNIFICANCE || timestamps.is_empty() {
            return SignificanceReport::unknown();
        }

        let mut bands = [0usize; 4];
        let mut days = [0usize; 7];
        for ts in &timestamps {
            bands[TimeOfDay::from_hour(ts.hour()).index()] += 1;
            days[ts.weekday().num_days_from_monday() as usize] += 1;
        }

        let visits = self.count_visits(&timestamps);
        let most_common_time = TimeOfDay::ALL[first_max_index(&bands)];
        let most_common_day = WEEKDAYS[first_max_index(&days)];

        let weekday_count: usize = WEEKDAYS
            .iter()
            .zip(days.iter())
            .filter(|(d, _)| !is_weekend(**d))
            .map(|(_, c)| c)
            .sum();
        let weekend_count = timestamps.len() - weekday_count;

        let label = if most_common_time == TimeOfDay::Morning && weekday_count > weekend_count {
            SignificanceLabel::Workplace
        } else if most_common_time == TimeOfDay::Night
            && timestamps.len() > RESIDENCE_MIN_TIMESTAMPED
        {
            SignificanceLabel::Residence
        } else if is_weekend(most_common_day)
            && matches!(most_common_time, TimeOfDay::Afternoon | TimeOfDay::Evening)
        {
            SignificanceLabel::WeekendActivity
        } else if cluster.len() > FREQUENT_MIN_MEMBERS {
            SignificanceLabel::FrequentlyVisited
        } else {
            SignificanceLabel::RegularlyVisited
        };

        SignificanceReport::from_counts(
            visits,
            label,
            &bands,
            &days,
            Some(most_common_time),
            Some(most_common_day),
        )
    }

    /// Number of separate visits. A visit opens at a timestamp and absorbs
    /// everything within the quiet period of that opening timestamp.
    pub fn count_visits(&self, timestamps: &[DateTime<FixedOffset>]) -> usize {
        let mut sorted = timestamps.to_vec();
        sorted.sort();
        let Some((&first, rest)) = sorted.split_first() else {
            return 0;
        };
        let mut anchor = first;
        let mut visits = 1;
        for &ts in rest {
            if ts - anchor > self.visit_gap {
                visits += 1;
                anchor = ts;
            }
        }
        visits
    }

    pub fn is_significant(&self, cluster: &Cluster, criteria: &SignificanceCriteria) -> bool {
        let span = cluster.time_span();
        let (Some(start), Some(end)) = (span.start, span.end) else {
            return false;
        };
        let timestamps: Vec<DateTime<FixedOffset>> =
            cluster.members().iter().filter_map(|m| m.timestamp).collect();
        end - start >= criteria.min_duration
            || self.count_visits(&timestamps) >= criteria.min_visits
    }

    pub fn significant_clusters<'a>(
        &self,
        clusters: &'a [Cluster],
        criteria: &SignificanceCriteria,
    ) -> Vec<&'a Cluster> {
        clusters
            .iter()
            .filter(|c| self.is_significant(c, criteria))
            .collect()
    }
}

fn first_max_index(counts: &[usize]) -> usize {
    let mut best = 0;
    for (i, c) in counts.iter().enumerate() {
        if *c > counts[best] {
            best = i;
        }
    }
    best
}

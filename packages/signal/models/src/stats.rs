//! Aggregate and per-district statistics.
//!
//! [`AggregateStats`] mirrors the `POST /analytics/aggregate` response and
//! is replaced wholesale on every successful fetch. [`DistrictStats`] is
//! computed client-side from the loaded points and never cached.
//! [`TimeSeries`] mirrors `GET /analytics/timeseries`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::{NetworkType, Operator};

/// Speed statistics for one operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedStats {
    pub avg_speed: f64,
    pub min_speed: f64,
    pub max_speed: f64,
    pub total: u64,
}

/// Coverage statistics for one operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageStats {
    pub unique_locations: u64,
    pub avg_signal: f64,
}

/// Server-side summary for one district.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistrictSummary {
    pub name: String,
    pub total_signals: u64,
    pub operators: BTreeMap<String, u64>,
    pub network_types: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistrictAnalysis {
    pub districts: Vec<DistrictSummary>,
}

/// One heatmap sample. Consumers derive the weight from `signal` or
/// `speed` depending on the metric shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapPoint {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lng: f64,
    /// dBm, negative.
    pub signal: f64,
    pub speed: f64,
}

/// Snapshot returned by the aggregate statistics endpoint.
///
/// Every field defaults when absent, so a partial response still
/// deserializes. [`AggregateStats::default`] is the empty "no data"
/// snapshot substituted when a fetch fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateStats {
    pub total_signals: u64,
    pub average_battery: f64,
    pub signals_by_company: BTreeMap<String, u64>,
    pub signals_by_type: BTreeMap<String, u64>,
    pub speed_by_operator: BTreeMap<String, SpeedStats>,
    pub coverage_analysis: BTreeMap<String, CoverageStats>,
    pub geographic_distribution: BTreeMap<String, BTreeMap<String, u64>>,
    pub district_analysis: DistrictAnalysis,
    pub signal_heatmap: Vec<HeatmapPoint>,
}

impl AggregateStats {
    /// The zeroed snapshot used when statistics are unavailable.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when every field is at its default. A real response that
    /// carries only `total_signals: 0` is indistinguishable from the
    /// fallback and also reports empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Bucket width for [`TimeSeries`].
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TimeSeriesInterval {
    #[default]
    Hour,
    Day,
}

/// Measurement count and battery average for one time bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSeriesBucket {
    /// Bucket start as sent by the server (ISO 8601, no offset). `None`
    /// for rows without a timestamp.
    pub timestamp: Option<String>,
    pub count: u64,
    pub avg_battery: f64,
}

/// Measurement counts over time, oldest bucket first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSeries {
    pub interval: TimeSeriesInterval,
    pub data: Vec<TimeSeriesBucket>,
}

/// Per-operator figures within a district.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorDistrictStats {
    pub count: u64,
    /// Average signal in dBm (negative), 0 when `count` is 0.
    pub avg_signal: f64,
    /// Average speed, 0 when `count` is 0.
    pub avg_speed: f64,
}

/// On-demand statistics for the points inside one district boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistrictStats {
    pub total: u64,
    /// Average signal in dBm (negative), 0 when `total` is 0.
    pub average_signal: f64,
    pub average_speed: f64,
    /// One entry per known operator, zero-filled when absent.
    pub operators: BTreeMap<Operator, OperatorDistrictStats>,
    /// Points counted in `total` whose operator matched no known operator.
    pub unclassified_operators: u64,
    /// One entry per known network type, zero-filled when absent.
    pub network_types: BTreeMap<NetworkType, u64>,
    /// Points counted in `total` whose network type matched nothing.
    pub unclassified_network_types: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_aggregate_response_deserializes() {
        let stats: AggregateStats = serde_json::from_value(serde_json::json!({
            "success": true,
            "total_signals": 600_000,
            "average_battery": 71.4,
            "signals_by_company": { "TIGO": 250_000, "ENTEL": 200_000 },
            "district_analysis": {
                "districts": [{ "name": "D1", "total_signals": 12, "operators": { "VIVA": 12 } }]
            }
        }))
        .unwrap();

        assert_eq!(stats.total_signals, 600_000);
        assert_eq!(stats.signals_by_company["TIGO"], 250_000);
        assert_eq!(stats.district_analysis.districts[0].operators["VIVA"], 12);
        assert!(stats.signal_heatmap.is_empty());
        assert!(!stats.is_empty());
    }

    #[test]
    fn operator_breakdowns_use_backend_field_names() {
        let stats: AggregateStats = serde_json::from_value(serde_json::json!({
            "total_signals": 3,
            "speed_by_operator": {
                "TIGO": { "avg_speed": 12.5, "min_speed": 1.0, "max_speed": 30.0, "total": 3 }
            },
            "coverage_analysis": {
                "TIGO": { "unique_locations": 2, "avg_signal": -71.5 }
            },
            "signal_heatmap": [{ "lat": -17.78, "lng": -63.18, "signal": -60, "speed": 20 }]
        }))
        .unwrap();

        let speed = stats.speed_by_operator["TIGO"];
        assert!((speed.avg_speed - 12.5).abs() < f64::EPSILON);
        assert!((speed.min_speed - 1.0).abs() < f64::EPSILON);
        assert!((speed.max_speed - 30.0).abs() < f64::EPSILON);
        assert_eq!(speed.total, 3);

        let coverage = stats.coverage_analysis["TIGO"];
        assert_eq!(coverage.unique_locations, 2);
        assert!((coverage.avg_signal + 71.5).abs() < f64::EPSILON);

        let sample = stats.signal_heatmap[0];
        assert!((sample.signal + 60.0).abs() < f64::EPSILON);
        assert!((sample.speed - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_total_alone_reads_as_empty() {
        let stats: AggregateStats =
            serde_json::from_value(serde_json::json!({ "total_signals": 0 })).unwrap();
        assert!(stats.is_empty());
    }

    #[test]
    fn time_series_keeps_bucket_order() {
        let series: TimeSeries = serde_json::from_value(serde_json::json!({
            "interval": "day",
            "data": [
                { "timestamp": "2024-05-01T00:00:00", "count": 120, "avg_battery": 64.5 },
                { "timestamp": null, "count": 3, "avg_battery": 0 }
            ]
        }))
        .unwrap();

        assert_eq!(series.interval, TimeSeriesInterval::Day);
        assert_eq!(series.data.len(), 2);
        assert_eq!(series.data[0].timestamp.as_deref(), Some("2024-05-01T00:00:00"));
        assert_eq!(series.data[0].count, 120);
        assert_eq!(series.data[1].timestamp, None);
    }

    #[test]
    fn interval_parses_from_query_value() {
        assert_eq!("hour".parse(), Ok(TimeSeriesInterval::Hour));
        assert_eq!(TimeSeriesInterval::Day.as_ref(), "day");
        assert!("week".parse::<TimeSeriesInterval>().is_err());
    }

    #[test]
    fn empty_snapshot_is_zeroed() {
        let stats = AggregateStats::empty();
        assert_eq!(stats.total_signals, 0);
        assert!(stats.signals_by_type.is_empty());
        assert!(stats.is_empty());
    }
}

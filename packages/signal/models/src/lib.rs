#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Signal measurement, filter, and statistics types.
//!
//! A [`Point`] is one signal-quality measurement streamed from the backend.
//! Points accumulate in a ceiling-bounded, append-only [`PointCollection`]
//! for the lifetime of one load generation. [`FilterSet`] carries the
//! dashboard filter selection, and [`AggregateStats`] is the server-side
//! summary snapshot fetched independently of the point stream.

pub mod classify;
pub mod filters;
pub mod stats;

pub use classify::{Classified, NetworkType, Operator};
pub use filters::{FilterCategory, FilterOptions, FilterSet, NarrowingQuery};
pub use stats::{
    AggregateStats, DistrictStats, OperatorDistrictStats, TimeSeries, TimeSeriesBucket,
    TimeSeriesInterval,
};

use serde::{Deserialize, Serialize};

/// Operator / network-type placeholder for rows that carry no value.
pub const UNKNOWN: &str = "Unknown";

/// One signal measurement.
///
/// Immutable once received. Latitude and longitude are always present;
/// rows without a position never become a `Point`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Point {
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Signal strength in dBm (normally negative).
    pub signal: i32,
    /// Transfer speed, never negative.
    pub speed: f64,
    /// Operator identifier as reported by the device (e.g. `"TIGO"`).
    pub operator: String,
    /// Network type tag (e.g. `"WiFi"`, `"4G"`).
    pub network_type: String,
    /// Battery level 0-100, when reported.
    pub battery: Option<u8>,
}

impl Point {
    /// Classifies this point's operator against the known operators.
    #[must_use]
    pub fn operator_class(&self) -> Classified<Operator> {
        Operator::classify(&self.operator)
    }

    /// Classifies this point's network type against the known types.
    #[must_use]
    pub fn network_class(&self) -> Classified<NetworkType> {
        NetworkType::classify(&self.network_type)
    }
}

/// A signal row as it appears on the wire.
///
/// Accepts both the English column names used by `/signals` and the
/// Spanish keys used by push-channel `new_signal` payloads. Every field is
/// optional here; [`SignalRecord::into_point`] applies normalisation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignalRecord {
    #[serde(default, alias = "latitud", alias = "lat")]
    pub latitude: Option<f64>,
    #[serde(default, alias = "longitud", alias = "lng", alias = "lon")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub signal: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default, alias = "sim_operator", alias = "empresa")]
    pub operator: Option<String>,
    #[serde(default, alias = "tipo_senal")]
    pub network_type: Option<String>,
    #[serde(default, alias = "nivel_bateria")]
    pub battery: Option<f64>,
}

impl SignalRecord {
    /// Normalises the record into a [`Point`].
    ///
    /// Returns `None` when latitude or longitude is missing or not finite.
    /// Missing signal becomes 0, missing or negative speed becomes 0.0,
    /// missing operator and network type become [`UNKNOWN`], and a battery
    /// reading outside 0-100 is dropped.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn into_point(self) -> Option<Point> {
        let latitude = self.latitude.filter(|v| v.is_finite())?;
        let longitude = self.longitude.filter(|v| v.is_finite())?;

        let signal = self
            .signal
            .filter(|v| v.is_finite())
            .map_or(0, |v| v.round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32);
        let speed = self
            .speed
            .filter(|v| v.is_finite())
            .map_or(0.0, |v| v.max(0.0));
        let battery = self
            .battery
            .filter(|v| v.is_finite() && (0.0..=100.0).contains(v))
            .map(|v| v.round() as u8);

        Some(Point {
            latitude,
            longitude,
            signal,
            speed,
            operator: non_empty_or_unknown(self.operator),
            network_type: non_empty_or_unknown(self.network_type),
            battery,
        })
    }
}

fn non_empty_or_unknown(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_owned())
}

/// Ordered, append-only sequence of points for one load generation.
///
/// The length never exceeds the ceiling. Appends that would cross it are
/// truncated. [`PointCollection::reset`] is the only way to remove points
/// and is reserved for generation restarts.
#[derive(Debug, Clone)]
pub struct PointCollection {
    points: Vec<Point>,
    ceiling: usize,
}

impl PointCollection {
    /// Creates an empty collection bounded by `ceiling` points.
    #[must_use]
    pub const fn with_ceiling(ceiling: usize) -> Self {
        Self {
            points: Vec::new(),
            ceiling,
        }
    }

    /// Maximum number of points this collection will hold.
    #[must_use]
    pub const fn ceiling(&self) -> usize {
        self.ceiling
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of points that can still be appended.
    #[must_use]
    pub fn remaining_capacity(&self) -> usize {
        self.ceiling.saturating_sub(self.points.len())
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.remaining_capacity() == 0
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Point] {
        &self.points
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Point> {
        self.points.iter()
    }

    /// Appends a page of points in order, truncating at the ceiling.
    ///
    /// Returns how many points were appended.
    pub fn extend_page(&mut self, page: Vec<Point>) -> usize {
        let take = page.len().min(self.remaining_capacity());
        self.points.extend(page.into_iter().take(take));
        take
    }

    /// Appends a single point. Returns `false` if the collection is full.
    pub fn push(&mut self, point: Point) -> bool {
        if self.is_full() {
            return false;
        }
        self.points.push(point);
        true
    }

    /// Replaces the whole content with `points` (truncated at the ceiling).
    ///
    /// Used by the narrowed, non-incremental load path.
    pub fn replace(&mut self, points: Vec<Point>) -> usize {
        self.points.clear();
        self.extend_page(points)
    }

    /// Clears the collection for a new generation.
    pub fn reset(&mut self) {
        self.points.clear();
    }
}

impl<'a> IntoIterator for &'a PointCollection {
    type Item = &'a Point;
    type IntoIter = std::slice::Iter<'a, Point>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

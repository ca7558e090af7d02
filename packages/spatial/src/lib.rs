#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! District boundaries and point containment.
//!
//! A [`Boundary`] is a district outline loaded from `GeoJSON`. Containment
//! uses the even-odd ray casting rule against exterior rings only: interior
//! rings (holes) are not modelled, so a point inside a hole still counts as
//! inside the district. Points exactly on an edge are classified
//! deterministically but without any guarantee of which side they land on.
//!
//! [`district::compute_district_stats`] aggregates the loaded points that
//! fall inside a boundary.

pub mod district;

pub use district::compute_district_stats;

use geo::{BoundingRect, LineString, MultiPolygon, Polygon};
use geojson::GeoJson;

/// Errors that can occur while reading boundaries.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// The input is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    /// The geometry is not a `Polygon` or `MultiPolygon`.
    #[error("Unsupported geometry: {0}")]
    UnsupportedGeometry(String),

    /// The document holds no usable boundary.
    #[error("No boundary found in GeoJSON document")]
    Empty,
}

impl From<geojson::Error> for SpatialError {
    fn from(e: geojson::Error) -> Self {
        Self::GeoJson(Box::new(e))
    }
}

/// Axis-aligned bounding box in latitude/longitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Inclusive containment test.
    #[must_use]
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lng..=self.max_lng).contains(&lng)
    }
}

/// A district outline. Coordinates follow `GeoJSON`: `x` is longitude and
/// `y` is latitude.
#[derive(Debug, Clone, PartialEq)]
pub enum Boundary {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl From<Polygon<f64>> for Boundary {
    fn from(polygon: Polygon<f64>) -> Self {
        Self::Polygon(polygon)
    }
}

impl From<MultiPolygon<f64>> for Boundary {
    fn from(multi: MultiPolygon<f64>) -> Self {
        Self::MultiPolygon(multi)
    }
}

impl Boundary {
    /// Parses a single boundary from a `GeoJSON` geometry, feature, or the
    /// first polygonal feature of a feature collection.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the text is not `GeoJSON` or holds no
    /// polygonal geometry.
    pub fn from_geojson(text: &str) -> Result<Self, SpatialError> {
        parse_districts(text)?
            .into_iter()
            .next()
            .map(|(_, boundary)| boundary)
            .ok_or(SpatialError::Empty)
    }

    /// Exterior rings of every constituent polygon.
    pub fn exterior_rings(&self) -> impl Iterator<Item = &LineString<f64>> {
        let polygons: &[Polygon<f64>] = match self {
            Self::Polygon(p) => std::slice::from_ref(p),
            Self::MultiPolygon(mp) => &mp.0,
        };
        polygons.iter().map(Polygon::exterior)
    }

    /// Bounding box of the whole boundary, `None` for empty geometry.
    #[must_use]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let rect = match self {
            Self::Polygon(p) => p.bounding_rect(),
            Self::MultiPolygon(mp) => mp.bounding_rect(),
        }?;
        Some(BoundingBox {
            min_lat: rect.min().y,
            max_lat: rect.max().y,
            min_lng: rect.min().x,
            max_lng: rect.max().x,
        })
    }

    /// Exact containment: inside any exterior ring.
    #[must_use]
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        self.exterior_rings()
            .any(|ring| ring_contains(ring, lat, lng))
    }
}

/// Even-odd ray casting against one ring.
///
/// Casts a ray from the point towards increasing latitude and counts the
/// ring edges it crosses. Edges are treated as half-open in longitude so a
/// ray through a vertex is counted once.
#[must_use]
pub fn ring_contains(ring: &LineString<f64>, lat: f64, lng: f64) -> bool {
    let mut inside = false;
    for edge in ring.lines() {
        let (a, b) = (edge.start, edge.end);
        if (a.x > lng) != (b.x > lng) {
            let crossing_lat = a.y + (lng - a.x) * (b.y - a.y) / (b.x - a.x);
            if lat < crossing_lat {
                inside = !inside;
            }
        }
    }
    inside
}

/// Parses every polygonal boundary in a `GeoJSON` document.
///
/// Features are named from their `name`, `NAME`, or `distrito` property,
/// falling back to `district-<index>`. Non-polygonal features are skipped.
///
/// # Errors
///
/// Returns [`SpatialError`] if the text is not `GeoJSON`, or if a bare
/// geometry is not polygonal.
pub fn parse_districts(text: &str) -> Result<Vec<(String, Boundary)>, SpatialError> {
    let geojson: GeoJson = text.parse()?;

    match geojson {
        GeoJson::Geometry(geometry) => Ok(vec![("district-0".to_owned(), to_boundary(geometry)?)]),
        GeoJson::Feature(feature) => Ok(feature_boundary(0, feature).into_iter().collect()),
        GeoJson::FeatureCollection(collection) => Ok(collection
            .features
            .into_iter()
            .enumerate()
            .filter_map(|(index, feature)| feature_boundary(index, feature))
            .collect()),
    }
}

fn feature_boundary(index: usize, feature: geojson::Feature) -> Option<(String, Boundary)> {
    let name = ["name", "NAME", "distrito"]
        .iter()
        .find_map(|key| feature.property(*key).and_then(|v| v.as_str()))
        .map_or_else(|| format!("district-{index}"), str::to_owned);

    let geometry = feature.geometry?;
    match to_boundary(geometry) {
        Ok(boundary) => Some((name, boundary)),
        Err(e) => {
            log::warn!("Skipping feature {name}: {e}");
            None
        }
    }
}

fn to_boundary(geometry: geojson::Geometry) -> Result<Boundary, SpatialError> {
    let geometry: geo::Geometry<f64> = geometry.try_into()?;
    match geometry {
        geo::Geometry::Polygon(p) => Ok(Boundary::Polygon(p)),
        geo::Geometry::MultiPolygon(mp) => Ok(Boundary::MultiPolygon(mp)),
        other => Err(SpatialError::UnsupportedGeometry(
            geometry_name(&other).to_owned(),
        )),
    }
}

const fn geometry_name(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        _ => "non-polygonal geometry",
    }
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;

    /// Square with corners (lat, lng) (0,0), (0,10), (10,10), (10,0).
    fn square() -> Boundary {
        Boundary::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0)
        ])
    }

    #[test]
    fn square_classifies_inside_and_outside() {
        let boundary = square();
        assert!(boundary.contains(5.0, 5.0));
        assert!(!boundary.contains(15.0, 15.0));
        assert!(!boundary.contains(-1.0, 5.0));
        assert!(!boundary.contains(5.0, 10.5));
    }

    #[test]
    fn edge_point_is_classified_consistently() {
        let boundary = square();
        let first = boundary.contains(0.0, 5.0);
        for _ in 0..3 {
            assert_eq!(boundary.contains(0.0, 5.0), first);
        }
        // Southern edge falls inside under the half-open crossing rule.
        assert!(first);
    }

    #[test]
    fn concave_ring() {
        // U shape opening to the north.
        let boundary = Boundary::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 6.0, y: 0.0),
            (x: 6.0, y: 6.0),
            (x: 4.0, y: 6.0),
            (x: 4.0, y: 2.0),
            (x: 2.0, y: 2.0),
            (x: 2.0, y: 6.0),
            (x: 0.0, y: 6.0)
        ]);
        assert!(boundary.contains(1.0, 3.0));
        assert!(boundary.contains(4.0, 1.0));
        assert!(!boundary.contains(4.0, 3.0));
    }

    #[test]
    fn multipolygon_matches_any_part_and_ignores_holes() {
        let with_hole = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)]),
            vec![LineString::from(vec![
                (1.0, 1.0),
                (3.0, 1.0),
                (3.0, 3.0),
                (1.0, 3.0),
                (1.0, 1.0),
            ])],
        );
        let far = polygon![(x: 20.0, y: 20.0), (x: 22.0, y: 20.0), (x: 22.0, y: 22.0)];
        let boundary = Boundary::MultiPolygon(MultiPolygon(vec![with_hole, far]));

        assert!(boundary.contains(2.0, 2.0), "holes are not modelled");
        assert!(boundary.contains(20.5, 21.5));
        assert!(!boundary.contains(10.0, 10.0));
    }

    #[test]
    fn bounding_box_spans_all_parts() {
        let boundary = Boundary::MultiPolygon(MultiPolygon(vec![
            polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)],
            polygon![(x: -5.0, y: 3.0), (x: -4.0, y: 3.0), (x: -4.0, y: 7.0)],
        ]));
        let bbox = boundary.bounding_box().unwrap();
        assert_eq!(
            bbox,
            BoundingBox {
                min_lat: 0.0,
                max_lat: 7.0,
                min_lng: -5.0,
                max_lng: 1.0,
            }
        );
        assert!(bbox.contains(7.0, -5.0));
        assert!(!bbox.contains(7.1, 0.0));
    }

    #[test]
    fn parses_named_feature_collection() {
        let text = serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": { "name": "Distrito 1" },
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[-63.2, -17.8], [-63.1, -17.8], [-63.1, -17.7], [-63.2, -17.8]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {},
                    "geometry": { "type": "Point", "coordinates": [-63.0, -17.0] }
                },
                {
                    "type": "Feature",
                    "properties": {},
                    "geometry": {
                        "type": "MultiPolygon",
                        "coordinates": [[[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]]
                    }
                }
            ]
        })
        .to_string();

        let districts = parse_districts(&text).unwrap();
        assert_eq!(districts.len(), 2);
        assert_eq!(districts[0].0, "Distrito 1");
        assert!(matches!(districts[0].1, Boundary::Polygon(_)));
        assert_eq!(districts[1].0, "district-2");
        assert!(matches!(districts[1].1, Boundary::MultiPolygon(_)));
    }

    #[test]
    fn bare_point_geometry_is_rejected() {
        let text = r#"{"type":"Point","coordinates":[1.0,2.0]}"#;
        assert!(matches!(
            Boundary::from_geojson(text),
            Err(SpatialError::UnsupportedGeometry(_))
        ));
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(
            Boundary::from_geojson("not json"),
            Err(SpatialError::GeoJson(_))
        ));
    }
}

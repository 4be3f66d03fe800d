//! GeoJSON geometry validation.
//!
//! [`parse_geometry`] decodes a JSON value into a [`Geometry`] and then applies
//! the per-kind structural rules of [`validate`]:
//!
//! | Kind            | Rule                                                  |
//! |-----------------|-------------------------------------------------------|
//! | Point           | exactly two finite coordinates                        |
//! | LineString      | at least 2 positions                                  |
//! | Polygon         | at least one ring; each ring has 4+ positions, closed |
//! | MultiPoint      | at least one position                                 |
//! | MultiLineString | at least one member, each a valid `LineString`        |
//! | MultiPolygon    | at least one member, each a valid `Polygon`           |
//!
//! Both functions are pure and never panic; every rejection carries the JSON
//! path of the offending element.

use serde_json::Value;
use spatial_features_sdk::{Geometry, GeometryKind, Position};

use super::error::DomainError;

/// Root path used in violation reports.
pub const GEOMETRY_FIELD: &str = "geometry";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryViolation {
    pub field: String,
    pub message: String,
}

impl GeometryViolation {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

type Verdict<T> = Result<T, GeometryViolation>;

/// Decode and validate a GeoJSON geometry object.
///
/// # Errors
/// Returns a [`GeometryViolation`] describing the first structural problem found.
pub fn parse_geometry(value: &Value) -> Verdict<Geometry> {
    parse_geometry_at(value, GEOMETRY_FIELD)
}

/// Same as [`parse_geometry`], reporting violations under `field`.
///
/// # Errors
/// Returns a [`GeometryViolation`] describing the first structural problem found.
pub fn parse_geometry_at(value: &Value, field: &str) -> Verdict<Geometry> {
    let obj = value
        .as_object()
        .ok_or_else(|| GeometryViolation::new(field, "geometry must be a GeoJSON object"))?;

    let tag = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| GeometryViolation::new(field, "geometry is missing a string 'type'"))?;

    let kind = GeometryKind::from_geojson_type(tag).ok_or_else(|| {
        GeometryViolation::new(
            format!("{field}.type"),
            format!("unsupported geometry type '{tag}'"),
        )
    })?;

    let coords = obj.get("coordinates").ok_or_else(|| {
        GeometryViolation::new(field, format!("{tag} geometry is missing 'coordinates'"))
    })?;
    let path = format!("{field}.coordinates");

    let geometry = match kind {
        GeometryKind::Point => Geometry::Point(decode_point(coords, &path)?),
        GeometryKind::LineString => Geometry::LineString(decode_positions(coords, &path)?),
        GeometryKind::MultiPoint => Geometry::MultiPoint(decode_positions(coords, &path)?),
        GeometryKind::Polygon => Geometry::Polygon(decode_rings(coords, &path)?),
        GeometryKind::MultiLineString => Geometry::MultiLineString(decode_rings(coords, &path)?),
        GeometryKind::MultiPolygon => {
            let members = as_array(coords, &path)?;
            let polygons = members
                .iter()
                .enumerate()
                .map(|(i, p)| decode_rings(p, &format!("{path}[{i}]")))
                .collect::<Verdict<Vec<_>>>()?;
            Geometry::MultiPolygon(polygons)
        }
    };

    validate_at(&geometry, field)?;
    Ok(geometry)
}

/// Apply the per-kind structural rules to an already decoded geometry.
///
/// # Errors
/// Returns a [`GeometryViolation`] describing the first rule broken.
pub fn validate(geometry: &Geometry) -> Verdict<()> {
    validate_at(geometry, GEOMETRY_FIELD)
}

fn validate_at(geometry: &Geometry, field: &str) -> Verdict<()> {
    let path = format!("{field}.coordinates");
    match geometry {
        Geometry::Point(p) => check_finite(p, &path, "Point geometry must have two numeric coordinates"),
        Geometry::LineString(line) => check_line(line, &path),
        Geometry::Polygon(rings) => check_polygon(rings, &path),
        Geometry::MultiPoint(points) => {
            if points.is_empty() {
                return Err(GeometryViolation::new(
                    path,
                    "MultiPoint must contain at least one point",
                ));
            }
            points
                .iter()
                .enumerate()
                .try_for_each(|(i, p)| check_position(p, &format!("{path}[{i}]")))
        }
        Geometry::MultiLineString(lines) => {
            if lines.is_empty() {
                return Err(GeometryViolation::new(
                    path,
                    "MultiLineString must contain at least one LineString",
                ));
            }
            lines
                .iter()
                .enumerate()
                .try_for_each(|(i, line)| check_line(line, &format!("{path}[{i}]")))
        }
        Geometry::MultiPolygon(polygons) => {
            if polygons.is_empty() {
                return Err(GeometryViolation::new(
                    path,
                    "MultiPolygon must contain at least one Polygon",
                ));
            }
            polygons
                .iter()
                .enumerate()
                .try_for_each(|(i, rings)| check_polygon(rings, &format!("{path}[{i}]")))
        }
    }
}

/// Reject a geometry whose kind differs from the one the table declares.
/// A table without a declared kind accepts any of the six.
///
/// # Errors
/// Returns [`DomainError::GeometryKindMismatch`] on mismatch.
pub fn check_kind(expected: Option<GeometryKind>, geometry: &Geometry) -> Result<(), DomainError> {
    match expected {
        Some(expected) if expected != geometry.kind() => Err(DomainError::GeometryKindMismatch {
            expected,
            actual: geometry.kind(),
        }),
        _ => Ok(()),
    }
}

fn check_line(line: &[Position], path: &str) -> Verdict<()> {
    if line.len() < 2 {
        return Err(GeometryViolation::new(
            path,
            "LineString must have at least 2 points",
        ));
    }
    line.iter()
        .enumerate()
        .try_for_each(|(i, p)| check_position(p, &format!("{path}[{i}]")))
}

fn check_polygon(rings: &[Vec<Position>], path: &str) -> Verdict<()> {
    if rings.is_empty() {
        return Err(GeometryViolation::new(
            path,
            "Polygon must have at least one linear ring",
        ));
    }
    for (i, ring) in rings.iter().enumerate() {
        let ring_path = format!("{path}[{i}]");
        if ring.len() < 4 {
            return Err(GeometryViolation::new(
                ring_path,
                "Polygon ring must have at least 4 points",
            ));
        }
        for (j, p) in ring.iter().enumerate() {
            check_position(p, &format!("{ring_path}[{j}]"))?;
        }
        if !is_closed(ring) {
            return Err(GeometryViolation::new(
                ring_path,
                "Polygon ring must be closed (first and last points must be equal)",
            ));
        }
    }
    Ok(())
}

// Rings close on identical positions, not on approximately equal ones.
#[allow(clippy::float_cmp)]
fn is_closed(ring: &[Position]) -> bool {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) => first == last,
        _ => false,
    }
}

fn check_position(p: &Position, path: &str) -> Verdict<()> {
    check_finite(p, path, "position must have two numeric coordinates")
}

fn check_finite(p: &Position, path: &str, message: &str) -> Verdict<()> {
    if p.iter().all(|c| c.is_finite()) {
        Ok(())
    } else {
        Err(GeometryViolation::new(path, message))
    }
}

fn as_array<'a>(value: &'a Value, path: &str) -> Verdict<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| GeometryViolation::new(path, "expected an array"))
}

fn decode_point(value: &Value, path: &str) -> Verdict<Position> {
    decode_position(value, path, "Point geometry must have two numeric coordinates")
}

fn decode_position(value: &Value, path: &str, message: &str) -> Verdict<Position> {
    match value.as_array().map(Vec::as_slice) {
        Some([x, y]) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => Ok([x, y]),
            _ => Err(GeometryViolation::new(path, message)),
        },
        _ => Err(GeometryViolation::new(path, message)),
    }
}

fn decode_positions(value: &Value, path: &str) -> Verdict<Vec<Position>> {
    as_array(value, path)?
        .iter()
        .enumerate()
        .map(|(i, p)| {
            decode_position(
                p,
                &format!("{path}[{i}]"),
                "position must have two numeric coordinates",
            )
        })
        .collect()
}

fn decode_rings(value: &Value, path: &str) -> Verdict<Vec<Vec<Position>>> {
    as_array(value, path)?
        .iter()
        .enumerate()
        .map(|(i, ring)| decode_positions(ring, &format!("{path}[{i}]")))
        .collect()
}

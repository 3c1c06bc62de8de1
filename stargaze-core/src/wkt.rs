//! Well-known text encoding for layer shapes.
//!
//! Coordinates are written in `(lon lat)` order. The reader accepts exactly
//! what the writer produces plus arbitrary whitespace and lowercase tags.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::{BoundingBox, Coordinates};

/// Errors raised while building or reading geometries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WktError {
    /// A polygon needs at least a shell ring.
    #[error("polygon requires at least one ring")]
    EmptyPolygon,
    /// The geometry tag is not one this encoder writes.
    #[error("unsupported geometry type `{0}`")]
    UnsupportedType(String),
    /// The text does not follow the expected grammar.
    #[error("malformed geometry text: {0}")]
    Malformed(String),
    /// A coordinate component failed to parse.
    #[error("invalid coordinate `{0}`")]
    InvalidNumber(String),
}

/// A polygon with one shell ring and zero or more hole rings.
///
/// # Examples
/// ```
/// use stargaze_core::Coordinates;
/// use stargaze_core::wkt::Polygon;
///
/// let ring = vec![
///     Coordinates::new(0.0, 0.0),
///     Coordinates::new(0.0, 1.0),
///     Coordinates::new(1.0, 1.0),
///     Coordinates::new(0.0, 0.0),
/// ];
/// let polygon = Polygon::new(ring);
/// assert_eq!(polygon.to_string(), "POLYGON ((0 0, 1 0, 1 1, 0 0))");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    shell: Vec<Coordinates>,
    holes: Vec<Vec<Coordinates>>,
}

impl Polygon {
    /// Polygon bounded by `shell` with no holes.
    #[must_use]
    pub const fn new(shell: Vec<Coordinates>) -> Self {
        Self {
            shell,
            holes: Vec::new(),
        }
    }

    /// Add a hole ring.
    #[must_use]
    pub fn with_hole(mut self, hole: Vec<Coordinates>) -> Self {
        self.holes.push(hole);
        self
    }

    /// Add several hole rings.
    #[must_use]
    pub fn with_holes(mut self, holes: impl IntoIterator<Item = Vec<Coordinates>>) -> Self {
        self.holes.extend(holes);
        self
    }

    /// Build from rings where the first is the shell and the rest are holes.
    pub fn from_rings(rings: Vec<Vec<Coordinates>>) -> Result<Self, WktError> {
        let mut rings = rings.into_iter();
        let shell = rings.next().ok_or(WktError::EmptyPolygon)?;
        Ok(Self {
            shell,
            holes: rings.collect(),
        })
    }

    /// The outer ring.
    #[must_use]
    pub fn shell(&self) -> &[Coordinates] {
        &self.shell
    }

    /// Hole rings in insertion order.
    #[must_use]
    pub fn holes(&self) -> &[Vec<Coordinates>] {
        &self.holes
    }
}

impl From<BoundingBox> for Polygon {
    fn from(bbox: BoundingBox) -> Self {
        Self::new(vec![
            Coordinates::new(bbox.minlat(), bbox.minlon()),
            Coordinates::new(bbox.minlat(), bbox.maxlon()),
            Coordinates::new(bbox.maxlat(), bbox.maxlon()),
            Coordinates::new(bbox.maxlat(), bbox.minlon()),
            Coordinates::new(bbox.minlat(), bbox.minlon()),
        ])
    }
}

impl fmt::Display for Polygon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("POLYGON (")?;
        write_sequence(f, &self.shell)?;
        for hole in &self.holes {
            f.write_str(", ")?;
            write_sequence(f, hole)?;
        }
        f.write_str(")")
    }
}

/// Geometries produced by the importers.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// A single position.
    Point(Coordinates),
    /// An open or closed path.
    LineString(Vec<Coordinates>),
    /// A closed path.
    LinearRing(Vec<Coordinates>),
    /// An area with optional holes.
    Polygon(Polygon),
}

impl From<Polygon> for Geometry {
    fn from(polygon: Polygon) -> Self {
        Self::Polygon(polygon)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Point(point) => {
                f.write_str("POINT (")?;
                write_position(f, *point)?;
                f.write_str(")")
            }
            Self::LineString(points) => {
                f.write_str("LINESTRING ")?;
                write_sequence(f, points)
            }
            Self::LinearRing(points) => {
                f.write_str("LINEARRING ")?;
                write_sequence(f, points)
            }
            Self::Polygon(polygon) => polygon.fmt(f),
        }
    }
}

fn write_position(f: &mut fmt::Formatter<'_>, point: Coordinates) -> fmt::Result {
    write!(f, "{} {}", point.lon, point.lat)
}

fn write_sequence(f: &mut fmt::Formatter<'_>, points: &[Coordinates]) -> fmt::Result {
    f.write_str("(")?;
    for (index, point) in points.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        write_position(f, *point)?;
    }
    f.write_str(")")
}

impl FromStr for Geometry {
    type Err = WktError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        let open = trimmed
            .find('(')
            .ok_or_else(|| WktError::Malformed(trimmed.to_owned()))?;
        let (tag, body) = trimmed.split_at(open);
        let body = body.trim();
        match tag.trim().to_ascii_uppercase().as_str() {
            "POINT" => {
                let points = parse_sequence(body)?;
                match points.as_slice() {
                    [point] => Ok(Self::Point(*point)),
                    _ => Err(WktError::Malformed(body.to_owned())),
                }
            }
            "LINESTRING" => Ok(Self::LineString(parse_sequence(body)?)),
            "LINEARRING" => Ok(Self::LinearRing(parse_sequence(body)?)),
            "POLYGON" => {
                let inner = strip_parens(body)?;
                let rings = split_rings(inner)?
                    .into_iter()
                    .map(parse_sequence)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Polygon(Polygon::from_rings(rings)?))
            }
            other => Err(WktError::UnsupportedType(other.to_owned())),
        }
    }
}

fn strip_parens(text: &str) -> Result<&str, WktError> {
    text.trim()
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| WktError::Malformed(text.to_owned()))
}

fn parse_sequence(text: &str) -> Result<Vec<Coordinates>, WktError> {
    strip_parens(text)?
        .split(',')
        .map(parse_position)
        .collect()
}

fn parse_position(text: &str) -> Result<Coordinates, WktError> {
    let mut parts = text.split_whitespace();
    let (Some(lon), Some(lat), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(WktError::Malformed(text.trim().to_owned()));
    };
    let parse = |value: &str| {
        value
            .parse::<f64>()
            .map_err(|_| WktError::InvalidNumber(value.to_owned()))
    };
    Ok(Coordinates::new(parse(lat)?, parse(lon)?))
}

/// Split `(a), (b)` into `["(a)", "(b)"]` at top-level commas.
fn split_rings(text: &str) -> Result<Vec<&str>, WktError> {
    let mut rings = Vec::new();
    let mut depth = 0_usize;
    let mut start = None;
    for (index, ch) in text.char_indices() {
        match ch {
            '(' => {
                if depth == 0 {
                    start = Some(index);
                }
                depth += 1;
            }
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| WktError::Malformed(text.to_owned()))?;
                if depth == 0
                    && let Some(begin) = start.take()
                {
                    let ring = text
                        .get(begin..=index)
                        .ok_or_else(|| WktError::Malformed(text.to_owned()))?;
                    rings.push(ring);
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(WktError::Malformed(text.to_owned()));
    }
    Ok(rings)
}

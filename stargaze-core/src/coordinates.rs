//! Geographic value types shared by every layer of the pipeline.
//!
//! Coordinates are WGS84 degrees. Conversions into `geo` types map
//! `x = longitude` and `y = latitude`.

use std::fmt;

use geo::{Coord, Point, Rect};
use thiserror::Error;

/// A position on the globe in WGS84 degrees.
///
/// # Examples
/// ```
/// use stargaze_core::Coordinates;
///
/// let origin = Coordinates::new(50.0, 18.0);
/// let point = origin.to_point();
/// assert_eq!(point.x(), 18.0);
/// assert_eq!(point.y(), 50.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Coordinates {
    /// Latitude in degrees, positive north.
    pub lat: f64,
    /// Longitude in degrees, positive east.
    pub lon: f64,
}

impl Coordinates {
    /// Construct a coordinate pair.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Convert into a `geo` point with `x = lon` and `y = lat`.
    #[must_use]
    pub fn to_point(self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }

    /// Report whether both components are finite and inside WGS84 bounds.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl From<Coordinates> for Coord<f64> {
    fn from(value: Coordinates) -> Self {
        Coord {
            x: value.lon,
            y: value.lat,
        }
    }
}

impl From<Coord<f64>> for Coordinates {
    fn from(value: Coord<f64>) -> Self {
        Self::new(value.y, value.x)
    }
}

impl From<Point<f64>> for Coordinates {
    fn from(value: Point<f64>) -> Self {
        Self::new(value.y(), value.x())
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.lat, self.lon)
    }
}

/// Errors raised when constructing a [`BoundingBox`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoundingBoxError {
    /// One of the edges was NaN or infinite.
    #[error("bounding box edges must be finite")]
    NonFinite,
    /// The southern edge lies north of the northern edge.
    #[error("minimum latitude {minlat} exceeds maximum latitude {maxlat}")]
    InvertedLatitude {
        /// Southern edge.
        minlat: f64,
        /// Northern edge.
        maxlat: f64,
    },
    /// The western edge lies east of the eastern edge.
    #[error("minimum longitude {minlon} exceeds maximum longitude {maxlon}")]
    InvertedLongitude {
        /// Western edge.
        minlon: f64,
        /// Eastern edge.
        maxlon: f64,
    },
}

/// An axis-aligned latitude/longitude rectangle.
///
/// The constructor enforces `minlat <= maxlat` and `minlon <= maxlon`, so a
/// value of this type is always well formed.
///
/// # Examples
/// ```
/// use stargaze_core::BoundingBox;
///
/// let bounds = BoundingBox::new(49.98, 18.48, 50.02, 18.52)?;
/// assert_eq!(bounds.to_string(), "49.98,18.48,50.02,18.52");
/// assert!(BoundingBox::new(50.02, 18.48, 49.98, 18.52).is_err());
/// # Ok::<(), stargaze_core::BoundingBoxError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "RawBoundingBox")
)]
pub struct BoundingBox {
    minlat: f64,
    minlon: f64,
    maxlat: f64,
    maxlon: f64,
}

impl BoundingBox {
    /// Validate and construct a bounding box.
    pub fn new(
        minlat: f64,
        minlon: f64,
        maxlat: f64,
        maxlon: f64,
    ) -> Result<Self, BoundingBoxError> {
        if ![minlat, minlon, maxlat, maxlon]
            .iter()
            .all(|edge| edge.is_finite())
        {
            return Err(BoundingBoxError::NonFinite);
        }
        if minlat > maxlat {
            return Err(BoundingBoxError::InvertedLatitude { minlat, maxlat });
        }
        if minlon > maxlon {
            return Err(BoundingBoxError::InvertedLongitude { minlon, maxlon });
        }
        Ok(Self {
            minlat,
            minlon,
            maxlat,
            maxlon,
        })
    }

    /// Build a box whose edges are already known to be ordered and finite.
    pub(crate) const fn from_ordered(minlat: f64, minlon: f64, maxlat: f64, maxlon: f64) -> Self {
        Self {
            minlat,
            minlon,
            maxlat,
            maxlon,
        }
    }

    /// Southern edge.
    #[must_use]
    pub const fn minlat(&self) -> f64 {
        self.minlat
    }

    /// Western edge.
    #[must_use]
    pub const fn minlon(&self) -> f64 {
        self.minlon
    }

    /// Northern edge.
    #[must_use]
    pub const fn maxlat(&self) -> f64 {
        self.maxlat
    }

    /// Eastern edge.
    #[must_use]
    pub const fn maxlon(&self) -> f64 {
        self.maxlon
    }

    /// Convert into a `geo` rectangle (`x = lon`, `y = lat`).
    #[must_use]
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.minlon,
                y: self.minlat,
            },
            Coord {
                x: self.maxlon,
                y: self.maxlat,
            },
        )
    }

    /// Report whether `other` lies entirely inside this box.
    #[must_use]
    pub fn contains_box(&self, other: &Self) -> bool {
        self.minlat <= other.minlat
            && self.minlon <= other.minlon
            && self.maxlat >= other.maxlat
            && self.maxlon >= other.maxlon
    }

    /// Smallest box covering both inputs.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            minlat: self.minlat.min(other.minlat),
            minlon: self.minlon.min(other.minlon),
            maxlat: self.maxlat.max(other.maxlat),
            maxlon: self.maxlon.max(other.maxlon),
        }
    }
}

/// Renders `south,west,north,east`, the order Overpass expects.
impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.minlat, self.minlon, self.maxlat, self.maxlon
        )
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RawBoundingBox {
    minlat: f64,
    minlon: f64,
    maxlat: f64,
    maxlon: f64,
}

#[cfg(feature = "serde")]
impl TryFrom<RawBoundingBox> for BoundingBox {
    type Error = BoundingBoxError;

    fn try_from(raw: RawBoundingBox) -> Result<Self, Self::Error> {
        Self::new(raw.minlat, raw.minlon, raw.maxlat, raw.maxlon)
    }
}

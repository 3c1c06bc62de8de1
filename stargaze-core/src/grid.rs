//! Fixed-resolution tile grid and search-area geometry.

use geo::{BoundingRect, Destination, Geodesic, Intersects, LineString, Point, Polygon};

use crate::geohash::{self, GeohashError};
use crate::{BoundingBox, Coordinates};

/// Number of vertices approximating the geodesic search circle.
pub const SEARCH_AREA_VERTICES: u32 = 64;

/// A grid cell named by its geohash.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TileCell {
    /// Geohash of the cell.
    pub geohash: String,
    /// Extent of the cell.
    pub bbox: BoundingBox,
}

/// The geohash grid at a fixed precision.
///
/// # Examples
/// ```
/// use stargaze_core::{Coordinates, TileGrid};
///
/// let grid = TileGrid::default();
/// let cells = grid.cells_within(Coordinates::new(50.0, 18.0), 1_000.0)?;
/// assert_eq!(cells.len(), 1);
/// assert_eq!(cells[0].geohash, "u2uu3");
/// # Ok::<(), stargaze_core::geohash::GeohashError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    precision: usize,
}

impl TileGrid {
    /// Precision giving square cells of 180/4096 degrees.
    pub const DEFAULT_PRECISION: usize = 5;

    /// Create a grid at `precision` characters per geohash.
    pub fn new(precision: usize) -> Result<Self, GeohashError> {
        if (1..=geohash::MAX_PRECISION).contains(&precision) {
            Ok(Self { precision })
        } else {
            Err(GeohashError::InvalidPrecision(precision))
        }
    }

    /// Geohash length used by this grid.
    #[must_use]
    pub const fn precision(&self) -> usize {
        self.precision
    }

    /// Width and height of a cell in degrees.
    #[must_use]
    pub fn cell_size(&self) -> (f64, f64) {
        geohash::cell_size(self.precision)
    }

    /// The cell owning `coordinates`.
    pub fn cell_at(&self, coordinates: Coordinates) -> Result<TileCell, GeohashError> {
        let (x, y) = geohash::cell_indices(coordinates, self.precision)?;
        self.cell(x, y)
    }

    fn cell(&self, x: u32, y: u32) -> Result<TileCell, GeohashError> {
        Ok(TileCell {
            geohash: geohash::encode_indices(x, y, self.precision)?,
            bbox: geohash::bbox_for_indices(x, y, self.precision),
        })
    }

    /// Cells intersecting the search area around `origin`.
    ///
    /// Returns an empty list when `radius_m` is not a positive finite number.
    /// Each geohash appears once.
    pub fn cells_within(
        &self,
        origin: Coordinates,
        radius_m: f64,
    ) -> Result<Vec<TileCell>, GeohashError> {
        if !origin.is_valid() {
            return Err(GeohashError::InvalidCoordinates {
                lat: origin.lat,
                lon: origin.lon,
            });
        }
        let Some(area) = search_area(origin, radius_m) else {
            return Ok(Vec::new());
        };
        let Some(extent) = area.bounding_rect() else {
            return Ok(Vec::new());
        };

        let south_west = clamp(extent.min().y, extent.min().x);
        let north_east = clamp(extent.max().y, extent.max().x);
        let (min_x, min_y) = geohash::cell_indices(south_west, self.precision)?;
        let (max_x, max_y) = geohash::cell_indices(north_east, self.precision)?;

        let mut cells = Vec::new();
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let bbox = geohash::bbox_for_indices(x, y, self.precision);
                if bbox.to_rect().intersects(&area) {
                    cells.push(self.cell(x, y)?);
                }
            }
        }
        Ok(cells)
    }
}

impl Default for TileGrid {
    fn default() -> Self {
        Self {
            precision: Self::DEFAULT_PRECISION,
        }
    }
}

fn clamp(lat: f64, lon: f64) -> Coordinates {
    Coordinates::new(lat.clamp(-90.0, 90.0), lon.clamp(-180.0, 180.0))
}

/// Geodesic circle of `radius_m` metres around `origin`.
///
/// The ring is not split at the antimeridian, so search areas crossing it
/// cover only the side containing `origin`. Returns `None` for radii that are
/// not positive finite numbers.
#[must_use]
pub fn search_area(origin: Coordinates, radius_m: f64) -> Option<Polygon<f64>> {
    if !radius_m.is_finite() || radius_m <= 0.0 {
        return None;
    }
    let centre: Point<f64> = origin.to_point();
    let step = 360.0 / f64::from(SEARCH_AREA_VERTICES);
    let mut ring: Vec<Point<f64>> = (0..SEARCH_AREA_VERTICES)
        .map(|vertex| Geodesic.destination(centre, f64::from(vertex) * step, radius_m))
        .collect();
    if let Some(first) = ring.first().copied() {
        ring.push(first);
    }
    Some(Polygon::new(LineString::from(ring), Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn grid() -> TileGrid {
        TileGrid::default()
    }

    #[rstest]
    #[case(0)]
    #[case(13)]
    fn rejects_invalid_precision(#[case] precision: usize) {
        assert_eq!(
            TileGrid::new(precision),
            Err(GeohashError::InvalidPrecision(precision))
        );
    }

    #[rstest]
    fn default_grid_has_square_cells(grid: TileGrid) {
        let (width, height) = grid.cell_size();
        assert!((width - height).abs() < f64::EPSILON);
        assert!((width - 180.0 / 4096.0).abs() < f64::EPSILON);
    }

    #[rstest]
    #[case(0.0)]
    #[case(-5.0)]
    #[case(f64::NAN)]
    fn non_positive_radius_covers_nothing(grid: TileGrid, #[case] radius: f64) {
        let cells = grid
            .cells_within(Coordinates::new(50.0, 18.0), radius)
            .expect("valid origin");
        assert!(cells.is_empty());
    }

    #[rstest]
    fn small_radius_stays_in_one_cell(grid: TileGrid) {
        let cells = grid
            .cells_within(Coordinates::new(50.0, 18.0), 1_000.0)
            .expect("valid origin");
        let hashes: Vec<&str> = cells.iter().map(|cell| cell.geohash.as_str()).collect();
        assert_eq!(hashes, ["u2uu3"]);
    }

    #[rstest]
    fn larger_radius_spans_neighbours_once(grid: TileGrid) {
        let cells = grid
            .cells_within(Coordinates::new(50.0, 18.0), 5_000.0)
            .expect("valid origin");
        assert!(cells.len() > 1);
        let mut hashes: Vec<&str> = cells.iter().map(|cell| cell.geohash.as_str()).collect();
        hashes.sort_unstable();
        hashes.dedup();
        assert_eq!(hashes.len(), cells.len());
        assert!(hashes.contains(&"u2uu3"));
    }

    #[rstest]
    fn corner_origin_belongs_to_north_east_cell(grid: TileGrid) {
        let bbox = geohash::decode_bbox("u2uu3").expect("decode");
        let corner = Coordinates::new(bbox.minlat(), bbox.minlon());
        let cell = grid.cell_at(corner).expect("cell");
        assert_eq!(cell.geohash, "u2uu3");
    }

    #[rstest]
    fn search_area_is_closed_ring() {
        let area = search_area(Coordinates::new(50.0, 18.0), 1_000.0).expect("area");
        let ring = area.exterior();
        assert!(ring.is_closed());
        assert_eq!(ring.0.len(), 65);
    }

    #[rstest]
    fn rejects_invalid_origin(grid: TileGrid) {
        assert!(matches!(
            grid.cells_within(Coordinates::new(95.0, 0.0), 1_000.0),
            Err(GeohashError::InvalidCoordinates { .. })
        ));
    }
}

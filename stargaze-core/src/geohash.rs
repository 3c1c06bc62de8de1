//! Geohash codec over integer cell indices.
//!
//! A geohash of precision `p` names one cell of a regular grid with
//! `2^ceil(5p/2)` columns and `2^floor(5p/2)` rows. Bits are interleaved
//! starting with longitude and emitted five at a time in base 32.

use thiserror::Error;

use crate::{BoundingBox, Coordinates};

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Longest geohash accepted. Twelve characters keep both indices in `u32`.
pub const MAX_PRECISION: usize = 12;

/// Errors raised by the geohash codec.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeohashError {
    /// Precision outside `1..=MAX_PRECISION`.
    #[error("geohash precision {0} is outside 1..={MAX_PRECISION}")]
    InvalidPrecision(usize),
    /// A character outside the geohash alphabet.
    #[error("invalid geohash character `{0}`")]
    InvalidCharacter(char),
    /// A coordinate outside WGS84 bounds.
    #[error("coordinates ({lat}, {lon}) are outside WGS84 bounds")]
    InvalidCoordinates {
        /// Offending latitude.
        lat: f64,
        /// Offending longitude.
        lon: f64,
    },
    /// A cell index beyond the grid for the requested precision.
    #[error("cell index ({x}, {y}) is outside the grid at precision {precision}")]
    IndexOutOfRange {
        /// Column index.
        x: u32,
        /// Row index.
        y: u32,
        /// Requested precision.
        precision: usize,
    },
}

/// Number of longitude and latitude bits at `precision`.
#[must_use]
pub const fn bit_counts(precision: usize) -> (u32, u32) {
    let total = precision * 5;
    #[expect(
        clippy::cast_possible_truncation,
        reason = "precision is bounded by MAX_PRECISION"
    )]
    let lon = total.div_ceil(2) as u32;
    #[expect(
        clippy::cast_possible_truncation,
        reason = "precision is bounded by MAX_PRECISION"
    )]
    let lat = (total / 2) as u32;
    (lon, lat)
}

fn check_precision(precision: usize) -> Result<(), GeohashError> {
    if (1..=MAX_PRECISION).contains(&precision) {
        Ok(())
    } else {
        Err(GeohashError::InvalidPrecision(precision))
    }
}

/// Encode a column/row index pair into a geohash.
///
/// # Examples
/// ```
/// use stargaze_core::geohash;
///
/// assert_eq!(geohash::encode_indices(0, 0, 1)?, "0");
/// assert_eq!(geohash::encode_indices(7, 3, 1)?, "z");
/// # Ok::<(), stargaze_core::geohash::GeohashError>(())
/// ```
pub fn encode_indices(x: u32, y: u32, precision: usize) -> Result<String, GeohashError> {
    check_precision(precision)?;
    let (lon_bits, lat_bits) = bit_counts(precision);
    if u64::from(x) >> lon_bits != 0 || u64::from(y) >> lat_bits != 0 {
        return Err(GeohashError::IndexOutOfRange { x, y, precision });
    }

    let mut hash = String::with_capacity(precision);
    let (mut lon_left, mut lat_left) = (lon_bits, lat_bits);
    let mut chunk = 0_usize;
    for position in 0..precision * 5 {
        let bit = if position % 2 == 0 {
            lon_left -= 1;
            (x >> lon_left) & 1
        } else {
            lat_left -= 1;
            (y >> lat_left) & 1
        };
        chunk = (chunk << 1) | bit as usize;
        if position % 5 == 4 {
            hash.push(char::from(BASE32[chunk]));
            chunk = 0;
        }
    }
    Ok(hash)
}

/// Recover the column/row indices and precision of a geohash.
pub fn decode_indices(hash: &str) -> Result<(u32, u32, usize), GeohashError> {
    let precision = hash.chars().count();
    check_precision(precision)?;

    let (mut x, mut y) = (0_u32, 0_u32);
    let mut position = 0_usize;
    for ch in hash.chars() {
        let value = BASE32
            .iter()
            .position(|&symbol| char::from(symbol) == ch.to_ascii_lowercase())
            .ok_or(GeohashError::InvalidCharacter(ch))?;
        for shift in (0..5).rev() {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "base32 digits fit in five bits"
            )]
            let bit = ((value >> shift) & 1) as u32;
            if position % 2 == 0 {
                x = (x << 1) | bit;
            } else {
                y = (y << 1) | bit;
            }
            position += 1;
        }
    }
    Ok((x, y, precision))
}

/// Width and height in degrees of one cell at `precision`.
///
/// Precisions beyond [`MAX_PRECISION`] are clamped to it.
#[must_use]
pub fn cell_size(precision: usize) -> (f64, f64) {
    let (lon_bits, lat_bits) = bit_counts(precision.min(MAX_PRECISION));
    (
        360.0 / f64::from(1_u32 << lon_bits),
        180.0 / f64::from(1_u32 << lat_bits),
    )
}

/// Geohash of the cell owning `coordinates`.
///
/// Ownership is closed on the west and south edges and open on the east and
/// north edges. Points on the antimeridian or the north pole fall into the
/// last column or row.
pub fn encode(coordinates: Coordinates, precision: usize) -> Result<String, GeohashError> {
    let (x, y) = cell_indices(coordinates, precision)?;
    encode_indices(x, y, precision)
}

/// Column and row of the cell owning `coordinates`.
pub fn cell_indices(coordinates: Coordinates, precision: usize) -> Result<(u32, u32), GeohashError> {
    check_precision(precision)?;
    if !coordinates.is_valid() {
        return Err(GeohashError::InvalidCoordinates {
            lat: coordinates.lat,
            lon: coordinates.lon,
        });
    }
    let (lon_bits, lat_bits) = bit_counts(precision);
    let (width, height) = cell_size(precision);
    let x = index_along(coordinates.lon + 180.0, width, lon_bits);
    let y = index_along(coordinates.lat + 90.0, height, lat_bits);
    Ok((x, y))
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "offset is validated non-negative and clamped to the grid"
)]
fn index_along(offset: f64, step: f64, bits: u32) -> u32 {
    let last = (1_u32 << bits) - 1;
    let index = (offset / step).floor() as u32;
    index.min(last)
}

/// Bounding box of the cell named by `hash`.
///
/// # Examples
/// ```
/// use stargaze_core::geohash;
///
/// let bbox = geohash::decode_bbox("u2uu3")?;
/// assert!((bbox.minlat() - 49.965_820_312_5).abs() < 1e-12);
/// assert!((bbox.minlon() - 17.973_632_812_5).abs() < 1e-12);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn decode_bbox(hash: &str) -> Result<BoundingBox, GeohashError> {
    let (x, y, precision) = decode_indices(hash)?;
    Ok(bbox_for_indices(x, y, precision))
}

/// Bounding box of the cell at column `x` and row `y`.
#[must_use]
pub fn bbox_for_indices(x: u32, y: u32, precision: usize) -> BoundingBox {
    let (width, height) = cell_size(precision);
    let minlon = -180.0 + f64::from(x) * width;
    let minlat = -90.0 + f64::from(y) * height;
    BoundingBox::from_ordered(minlat, minlon, minlat + height, minlon + width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Coordinates::new(50.0, 18.0), 5, "u2uu3")]
    #[case(Coordinates::new(50.0, 18.0), 6, "u2uu3w")]
    #[case(Coordinates::new(57.649_11, 10.407_44), 11, "u4pruydqqvj")]
    #[case(Coordinates::new(-90.0, -180.0), 3, "000")]
    fn encodes_known_points(
        #[case] coordinates: Coordinates,
        #[case] precision: usize,
        #[case] expected: &str,
    ) {
        assert_eq!(encode(coordinates, precision).expect("encode"), expected);
    }

    #[rstest]
    fn decodes_known_cell() {
        let bbox = decode_bbox("u2uu3").expect("decode");
        assert!((bbox.minlat() - 49.965_820_312_5).abs() < 1e-12);
        assert!((bbox.maxlat() - 50.009_765_625).abs() < 1e-12);
        assert!((bbox.minlon() - 17.973_632_812_5).abs() < 1e-12);
        assert!((bbox.maxlon() - 18.017_578_125).abs() < 1e-12);
    }

    #[rstest]
    fn cell_is_square_at_default_precision() {
        let (width, height) = cell_size(5);
        assert!((width - 180.0 / 4096.0).abs() < f64::EPSILON);
        assert!((height - 180.0 / 4096.0).abs() < f64::EPSILON);
    }

    #[rstest]
    fn west_and_south_edges_are_owned() {
        let bbox = decode_bbox("u2uu3").expect("decode");
        let corner = Coordinates::new(bbox.minlat(), bbox.minlon());
        assert_eq!(encode(corner, 5).expect("encode"), "u2uu3");
        let far = Coordinates::new(bbox.maxlat(), bbox.maxlon());
        assert_ne!(encode(far, 5).expect("encode"), "u2uu3");
    }

    #[rstest]
    fn eastern_limit_maps_to_last_column() {
        let hash = encode(Coordinates::new(90.0, 180.0), 1).expect("encode");
        assert_eq!(hash, "z");
    }

    #[rstest]
    fn indices_survive_a_round_trip() {
        let hash = encode_indices(1234, 567, 5).expect("encode");
        assert_eq!(decode_indices(&hash).expect("decode"), (1234, 567, 5));
    }

    #[rstest]
    #[case("")]
    #[case("0123456789bcd")]
    fn rejects_bad_lengths(#[case] hash: &str) {
        assert!(matches!(
            decode_bbox(hash),
            Err(GeohashError::InvalidPrecision(_))
        ));
    }

    #[rstest]
    fn rejects_characters_outside_alphabet() {
        assert_eq!(
            decode_bbox("u2ua3"),
            Err(GeohashError::InvalidCharacter('a'))
        );
    }

    #[rstest]
    fn rejects_out_of_range_index() {
        assert!(matches!(
            encode_indices(8, 0, 1),
            Err(GeohashError::IndexOutOfRange { .. })
        ));
    }
}

//! Parsers for the search radius and observation direction options.

use thiserror::Error;

/// Metres per unit for the accepted length suffixes.
const LENGTH_UNITS: [(&str, f64); 4] = [("m", 1.0), ("km", 1_000.0), ("mi", 1_609.344), ("ft", 0.3048)];

/// Largest accepted search radius. Wider searches cover thousands of tiles
/// per layer and are better split into several runs.
pub const MAX_RADIUS_M: f64 = 250_000.0;

/// Azimuths of the named compass points.
const COMPASS_POINTS: [(&str, f64); 20] = [
    ("north", 0.0),
    ("east", 90.0),
    ("south", 180.0),
    ("west", 270.0),
    ("n", 0.0),
    ("nne", 22.5),
    ("ne", 45.0),
    ("ene", 67.5),
    ("e", 90.0),
    ("ese", 112.5),
    ("se", 135.0),
    ("sse", 157.5),
    ("s", 180.0),
    ("ssw", 202.5),
    ("sw", 225.0),
    ("wsw", 247.5),
    ("w", 270.0),
    ("wnw", 292.5),
    ("nw", 315.0),
    ("nnw", 337.5),
];

/// Errors raised while parsing a length.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LengthError {
    /// The input holds no number.
    #[error("`{input}` is not a length")]
    NotALength {
        /// Rejected input.
        input: String,
    },
    /// The suffix is not a supported unit.
    #[error("unknown length unit `{unit}` (expected m, km, mi or ft)")]
    UnknownUnit {
        /// Rejected unit.
        unit: String,
    },
    /// The length is negative or not finite.
    #[error("length `{input}` must be a finite, non-negative distance")]
    OutOfRange {
        /// Rejected input.
        input: String,
    },
    /// The search radius exceeds [`MAX_RADIUS_M`].
    #[error("radius `{input}` exceeds the {limit_km} km limit")]
    TooLong {
        /// Rejected input.
        input: String,
        /// Limit in kilometres.
        limit_km: u32,
    },
}

/// Errors raised while parsing a direction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{input}` is neither a compass point nor an azimuth")]
pub struct DirectionError {
    /// Rejected input.
    pub input: String,
}

/// Parse a length such as `"10km"`, `"2.5 mi"` or `"800"` into metres.
///
/// A bare number is taken as metres.
///
/// # Examples
/// ```
/// use stargaze_cli::parsing::parse_length;
///
/// assert_eq!(parse_length("1km"), Ok(1_000.0));
/// assert_eq!(parse_length("250"), Ok(250.0));
/// assert!(parse_length("-3m").is_err());
/// ```
pub fn parse_length(input: &str) -> Result<f64, LengthError> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let magnitude: f64 = number
        .trim()
        .parse()
        .map_err(|_| LengthError::NotALength {
            input: input.to_owned(),
        })?;
    let unit = unit.trim().to_ascii_lowercase();
    let scale = if unit.is_empty() {
        1.0
    } else {
        LENGTH_UNITS
            .iter()
            .find_map(|(name, scale)| (*name == unit).then_some(*scale))
            .ok_or(LengthError::UnknownUnit { unit })?
    };
    let metres = magnitude * scale;
    if metres.is_finite() && metres >= 0.0 {
        Ok(metres)
    } else {
        Err(LengthError::OutOfRange {
            input: input.to_owned(),
        })
    }
}

/// Parse a search radius, a length no greater than [`MAX_RADIUS_M`].
///
/// # Examples
/// ```
/// use stargaze_cli::parsing::{LengthError, parse_radius};
///
/// assert_eq!(parse_radius("250km"), Ok(250_000.0));
/// assert!(matches!(
///     parse_radius("20000km"),
///     Err(LengthError::TooLong { limit_km: 250, .. })
/// ));
/// ```
pub fn parse_radius(input: &str) -> Result<f64, LengthError> {
    let metres = parse_length(input)?;
    if metres > MAX_RADIUS_M {
        return Err(LengthError::TooLong {
            input: input.to_owned(),
            limit_km: 250,
        });
    }
    Ok(metres)
}

/// Parse a compass point or numeric azimuth into degrees in `[0, 360)`.
///
/// Compass names are case-insensitive.
///
/// # Examples
/// ```
/// use stargaze_cli::parsing::parse_direction;
///
/// assert_eq!(parse_direction("SE"), Ok(135.0));
/// assert_eq!(parse_direction("north"), Ok(0.0));
/// assert_eq!(parse_direction("-90"), Ok(270.0));
/// ```
pub fn parse_direction(input: &str) -> Result<f64, DirectionError> {
    let folded = input.trim().to_lowercase();
    if let Some(azimuth) = COMPASS_POINTS
        .iter()
        .find_map(|(name, azimuth)| (*name == folded).then_some(*azimuth))
    {
        return Ok(azimuth);
    }
    let invalid = || DirectionError {
        input: input.to_owned(),
    };
    let azimuth: f64 = folded.parse().map_err(|_| invalid())?;
    if !azimuth.is_finite() {
        return Err(invalid());
    }
    // Tiny negative inputs round up to exactly 360.
    let normalised = azimuth.rem_euclid(360.0);
    Ok(if normalised >= 360.0 { 0.0 } else { normalised })
}

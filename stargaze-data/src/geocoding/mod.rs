//! Resolving whereabouts descriptions into coordinates.
//!
//! A [`FormatRegistry`] holds an ordered list of patterns, each paired with a
//! handler. The first pattern matching the whole input decides how it is
//! resolved. [`FormatRegistry::standard`] recognises decimal degrees and hands
//! anything else to a [`Geocoder`] such as [`NominatimClient`].

mod nominatim;

use std::fmt;

use regex::{Captures, Regex};
use stargaze_core::Coordinates;
use thiserror::Error;

use crate::http::SourceError;

pub use nominatim::{DEFAULT_NOMINATIM_ENDPOINT, NominatimClient};

/// Decimal latitude and longitude, optionally wrapped in brackets.
pub const DECIMAL_DEGREES_PATTERN: &str = r"[(\[]?(-?\d+\.\d+),\s*(-?\d+\.\d+)[)\]]?";

/// Any non-empty text.
pub const FREE_TEXT_PATTERN: &str = r"(?s).+";

/// Errors raised while resolving whereabouts.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// No registered format accepts the input.
    #[error("cannot resolve whereabouts `{input}`")]
    Unresolvable {
        /// Rejected input.
        input: String,
    },
    /// The geocoder found no place matching the input.
    #[error("no place found for `{query}`")]
    NotFound {
        /// Query sent to the geocoder.
        query: String,
    },
    /// The input matched a format but its values are unusable.
    #[error("invalid coordinates in `{input}`")]
    InvalidCoordinates {
        /// Rejected input.
        input: String,
    },
    /// A format pattern failed to compile.
    #[error("invalid whereabouts pattern `{pattern}`")]
    Pattern {
        /// Offending pattern.
        pattern: String,
        /// Compiler error.
        #[source]
        source: regex::Error,
    },
    /// The remote geocoder failed.
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Something that turns a place name into coordinates.
pub trait Geocoder: Send + Sync {
    /// Resolve `query` to a single position.
    fn geocode(&self, query: &str) -> Result<Coordinates, GeocodeError>;
}

type Handler = Box<dyn Fn(&Captures<'_>) -> Result<Coordinates, GeocodeError> + Send + Sync>;

struct Format {
    pattern: Regex,
    handler: Handler,
}

/// Ordered whereabouts formats; the first full match wins.
///
/// # Examples
/// ```
/// use stargaze_core::Coordinates;
/// use stargaze_data::geocoding::{FormatRegistry, GeocodeError};
///
/// let mut registry = FormatRegistry::new();
/// registry.register_decimal_degrees()?;
/// assert_eq!(registry.resolve("(50.0, 18.5)")?, Coordinates::new(50.0, 18.5));
/// assert!(matches!(
///     registry.resolve("Kraków"),
///     Err(GeocodeError::Unresolvable { .. })
/// ));
/// # Ok::<(), GeocodeError>(())
/// ```
#[derive(Default)]
pub struct FormatRegistry {
    formats: Vec<Format>,
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.formats.iter().map(|format| format.pattern.as_str()))
            .finish()
    }
}

impl FormatRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decimal degrees first, then free text through `geocoder`.
    pub fn standard<G>(geocoder: G) -> Result<Self, GeocodeError>
    where
        G: Geocoder + 'static,
    {
        let mut registry = Self::new();
        registry.register_decimal_degrees()?;
        registry.register(FREE_TEXT_PATTERN, move |captures| {
            let query = captures.get(0).map_or("", |whole| whole.as_str());
            geocoder.geocode(query.trim())
        })?;
        Ok(registry)
    }

    /// Append a format. `pattern` must match the whole input.
    pub fn register<F>(&mut self, pattern: &str, handler: F) -> Result<&mut Self, GeocodeError>
    where
        F: Fn(&Captures<'_>) -> Result<Coordinates, GeocodeError> + Send + Sync + 'static,
    {
        let anchored = format!("^(?:{pattern})$");
        let compiled = Regex::new(&anchored).map_err(|source| GeocodeError::Pattern {
            pattern: pattern.to_owned(),
            source,
        })?;
        self.formats.push(Format {
            pattern: compiled,
            handler: Box::new(handler),
        });
        Ok(self)
    }

    /// Append the decimal degrees format.
    pub fn register_decimal_degrees(&mut self) -> Result<&mut Self, GeocodeError> {
        self.register(DECIMAL_DEGREES_PATTERN, decimal_degrees)
    }

    /// Patterns in match order, as registered.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.formats
            .iter()
            .map(|format| format.pattern.as_str())
    }

    /// Resolve `input` with the first matching format.
    pub fn resolve(&self, input: &str) -> Result<Coordinates, GeocodeError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(GeocodeError::Unresolvable {
                input: input.to_owned(),
            });
        }
        for format in &self.formats {
            if let Some(captures) = format.pattern.captures(trimmed) {
                log::debug!("whereabouts `{trimmed}` matched {}", format.pattern);
                return (format.handler)(&captures);
            }
        }
        Err(GeocodeError::Unresolvable {
            input: input.to_owned(),
        })
    }
}

fn decimal_degrees(captures: &Captures<'_>) -> Result<Coordinates, GeocodeError> {
    let whole = captures.get(0).map_or("", |m| m.as_str());
    let invalid = || GeocodeError::InvalidCoordinates {
        input: whole.to_owned(),
    };
    let number = |index: usize| -> Result<f64, GeocodeError> {
        captures
            .get(index)
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(invalid)
    };
    let coordinates = Coordinates::new(number(1)?, number(2)?);
    if coordinates.is_valid() {
        Ok(coordinates)
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::{Arc, Mutex, PoisonError};

    #[derive(Debug, Default)]
    struct RecordingGeocoder {
        queries: Arc<Mutex<Vec<String>>>,
    }

    impl Geocoder for RecordingGeocoder {
        fn geocode(&self, query: &str) -> Result<Coordinates, GeocodeError> {
            self.queries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(query.to_owned());
            Ok(Coordinates::new(50.06, 19.94))
        }
    }

    #[rstest]
    #[case("50.0, 18.0", 50.0, 18.0)]
    #[case("(50.0,18.5)", 50.0, 18.5)]
    #[case("[-33.86, 151.21]", -33.86, 151.21)]
    #[case("  49.5, -0.25 ", 49.5, -0.25)]
    fn decimal_degrees_are_parsed(#[case] input: &str, #[case] lat: f64, #[case] lon: f64) {
        let mut registry = FormatRegistry::new();
        registry.register_decimal_degrees().expect("pattern compiles");
        assert_eq!(registry.resolve(input).expect("resolve"), Coordinates::new(lat, lon));
    }

    #[rstest]
    fn out_of_range_degrees_are_rejected() {
        let mut registry = FormatRegistry::new();
        registry.register_decimal_degrees().expect("pattern compiles");
        let err = registry.resolve("95.0, 18.0").expect_err("latitude too large");
        assert!(matches!(err, GeocodeError::InvalidCoordinates { .. }));
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn blank_input_is_unresolvable(#[case] input: &str) {
        let registry = FormatRegistry::standard(RecordingGeocoder::default()).expect("registry");
        assert!(matches!(
            registry.resolve(input),
            Err(GeocodeError::Unresolvable { .. })
        ));
    }

    #[rstest]
    fn free_text_goes_to_geocoder() {
        let geocoder = RecordingGeocoder::default();
        let queries = Arc::clone(&geocoder.queries);
        let registry = FormatRegistry::standard(geocoder).expect("registry");

        assert_eq!(
            registry.resolve("Kraków, Poland").expect("resolve"),
            Coordinates::new(50.06, 19.94)
        );
        assert_eq!(registry.resolve("50.0, 18.0").expect("resolve"), Coordinates::new(50.0, 18.0));

        let seen = queries.lock().unwrap_or_else(PoisonError::into_inner).clone();
        assert_eq!(seen, ["Kraków, Poland"]);
    }

    #[rstest]
    fn first_registered_format_wins() {
        let mut registry = FormatRegistry::new();
        registry
            .register(r"home", |_| Ok(Coordinates::new(1.0, 1.0)))
            .and_then(|r| r.register(r".*", |_| Ok(Coordinates::new(2.0, 2.0))))
            .expect("patterns compile");

        assert_eq!(registry.resolve("home").expect("resolve"), Coordinates::new(1.0, 1.0));
        assert_eq!(registry.resolve("homeward").expect("resolve"), Coordinates::new(2.0, 2.0));
        assert_eq!(registry.patterns().collect::<Vec<_>>(), ["^(?:home)$", "^(?:.*)$"]);
    }

    #[rstest]
    fn bad_pattern_is_reported() {
        let mut registry = FormatRegistry::new();
        let err = registry
            .register("(", |_| Ok(Coordinates::new(0.0, 0.0)))
            .expect_err("unbalanced");
        assert!(matches!(err, GeocodeError::Pattern { .. }));
    }
}

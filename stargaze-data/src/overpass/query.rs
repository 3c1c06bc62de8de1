//! Overpass QL query construction.

use std::fmt;

use stargaze_core::BoundingBox;

/// A union query over tag selectors restricted to one bounding box.
///
/// # Examples
/// ```
/// use stargaze_core::BoundingBox;
/// use stargaze_data::overpass::OverpassQuery;
///
/// let bounds = BoundingBox::new(49.98, 18.48, 50.02, 18.52)?;
/// let query = OverpassQuery::new(bounds)
///     .way("landuse", "forest")
///     .multipolygon("landuse", "forest");
/// assert_eq!(
///     query.to_string(),
///     "[out:json][bbox:49.98,18.48,50.02,18.52];\n(\n    way[landuse=forest];\n    \
///      rel[landuse=forest][type=multipolygon];\n);\nout geom;"
/// );
/// # Ok::<(), stargaze_core::BoundingBoxError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OverpassQuery {
    bounds: BoundingBox,
    timeout_secs: Option<u64>,
    selectors: Vec<String>,
}

impl OverpassQuery {
    /// Start an empty query over `bounds`.
    #[must_use]
    pub const fn new(bounds: BoundingBox) -> Self {
        Self {
            bounds,
            timeout_secs: None,
            selectors: Vec::new(),
        }
    }

    /// Ask the server to give up after `seconds`.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_secs = Some(seconds);
        self
    }

    /// Select ways tagged `key=value`.
    #[must_use]
    pub fn way(mut self, key: &str, value: &str) -> Self {
        self.selectors.push(format!("way[{key}={value}]"));
        self
    }

    /// Select multipolygon relations tagged `key=value`.
    #[must_use]
    pub fn multipolygon(mut self, key: &str, value: &str) -> Self {
        self.selectors
            .push(format!("rel[{key}={value}][type=multipolygon]"));
        self
    }

    /// Select ways and multipolygon relations tagged `key=value`.
    #[must_use]
    pub fn area(self, key: &str, value: &str) -> Self {
        self.way(key, value).multipolygon(key, value)
    }

    /// Bounding box the query is restricted to.
    #[must_use]
    pub const fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }
}

impl fmt::Display for OverpassQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[out:json]")?;
        if let Some(seconds) = self.timeout_secs {
            write!(f, "[timeout:{seconds}]")?;
        }
        writeln!(f, "[bbox:{}];", self.bounds)?;
        f.write_str("(\n")?;
        for selector in &self.selectors {
            writeln!(f, "    {selector};")?;
        }
        f.write_str(");\nout geom;")
    }
}

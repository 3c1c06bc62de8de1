//! Data layers and the tile entity that tracks them.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::BoundingBox;

/// One category of geographic data imported independently per tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum LayerKind {
    /// Land use and natural cover polygons.
    Land,
    /// Elevation rasters.
    Relief,
    /// Highway line strings.
    Road,
    /// Residential area polygons.
    ResidentialArea,
}

impl LayerKind {
    /// Every layer a tile needs before it counts as complete.
    pub const ALL: [Self; 4] = [Self::Land, Self::Relief, Self::Road, Self::ResidentialArea];

    /// Stable identifier used in the completion index.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Land => "land",
            Self::Relief => "relief",
            Self::Road => "road",
            Self::ResidentialArea => "residential_area",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a layer identifier is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown layer `{0}`")]
pub struct UnknownLayer(pub String);

impl FromStr for LayerKind {
    type Err = UnknownLayer;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|layer| layer.as_str() == value)
            .ok_or_else(|| UnknownLayer(value.to_owned()))
    }
}

/// A grid cell together with the layers already loaded for it.
///
/// Identity is the geohash. `layers_present` only ever grows.
///
/// # Examples
/// ```
/// use stargaze_core::{BoundingBox, LayerKind, Tile};
///
/// let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0)?;
/// let mut tile = Tile::new("s00", bbox);
/// tile.insert_layer(LayerKind::Land);
/// assert!(!tile.is_complete());
/// assert_eq!(tile.missing_layers().len(), 3);
/// # Ok::<(), stargaze_core::BoundingBoxError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tile {
    /// Geohash naming the cell.
    pub geohash: String,
    /// Extent of the cell.
    pub bbox: BoundingBox,
    /// Layers whose load step has succeeded.
    pub layers_present: BTreeSet<LayerKind>,
}

impl Tile {
    /// Create a tile with no layers loaded.
    pub fn new(geohash: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            geohash: geohash.into(),
            bbox,
            layers_present: BTreeSet::new(),
        }
    }

    /// Record a successfully loaded layer.
    pub fn insert_layer(&mut self, layer: LayerKind) {
        self.layers_present.insert(layer);
    }

    /// Required layers not yet loaded, in [`LayerKind::ALL`] order.
    #[must_use]
    pub fn missing_layers(&self) -> Vec<LayerKind> {
        LayerKind::ALL
            .into_iter()
            .filter(|layer| !self.layers_present.contains(layer))
            .collect()
    }

    /// A tile is complete once every layer in [`LayerKind::ALL`] is present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        LayerKind::ALL
            .iter()
            .all(|layer| self.layers_present.contains(layer))
    }
}

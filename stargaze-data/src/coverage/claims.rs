//! Per-`(tile, layer)` mutual exclusion for in-flight imports.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use stargaze_core::LayerKind;

type ClaimKey = (String, LayerKind);

/// Set of `(geohash, layer)` pairs currently being imported.
///
/// Share one instance between every filler that writes to the same store.
///
/// # Examples
/// ```
/// use stargaze_core::LayerKind;
/// use stargaze_data::coverage::ImportClaims;
///
/// let claims = ImportClaims::default();
/// let guard = claims.try_claim("u2uu3", LayerKind::Road).expect("free");
/// assert!(claims.try_claim("u2uu3", LayerKind::Road).is_none());
/// assert!(claims.try_claim("u2uu3", LayerKind::Land).is_some());
/// drop(guard);
/// assert!(!claims.is_claimed("u2uu3", LayerKind::Road));
/// ```
#[derive(Debug, Default)]
pub struct ImportClaims {
    held: Mutex<HashSet<ClaimKey>>,
}

impl ImportClaims {
    fn lock(&self) -> MutexGuard<'_, HashSet<ClaimKey>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `layer` of `geohash`, or `None` if another import holds it.
    #[must_use]
    pub fn try_claim(&self, geohash: &str, layer: LayerKind) -> Option<ClaimGuard<'_>> {
        let key = (geohash.to_owned(), layer);
        if !self.lock().insert(key.clone()) {
            log::debug!("{layer} import for {geohash} already in flight");
            return None;
        }
        Some(ClaimGuard { claims: self, key })
    }

    /// Report whether `layer` of `geohash` is claimed.
    #[must_use]
    pub fn is_claimed(&self, geohash: &str, layer: LayerKind) -> bool {
        self.lock().contains(&(geohash.to_owned(), layer))
    }

    /// Number of claims currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Report whether no claims are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Releases its claim when dropped.
#[derive(Debug)]
pub struct ClaimGuard<'a> {
    claims: &'a ImportClaims,
    key: ClaimKey,
}

impl ClaimGuard<'_> {
    /// Geohash of the claimed tile.
    #[must_use]
    pub fn geohash(&self) -> &str {
        &self.key.0
    }

    /// Claimed layer.
    #[must_use]
    pub const fn layer(&self) -> LayerKind {
        self.key.1
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.claims.lock().remove(&self.key);
    }
}

//! Area extraction shared by the land and residential importers.

use std::collections::HashSet;

use stargaze_core::Coordinates;

use crate::overpass::{Element, MemberKind, MemberRole, Tags};

/// Smallest closed ring: a triangle plus the repeated first point.
const MIN_RING_POINTS: usize = 4;

/// A closed ring and the tags that classify it.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct AreaCandidate<'a> {
    pub(super) reference: u64,
    pub(super) ring: &'a [Coordinates],
    pub(super) tags: &'a Tags,
}

/// Closed ways and closed outer members of relations, first occurrence only.
///
/// Members take their classification from the relation that lists them.
/// Unclosed ways, inner members and rings too short to enclose an area are
/// skipped.
pub(super) fn area_candidates(elements: &[Element]) -> Vec<AreaCandidate<'_>> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for element in elements {
        match element {
            Element::Way(way) => {
                if !way.is_closed() || way.geometry.len() < MIN_RING_POINTS {
                    log::debug!("skipping way {}: not a closed ring", way.id);
                    continue;
                }
                if seen.insert(way.id) {
                    candidates.push(AreaCandidate {
                        reference: way.id,
                        ring: &way.geometry,
                        tags: &way.tags,
                    });
                }
            }
            Element::Relation(relation) => {
                let before = candidates.len();
                for member in &relation.members {
                    if member.kind != MemberKind::Way
                        || member.role != MemberRole::Outer
                        || !member.is_closed()
                        || member.geometry.len() < MIN_RING_POINTS
                    {
                        continue;
                    }
                    if seen.insert(member.reference) {
                        candidates.push(AreaCandidate {
                            reference: member.reference,
                            ring: &member.geometry,
                            tags: &relation.tags,
                        });
                    }
                }
                if candidates.len() == before {
                    log::debug!("relation {} contributed no new outer rings", relation.id);
                }
            }
            Element::Node(_) | Element::Other => {}
        }
    }
    candidates
}

//! 32-bit grouping keys over a feature's geometry and selected attributes.
//!
//! Keys are xxHash32 digests, so two different features can share a key. Such
//! a collision silently groups them together; that is accepted, the key is a
//! grouping hint and not an identity.

use crate::feature::{Feature, FeatureGeometry};
use geozero::{CoordDimensions, ToWkb};
use log::warn;
use std::collections::BTreeSet;
use xxhash_rust::xxh32::Xxh32;

/// Fixed so keys are reproducible across runs and processes.
const HASH_SEED: u32 = 0x12af_028e;

const NAME_SEPARATOR: u8 = 0x1f;
const PAIR_SEPARATOR: u8 = 0x1e;

#[derive(Debug, Clone, Default)]
pub struct FeatureHasher {
    include_geometry: bool,
    // sorted, so the key never depends on the order names were configured in
    attributes: BTreeSet<String>,
}

impl FeatureHasher {
    pub fn new<I, S>(include_geometry: bool, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include_geometry,
            attributes: attributes.into_iter().map(Into::into).collect(),
        }
    }

    /// Hashes nothing but the geometry, used to find stacks of identical lines.
    pub fn geometry_only() -> Self {
        Self {
            include_geometry: true,
            attributes: BTreeSet::new(),
        }
    }

    pub fn attributes(&self) -> &BTreeSet<String> {
        &self.attributes
    }

    pub fn hash(&self, feature: &Feature) -> u32 {
        let mut hasher = Xxh32::new(HASH_SEED);

        if self.include_geometry {
            if let Some(geometry) = &feature.geometry {
                match geometry_wkb(geometry) {
                    Ok(bytes) => hasher.update(&bytes),
                    Err(e) => warn!(
                        "Could not serialize geometry of feature {} for hashing: {}",
                        feature.id, e
                    ),
                }
            }
        }

        for name in &self.attributes {
            if let Some(value) = feature.attribute(name) {
                hasher.update(name.as_bytes());
                hasher.update(&[NAME_SEPARATOR]);
                hasher.update(value.to_string().as_bytes());
                hasher.update(&[PAIR_SEPARATOR]);
            }
        }

        hasher.digest()
    }
}

fn geometry_wkb(geometry: &FeatureGeometry) -> geozero::error::Result<Vec<u8>> {
    geometry.to_geo().to_wkb(CoordDimensions::xy())
}

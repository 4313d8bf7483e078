//! Sources defined by an explicit list of ruptures with occurrence probabilities.
use super::rupture::{Occurrence, Rupture};
use crate::errors::BBoxError;
use crate::geo::{BoundingBox, get_bounding_box};
use anyhow::{Result, ensure};
use itertools::Itertools;

/// The maximum number of ruptures in a block produced by splitting
pub const BLOCK_SIZE: usize = 100;

/// A source made of explicit ruptures, each with its own occurrence PMF
#[derive(Debug, Clone, PartialEq)]
pub struct NonParametricSource {
    /// The ruptures of the source
    pub ruptures: Vec<Rupture>,
}

impl NonParametricSource {
    /// Create a new [`NonParametricSource`]
    pub fn new(ruptures: Vec<Rupture>) -> Result<Self> {
        ensure!(!ruptures.is_empty(), "A non-parametric source needs ruptures");
        for rup in &ruptures {
            let Occurrence::NonParametric { pmf } = &rup.occurrence else {
                anyhow::bail!("Non-parametric ruptures must have an occurrence PMF");
            };
            let total: f64 = pmf.iter().sum();
            ensure!(
                (total - 1.0).abs() < 1e-6,
                "Occurrence probabilities must sum to one, got {total}"
            );
        }

        Ok(Self { ruptures })
    }

    /// Split the ruptures into blocks of at most [`BLOCK_SIZE`]
    pub fn blocks(&self) -> Vec<NonParametricSource> {
        self.ruptures
            .chunks(BLOCK_SIZE)
            .map(|chunk| NonParametricSource {
                ruptures: chunk.to_vec(),
            })
            .collect()
    }

    /// Group consecutive ruptures with the same magnitude
    pub fn group_by_mag(&self) -> Vec<NonParametricSource> {
        self.ruptures
            .iter()
            .chunk_by(|rup| rup.mag.to_bits())
            .into_iter()
            .map(|(_, group)| NonParametricSource {
                ruptures: group.cloned().collect(),
            })
            .collect()
    }

    /// The number of ruptures with magnitude at least `min_mag`
    pub fn count_ruptures(&self, min_mag: f64) -> u32 {
        self.ruptures.iter().filter(|rup| rup.mag >= min_mag).count() as u32
    }

    /// The smallest and largest magnitudes of the ruptures
    pub fn min_max_mag(&self) -> (f64, f64) {
        self.ruptures
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), rup| {
                (lo.min(rup.mag), hi.max(rup.mag))
            })
    }

    /// The box around all ruptures enlarged by `maxdist` km
    pub fn bounding_box(&self, maxdist: f64) -> Result<BoundingBox, BBoxError> {
        let locations = self.ruptures.iter().flat_map(|rup| {
            let points: Vec<(f64, f64)> = match &rup.surface {
                Some(surface) => surface.iter_points().map(|p| (p.lon, p.lat)).collect(),
                None => vec![(rup.hypocenter.lon, rup.hypocenter.lat)],
            };
            points
        });

        get_bounding_box(locations, maxdist)
    }
}

//! Fault-system sources, whose ruptures span one or more fault sections.
use super::TrtID;
use super::rupture::{Occurrence, Rupture};
use crate::errors::BBoxError;
use crate::geo::{BoundingBox, Mesh, Surface, get_bounding_box};
use anyhow::{Context, Result, ensure};
use std::collections::HashMap;

/// A section of a fault system
#[derive(Debug, Clone, PartialEq)]
pub struct FaultSection {
    /// Section identifier
    pub sec_id: String,
    /// The surface of the section
    pub mesh: Mesh,
}

/// A source made of many ruptures, each spanning a set of fault sections
#[derive(Debug, Clone, PartialEq)]
pub struct MultiFaultSource {
    sections: Vec<FaultSection>,
    rupture_idxs: Vec<Vec<String>>,
    probs: Vec<Vec<f64>>,
    mags: Vec<f64>,
    rakes: Vec<f64>,
    invx: HashMap<String, usize>,
}

impl MultiFaultSource {
    /// Create a new [`MultiFaultSource`].
    ///
    /// `rupture_idxs` lists the section IDs of each rupture, and `probs` its occurrence PMF.
    pub fn new(
        sections: Vec<FaultSection>,
        rupture_idxs: Vec<Vec<String>>,
        probs: Vec<Vec<f64>>,
        mags: Vec<f64>,
        rakes: Vec<f64>,
    ) -> Result<Self> {
        let n = rupture_idxs.len();
        ensure!(
            probs.len() == n && mags.len() == n && rakes.len() == n,
            "Rupture indices, probabilities, magnitudes and rakes must have the same length"
        );

        let invx: HashMap<String, usize> = sections
            .iter()
            .enumerate()
            .map(|(i, sec)| (sec.sec_id.clone(), i))
            .collect();
        ensure!(invx.len() == sections.len(), "Duplicate fault section IDs");

        for (i, idxs) in rupture_idxs.iter().enumerate() {
            ensure!(!idxs.is_empty(), "Rupture {i} has no fault sections");
            for sec_id in idxs {
                invx.get(sec_id)
                    .with_context(|| format!("Rupture {i} refers to unknown section {sec_id}"))?;
            }
        }

        Ok(Self {
            sections,
            rupture_idxs,
            probs,
            mags,
            rakes,
            invx,
        })
    }

    /// The fault sections of the source
    pub fn sections(&self) -> &[FaultSection] {
        &self.sections
    }

    /// The number of ruptures with magnitude at least `min_mag`
    pub fn count_ruptures(&self, min_mag: f64) -> u32 {
        self.mags.iter().filter(|mag| **mag >= min_mag).count() as u32
    }

    /// The smallest and largest magnitudes of the ruptures
    pub fn min_max_mag(&self) -> (f64, f64) {
        self.mags
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), mag| {
                (lo.min(*mag), hi.max(*mag))
            })
    }

    /// Generate the ruptures with magnitude at least `min_mag`
    pub fn ruptures<'a>(&'a self, trt: &'a TrtID, min_mag: f64) -> impl Iterator<Item = Rupture> + 'a {
        self.rupture_idxs
            .iter()
            .enumerate()
            .filter(move |(i, _)| self.mags[*i] >= min_mag)
            .map(move |(i, idxs)| {
                let meshes: Vec<Mesh> = idxs
                    .iter()
                    .map(|sec_id| self.sections[self.invx[sec_id]].mesh.clone())
                    .collect();
                let surface = Surface::Multi(meshes);
                Rupture {
                    mag: self.mags[i],
                    rake: self.rakes[i],
                    trt: trt.clone(),
                    hypocenter: surface.middle_point(),
                    surface: Some(surface),
                    occurrence: Occurrence::NonParametric {
                        pmf: self.probs[i].clone(),
                    },
                }
            })
    }

    /// The box around all sections enlarged by `maxdist` km
    pub fn bounding_box(&self, maxdist: f64) -> Result<BoundingBox, BBoxError> {
        get_bounding_box(
            self.sections
                .iter()
                .flat_map(|sec| sec.mesh.points.iter().map(|p| (p.lon, p.lat))),
            maxdist,
        )
    }
}

//! Seismic sources, which generate the ruptures of the hazard model.
use crate::errors::BBoxError;
use crate::geo::{BoundingBox, Point};
use crate::id::{HasID, define_id_type};
use crate::mfd::Mfd;
use anyhow::{Context, Result};

pub mod multi_fault;
pub mod non_parametric;
pub mod point;
pub mod rupture;
pub use multi_fault::{FaultSection, MultiFaultSource};
pub use non_parametric::{BLOCK_SIZE, NonParametricSource};
pub use point::{AreaSource, CollapsedPointSource, NodalPlane, PointSource, RuptureParameters};
pub use rupture::{Occurrence, Rupture, RuptureRecord};

define_id_type! {SourceID}
define_id_type! {TrtID}

/// The kind of a seismic source, with the data specific to that kind
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// A single point
    Point(PointSource),
    /// A polygon discretised into points
    Area(AreaSource),
    /// A group of point sources treated as one
    Collapsed(CollapsedPointSource),
    /// A fault system with ruptures spanning several sections
    MultiFault(MultiFaultSource),
    /// Explicit ruptures with occurrence PMFs
    NonParametric(NonParametricSource),
}

impl SourceKind {
    /// The smallest and largest magnitudes of the ruptures
    pub fn min_max_mag(&self) -> (f64, f64) {
        match self {
            Self::Point(src) => src.params.mfd.min_max_mag(),
            Self::Area(src) => src.params.mfd.min_max_mag(),
            Self::Collapsed(src) => src.min_max_mag(),
            Self::MultiFault(src) => src.min_max_mag(),
            Self::NonParametric(src) => src.min_max_mag(),
        }
    }
}

/// A seismic source
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    /// Identifier of the source. Fragments of split sources have IDs of the form `parent:index`.
    pub id: SourceID,
    /// Human-readable name
    pub name: String,
    /// Tectonic region type
    pub trt: TrtID,
    /// Kind-specific data
    pub kind: SourceKind,
    /// Ruptures below this magnitude are discarded
    pub min_mag: f64,
    /// Ordinal of the source in the source model. Fragments keep the ordinal of their parent.
    pub ordinal: u32,
    /// Index of the source group
    pub grp_id: u16,
    /// Index of the tectonic region/source model realisation
    pub trt_smr: u32,
    /// Number of samples of the logic tree branch, if sampling
    pub samples: Option<u32>,
    /// Factor applied to occurrence rates
    pub scaling_rate: Option<f64>,
    /// Number of ruptures generated by the source
    pub num_ruptures: u32,
    /// Estimated computational weight
    pub weight: f64,
    /// Number of affected sites
    pub nsites: u64,
}

impl HasID<SourceID> for Source {
    fn get_id(&self) -> &SourceID {
        &self.id
    }
}

impl Source {
    /// Create a new [`Source`] with default bookkeeping fields
    pub fn new(id: SourceID, name: &str, trt: TrtID, kind: SourceKind) -> Self {
        let mut src = Self {
            id,
            name: name.to_string(),
            trt,
            kind,
            min_mag: 0.0,
            ordinal: 0,
            grp_id: 0,
            trt_smr: 0,
            samples: None,
            scaling_rate: None,
            num_ruptures: 0,
            weight: 0.0,
            nsites: 0,
        };
        src.num_ruptures = src.count_ruptures();
        src
    }

    /// Create a fragment of this source with the given ID and kind.
    ///
    /// The fragment inherits the provenance fields of this source and has its rupture count
    /// recomputed. Its weight and number of sites are reset.
    pub fn fragment(&self, id: SourceID, kind: SourceKind) -> Source {
        let mut fragment = Self {
            id,
            name: self.name.clone(),
            trt: self.trt.clone(),
            kind,
            min_mag: self.min_mag,
            ordinal: self.ordinal,
            grp_id: self.grp_id,
            trt_smr: self.trt_smr,
            samples: self.samples,
            scaling_rate: self.scaling_rate,
            num_ruptures: 0,
            weight: 0.0,
            nsites: 0,
        };
        fragment.num_ruptures = fragment.count_ruptures();
        fragment
    }

    /// Check that the source is well formed
    pub fn validate(&self) -> Result<()> {
        let result = match &self.kind {
            SourceKind::Point(src) => src.params.validate(),
            SourceKind::Area(src) => src.params.validate(),
            SourceKind::Collapsed(src) => src
                .point_sources
                .iter()
                .try_for_each(|src| src.params.validate()),
            SourceKind::MultiFault(_) | SourceKind::NonParametric(_) => Ok(()),
        };

        result.with_context(|| format!("An error occurred with source id={}", self.id))
    }

    /// The number of ruptures generated by the source
    pub fn count_ruptures(&self) -> u32 {
        match &self.kind {
            SourceKind::Point(src) => src.params.count_ruptures(self.min_mag),
            SourceKind::Area(src) => src.count_ruptures(self.min_mag),
            SourceKind::Collapsed(src) => src.count_ruptures(self.min_mag),
            SourceKind::MultiFault(src) => src.count_ruptures(self.min_mag),
            SourceKind::NonParametric(src) => src.count_ruptures(self.min_mag),
        }
    }

    /// Generate the ruptures of the source, with their full surfaces
    pub fn iter_ruptures(&self) -> Box<dyn Iterator<Item = Rupture> + '_> {
        self.ruptures(true)
    }

    /// Generate cheap point ruptures, for the kinds that support them.
    ///
    /// Returns `None` for sources whose ruptures must keep their surfaces.
    pub fn iter_point_ruptures(&self) -> Option<Box<dyn Iterator<Item = Rupture> + '_>> {
        match &self.kind {
            SourceKind::Point(_) | SourceKind::Area(_) | SourceKind::Collapsed(_) => {
                Some(self.ruptures(false))
            }
            SourceKind::MultiFault(_) | SourceKind::NonParametric(_) => None,
        }
    }

    fn ruptures(&self, with_surface: bool) -> Box<dyn Iterator<Item = Rupture> + '_> {
        let trt = &self.trt;
        let min_mag = self.min_mag;
        match &self.kind {
            SourceKind::Point(src) => Box::new(src.params.ruptures_at(
                src.location,
                trt,
                min_mag,
                with_surface,
            )),
            SourceKind::Area(src) => Box::new(src.ruptures(trt, min_mag, with_surface)),
            SourceKind::Collapsed(src) => Box::new(src.ruptures(trt, min_mag, with_surface)),
            SourceKind::MultiFault(src) => Box::new(src.ruptures(trt, min_mag)),
            SourceKind::NonParametric(src) => Box::new(
                src.ruptures
                    .iter()
                    .filter(move |rup| rup.mag >= min_mag)
                    .cloned(),
            ),
        }
    }

    /// The smallest and largest magnitudes the source can generate
    pub fn min_max_mag(&self) -> (f64, f64) {
        self.kind.min_max_mag()
    }

    /// The (magnitude, rate) pairs of sources with a magnitude-frequency distribution
    pub fn annual_occurrence_rates(&self) -> Option<Vec<(f64, f64)>> {
        self.mfd().map(Mfd::annual_occurrence_rates)
    }

    fn mfd(&self) -> Option<&Mfd> {
        match &self.kind {
            SourceKind::Point(src) => Some(&src.params.mfd),
            SourceKind::Area(src) => Some(&src.params.mfd),
            _ => None,
        }
    }

    /// The same kind of source with its distribution replaced by a single magnitude bin.
    ///
    /// Returns `None` for kinds without a single distribution.
    pub fn with_single_rate(&self, mag: f64, rate: f64) -> Result<Option<SourceKind>> {
        let mfd = Mfd::single(mag, rate);
        let kind = match &self.kind {
            SourceKind::Point(src) => Some(SourceKind::Point(PointSource {
                location: src.location,
                params: src.params.with_mfd(mfd),
            })),
            SourceKind::Area(src) => Some(SourceKind::Area(AreaSource::new(
                src.polygon.clone(),
                src.spacing,
                src.params.with_mfd(mfd),
            )?)),
            _ => None,
        };

        Ok(kind)
    }

    /// Whether the source can be split into smaller sources
    pub fn is_splittable(&self) -> bool {
        matches!(
            self.kind,
            SourceKind::Area(_) | SourceKind::NonParametric(_)
        )
    }

    /// The smaller sources making up this one.
    ///
    /// Sources which cannot be split give a single child equal to themselves.
    pub fn children(&self) -> Vec<SourceKind> {
        match &self.kind {
            SourceKind::Area(src) => src
                .point_sources()
                .into_iter()
                .map(SourceKind::Point)
                .collect(),
            SourceKind::NonParametric(src) => src
                .blocks()
                .into_iter()
                .map(SourceKind::NonParametric)
                .collect(),
            kind => vec![kind.clone()],
        }
    }

    /// The location of sources concentrated at a point
    pub fn location(&self) -> Option<Point> {
        match &self.kind {
            SourceKind::Point(src) => Some(src.location),
            _ => None,
        }
    }

    /// Whether the source is a collapsed group of point sources
    pub fn is_collapsed(&self) -> bool {
        matches!(self.kind, SourceKind::Collapsed(_))
    }

    /// Whether the source is a fault system
    pub fn is_fault_system(&self) -> bool {
        matches!(self.kind, SourceKind::MultiFault(_))
    }

    /// The box around the source enlarged by `maxdist` km
    pub fn bounding_box(&self, maxdist: f64) -> Result<BoundingBox, BBoxError> {
        match &self.kind {
            SourceKind::Point(src) => src.bounding_box(maxdist),
            SourceKind::Area(src) => src.bounding_box(maxdist),
            SourceKind::Collapsed(src) => src.bounding_box(maxdist),
            SourceKind::MultiFault(src) => src.bounding_box(maxdist),
            SourceKind::NonParametric(src) => src.bounding_box(maxdist),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{area_source, non_parametric_source, point_source};
    use rstest::rstest;

    #[rstest]
    fn test_new_counts_ruptures(point_source: Source) {
        assert_eq!(point_source.num_ruptures, 10);
        assert_eq!(
            point_source.iter_ruptures().count() as u32,
            point_source.num_ruptures
        );
    }

    #[rstest]
    fn test_min_mag(mut point_source: Source) {
        point_source.min_mag = 5.4;
        assert_eq!(point_source.count_ruptures(), 6);
        assert!(point_source.iter_ruptures().all(|rup| rup.mag >= 5.4));
    }

    #[rstest]
    fn test_fragment(mut area_source: Source) {
        area_source.ordinal = 7;
        area_source.grp_id = 2;
        area_source.samples = Some(3);
        area_source.weight = 123.0;

        let children = area_source.children();
        let fragment = area_source.fragment("area:0".into(), children[0].clone());
        assert_eq!(fragment.id, SourceID::from("area:0"));
        assert_eq!(fragment.ordinal, 7);
        assert_eq!(fragment.grp_id, 2);
        assert_eq!(fragment.samples, Some(3));
        assert_eq!(fragment.trt, area_source.trt);
        assert_eq!(fragment.weight, 0.0);
        assert_eq!(fragment.num_ruptures, 10);
    }

    #[rstest]
    fn test_point_ruptures(point_source: Source, non_parametric_source: Source) {
        let ruptures: Vec<_> = point_source.iter_point_ruptures().unwrap().collect();
        assert_eq!(ruptures.len(), 10);
        assert!(ruptures.iter().all(|rup| rup.surface.is_none()));
        assert!(non_parametric_source.iter_point_ruptures().is_none());
    }

    #[rstest]
    fn test_is_splittable(
        point_source: Source,
        area_source: Source,
        non_parametric_source: Source,
    ) {
        assert!(!point_source.is_splittable());
        assert!(area_source.is_splittable());
        assert!(non_parametric_source.is_splittable());
        assert_eq!(point_source.children().len(), 1);
    }

    #[rstest]
    fn test_validate_context(mut point_source: Source) {
        let SourceKind::Point(src) = &mut point_source.kind else {
            unreachable!()
        };
        src.params.hypo_depths.clear();
        let err = point_source.validate().unwrap_err();
        assert_eq!(err.to_string(), "An error occurred with source id=point");
    }
}

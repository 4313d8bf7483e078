//! Ruptures are single earthquakes generated by a seismic source.
use super::TrtID;
use crate::errors::BBoxError;
use crate::geo::{DistanceMetric, Point, Surface, get_spherical_bounding_box};
use crate::site::SiteCollection;

/// How often a rupture occurs
#[derive(Debug, Clone, PartialEq)]
pub enum Occurrence {
    /// A Poissonian process with the given annual rate
    Poissonian {
        /// Annual occurrence rate
        rate: f64,
    },
    /// A probability mass function over the number of occurrences (0, 1, 2, ...) during the
    /// investigation time
    NonParametric {
        /// Probability of each number of occurrences
        pmf: Vec<f64>,
    },
}

/// An earthquake rupture
#[derive(Debug, Clone, PartialEq)]
pub struct Rupture {
    /// Magnitude
    pub mag: f64,
    /// Rake angle in degrees
    pub rake: f64,
    /// Tectonic region type of the generating source
    pub trt: TrtID,
    /// Hypocentre of the rupture
    pub hypocenter: Point,
    /// The rupture surface. Point ruptures have no surface.
    pub surface: Option<Surface>,
    /// Occurrence model
    pub occurrence: Occurrence,
}

/// The extent and hypocentre of a rupture, as stored for prefiltering
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuptureRecord {
    /// Western edge of the rupture
    pub minlon: f64,
    /// Eastern edge of the rupture
    pub maxlon: f64,
    /// Southern edge of the rupture
    pub minlat: f64,
    /// Northern edge of the rupture
    pub maxlat: f64,
    /// Hypocentre of the rupture
    pub hypo: Point,
}

impl Rupture {
    /// Compute the distance of each site from the rupture, using the given metric.
    ///
    /// Ruptures without a surface are treated as points at their hypocentre whatever the metric.
    pub fn distances(&self, sites: &SiteCollection, metric: DistanceMetric) -> Vec<f64> {
        sites
            .iter()
            .map(|site| {
                let loc = &site.location;
                match (&self.surface, metric) {
                    (None, _) => self.hypocenter.distance(loc),
                    (Some(surface), DistanceMetric::Rrup) => surface.min_distance(loc),
                    (Some(surface), DistanceMetric::Rjb) => surface.joyner_boore_distance(loc),
                    (Some(_), DistanceMetric::Rhypo) => self.hypocenter.distance(loc),
                    (Some(_), DistanceMetric::Repi) => self.hypocenter.epicentral_distance(loc),
                }
            })
            .collect()
    }

    /// Build the compact record used to prefilter this rupture
    pub fn to_record(&self) -> Result<RuptureRecord, BBoxError> {
        let bbox = match &self.surface {
            Some(surface) => {
                get_spherical_bounding_box(surface.iter_points().map(|p| (p.lon, p.lat)))?
            }
            None => get_spherical_bounding_box([(self.hypocenter.lon, self.hypocenter.lat)])?,
        };

        Ok(RuptureRecord {
            minlon: bbox.min_lon,
            maxlon: bbox.max_lon,
            minlat: bbox.min_lat,
            maxlat: bbox.max_lat,
            hypo: self.hypocenter,
        })
    }
}

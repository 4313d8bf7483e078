//! Filtering sources by their distance from the sites.
//!
//! A [`SourceFilter`] associates each source with the sites lying within the integration distance
//! of its region. Sources affecting no site are discarded.
use crate::errors::BBoxError;
use crate::geo::{BoundingBox, DistanceMetric, KM_TO_DEGREES, get_longitudinal_extent};
use crate::site::{SiteCollection, SiteIndex};
use crate::source::{Rupture, RuptureRecord, Source, SourceKind, TrtID};
use anyhow::{Context, Result};
use itertools::Itertools;
use log::debug;
use std::borrow::Borrow;
use std::sync::OnceLock;

pub mod integration_distance;
pub mod split;
pub use integration_distance::{IntegrationDistance, MaximumDistance, RegionDistance};
pub use split::split_source;

/// Safety margin added to the distance used for prefiltering ruptures (km)
const RUPTURE_MARGIN: f64 = 10.0;

/// The sites associated with a source by the filter
#[derive(Debug, Clone, PartialEq)]
pub enum FilteredSites {
    /// No site collection was given, so no filtering took place
    Unfiltered,
    /// The sites close to the source
    Sites(SiteCollection),
}

impl FilteredSites {
    /// The sites, if any filtering took place
    pub fn sites(&self) -> Option<&SiteCollection> {
        match self {
            Self::Unfiltered => None,
            Self::Sites(sites) => Some(sites),
        }
    }
}

/// What to look for close sites around
#[derive(Debug, Clone, Copy)]
pub enum FilterTarget<'a> {
    /// A source, using its enlarged bounding box
    Source(&'a Source),
    /// A stored rupture, using the distance from its hypocentre
    Rupture(&'a RuptureRecord, &'a TrtID),
}

/// Associates sources with the sites lying within the integration distance
pub struct SourceFilter<'a> {
    sitecol: Option<&'a SiteCollection>,
    integration_distance: IntegrationDistance,
    filter_distance: DistanceMetric,
    index: OnceLock<SiteIndex>,
}

impl<'a> SourceFilter<'a> {
    /// Create a new [`SourceFilter`].
    ///
    /// If `sitecol` is `None` every source is accepted without filtering.
    pub fn new(
        sitecol: Option<&'a SiteCollection>,
        integration_distance: IntegrationDistance,
        filter_distance: DistanceMetric,
    ) -> Self {
        Self {
            sitecol,
            integration_distance,
            filter_distance,
            index: OnceLock::new(),
        }
    }

    /// The site collection being filtered
    pub fn sitecol(&self) -> Option<&'a SiteCollection> {
        self.sitecol
    }

    /// The integration distance used by the filter
    pub fn integration_distance(&self) -> &IntegrationDistance {
        &self.integration_distance
    }

    /// The spatial index over the complete site collection, built on first use
    fn index(&self, sitecol: &SiteCollection) -> &SiteIndex {
        self.index
            .get_or_init(|| SiteIndex::new(&sitecol.complete()))
    }

    /// The bounding box of the source enlarged by the maximum distance of its region.
    ///
    /// # Returns
    ///
    /// A [`BBoxError`] if the enlarged box would wrap around the whole globe.
    pub fn get_enlarged_box(
        &self,
        src: &Source,
        maxdist: Option<f64>,
    ) -> Result<BoundingBox, BBoxError> {
        let maxdist =
            maxdist.unwrap_or_else(|| self.integration_distance.evaluate(src.trt.as_str(), None));
        let bbox = src.bounding_box(maxdist)?;
        if bbox.width() >= 360.0 {
            return Err(BBoxError(format!(
                "The enlarged box of source {} is {} degrees wide",
                src.id,
                bbox.width()
            )));
        }

        Ok(bbox.normalized())
    }

    /// The lower left corner, width and height of the enlarged box of the source
    pub fn get_rectangle(&self, src: &Source) -> Result<(f64, f64, f64, f64), BBoxError> {
        let bbox = self.get_enlarged_box(src, None)?;

        Ok((
            bbox.min_lon,
            bbox.min_lat,
            bbox.width(),
            bbox.max_lat - bbox.min_lat,
        ))
    }

    /// The IDs of the sites close to a source or stored rupture.
    ///
    /// Sources are compared against their enlarged bounding box. If the box cannot be computed,
    /// all sites are returned. Ruptures are compared against a sphere centred on their
    /// hypocentre. A region with an integration distance of zero gets no sites.
    pub fn close_sids(&self, target: FilterTarget) -> Vec<u32> {
        let Some(sitecol) = self.sitecol else {
            return Vec::new();
        };
        if self.integration_distance.is_empty() {
            return sitecol.sids();
        }

        match target {
            FilterTarget::Source(src) => {
                if self.integration_distance.evaluate(src.trt.as_str(), None) <= 0.0 {
                    return Vec::new();
                }
                match self.get_enlarged_box(src, None) {
                    Ok(bbox) => sitecol.within_bbox(&bbox),
                    Err(err) => {
                        debug!("Not filtering source {}: {err}", src.id);
                        sitecol.sids()
                    }
                }
            }
            FilterTarget::Rupture(record, trt) => {
                let trt_dist = self.integration_distance.evaluate(trt.as_str(), None);
                if trt_dist <= 0.0 {
                    return Vec::new();
                }
                let dlon = get_longitudinal_extent(record.minlon, record.maxlon) / 2.0;
                let dlat = (record.maxlat - record.minlat) / 2.0;
                let dist = trt_dist + dlon.hypot(dlat) / KM_TO_DEGREES + RUPTURE_MARGIN;
                let sids = self.index(sitecol).within(record.hypo.xyz(), dist);
                if sitecol.is_complete() {
                    sids
                } else {
                    let wanted = sitecol.sids();
                    sids.into_iter()
                        .filter(|sid| wanted.binary_search(sid).is_ok())
                        .collect()
                }
            }
        }
    }

    /// The sites close to the source, or `None` if there are none
    pub fn get_close_sites(&self, src: &Source) -> Option<SiteCollection> {
        let sitecol = self.sitecol?;
        let sids = self.close_sids(FilterTarget::Source(src));
        if sids.is_empty() {
            None
        } else {
            Some(sitecol.filtered(&sids))
        }
    }

    /// The number of sites close to the source
    pub fn get_nsites(&self, src: &Source) -> usize {
        self.close_sids(FilterTarget::Source(src)).len()
    }

    /// Filter a single source
    fn filter_one<S: Borrow<Source>>(&self, src: S) -> Option<(S, FilteredSites)> {
        if self.sitecol.is_none() {
            return Some((src, FilteredSites::Unfiltered));
        }
        let sites = self.get_close_sites(src.borrow())?;

        Some((src, FilteredSites::Sites(sites)))
    }

    /// Pair each source with its close sites, discarding sources with none.
    ///
    /// Without a site collection every source is yielded with [`FilteredSites::Unfiltered`].
    pub fn filter<I, S>(&self, sources: I) -> impl Iterator<Item = (S, FilteredSites)>
    where
        I: IntoIterator<Item = S>,
        S: Borrow<Source>,
    {
        sources.into_iter().filter_map(|src| self.filter_one(src))
    }

    /// Split the sources close to the sites and filter the fragments again
    pub fn split<I, S>(&self, sources: I) -> impl Iterator<Item = (Source, FilteredSites)>
    where
        I: IntoIterator<Item = S>,
        S: Borrow<Source>,
    {
        self.filter(sources)
            .flat_map(|(src, _)| split_source(src.borrow()))
            .filter_map(|split| self.filter_one(split))
    }

    /// Split the sources more coarsely than [`SourceFilter::split`]: by magnitude.
    ///
    /// Fault systems and collapsed sources are kept whole. Sources with a magnitude-frequency
    /// distribution give one fragment per magnitude bin with a nonzero rate, and non-parametric
    /// sources one fragment per run of ruptures with the same magnitude. Fragments are filtered
    /// again and those far from all sites dropped.
    pub fn split_less<I, S>(&self, sources: I) -> impl Iterator<Item = Result<(Source, FilteredSites)>>
    where
        I: IntoIterator<Item = S>,
        S: Borrow<Source>,
    {
        self.filter(sources)
            .map(|(src, sites)| {
                let src = src.borrow();
                self.split_less_one(src, sites)
                    .with_context(|| format!("An error occurred with source id={}", src.id))
            })
            .flatten_ok()
    }

    fn split_less_one(
        &self,
        src: &Source,
        sites: FilteredSites,
    ) -> Result<Vec<(Source, FilteredSites)>> {
        if src.is_fault_system() || src.is_collapsed() {
            return Ok(vec![(src.clone(), sites)]);
        }

        if let Some(rates) = src.annual_occurrence_rates() {
            let mut fragments = Vec::new();
            for (mag, rate) in rates {
                if rate == 0.0 {
                    continue;
                }
                if let Some(kind) = src.with_single_rate(mag, rate)? {
                    fragments.push(src.fragment(src.id.clone(), kind));
                }
            }
            return Ok(fragments
                .into_iter()
                .filter_map(|fragment| self.filter_one(fragment))
                .collect());
        }

        if let SourceKind::NonParametric(np) = &src.kind {
            return Ok(np
                .group_by_mag()
                .into_iter()
                .map(|group| src.fragment(src.id.clone(), SourceKind::NonParametric(group)))
                .filter_map(|fragment| self.filter_one(fragment))
                .collect());
        }

        Ok(vec![(src.clone(), sites)])
    }

    /// The number of sites affected by each rupture of a source, using the filter distance
    fn count_affected_sites(&self, src: &Source, sites: &SiteCollection) -> u64 {
        let trt = src.trt.as_str();
        let ruptures: Box<dyn Iterator<Item = Rupture> + '_> =
            src.iter_point_ruptures().unwrap_or_else(|| src.iter_ruptures());

        ruptures
            .map(|rup| {
                let mut maxdist = self.integration_distance.evaluate(trt, Some(rup.mag));
                if rup.surface.is_none() {
                    maxdist += rup.mag * 10.0;
                }
                rup.distances(sites, self.filter_distance)
                    .into_iter()
                    .filter(|dist| *dist <= maxdist)
                    .count() as u64
            })
            .sum()
    }

    /// Estimate the computational weight of each source.
    ///
    /// Every source starts from 100 times its number of ruptures. Sources close to the sites add
    /// the number of sites affected by each of their ruptures (or simply ruptures times sites for
    /// fault systems). Collapsed sources then weigh three times more and sources without a single
    /// location ten times more.
    pub fn set_weight(&self, sources: &mut [Source]) {
        for src in sources.iter_mut() {
            if src.num_ruptures == 0 {
                src.num_ruptures = src.count_ruptures();
            }
            src.weight = f64::from(src.num_ruptures) * 100.0;
        }

        if let Some(sitecol) = self.sitecol {
            for src in sources.iter_mut() {
                let sids = self.close_sids(FilterTarget::Source(src));
                src.nsites = sids.len() as u64;
                if sids.is_empty() {
                    continue;
                }

                let extra = if src.is_fault_system() {
                    f64::from(src.num_ruptures) * sids.len() as f64
                } else {
                    let sites = sitecol.filtered(&sids);
                    self.count_affected_sites(src, &sites) as f64
                };
                src.weight += extra;
            }
        }

        for src in sources.iter_mut() {
            if src.is_collapsed() {
                src.weight *= 3.0;
            } else if src.location().is_none() {
                src.weight *= 10.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{
        area_source, idist, multi_fault_source, non_parametric_source, point_source, sitecol,
    };
    use crate::geo::{Mesh, Point, Surface};
    use crate::source::Occurrence;
    use rstest::rstest;

    fn source_filter(sitecol: &SiteCollection, idist: IntegrationDistance) -> SourceFilter<'_> {
        SourceFilter::new(Some(sitecol), idist, DistanceMetric::Rrup)
    }

    #[rstest]
    fn test_filter_keeps_close_sites(
        sitecol: SiteCollection,
        idist: IntegrationDistance,
        point_source: Source,
    ) {
        let filter = source_filter(&sitecol, idist);
        let filtered: Vec<_> = filter.filter([&point_source]).collect();
        assert_eq!(filtered.len(), 1);
        let sites = filtered[0].1.sites().unwrap();
        assert!(!sites.is_empty());
        assert!(sites.len() <= sitecol.len());
    }

    #[rstest]
    fn test_filter_discards_far_sources(
        sitecol: SiteCollection,
        idist: IntegrationDistance,
        mut point_source: Source,
    ) {
        let SourceKind::Point(src) = &mut point_source.kind else {
            unreachable!()
        };
        src.location = Point::new(60.0, 40.0, 0.0);
        let filter = source_filter(&sitecol, idist);
        assert_eq!(filter.filter([&point_source]).count(), 0);
    }

    #[rstest]
    fn test_zero_distance(sitecol: SiteCollection, point_source: Source) {
        let idist = IntegrationDistance::new(&MaximumDistance::Scalar(0.0)).unwrap();
        let filter = source_filter(&sitecol, idist);
        assert_eq!(filter.filter([&point_source]).count(), 0);
    }

    #[rstest]
    fn test_no_sitecol(idist: IntegrationDistance, point_source: Source) {
        let filter = SourceFilter::new(None, idist, DistanceMetric::Rrup);
        let filtered: Vec<_> = filter.filter([point_source]).collect();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].1, FilteredSites::Unfiltered);
    }

    #[rstest]
    fn test_empty_integration_distance(sitecol: SiteCollection, point_source: Source) {
        let filter = source_filter(&sitecol, IntegrationDistance::default());
        let filtered: Vec<_> = filter.filter([&point_source]).collect();
        assert_eq!(filtered[0].1, FilteredSites::Sites(sitecol.clone()));
    }

    #[rstest]
    fn test_bbox_error_keeps_all_sites(
        sitecol: SiteCollection,
        idist: IntegrationDistance,
        mut non_parametric_source: Source,
    ) {
        // Ruptures spread over more than 180 degrees of longitude
        let SourceKind::NonParametric(src) = &mut non_parametric_source.kind else {
            unreachable!()
        };
        for (rup, lon) in src.ruptures.iter_mut().zip([-100.0, 0.0, 100.0]) {
            rup.hypocenter.lon = lon;
            rup.surface = None;
        }

        let filter = source_filter(&sitecol, idist);
        assert!(filter.get_enlarged_box(&non_parametric_source, None).is_err());
        let filtered: Vec<_> = filter.filter([&non_parametric_source]).collect();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].1, FilteredSites::Sites(sitecol.clone()));
        assert!(filtered[0].1.sites().unwrap().is_complete());
    }

    #[rstest]
    fn test_close_sids_rupture(sitecol: SiteCollection, idist: IntegrationDistance) {
        let filter = source_filter(&sitecol, idist);
        let trt = TrtID::from("Active Shallow Crust");
        let record = RuptureRecord {
            minlon: 0.0,
            maxlon: 0.0,
            minlat: 0.0,
            maxlat: 0.0,
            hypo: Point::new(1.2, 1.2, 0.0),
        };

        // The fixture distance is 50 km, plus the 10 km margin: only the corner site
        let sids = filter.close_sids(FilterTarget::Rupture(&record, &trt));
        assert_eq!(sids.len(), 1);
        assert_eq!(sitecol.get(sids[0]).unwrap().location, Point::new(1.0, 1.0, 0.0));

        // A filtered collection only gives its own sites
        let subset = sitecol.filtered(&[0, 1, 2]);
        let filter = source_filter(&subset, filter.integration_distance().clone());
        assert!(filter.close_sids(FilterTarget::Rupture(&record, &trt)).is_empty());
    }

    #[rstest]
    fn test_split_preserves_ruptures(
        sitecol: SiteCollection,
        idist: IntegrationDistance,
        area_source: Source,
    ) {
        let filter = SourceFilter::new(None, idist.clone(), DistanceMetric::Rrup);
        let total: usize = filter
            .split([&area_source])
            .map(|(split, _)| split.iter_ruptures().count())
            .sum();
        assert_eq!(total as u32, area_source.count_ruptures());

        // With sites, every fragment has some
        let filter = source_filter(&sitecol, idist);
        for (_, sites) in filter.split([&area_source]) {
            assert!(!sites.sites().unwrap().is_empty());
        }
    }

    #[rstest]
    fn test_split_less(
        sitecol: SiteCollection,
        idist: IntegrationDistance,
        point_source: Source,
        multi_fault_source: Source,
    ) {
        let filter = source_filter(&sitecol, idist);
        let fragments: Vec<_> = filter
            .split_less([&point_source, &multi_fault_source])
            .collect::<Result<_>>()
            .unwrap();

        // Five magnitude bins plus the whole fault system
        assert_eq!(fragments.len(), 6);
        for (fragment, _) in &fragments[..5] {
            assert_eq!(fragment.id, point_source.id);
            assert_eq!(fragment.annual_occurrence_rates().unwrap().len(), 1);
            assert_eq!(fragment.num_ruptures, 2);
        }
        assert_eq!(fragments[5].0, multi_fault_source);
    }

    #[rstest]
    fn test_split_less_non_parametric(
        sitecol: SiteCollection,
        idist: IntegrationDistance,
        non_parametric_source: Source,
    ) {
        let filter = source_filter(&sitecol, idist);
        let fragments: Vec<_> = filter
            .split_less([&non_parametric_source])
            .collect::<Result<_>>()
            .unwrap();
        let total: u32 = fragments.iter().map(|(src, _)| src.num_ruptures).sum();
        assert!(fragments.len() > 1);
        assert_eq!(total, non_parametric_source.count_ruptures());
        for (fragment, _) in &fragments {
            let (lo, hi) = fragment.min_max_mag();
            assert_eq!(lo, hi);
        }
    }

    #[rstest]
    fn test_set_weight(
        sitecol: SiteCollection,
        idist: IntegrationDistance,
        point_source: Source,
        area_source: Source,
        multi_fault_source: Source,
    ) {
        let mut sources = vec![point_source, area_source, multi_fault_source];
        let filter = SourceFilter::new(None, idist.clone(), DistanceMetric::Rrup);
        filter.set_weight(&mut sources);
        assert_eq!(sources[0].weight, f64::from(sources[0].num_ruptures) * 100.0);
        assert_eq!(
            sources[1].weight,
            f64::from(sources[1].num_ruptures) * 100.0 * 10.0
        );

        let filter = source_filter(&sitecol, idist);
        filter.set_weight(&mut sources);
        let [point, area, fault] = &sources[..] else {
            unreachable!()
        };
        assert!(point.nsites > 0);
        assert!(point.weight > f64::from(point.num_ruptures) * 100.0);
        assert!(area.weight > f64::from(area.num_ruptures) * 1000.0);
        assert_eq!(
            fault.weight,
            (f64::from(fault.num_ruptures) * 100.0
                + f64::from(fault.num_ruptures) * fault.nsites as f64)
                * 10.0
        );
    }

    #[rstest]
    fn test_set_weight_collapsed(
        sitecol: SiteCollection,
        idist: IntegrationDistance,
        point_source: Source,
    ) {
        let SourceKind::Point(point) = &point_source.kind else {
            unreachable!()
        };
        let collapsed = crate::source::CollapsedPointSource {
            point_sources: vec![point.clone(), point.clone()],
        };
        let mut sources = vec![Source::new(
            "collapsed".into(),
            "Collapsed",
            point_source.trt.clone(),
            SourceKind::Collapsed(collapsed),
        )];
        let filter = SourceFilter::new(None, idist.clone(), DistanceMetric::Rrup);
        filter.set_weight(&mut sources);
        assert_eq!(sources[0].weight, 20.0 * 100.0 * 3.0);

        let filter = source_filter(&sitecol, idist);
        filter.set_weight(&mut sources);
        assert!(sources[0].weight > 20.0 * 100.0 * 3.0);
    }

    #[rstest]
    fn test_get_rectangle(sitecol: SiteCollection, idist: IntegrationDistance) {
        let rup = Rupture {
            mag: 6.0,
            rake: 0.0,
            trt: "Active Shallow Crust".into(),
            hypocenter: Point::new(179.9, 0.0, 10.0),
            surface: Some(Surface::Single(Mesh::new(vec![
                Point::new(179.9, 0.0, 0.0),
                Point::new(-179.9, 0.0, 10.0),
            ]))),
            occurrence: Occurrence::NonParametric {
                pmf: vec![0.9, 0.1],
            },
        };
        let src = Source::new(
            "idl".into(),
            "Across the date line",
            "Active Shallow Crust".into(),
            SourceKind::NonParametric(crate::source::NonParametricSource::new(vec![rup]).unwrap()),
        );
        let filter = source_filter(&sitecol, idist);
        let (lon, _, width, height) = filter.get_rectangle(&src).unwrap();
        assert!(lon > 179.0);
        assert!(width > 0.2 && width < 2.0);
        assert!(height > 0.0);
    }
}

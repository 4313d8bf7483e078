//! Point-like sources: point sources, area sources and collapsed groups of point sources.
use super::TrtID;
use super::rupture::{Occurrence, Rupture};
use crate::errors::BBoxError;
use crate::geo::{
    BoundingBox, KM_TO_DEGREES, Mesh, Point, Surface, angular_distance, cross_idl, fix_lon,
    get_bounding_box, point_in_polygon,
};
use crate::mfd::Mfd;
use anyhow::{Result, ensure};
use serde::Deserialize;

fn default_aspect_ratio() -> f64 {
    1.0
}

/// The orientation of the fault plane
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct NodalPlane {
    /// Strike in degrees clockwise from north
    pub strike: f64,
    /// Dip in degrees from horizontal
    pub dip: f64,
    /// Rake in degrees
    pub rake: f64,
}

/// Parameters shared by all point-like sources, describing the ruptures generated at a location
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RuptureParameters {
    /// Magnitude-frequency distribution
    pub mfd: Mfd,
    /// Fault plane orientation
    pub nodal_plane: NodalPlane,
    /// Hypocentral depths as (probability, depth) pairs
    pub hypo_depths: Vec<(f64, f64)>,
    /// Top of the seismogenic layer (km)
    pub upper_seismogenic_depth: f64,
    /// Bottom of the seismogenic layer (km)
    pub lower_seismogenic_depth: f64,
    /// Ratio of rupture length to width
    #[serde(default = "default_aspect_ratio")]
    pub rupture_aspect_ratio: f64,
}

impl RuptureParameters {
    /// Check that the parameters are consistent
    pub fn validate(&self) -> Result<()> {
        self.mfd.validate()?;
        let dip = self.nodal_plane.dip;
        ensure!(dip > 0.0 && dip <= 90.0, "Dip must be in the range (0, 90]");
        ensure!(
            self.upper_seismogenic_depth < self.lower_seismogenic_depth,
            "upper_seismogenic_depth must be shallower than lower_seismogenic_depth"
        );
        ensure!(
            self.rupture_aspect_ratio > 0.0,
            "rupture_aspect_ratio must be positive"
        );
        ensure!(!self.hypo_depths.is_empty(), "No hypocentral depths given");
        let total: f64 = self.hypo_depths.iter().map(|(prob, _)| prob).sum();
        ensure!(
            (total - 1.0).abs() < 1e-6,
            "Hypocentral depth probabilities must sum to one"
        );
        ensure!(
            self.hypo_depths.iter().all(|(_, depth)| {
                (self.upper_seismogenic_depth..=self.lower_seismogenic_depth).contains(depth)
            }),
            "Hypocentral depths must lie within the seismogenic layer"
        );

        Ok(())
    }

    /// The same parameters with a different magnitude-frequency distribution
    pub fn with_mfd(&self, mfd: Mfd) -> Self {
        Self { mfd, ..self.clone() }
    }

    /// Rupture length and width (km) for the given magnitude.
    ///
    /// The area follows the Wells and Coppersmith (1994) relation for all rupture types. The width
    /// is capped by the thickness of the seismogenic layer, with the length growing to compensate.
    pub fn rupture_dimensions(&self, mag: f64) -> (f64, f64) {
        let area = 10f64.powf(-3.49 + 0.91 * mag);
        let mut length = (area * self.rupture_aspect_ratio).sqrt();
        let mut width = area / length;
        let max_width = (self.lower_seismogenic_depth - self.upper_seismogenic_depth)
            / self.nodal_plane.dip.to_radians().sin();
        if width > max_width {
            width = max_width;
            length = area / width;
        }

        (length, width)
    }

    /// Half the diagonal of the surface projection of the largest rupture
    pub fn max_radius(&self) -> f64 {
        let (_, max_mag) = self.mfd.min_max_mag();
        let (length, width) = self.rupture_dimensions(max_mag);
        let projected_width = width * self.nodal_plane.dip.to_radians().cos();

        length.hypot(projected_width) / 2.0
    }

    /// The number of ruptures generated at a single location
    pub fn count_ruptures(&self, min_mag: f64) -> u32 {
        let num_mags = self
            .mfd
            .annual_occurrence_rates()
            .iter()
            .filter(|(mag, _)| *mag >= min_mag)
            .count();

        (num_mags * self.hypo_depths.len()) as u32
    }

    /// The planar rupture surface of the given magnitude centred on the hypocentre.
    ///
    /// The surface is shifted vertically to remain inside the seismogenic layer. It is described by
    /// its four corners and its centre.
    fn planar_surface(&self, mag: f64, hypocenter: Point) -> Surface {
        let (length, width) = self.rupture_dimensions(mag);
        let dip = self.nodal_plane.dip.to_radians();
        let strike = self.nodal_plane.strike;
        let half_vertical = width / 2.0 * dip.sin();
        let half_horizontal = width / 2.0 * dip.cos();

        let mut depth = hypocenter.depth;
        if depth - half_vertical < self.upper_seismogenic_depth {
            depth = self.upper_seismogenic_depth + half_vertical;
        }
        if depth + half_vertical > self.lower_seismogenic_depth {
            depth = self.lower_seismogenic_depth - half_vertical;
        }

        let centre = Point::new(hypocenter.lon, hypocenter.lat, depth);
        let top = centre.point_at(half_horizontal, -half_vertical, strike - 90.0);
        let bottom = centre.point_at(half_horizontal, half_vertical, strike + 90.0);
        let half_length = length / 2.0;

        Surface::Single(Mesh::new(vec![
            top.point_at(half_length, 0.0, strike + 180.0),
            top.point_at(half_length, 0.0, strike),
            bottom.point_at(half_length, 0.0, strike),
            bottom.point_at(half_length, 0.0, strike + 180.0),
            centre,
        ]))
    }

    /// Generate the ruptures at the given location.
    ///
    /// If `with_surface` is false the ruptures are treated as points, which is much cheaper.
    pub fn ruptures_at<'a>(
        &'a self,
        location: Point,
        trt: &'a TrtID,
        min_mag: f64,
        with_surface: bool,
    ) -> impl Iterator<Item = Rupture> + 'a {
        self.mfd
            .annual_occurrence_rates()
            .into_iter()
            .filter(move |(mag, _)| *mag >= min_mag)
            .flat_map(move |(mag, rate)| {
                self.hypo_depths.iter().map(move |(prob, depth)| {
                    let hypocenter = Point::new(location.lon, location.lat, *depth);
                    Rupture {
                        mag,
                        rake: self.nodal_plane.rake,
                        trt: trt.clone(),
                        hypocenter,
                        surface: with_surface.then(|| self.planar_surface(mag, hypocenter)),
                        occurrence: Occurrence::Poissonian { rate: rate * prob },
                    }
                })
            })
    }
}

/// A source located at a single point
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PointSource {
    /// Epicentre of the ruptures
    pub location: Point,
    /// Parameters of the generated ruptures
    #[serde(flatten)]
    pub params: RuptureParameters,
}

impl PointSource {
    /// The box around the source enlarged by `maxdist` km plus the radius of the largest rupture
    pub fn bounding_box(&self, maxdist: f64) -> Result<BoundingBox, BBoxError> {
        get_bounding_box(
            [(self.location.lon, self.location.lat)],
            maxdist + self.params.max_radius(),
        )
    }
}

/// A source distributing seismicity uniformly over a polygon.
///
/// The polygon is discretised into a grid of point sources, each carrying an equal share of the
/// total rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaSource {
    /// Polygon vertices as (lon, lat) pairs
    pub polygon: Vec<(f64, f64)>,
    /// Grid spacing in km
    pub spacing: f64,
    /// Parameters of the ruptures of the whole area
    pub params: RuptureParameters,
    grid: Vec<Point>,
    point_params: RuptureParameters,
}

impl AreaSource {
    /// Create a new [`AreaSource`], discretising the polygon with the given spacing
    pub fn new(polygon: Vec<(f64, f64)>, spacing: f64, params: RuptureParameters) -> Result<Self> {
        ensure!(polygon.len() >= 3, "An area polygon needs at least 3 vertices");
        ensure!(spacing > 0.0, "Area discretisation spacing must be positive");
        params.validate()?;

        let grid = discretize_polygon(&polygon, spacing);
        let point_params = params.with_mfd(params.mfd.scaled(1.0 / grid.len() as f64));

        Ok(Self {
            polygon,
            spacing,
            params,
            grid,
            point_params,
        })
    }

    /// The locations of the point sources making up the area
    pub fn grid(&self) -> &[Point] {
        &self.grid
    }

    /// The point sources making up the area
    pub fn point_sources(&self) -> Vec<PointSource> {
        self.grid
            .iter()
            .map(|location| PointSource {
                location: *location,
                params: self.point_params.clone(),
            })
            .collect()
    }

    /// Generate the ruptures of every grid point
    pub fn ruptures<'a>(
        &'a self,
        trt: &'a TrtID,
        min_mag: f64,
        with_surface: bool,
    ) -> impl Iterator<Item = Rupture> + 'a {
        self.grid.iter().flat_map(move |location| {
            self.point_params
                .ruptures_at(*location, trt, min_mag, with_surface)
        })
    }

    /// The number of ruptures generated by the area
    pub fn count_ruptures(&self, min_mag: f64) -> u32 {
        self.point_params.count_ruptures(min_mag) * self.grid.len() as u32
    }

    /// The box around the polygon enlarged by `maxdist` km plus the radius of the largest rupture
    pub fn bounding_box(&self, maxdist: f64) -> Result<BoundingBox, BBoxError> {
        get_bounding_box(
            self.polygon.iter().copied(),
            maxdist + self.params.max_radius(),
        )
    }
}

/// Lay a regular grid over the polygon and keep the nodes falling inside it.
///
/// Polygons too small to contain any node are represented by the centre of their bounding box.
fn discretize_polygon(polygon: &[(f64, f64)], spacing: f64) -> Vec<Point> {
    let lons: Vec<f64> = polygon.iter().map(|(lon, _)| *lon).collect();
    let shifted: Vec<(f64, f64)> = if cross_idl(&lons) {
        polygon
            .iter()
            .map(|(lon, lat)| (if *lon < 0.0 { lon + 360.0 } else { *lon }, *lat))
            .collect()
    } else {
        polygon.to_vec()
    };

    let min_lon = shifted.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let max_lon = shifted.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let min_lat = shifted.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let max_lat = shifted.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);

    let dlat = spacing * KM_TO_DEGREES;
    let mut grid = Vec::new();
    let mut lat = min_lat + dlat / 2.0;
    while lat < max_lat {
        let dlon = angular_distance(spacing, lat, None);
        let mut lon = min_lon + dlon / 2.0;
        while lon < max_lon {
            if point_in_polygon(lon, lat, &shifted) {
                grid.push(Point::new(fix_lon(lon), lat, 0.0));
            }
            lon += dlon;
        }
        lat += dlat;
    }

    if grid.is_empty() {
        grid.push(Point::new(
            fix_lon((min_lon + max_lon) / 2.0),
            (min_lat + max_lat) / 2.0,
            0.0,
        ));
    }

    grid
}

/// A group of point sources sharing a tectonic region, treated as a single source
#[derive(Debug, Clone, PartialEq)]
pub struct CollapsedPointSource {
    /// The point sources in the group
    pub point_sources: Vec<PointSource>,
}

impl CollapsedPointSource {
    /// Generate the ruptures of every point source in the group
    pub fn ruptures<'a>(
        &'a self,
        trt: &'a TrtID,
        min_mag: f64,
        with_surface: bool,
    ) -> impl Iterator<Item = Rupture> + 'a {
        self.point_sources.iter().flat_map(move |src| {
            src.params
                .ruptures_at(src.location, trt, min_mag, with_surface)
        })
    }

    /// The number of ruptures generated by the group
    pub fn count_ruptures(&self, min_mag: f64) -> u32 {
        self.point_sources
            .iter()
            .map(|src| src.params.count_ruptures(min_mag))
            .sum()
    }

    /// The smallest and largest magnitude of the group
    pub fn min_max_mag(&self) -> (f64, f64) {
        self.point_sources
            .iter()
            .map(|src| src.params.mfd.min_max_mag())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (a, b)| {
                (lo.min(a), hi.max(b))
            })
    }

    /// The box around the group enlarged by `maxdist` km plus the radius of the largest rupture
    pub fn bounding_box(&self, maxdist: f64) -> Result<BoundingBox, BBoxError> {
        let radius = self
            .point_sources
            .iter()
            .map(|src| src.params.max_radius())
            .fold(0.0, f64::max);

        get_bounding_box(
            self.point_sources
                .iter()
                .map(|src| (src.location.lon, src.location.lat)),
            maxdist + radius,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::rupture_parameters;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn test_validate(rupture_parameters: RuptureParameters) {
        assert!(rupture_parameters.validate().is_ok());

        let mut params = rupture_parameters.clone();
        params.hypo_depths = vec![(0.5, 5.0)];
        assert!(params.validate().is_err());

        let mut params = rupture_parameters;
        params.hypo_depths = vec![(1.0, 50.0)];
        assert!(params.validate().is_err());
    }

    #[rstest]
    fn test_rupture_dimensions(rupture_parameters: RuptureParameters) {
        // A small rupture is square
        let (length, width) = rupture_parameters.rupture_dimensions(5.0);
        assert_approx_eq!(f64, length, width, epsilon = 1e-9);
        assert_approx_eq!(f64, length * width, 10f64.powf(-3.49 + 4.55), epsilon = 1e-9);

        // A large rupture is limited by the 20 km thick seismogenic layer
        let (length, width) = rupture_parameters.rupture_dimensions(7.5);
        assert_approx_eq!(f64, width, 20.0, epsilon = 1e-9);
        assert!(length > width);
    }

    #[rstest]
    fn test_ruptures_at(rupture_parameters: RuptureParameters) {
        let trt = TrtID::from("Active Shallow Crust");
        let location = Point::new(0.0, 0.0, 0.0);
        let ruptures: Vec<_> = rupture_parameters
            .ruptures_at(location, &trt, 0.0, true)
            .collect();
        assert_eq!(
            ruptures.len() as u32,
            rupture_parameters.count_ruptures(0.0)
        );

        for rup in &ruptures {
            let surface = rup.surface.as_ref().unwrap();
            for point in surface.iter_points() {
                assert!(point.depth >= 0.0 - 1e-9 && point.depth <= 20.0 + 1e-9);
            }
        }

        // The total rate is preserved
        let total: f64 = ruptures
            .iter()
            .map(|rup| match rup.occurrence {
                Occurrence::Poissonian { rate } => rate,
                Occurrence::NonParametric { .. } => unreachable!(),
            })
            .sum();
        let expected: f64 = rupture_parameters
            .mfd
            .annual_occurrence_rates()
            .iter()
            .map(|(_, rate)| rate)
            .sum();
        assert_approx_eq!(f64, total, expected, epsilon = 1e-12);

        // Magnitudes below the threshold are discarded
        assert!(
            rupture_parameters
                .ruptures_at(location, &trt, 5.5, false)
                .all(|rup| rup.mag >= 5.5 && rup.surface.is_none())
        );
    }

    #[rstest]
    fn test_area_source_grid(rupture_parameters: RuptureParameters) {
        let polygon = vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        let area = AreaSource::new(polygon, 20.0, rupture_parameters.clone()).unwrap();
        assert!(area.grid().len() > 1);
        for point in area.grid() {
            assert!(point.lon > 0.0 && point.lon < 1.0);
            assert!(point.lat > 0.0 && point.lat < 1.0);
        }

        // The rates of the grid points add up to the rate of the area
        let total = |params: &RuptureParameters| -> f64 {
            params
                .mfd
                .annual_occurrence_rates()
                .iter()
                .map(|(_, rate)| rate)
                .sum()
        };
        let sum: f64 = area.point_sources().iter().map(|src| total(&src.params)).sum();
        assert_approx_eq!(f64, sum, total(&rupture_parameters), epsilon = 1e-12);
    }

    #[rstest]
    fn test_tiny_area_source(rupture_parameters: RuptureParameters) {
        let polygon = vec![(0.0, 0.0), (0.01, 0.0), (0.01, 0.01), (0.0, 0.01)];
        let area = AreaSource::new(polygon, 50.0, rupture_parameters).unwrap();
        assert_eq!(area.grid().len(), 1);
        assert_approx_eq!(f64, area.grid()[0].lon, 0.005, epsilon = 1e-9);
    }

    #[rstest]
    fn test_area_source_across_idl(rupture_parameters: RuptureParameters) {
        let polygon = vec![(179.5, 0.0), (-179.5, 0.0), (-179.5, 1.0), (179.5, 1.0)];
        let area = AreaSource::new(polygon, 20.0, rupture_parameters).unwrap();
        assert!(area.grid().len() > 1);
        assert!(
            area.grid()
                .iter()
                .all(|point| point.lon > 179.5 || point.lon < -179.5)
        );
    }
}

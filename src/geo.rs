//! Geographic utilities: points, distances, longitude handling and bounding boxes.
//!
//! Longitudes are in decimal degrees in the range [-180, 180), latitudes in decimal degrees and
//! depths in km (positive downwards). All distances are in km.
use crate::errors::BBoxError;
use serde::Deserialize;

pub mod surface;
pub use surface::{DistanceMetric, Mesh, Surface};

/// Conversion factor from km to degrees of latitude (1 degree is about 111 km)
pub const KM_TO_DEGREES: f64 = 0.008_993_2;

/// Mean radius of the Earth in km
pub const EARTH_RADIUS: f64 = 6371.0;

/// A point on or below the surface of the Earth
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Point {
    /// Longitude in degrees
    pub lon: f64,
    /// Latitude in degrees
    pub lat: f64,
    /// Depth in km
    #[serde(default)]
    pub depth: f64,
}

impl Point {
    /// Create a new [`Point`]
    pub fn new(lon: f64, lat: f64, depth: f64) -> Self {
        Self { lon, lat, depth }
    }

    /// Great circle distance between the surface projections of two points
    pub fn epicentral_distance(&self, other: &Point) -> f64 {
        geodetic_distance(self.lon, self.lat, other.lon, other.lat)
    }

    /// Distance between two points, taking depth into account
    pub fn distance(&self, other: &Point) -> f64 {
        let hdist = self.epicentral_distance(other);
        let vdist = self.depth - other.depth;
        hdist.hypot(vdist)
    }

    /// The point reached by moving `horizontal_distance` km along `azimuth` (degrees clockwise
    /// from north) and `vertical_increment` km downwards.
    pub fn point_at(&self, horizontal_distance: f64, vertical_increment: f64, azimuth: f64) -> Point {
        let lat = self.lat.to_radians();
        let lon = self.lon.to_radians();
        let tc = azimuth.to_radians();
        let delta = horizontal_distance / EARTH_RADIUS;
        let (sin_delta, cos_delta) = delta.sin_cos();

        let sin_lat2 = lat.sin() * cos_delta + lat.cos() * sin_delta * tc.cos();
        let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();
        let dlon = (tc.sin() * sin_delta * lat.cos()).atan2(cos_delta - lat.sin() * sin_lat2);

        Point {
            lon: fix_lon((lon + dlon).to_degrees()),
            lat: lat2.to_degrees(),
            depth: self.depth + vertical_increment,
        }
    }

    /// Cartesian coordinates of the point (see [`spherical_to_cartesian`])
    pub fn xyz(&self) -> [f64; 3] {
        spherical_to_cartesian(self.lon, self.lat, self.depth)
    }
}

/// A box in longitude/latitude space.
///
/// If `min_lon > max_lon` the box crosses the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Western edge
    pub min_lon: f64,
    /// Southern edge
    pub min_lat: f64,
    /// Eastern edge
    pub max_lon: f64,
    /// Northern edge
    pub max_lat: f64,
}

impl BoundingBox {
    /// Whether the surface projection of the given location lies strictly inside the box
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        if !(self.min_lat < lat && lat < self.max_lat) {
            return false;
        }

        let lon = fix_lon(lon);
        if self.min_lon <= self.max_lon {
            self.min_lon < lon && lon < self.max_lon
        } else {
            lon > self.min_lon || lon < self.max_lon
        }
    }

    /// The width of the box in degrees of longitude
    pub fn width(&self) -> f64 {
        if self.min_lon <= self.max_lon {
            self.max_lon - self.min_lon
        } else {
            self.max_lon + 360.0 - self.min_lon
        }
    }

    /// The same box with both longitudes brought into [-180, 180).
    ///
    /// Boxes whose edges straddle the date line end up with `min_lon > max_lon`.
    pub fn normalized(&self) -> BoundingBox {
        BoundingBox {
            min_lon: fix_lon(self.min_lon),
            max_lon: fix_lon(self.max_lon),
            ..*self
        }
    }
}

/// Great circle distance between two locations, using the haversine formula
pub fn geodetic_distance(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS * a.sqrt().clamp(0.0, 1.0).asin()
}

/// Normalise a longitude into the range [-180, 180)
pub fn fix_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// The signed longitudinal extent going east from `lon1` to `lon2`, in the range [-180, 180)
pub fn get_longitudinal_extent(lon1: f64, lon2: f64) -> f64 {
    (lon2 - lon1 + 180.0).rem_euclid(360.0) - 180.0
}

/// Whether a set of longitudes straddles the international date line.
///
/// This is the case if the extreme longitudes have different signs and are more than 180
/// degrees apart.
pub fn cross_idl(lons: &[f64]) -> bool {
    let l1 = lons.iter().copied().fold(f64::INFINITY, f64::min);
    let l2 = lons.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    l1 * l2 < 0.0 && (l1 - l2).abs() > 180.0
}

/// Convert a distance in km into degrees of longitude at the given latitude.
///
/// If `lat2` is given, the most poleward of the two latitudes is used.
pub fn angular_distance(km: f64, lat: f64, lat2: Option<f64>) -> f64 {
    let lat = match lat2 {
        Some(lat2) => lat.abs().max(lat2.abs()),
        None => lat,
    };

    km * KM_TO_DEGREES / lat.to_radians().cos()
}

/// Convert spherical coordinates to Cartesian ones, with the origin at the Earth's centre
pub fn spherical_to_cartesian(lon: f64, lat: f64, depth: f64) -> [f64; 3] {
    let phi = lon.to_radians();
    let theta = lat.to_radians();
    let rr = EARTH_RADIUS - depth;
    let cos_theta_r = rr * theta.cos();

    [cos_theta_r * phi.cos(), cos_theta_r * phi.sin(), rr * theta.sin()]
}

/// Compute the smallest box containing a set of locations, given as (lon, lat) pairs.
///
/// Sets of points lying on both sides of the date line give a box with `min_lon > max_lon`.
pub fn get_spherical_bounding_box<I>(locations: I) -> Result<BoundingBox, BBoxError>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (lons, lats): (Vec<f64>, Vec<f64>) = locations.into_iter().unzip();
    if lons.is_empty() {
        return Err(BBoxError("empty set of points".into()));
    }
    if lons.iter().chain(lats.iter()).any(|x| !x.is_finite()) {
        return Err(BBoxError("non-finite coordinates".into()));
    }

    let north = lats.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let south = lats.iter().copied().fold(f64::INFINITY, f64::min);
    let mut west = lons.iter().copied().fold(f64::INFINITY, f64::min);
    let mut east = lons.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if get_longitudinal_extent(west, east) < 0.0 {
        // Points are lying on both sides of the international date line
        west = lons
            .iter()
            .copied()
            .filter(|lon| *lon > 0.0)
            .fold(f64::INFINITY, f64::min);
        east = lons
            .iter()
            .copied()
            .filter(|lon| *lon < 0.0)
            .fold(f64::NEG_INFINITY, f64::max);
        let spans_less_than_180 = lons.iter().all(|lon| {
            get_longitudinal_extent(west, *lon) >= 0.0 && get_longitudinal_extent(*lon, east) >= 0.0
        });
        if !west.is_finite() || !east.is_finite() || !spans_less_than_180 {
            return Err(BBoxError(
                "points collection has longitudinal extent wider than 180 deg".into(),
            ));
        }
    }

    Ok(BoundingBox {
        min_lon: west,
        min_lat: south,
        max_lon: east,
        max_lat: north,
    })
}

/// Enlarge the bounding box of a set of locations by `maxdist` km on every side.
///
/// The longitudes of the result are not normalised, so the eastern edge may exceed 180 degrees
/// for boxes crossing the date line.
pub fn get_bounding_box<I>(locations: I, maxdist: f64) -> Result<BoundingBox, BBoxError>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let bbox = get_spherical_bounding_box(locations)?;
    let max_lon = if bbox.min_lon > bbox.max_lon {
        bbox.max_lon + 360.0
    } else {
        bbox.max_lon
    };

    let a1 = (maxdist * KM_TO_DEGREES).min(90.0);
    let a2 = angular_distance(maxdist, bbox.min_lat, Some(bbox.max_lat)).min(180.0);

    Ok(BoundingBox {
        min_lon: bbox.min_lon - a2,
        min_lat: bbox.min_lat - a1,
        max_lon: max_lon + a2,
        max_lat: bbox.max_lat + a1,
    })
}

/// Whether a location lies inside a polygon, using ray casting on the lon/lat plane.
///
/// Polygon vertices are given in order, without repeating the first vertex.
pub fn point_in_polygon(lon: f64, lat: f64, polygon: &[(f64, f64)]) -> bool {
    let mut inside = false;
    let n = polygon.len();
    for i in 0..n {
        let (x1, y1) = polygon[i];
        let (x2, y2) = polygon[(i + 1) % n];
        if (y1 > lat) != (y2 > lat) && lon < (x2 - x1) * (lat - y1) / (y2 - y1) + x1 {
            inside = !inside;
        }
    }

    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(180.0, -180.0)]
    #[case(-180.0, -180.0)]
    #[case(190.0, -170.0)]
    #[case(-190.0, 170.0)]
    #[case(540.0, -180.0)]
    fn test_fix_lon(#[case] lon: f64, #[case] expected: f64) {
        assert_approx_eq!(f64, fix_lon(lon), expected);
    }

    #[rstest]
    #[case(10.0, 20.0, 10.0)]
    #[case(20.0, 10.0, -10.0)]
    #[case(170.0, -170.0, 20.0)]
    #[case(-170.0, 170.0, -20.0)]
    fn test_get_longitudinal_extent(#[case] lon1: f64, #[case] lon2: f64, #[case] expected: f64) {
        assert_approx_eq!(f64, get_longitudinal_extent(lon1, lon2), expected);
    }

    #[test]
    fn test_cross_idl() {
        assert!(cross_idl(&[179.0, -179.0]));
        assert!(!cross_idl(&[-10.0, 10.0]));
        assert!(!cross_idl(&[10.0, 170.0]));
    }

    #[test]
    fn test_geodetic_distance() {
        // One degree along the equator
        assert_approx_eq!(
            f64,
            geodetic_distance(0.0, 0.0, 1.0, 0.0),
            111.194_926_6,
            epsilon = 1e-6
        );
        assert_approx_eq!(f64, geodetic_distance(10.0, 45.0, 10.0, 45.0), 0.0);
    }

    #[test]
    fn test_point_distance_with_depth() {
        let p1 = Point::new(0.0, 0.0, 0.0);
        let p2 = Point::new(0.0, 0.0, 10.0);
        assert_approx_eq!(f64, p1.distance(&p2), 10.0);
    }

    #[rstest]
    #[case(0.0)]
    #[case(90.0)]
    #[case(215.0)]
    fn test_point_at_distance(#[case] azimuth: f64) {
        let start = Point::new(10.0, 40.0, 5.0);
        let end = start.point_at(50.0, 2.0, azimuth);
        assert_approx_eq!(f64, start.epicentral_distance(&end), 50.0, epsilon = 1e-6);
        assert_approx_eq!(f64, end.depth, 7.0);
    }

    #[test]
    fn test_spherical_to_cartesian() {
        let [x, y, z] = spherical_to_cartesian(0.0, 0.0, 0.0);
        assert_approx_eq!(f64, x, EARTH_RADIUS);
        assert_approx_eq!(f64, y, 0.0);
        assert_approx_eq!(f64, z, 0.0);

        let [_, _, z] = spherical_to_cartesian(0.0, 90.0, 10.0);
        assert_approx_eq!(f64, z, EARTH_RADIUS - 10.0);
    }

    #[test]
    fn test_spherical_bounding_box_across_idl() {
        let bbox = get_spherical_bounding_box([(178.0, 1.0), (-178.0, 2.0)]).unwrap();
        assert_eq!(
            bbox,
            BoundingBox {
                min_lon: 178.0,
                min_lat: 1.0,
                max_lon: -178.0,
                max_lat: 2.0
            }
        );
    }

    #[rstest]
    #[case(vec![])]
    #[case(vec![(f64::NAN, 0.0)])]
    #[case(vec![(-100.0, 0.0), (0.0, 0.0), (100.0, 0.0)])]
    fn test_spherical_bounding_box_invalid(#[case] locations: Vec<(f64, f64)>) {
        assert!(get_spherical_bounding_box(locations).is_err());
    }

    #[test]
    fn test_get_bounding_box() {
        let bbox = get_bounding_box([(0.0, 0.0)], 111.0).unwrap();
        assert_approx_eq!(f64, bbox.max_lat, 111.0 * KM_TO_DEGREES);
        assert_approx_eq!(f64, bbox.min_lat, -111.0 * KM_TO_DEGREES);
        assert_approx_eq!(f64, bbox.max_lon, 111.0 * KM_TO_DEGREES);
        assert_approx_eq!(f64, bbox.min_lon, -111.0 * KM_TO_DEGREES);
    }

    #[test]
    fn test_bounding_box_contains() {
        let bbox = BoundingBox {
            min_lon: -1.0,
            min_lat: -1.0,
            max_lon: 1.0,
            max_lat: 1.0,
        };
        assert!(bbox.contains(0.0, 0.0));
        assert!(!bbox.contains(1.0, 0.0)); // edges are excluded
        assert!(!bbox.contains(0.0, 2.0));

        let across_idl = BoundingBox {
            min_lon: 170.0,
            min_lat: -1.0,
            max_lon: -170.0,
            max_lat: 1.0,
        };
        assert!(across_idl.contains(175.0, 0.0));
        assert!(across_idl.contains(-175.0, 0.0));
        assert!(!across_idl.contains(0.0, 0.0));
        assert_approx_eq!(f64, across_idl.width(), 20.0);
    }

    #[test]
    fn test_bounding_box_normalized() {
        let bbox = get_bounding_box([(178.0, 0.0), (-178.0, 1.0)], 0.0).unwrap();
        assert_approx_eq!(f64, bbox.max_lon, 182.0);
        assert!(!bbox.contains(-179.0, 0.5));

        let bbox = bbox.normalized();
        assert_approx_eq!(f64, bbox.min_lon, 178.0);
        assert_approx_eq!(f64, bbox.max_lon, -178.0);
        assert!(bbox.contains(-179.0, 0.5));
    }

    #[test]
    fn test_point_in_polygon() {
        let square = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        assert!(point_in_polygon(0.5, 0.5, &square));
        assert!(!point_in_polygon(1.5, 0.5, &square));
    }
}

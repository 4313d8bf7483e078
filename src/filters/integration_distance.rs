//! The maximum distance from a source at which sites are still considered, by tectonic region type
//! and magnitude.
use crate::errors::ConfigurationError;
use crate::geo::{BoundingBox, KM_TO_DEGREES, angular_distance};
use crate::source::TrtID;
use anyhow::Result;
use indexmap::IndexMap;
use serde::Deserialize;

/// The distance used for regions with no configured distance (km)
pub const MAX_DISTANCE: f64 = 2000.0;

/// The region key whose distance applies to all regions not listed explicitly
pub const DEFAULT_TRT: &str = "default";

/// Magnitudes used for control points built from a single distance
const MIN_MAG: f64 = 1.0;
const MAX_MAG: f64 = 10.0;

/// The distance configured for a single region
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RegionDistance {
    /// The same distance for all magnitudes
    Scalar(f64),
    /// (magnitude, distance) control points
    Points(Vec<(f64, f64)>),
}

/// The `maximum_distance` parameter as written in the job file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MaximumDistance {
    /// The same distance for all regions and magnitudes
    Scalar(f64),
    /// A distance for each region, with [`DEFAULT_TRT`] for all the others
    PerRegion(IndexMap<String, RegionDistance>),
}

/// Magnitude-dependent maximum distances for each tectonic region type.
///
/// Each region maps to control points sorted by magnitude, with distances linearly interpolated in
/// between and clamped outside. An empty policy means "no filtering".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IntegrationDistance(IndexMap<TrtID, Vec<(f64, f64)>>);

impl IntegrationDistance {
    /// Build the policy from the job configuration.
    ///
    /// # Returns
    ///
    /// A [`ConfigurationError`] if a magnitude is outside [1, 10], if a distance is negative or if
    /// the control points of a region are duplicated or unsorted.
    pub fn new(spec: &MaximumDistance) -> Result<Self> {
        let regions: Vec<(&str, RegionDistance)> = match spec {
            MaximumDistance::Scalar(dist) => vec![(DEFAULT_TRT, RegionDistance::Scalar(*dist))],
            MaximumDistance::PerRegion(map) => map
                .iter()
                .map(|(trt, dist)| (trt.as_str(), dist.clone()))
                .collect(),
        };

        let mut map = IndexMap::new();
        for (trt, dist) in regions {
            let points = match dist {
                RegionDistance::Scalar(dist) => vec![(MIN_MAG, dist), (MAX_MAG, dist)],
                RegionDistance::Points(points) => points,
            };
            check_points(trt, &points)?;
            map.insert(TrtID::from(trt), points);
        }

        Ok(Self(map))
    }

    /// Whether no distance has been configured
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The control points of a region, falling back on the default region
    fn points(&self, trt: &str) -> Option<&[(f64, f64)]> {
        self.0
            .get(trt)
            .or_else(|| self.0.get(DEFAULT_TRT))
            .map(Vec::as_slice)
    }

    /// The maximum distance for the given region and magnitude.
    ///
    /// Without a magnitude, the distance of the largest control point is returned. Regions with no
    /// configured distance and no default get [`MAX_DISTANCE`].
    pub fn evaluate(&self, trt: &str, mag: Option<f64>) -> f64 {
        let Some(points) = self.points(trt) else {
            return MAX_DISTANCE;
        };
        let Some(&(_, tail)) = points.last() else {
            return MAX_DISTANCE;
        };

        match mag {
            None => tail,
            Some(mag) => interpolate(points, mag),
        }
    }

    /// The largest distance for each configured region
    pub fn max_per_region(&self) -> IndexMap<TrtID, f64> {
        self.0
            .iter()
            .filter_map(|(trt, points)| points.last().map(|(_, dist)| (trt.clone(), *dist)))
            .collect()
    }

    /// The box around a location covering the maximum distance for a region and magnitude
    pub fn bounding_box(&self, lon: f64, lat: f64, trt: &str, mag: Option<f64>) -> BoundingBox {
        let maxdist = self.evaluate(trt, mag);
        let a1 = (maxdist * KM_TO_DEGREES).min(90.0);
        let a2 = angular_distance(maxdist, lat, None).min(180.0);

        BoundingBox {
            min_lon: lon - a2,
            min_lat: lat - a1,
            max_lon: lon + a2,
            max_lat: lat + a1,
        }
    }
}

/// Check the control points of a single region
fn check_points(trt: &str, points: &[(f64, f64)]) -> Result<()> {
    let err = |msg: String| -> anyhow::Error { ConfigurationError(msg).into() };

    if points.is_empty() {
        return Err(err(format!("No distances given for {trt}")));
    }
    for (mag, dist) in points {
        if !(MIN_MAG..=MAX_MAG).contains(mag) {
            return Err(err(format!(
                "Magnitude {mag} for {trt} is outside the range [{MIN_MAG}, {MAX_MAG}]"
            )));
        }
        if !dist.is_finite() || *dist < 0.0 {
            return Err(err(format!("Invalid distance {dist} for {trt}")));
        }
    }
    if !points.windows(2).all(|w| w[0].0 < w[1].0) {
        return Err(err(format!(
            "The magnitudes for {trt} must be sorted and unique: {points:?}"
        )));
    }

    Ok(())
}

/// Linear interpolation of the distance at `mag`, clamped to the end points
fn interpolate(points: &[(f64, f64)], mag: f64) -> f64 {
    let (first_mag, first_dist) = points[0];
    let (last_mag, last_dist) = points[points.len() - 1];
    if mag <= first_mag {
        return first_dist;
    }
    if mag >= last_mag {
        return last_dist;
    }

    points
        .windows(2)
        .find(|w| mag <= w[1].0)
        .map_or(last_dist, |w| {
            let (m0, d0) = w[0];
            let (m1, d1) = w[1];
            d0 + (d1 - d0) * (mag - m0) / (m1 - m0)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn per_region(entries: &[(&str, RegionDistance)]) -> MaximumDistance {
        MaximumDistance::PerRegion(
            entries
                .iter()
                .map(|(trt, dist)| ((*trt).to_string(), dist.clone()))
                .collect(),
        )
    }

    fn idist() -> IntegrationDistance {
        IntegrationDistance::new(&per_region(&[
            (
                "Active Shallow Crust",
                RegionDistance::Points(vec![(5.0, 100.0), (6.0, 200.0), (7.0, 300.0)]),
            ),
            ("default", RegionDistance::Scalar(50.0)),
        ]))
        .unwrap()
    }

    #[rstest]
    #[case(Some(4.0), 100.0)]
    #[case(Some(5.0), 100.0)]
    #[case(Some(5.5), 150.0)]
    #[case(Some(6.75), 275.0)]
    #[case(Some(9.0), 300.0)]
    #[case(None, 300.0)]
    fn test_evaluate(#[case] mag: Option<f64>, #[case] expected: f64) {
        assert_approx_eq!(
            f64,
            idist().evaluate("Active Shallow Crust", mag),
            expected,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_evaluate_fallbacks() {
        assert_eq!(idist().evaluate("Stable Continental", Some(6.0)), 50.0);

        let idist = IntegrationDistance::new(&per_region(&[(
            "Active Shallow Crust",
            RegionDistance::Scalar(100.0),
        )]))
        .unwrap();
        assert_eq!(idist.evaluate("Stable Continental", None), MAX_DISTANCE);
    }

    #[test]
    fn test_scalar() {
        let idist = IntegrationDistance::new(&MaximumDistance::Scalar(200.0)).unwrap();
        for mag in [1.0, 5.0, 10.0] {
            assert_eq!(idist.evaluate("any", Some(mag)), 200.0);
        }
        assert_eq!(
            idist.max_per_region(),
            IndexMap::from([(TrtID::from(DEFAULT_TRT), 200.0)])
        );
    }

    #[test]
    fn test_monotonic_and_idempotent() {
        let idist = idist();
        let mut last = 0.0;
        for i in 0..=100 {
            let mag = 1.0 + 0.09 * f64::from(i);
            let dist = idist.evaluate("Active Shallow Crust", Some(mag));
            assert!(dist >= last);
            assert_eq!(dist, idist.evaluate("Active Shallow Crust", Some(mag)));
            last = dist;
        }
    }

    #[rstest]
    #[case(vec![(6.0, 100.0), (5.0, 200.0)])]
    #[case(vec![(5.0, 100.0), (5.0, 200.0)])]
    #[case(vec![(0.5, 100.0)])]
    #[case(vec![(11.0, 100.0)])]
    #[case(vec![(5.0, -1.0)])]
    #[case(vec![])]
    fn test_invalid_points(#[case] points: Vec<(f64, f64)>) {
        let result = IntegrationDistance::new(&per_region(&[("trt", RegionDistance::Points(points))]));
        let err = result.unwrap_err();
        assert!(err.downcast_ref::<ConfigurationError>().is_some());
    }

    #[test]
    fn test_unsorted_message() {
        assert_error!(
            IntegrationDistance::new(&per_region(&[(
                "trt",
                RegionDistance::Points(vec![(6.0, 100.0), (5.0, 200.0)])
            )])),
            "Configuration error: The magnitudes for trt must be sorted and unique: [(6.0, 100.0), (5.0, 200.0)]"
        );
    }

    #[test]
    fn test_bounding_box() {
        let idist = IntegrationDistance::new(&MaximumDistance::Scalar(100.0)).unwrap();
        let bbox = idist.bounding_box(10.0, 0.0, "any", None);
        assert_approx_eq!(f64, bbox.max_lat, 100.0 * KM_TO_DEGREES);
        assert_approx_eq!(f64, bbox.min_lon, 10.0 - 100.0 * KM_TO_DEGREES);

        // Huge distances are capped
        let idist = IntegrationDistance::new(&MaximumDistance::Scalar(50_000.0)).unwrap();
        let bbox = idist.bounding_box(0.0, 0.0, "any", None);
        assert_eq!((bbox.min_lat, bbox.max_lat), (-90.0, 90.0));
        assert_eq!((bbox.min_lon, bbox.max_lon), (-180.0, 180.0));
    }

    #[test]
    fn test_deserialize() {
        #[derive(Deserialize)]
        struct Job {
            maximum_distance: MaximumDistance,
        }

        let job: Job = toml::from_str("maximum_distance = 200.0").unwrap();
        assert_eq!(job.maximum_distance, MaximumDistance::Scalar(200.0));

        let job: Job = toml::from_str(
            "[maximum_distance]\n\"Active Shallow Crust\" = [[5.0, 100.0], [7.0, 300.0]]\ndefault = 50.0\n",
        )
        .unwrap();
        let idist = IntegrationDistance::new(&job.maximum_distance).unwrap();
        assert_eq!(idist.evaluate("Active Shallow Crust", Some(6.0)), 200.0);
        assert_eq!(idist.evaluate("other", Some(6.0)), 50.0);
    }
}

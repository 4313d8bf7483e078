//! Fixtures for tests
use crate::exposure::Asset;
use crate::filters::{IntegrationDistance, MaximumDistance};
use crate::geo::{Mesh, Point, Surface};
use crate::mfd::Mfd;
use crate::risk::{FragilityFunction, FragilityModel};
use crate::site::SiteCollection;
use crate::source::{
    AreaSource, FaultSection, MultiFaultSource, NodalPlane, NonParametricSource, Occurrence,
    PointSource, Rupture, RuptureParameters, Source, SourceKind,
};
use itertools::iproduct;
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

const TRT: &str = "Active Shallow Crust";

/// A 5x5 grid of sites spaced by 0.5 degrees around (0, 0)
#[fixture]
pub fn sitecol() -> SiteCollection {
    let coords = [-1.0, -0.5, 0.0, 0.5, 1.0];
    SiteCollection::new(iproduct!(coords, coords).map(|(lat, lon)| Point::new(lon, lat, 0.0)))
}

/// An integration distance of 50 km for every tectonic region
#[fixture]
pub fn idist() -> IntegrationDistance {
    IntegrationDistance::new(&MaximumDistance::Scalar(50.0)).unwrap()
}

/// Five magnitude bins between 5 and 6, at two hypocentral depths in a 20 km thick layer
#[fixture]
pub fn rupture_parameters() -> RuptureParameters {
    RuptureParameters {
        mfd: Mfd::TruncatedGr {
            a_val: 4.0,
            b_val: 1.0,
            min_mag: 5.0,
            max_mag: 6.0,
            bin_width: 0.2,
        },
        nodal_plane: NodalPlane {
            strike: 0.0,
            dip: 90.0,
            rake: 0.0,
        },
        hypo_depths: vec![(0.5, 5.0), (0.5, 10.0)],
        upper_seismogenic_depth: 0.0,
        lower_seismogenic_depth: 20.0,
        rupture_aspect_ratio: 1.0,
    }
}

#[fixture]
pub fn point_source(rupture_parameters: RuptureParameters) -> Source {
    let kind = SourceKind::Point(PointSource {
        location: Point::new(0.0, 0.0, 0.0),
        params: rupture_parameters,
    });
    Source::new("point".into(), "Point", TRT.into(), kind)
}

#[fixture]
pub fn area_source(rupture_parameters: RuptureParameters) -> Source {
    let polygon = vec![(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)];
    let area = AreaSource::new(polygon, 20.0, rupture_parameters).unwrap();
    Source::new("area".into(), "Area", TRT.into(), SourceKind::Area(area))
}

/// Ruptures cycling through magnitudes 5, 5.5 and 6, close to (0, 0)
#[fixture]
pub fn non_parametric_ruptures(#[default(10)] n: usize) -> Vec<Rupture> {
    (0..n)
        .map(|i| {
            let lon = 0.1 * (i % 5) as f64;
            Rupture {
                mag: [5.0, 5.5, 6.0][i % 3],
                rake: 0.0,
                trt: TRT.into(),
                hypocenter: Point::new(lon, 0.0, 5.0),
                surface: Some(Surface::Single(Mesh::new(vec![
                    Point::new(lon, 0.0, 0.0),
                    Point::new(lon + 0.05, 0.0, 10.0),
                ]))),
                occurrence: Occurrence::NonParametric {
                    pmf: vec![0.8, 0.2],
                },
            }
        })
        .collect()
}

#[fixture]
pub fn non_parametric_source(non_parametric_ruptures: Vec<Rupture>) -> Source {
    let src = NonParametricSource::new(non_parametric_ruptures).unwrap();
    Source::new(
        "nonparametric".into(),
        "Non-parametric",
        TRT.into(),
        SourceKind::NonParametric(src),
    )
}

/// A fault system of two sections near (0, 0), with one single-section and one two-section rupture
#[fixture]
pub fn multi_fault_source() -> Source {
    let section = |sec_id: &str, lon: f64| FaultSection {
        sec_id: sec_id.into(),
        mesh: Mesh::new(vec![Point::new(lon, 0.0, 0.0), Point::new(lon + 0.1, 0.0, 10.0)]),
    };
    let src = MultiFaultSource::new(
        vec![section("a", 0.0), section("b", 0.1)],
        vec![vec!["a".into()], vec!["a".into(), "b".into()]],
        vec![vec![0.9, 0.1], vec![0.95, 0.05]],
        vec![6.0, 6.5],
        vec![90.0, 90.0],
    )
    .unwrap();
    Source::new(
        "fault".into(),
        "Fault system",
        TRT.into(),
        SourceKind::MultiFault(src),
    )
}

/// An asset without an aggregation key
pub fn asset(id: &str, taxonomy: &str, site_id: u32, number: f64) -> Asset {
    Asset {
        ordinal: 0,
        id: id.into(),
        taxonomy: taxonomy.into(),
        site_id,
        number,
        agg_key: None,
    }
}

/// Two limit states for reinforced concrete under PGA
#[fixture]
pub fn fragility_model() -> FragilityModel {
    FragilityModel::new(
        vec!["structural".into()],
        vec!["moderate".into(), "complete".into()],
        vec![FragilityFunction {
            taxonomy: "RC".into(),
            loss_type: "structural".into(),
            imt: "PGA".into(),
            imls: vec![0.1, 0.2, 0.4],
            poes: vec![vec![0.0, 0.5, 1.0], vec![0.0, 0.1, 0.6]],
        }],
    )
    .unwrap()
}

//! Rupture surfaces and the distance metrics measured from them.
use super::Point;
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;

/// The kind of rupture-to-site distance to compute
#[derive(DeserializeLabeledStringEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    /// Closest distance to the rupture surface
    #[default]
    #[string = "rrup"]
    Rrup,
    /// Closest distance to the surface projection of the rupture (Joyner-Boore)
    #[string = "rjb"]
    Rjb,
    /// Distance to the hypocentre
    #[string = "rhypo"]
    Rhypo,
    /// Distance to the epicentre
    #[string = "repi"]
    Repi,
}

/// A set of points discretising a surface
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Mesh {
    /// The points of the mesh
    pub points: Vec<Point>,
}

impl Mesh {
    /// Create a new [`Mesh`]
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// The centroid of the mesh points.
    ///
    /// Longitudes are averaged relative to the first point so that meshes crossing the date line
    /// are handled.
    pub fn middle_point(&self) -> Point {
        let Some(first) = self.points.first() else {
            return Point::new(0.0, 0.0, 0.0);
        };

        let n = self.points.len() as f64;
        let (mut dlon, mut lat, mut depth) = (0.0, 0.0, 0.0);
        for point in &self.points {
            dlon += super::get_longitudinal_extent(first.lon, point.lon);
            lat += point.lat;
            depth += point.depth;
        }

        Point::new(super::fix_lon(first.lon + dlon / n), lat / n, depth / n)
    }

    /// Closest 3D distance from the mesh to the given point
    pub fn min_distance(&self, point: &Point) -> f64 {
        self.points
            .iter()
            .map(|p| p.distance(point))
            .fold(f64::INFINITY, f64::min)
    }

    /// Closest distance from the surface projection of the mesh to the given point
    pub fn min_surface_distance(&self, point: &Point) -> f64 {
        self.points
            .iter()
            .map(|p| p.epicentral_distance(point))
            .fold(f64::INFINITY, f64::min)
    }
}

/// The surface of a rupture: either a single mesh or several fault sections rupturing together
#[derive(Debug, Clone, PartialEq)]
pub enum Surface {
    /// A surface described by a single mesh
    Single(Mesh),
    /// A surface made up of several sections
    Multi(Vec<Mesh>),
}

impl Surface {
    /// Iterate over every point of the surface
    pub fn iter_points(&self) -> Box<dyn Iterator<Item = &Point> + '_> {
        match self {
            Self::Single(mesh) => Box::new(mesh.points.iter()),
            Self::Multi(meshes) => Box::new(meshes.iter().flat_map(|mesh| mesh.points.iter())),
        }
    }

    /// Closest 3D distance from the surface to the given point
    pub fn min_distance(&self, point: &Point) -> f64 {
        self.iter_points()
            .map(|p| p.distance(point))
            .fold(f64::INFINITY, f64::min)
    }

    /// Closest distance from the surface projection to the given point
    pub fn joyner_boore_distance(&self, point: &Point) -> f64 {
        self.iter_points()
            .map(|p| p.epicentral_distance(point))
            .fold(f64::INFINITY, f64::min)
    }

    /// The middle point of the surface (the middle of the first section for multi-surfaces)
    pub fn middle_point(&self) -> Point {
        match self {
            Self::Single(mesh) => mesh.middle_point(),
            Self::Multi(meshes) => meshes
                .first()
                .map_or(Point::new(0.0, 0.0, 0.0), Mesh::middle_point),
        }
    }
}

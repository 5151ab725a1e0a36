//! Forward projection of geographic coordinates onto the unit sphere.
//!
//! Nearest-neighbour search runs on the projected points, where Euclidean (chord) distance is a
//! monotone function of great-circle distance. Forward only.

use crate::point::{Point3, PointLonLat};

/// Project `(lon, lat)` in degrees to `(x, y, z)` on the unit sphere.
///
/// Latitudes beyond the poles are not clamped; callers pass valid geographic coordinates.
#[inline]
pub fn to_cartesian(p: PointLonLat) -> Point3 {
    let (sin_lon, cos_lon) = p.lon.to_radians().sin_cos();
    let (sin_lat, cos_lat) = p.lat.to_radians().sin_cos();
    Point3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
}

/// Euclidean distance through the unit sphere between two points `arc_degrees` apart along a great
/// circle.
///
/// Use this to turn an angular search radius into the radius expected by
/// [`Search::within_radius`][crate::search::Search::within_radius].
pub fn chord_length(arc_degrees: f64) -> f64 {
    2. * (arc_degrees.to_radians() / 2.).sin()
}

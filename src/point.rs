//! Geographic and Cartesian point types.

use geo_traits::{CoordTrait, Dimensions};

/// A geographic point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointLonLat {
    pub lon: f64,
    pub lat: f64,
}

impl PointLonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Convert any 2-D coordinate, read as `x = lon` and `y = lat`.
    pub fn from_coord(coord: &impl CoordTrait<T = f64>) -> Self {
        Self::new(coord.x(), coord.y())
    }
}

impl From<(f64, f64)> for PointLonLat {
    fn from((lon, lat): (f64, f64)) -> Self {
        Self::new(lon, lat)
    }
}

impl CoordTrait for PointLonLat {
    type T = f64;

    fn dim(&self) -> Dimensions {
        Dimensions::Xy
    }

    fn x(&self) -> Self::T {
        self.lon
    }

    fn y(&self) -> Self::T {
        self.lat
    }

    fn nth_or_panic(&self, n: usize) -> Self::T {
        match n {
            0 => self.lon,
            1 => self.lat,
            _ => panic!("PointLonLat has no dimension {}", n),
        }
    }
}

/// A point in 3-D Cartesian space, in practice on the unit sphere.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub(crate) fn from_slice(coords: &[f64]) -> Self {
        Self::new(coords[0], coords[1], coords[2])
    }

    #[inline]
    pub(crate) fn nth(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Squared Euclidean distance.
    #[inline]
    pub fn distance_squared(&self, other: &Point3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    #[inline]
    pub fn distance(&self, other: &Point3) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

impl From<[f64; 3]> for Point3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl From<Point3> for [f64; 3] {
    fn from(p: Point3) -> Self {
        [p.x, p.y, p.z]
    }
}

impl CoordTrait for Point3 {
    type T = f64;

    fn dim(&self) -> Dimensions {
        Dimensions::Xyz
    }

    fn x(&self) -> Self::T {
        self.x
    }

    fn y(&self) -> Self::T {
        self.y
    }

    fn nth_or_panic(&self, n: usize) -> Self::T {
        match n {
            0 => self.x,
            1 => self.y,
            2 => self.z,
            _ => panic!("Point3 has no dimension {}", n),
        }
    }
}

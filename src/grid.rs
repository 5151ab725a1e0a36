//! Point sets a spatial index can be built over.
//!
//! A structured grid is the cross product of a latitude axis and one or more longitude axes.
//! Points are numbered row by row, latitude outer and longitude inner; that number is the
//! original index returned by every query.

use crate::error::{GridIndexError, Result};
use crate::point::PointLonLat;
use crate::range::{crop_rows, monotonic_crop, octahedral_pl, Endpoints, Range, RangeKind};
use crate::search::{ContentKey, ContentKeyBuilder};

/// A finite point set in a deterministic order.
pub trait GridPointSource {
    /// Number of points.
    fn size(&self) -> usize;

    /// All points, in original index order.
    fn points(&self) -> Box<dyn Iterator<Item = PointLonLat> + '_>;

    /// Deterministic identity of this point set.
    fn identity(&self) -> ContentKey;
}

fn hash_range(key: &mut ContentKeyBuilder, range: &Range) {
    let (tag, n) = match range.kind() {
        RangeKind::RegularLongitude => (0_u8, 0),
        RangeKind::RegularLatitude => (1, 0),
        RangeKind::RegularCartesian => (2, 0),
        RangeKind::GaussianLatitude { n } => (3, n),
    };
    let endpoints = match range.endpoints() {
        Endpoints::Closed => 0_u8,
        Endpoints::OpenEnd => 1,
        Endpoints::OpenStart => 2,
    };
    key.bytes(&[tag, endpoints])
        .usize(n)
        .usize(range.size())
        .fraction(range.a())
        .fraction(range.b());
}

fn is_latitude(range: &Range) -> bool {
    matches!(
        range.kind(),
        RangeKind::RegularLatitude | RangeKind::GaussianLatitude { .. }
    )
}

/// Crop a latitude axis to `[south, north]`, in the direction of the axis.
fn crop_latitudes(latitudes: &Range, north: f64, south: f64) -> Result<Range> {
    if latitudes.is_descending() {
        latitudes.crop(north, south)
    } else {
        latitudes.crop(south, north)
    }
}

/// The cross product of a latitude and a longitude axis.
#[derive(Debug, Clone)]
pub struct RegularGrid {
    longitudes: Range,
    latitudes: Range,
}

impl RegularGrid {
    pub fn new(longitudes: Range, latitudes: Range) -> Result<Self> {
        if longitudes.kind() != RangeKind::RegularLongitude {
            return Err(GridIndexError::Construction(format!(
                "expected a longitude axis, got {:?}",
                longitudes.kind()
            )));
        }
        if !is_latitude(&latitudes) {
            return Err(GridIndexError::Construction(format!(
                "expected a latitude axis, got {:?}",
                latitudes.kind()
            )));
        }

        Ok(Self {
            longitudes,
            latitudes,
        })
    }

    /// A global grid every `increment` degrees, latitudes north to south.
    pub fn global(increment: f64, eps: f64) -> Result<Self> {
        Self::new(
            Range::longitude_from_increment(increment, 0., 360., 0., eps)?,
            Range::latitude_from_increment(increment, -90., 90., 0., eps)?,
        )
    }

    pub fn longitudes(&self) -> &Range {
        &self.longitudes
    }

    pub fn latitudes(&self) -> &Range {
        &self.latitudes
    }

    /// The part of this grid within the given bounding box.
    pub fn crop(&self, north: f64, west: f64, south: f64, east: f64) -> Result<Self> {
        let longitudes = if self.longitudes.is_descending() {
            self.longitudes.crop(east, west)?
        } else {
            self.longitudes.crop(west, east)?
        };

        Ok(Self {
            longitudes,
            latitudes: crop_latitudes(&self.latitudes, north, south)?,
        })
    }
}

impl GridPointSource for RegularGrid {
    fn size(&self) -> usize {
        self.longitudes.size() * self.latitudes.size()
    }

    fn points(&self) -> Box<dyn Iterator<Item = PointLonLat> + '_> {
        let lons = self.longitudes.values();
        Box::new(
            self.latitudes
                .values()
                .iter()
                .flat_map(move |lat| lons.iter().map(move |lon| PointLonLat::new(*lon, *lat))),
        )
    }

    fn identity(&self) -> ContentKey {
        let mut key = ContentKey::builder("regular", self.size());
        hash_range(&mut key, &self.longitudes);
        hash_range(&mut key, &self.latitudes);
        key.finish()
    }
}

/// A reduced Gaussian grid: one longitude row, with its own number of points, per Gaussian
/// latitude. A cropped grid may keep latitudes whose row holds no point.
#[derive(Debug, Clone)]
pub struct ReducedGaussianGrid {
    latitudes: Range,
    rows: Vec<Option<Range>>,
}

impl ReducedGaussianGrid {
    /// A global grid with `pl[j]` points on the `j`-th latitude from the north, `pl` holding one
    /// entry per Gaussian latitude.
    pub fn new(n: usize, pl: &[usize], eps: f64) -> Result<Self> {
        if pl.len() != 2 * n {
            return Err(GridIndexError::Construction(format!(
                "expected {} row counts for N{}, got {}",
                2 * n,
                n,
                pl.len()
            )));
        }

        let latitudes = Range::gaussian_latitude(n, false, eps)?;
        let rows = pl
            .iter()
            .map(|&count| match count {
                0 => Ok(None),
                count => Range::regular_longitude(count, 0., 360., eps).map(Some),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { latitudes, rows })
    }

    /// The octahedral reduced Gaussian grid `O<n>`.
    pub fn octahedral(n: usize, eps: f64) -> Result<Self> {
        Self::new(n, &octahedral_pl(n), eps)
    }

    pub fn latitudes(&self) -> &Range {
        &self.latitudes
    }

    /// Number of points per latitude row.
    pub fn pl(&self) -> Vec<usize> {
        self.rows
            .iter()
            .map(|row| row.as_ref().map_or(0, Range::size))
            .collect()
    }

    pub fn rows(&self) -> &[Option<Range>] {
        &self.rows
    }

    /// The part of this grid within the given bounding box.
    ///
    /// The kept rows are cropped together, so they share the narrowest window consistent with
    /// every row increment.
    pub fn crop(&self, north: f64, west: f64, south: f64, east: f64) -> Result<Self> {
        let latitudes = crop_latitudes(&self.latitudes, north, south)?;
        let (from, to) = monotonic_crop(
            self.latitudes.values(),
            south.min(north),
            south.max(north),
            self.latitudes.eps(),
        );

        let kept = &self.rows[from..to];
        let present: Vec<Range> = kept.iter().flatten().cloned().collect();
        let mut cropped = crop_rows(&present, west, east)?.into_iter();

        let rows = kept
            .iter()
            .map(|row| match row {
                Some(_) => cropped.next().flatten(),
                None => None,
            })
            .collect();

        Ok(Self { latitudes, rows })
    }
}

impl GridPointSource for ReducedGaussianGrid {
    fn size(&self) -> usize {
        self.rows.iter().flatten().map(Range::size).sum()
    }

    fn points(&self) -> Box<dyn Iterator<Item = PointLonLat> + '_> {
        Box::new(
            self.latitudes
                .values()
                .iter()
                .zip(&self.rows)
                .filter_map(|(lat, row)| row.as_ref().map(|row| (*lat, row)))
                .flat_map(|(lat, row)| {
                    row.values()
                        .iter()
                        .map(move |lon| PointLonLat::new(*lon, lat))
                }),
        )
    }

    fn identity(&self) -> ContentKey {
        let mut key = ContentKey::builder("reduced-gaussian", self.size());
        hash_range(&mut key, &self.latitudes);
        for row in &self.rows {
            match row {
                Some(row) => hash_range(&mut key, row),
                None => {
                    key.usize(0);
                }
            }
        }
        key.finish()
    }
}

/// An explicit list of points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnstructuredPoints {
    points: Vec<PointLonLat>,
}

impl UnstructuredPoints {
    pub fn new(points: Vec<PointLonLat>) -> Self {
        Self { points }
    }

    pub fn as_slice(&self) -> &[PointLonLat] {
        &self.points
    }
}

impl From<Vec<(f64, f64)>> for UnstructuredPoints {
    fn from(points: Vec<(f64, f64)>) -> Self {
        Self::new(points.into_iter().map(PointLonLat::from).collect())
    }
}

impl GridPointSource for UnstructuredPoints {
    fn size(&self) -> usize {
        self.points.len()
    }

    fn points(&self) -> Box<dyn Iterator<Item = PointLonLat> + '_> {
        Box::new(self.points.iter().copied())
    }

    fn identity(&self) -> ContentKey {
        let mut key = ContentKey::builder("unstructured", self.size());
        for p in &self.points {
            key.f64(p.lon).f64(p.lat);
        }
        key.finish()
    }
}

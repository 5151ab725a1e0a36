//! Axes of structured grids.
//!
//! A [`Range`] is one coordinate dimension of a grid: its number of samples, its bounds and how
//! they relate to a full period. Bounds and increments are exact [`Fraction`]s so periodicity and
//! crop decisions do not drift at fine resolutions. Sample values are materialized lazily and
//! cached per instance; [`crop`][Range::crop] and [`flip`][Range::flip] return new ranges.

#![warn(missing_docs)]

mod gaussian;
mod reduced;
mod regular;

use std::sync::{Arc, OnceLock};

use num_traits::Zero;

use crate::error::{GridIndexError, Result};
use crate::fraction::Fraction;

pub use gaussian::{gaussian_latitudes, LatitudeCache};
pub use reduced::{crop_rows, octahedral_pl};

#[cfg(test)]
mod test;

/// The variant of an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeKind {
    /// Equally spaced longitudes in degrees, wrapping at 360
    RegularLongitude,
    /// Equally spaced latitudes in degrees, within `[-90, 90]`
    RegularLatitude,
    /// Equally spaced values of an arbitrary linear coordinate
    RegularCartesian,
    /// Gaussian quadrature latitudes of a grid with `2 * n` latitude rows
    GaussianLatitude {
        /// Number of latitudes per hemisphere
        n: usize,
    },
}

impl RangeKind {
    /// The full period of the axis, if it wraps around.
    pub fn period(&self) -> Option<Fraction> {
        match self {
            RangeKind::RegularLongitude => Some(Fraction::from(360_i64)),
            _ => None,
        }
    }
}

/// Which of the bounds `a` and `b` of a range are samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoints {
    /// Both bounds are samples
    Closed,
    /// `b` is one period after `a` and is not repeated as a sample
    OpenEnd,
    /// `a` is one period before `b` and is not repeated as a sample
    OpenStart,
}

#[derive(Debug, Clone)]
struct GaussianRows {
    increasing: bool,
    /// position of the first kept latitude in the north to south table
    offset: usize,
    cache: Arc<LatitudeCache>,
}

/// One axis of a structured grid.
#[derive(Debug, Clone)]
pub struct Range {
    kind: RangeKind,
    size: usize,
    a: Fraction,
    b: Fraction,
    eps: f64,
    endpoints: Endpoints,
    gaussian: Option<GaussianRows>,
    values: OnceLock<Arc<[f64]>>,
}

fn unrepresentable<T>(result: Result<T>, a: Fraction, b: Fraction) -> Result<T> {
    result.map_err(|e| {
        GridIndexError::Construction(format!("range [{}, {}] is not representable: {}", a, b, e))
    })
}

fn check_size_eps(size: usize, eps: f64) -> Result<()> {
    if size == 0 {
        return Err(GridIndexError::Construction(
            "a range needs at least one value".to_string(),
        ));
    }
    if !(eps >= 0.) {
        return Err(GridIndexError::Construction(format!(
            "range tolerance must be non-negative, got {}",
            eps
        )));
    }
    Ok(())
}

/// Snap `target` onto the lattice `k * inc`, rounding up or down when it falls between two lattice
/// points more than `eps` away from either.
pub(crate) fn adjust(target: Fraction, inc: Fraction, up: bool, eps: f64) -> Fraction {
    debug_assert!(inc > Fraction::zero());

    let r = target / inc;
    let mut n = r.integral_part();

    if !r.is_integer() {
        let nearest = r.to_f64().round();
        if ((r.to_f64() - nearest) * inc.to_f64()).abs() <= eps {
            return inc * (nearest as i64);
        }
        if (r > Fraction::zero()) == up {
            n += if up { 1 } else { -1 };
        }
    }

    inc * n
}

/// Half-open index window `[from, to)` of the monotonic `values` lying within `[min, max]`
/// (widened by `eps`).
pub fn monotonic_crop(values: &[f64], min: f64, max: f64, eps: f64) -> (usize, usize) {
    if values.is_empty() || min > max {
        return (0, 0);
    }

    let increasing = values[0] <= values[values.len() - 1];
    let (from, to) = if increasing {
        (
            values.partition_point(|v| *v < min - eps),
            values.partition_point(|v| *v <= max + eps),
        )
    } else {
        (
            values.partition_point(|v| *v > max + eps),
            values.partition_point(|v| *v >= min - eps),
        )
    };

    (from, to.max(from))
}

impl Range {
    /// Equally spaced longitudes from `a` to `b`.
    ///
    /// Both bounds are samples, unless they are a full period apart: then `b` is the wrap-around
    /// duplicate of `a` and the `n` samples are `a, a + 360/n, ...`.
    pub fn regular_longitude(n: usize, a: f64, b: f64, eps: f64) -> Result<Self> {
        Self::regular(
            RangeKind::RegularLongitude,
            n,
            Fraction::from_f64(a)?,
            Fraction::from_f64(b)?,
            eps,
        )
    }

    /// Equally spaced latitudes from `a` to `b`, both included.
    pub fn regular_latitude(n: usize, a: f64, b: f64, eps: f64) -> Result<Self> {
        Self::regular(
            RangeKind::RegularLatitude,
            n,
            Fraction::from_f64(a)?,
            Fraction::from_f64(b)?,
            eps,
        )
    }

    /// Equally spaced values from `a` to `b`, both included.
    pub fn regular_cartesian(n: usize, a: f64, b: f64, eps: f64) -> Result<Self> {
        Self::regular(
            RangeKind::RegularCartesian,
            n,
            Fraction::from_f64(a)?,
            Fraction::from_f64(b)?,
            eps,
        )
    }

    /// All `2 * n` Gaussian latitudes, north to south unless `increasing`, from the process-wide
    /// [`LatitudeCache`].
    pub fn gaussian_latitude(n: usize, increasing: bool, eps: f64) -> Result<Self> {
        Self::gaussian_latitude_with_cache(n, increasing, eps, LatitudeCache::global())
    }

    /// All `2 * n` Gaussian latitudes, using the given latitude table cache.
    pub fn gaussian_latitude_with_cache(
        n: usize,
        increasing: bool,
        eps: f64,
        cache: Arc<LatitudeCache>,
    ) -> Result<Self> {
        Self::gaussian_window(n, increasing, 0, 2 * n, eps, cache)
    }

    pub(crate) fn regular(
        kind: RangeKind,
        size: usize,
        a: Fraction,
        b: Fraction,
        eps: f64,
    ) -> Result<Self> {
        check_size_eps(size, eps)?;
        let mut b = b;

        let endpoints = match kind.period() {
            Some(period) => {
                let span = unrepresentable(b.checked_sub(a), a, b)?.abs();
                if span == period || (span.to_f64() - period.to_f64()).abs() <= eps {
                    b = if b >= a {
                        unrepresentable(a.checked_add(period), a, b)?
                    } else {
                        unrepresentable(a.checked_sub(period), a, b)?
                    };
                    Endpoints::OpenEnd
                } else if span.to_f64() > period.to_f64() + eps {
                    return Err(GridIndexError::Construction(format!(
                        "longitude range [{}, {}] is wider than a period",
                        a, b
                    )));
                } else {
                    Endpoints::Closed
                }
            }
            None => Endpoints::Closed,
        };

        if kind == RangeKind::RegularLatitude {
            for bound in [a, b] {
                if bound.abs().to_f64() > 90. + eps {
                    return Err(GridIndexError::Construction(format!(
                        "latitude {} outside of [-90, 90]",
                        bound
                    )));
                }
            }
        }

        if endpoints == Endpoints::Closed && size == 1 && a != b {
            return Err(GridIndexError::Construction(format!(
                "a single value range cannot span [{}, {}]",
                a, b
            )));
        }

        if endpoints == Endpoints::Closed && size > 1 && a == b {
            return Err(GridIndexError::Construction(format!(
                "{} values cannot share the single bound {}",
                size, a
            )));
        }

        let range = Self {
            kind,
            size,
            a,
            b,
            eps,
            endpoints,
            gaussian: None,
            values: OnceLock::new(),
        };
        unrepresentable(range.check_arithmetic(), a, b)?;
        Ok(range)
    }

    /// Evaluate, with overflow checks, the derived quantities later read without them.
    fn check_arithmetic(&self) -> Result<()> {
        let span = self.b.checked_sub(self.a)?;
        let inc = match self.endpoints {
            Endpoints::Closed if self.size == 1 => Fraction::zero(),
            Endpoints::Closed => span.checked_div(Fraction::from(self.size as i64 - 1))?,
            Endpoints::OpenEnd | Endpoints::OpenStart => {
                span.checked_div(Fraction::from(self.size as i64))?
            }
        };
        let start = match self.endpoints {
            Endpoints::OpenStart => self.a.checked_add(inc)?,
            _ => self.a,
        };
        start.checked_add(inc.checked_mul(Fraction::from(self.size as i64 - 1))?)?;
        if self.kind.period().is_some() {
            span.abs().checked_add(inc.abs())?;
        }
        Ok(())
    }

    fn gaussian_window(
        n: usize,
        increasing: bool,
        offset: usize,
        size: usize,
        eps: f64,
        cache: Arc<LatitudeCache>,
    ) -> Result<Self> {
        check_size_eps(n, eps)?;
        check_size_eps(size, eps)?;
        if offset + size > 2 * n {
            return Err(GridIndexError::Construction(format!(
                "Gaussian window [{}, {}) exceeds {} latitudes",
                offset,
                offset + size,
                2 * n
            )));
        }

        let table = cache.latitudes(n);
        let (north, south) = (table[offset], table[offset + size - 1]);
        let (a, b) = if increasing {
            (south, north)
        } else {
            (north, south)
        };

        Ok(Self {
            kind: RangeKind::GaussianLatitude { n },
            size,
            a: Fraction::from_f64(a)?,
            b: Fraction::from_f64(b)?,
            eps,
            endpoints: Endpoints::Closed,
            gaussian: Some(GaussianRows {
                increasing,
                offset,
                cache,
            }),
            values: OnceLock::new(),
        })
    }

    /// The variant of this axis.
    pub fn kind(&self) -> RangeKind {
        self.kind
    }

    /// Number of values.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Tolerance used when comparing against floating point input.
    pub fn eps(&self) -> f64 {
        self.eps
    }

    /// Leading bound, a sample unless [`Endpoints::OpenStart`].
    pub fn a(&self) -> Fraction {
        self.a
    }

    /// Trailing bound, a sample unless [`Endpoints::OpenEnd`].
    pub fn b(&self) -> Fraction {
        self.b
    }

    /// Which bounds are samples.
    pub fn endpoints(&self) -> Endpoints {
        self.endpoints
    }

    /// Signed distance between consecutive values, zero for a single value.
    ///
    /// Gaussian latitudes are not equally spaced; for them this is the mean spacing.
    pub fn increment(&self) -> Fraction {
        let span = self.b - self.a;
        match self.endpoints {
            Endpoints::Closed if self.size == 1 => Fraction::zero(),
            Endpoints::Closed => span / (self.size as i64 - 1),
            Endpoints::OpenEnd | Endpoints::OpenStart => span / self.size as i64,
        }
    }

    /// Whether the value after the last one would be the first one again, one period later.
    pub fn periodic(&self) -> bool {
        let Some(period) = self.kind.period() else {
            return false;
        };

        match self.endpoints {
            Endpoints::OpenEnd | Endpoints::OpenStart => true,
            Endpoints::Closed => {
                if self.size < 2 {
                    return false;
                }
                let span = (self.b - self.a).abs() + self.increment().abs();
                span == period || (span.to_f64() - period.to_f64()).abs() <= self.eps
            }
        }
    }

    pub(crate) fn first_fraction(&self) -> Fraction {
        match self.endpoints {
            Endpoints::OpenStart => self.a + self.increment(),
            _ => self.a,
        }
    }

    pub(crate) fn last_fraction(&self) -> Fraction {
        match self.endpoints {
            Endpoints::OpenEnd => self.b - self.increment(),
            _ => self.b,
        }
    }

    /// First value.
    pub fn first(&self) -> f64 {
        match &self.gaussian {
            Some(_) => self.values()[0],
            None => self.first_fraction().to_f64(),
        }
    }

    /// Last value.
    pub fn last(&self) -> f64 {
        match &self.gaussian {
            Some(_) => self.values()[self.size - 1],
            None => self.last_fraction().to_f64(),
        }
    }

    /// Smallest value.
    pub fn min(&self) -> f64 {
        self.first().min(self.last())
    }

    /// Largest value.
    pub fn max(&self) -> f64 {
        self.first().max(self.last())
    }

    /// Whether values decrease along the axis.
    pub fn is_descending(&self) -> bool {
        self.a > self.b
    }

    /// Whether the northernmost latitude row is within this latitude axis.
    pub fn includes_north_pole(&self) -> bool {
        match (&self.kind, &self.gaussian) {
            (_, Some(g)) => g.offset == 0,
            (RangeKind::RegularLatitude, None) => {
                let inc = self.increment().abs().to_f64();
                self.max() + inc > 90. || (self.max() - 90.).abs() <= self.eps
            }
            _ => false,
        }
    }

    /// Whether the southernmost latitude row is within this latitude axis.
    pub fn includes_south_pole(&self) -> bool {
        match (&self.kind, &self.gaussian) {
            (RangeKind::GaussianLatitude { n }, Some(g)) => g.offset + self.size == 2 * n,
            (RangeKind::RegularLatitude, None) => {
                let inc = self.increment().abs().to_f64();
                self.min() - inc < -90. || (self.min() + 90.).abs() <= self.eps
            }
            _ => false,
        }
    }

    /// The values of this axis, computed on first access.
    pub fn values(&self) -> &[f64] {
        self.values.get_or_init(|| self.compute_values())
    }

    fn compute_values(&self) -> Arc<[f64]> {
        if let (RangeKind::GaussianLatitude { n }, Some(g)) = (&self.kind, &self.gaussian) {
            let table = g.cache.latitudes(*n);
            let rows = &table[g.offset..g.offset + self.size];
            return if g.increasing {
                rows.iter().rev().copied().collect()
            } else {
                rows.into()
            };
        }

        let start = self.first_fraction();
        let inc = self.increment();
        (0..self.size)
            .map(|i| (start + inc * i as i64).to_f64())
            .collect()
    }

    /// The same values in reverse order.
    pub fn flip(&self) -> Range {
        let endpoints = match self.endpoints {
            Endpoints::Closed => Endpoints::Closed,
            Endpoints::OpenEnd => Endpoints::OpenStart,
            Endpoints::OpenStart => Endpoints::OpenEnd,
        };

        let gaussian = self.gaussian.clone().map(|mut g| {
            g.increasing = !g.increasing;
            g
        });

        let flipped = Range {
            kind: self.kind,
            size: self.size,
            a: self.b,
            b: self.a,
            eps: self.eps,
            endpoints,
            gaussian,
            values: OnceLock::new(),
        };

        if let Some(values) = self.values.get() {
            let _ = flipped
                .values
                .set(values.iter().rev().copied().collect());
        }

        flipped
    }

    /// The values within `[a, b]`, at the original resolution.
    ///
    /// `a` and `b` follow the direction of the axis (`a <= b` on an ascending axis, `a >= b` on a
    /// descending one) up to `eps`. Bounds are snapped inwards onto the sample lattice. Windows
    /// that are empty on a periodic axis, or that would wrap into two disjoint pieces of a
    /// regional longitude axis, are reported as [`GridIndexError::NotImplemented`].
    pub fn crop(&self, a: f64, b: f64) -> Result<Range> {
        match self.kind {
            RangeKind::GaussianLatitude { .. } => gaussian::crop(self, a, b),
            _ => regular::crop(self, a, b),
        }
    }

    fn check_order(&self, a: f64, b: f64) -> Result<()> {
        let ordered = if self.is_descending() {
            a >= b - self.eps
        } else {
            a <= b + self.eps
        };
        if ordered {
            Ok(())
        } else {
            Err(GridIndexError::Construction(format!(
                "crop bounds [{}, {}] do not follow the axis direction",
                a, b
            )))
        }
    }
}

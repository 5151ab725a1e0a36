use num_traits::Zero;

use crate::error::{GridIndexError, Result};
use crate::fraction::Fraction;
use crate::range::{adjust, Range, RangeKind};

pub(super) fn crop(range: &Range, a: f64, b: f64) -> Result<Range> {
    range.check_order(a, b)?;

    match crop_window(range, a, b)? {
        Some(cropped) => Ok(cropped),
        None if range.periodic() => Err(GridIndexError::NotImplemented(format!(
            "crop [{}, {}] of a periodic axis has null width",
            a, b
        ))),
        None => Err(GridIndexError::Construction(format!(
            "crop [{}, {}] contains no value of the axis [{}, {}]",
            a,
            b,
            range.first(),
            range.last()
        ))),
    }
}

/// Crop along the axis direction, `None` if no value falls within the window.
pub(super) fn crop_window(range: &Range, a: f64, b: f64) -> Result<Option<Range>> {
    if range.is_descending() {
        return Ok(crop_window(&range.flip(), b, a)?.map(|r| r.flip()));
    }

    let eps = range.eps;
    let inc = range.increment();
    let first = range.first_fraction();
    let last = range.last_fraction();

    if inc.is_zero() {
        let v = first.to_f64();
        return Ok((a - eps <= v && v <= b + eps).then(|| range.clone()));
    }

    let fa = Fraction::from_f64(a)?;
    let fb = Fraction::from_f64(b)?;

    if let (true, Some(period)) = (range.periodic(), range.kind.period()) {
        let new_a = first + adjust(fa - first, inc, true, eps);
        let new_b = first + adjust(fb - first, inc, false, eps);
        if new_b < new_a {
            return Ok(None);
        }

        // a window covering every row point is the whole periodic axis again
        if new_b - new_a + inc >= period {
            return Range::regular(range.kind, range.size, new_a, new_a + period, eps).map(Some);
        }

        let n = ((new_b - new_a) / inc).integral_part() as usize + 1;
        return Range::regular(range.kind, n, new_a, new_b, eps).map(Some);
    }

    let (fa, fb) = match range.kind.period() {
        Some(period) => match shift_window(fa, fb, first, last, period, eps)? {
            Some(window) => window,
            None => return Ok(None),
        },
        None => (fa, fb),
    };

    let lo = fa.max(first);
    let hi = fb.min(last);
    let new_a = first + adjust(lo - first, inc, true, eps);
    let new_b = first + adjust(hi - first, inc, false, eps);
    if new_a > new_b {
        return Ok(None);
    }

    let n = ((new_b - new_a) / inc).integral_part() as usize + 1;
    Range::regular(range.kind, n, new_a, new_b, eps).map(Some)
}

/// Move a longitude window by whole periods onto a regional axis `[first, last]`.
fn shift_window(
    fa: Fraction,
    fb: Fraction,
    first: Fraction,
    last: Fraction,
    period: Fraction,
    eps: f64,
) -> Result<Option<(Fraction, Fraction)>> {
    if (fb - fa).to_f64() + eps >= period.to_f64() {
        return Ok(Some((first, last)));
    }

    let k_min = ((first - fb) / period).to_f64().floor() as i64;
    let k_max = ((last - fa) / period).to_f64().ceil() as i64;

    let hits: Vec<(Fraction, Fraction)> = (k_min..=k_max)
        .map(|k| (fa + period * k, fb + period * k))
        .filter(|(sa, sb)| {
            sa.to_f64() <= last.to_f64() + eps && sb.to_f64() >= first.to_f64() - eps
        })
        .collect();

    match hits.as_slice() {
        [] => Ok(None),
        [window] => Ok(Some(*window)),
        _ => Err(GridIndexError::NotImplemented(format!(
            "crop [{}, {}] wraps around the regional longitude axis [{}, {}] into disjoint pieces",
            fa, fb, first, last
        ))),
    }
}

/// Snap `[a, b]` onto the lattice `reference + k * inc`, returning the snapped bounds and the
/// number of lattice points between them.
fn lattice(
    a: Fraction,
    b: Fraction,
    inc: Fraction,
    reference: Fraction,
    eps: f64,
) -> Result<(Fraction, Fraction, usize)> {
    if a > b {
        return Err(GridIndexError::Construction(format!(
            "bounds [{}, {}] are not ordered",
            a, b
        )));
    }
    if inc < Fraction::zero() {
        return Err(GridIndexError::Construction(format!(
            "increment {} is negative",
            inc
        )));
    }
    if inc.is_zero() {
        return Ok((a, a, 1));
    }

    let shift = (reference / inc).decimal_part() * inc;
    let new_a = shift + adjust(a - shift, inc, true, eps);

    let new_b = if b == a {
        new_a
    } else {
        let c = shift + adjust(b - shift, inc, false, eps);
        let c = new_a + ((c - new_a) / inc).integral_part() * inc;
        c.max(new_a)
    };

    let n = ((new_b - new_a) / inc).integral_part() as usize + 1;
    Ok((new_a, new_b, n))
}

impl Range {
    /// Longitudes every `increment` degrees within `[west, east]`, aligned with `reference`.
    ///
    /// The bounds are snapped inwards onto the lattice `reference + k * increment` and the
    /// result never holds more than one period of values.
    pub fn longitude_from_increment(
        increment: f64,
        west: f64,
        east: f64,
        reference: f64,
        eps: f64,
    ) -> Result<Range> {
        let inc = Fraction::from_f64(increment)?;
        let (a, b, n) = lattice(
            Fraction::from_f64(west)?,
            Fraction::from_f64(east)?,
            inc,
            Fraction::from_f64(reference)?,
            eps,
        )?;

        let period = Fraction::from(360_i64);
        let (b, n) = if n > 1 && inc * (n as i64 - 1) >= period {
            let n = n - 1;
            (a + inc * (n as i64 - 1), n)
        } else {
            (b, n)
        };

        Range::regular(RangeKind::RegularLongitude, n, a, b, eps)
    }

    /// Latitudes every `increment` degrees within `[south, north]`, aligned with `reference`,
    /// ordered north to south.
    pub fn latitude_from_increment(
        increment: f64,
        south: f64,
        north: f64,
        reference: f64,
        eps: f64,
    ) -> Result<Range> {
        let (s, n, size) = lattice(
            Fraction::from_f64(south)?,
            Fraction::from_f64(north)?,
            Fraction::from_f64(increment)?,
            Fraction::from_f64(reference)?,
            eps,
        )?;

        Range::regular(RangeKind::RegularLatitude, size, n, s, eps)
    }
}

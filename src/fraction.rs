//! Exact rational numbers used for every boundary and periodicity decision on grid axes.
//!
//! A [`Fraction`] is always stored in canonical form: the denominator is positive and shares no
//! factor with the numerator. Arithmetic and comparisons cross-multiply with checked `i64`
//! operations; when a product overflows the operation is carried out in floating point instead and
//! the result converted back with [`Fraction::from_f64`]. Each such fallback is counted (see
//! [`Fraction::overflow_fallbacks`]) and reported as a `tracing` debug event.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;
use std::sync::atomic::{self, AtomicU64};

use num_traits::{FromPrimitive, One, ToPrimitive, Zero};

use crate::error::{GridIndexError, Result};

/// `floor(sqrt(i64::MAX))`, the largest convergent denominator accepted by [`Fraction::from_f64`].
const MAX_DENOMINATOR: i64 = 3_037_000_499;

/// Upper bound on continued-fraction terms before giving up on a value.
const MAX_EXPANSION_TERMS: usize = 10_000;

static OVERFLOW_FALLBACKS: AtomicU64 = AtomicU64::new(0);

/// An exact rational number `numerator / denominator` in canonical reduced form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fraction {
    top: i64,
    bottom: i64,
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

impl Fraction {
    /// Create a fraction from a numerator and a denominator, normalizing the sign onto the
    /// numerator and reducing by the greatest common divisor.
    pub fn new(top: i64, bottom: i64) -> Result<Self> {
        if bottom == 0 {
            return Err(GridIndexError::Construction(format!(
                "fraction {}/0 has a zero denominator",
                top
            )));
        }
        Self::reduce(top, bottom).ok_or_else(|| {
            GridIndexError::Construction(format!(
                "fraction {}/{} is not representable",
                top, bottom
            ))
        })
    }

    /// Canonical form of `top / bottom` (`bottom != 0`), or `None` if a reduced term does not fit
    /// in a symmetric `i64` range.
    fn reduce(top: i64, bottom: i64) -> Option<Self> {
        debug_assert!(bottom != 0);
        let negative = (top < 0) != (bottom < 0);
        let t = top.unsigned_abs();
        let b = bottom.unsigned_abs();

        let g = gcd(t, b);
        let top = i64::try_from(t / g).ok()?;
        let bottom = i64::try_from(b / g).ok()?;

        Some(Self {
            top: if negative { -top } else { top },
            bottom,
        })
    }

    /// Approximate a floating point value by continued-fraction expansion.
    ///
    /// The expansion stops when a convergent reproduces `value` exactly or when the next
    /// convergent's denominator would exceed [`Fraction::max_denominator`], which keeps all
    /// intermediate products inside `i64`. As a consequence long decimal expansions snap to the
    /// simple rational they approximate (`0.16666666666666` is `1/6`) while short truncations do
    /// not (`0.166666666` is not `1/6`).
    pub fn from_f64(value: f64) -> Result<Self> {
        if !value.is_finite() || value.abs() >= i64::MAX as f64 {
            return Err(GridIndexError::Construction(format!(
                "cannot represent {} as a fraction",
                value
            )));
        }

        let negative = value < 0.;
        let mut x = value.abs();

        // convergent matrix [[m00, m01], [m10, m11]]
        let (mut m00, mut m01, mut m10, mut m11) = (1_i64, 0_i64, 0_i64, 1_i64);
        let mut a = x as i64;
        let mut t2 = m11;
        let mut terms = 0;

        while t2 <= MAX_DENOMINATOR {
            let Some(t1) = m00.checked_mul(a).and_then(|t| t.checked_add(m01)) else {
                break;
            };
            m01 = m00;
            m00 = t1;
            m11 = m10;
            m10 = t2;

            if x == a as f64 {
                break;
            }

            x = 1. / (x - a as f64);
            if x > i64::MAX as f64 {
                break;
            }

            a = x as i64;
            match m10.checked_mul(a).and_then(|t| t.checked_add(m11)) {
                Some(t) => t2 = t,
                None => break,
            }

            terms += 1;
            if terms > MAX_EXPANSION_TERMS {
                return Err(GridIndexError::Construction(format!(
                    "cannot compute fraction from {}",
                    value
                )));
            }
        }

        // the integral part is never shifted away, so the denominator stays >= 1
        while m10 >= MAX_DENOMINATOR || (m00 >= MAX_DENOMINATOR && m10 > 1) {
            m00 >>= 1;
            m10 >>= 1;
        }

        let top = if negative { -m00 } else { m00 };
        Self::new(top, m10)
    }

    /// Approximate `value` on the lattice of multiples of `precision`.
    pub fn from_f64_with_precision(value: f64, precision: Fraction) -> Result<Self> {
        let bottom = precision.inverse()?.integral_part();
        let top = (bottom as f64 * value).round();
        if !top.is_finite() || top.abs() >= i64::MAX as f64 {
            return Err(GridIndexError::Construction(format!(
                "cannot represent {} with precision {}",
                value, precision
            )));
        }
        Self::new(top as i64, bottom)
    }

    /// The largest denominator produced by [`Fraction::from_f64`].
    pub fn max_denominator() -> i64 {
        MAX_DENOMINATOR
    }

    /// Number of arithmetic operations or comparisons in this process that fell back to floating
    /// point because an intermediate product overflowed.
    pub fn overflow_fallbacks() -> u64 {
        OVERFLOW_FALLBACKS.load(atomic::Ordering::Relaxed)
    }

    pub fn numerator(&self) -> i64 {
        self.top
    }

    pub fn denominator(&self) -> i64 {
        self.bottom
    }

    pub fn is_integer(&self) -> bool {
        self.bottom == 1
    }

    pub fn is_negative(&self) -> bool {
        self.top < 0
    }

    /// The integral part, truncated toward zero.
    pub fn integral_part(&self) -> i64 {
        self.top / self.bottom
    }

    /// `self - self.integral_part()`, carrying the sign of `self`.
    pub fn decimal_part(&self) -> Fraction {
        Self {
            top: self.top % self.bottom,
            bottom: self.bottom,
        }
    }

    pub fn abs(&self) -> Fraction {
        Self {
            top: self.top.abs(),
            bottom: self.bottom,
        }
    }

    pub fn inverse(&self) -> Result<Fraction> {
        if self.top == 0 {
            return Err(GridIndexError::Construction(
                "cannot compute the inverse of 0".to_string(),
            ));
        }
        Self::new(self.bottom, self.top)
    }

    pub fn to_f64(&self) -> f64 {
        self.top as f64 / self.bottom as f64
    }

    /// Iterate `x -> Fraction::from_f64(f64(x))` until it reaches a fixed point.
    pub fn stable_version(&self, max_iterations: usize) -> Result<Fraction> {
        let mut x = *self;
        for _ in 0..max_iterations {
            let y = Self::from_f64(x.to_f64())?;
            if y == x {
                return Ok(x);
            }
            x = y;
        }
        Err(GridIndexError::Construction(format!(
            "Fraction::stable_version({}) did not converge after {} iterations, last value {}",
            self, max_iterations, x
        )))
    }

    fn fallback(op: &'static str, lhs: Fraction, rhs: Fraction, value: f64) -> Result<Self> {
        OVERFLOW_FALLBACKS.fetch_add(1, atomic::Ordering::Relaxed);
        tracing::debug!(%lhs, %rhs, op, value, "fraction overflow, falling back to f64");
        Self::from_f64(value)
    }

    pub fn checked_add(self, other: Fraction) -> Result<Fraction> {
        let exact = self
            .top
            .checked_mul(other.bottom)
            .zip(other.top.checked_mul(self.bottom))
            .and_then(|(l, r)| l.checked_add(r))
            .zip(self.bottom.checked_mul(other.bottom))
            .and_then(|(top, bottom)| Self::reduce(top, bottom));

        match exact {
            Some(f) => Ok(f),
            None => Self::fallback("+", self, other, self.to_f64() + other.to_f64()),
        }
    }

    pub fn checked_sub(self, other: Fraction) -> Result<Fraction> {
        let exact = self
            .top
            .checked_mul(other.bottom)
            .zip(other.top.checked_mul(self.bottom))
            .and_then(|(l, r)| l.checked_sub(r))
            .zip(self.bottom.checked_mul(other.bottom))
            .and_then(|(top, bottom)| Self::reduce(top, bottom));

        match exact {
            Some(f) => Ok(f),
            None => Self::fallback("-", self, other, self.to_f64() - other.to_f64()),
        }
    }

    pub fn checked_mul(self, other: Fraction) -> Result<Fraction> {
        let exact = self
            .top
            .checked_mul(other.top)
            .zip(self.bottom.checked_mul(other.bottom))
            .and_then(|(top, bottom)| Self::reduce(top, bottom));

        match exact {
            Some(f) => Ok(f),
            None => Self::fallback("*", self, other, self.to_f64() * other.to_f64()),
        }
    }

    pub fn checked_div(self, other: Fraction) -> Result<Fraction> {
        if other.top == 0 {
            return Err(GridIndexError::Construction(format!(
                "division of {} by zero",
                self
            )));
        }

        let exact = self
            .top
            .checked_mul(other.bottom)
            .zip(self.bottom.checked_mul(other.top))
            .and_then(|(top, bottom)| Self::reduce(top, bottom));

        match exact {
            Some(f) => Ok(f),
            None => Self::fallback("/", self, other, self.to_f64() / other.to_f64()),
        }
    }
}

impl Default for Fraction {
    fn default() -> Self {
        Self { top: 0, bottom: 1 }
    }
}

impl From<i64> for Fraction {
    fn from(value: i64) -> Self {
        Self {
            top: value,
            bottom: 1,
        }
    }
}

impl From<i32> for Fraction {
    fn from(value: i32) -> Self {
        Self::from(i64::from(value))
    }
}

impl TryFrom<f64> for Fraction {
    type Error = GridIndexError;

    fn try_from(value: f64) -> Result<Self> {
        Self::from_f64(value)
    }
}

impl TryFrom<Fraction> for i64 {
    type Error = GridIndexError;

    fn try_from(value: Fraction) -> Result<Self> {
        if value.bottom == 1 {
            return Ok(value.top);
        }
        Err(GridIndexError::Construction(format!(
            "cannot convert fraction {} ({}) to an integer",
            value,
            value.to_f64()
        )))
    }
}

impl From<Fraction> for f64 {
    fn from(value: Fraction) -> Self {
        value.to_f64()
    }
}

impl FromStr for Fraction {
    type Err = GridIndexError;

    /// Parse `"p/q"` directly; anything else is parsed as a floating point value and expanded
    /// with [`Fraction::from_f64`].
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some((top, bottom)) = s.split_once('/') {
            let parse = |part: &str| {
                part.trim().parse::<i64>().map_err(|e| {
                    GridIndexError::Parse(format!("invalid fraction '{}': {}", s, e))
                })
            };
            return Fraction::new(parse(top)?, parse(bottom)?);
        }

        let value = s
            .parse::<f64>()
            .map_err(|e| GridIndexError::Parse(format!("invalid fraction '{}': {}", s, e)))?;
        Fraction::from_f64(value)
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bottom == 1 {
            write!(f, "{}", self.top)
        } else {
            write!(f, "{}/{}", self.top, self.bottom)
        }
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        if self == other {
            return Ordering::Equal;
        }

        match (
            self.top.checked_mul(other.bottom),
            other.top.checked_mul(self.bottom),
        ) {
            (Some(l), Some(r)) => l.cmp(&r),
            _ => {
                OVERFLOW_FALLBACKS.fetch_add(1, atomic::Ordering::Relaxed);
                tracing::debug!(lhs = %self, rhs = %other, "fraction comparison overflow, falling back to f64");
                match self.to_f64().total_cmp(&other.to_f64()) {
                    // distinct fractions that collapse onto the same f64 are still ordered
                    Ordering::Equal => (i128::from(self.top) * i128::from(other.bottom))
                        .cmp(&(i128::from(other.top) * i128::from(self.bottom))),
                    ordering => ordering,
                }
            }
        }
    }
}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq<f64> for Fraction {
    fn eq(&self, other: &f64) -> bool {
        self.to_f64() == *other
    }
}

impl PartialOrd<f64> for Fraction {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.to_f64().partial_cmp(other)
    }
}

impl PartialEq<Fraction> for f64 {
    fn eq(&self, other: &Fraction) -> bool {
        *self == other.to_f64()
    }
}

impl PartialOrd<Fraction> for f64 {
    fn partial_cmp(&self, other: &Fraction) -> Option<Ordering> {
        self.partial_cmp(&other.to_f64())
    }
}

impl Neg for Fraction {
    type Output = Fraction;

    fn neg(self) -> Fraction {
        Self {
            top: -self.top,
            bottom: self.bottom,
        }
    }
}

/// Implement a binary operator through its `checked_*` method.
///
/// # Panics
///
/// The operators panic when the checked method fails: division by an exact zero, or an
/// overflowing result that is not representable even after the floating point fallback.
macro_rules! impl_binary_op {
    ($op:ident, $method:ident, $checked:ident) => {
        impl $op for Fraction {
            type Output = Fraction;

            fn $method(self, rhs: Fraction) -> Fraction {
                self.$checked(rhs).unwrap_or_else(|e| panic!("{}", e))
            }
        }

        impl $op<i64> for Fraction {
            type Output = Fraction;

            fn $method(self, rhs: i64) -> Fraction {
                self.$checked(Fraction::from(rhs))
                    .unwrap_or_else(|e| panic!("{}", e))
            }
        }

        impl $op<Fraction> for i64 {
            type Output = Fraction;

            fn $method(self, rhs: Fraction) -> Fraction {
                Fraction::from(self)
                    .$checked(rhs)
                    .unwrap_or_else(|e| panic!("{}", e))
            }
        }
    };
}

impl_binary_op!(Add, add, checked_add);
impl_binary_op!(Sub, sub, checked_sub);
impl_binary_op!(Mul, mul, checked_mul);
impl_binary_op!(Div, div, checked_div);

impl AddAssign for Fraction {
    fn add_assign(&mut self, rhs: Fraction) {
        *self = *self + rhs;
    }
}

impl SubAssign for Fraction {
    fn sub_assign(&mut self, rhs: Fraction) {
        *self = *self - rhs;
    }
}

impl Zero for Fraction {
    fn zero() -> Self {
        Self::default()
    }

    fn is_zero(&self) -> bool {
        self.top == 0
    }
}

impl One for Fraction {
    fn one() -> Self {
        Self::from(1_i64)
    }
}

impl ToPrimitive for Fraction {
    fn to_i64(&self) -> Option<i64> {
        Some(self.integral_part())
    }

    fn to_u64(&self) -> Option<u64> {
        u64::try_from(self.integral_part()).ok()
    }

    fn to_f64(&self) -> Option<f64> {
        Some(Fraction::to_f64(self))
    }
}

impl FromPrimitive for Fraction {
    fn from_i64(n: i64) -> Option<Self> {
        Some(Self::from(n))
    }

    fn from_u64(n: u64) -> Option<Self> {
        i64::try_from(n).ok().map(Self::from)
    }

    fn from_f64(n: f64) -> Option<Self> {
        Fraction::from_f64(n).ok()
    }
}

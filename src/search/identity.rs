use std::fmt;

use sha2::{Digest, Sha256};

use crate::fraction::Fraction;

/// Deterministic identity of a point set, used to address its cached spatial index.
///
/// Two sources with the same kind, item count and defining parameters share one key, and so one
/// cached tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentKey {
    kind: &'static str,
    count: usize,
    digest: u64,
}

impl ContentKey {
    pub fn new(kind: &'static str, count: usize, digest: u64) -> Self {
        Self {
            kind,
            count,
            digest,
        }
    }

    /// Start hashing the defining parameters of a source of `count` points.
    pub fn builder(kind: &'static str, count: usize) -> ContentKeyBuilder {
        ContentKeyBuilder::new(kind, count)
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// The number of points the identified source yields.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Leading 64 bits of the SHA-256 of the defining parameters.
    pub fn digest(&self) -> u64 {
        self.digest
    }
}

/// Formats as `<kind>-<count>-<digest>`, safe to use as a file name.
impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{:016x}", self.kind, self.count, self.digest)
    }
}

/// Accumulates a SHA-256 over the canonical defining parameters of a point source.
#[derive(Debug, Clone)]
pub struct ContentKeyBuilder {
    kind: &'static str,
    count: usize,
    hasher: Sha256,
}

impl ContentKeyBuilder {
    pub fn new(kind: &'static str, count: usize) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        hasher.update(&(count as u64).to_le_bytes());
        Self {
            kind,
            count,
            hasher,
        }
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.hasher.update(bytes);
        self
    }

    pub fn usize(&mut self, value: usize) -> &mut Self {
        self.bytes(&(value as u64).to_le_bytes())
    }

    /// Hash a float by its bit pattern, with `-0.0` folded onto `0.0`.
    pub fn f64(&mut self, value: f64) -> &mut Self {
        let value = if value == 0. { 0. } else { value };
        self.bytes(&value.to_bits().to_le_bytes())
    }

    /// Hash a fraction as its canonical `(numerator, denominator)` pair.
    pub fn fraction(&mut self, value: Fraction) -> &mut Self {
        self.bytes(&value.numerator().to_le_bytes())
            .bytes(&value.denominator().to_le_bytes())
    }

    pub fn finish(&self) -> ContentKey {
        let hash = self.hasher.clone().finalize();
        let mut digest = [0; 8];
        digest.copy_from_slice(&hash[..8]);
        ContentKey::new(self.kind, self.count, u64::from_be_bytes(digest))
    }
}

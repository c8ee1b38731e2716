//! Versioned hashing used for rollouts, experiment bucketing and namespaces.
//!
//! The output of [`Sharder::hash`] for a given `(seed, value, version)` must never change: every
//! SDK evaluating the same configuration has to put the same unit in the same bucket. Bumping an
//! experiment's bucket version (which changes what gets hashed) is the only sanctioned way to
//! re-randomize a population.
use serde::{Deserialize, Serialize};

/// Hash algorithm version. Part of the rule definition, never inferred from data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum HashVersion {
    /// `fnv1a32(value + seed) % 1000 / 1000`.
    V1,
    /// `fnv1a32(str(fnv1a32(seed + value))) % 10000 / 10000`.
    #[default]
    V2,
}

/// Hash version number that this engine does not implement.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unsupported hash version: {0}")]
pub struct UnsupportedHashVersion(pub u8);

impl TryFrom<u8> for HashVersion {
    type Error = UnsupportedHashVersion;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(HashVersion::V1),
            2 => Ok(HashVersion::V2),
            other => Err(UnsupportedHashVersion(other)),
        }
    }
}

impl From<HashVersion> for u8 {
    fn from(value: HashVersion) -> u8 {
        match value {
            HashVersion::V1 => 1,
            HashVersion::V2 => 2,
        }
    }
}

/// Maps a unit to a point in `[0, 1)`.
pub trait Sharder {
    /// Hash `value` (the unit's hash attribute) under `seed` with the given algorithm version.
    fn hash(&self, seed: &str, value: &str, version: HashVersion) -> f64;
}

/// The default (and only) production sharder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fnv32Sharder;

impl Sharder for Fnv32Sharder {
    fn hash(&self, seed: &str, value: &str, version: HashVersion) -> f64 {
        match version {
            HashVersion::V1 => f64::from(fnv1a32(&[value, seed]) % 1_000) / 1_000.0,
            HashVersion::V2 => {
                let inner = fnv1a32(&[seed, value]).to_string();
                f64::from(fnv1a32(&[&inner]) % 10_000) / 10_000.0
            }
        }
    }
}

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a over the concatenation of `parts`.
///
/// Input is consumed as UTF-16 code units so non-ASCII strings hash identically to SDKs whose
/// strings are UTF-16 natively.
fn fnv1a32(parts: &[&str]) -> u32 {
    parts
        .iter()
        .flat_map(|part| part.encode_utf16())
        .fold(FNV_OFFSET_BASIS, |hash, unit| {
            (hash ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
        })
}

/// Half-open interval `[start, end)` of the hash space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketRange {
    #[allow(missing_docs)]
    pub start: f64,
    #[allow(missing_docs)]
    pub end: f64,
}

impl BucketRange {
    /// Return `true` if `h` falls inside the range.
    pub fn contains(&self, h: f64) -> bool {
        self.start <= h && h < self.end
    }
}

/// Partition `[0, 1)` into contiguous ranges, one per weight, in declaration order.
///
/// Each range starts where the previous weight ended and is `coverage * weight` wide, so changing
/// coverage never moves a unit from one variation to another. Non-finite and negative weights count
/// as zero; cumulative weight is truncated at 1.0, which gives variations past that point an empty
/// range.
pub fn bucket_ranges(weights: &[f64], coverage: f64) -> Vec<BucketRange> {
    let coverage = clamp_unit(coverage);
    let mut cumulative = 0.0_f64;
    weights
        .iter()
        .map(|&weight| {
            let weight = if weight.is_finite() && weight > 0.0 {
                weight
            } else {
                0.0
            };
            let start = cumulative.min(1.0);
            cumulative += weight;
            let width = cumulative.min(1.0) - start;
            BucketRange {
                start,
                end: start + coverage * width,
            }
        })
        .collect()
}

/// Index of the range containing `h`, or `None` if the unit falls outside all ranges.
pub fn choose_variation(h: f64, ranges: &[BucketRange]) -> Option<usize> {
    ranges.iter().position(|range| range.contains(h))
}

/// Clamp coverage-like values to `[0, 1]`. NaN is treated as 0.
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Sharder returning preconfigured hashes keyed by the hashed value. Unknown values hash to 0.
#[cfg(test)]
pub(crate) struct DeterministicSharder(pub std::collections::HashMap<String, f64>);

#[cfg(test)]
impl Sharder for DeterministicSharder {
    fn hash(&self, _seed: &str, value: &str, _version: HashVersion) -> f64 {
        self.0.get(value).copied().unwrap_or(0.0)
    }
}

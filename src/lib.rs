use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "python")]
mod python;

/// Free-form dimension name to score. Keys absent from one side compare as 0.
pub type TagVector = BTreeMap<String, f64>;

pub const TAG_MIN: f64 = 0.0;
pub const TAG_MAX: f64 = 10.0;
pub const SIMILARITY_MIN: f64 = 0.0;
pub const SIMILARITY_MAX: f64 = 100.0;
pub const SIMILARITY_METRIC_ID: &str = "euclid_union_keys_scale10_v1";
pub const MAX_ROUND_DIGITS: u32 = 6;

#[inline]
fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    if x < lo {
        lo
    } else if x > hi {
        hi
    } else {
        x
    }
}

/// Normalized Euclidean similarity over the union of keys, in `[0, 100]`.
///
/// An empty vector on either side scores 0. The distance is normalized
/// against `sqrt(|K|) * TAG_MAX`, the distance between an all-`TAG_MIN` and an
/// all-`TAG_MAX` vector over the same key set.
pub fn tag_similarity(left: &TagVector, right: &TagVector) -> f64 {
    if left.is_empty() || right.is_empty() {
        return SIMILARITY_MIN;
    }

    let keys: BTreeSet<&str> = left
        .keys()
        .chain(right.keys())
        .map(String::as_str)
        .collect();
    if keys.is_empty() {
        return SIMILARITY_MAX;
    }

    let sum_sq = keys
        .iter()
        .map(|key| {
            let a = left.get(*key).copied().unwrap_or(0.0);
            let b = right.get(*key).copied().unwrap_or(0.0);
            (a - b) * (a - b)
        })
        .sum::<f64>();
    // d / (sqrt(|K|) * range) under a single sqrt
    let range = TAG_MAX - TAG_MIN;
    let normalized = (sum_sq / (keys.len() as f64 * range * range)).sqrt();

    let similarity = SIMILARITY_MAX - normalized * SIMILARITY_MAX;
    if !similarity.is_finite() {
        tracing::warn!(
            keys = keys.len(),
            "non-finite tag similarity; scoring as minimum"
        );
        return SIMILARITY_MIN;
    }
    clamp(similarity, SIMILARITY_MIN, SIMILARITY_MAX)
}

/// Tags whose value is non-finite or outside `[TAG_MIN, TAG_MAX]`.
pub fn out_of_range_tags(tags: &TagVector) -> Vec<(&str, f64)> {
    tags.iter()
        .filter(|(_, value)| !value.is_finite() || **value < TAG_MIN || **value > TAG_MAX)
        .map(|(key, value)| (key.as_str(), *value))
        .collect()
}

/// Half-away-from-zero rounding to `digits` decimals.
///
/// Precisions too fine to represent leave the value unchanged.
pub fn round_to(value: f64, digits: u32) -> f64 {
    let Ok(exponent) = i32::try_from(digits) else {
        return value;
    };
    let scaled = value * 10_f64.powi(exponent);
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / 10_f64.powi(exponent)
}

#[inline]
pub fn round1(value: f64) -> f64 {
    round_to(value, 1)
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

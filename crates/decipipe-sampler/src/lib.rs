// crates/decipipe-sampler/src/lib.rs
// ============================================================================
// Module: Adaptive Sampler
// Description: Deterministic, boundary-preserving selection of which item
//              indices in a step's output become full decision events.
// Purpose: Bound storage for very large steps under `CAPTURE_LEVEL=sampled`
//          without losing first/last-item regressions, and without the
//          sample depending on wall-clock time, thread scheduling, or a
//          random seed.
// Dependencies: none (optional serde for config structs)
// ============================================================================

//! ## Overview
//! Two pure functions: [`target_size`] decides how many events a step of
//! size `n` should retain, and [`should_sample`] decides whether one
//! particular index is one of them. Both are deterministic: identical
//! `(i, n, k)` always returns identical results, so retried deliveries and
//! replayed ingestion produce the same sample.
//!
//! This crate is intentionally dependency-free besides an optional serde
//! derive for [`SamplerConfig`], in the spirit of a small, single-purpose
//! logic crate.

/// Returns the number of events a step of size `n` should retain when
/// `CAPTURE_LEVEL=sampled`.
///
/// # Invariants
/// - `n <= 5` retains everything (`n`).
/// - `5 < n <= 1000` retains exactly `5`.
/// - `n > 1000` retains `min(ceil(10 * log10(n)), 100)`.
#[must_use]
pub fn target_size(n: u64) -> u64 {
    if n <= 5 {
        return n;
    }
    if n <= 1000 {
        return 5;
    }
    #[allow(clippy::cast_precision_loss, reason = "n is bounded well under 2^53")]
    let log = (n as f64).log10();
    let scaled = (10.0 * log).ceil();
    #[allow(
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation,
        reason = "scaled is a positive, ceil()'d value"
    )]
    let scaled = if scaled.is_finite() { scaled as u64 } else { 100 };
    scaled.min(100)
}

/// Decides whether index `i` (zero-based, out of `n` items) is retained as
/// a full decision event when the target sample size is `k`.
///
/// # Invariants
/// - Returns `true` for `i == 0` and `i == n - 1` (boundary preservation),
///   for any `n > 0` and `k >= 2`.
/// - Returns `true` for every index when `n <= k`.
/// - Otherwise selects a deterministic, uniformly spaced set of interior
///   indices such that the total number of `true` indices is at most
///   `max(k, 2)`.
#[must_use]
pub fn should_sample(i: u64, n: u64, k: u64) -> bool {
    if n == 0 || i >= n {
        return false;
    }
    if i == 0 || i == n - 1 {
        return true;
    }
    if n <= k {
        return true;
    }
    let k = k.max(2);
    if k <= 2 {
        return false;
    }
    let interior_count = k - 2;
    let span = (n - 1) as f64;
    let steps = (k - 1) as f64;
    for m in 1..=interior_count {
        #[allow(
            clippy::cast_sign_loss,
            clippy::cast_possible_truncation,
            reason = "target is a rounded position within [0, n-1]"
        )]
        let target = (m as f64 * span / steps).round() as u64;
        if target == i {
            return true;
        }
    }
    false
}

/// Returns the set of retained indices for `(n, k)`, for tests and for
/// callers that want the whole sample at once rather than probing index
/// by index.
#[must_use]
pub fn sampled_indices(n: u64, k: u64) -> Vec<u64> {
    (0..n).filter(|&i| should_sample(i, n, k)).collect()
}

/// Configuration knobs for the sampler, serializable for the capture
/// façade's environment-driven configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SamplerConfig {
    /// Capture level controlling whether sampling is applied at all.
    pub level: CaptureLevel,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            level: CaptureLevel::Sampled,
        }
    }
}

/// The three supported capture levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CaptureLevel {
    /// Emit no decision events; counts only.
    MetricsOnly,
    /// Boundary + uniform sample of interior indices.
    Sampled,
    /// Every item becomes a decision event.
    Full,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_size_small_n_is_n() {
        for n in 0..=5 {
            assert_eq!(target_size(n), n);
        }
    }

    #[test]
    fn target_size_mid_range_is_five() {
        assert_eq!(target_size(6), 5);
        assert_eq!(target_size(1000), 5);
    }

    #[test]
    fn target_size_large_n_is_log_scaled_and_capped() {
        assert_eq!(target_size(5000), 37);
        assert!(target_size(10_000_000_000) <= 100);
    }

    #[test]
    fn boundaries_always_sampled() {
        for n in 1..50u64 {
            for k in 2..10u64 {
                assert!(should_sample(0, n, k));
                assert!(should_sample(n - 1, n, k));
            }
        }
    }

    #[test]
    fn small_n_samples_everything() {
        for i in 0..5 {
            assert!(should_sample(i, 5, 10));
        }
    }

    #[test]
    fn determinism_across_calls() {
        for _ in 0..5 {
            assert_eq!(should_sample(500, 5000, 37), should_sample(500, 5000, 37));
        }
    }

    #[test]
    fn sample_size_is_bounded() {
        let n = 5000;
        let k = target_size(n);
        let picked = sampled_indices(n, k);
        assert!(picked.len() as u64 <= k.max(2));
        assert!(picked.contains(&0));
        assert!(picked.contains(&(n - 1)));
    }

    #[test]
    fn interior_picks_are_roughly_even_spread() {
        let n = 100;
        let k = 10;
        let picked = sampled_indices(n, k);
        assert!(picked.len() as u64 <= k);
        let mut gaps = Vec::new();
        for window in picked.windows(2) {
            gaps.push(window[1] - window[0]);
        }
        let max_gap = *gaps.iter().max().unwrap_or(&0);
        let min_gap = *gaps.iter().min().unwrap_or(&0);
        assert!(max_gap <= min_gap.saturating_mul(3).max(5));
    }

    proptest::proptest! {
        #[test]
        fn should_sample_is_deterministic(i in 0u64..2000, n in 1u64..2000, k in 2u64..200) {
            let i = i % n;
            assert_eq!(should_sample(i, n, k), should_sample(i, n, k));
        }

        #[test]
        fn should_sample_never_exceeds_bound(n in 1u64..500, k in 2u64..50) {
            let picked = sampled_indices(n, k);
            let bound = if n <= k { n } else { k.max(2) };
            assert!(picked.len() as u64 <= bound);
        }
    }
}

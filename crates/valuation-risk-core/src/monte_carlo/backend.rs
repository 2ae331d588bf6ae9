//! Numeric backends for the simulation engine.
//!
//! A backend draws uniform variates from a seed and reduces a sorted sample
//! to moments, percentiles and a histogram. Two backends fed the same seed
//! agree statistically but not sample-for-sample.

use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// A single histogram bin. `[bin_start, bin_end)` except the last bin,
/// which also holds the sample maximum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub bin_start: f64,
    pub bin_end: f64,
    pub count: u32,
    /// Share of the whole sample in this bin, in percent (0-100).
    pub percentage: f64,
}

/// Which backend implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Scalar,
    Parallel,
}

pub trait NumericBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// `n` variates drawn uniformly from `[low, high]`, reproducible from `seed`.
    fn uniform_variates(&self, seed: u64, n: usize, low: f64, high: f64) -> Vec<f64>;

    /// Sort ascending. Inputs are finite.
    fn sort(&self, values: &mut [f64]);

    fn mean(&self, values: &[f64]) -> f64;

    /// Population standard deviation.
    fn std_dev(&self, values: &[f64]) -> f64;

    /// Linear-interpolated percentile of a sorted, non-empty slice. `p` in 0-100.
    fn percentile(&self, sorted: &[f64], p: f64) -> f64 {
        percentile_sorted(sorted, p)
    }

    /// `num_bins` equal-width bins over `[min, max]` of a sorted, non-empty slice.
    fn histogram(&self, sorted: &[f64], num_bins: usize) -> Vec<HistogramBin>;
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Compute the percentile value from a **sorted** slice using linear interpolation.
pub(crate) fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

fn bin_index(value: f64, min_val: f64, bin_width: f64, num_bins: usize) -> usize {
    let idx = ((value - min_val) / bin_width).floor();
    if idx < 0.0 {
        0
    } else {
        (idx as usize).min(num_bins - 1)
    }
}

fn empty_bins(min_val: f64, max_val: f64, num_bins: usize) -> Vec<HistogramBin> {
    let bin_width = (max_val - min_val) / num_bins as f64;
    (0..num_bins)
        .map(|i| {
            let bin_start = min_val + i as f64 * bin_width;
            let bin_end = if i == num_bins - 1 {
                max_val
            } else {
                min_val + (i + 1) as f64 * bin_width
            };
            HistogramBin {
                bin_start,
                bin_end,
                count: 0,
                percentage: 0.0,
            }
        })
        .collect()
}

fn finish_bins(mut bins: Vec<HistogramBin>, counts: &[u32], total: usize) -> Vec<HistogramBin> {
    let n = total as f64;
    for (bin, &count) in bins.iter_mut().zip(counts) {
        bin.count = count;
        bin.percentage = count as f64 / n * 100.0;
    }
    bins
}

fn histogram_with<F>(sorted: &[f64], num_bins: usize, count_fn: F) -> Vec<HistogramBin>
where
    F: FnOnce(f64, f64) -> Vec<u32>,
{
    let num_bins = num_bins.max(1);
    let min_val = sorted[0];
    let max_val = sorted[sorted.len() - 1];
    let bins = empty_bins(min_val, max_val, num_bins);

    // Degenerate sample: every bin has zero width, the first one takes it all.
    if (max_val - min_val).abs() < f64::EPSILON {
        let mut counts = vec![0u32; num_bins];
        counts[0] = sorted.len() as u32;
        return finish_bins(bins, &counts, sorted.len());
    }

    let bin_width = (max_val - min_val) / num_bins as f64;
    let counts = count_fn(min_val, bin_width);
    finish_bins(bins, &counts, sorted.len())
}

// ---------------------------------------------------------------------------
// Scalar backend
// ---------------------------------------------------------------------------

/// Sequential backend. Always available.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScalarBackend;

impl NumericBackend for ScalarBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Scalar
    }

    fn uniform_variates(&self, seed: u64, n: usize, low: f64, high: f64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen_range(low..=high)).collect()
    }

    fn sort(&self, values: &mut [f64]) {
        values.sort_by(f64::total_cmp);
    }

    fn mean(&self, values: &[f64]) -> f64 {
        values.mean()
    }

    fn std_dev(&self, values: &[f64]) -> f64 {
        values.population_std_dev()
    }

    fn histogram(&self, sorted: &[f64], num_bins: usize) -> Vec<HistogramBin> {
        histogram_with(sorted, num_bins, |min_val, bin_width| {
            let num_bins = num_bins.max(1);
            let mut counts = vec![0u32; num_bins];
            for &val in sorted {
                counts[bin_index(val, min_val, bin_width, num_bins)] += 1;
            }
            counts
        })
    }
}

// ---------------------------------------------------------------------------
// Parallel backend
// ---------------------------------------------------------------------------

/// Number of variates drawn from one RNG sub-stream.
#[cfg(feature = "parallel")]
const CHUNK_SIZE: usize = 4_096;

/// Rayon backend. Variates are drawn in fixed-size chunks, each from its
/// own sub-stream seeded from `(seed, chunk index)`, so the output does not
/// depend on the thread count.
#[cfg(feature = "parallel")]
#[derive(Debug, Default, Clone, Copy)]
pub struct ParallelBackend;

#[cfg(feature = "parallel")]
impl NumericBackend for ParallelBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Parallel
    }

    fn uniform_variates(&self, seed: u64, n: usize, low: f64, high: f64) -> Vec<f64> {
        use rayon::prelude::*;

        let mut out = vec![0.0; n];
        out.par_chunks_mut(CHUNK_SIZE)
            .enumerate()
            .for_each(|(chunk, slot)| {
                let stream = seed ^ (chunk as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
                let mut rng = StdRng::seed_from_u64(stream);
                for v in slot.iter_mut() {
                    *v = rng.gen_range(low..=high);
                }
            });
        out
    }

    fn sort(&self, values: &mut [f64]) {
        use rayon::prelude::*;
        values.par_sort_unstable_by(f64::total_cmp);
    }

    fn mean(&self, values: &[f64]) -> f64 {
        use rayon::prelude::*;
        if values.is_empty() {
            return f64::NAN;
        }
        values.par_iter().sum::<f64>() / values.len() as f64
    }

    fn std_dev(&self, values: &[f64]) -> f64 {
        use rayon::prelude::*;
        if values.is_empty() {
            return f64::NAN;
        }
        let mean = self.mean(values);
        let variance =
            values.par_iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        variance.sqrt()
    }

    fn histogram(&self, sorted: &[f64], num_bins: usize) -> Vec<HistogramBin> {
        use rayon::prelude::*;

        histogram_with(sorted, num_bins, |min_val, bin_width| {
            let num_bins = num_bins.max(1);
            sorted
                .par_chunks(CHUNK_SIZE)
                .fold(
                    || vec![0u32; num_bins],
                    |mut counts, chunk| {
                        for &val in chunk {
                            counts[bin_index(val, min_val, bin_width, num_bins)] += 1;
                        }
                        counts
                    },
                )
                .reduce(
                    || vec![0u32; num_bins],
                    |mut a, b| {
                        for (x, y) in a.iter_mut().zip(b) {
                            *x += y;
                        }
                        a
                    },
                )
        })
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

static SCALAR: ScalarBackend = ScalarBackend;

#[cfg(feature = "parallel")]
static PARALLEL: ParallelBackend = ParallelBackend;

static DEFAULT_KIND: OnceLock<BackendKind> = OnceLock::new();

/// Backend for the given kind. Asking for `Parallel` in a build without the
/// `parallel` feature yields the scalar backend.
pub fn backend_for(kind: BackendKind) -> &'static dyn NumericBackend {
    match kind {
        BackendKind::Scalar => &SCALAR,
        #[cfg(feature = "parallel")]
        BackendKind::Parallel => &PARALLEL,
        #[cfg(not(feature = "parallel"))]
        BackendKind::Parallel => &SCALAR,
    }
}

/// Process-wide default, resolved once from compiled features and the
/// number of available cores.
pub fn default_backend() -> &'static dyn NumericBackend {
    let kind = *DEFAULT_KIND.get_or_init(|| {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let kind = if cfg!(feature = "parallel") && cores > 1 {
            BackendKind::Parallel
        } else {
            BackendKind::Scalar
        };
        tracing::debug!(?kind, cores, "selected default numeric backend");
        kind
    });
    backend_for(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted_sample() -> Vec<f64> {
        let mut v = ScalarBackend.uniform_variates(7, 5_000, -1.0, 1.0);
        ScalarBackend.sort(&mut v);
        v
    }

    #[test]
    fn test_percentile_interpolates() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile_sorted(&data, 50.0), 3.0);
        assert_eq!(percentile_sorted(&data, 0.0), 1.0);
        assert_eq!(percentile_sorted(&data, 100.0), 5.0);
        assert!((percentile_sorted(&data, 25.0) - 2.0).abs() < 1e-12);
        assert!((percentile_sorted(&data, 10.0) - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_single_value() {
        assert_eq!(percentile_sorted(&[42.0], 95.0), 42.0);
    }

    #[test]
    fn test_uniform_variates_within_bounds() {
        let v = ScalarBackend.uniform_variates(1, 10_000, -0.3, 0.3);
        assert_eq!(v.len(), 10_000);
        assert!(v.iter().all(|x| (-0.3..=0.3).contains(x)));
    }

    #[test]
    fn test_uniform_variates_degenerate_range() {
        let v = ScalarBackend.uniform_variates(1, 10, 0.05, 0.05);
        assert!(v.iter().all(|&x| x == 0.05));
    }

    #[test]
    fn test_uniform_variates_reproducible() {
        let a = ScalarBackend.uniform_variates(99, 1_000, 0.0, 1.0);
        let b = ScalarBackend.uniform_variates(99, 1_000, 0.0, 1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_histogram_has_twenty_bins_and_full_mass() {
        let data = sorted_sample();
        let h = ScalarBackend.histogram(&data, 20);
        assert_eq!(h.len(), 20);
        let total: u32 = h.iter().map(|b| b.count).sum();
        assert_eq!(total as usize, data.len());
        let pct: f64 = h.iter().map(|b| b.percentage).sum();
        assert!((pct - 100.0).abs() < 1e-9, "pct={pct}");
    }

    #[test]
    fn test_histogram_edges_span_sample() {
        let data = sorted_sample();
        let h = ScalarBackend.histogram(&data, 20);
        assert_eq!(h[0].bin_start, data[0]);
        assert_eq!(h[19].bin_end, data[data.len() - 1]);
        for pair in h.windows(2) {
            assert!((pair[0].bin_end - pair[1].bin_start).abs() < 1e-12);
        }
    }

    #[test]
    fn test_histogram_max_lands_in_last_bin() {
        let data = [0.0, 1.0, 2.0, 3.0, 4.0];
        let h = ScalarBackend.histogram(&data, 4);
        let counts: Vec<u32> = h.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 1, 1, 2]);
    }

    #[test]
    fn test_histogram_constant_sample() {
        let data = [5.0; 10];
        let h = ScalarBackend.histogram(&data, 20);
        assert_eq!(h.len(), 20);
        assert_eq!(h[0].count, 10);
        assert_eq!(h[0].percentage, 100.0);
        assert!(h[1..].iter().all(|b| b.count == 0));
    }

    #[test]
    fn test_scalar_moments() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((ScalarBackend.mean(&data) - 5.0).abs() < 1e-12);
        assert!((ScalarBackend.std_dev(&data) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_backend_for_scalar() {
        assert_eq!(backend_for(BackendKind::Scalar).kind(), BackendKind::Scalar);
    }

    #[test]
    fn test_default_backend_is_stable() {
        assert_eq!(default_backend().kind(), default_backend().kind());
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_scalar_statistically() {
        let mut a = ScalarBackend.uniform_variates(42, 20_000, 0.0, 1.0);
        let mut b = ParallelBackend.uniform_variates(42, 20_000, 0.0, 1.0);
        ScalarBackend.sort(&mut a);
        ParallelBackend.sort(&mut b);
        assert!((ScalarBackend.mean(&a) - ParallelBackend.mean(&b)).abs() < 0.01);
        assert!((ScalarBackend.std_dev(&a) - ParallelBackend.std_dev(&b)).abs() < 0.01);
        for p in [5.0, 25.0, 50.0, 75.0, 95.0] {
            let pa = ScalarBackend.percentile(&a, p);
            let pb = ParallelBackend.percentile(&b, p);
            assert!((pa - pb).abs() < 0.02, "p{p}: {pa} vs {pb}");
        }
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_histogram_matches_scalar_on_same_sample() {
        let data = sorted_sample();
        assert_eq!(
            ScalarBackend.histogram(&data, 20),
            ParallelBackend.histogram(&data, 20)
        );
    }
}

//! Single-channel histogram matching.
//!
//! A foreground channel is pushed through its own cumulative distribution
//! and then through the inverse of the background's, both quantised into
//! the same number of bins.

use ndarray::{Array2, ArrayView2, Zip};

/// Bin count used by every matching strategy.
pub const N_BINS: usize = 255;

/// Equal-width histogram over the value range of its input.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub counts: Vec<f64>,
    /// `counts.len() + 1` increasing bin edges.
    pub edges: Vec<f64>,
}

impl Histogram {
    /// Histogram of `values`, each optionally weighted. The range is the
    /// min..max of the values, widened by half a unit when they are all equal.
    pub fn new(values: ArrayView2<f32>, weights: Option<ArrayView2<f32>>, bins: usize) -> Self {
        let (lo, hi) = value_range(values);
        let width = (hi - lo) / bins as f64;
        let edges: Vec<f64> = (0..=bins).map(|i| lo + i as f64 * width).collect();

        let mut counts = vec![0f64; bins];
        let mut add = |v: f32, w: f64| {
            let v = v as f64;
            if !(lo..=hi).contains(&v) {
                return;
            }
            let idx = (((v - lo) / width) as usize).min(bins - 1);
            counts[idx] += w;
        };
        match weights {
            Some(weights) => Zip::from(values).and(weights).for_each(|&v, &w| add(v, w as f64)),
            None => values.iter().for_each(|&v| add(v, 1.0)),
        }

        Self { counts, edges }
    }

    /// Left edge of every bin.
    pub fn left_edges(&self) -> &[f64] {
        &self.edges[..self.counts.len()]
    }

    /// Cumulative distribution scaled to `0..=bins` and truncated to whole
    /// steps. A histogram with no mass yields all zeros.
    pub fn cdf_norm(&self) -> Vec<f64> {
        let bins = self.counts.len() as f64;
        let mut running = 0.0;
        let cdf: Vec<f64> = self
            .counts
            .iter()
            .map(|c| {
                running += c;
                running
            })
            .collect();
        let total = cdf.last().copied().unwrap_or(0.0);

        cdf.iter()
            .map(|&c| {
                let v = (bins * c / total).floor();
                if v.is_finite() {
                    v.clamp(0.0, 255.0)
                } else {
                    0.0
                }
            })
            .collect()
    }
}

fn value_range(values: ArrayView2<f32>) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 1.0);
    }
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v as f64), hi.max(v as f64))
        });
    if lo > hi {
        (0.0, 1.0)
    } else if lo == hi {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    }
}

/// Piecewise-linear interpolation of `x` on the non-decreasing samples
/// `(xp, fp)`. Values outside the samples clamp to the end points; repeated
/// sample positions resolve to the last of the run. Non-finite results are 0.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    debug_assert_eq!(xp.len(), fp.len());
    let n = xp.len();
    if n == 0 {
        return 0.0;
    }

    let above = xp.partition_point(|&p| p <= x);
    let y = if above == 0 {
        fp[0]
    } else if above == n {
        fp[n - 1]
    } else {
        let j = above - 1;
        if xp[j] == x {
            fp[j]
        } else {
            let slope = (fp[j + 1] - fp[j]) / (xp[j + 1] - xp[j]);
            slope * (x - xp[j]) + fp[j]
        }
    };

    if y.is_finite() {
        y
    } else {
        0.0
    }
}

/// Match one foreground channel to one background channel.
///
/// `alpha` weights the foreground histogram so only visible pixels shape
/// it; every background pixel counts equally.
pub fn match_channel(
    foreground: ArrayView2<f32>,
    alpha: ArrayView2<f32>,
    background: ArrayView2<f32>,
    bins: usize,
) -> Array2<f32> {
    let fg_hist = Histogram::new(foreground, Some(alpha), bins);
    let bg_hist = Histogram::new(background, None, bins);

    let fg_cdf = fg_hist.cdf_norm();
    let bg_cdf = bg_hist.cdf_norm();
    if fg_cdf.iter().all(|&c| c == 0.0) {
        tracing::warn!("foreground histogram has no visible mass, cdf clamped to 0");
    }

    let fg_edges = fg_hist.left_edges();
    let bg_edges = bg_hist.left_edges();

    foreground.map(|&v| {
        let rank = interp(v as f64, fg_edges, &fg_cdf);
        interp(rank, &bg_cdf, bg_edges) as f32
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn interp_clamps_and_interpolates() {
        let xp = [0.0, 1.0, 2.0];
        let fp = [10.0, 20.0, 40.0];
        assert_eq!(interp(-1.0, &xp, &fp), 10.0);
        assert_eq!(interp(5.0, &xp, &fp), 40.0);
        assert_eq!(interp(1.5, &xp, &fp), 30.0);
        assert_eq!(interp(1.0, &xp, &fp), 20.0);
    }

    #[test]
    fn interp_over_repeated_positions_stays_finite() {
        let xp = [0.0, 3.0, 3.0, 3.0, 5.0];
        let fp = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(interp(3.0, &xp, &fp), 3.0);
        assert_eq!(interp(4.0, &xp, &fp), 3.5);
        assert!(interp(2.0, &xp, &fp).is_finite());
    }

    #[test]
    fn constant_channel_widens_range() {
        let values = Array2::from_elem((3, 3), 7.0f32);
        let hist = Histogram::new(values.view(), None, 4);
        assert_eq!(hist.edges.first(), Some(&6.5));
        assert_eq!(hist.edges.last(), Some(&7.5));
        assert_eq!(hist.counts.iter().sum::<f64>(), 9.0);
    }

    #[test]
    fn zero_weights_give_a_zero_cdf() {
        let values = Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f32);
        let alpha = Array2::zeros((4, 4));
        let hist = Histogram::new(values.view(), Some(alpha.view()), N_BINS);
        assert!(hist.cdf_norm().iter().all(|&c| c == 0.0));
    }

    #[test]
    fn matching_to_itself_is_near_identity() {
        let values = Array2::from_shape_fn((16, 16), |(r, c)| (r * 16 + c) as f32);
        let alpha = Array2::from_elem((16, 16), 1.0f32);
        let matched = match_channel(values.view(), alpha.view(), values.view(), N_BINS);
        let mean_err = Zip::from(&matched)
            .and(&values)
            .fold(0.0f32, |acc, &m, &v| acc + (m - v).abs())
            / 256.0;
        assert!(mean_err < 3.0, "mean error {mean_err}");
        assert!(matched.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn matching_shifts_toward_background_range() {
        let fg = Array2::from_shape_fn((8, 8), |(r, c)| (r * 8 + c) as f32);
        let bg = fg.map(|v| v + 100.0);
        let alpha = Array2::from_elem((8, 8), 1.0f32);
        let matched = match_channel(fg.view(), alpha.view(), bg.view(), N_BINS);
        assert!(matched.iter().all(|&v| v >= 100.0));
    }
}

//! Descriptive statistics of the Monte Carlo samples.

use serde::Serialize;

pub const DEFAULT_HISTOGRAM_BINS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnsembleSummary {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation (divides by `count`).
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub p2_5: f64,
    pub p97_5: f64,
    /// Share of samples at or below zero. Descriptive only, not a p-value.
    pub fraction_non_positive: f64,
}

impl EnsembleSummary {
    /// `None` for an empty sample.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let count = samples.len();
        let n = count as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        Some(Self {
            count,
            mean,
            std_dev: variance.sqrt(),
            min: sorted[0],
            max: sorted[count - 1],
            p2_5: percentile_sorted(&sorted, 2.5),
            p97_5: percentile_sorted(&sorted, 97.5),
            fraction_non_positive: samples.iter().filter(|&&s| s <= 0.0).count() as f64 / n,
        })
    }
}

/// Linear interpolation between closest ranks, `pct` in `[0, 100]`.
pub fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        len => {
            let rank = (pct.clamp(0.0, 100.0) / 100.0) * (len - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Equal-width histogram over the sample range; the last bin is closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// `counts.len() + 1` bin edges.
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    pub fn from_samples(samples: &[f64], bins: usize) -> Self {
        let bins = bins.max(1);
        let finite: Vec<f64> = samples.iter().copied().filter(|s| s.is_finite()).collect();

        let (mut lo, mut hi) = finite
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| {
                (lo.min(s), hi.max(s))
            });
        if finite.is_empty() {
            lo = 0.0;
            hi = 1.0;
        } else if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }

        let width = (hi - lo) / bins as f64;
        let edges: Vec<f64> = (0..=bins).map(|i| lo + width * i as f64).collect();
        let mut counts = vec![0_usize; bins];
        for s in finite {
            let idx = (((s - lo) / width) as usize).min(bins - 1);
            counts[idx] += 1;
        }

        Self { edges, counts }
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    pub fn max_count(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    pub fn range(&self) -> (f64, f64) {
        (self.edges[0], self.edges[self.edges.len() - 1])
    }

    /// `(left edge, right edge, count)` for each bin.
    pub fn bars(&self) -> impl Iterator<Item = (f64, f64, usize)> + '_ {
        self.edges
            .windows(2)
            .zip(&self.counts)
            .map(|(edge, &count)| (edge[0], edge[1], count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn summary_uses_population_std_dev() {
        let summary = EnsembleSummary::from_samples(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(summary.count, 8);
        assert_relative_eq!(summary.mean, 5.0);
        assert_relative_eq!(summary.std_dev, 2.0);
        assert_eq!(summary.min, 2.0);
        assert_eq!(summary.max, 9.0);
        assert_eq!(summary.fraction_non_positive, 0.0);
    }

    #[test]
    fn fraction_counts_zero_as_non_positive() {
        let summary = EnsembleSummary::from_samples(&[-1.0, 0.0, 1.0, 2.0]).unwrap();
        assert_relative_eq!(summary.fraction_non_positive, 0.5);
    }

    #[test]
    fn empty_sample_has_no_summary() {
        assert!(EnsembleSummary::from_samples(&[]).is_none());
    }

    #[test]
    fn percentiles_interpolate_between_ranks() {
        let sorted: Vec<f64> = (0..=10).map(f64::from).collect();
        assert_relative_eq!(percentile_sorted(&sorted, 50.0), 5.0);
        assert_relative_eq!(percentile_sorted(&sorted, 2.5), 0.25);
        assert_relative_eq!(percentile_sorted(&sorted, 97.5), 9.75);
        assert_relative_eq!(percentile_sorted(&[3.0], 97.5), 3.0);
    }

    #[test]
    fn histogram_counts_every_sample_once() {
        let samples = [0.0, 0.1, 0.25, 0.5, 0.5, 0.99, 1.0];
        let hist = Histogram::from_samples(&samples, 4);
        assert_eq!(hist.bins(), 4);
        assert_eq!(hist.edges, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(hist.counts, vec![2, 1, 2, 2]);
        assert_eq!(hist.counts.iter().sum::<usize>(), samples.len());
        assert_eq!(hist.max_count(), 2);
    }

    #[test]
    fn constant_samples_get_a_unit_range() {
        let hist = Histogram::from_samples(&[3.0; 5], 10);
        assert_eq!(hist.range(), (2.5, 3.5));
        assert_eq!(hist.counts.iter().sum::<usize>(), 5);
    }
}

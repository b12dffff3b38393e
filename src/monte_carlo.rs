//! Monte Carlo slope ensemble.
//!
//! Each iteration draws every value uniformly from `[v - h, v + h]`, refits an
//! unweighted line and records the slope, intercept, fitted line and the
//! perturbed values. Iterations share nothing but the random number generator,
//! so the ensemble is a set of independent draws.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::data::ObservationSet;
use crate::fit::{fit_ols, LinearFit};
use crate::{ensure_len, TrendError};

pub const DEFAULT_ITERATIONS: usize = 1000;
pub const DEFAULT_HALF_WIDTH_SCALE: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    /// Number of perturb-and-refit iterations.
    pub iterations: usize,
    /// Half-width of the perturbation window in units of each uncertainty.
    pub half_width_scale: f64,
    /// `None` draws the seed from OS entropy.
    pub seed: Option<u64>,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            half_width_scale: DEFAULT_HALF_WIDTH_SCALE,
            seed: None,
        }
    }
}

impl MonteCarloConfig {
    pub fn validate(&self) -> Result<(), TrendError> {
        if self.iterations == 0 {
            return Err(TrendError::ZeroIterations);
        }

        if !self.half_width_scale.is_finite() || self.half_width_scale < 0.0 {
            return Err(TrendError::InvalidConfig(format!(
                "half_width_scale must be finite and non-negative, got {}",
                self.half_width_scale
            )));
        }

        Ok(())
    }

    pub fn half_widths(&self, uncertainties: &[f64]) -> Vec<f64> {
        uncertainties
            .iter()
            .map(|u| u * self.half_width_scale)
            .collect()
    }

    pub fn rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    /// Scales the observation uncertainties and runs the ensemble.
    pub fn run(&self, observations: &ObservationSet) -> Result<MonteCarloEnsemble, TrendError> {
        self.validate()?;
        let half_widths = self.half_widths(observations.uncertainties());
        let mut rng = self.rng();
        run_monte_carlo(
            observations.positions(),
            observations.values(),
            &half_widths,
            self.iterations,
            &mut rng,
        )
    }
}

/// Per-iteration results, all in iteration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonteCarloEnsemble {
    pub slopes: Vec<f64>,
    pub intercepts: Vec<f64>,
    /// `slope_k * P + intercept_k` for each iteration.
    pub models: Vec<Vec<f64>>,
    /// Perturbed values fed to each refit.
    pub perturbed: Vec<Vec<f64>>,
}

impl MonteCarloEnsemble {
    fn with_capacity(iterations: usize) -> Self {
        Self {
            slopes: Vec::with_capacity(iterations),
            intercepts: Vec::with_capacity(iterations),
            models: Vec::with_capacity(iterations),
            perturbed: Vec::with_capacity(iterations),
        }
    }

    pub fn len(&self) -> usize {
        self.slopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slopes.is_empty()
    }

    pub fn fits(&self) -> impl Iterator<Item = LinearFit> + '_ {
        self.slopes
            .iter()
            .zip(&self.intercepts)
            .map(|(&slope, &intercept)| LinearFit { slope, intercept })
    }
}

pub fn run_monte_carlo<R: Rng + ?Sized>(
    positions: &[f64],
    values: &[f64],
    half_widths: &[f64],
    iterations: usize,
    rng: &mut R,
) -> Result<MonteCarloEnsemble, TrendError> {
    ensure_len("monte carlo values", positions.len(), values.len())?;
    ensure_len("monte carlo half-widths", positions.len(), half_widths.len())?;
    if iterations == 0 {
        return Err(TrendError::ZeroIterations);
    }

    let mut ensemble = MonteCarloEnsemble::with_capacity(iterations);
    for _ in 0..iterations {
        let jittered = perturb_values(values, half_widths, rng);
        let fit = fit_ols(positions, &jittered)?;

        ensemble.slopes.push(fit.slope);
        ensemble.intercepts.push(fit.intercept);
        ensemble.models.push(fit.fitted(positions));
        ensemble.perturbed.push(jittered);
    }

    log::debug!("monte carlo ensemble complete: {iterations} iterations");
    Ok(ensemble)
}

/// Draws each value uniformly from the closed window `[v - h, v + h]`.
///
/// A non-positive or non-finite half-width collapses the window to `v`.
pub fn perturb_values<R: Rng + ?Sized>(values: &[f64], half_widths: &[f64], rng: &mut R) -> Vec<f64> {
    values
        .iter()
        .zip(half_widths)
        .map(|(&value, &half_width)| {
            if half_width.is_finite() && half_width > 0.0 {
                Uniform::new_inclusive(value - half_width, value + half_width).sample(rng)
            } else {
                value
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::EnsembleSummary;
    use proptest::prelude::*;

    const P: [f64; 4] = [0.0, 1.0, 2.0, 3.0];
    const V: [f64; 4] = [1.0, 2.0, 3.0, 4.1];

    #[test]
    fn ensemble_has_one_entry_per_iteration() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let ensemble = run_monte_carlo(&P, &V, &[0.2; 4], 37, &mut rng).unwrap();
        assert_eq!(ensemble.len(), 37);
        assert_eq!(ensemble.intercepts.len(), 37);
        assert_eq!(ensemble.models.len(), 37);
        assert_eq!(ensemble.perturbed.len(), 37);
        assert!(ensemble.models.iter().all(|m| m.len() == P.len()));
    }

    #[test]
    fn models_are_the_fitted_lines() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let ensemble = run_monte_carlo(&P, &V, &[0.2; 4], 5, &mut rng).unwrap();
        for (fit, model) in ensemble.fits().zip(&ensemble.models) {
            assert_eq!(model, &fit.fitted(&P));
        }
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let observations = ObservationSet::new(P.to_vec(), V.to_vec(), vec![0.1; 4]).unwrap();
        let config = MonteCarloConfig {
            iterations: 50,
            seed: Some(2023),
            ..MonteCarloConfig::default()
        };
        let a = config.run(&observations).unwrap();
        let b = config.run(&observations).unwrap();
        assert_eq!(a, b);

        let other = MonteCarloConfig {
            seed: Some(2024),
            ..config
        };
        assert_ne!(a.slopes, other.run(&observations).unwrap().slopes);
    }

    #[test]
    fn reference_scenario_centres_on_the_ols_slope() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let ensemble = run_monte_carlo(&P, &V, &[0.2; 4], 1000, &mut rng).unwrap();
        let summary = EnsembleSummary::from_samples(&ensemble.slopes).unwrap();

        assert!((summary.mean - 1.03).abs() < 0.02, "mean {}", summary.mean);
        assert!(summary.std_dev > 0.0);
        // slope = sum(dx * v') / 5 with |dx| summing to 4, so |slope - 1.03| <= 0.16
        assert!(summary.std_dev < 0.16);
        assert!(summary.min >= 1.03 - 0.16 - 1e-9);
        assert!(summary.max <= 1.03 + 0.16 + 1e-9);
    }

    #[test]
    fn zero_half_width_is_a_point_mass() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let ensemble = run_monte_carlo(&P, &V, &[0.0, -1.0, 0.0, 0.0], 20, &mut rng).unwrap();
        assert!(ensemble.perturbed.iter().all(|p| p == &V.to_vec()));
        assert!(ensemble.slopes.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(matches!(
            run_monte_carlo(&P, &V, &[0.2; 4], 0, &mut rng),
            Err(TrendError::ZeroIterations)
        ));
        assert!(matches!(
            run_monte_carlo(&P, &V, &[0.2; 3], 10, &mut rng),
            Err(TrendError::LengthMismatch { .. })
        ));
        assert!(matches!(
            run_monte_carlo(&[1.0, 1.0], &[0.0, 1.0], &[0.1, 0.1], 10, &mut rng),
            Err(TrendError::SingularDesign)
        ));
    }

    #[test]
    fn half_widths_scale_the_uncertainties() {
        let config = MonteCarloConfig::default();
        assert_eq!(config.half_widths(&[0.01, 0.5]), vec![0.02, 1.0]);
        assert!(MonteCarloConfig {
            half_width_scale: f64::NAN,
            ..MonteCarloConfig::default()
        }
        .validate()
        .is_err());
    }

    proptest! {
        #[test]
        fn perturbed_values_stay_inside_the_window(
            rows in prop::collection::vec((-10.0f64..10.0, 0.0f64..2.0), 1..32),
            seed in any::<u64>(),
        ) {
            let values: Vec<f64> = rows.iter().map(|r| r.0).collect();
            let half_widths: Vec<f64> = rows.iter().map(|r| r.1).collect();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);

            for _ in 0..8 {
                let jittered = perturb_values(&values, &half_widths, &mut rng);
                prop_assert_eq!(jittered.len(), values.len());
                for ((v, h), p) in values.iter().zip(&half_widths).zip(&jittered) {
                    prop_assert!(*p >= v - h && *p <= v + h);
                }
            }
        }
    }
}

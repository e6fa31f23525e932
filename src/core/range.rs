//! Sequential Bayesian estimate of a subject's heart-rate baseline.
//!
//! The model is a normal likelihood with unknown mean and variance under a
//! normal/inverse-gamma prior. The first `warmup_len` samples seed the mean
//! and variance; every later sample yields one posterior interval
//! `mu ± k·sqrt(sigma2)` from fresh draws of both parameters.
//!
//! Draws come from a caller-supplied [`Rng`], so a seeded generator makes a
//! run reproducible.

use crate::core::sample::SensorSample;
use crate::core::windowing::DEFAULT_WARMUP_LEN;
use crate::error::PipelineError;
use rand::distributions::Distribution;
use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{InverseGamma, Normal};

/// Hyperparameters of the range estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Shape offset added to the warm-up count in the variance draw
    pub alpha_prior: f64,
    /// Scale offset added to the squared deviations in the variance draw
    pub beta_prior: f64,
    /// Interval half-width multiplier
    pub k: f64,
    /// Prior mean. Reserved: the update seeds from the warm-up window.
    pub mu_prior: f64,
    /// Prior variance of the mean. Reserved.
    pub tau2_prior: f64,
    /// Prior degrees of freedom. Reserved.
    pub nu_prior: f64,
    /// Samples used to seed the estimate before any interval is emitted
    pub warmup_len: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            alpha_prior: 0.01,
            beta_prior: 0.01,
            k: 0.1,
            mu_prior: 0.0,
            tau2_prior: 1.0,
            nu_prior: 100.0,
            warmup_len: DEFAULT_WARMUP_LEN,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.warmup_len == 0 {
            return Err(PipelineError::InvalidConfig(
                "estimator warmup_len must be positive".to_string(),
            ));
        }
        if !(self.k > 0.0 && self.k.is_finite()) {
            return Err(PipelineError::InvalidConfig(format!(
                "estimator k must be positive, got {}",
                self.k
            )));
        }
        if self.alpha_prior < 0.0 || self.beta_prior <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "estimator priors out of range: alpha={}, beta={}",
                self.alpha_prior, self.beta_prior
            )));
        }
        Ok(())
    }
}

/// Confidence interval around the baseline at one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PosteriorEstimate {
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub timestamp: i64,
    pub lat: f64,
    pub long: f64,
}

/// Range estimator over heart-rate samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeEstimator {
    config: EstimatorConfig,
}

impl RangeEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Lazily compute posterior intervals for `data`.
    ///
    /// Yields `data.len() - warmup_len` estimates, or none when the data does
    /// not cover the warm-up window. Cloning the returned iterator before
    /// consuming it replays the same draws.
    pub fn posterior<'a, R: Rng>(&self, data: &'a [SensorSample], rng: R) -> Posterior<'a, R> {
        Posterior::new(data, self.config, rng)
    }
}

/// Iterator over the posterior intervals of one input sequence.
#[derive(Debug, Clone)]
pub struct Posterior<'a, R> {
    data: &'a [SensorSample],
    config: EstimatorConfig,
    rng: R,
    next: usize,
    /// Sum of heart rates over `data[..next]`
    hr_sum: f64,
    sigma2: f64,
}

impl<'a, R: Rng> Posterior<'a, R> {
    fn new(data: &'a [SensorSample], config: EstimatorConfig, rng: R) -> Self {
        let warmup = config.warmup_len;
        if warmup == 0 || data.len() < warmup {
            return Self {
                data,
                config,
                rng,
                next: data.len(),
                hr_sum: 0.0,
                sigma2: 0.0,
            };
        }

        let train = &data[..warmup];
        let hr_sum: f64 = train.iter().map(|s| s.heart_rate).sum();
        let mean = hr_sum / warmup as f64;
        let sigma2 = train
            .iter()
            .map(|s| (s.heart_rate - mean).powi(2))
            .sum::<f64>()
            / warmup as f64;

        Self {
            data,
            config,
            rng,
            next: warmup,
            hr_sum,
            sigma2,
        }
    }

    fn step(&mut self, j: usize) -> Result<PosteriorEstimate, PipelineError> {
        let n_train = self.config.warmup_len as f64;
        let history = &self.data[..j];

        let running_mean = self.hr_sum / j as f64;
        let mu = draw_normal(&mut self.rng, running_mean, (self.sigma2 / n_train).sqrt())?;

        let squared_dev: f64 = history.iter().map(|s| (s.heart_rate - mu).powi(2)).sum();
        let shape = (n_train + self.config.alpha_prior) / 2.0;
        let scale = (squared_dev + self.config.beta_prior) / 2.0;
        let sigma2 = InverseGamma::new(shape, scale)
            .map_err(|e| PipelineError::Distribution {
                name: "inverse-gamma",
                reason: e.to_string(),
            })?
            .sample(&mut self.rng);
        self.sigma2 = sigma2;

        let sample = &self.data[j];
        let half_width = self.config.k * sigma2.sqrt();
        Ok(PosteriorEstimate {
            lower_bound: mu - half_width,
            upper_bound: mu + half_width,
            timestamp: sample.timestamp,
            lat: sample.lat,
            long: sample.long,
        })
    }
}

impl<R: Rng> Iterator for Posterior<'_, R> {
    type Item = Result<PosteriorEstimate, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        let j = self.next;
        if j >= self.data.len() {
            return None;
        }

        let result = self.step(j);
        match result {
            Ok(_) => {
                self.hr_sum += self.data[j].heart_rate;
                self.next += 1;
            }
            // fuse after a failed draw
            Err(_) => self.next = self.data.len(),
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.data.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl<R: Rng> ExactSizeIterator for Posterior<'_, R> {}

/// Draw from N(mean, std_dev²); a zero spread returns the mean itself.
fn draw_normal<R: Rng>(rng: &mut R, mean: f64, std_dev: f64) -> Result<f64, PipelineError> {
    if std_dev == 0.0 {
        return Ok(mean);
    }
    let normal = Normal::new(mean, std_dev).map_err(|e| PipelineError::Distribution {
        name: "normal",
        reason: e.to_string(),
    })?;
    Ok(normal.sample(rng))
}

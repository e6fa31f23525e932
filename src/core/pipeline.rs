//! Pipeline orchestration.
//!
//! Wires the stages together for one invocation:
//! buffer → {range estimator, rule classifier} → assembler → hotspot map.
//!
//! Everything here is a pure in-memory transformation. Durable state goes in
//! and comes out by value; reading and writing it is the caller's job.

use crate::config::Config;
use crate::core::derived::{assemble, DerivedRecord};
use crate::core::hotspot::{HotspotAggregator, HotspotMap, MergeSummary};
use crate::core::range::{EstimatorConfig, PosteriorEstimate, RangeEstimator};
use crate::core::rules::{ClassifierConfig, RuleClassifier};
use crate::core::sample::SensorSample;
use crate::core::windowing::{SignalWindowBuffer, SubjectState};
use crate::error::PipelineError;
use chrono_tz::Tz;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of processing one subject.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectOutcome {
    /// State to persist for the next invocation
    pub state: SubjectState,
    pub records: Vec<DerivedRecord>,
}

/// Everything one pass reads.
#[derive(Debug, Clone, Default)]
pub struct PassInput {
    /// New raw samples per subject
    pub samples: BTreeMap<String, Vec<SensorSample>>,
    /// Persisted state per subject; absent subjects start fresh
    pub states: BTreeMap<String, SubjectState>,
    /// Persisted hotspot map
    pub hotspots: HotspotMap,
}

/// Everything one pass produces.
#[derive(Debug, Clone, Default)]
pub struct PassOutput {
    pub states: BTreeMap<String, SubjectState>,
    /// Derived records per subject (subjects with none are omitted)
    pub derived: BTreeMap<String, Vec<DerivedRecord>>,
    pub hotspots: HotspotMap,
    pub summary: PassSummary,
}

/// Counters describing one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub subjects: usize,
    pub warming_up: usize,
    pub samples: usize,
    pub derived_records: usize,
    pub hotspots: MergeSummary,
}

/// The stress scoring pipeline.
#[derive(Debug, Clone)]
pub struct StressPipeline {
    buffer: SignalWindowBuffer,
    estimator: RangeEstimator,
    classifier: RuleClassifier,
    aggregator: HotspotAggregator,
    rng: StdRng,
}

impl StressPipeline {
    /// Build a pipeline from validated parameters.
    pub fn new(
        estimator: EstimatorConfig,
        classifier: ClassifierConfig,
        hotspot_threshold: f64,
        timezone: Option<Tz>,
        seed: Option<u64>,
    ) -> Result<Self, PipelineError> {
        estimator.validate()?;
        classifier.validate()?;
        if !(0.0..=1.0).contains(&hotspot_threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "hotspot_threshold must lie in [0, 1], got {hotspot_threshold}"
            )));
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            buffer: SignalWindowBuffer::new(estimator.warmup_len, classifier.window_len),
            estimator: RangeEstimator::new(estimator),
            classifier: RuleClassifier::new(classifier),
            aggregator: HotspotAggregator::new(hotspot_threshold, timezone),
            rng,
        })
    }

    /// Build a pipeline from the application configuration.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        Self::new(
            config.estimator,
            config.classifier,
            config.hotspot_threshold,
            config.parsed_timezone()?,
            config.seed,
        )
    }

    pub fn aggregator(&self) -> &HotspotAggregator {
        &self.aggregator
    }

    /// Run one subject's new samples through buffer, estimator, classifier
    /// and assembler.
    pub fn process_subject(
        &mut self,
        state: SubjectState,
        samples: Vec<SensorSample>,
    ) -> Result<SubjectOutcome, PipelineError> {
        let (state, batch) = self.buffer.extend(state, samples);
        let Some(batch) = batch else {
            return Ok(SubjectOutcome {
                state,
                records: Vec::new(),
            });
        };

        let posteriors = self
            .estimator
            .posterior(&batch.range_input, &mut self.rng)
            .collect::<Result<Vec<PosteriorEstimate>, _>>()?;
        let rules = self.classifier.classify(&batch.rule_input);
        let records = assemble(&posteriors, &rules.scores, &batch.fresh);

        tracing::debug!(
            posteriors = posteriors.len(),
            scores = rules.scores.len(),
            records = records.len(),
            "Scored subject batch"
        );

        Ok(SubjectOutcome { state, records })
    }

    /// Process every subject in `input` and merge the results into the
    /// hotspot map. Subjects are handled in key order.
    pub fn run_pass(&mut self, input: PassInput) -> Result<PassOutput, PipelineError> {
        let PassInput {
            samples,
            mut states,
            mut hotspots,
        } = input;

        let mut summary = PassSummary::default();
        let mut derived = BTreeMap::new();

        for (subject, new_samples) in samples {
            summary.subjects += 1;
            summary.samples += new_samples.len();

            let state = states.remove(&subject).unwrap_or_default();
            let outcome = self.process_subject(state, new_samples)?;

            if !outcome.state.is_warm(self.buffer.warmup_len()) {
                summary.warming_up += 1;
                tracing::debug!(
                    subject = %subject,
                    buffered = outcome.state.init_data.len(),
                    "Subject still warming up"
                );
            }

            let merged = self.aggregator.merge_into(&mut hotspots, &outcome.records);
            summary.hotspots.accepted += merged.accepted;
            summary.hotspots.below_threshold += merged.below_threshold;
            summary.hotspots.invalid_time += merged.invalid_time;
            summary.derived_records += outcome.records.len();

            states.insert(subject.clone(), outcome.state);
            if !outcome.records.is_empty() {
                derived.insert(subject, outcome.records);
            }
        }

        Ok(PassOutput {
            states,
            derived,
            hotspots,
            summary,
        })
    }
}

//! Core scoring functionality.
//!
//! This module contains:
//! - Sample buffering across invocations
//! - Heart-rate posterior intervals
//! - Rule-based stress scores with duplicate suppression
//! - Derived records and the hotspot map they feed

pub mod derived;
pub mod hotspot;
pub mod pipeline;
pub mod range;
pub mod rules;
pub mod sample;
pub mod windowing;

// Re-export commonly used types
pub use derived::{assemble, DerivedRecord};
pub use hotspot::{Coordinate, Day, HotspotAggregator, HotspotMap, Hour, MergeSummary};
pub use pipeline::{PassInput, PassOutput, PassSummary, StressPipeline, SubjectOutcome};
pub use range::{EstimatorConfig, Posterior, PosteriorEstimate, RangeEstimator};
pub use rules::{ClassifierConfig, RuleClassifier, RuleOutput, RuleScore, RuleWeights};
pub use sample::SensorSample;
pub use windowing::{ScoringBatch, SignalWindowBuffer, SubjectState};

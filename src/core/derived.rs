//! Merge of posterior intervals and rule scores into derived records.

use crate::core::range::PosteriorEstimate;
use crate::core::rules::RuleScore;
use crate::core::sample::SensorSample;
use serde::{Deserialize, Serialize};

/// Unified per-sample output of the scoring pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedRecord {
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Rule-based stress score in [0, 1]
    pub stress_score: f64,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub lat: f64,
    pub long: f64,
}

/// Align the three streams by position.
///
/// Only `min(len)` records are produced; surplus entries of the longer
/// streams are dropped. Time comes from the raw sample, location from the
/// posterior entry.
pub fn assemble(
    posteriors: &[PosteriorEstimate],
    scores: &[RuleScore],
    raw: &[SensorSample],
) -> Vec<DerivedRecord> {
    posteriors
        .iter()
        .zip(scores)
        .zip(raw)
        .map(|((posterior, score), sample)| DerivedRecord {
            lower_bound: posterior.lower_bound,
            upper_bound: posterior.upper_bound,
            stress_score: score.stress_score,
            timestamp: sample.timestamp,
            lat: posterior.lat,
            long: posterior.long,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn posterior(ts: i64, lat: f64) -> PosteriorEstimate {
        PosteriorEstimate {
            lower_bound: 60.0,
            upper_bound: 62.0,
            timestamp: ts,
            lat,
            long: lat + 1.0,
        }
    }

    #[test]
    fn test_truncates_to_shortest_stream() {
        let posteriors = vec![posterior(1, 10.0), posterior(2, 11.0), posterior(3, 12.0)];
        let scores = vec![
            RuleScore { stress_score: 0.5, timestamp: 100 },
            RuleScore { stress_score: 0.7, timestamp: 101 },
        ];
        let raw: Vec<SensorSample> = (0..5).map(|i| SensorSample::new(70.0, 33.0, 1.0, 1000 + i)).collect();

        let records = assemble(&posteriors, &scores, &raw);
        assert_eq!(
            records,
            vec![
                DerivedRecord {
                    lower_bound: 60.0,
                    upper_bound: 62.0,
                    stress_score: 0.5,
                    timestamp: 1000,
                    lat: 10.0,
                    long: 11.0,
                },
                DerivedRecord {
                    lower_bound: 60.0,
                    upper_bound: 62.0,
                    stress_score: 0.7,
                    timestamp: 1001,
                    lat: 11.0,
                    long: 12.0,
                },
            ]
        );
    }

    #[test]
    fn test_empty_stream_yields_nothing() {
        let raw = vec![SensorSample::default(); 3];
        assert!(assemble(&[posterior(1, 0.0)], &[], &raw).is_empty());
        assert!(assemble(&[], &[RuleScore { stress_score: 1.0, timestamp: 0 }], &raw).is_empty());
    }
}

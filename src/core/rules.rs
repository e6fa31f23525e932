//! Heuristic stress classifier over sliding windows of raw samples.
//!
//! Every 30-sample window (stride 1) is scored by four rules on the EDA and
//! skin-temperature traces, combined as a weighted sum in [0, 1]. A final
//! suppression pass zeroes high scores that are followed closely by another
//! record, so one stress event is not counted once per overlapping window.

use crate::core::sample::SensorSample;
use crate::core::windowing::trailing;
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// Samples per scoring window.
pub const DEFAULT_WINDOW_LEN: usize = 30;

/// Scores above this are candidates for suppression.
pub const DEFAULT_SUPPRESSION_THRESHOLD: f64 = 0.75;

/// Time span (timestamp units) within which a later record suppresses an earlier one.
pub const DEFAULT_SUPPRESSION_WINDOW: i64 = 10_000;

// EDA trend: open count intervals (2, 5) and (5, 8)
const EDA_FULL_RANGE: (usize, usize) = (2, 5);
const EDA_HALF_RANGE: (usize, usize) = (5, 8);

// Temperature trend: open interval (3, 5), closed interval [5, 6]
const TEMP_FULL_RANGE: (usize, usize) = (3, 5);
const TEMP_HALF_RANGE: (usize, usize) = (5, 6);
const TEMP_COUNT_START: usize = 3;

// Time to peak: closed [1, 5], half-open (5, 15]
const PEAK_FULL_RANGE: (i64, i64) = (1, 5);
const PEAK_HALF_LIMIT: i64 = 15;

// Slope angle in degrees
const SLOPE_FULL_DEG: f64 = 10.0;
const SLOPE_HALF_DEG: f64 = 8.0;

/// Weight of each rule in the combined score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleWeights {
    pub eda_trend: f64,
    pub temp_trend: f64,
    pub time_to_peak: f64,
    pub slope_angle: f64,
}

impl Default for RuleWeights {
    fn default() -> Self {
        Self {
            eda_trend: 0.4,
            temp_trend: 0.2,
            time_to_peak: 0.1,
            slope_angle: 0.3,
        }
    }
}

impl RuleWeights {
    fn as_array(&self) -> [f64; 4] {
        [
            self.eda_trend,
            self.temp_trend,
            self.time_to_peak,
            self.slope_angle,
        ]
    }

    /// Weights must be non-negative and sum to at most 1.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let weights = self.as_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "rule weights must be non-negative: {self:?}"
            )));
        }
        let total: f64 = weights.iter().sum();
        if total > 1.0 + 1e-9 {
            return Err(PipelineError::InvalidConfig(format!(
                "rule weights sum to {total}, above 1"
            )));
        }
        Ok(())
    }

    /// Weighted sum of the rule sub-scores.
    pub fn combine(&self, breakdown: &RuleBreakdown) -> f64 {
        self.eda_trend * breakdown.eda_trend
            + self.temp_trend * breakdown.temp_trend
            + self.time_to_peak * breakdown.time_to_peak
            + self.slope_angle * breakdown.slope_angle
    }
}

/// Classifier parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub window_len: usize,
    pub weights: RuleWeights,
    pub suppression_threshold: f64,
    pub suppression_window: i64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            window_len: DEFAULT_WINDOW_LEN,
            weights: RuleWeights::default(),
            suppression_threshold: DEFAULT_SUPPRESSION_THRESHOLD,
            suppression_window: DEFAULT_SUPPRESSION_WINDOW,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        // the temperature rule starts counting at index 3
        if self.window_len <= TEMP_COUNT_START {
            return Err(PipelineError::InvalidConfig(format!(
                "classifier window_len must exceed {TEMP_COUNT_START}, got {}",
                self.window_len
            )));
        }
        if self.suppression_window < 0 {
            return Err(PipelineError::InvalidConfig(
                "suppression_window must not be negative".to_string(),
            ));
        }
        self.weights.validate()
    }
}

/// Sub-scores of the four rules for one window, each in {0, 0.5, 1}.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RuleBreakdown {
    pub eda_trend: f64,
    pub temp_trend: f64,
    pub time_to_peak: f64,
    pub slope_angle: f64,
}

/// Combined stress score of one window, stamped with its first sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuleScore {
    pub stress_score: f64,
    pub timestamp: i64,
}

/// Result of classifying one input sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleOutput {
    /// One score per window position, after suppression
    pub scores: Vec<RuleScore>,
    /// Trailing raw samples that lead the next invocation's input
    pub last_raw: Vec<SensorSample>,
}

/// Outcome of a non-increasing run count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendCount {
    pub score: f64,
    pub count: usize,
}

/// Outcome of the time-to-peak rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakTiming {
    pub score: f64,
    pub time_diff: i64,
    pub peak_value: f64,
}

/// Rule-based stress classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleClassifier {
    config: ClassifierConfig,
}

impl RuleClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Score every window of `data` and apply suppression.
    ///
    /// Produces `data.len() - window_len + 1` scores (none for shorter input).
    pub fn classify(&self, data: &[SensorSample]) -> RuleOutput {
        let window_len = self.config.window_len;
        let mut scores: Vec<RuleScore> = if data.len() < window_len {
            Vec::new()
        } else {
            data.windows(window_len)
                .map(|window| RuleScore {
                    stress_score: self.score_window(window).0,
                    timestamp: window[0].timestamp,
                })
                .collect()
        };

        self.suppress(&mut scores);

        RuleOutput {
            scores,
            last_raw: trailing(data, window_len),
        }
    }

    /// Score a single window, returning the combined score and its parts.
    pub fn score_window(&self, window: &[SensorSample]) -> (f64, RuleBreakdown) {
        let eda: Vec<f64> = window.iter().map(|s| s.eda).collect();
        let temp: Vec<f64> = window.iter().map(|s| s.skin_temp).collect();
        let times: Vec<i64> = window.iter().map(|s| s.timestamp).collect();

        let first_half = &eda[..eda.len() / 2];
        let eda_rule = eda_trend(first_half);
        let temp_rule = temp_trend(&temp);
        let stop_index = eda_rule.count.min(eda.len().saturating_sub(1));
        let peak = time_to_peak(&eda, &times, stop_index);
        let slope = slope_angle(peak.peak_value, eda[stop_index], peak.time_diff);

        let breakdown = RuleBreakdown {
            eda_trend: eda_rule.score,
            temp_trend: temp_rule.score,
            time_to_peak: peak.score,
            slope_angle: slope,
        };
        (self.config.weights.combine(&breakdown), breakdown)
    }

    /// Zero each score above the threshold that has a later record within
    /// `(0, suppression_window]` time units.
    pub fn suppress(&self, scores: &mut [RuleScore]) {
        let window = self.config.suppression_window;
        for i in 0..scores.len() {
            if scores[i].stress_score <= self.config.suppression_threshold {
                continue;
            }
            let origin = scores[i].timestamp;
            let shadowed = scores[i + 1..].iter().any(|later| {
                let gap = later.timestamp.saturating_sub(origin);
                gap > 0 && gap <= window
            });
            if shadowed {
                scores[i].stress_score = 0.0;
            }
        }
    }
}

/// Count samples from `start` onward that stay at or below `values[0]`,
/// stopping at the first one above it.
fn count_non_increasing(values: &[f64], start: usize) -> usize {
    let Some(&reference) = values.first() else {
        return 0;
    };
    values
        .iter()
        .skip(start)
        .take_while(|&&v| v <= reference)
        .count()
}

/// EDA trend rule over the first half of a window.
pub fn eda_trend(eda: &[f64]) -> TrendCount {
    let count = count_non_increasing(eda, 1);
    let score = if count > EDA_FULL_RANGE.0 && count < EDA_FULL_RANGE.1 {
        1.0
    } else if count > EDA_HALF_RANGE.0 && count < EDA_HALF_RANGE.1 {
        0.5
    } else {
        0.0
    };
    TrendCount { score, count }
}

/// Skin-temperature trend rule; counting starts at index 3.
pub fn temp_trend(temp: &[f64]) -> TrendCount {
    let count = count_non_increasing(temp, TEMP_COUNT_START);
    let score = if count > TEMP_FULL_RANGE.0 && count < TEMP_FULL_RANGE.1 {
        1.0
    } else if (TEMP_HALF_RANGE.0..=TEMP_HALF_RANGE.1).contains(&count) {
        0.5
    } else {
        0.0
    };
    TrendCount { score, count }
}

/// Time from the end of the EDA trend (`stop_index`) to the EDA peak.
///
/// The peak is the first maximum of the window.
pub fn time_to_peak(eda: &[f64], times: &[i64], stop_index: usize) -> PeakTiming {
    let Some((peak_index, peak_value)) = eda
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, v)| match best {
            Some((_, max)) if v <= max => best,
            _ => Some((i, v)),
        })
    else {
        return PeakTiming {
            score: 0.0,
            time_diff: 0,
            peak_value: 0.0,
        };
    };

    let time_diff = times[peak_index].saturating_sub(times[stop_index]);
    let score = if (PEAK_FULL_RANGE.0..=PEAK_FULL_RANGE.1).contains(&time_diff) {
        1.0
    } else if time_diff > PEAK_FULL_RANGE.1 && time_diff <= PEAK_HALF_LIMIT {
        0.5
    } else {
        0.0
    };
    PeakTiming {
        score,
        time_diff,
        peak_value,
    }
}

/// Slope angle rule between the trend end and the peak.
///
/// A zero `time_diff` has no defined slope and scores 0.
pub fn slope_angle(peak_value: f64, value_at_stop: f64, time_diff: i64) -> f64 {
    if time_diff == 0 {
        return 0.0;
    }
    let slope = (peak_value - value_at_stop) / time_diff as f64;
    let angle = slope.atan().to_degrees();
    if angle >= SLOPE_FULL_DEG {
        1.0
    } else if angle >= SLOPE_HALF_DEG {
        0.5
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn window(eda: &[f64], temp: &[f64], times: &[i64]) -> Vec<SensorSample> {
        eda.iter()
            .zip(temp)
            .zip(times)
            .map(|((&e, &t), &ts)| SensorSample::new(70.0, t, e, ts))
            .collect()
    }

    /// A first value followed by `count` lower values, then a higher one.
    fn run_of(count: usize, len: usize) -> Vec<f64> {
        let mut values = vec![10.0];
        values.extend(std::iter::repeat(5.0).take(count));
        values.resize(len, 20.0);
        values
    }

    #[test]
    fn test_eda_trend_thresholds() {
        let cases = [(2, 0.0), (3, 1.0), (4, 1.0), (5, 0.0), (6, 0.5), (7, 0.5), (8, 0.0)];
        for (count, expected) in cases {
            let rule = eda_trend(&run_of(count, 15));
            assert_eq!(rule.count, count);
            assert_eq!(rule.score, expected, "count {count}");
        }
    }

    #[test]
    fn test_temp_trend_counts_from_fourth_sample() {
        let cases = [(3, 0.0), (4, 1.0), (5, 0.5), (6, 0.5), (7, 0.0)];
        for (count, expected) in cases {
            let mut temp = vec![33.0, 40.0, 40.0];
            temp.extend(std::iter::repeat(32.0).take(count));
            temp.resize(30, 35.0);
            let rule = temp_trend(&temp);
            assert_eq!(rule.count, count);
            assert_eq!(rule.score, expected, "count {count}");
        }
    }

    #[test]
    fn test_time_to_peak_ranges() {
        let eda = [1.0, 0.5, 3.0, 3.0];
        let cases = [(0, 0.0), (1, 1.0), (5, 1.0), (6, 0.5), (15, 0.5), (16, 0.0)];
        for (diff, expected) in cases {
            let times = [0, 0, diff, diff + 100];
            let peak = time_to_peak(&eda, &times, 1);
            assert_eq!(peak.time_diff, diff);
            assert_eq!(peak.peak_value, 3.0);
            assert_eq!(peak.score, expected, "diff {diff}");
        }

        // peak before the trend end
        let peak = time_to_peak(&[5.0, 1.0, 1.0], &[0, 10, 20], 2);
        assert_eq!(peak.time_diff, -20);
        assert_eq!(peak.score, 0.0);
    }

    #[test]
    fn test_slope_angle_thresholds() {
        let rise = |deg: f64| deg.to_radians().tan() * 100.0;
        assert_eq!(slope_angle(rise(12.0), 0.0, 100), 1.0);
        assert_eq!(slope_angle(rise(9.0), 0.0, 100), 0.5);
        assert_eq!(slope_angle(rise(5.0), 0.0, 100), 0.0);
        assert_eq!(slope_angle(-rise(45.0), 0.0, 100), 0.0);
    }

    #[test]
    fn test_slope_with_zero_time_diff_scores_zero() {
        assert_eq!(slope_angle(10.0, 1.0, 0), 0.0);
    }

    #[test]
    fn test_decreasing_eda_run_scores_first_rule() {
        let mut eda = vec![5.0, 4.0, 3.0, 2.0];
        eda.extend((0..26).map(|i| 6.0 + i as f64));
        let temp = vec![33.0; 30];
        let times: Vec<i64> = (0..30).map(|i| i * 1000).collect();

        let classifier = RuleClassifier::default();
        let rule = eda_trend(&eda[..15]);
        assert_eq!(rule.count, 3);

        let (score, breakdown) = classifier.score_window(&window(&eda, &temp, &times));
        assert_eq!(breakdown.eda_trend, 1.0);
        assert_eq!(breakdown.temp_trend, 0.0);
        assert_eq!(breakdown.time_to_peak, 0.0);
        assert_eq!(breakdown.slope_angle, 0.0);
        assert!((score - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_window_count_and_last_raw() {
        let classifier = RuleClassifier::default();
        let data: Vec<SensorSample> = (0..45)
            .map(|i| SensorSample::new(70.0, 33.0, 1.0, i * 100_000))
            .collect();

        let output = classifier.classify(&data);
        assert_eq!(output.scores.len(), 16);
        assert_eq!(output.scores[0].timestamp, 0);
        assert_eq!(output.scores[15].timestamp, 1_500_000);
        assert_eq!(output.last_raw.len(), 30);
        assert_eq!(output.last_raw[0].timestamp, 1_500_000);

        let short = classifier.classify(&data[..29]);
        assert!(short.scores.is_empty());
        assert_eq!(short.last_raw.len(), 29);
    }

    #[test]
    fn test_scores_are_weighted_sums_in_unit_range() {
        let classifier = RuleClassifier::default();
        let weights = RuleWeights::default();
        let mut rng = StdRng::seed_from_u64(17);

        for _ in 0..200 {
            let mut t = 0;
            let data: Vec<SensorSample> = (0..30)
                .map(|_| {
                    t += rng.gen_range(0..4);
                    SensorSample::new(70.0, rng.gen_range(32.0..34.0), rng.gen_range(0.0..5.0), t)
                })
                .collect();
            let (score, breakdown) = classifier.score_window(&data);
            assert!((0.0..=1.0).contains(&score), "score {score}");
            assert_eq!(score, weights.combine(&breakdown));
        }
    }

    #[test]
    fn test_suppression_zeroes_earlier_close_detection() {
        let classifier = RuleClassifier::default();
        let mut scores = vec![
            RuleScore { stress_score: 0.9, timestamp: 0 },
            RuleScore { stress_score: 0.8, timestamp: 5_000 },
        ];
        classifier.suppress(&mut scores);
        assert_eq!(scores[0].stress_score, 0.0);
        assert_eq!(scores[1].stress_score, 0.8);
    }

    #[test]
    fn test_suppression_boundaries() {
        let classifier = RuleClassifier::default();

        let mut far = vec![
            RuleScore { stress_score: 0.9, timestamp: 0 },
            RuleScore { stress_score: 0.9, timestamp: 10_001 },
        ];
        classifier.suppress(&mut far);
        assert_eq!(far[0].stress_score, 0.9);

        let mut edge = vec![
            RuleScore { stress_score: 0.9, timestamp: 0 },
            RuleScore { stress_score: 0.1, timestamp: 10_000 },
        ];
        classifier.suppress(&mut edge);
        assert_eq!(edge[0].stress_score, 0.0);

        let mut same_time = vec![
            RuleScore { stress_score: 0.9, timestamp: 50 },
            RuleScore { stress_score: 0.9, timestamp: 50 },
        ];
        classifier.suppress(&mut same_time);
        assert_eq!(same_time[0].stress_score, 0.9);

        let mut below = vec![
            RuleScore { stress_score: 0.75, timestamp: 0 },
            RuleScore { stress_score: 0.9, timestamp: 10 },
        ];
        classifier.suppress(&mut below);
        assert_eq!(below[0].stress_score, 0.75);
    }

    #[test]
    fn test_extreme_timestamps_saturate() {
        let peak = time_to_peak(&[1.0, 0.5, 3.0], &[i64::MIN, i64::MIN, i64::MAX], 1);
        assert_eq!(peak.time_diff, i64::MAX);
        assert_eq!(peak.score, 0.0);

        let peak = time_to_peak(&[3.0, 0.5, 1.0], &[i64::MIN, 0, i64::MAX], 2);
        assert_eq!(peak.time_diff, i64::MIN);
        assert_eq!(peak.score, 0.0);

        let classifier = RuleClassifier::default();
        let mut scores = vec![
            RuleScore { stress_score: 0.9, timestamp: i64::MIN },
            RuleScore { stress_score: 0.9, timestamp: i64::MAX },
        ];
        classifier.suppress(&mut scores);
        assert_eq!(scores[0].stress_score, 0.9);

        let mut scores = vec![
            RuleScore { stress_score: 0.9, timestamp: i64::MAX },
            RuleScore { stress_score: 0.9, timestamp: i64::MIN },
        ];
        classifier.suppress(&mut scores);
        assert_eq!(scores[0].stress_score, 0.9);
    }

    #[test]
    fn test_weight_validation() {
        assert!(RuleWeights::default().validate().is_ok());
        let heavy = RuleWeights {
            eda_trend: 0.8,
            ..RuleWeights::default()
        };
        assert!(heavy.validate().is_err());
        let negative = RuleWeights {
            slope_angle: -0.1,
            ..RuleWeights::default()
        };
        assert!(negative.validate().is_err());
    }
}

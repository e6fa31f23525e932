//! Per-subject sample buffering across pipeline invocations.
//!
//! Each subject first accumulates a warm-up window that seeds the range
//! estimator. Once warm, every invocation slides that window by exactly one
//! sample and hands the rest of the new samples downstream, together with the
//! leftover tail the rule classifier needs to keep its windows continuous.

use crate::core::sample::SensorSample;
use serde::{Deserialize, Serialize};

/// Default warm-up length (samples) before posteriors are emitted.
pub const DEFAULT_WARMUP_LEN: usize = 120;

/// Carryover state for a single subject.
///
/// Owned by the caller: it is passed into [`SignalWindowBuffer::extend`] and
/// the returned value must be persisted for the next invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectState {
    /// Warm-up accumulator, oldest first
    pub init_data: Vec<SensorSample>,
    /// Raw tail of the previous rule input, oldest first
    pub next_data: Vec<SensorSample>,
}

impl SubjectState {
    /// Whether the warm-up accumulator is full.
    pub fn is_warm(&self, warmup_len: usize) -> bool {
        self.init_data.len() >= warmup_len
    }
}

/// Inputs produced for one scoring round of a warmed-up subject.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoringBatch {
    /// Warm-up window followed by the fresh samples
    pub range_input: Vec<SensorSample>,
    /// Previous leftover followed by the fresh samples
    pub rule_input: Vec<SensorSample>,
    /// New samples not absorbed into the warm-up window
    pub fresh: Vec<SensorSample>,
}

/// Slides each subject's sample history forward one invocation at a time.
#[derive(Debug, Clone, Copy)]
pub struct SignalWindowBuffer {
    warmup_len: usize,
    window_len: usize,
}

impl Default for SignalWindowBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WARMUP_LEN, crate::core::rules::DEFAULT_WINDOW_LEN)
    }
}

impl SignalWindowBuffer {
    /// Create a buffer with the given warm-up and rule window lengths.
    pub fn new(warmup_len: usize, window_len: usize) -> Self {
        Self {
            warmup_len,
            window_len,
        }
    }

    pub fn warmup_len(&self) -> usize {
        self.warmup_len
    }

    /// Absorb new samples into a subject's state.
    ///
    /// While warming up, all samples go to the accumulator (keeping only the
    /// most recent `warmup_len`) and nothing is returned for scoring. Once
    /// warm, the accumulator drops its oldest sample and takes the oldest new
    /// one; the remaining new samples form the returned batch.
    ///
    /// New samples are ordered by timestamp before use. The range input is
    /// chronological, the slid accumulator followed by the fresh samples.
    /// Unlike a fresh-first ordering, this keeps the trailing posteriors
    /// aligned so that posterior `i` belongs to fresh sample `i`.
    pub fn extend(
        &self,
        mut state: SubjectState,
        mut new_samples: Vec<SensorSample>,
    ) -> (SubjectState, Option<ScoringBatch>) {
        new_samples.sort_by_key(|s| s.timestamp);

        if !state.is_warm(self.warmup_len) {
            state.init_data.extend(new_samples);
            let excess = state.init_data.len().saturating_sub(self.warmup_len);
            state.init_data.drain(..excess);
            return (state, None);
        }

        if new_samples.is_empty() {
            return (state, None);
        }

        let fresh = new_samples.split_off(1);
        state.init_data.remove(0);
        state.init_data.extend(new_samples);

        let mut range_input = Vec::with_capacity(state.init_data.len() + fresh.len());
        range_input.extend_from_slice(&state.init_data);
        range_input.extend_from_slice(&fresh);

        let mut rule_input = std::mem::take(&mut state.next_data);
        rule_input.extend_from_slice(&fresh);

        state.next_data = trailing(&rule_input, self.window_len);

        (
            state,
            Some(ScoringBatch {
                range_input,
                rule_input,
                fresh,
            }),
        )
    }
}

/// The last `len` samples of a sequence (all of them if shorter).
pub fn trailing(samples: &[SensorSample], len: usize) -> Vec<SensorSample> {
    samples[samples.len().saturating_sub(len)..].to_vec()
}

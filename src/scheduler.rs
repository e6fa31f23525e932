//! Periodic pass runner.
//!
//! A pass drains the store's inbox, runs the pipeline over it and commits the
//! results. When the inbox is empty the fetch is retried a bounded number of
//! times with exponential backoff before the pass is reported idle.

use crate::config::RetryConfig;
use crate::core::pipeline::{PassInput, PassSummary, StressPipeline};
use crate::core::sample::SensorSample;
use crate::error::PipelineError;
use crate::stats::RunStats;
use crate::store::{FlushSummary, PipelineStore, StoreError};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    sleep: fn(Duration),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            sleep: std::thread::sleep,
        }
    }

    /// Replace the function used to wait between attempts.
    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given zero-based failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Call `attempt` until it yields a value or the attempts run out.
    ///
    /// Errors are returned immediately; only `Ok(None)` is retried.
    pub fn poll<T, E, F>(&self, mut attempt: F) -> Result<Option<T>, E>
    where
        F: FnMut() -> Result<Option<T>, E>,
    {
        for n in 0..self.max_attempts {
            if let Some(value) = attempt()? {
                return Ok(Some(value));
            }
            if n + 1 < self.max_attempts {
                let delay = self.backoff(n);
                tracing::debug!(
                    attempt = n + 1,
                    delay_ms = delay.as_millis() as u64,
                    "No new data, retrying"
                );
                (self.sleep)(delay);
            }
        }
        Ok(None)
    }
}

/// Outcome of one scheduled pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReport {
    /// No samples arrived within the retry budget
    Idle,
    Completed(PassSummary),
}

/// Run one pass against `store`.
///
/// Stored state is read before the inbox is drained. If anything fails after
/// the drain, the drained samples are queued again.
pub fn run_pass<S>(
    store: &mut S,
    pipeline: &mut StressPipeline,
    retry: &RetryPolicy,
    stats: &RunStats,
) -> Result<PassReport, SchedulerError>
where
    S: PipelineStore + ?Sized,
{
    let span = tracing::info_span!("pass", run_id = %Uuid::new_v4());
    let _enter = span.enter();

    let result = run_pass_inner(store, pipeline, retry);
    match &result {
        Ok(PassReport::Idle) => {
            stats.record_idle();
            tracing::info!(attempts = retry.max_attempts(), "No new samples");
        }
        Ok(PassReport::Completed(summary)) => {
            stats.record_pass(summary);
            tracing::info!(
                subjects = summary.subjects,
                warming_up = summary.warming_up,
                samples = summary.samples,
                records = summary.derived_records,
                hotspot_hits = summary.hotspots.accepted,
                dropped = summary.hotspots.invalid_time,
                "Pass completed"
            );
        }
        Err(e) => {
            stats.record_failure();
            tracing::error!(error = %e, "Pass failed");
        }
    }
    result
}

fn run_pass_inner<S>(
    store: &mut S,
    pipeline: &mut StressPipeline,
    retry: &RetryPolicy,
) -> Result<PassReport, SchedulerError>
where
    S: PipelineStore + ?Sized,
{
    // unreadable state fails the pass before the inbox is touched
    let states = store.load_states()?;
    let hotspots = store.load_hotspots()?;

    let fetched = retry.poll(|| {
        let batch = store.fetch_samples()?;
        Ok::<_, StoreError>((!batch.is_empty()).then_some(batch))
    })?;
    let Some(samples) = fetched else {
        return Ok(PassReport::Idle);
    };

    let input = PassInput {
        samples: samples.clone(),
        states,
        hotspots,
    };
    match commit(store, pipeline, input) {
        Ok(summary) => Ok(PassReport::Completed(summary)),
        Err(e) => {
            requeue(store, &samples);
            Err(e)
        }
    }
}

/// Run the pipeline and write its output. Subject state is written last.
fn commit<S>(
    store: &mut S,
    pipeline: &mut StressPipeline,
    input: PassInput,
) -> Result<PassSummary, SchedulerError>
where
    S: PipelineStore + ?Sized,
{
    let previous_hotspots = input.hotspots.clone();
    let output = pipeline.run_pass(input)?;
    for (subject, records) in &output.derived {
        store.store_derived(subject, records)?;
    }
    store.save_hotspots(&output.hotspots)?;
    if let Err(e) = store.save_states(&output.states) {
        // requeued samples will be merged again
        if let Err(restore) = store.save_hotspots(&previous_hotspots) {
            tracing::warn!(error = %restore, "Could not restore hotspot map");
        }
        return Err(e.into());
    }
    Ok(output.summary)
}

/// Put drained samples back in the inbox after a failed pass.
fn requeue<S>(store: &mut S, samples: &BTreeMap<String, Vec<SensorSample>>)
where
    S: PipelineStore + ?Sized,
{
    let mut requeued = 0;
    for (subject, pending) in samples {
        match store.push_samples(subject, pending) {
            Ok(()) => requeued += pending.len(),
            Err(e) => tracing::warn!(
                subject = %subject,
                samples = pending.len(),
                error = %e,
                "Could not requeue samples"
            ),
        }
    }
    tracing::info!(samples = requeued, "Requeued samples after failed pass");
}

/// Move the primary hotspot map into the archive.
pub fn flush<S>(store: &mut S, stats: &RunStats) -> Result<FlushSummary, SchedulerError>
where
    S: PipelineStore + ?Sized,
{
    let summary = store.flush_hotspots()?;
    stats.record_flush();
    tracing::info!(
        coordinates = summary.coordinates,
        intensity = summary.intensity,
        "Flushed hotspots to archive"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::range::EstimatorConfig;
    use crate::core::rules::ClassifierConfig;
    use crate::core::derived::DerivedRecord;
    use crate::core::hotspot::HotspotMap;
    use crate::core::windowing::SubjectState;
    use crate::store::{MemoryStore, StoredDerived};
    use std::cell::Cell;

    fn no_sleep(_: Duration) {}

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::from_config(&RetryConfig {
            max_attempts,
            initial_backoff_ms: 100,
            max_backoff_ms: 250,
        })
        .with_sleep(no_sleep)
    }

    fn pipeline() -> StressPipeline {
        StressPipeline::new(
            EstimatorConfig::default(),
            ClassifierConfig::default(),
            0.6,
            Some(chrono_tz::UTC),
            Some(11),
        )
        .unwrap()
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = policy(5);
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(250));
        assert_eq!(policy.backoff(40), Duration::from_millis(250));
    }

    #[test]
    fn test_poll_stops_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<Option<()>, ()> = policy(3).poll(|| {
            calls.set(calls.get() + 1);
            Ok(None)
        });
        assert_eq!(result, Ok(None));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_poll_returns_first_value() {
        let calls = Cell::new(0);
        let result: Result<Option<u32>, ()> = policy(5).poll(|| {
            calls.set(calls.get() + 1);
            Ok((calls.get() == 2).then_some(7))
        });
        assert_eq!(result, Ok(Some(7)));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_poll_propagates_errors() {
        let result: Result<Option<()>, &str> = policy(3).poll(|| Err("boom"));
        assert_eq!(result, Err("boom"));
    }

    #[test]
    fn test_empty_store_is_idle() {
        let mut store = MemoryStore::new();
        let stats = RunStats::new();
        let report = run_pass(&mut store, &mut pipeline(), &policy(2), &stats).unwrap();
        assert_eq!(report, PassReport::Idle);
        assert_eq!(stats.snapshot().idle_passes, 1);
    }

    #[test]
    fn test_pass_persists_state() {
        let mut store = MemoryStore::new();
        let samples: Vec<SensorSample> = (0..50)
            .map(|i| SensorSample::new(70.0, 33.0, 1.0, i * 1000))
            .collect();
        store.push_samples("a@example.com", &samples).unwrap();

        let stats = RunStats::new();
        let report = run_pass(&mut store, &mut pipeline(), &policy(1), &stats).unwrap();
        let PassReport::Completed(summary) = report else {
            panic!("expected a completed pass");
        };
        assert_eq!(summary.samples, 50);
        assert_eq!(store.load_states().unwrap()["a@example.com"].init_data.len(), 50);
        assert_eq!(store.pending_subjects(), 0);
        assert_eq!(stats.snapshot().passes_completed, 1);
    }

    /// Memory store that refuses to write subject state.
    struct StateWriteFails(MemoryStore);

    impl PipelineStore for StateWriteFails {
        fn push_samples(
            &mut self,
            subject: &str,
            samples: &[SensorSample],
        ) -> Result<(), StoreError> {
            self.0.push_samples(subject, samples)
        }

        fn fetch_samples(&mut self) -> Result<BTreeMap<String, Vec<SensorSample>>, StoreError> {
            self.0.fetch_samples()
        }

        fn load_states(&self) -> Result<BTreeMap<String, SubjectState>, StoreError> {
            self.0.load_states()
        }

        fn save_states(&mut self, _: &BTreeMap<String, SubjectState>) -> Result<(), StoreError> {
            Err(std::io::Error::other("read-only").into())
        }

        fn store_derived(
            &mut self,
            subject: &str,
            records: &[DerivedRecord],
        ) -> Result<(), StoreError> {
            self.0.store_derived(subject, records)
        }

        fn load_derived(&self, subject: &str) -> Result<Vec<StoredDerived>, StoreError> {
            self.0.load_derived(subject)
        }

        fn load_hotspots(&self) -> Result<HotspotMap, StoreError> {
            self.0.load_hotspots()
        }

        fn save_hotspots(&mut self, map: &HotspotMap) -> Result<(), StoreError> {
            self.0.save_hotspots(map)
        }

        fn load_archive(&self) -> Result<HotspotMap, StoreError> {
            self.0.load_archive()
        }

        fn save_archive(&mut self, map: &HotspotMap) -> Result<(), StoreError> {
            self.0.save_archive(map)
        }
    }

    #[test]
    fn test_failed_commit_requeues_samples() {
        let mut store = StateWriteFails(MemoryStore::new());
        let samples: Vec<SensorSample> = (0..50)
            .map(|i| SensorSample::new(70.0, 33.0, 1.0, i * 1000))
            .collect();
        store.push_samples("a@example.com", &samples).unwrap();

        let stats = RunStats::new();
        let result = run_pass(&mut store, &mut pipeline(), &policy(1), &stats);
        assert!(matches!(result, Err(SchedulerError::Store(StoreError::Io(_)))));
        assert_eq!(stats.snapshot().failed_passes, 1);

        let pending = store.fetch_samples().unwrap();
        assert_eq!(pending["a@example.com"], samples);
        assert!(store.load_states().unwrap().is_empty());
    }

    #[test]
    fn test_failed_state_write_restores_hotspots() {
        let mut store = StateWriteFails(MemoryStore::new());
        let mut hotspots = HotspotMap::new();
        hotspots.increment(45.0, 9.0, "2024-06-01", "08", 4);
        store.save_hotspots(&hotspots).unwrap();

        let warm = SubjectState {
            init_data: (0..120)
                .map(|t| SensorSample::new(70.0 + (t % 3) as f64, 33.0, 1.0, t).at(45.0, 9.0))
                .collect(),
            next_data: Vec::new(),
        };
        store
            .0
            .save_states(&BTreeMap::from([("a@example.com".to_string(), warm)]))
            .unwrap();

        // EDA dips then peaks while skin temperature holds: a full-score window
        let burst: Vec<SensorSample> = (0..31)
            .map(|i| {
                let eda = match i {
                    1 => 5.0,
                    2 => 4.0,
                    3 => 3.0,
                    4 => 2.0,
                    5 => 10.0,
                    _ => 1.0,
                };
                let temp = if i < 8 { 33.0 } else { 40.0 };
                SensorSample::new(90.0, temp, eda, 120 + i).at(45.0, 9.0)
            })
            .collect();
        store.push_samples("a@example.com", &burst).unwrap();

        let stats = RunStats::new();
        assert!(run_pass(&mut store, &mut pipeline(), &policy(1), &stats).is_err());
        assert_eq!(store.load_hotspots().unwrap(), hotspots);
        assert_eq!(store.fetch_samples().unwrap()["a@example.com"], burst);
    }

    #[test]
    fn test_flush_counts() {
        let mut store = MemoryStore::new();
        let stats = RunStats::new();
        flush(&mut store, &stats).unwrap();
        assert_eq!(stats.snapshot().flushes, 1);
    }
}

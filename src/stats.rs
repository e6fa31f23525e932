//! Cumulative run statistics.
//!
//! Counters survive restarts through a small JSON file next to the store.

use crate::core::pipeline::PassSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the scheduler's work.
#[derive(Debug)]
pub struct RunStats {
    passes_completed: AtomicU64,
    idle_passes: AtomicU64,
    failed_passes: AtomicU64,
    samples_ingested: AtomicU64,
    derived_records: AtomicU64,
    hotspot_increments: AtomicU64,
    flushes: AtomicU64,
    started: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            passes_completed: AtomicU64::new(0),
            idle_passes: AtomicU64::new(0),
            failed_passes: AtomicU64::new(0),
            samples_ingested: AtomicU64::new(0),
            derived_records: AtomicU64::new(0),
            hotspot_increments: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            started: Utc::now(),
            persist_path: None,
        }
    }

    /// Statistics backed by `path`, resuming from its counters when present.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!(error = %e, "Could not load previous run statistics");
        }

        stats
    }

    /// Count a completed pass.
    pub fn record_pass(&self, summary: &PassSummary) {
        self.passes_completed.fetch_add(1, Ordering::Relaxed);
        self.samples_ingested
            .fetch_add(summary.samples as u64, Ordering::Relaxed);
        self.derived_records
            .fetch_add(summary.derived_records as u64, Ordering::Relaxed);
        self.hotspot_increments
            .fetch_add(summary.hotspots.accepted as u64, Ordering::Relaxed);
    }

    pub fn record_idle(&self) {
        self.idle_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            passes_completed: self.passes_completed.load(Ordering::Relaxed),
            idle_passes: self.idle_passes.load(Ordering::Relaxed),
            failed_passes: self.failed_passes.load(Ordering::Relaxed),
            samples_ingested: self.samples_ingested.load(Ordering::Relaxed),
            derived_records: self.derived_records.load(Ordering::Relaxed),
            hotspot_increments: self.hotspot_increments.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            last_updated: Utc::now(),
        }
    }

    /// Seconds since this process started counting.
    pub fn uptime_secs(&self) -> u64 {
        (Utc::now() - self.started).num_seconds().max(0) as u64
    }

    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Run Statistics:\n\
             - Passes completed: {}\n\
             - Idle passes: {}\n\
             - Failed passes: {}\n\
             - Samples ingested: {}\n\
             - Derived records: {}\n\
             - Hotspot increments: {}\n\
             - Hotspot flushes: {}",
            stats.passes_completed,
            stats.idle_passes,
            stats.failed_passes,
            stats.samples_ingested,
            stats.derived_records,
            stats.hotspot_increments,
            stats.flushes,
        )
    }

    /// Save counters to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json =
                serde_json::to_string_pretty(&self.snapshot()).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(path)?;
        let persisted: StatsSnapshot =
            serde_json::from_str(&content).map_err(std::io::Error::other)?;

        self.passes_completed
            .store(persisted.passes_completed, Ordering::Relaxed);
        self.idle_passes.store(persisted.idle_passes, Ordering::Relaxed);
        self.failed_passes
            .store(persisted.failed_passes, Ordering::Relaxed);
        self.samples_ingested
            .store(persisted.samples_ingested, Ordering::Relaxed);
        self.derived_records
            .store(persisted.derived_records, Ordering::Relaxed);
        self.hotspot_increments
            .store(persisted.hotspot_increments, Ordering::Relaxed);
        self.flushes.store(persisted.flushes, Ordering::Relaxed);
        Ok(())
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Persisted form of [`RunStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub passes_completed: u64,
    pub idle_passes: u64,
    pub failed_passes: u64,
    pub samples_ingested: u64,
    pub derived_records: u64,
    pub hotspot_increments: u64,
    pub flushes: u64,
    pub last_updated: DateTime<Utc>,
}

pub type SharedRunStats = Arc<RunStats>;

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedRunStats {
    Arc::new(RunStats::with_persistence(path))
}

//! Stressmap Engine - stress scoring and hotspot aggregation for wearable streams.
//!
//! This library turns raw heart rate, skin temperature and electrodermal
//! activity samples into per-sample stress records, and folds the stressful
//! ones into a map of where and when stress concentrates.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Stressmap Engine                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                    ┌─────────────┐                               │
//! │               ┌───▶│    Range    │───┐                           │
//! │  ┌─────────┐  │    │  Estimator  │   │   ┌─────────┐  ┌────────┐ │
//! │  │ Window  │──┤    └─────────────┘   ├──▶│ Derived │─▶│Hotspot │ │
//! │  │ Buffer  │  │    ┌─────────────┐   │   │ Records │  │  Map   │ │
//! │  └─────────┘  └───▶│    Rule     │───┘   └─────────┘  └────────┘ │
//! │       ▲            │ Classifier  │                         │     │
//! │       │            └─────────────┘                         ▼     │
//! │  ┌─────────────────────────────────────────────────────────────┐ │
//! │  │          Store (inbox, state, derived, hotspots)            │ │
//! │  └─────────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use stressmap_engine::{scheduler, store::JsonStore, Config, RetryPolicy, RunStats, StressPipeline};
//!
//! let config = Config::load().expect("Failed to load config");
//! let mut store = JsonStore::open(&config.data_path).expect("Failed to open store");
//! let mut pipeline = StressPipeline::from_config(&config).expect("Invalid config");
//! let retry = RetryPolicy::from_config(&config.retry);
//!
//! let report = scheduler::run_pass(&mut store, &mut pipeline, &retry, &RunStats::new());
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod keys;
pub mod scheduler;
pub mod simulate;
pub mod stats;
pub mod store;

// Re-export key types at crate root for convenience
pub use config::{Config, RetryConfig};
pub use core::{
    DerivedRecord, HotspotAggregator, HotspotMap, SensorSample, StressPipeline, SubjectState,
};
pub use error::PipelineError;
pub use scheduler::{PassReport, RetryPolicy, SchedulerError};
pub use stats::{RunStats, SharedRunStats, StatsSnapshot};
pub use store::{JsonStore, MemoryStore, PipelineStore, StoreError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}

//! Durable state behind the pipeline.
//!
//! The pipeline itself is pure; a [`PipelineStore`] supplies raw samples and
//! persisted state, and receives derived records, updated state and the
//! hotspot map after every pass.

mod json;
mod memory;

pub use json::JsonStore;
pub use memory::MemoryStore;

use crate::core::derived::DerivedRecord;
use crate::core::hotspot::HotspotMap;
use crate::core::sample::SensorSample;
use crate::core::windowing::SubjectState;
use crate::keys::KeyError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}

/// Derived record as persisted per subject, keyed by its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredDerived {
    /// `[lower, upper]` heart-rate interval
    pub binterval: [f64; 2],
    pub stress_score: f64,
    pub timestamp: i64,
}

impl From<&DerivedRecord> for StoredDerived {
    fn from(record: &DerivedRecord) -> Self {
        Self {
            binterval: [record.lower_bound, record.upper_bound],
            stress_score: record.stress_score,
            timestamp: record.timestamp,
        }
    }
}

/// Outcome of moving the primary hotspot map into the archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushSummary {
    /// Coordinates moved out of the primary map
    pub coordinates: usize,
    /// Total intensity moved
    pub intensity: u64,
}

/// Backing store for one deployment of the pipeline.
pub trait PipelineStore {
    /// Queue raw samples for a subject.
    fn push_samples(&mut self, subject: &str, samples: &[SensorSample]) -> Result<(), StoreError>;

    /// Drain every pending sample, grouped by subject.
    fn fetch_samples(&mut self) -> Result<BTreeMap<String, Vec<SensorSample>>, StoreError>;

    fn load_states(&self) -> Result<BTreeMap<String, SubjectState>, StoreError>;

    fn save_states(&mut self, states: &BTreeMap<String, SubjectState>) -> Result<(), StoreError>;

    /// Persist derived records for a subject. A record overwrites any earlier
    /// one with the same timestamp.
    fn store_derived(&mut self, subject: &str, records: &[DerivedRecord])
        -> Result<(), StoreError>;

    /// Every persisted derived record of a subject, ordered by timestamp.
    fn load_derived(&self, subject: &str) -> Result<Vec<StoredDerived>, StoreError>;

    /// The primary hotspot map.
    fn load_hotspots(&self) -> Result<HotspotMap, StoreError>;

    fn save_hotspots(&mut self, map: &HotspotMap) -> Result<(), StoreError>;

    /// The archive hotspot map.
    fn load_archive(&self) -> Result<HotspotMap, StoreError>;

    fn save_archive(&mut self, map: &HotspotMap) -> Result<(), StoreError>;

    /// Merge the primary map into the archive, then clear the primary.
    fn flush_hotspots(&mut self) -> Result<FlushSummary, StoreError> {
        let primary = self.load_hotspots()?;
        let summary = FlushSummary {
            coordinates: primary.len(),
            intensity: primary.total_intensity(),
        };
        if primary.is_empty() {
            return Ok(summary);
        }

        let mut archive = self.load_archive()?;
        archive.absorb(primary);
        self.save_archive(&archive)?;
        self.save_hotspots(&HotspotMap::new())?;
        Ok(summary)
    }
}

/// Merge `records` into an existing timestamp-keyed set.
pub(crate) fn upsert_derived(
    existing: &mut BTreeMap<i64, StoredDerived>,
    records: &[DerivedRecord],
) {
    for record in records {
        existing.insert(record.timestamp, StoredDerived::from(record));
    }
}

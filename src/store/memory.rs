//! In-process store.

use super::{upsert_derived, PipelineStore, StoreError, StoredDerived};
use crate::core::derived::DerivedRecord;
use crate::core::hotspot::HotspotMap;
use crate::core::sample::SensorSample;
use crate::core::windowing::SubjectState;
use std::collections::BTreeMap;

/// Store that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inbox: BTreeMap<String, Vec<SensorSample>>,
    states: BTreeMap<String, SubjectState>,
    derived: BTreeMap<String, BTreeMap<i64, StoredDerived>>,
    hotspots: HotspotMap,
    archive: HotspotMap,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subjects with pending samples.
    pub fn pending_subjects(&self) -> usize {
        self.inbox.len()
    }
}

impl PipelineStore for MemoryStore {
    fn push_samples(&mut self, subject: &str, samples: &[SensorSample]) -> Result<(), StoreError> {
        self.inbox
            .entry(subject.to_string())
            .or_default()
            .extend_from_slice(samples);
        Ok(())
    }

    fn fetch_samples(&mut self) -> Result<BTreeMap<String, Vec<SensorSample>>, StoreError> {
        Ok(std::mem::take(&mut self.inbox))
    }

    fn load_states(&self) -> Result<BTreeMap<String, SubjectState>, StoreError> {
        Ok(self.states.clone())
    }

    fn save_states(&mut self, states: &BTreeMap<String, SubjectState>) -> Result<(), StoreError> {
        self.states = states.clone();
        Ok(())
    }

    fn store_derived(
        &mut self,
        subject: &str,
        records: &[DerivedRecord],
    ) -> Result<(), StoreError> {
        upsert_derived(self.derived.entry(subject.to_string()).or_default(), records);
        Ok(())
    }

    fn load_derived(&self, subject: &str) -> Result<Vec<StoredDerived>, StoreError> {
        Ok(self
            .derived
            .get(subject)
            .map(|records| records.values().copied().collect())
            .unwrap_or_default())
    }

    fn load_hotspots(&self) -> Result<HotspotMap, StoreError> {
        Ok(self.hotspots.clone())
    }

    fn save_hotspots(&mut self, map: &HotspotMap) -> Result<(), StoreError> {
        self.hotspots = map.clone();
        Ok(())
    }

    fn load_archive(&self) -> Result<HotspotMap, StoreError> {
        Ok(self.archive.clone())
    }

    fn save_archive(&mut self, map: &HotspotMap) -> Result<(), StoreError> {
        self.archive = map.clone();
        Ok(())
    }
}

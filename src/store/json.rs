//! Directory-backed JSON store.
//!
//! Layout under the root directory:
//!
//! ```text
//! inbox/<subject>.json      pending raw samples
//! inbox/rejected/           inbox files that could not be read
//! state.json                per-subject carryover state
//! derived/<subject>.json    derived records keyed by timestamp
//! hotspots.json             primary hotspot map
//! hotspots_archive.json     archive hotspot map
//! ```
//!
//! Subject ids and coordinate keys are escaped with [`crate::keys::escape`].

use super::{upsert_derived, PipelineStore, StoreError, StoredDerived};
use crate::core::derived::DerivedRecord;
use crate::core::hotspot::{Coordinate, HotspotMap};
use crate::core::sample::SensorSample;
use crate::core::windowing::SubjectState;
use crate::keys::{escape, unescape};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

const INBOX_DIR: &str = "inbox";
const REJECTED_DIR: &str = "rejected";
const DERIVED_DIR: &str = "derived";
const STATE_FILE: &str = "state.json";
const HOTSPOTS_FILE: &str = "hotspots.json";
const ARCHIVE_FILE: &str = "hotspots_archive.json";

#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    /// Open a store rooted at `root`, creating its directories.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(root.join(INBOX_DIR))?;
        std::fs::create_dir_all(root.join(DERIVED_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn subject_file(&self, dir: &str, subject: &str) -> PathBuf {
        self.root.join(dir).join(format!("{}.json", escape(subject)))
    }

    fn load_map(&self, file: &str) -> Result<HotspotMap, StoreError> {
        let stored: BTreeMap<String, Coordinate> =
            read_json(&self.root.join(file))?.unwrap_or_default();
        let coordinates = unescape_keys(stored)?;
        Ok(HotspotMap { coordinates })
    }

    /// Move an unreadable inbox file to `inbox/rejected/`.
    fn reject(&self, path: &Path, error: &StoreError) -> Result<(), StoreError> {
        let rejected = self.root.join(INBOX_DIR).join(REJECTED_DIR);
        std::fs::create_dir_all(&rejected)?;
        let target = rejected.join(path.file_name().unwrap_or(OsStr::new("unnamed.json")));
        std::fs::rename(path, &target)?;
        tracing::warn!(
            path = %path.display(),
            moved_to = %target.display(),
            error = %error,
            "Rejected unreadable inbox file"
        );
        Ok(())
    }

    fn save_map(&self, file: &str, map: &HotspotMap) -> Result<(), StoreError> {
        let stored: BTreeMap<String, &Coordinate> = map
            .coordinates
            .iter()
            .map(|(key, coordinate)| (escape(key), coordinate))
            .collect();
        write_json(&self.root.join(file), &stored)
    }
}

impl PipelineStore for JsonStore {
    fn push_samples(&mut self, subject: &str, samples: &[SensorSample]) -> Result<(), StoreError> {
        let path = self.subject_file(INBOX_DIR, subject);
        let mut pending: Vec<SensorSample> = read_json(&path)?.unwrap_or_default();
        pending.extend_from_slice(samples);
        write_json(&path, &pending)
    }

    fn fetch_samples(&mut self) -> Result<BTreeMap<String, Vec<SensorSample>>, StoreError> {
        let inbox = self.root.join(INBOX_DIR);
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&inbox)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut parsed = Vec::with_capacity(paths.len());
        for path in paths {
            match read_inbox_file(&path) {
                Ok((subject, samples)) => parsed.push((path, subject, samples)),
                Err(e) => self.reject(&path, &e)?,
            }
        }

        // files go only once the whole batch is in memory
        let mut batch = BTreeMap::new();
        for (path, subject, samples) in parsed {
            std::fs::remove_file(&path)?;
            batch
                .entry(subject)
                .or_insert_with(Vec::new)
                .extend(samples);
        }
        Ok(batch)
    }

    fn load_states(&self) -> Result<BTreeMap<String, SubjectState>, StoreError> {
        let stored: BTreeMap<String, SubjectState> =
            read_json(&self.root.join(STATE_FILE))?.unwrap_or_default();
        unescape_keys(stored)
    }

    fn save_states(&mut self, states: &BTreeMap<String, SubjectState>) -> Result<(), StoreError> {
        let stored: BTreeMap<String, &SubjectState> = states
            .iter()
            .map(|(subject, state)| (escape(subject), state))
            .collect();
        write_json(&self.root.join(STATE_FILE), &stored)
    }

    fn store_derived(
        &mut self,
        subject: &str,
        records: &[DerivedRecord],
    ) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let path = self.subject_file(DERIVED_DIR, subject);
        let mut existing: BTreeMap<i64, StoredDerived> = read_json(&path)?.unwrap_or_default();
        upsert_derived(&mut existing, records);
        write_json(&path, &existing)
    }

    fn load_derived(&self, subject: &str) -> Result<Vec<StoredDerived>, StoreError> {
        let existing: BTreeMap<i64, StoredDerived> =
            read_json(&self.subject_file(DERIVED_DIR, subject))?.unwrap_or_default();
        Ok(existing.into_values().collect())
    }

    fn load_hotspots(&self) -> Result<HotspotMap, StoreError> {
        self.load_map(HOTSPOTS_FILE)
    }

    fn save_hotspots(&mut self, map: &HotspotMap) -> Result<(), StoreError> {
        self.save_map(HOTSPOTS_FILE, map)
    }

    fn load_archive(&self) -> Result<HotspotMap, StoreError> {
        self.load_map(ARCHIVE_FILE)
    }

    fn save_archive(&mut self, map: &HotspotMap) -> Result<(), StoreError> {
        self.save_map(ARCHIVE_FILE, map)
    }
}

fn unescape_keys<V>(stored: BTreeMap<String, V>) -> Result<BTreeMap<String, V>, StoreError> {
    stored
        .into_iter()
        .map(|(key, value)| -> Result<_, StoreError> { Ok((unescape(&key)?, value)) })
        .collect()
}

/// Subject id and samples of one inbox file.
fn read_inbox_file(path: &Path) -> Result<(String, Vec<SensorSample>), StoreError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| std::io::Error::other("inbox file name is not UTF-8"))?;
    let subject = unescape(stem)?;
    let samples = read_json(path)?.unwrap_or_default();
    Ok((subject, samples))
}

/// Read a JSON file, `None` when it does not exist.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write through a temporary file so readers never see a partial document.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

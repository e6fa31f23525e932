//! Spatiotemporal hotspot map: coordinate → day → hour → intensity.
//!
//! Each derived record above the stress threshold increments the intensity
//! of the hour bucket its timestamp falls in, at its exact coordinate.
//! Buckets are created lazily and never merged across nearby coordinates.

use crate::core::derived::DerivedRecord;
use chrono::{Local, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Records must score strictly above this to count as a hotspot hit.
pub const DEFAULT_HOTSPOT_THRESHOLD: f64 = 0.6;

/// One hour-of-day bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hour {
    /// Two-digit hour label, "00" to "23"
    pub hour: String,
    pub intensity: u64,
}

/// One calendar day at a coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Day {
    /// Date label, YYYY-MM-DD
    pub day: String,
    pub hours: BTreeMap<String, Hour>,
}

/// All activity recorded at one exact location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub long: f64,
    pub days: BTreeMap<String, Day>,
}

impl Coordinate {
    fn new(lat: f64, long: f64) -> Self {
        Self {
            lat,
            long,
            days: BTreeMap::new(),
        }
    }

    fn hour_mut(&mut self, day: &str, hour: &str) -> &mut Hour {
        self.days
            .entry(day.to_string())
            .or_insert_with(|| Day {
                day: day.to_string(),
                hours: BTreeMap::new(),
            })
            .hours
            .entry(hour.to_string())
            .or_insert_with(|| Hour {
                hour: hour.to_string(),
                intensity: 0,
            })
    }

    /// Sum of all hour intensities at this coordinate.
    pub fn total_intensity(&self) -> u64 {
        self.days
            .values()
            .flat_map(|d| d.hours.values())
            .map(|h| h.intensity)
            .sum()
    }
}

/// The hotspot map, keyed by coordinate identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HotspotMap {
    pub coordinates: BTreeMap<String, Coordinate>,
}

impl HotspotMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity key of an exact (lat, long) pair.
    pub fn coordinate_key(lat: f64, long: f64) -> String {
        // adding 0.0 folds -0.0 into 0.0
        format!("{},{}", lat + 0.0, long + 0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn get(&self, lat: f64, long: f64) -> Option<&Coordinate> {
        self.coordinates.get(&Self::coordinate_key(lat, long))
    }

    /// Intensity of one bucket, 0 when absent.
    pub fn intensity(&self, lat: f64, long: f64, day: &str, hour: &str) -> u64 {
        self.get(lat, long)
            .and_then(|c| c.days.get(day))
            .and_then(|d| d.hours.get(hour))
            .map_or(0, |h| h.intensity)
    }

    /// Add `by` to one bucket, creating it as needed.
    pub fn increment(&mut self, lat: f64, long: f64, day: &str, hour: &str, by: u64) {
        let coordinate = self
            .coordinates
            .entry(Self::coordinate_key(lat, long))
            .or_insert_with(|| Coordinate::new(lat + 0.0, long + 0.0));
        coordinate.hour_mut(day, hour).intensity += by;
    }

    /// Fold another map into this one, summing intensities bucket by bucket.
    pub fn absorb(&mut self, other: HotspotMap) {
        for coordinate in other.coordinates.into_values() {
            for day in coordinate.days.into_values() {
                for hour in day.hours.into_values() {
                    self.increment(
                        coordinate.lat,
                        coordinate.long,
                        &day.day,
                        &hour.hour,
                        hour.intensity,
                    );
                }
            }
        }
    }

    /// Sum of every bucket's intensity.
    pub fn total_intensity(&self) -> u64 {
        self.coordinates.values().map(Coordinate::total_intensity).sum()
    }
}

/// Counts from one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    /// Records that incremented a bucket
    pub accepted: usize,
    /// Records at or below the threshold
    pub below_threshold: usize,
    /// Records whose timestamp could not be placed on a calendar
    pub invalid_time: usize,
}

/// Merges derived records into a hotspot map.
#[derive(Debug, Clone, Copy)]
pub struct HotspotAggregator {
    threshold: f64,
    /// `None` buckets by the system's local time
    timezone: Option<Tz>,
}

impl Default for HotspotAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_HOTSPOT_THRESHOLD, None)
    }
}

impl HotspotAggregator {
    pub fn new(threshold: f64, timezone: Option<Tz>) -> Self {
        Self {
            threshold,
            timezone,
        }
    }

    /// Merge `records` into `map` and return the updated map.
    pub fn merge(
        &self,
        mut map: HotspotMap,
        records: &[DerivedRecord],
    ) -> (HotspotMap, MergeSummary) {
        let summary = self.merge_into(&mut map, records);
        (map, summary)
    }

    /// In-place variant of [`merge`](Self::merge).
    pub fn merge_into(&self, map: &mut HotspotMap, records: &[DerivedRecord]) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for record in records {
            if record.stress_score <= self.threshold {
                summary.below_threshold += 1;
                continue;
            }
            let Some((day, hour)) = self.bucket_labels(record.timestamp) else {
                tracing::warn!(
                    timestamp = record.timestamp,
                    "Dropping hotspot record with out-of-range timestamp"
                );
                summary.invalid_time += 1;
                continue;
            };
            map.increment(record.lat, record.long, &day, &hour, 1);
            summary.accepted += 1;
        }
        summary
    }

    /// Day and hour labels of an epoch-millisecond timestamp.
    pub fn bucket_labels(&self, timestamp_ms: i64) -> Option<(String, String)> {
        match self.timezone {
            Some(tz) => labels_in(timestamp_ms, &tz),
            None => labels_in(timestamp_ms, &Local),
        }
    }
}

fn labels_in<Z>(timestamp_ms: i64, zone: &Z) -> Option<(String, String)>
where
    Z: TimeZone,
    Z::Offset: fmt::Display,
{
    let instant = Utc.timestamp_millis_opt(timestamp_ms).single()?;
    let local = instant.with_timezone(zone);
    Some((
        local.format("%Y-%m-%d").to_string(),
        local.format("%H").to_string(),
    ))
}

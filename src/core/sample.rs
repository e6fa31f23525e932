//! Raw physiological samples as delivered by the wearable.
//!
//! Ingestion is permissive: a missing or `null` field becomes 0 instead of
//! rejecting the sample.

use serde::{Deserialize, Deserializer, Serialize};

/// One reading from the wearable, tagged with time and location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorSample {
    /// Heart rate in beats per minute
    #[serde(default, alias = "heartrateSensor", deserialize_with = "null_as_zero")]
    pub heart_rate: f64,
    /// Skin temperature in degrees Celsius
    #[serde(default, alias = "skinTemperatureSensor", deserialize_with = "null_as_zero")]
    pub skin_temp: f64,
    /// Electrodermal activity
    #[serde(default, alias = "edaSensor", deserialize_with = "null_as_zero")]
    pub eda: f64,
    /// Epoch milliseconds
    #[serde(default, deserialize_with = "null_as_zero_i64")]
    pub timestamp: i64,
    #[serde(default, alias = "latitude", deserialize_with = "null_as_zero")]
    pub lat: f64,
    #[serde(default, alias = "longitude", deserialize_with = "null_as_zero")]
    pub long: f64,
}

impl SensorSample {
    pub fn new(heart_rate: f64, skin_temp: f64, eda: f64, timestamp: i64) -> Self {
        Self {
            heart_rate,
            skin_temp,
            eda,
            timestamp,
            lat: 0.0,
            long: 0.0,
        }
    }

    /// Attach a location to this sample.
    pub fn at(mut self, lat: f64, long: f64) -> Self {
        self.lat = lat;
        self.long = long;
        self
    }
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

fn null_as_zero_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(0))
}

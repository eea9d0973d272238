// SPDX-License-Identifier: MIT
//! Daily forecast payload as returned by the upstream provider.
use serde::{Deserialize, Serialize};

/// Parsed forecast for one location. Serialized back unchanged to callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub latitude: f64,
    pub longitude: f64,
    pub generationtime_ms: f64,
    pub utc_offset_seconds: i32,
    pub timezone: String,
    pub timezone_abbreviation: String,
    pub elevation: f64,
    pub daily_units: DailyUnits,
    pub daily: Daily,
}

/// Unit labels for each series in [`Daily`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyUnits {
    pub time: String,
    pub temperature_2m_max: String,
    pub temperature_2m_min: String,
    pub daylight_duration: String,
}

/// Parallel daily series; index `i` of every vector describes the same day.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Daily {
    pub time: Vec<String>,
    pub temperature_2m_max: Vec<f64>,
    pub temperature_2m_min: Vec<f64>,
    pub daylight_duration: Vec<f64>,
}

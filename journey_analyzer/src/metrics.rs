use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::distance::JourneyRecord;
use crate::{JaError, SpeedUnit};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Metrics {
    pub record_count: usize,
    pub duration_s: f64,
    pub total_distance_m: f64,
    pub max_speed: f64,
    pub max_speed_time_s: f64,
    pub max_speed_timestamp: Option<NaiveDateTime>,
    /// Cumulative distance at the first record reaching `max_speed`.
    pub max_speed_location_m: f64,
    /// Distance over duration, in the configured speed unit.
    pub average_speed: Option<f64>,
}

pub fn compute_metrics(records: &[JourneyRecord], unit: SpeedUnit) -> Result<Metrics, JaError> {
    let (first, last) = match (records.first(), records.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(JaError::InsufficientData { valid: 0 }),
    };

    // Strict comparison keeps the first of equal maxima.
    let peak = records
        .iter()
        .skip(1)
        .fold(first, |best, r| if r.speed > best.speed { r } else { best });

    let duration_s = last.time_s - first.time_s;
    let total_distance_m = last.cumulative_distance_m;
    let average_speed = (duration_s > 0.0)
        .then(|| total_distance_m / duration_s / unit.mps_per_unit());

    Ok(Metrics {
        record_count: records.len(),
        duration_s,
        total_distance_m,
        max_speed: peak.speed,
        max_speed_time_s: peak.time_s,
        max_speed_timestamp: peak.timestamp,
        max_speed_location_m: peak.cumulative_distance_m,
        average_speed,
    })
}

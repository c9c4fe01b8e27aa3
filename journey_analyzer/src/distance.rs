use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::clean::Sample;
use crate::{DistanceMode, Integration, Params};

/// A cleaned sample with derived distance.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JourneyRecord {
    pub row: usize,
    pub time_s: f64,
    pub timestamp: Option<NaiveDateTime>,
    /// Speed in the configured unit.
    pub speed: f64,
    pub distance_increment_m: f64,
    pub cumulative_distance_m: f64,
}

/// Derive per-row and cumulative distance in metres.
///
/// A distance column, when present, wins over integrating speed: either as
/// per-row increments or as an odometer reading whose positive steps are the
/// increments. Without one, speed is integrated over the elapsed time between
/// consecutive samples.
pub fn compute_distance(samples: &[Sample], params: &Params) -> Vec<JourneyRecord> {
    let has_distance = samples.iter().all(|s| s.distance.is_some()) && !samples.is_empty();
    let scale = params.distance_unit.metres_per_unit();
    let to_mps = params.speed_unit.mps_per_unit();

    let mut records = Vec::with_capacity(samples.len());
    let mut total = 0.0;
    for (i, sample) in samples.iter().enumerate() {
        let prev = i.checked_sub(1).map(|p| &samples[p]);
        let increment = if has_distance {
            let current = sample.distance.unwrap_or(0.0);
            match params.distance_mode {
                DistanceMode::Incremental => current * scale,
                DistanceMode::Cumulative => prev
                    .and_then(|p| p.distance)
                    .map(|before| ((current - before) * scale).max(0.0))
                    .unwrap_or(0.0),
            }
        } else {
            prev.map(|p| {
                let dt = (sample.time_s - p.time_s).max(0.0);
                let v = match params.integration {
                    Integration::Trapezoidal => 0.5 * (p.speed + sample.speed),
                    Integration::Rectangular => p.speed,
                };
                v * to_mps * dt
            })
            .unwrap_or(0.0)
        };
        let increment = if increment.is_finite() { increment.max(0.0) } else { 0.0 };
        total += increment;
        records.push(JourneyRecord {
            row: sample.row,
            time_s: sample.time_s,
            timestamp: sample.timestamp,
            speed: sample.speed,
            distance_increment_m: increment,
            cumulative_distance_m: total,
        });
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DistanceUnit, SpeedUnit};

    fn sample(row: usize, time_s: f64, speed: f64, distance: Option<f64>) -> Sample {
        Sample {
            row,
            time_s,
            timestamp: None,
            speed,
            distance,
        }
    }

    #[test]
    fn test_trapezoidal_integration_kmph() {
        let samples = vec![
            sample(0, 0.0, 0.0, None),
            sample(1, 10.0, 36.0, None),
            sample(2, 20.0, 36.0, None),
        ];
        let records = compute_distance(&samples, &Params::default());
        // 0 -> 10 m/s over 10 s is 50 m, then 100 m at a steady 10 m/s.
        assert!((records[1].cumulative_distance_m - 50.0).abs() < 1e-9);
        assert!((records[2].cumulative_distance_m - 150.0).abs() < 1e-9);
        assert_eq!(records[0].distance_increment_m, 0.0);
    }

    #[test]
    fn test_rectangular_integration_mps() {
        let params = Params {
            integration: Integration::Rectangular,
            speed_unit: SpeedUnit::Mps,
            ..Params::default()
        };
        let samples = vec![sample(0, 0.0, 2.0, None), sample(1, 5.0, 4.0, None)];
        let records = compute_distance(&samples, &params);
        assert!((records[1].cumulative_distance_m - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_incremental_column_counts_first_row() {
        let samples = vec![
            sample(0, 0.0, 10.0, Some(5.0)),
            sample(1, 1.0, 10.0, Some(7.0)),
        ];
        let records = compute_distance(&samples, &Params::default());
        assert_eq!(records[0].cumulative_distance_m, 5.0);
        assert_eq!(records[1].cumulative_distance_m, 12.0);
    }

    #[test]
    fn test_cumulative_column_in_km_ignores_resets() {
        let params = Params {
            distance_mode: DistanceMode::Cumulative,
            distance_unit: DistanceUnit::Kilometres,
            ..Params::default()
        };
        let samples = vec![
            sample(0, 0.0, 10.0, Some(100.0)),
            sample(1, 1.0, 10.0, Some(100.5)),
            sample(2, 2.0, 10.0, Some(0.0)),
            sample(3, 3.0, 10.0, Some(0.25)),
        ];
        let records = compute_distance(&samples, &params);
        let cumulative: Vec<f64> = records.iter().map(|r| r.cumulative_distance_m).collect();
        assert_eq!(cumulative, vec![0.0, 500.0, 500.0, 750.0]);
    }

    #[test]
    fn test_cumulative_never_decreases() {
        let samples: Vec<Sample> = (0..50)
            .map(|i| sample(i, i as f64 * 1.5, ((i * 37) % 90) as f64, None))
            .collect();
        let records = compute_distance(&samples, &Params::default());
        for pair in records.windows(2) {
            assert!(pair[1].cumulative_distance_m >= pair[0].cumulative_distance_m);
            assert!(pair[1].distance_increment_m >= 0.0);
        }
    }
}

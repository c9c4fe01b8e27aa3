use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::distance::JourneyRecord;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StopConfig {
    /// Speeds at or below this count as stationary.
    pub threshold: f64,
    /// Distances before each stop at which the approach speed is sampled.
    pub lookbacks_m: Vec<f64>,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            lookbacks_m: vec![50.0, 100.0],
        }
    }
}

/// The record nearest to a look-back distance before a stop.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PreStopSpeed {
    pub index: usize,
    pub speed: f64,
    pub distance_m: f64,
    pub time_s: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Lookback {
    pub lookback_m: f64,
    /// `None` when less than `lookback_m` of travel preceded the stop.
    pub reading: Option<PreStopSpeed>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StopEvent {
    pub index: usize,
    pub row: usize,
    pub time_s: f64,
    pub timestamp: Option<NaiveDateTime>,
    pub distance_m: f64,
    pub lookbacks: Vec<Lookback>,
    /// Seconds until speed rises above the threshold again; `None` when the
    /// journey ends stationary.
    pub dwell_s: Option<f64>,
}

/// Find every transition from moving to stationary.
pub fn detect_stops(records: &[JourneyRecord], config: &StopConfig) -> Vec<StopEvent> {
    let mut stops = Vec::new();
    for (index, pair) in records.windows(2).enumerate() {
        let (before, at) = (&pair[0], &pair[1]);
        if !(before.speed > config.threshold && at.speed <= config.threshold) {
            continue;
        }
        let index = index + 1;
        let lookbacks = config
            .lookbacks_m
            .iter()
            .map(|&lookback_m| Lookback {
                lookback_m,
                reading: speed_before(records, index, lookback_m),
            })
            .collect();
        let dwell_s = records[index + 1..]
            .iter()
            .find(|r| r.speed > config.threshold)
            .map(|r| r.time_s - at.time_s);
        stops.push(StopEvent {
            index,
            row: at.row,
            time_s: at.time_s,
            timestamp: at.timestamp,
            distance_m: at.cumulative_distance_m,
            lookbacks,
            dwell_s,
        });
    }
    stops
}

/// Walk back from the stop to the preceding record closest to
/// `stop_distance - lookback_m`. Ties go to the record nearer the stop.
fn speed_before(records: &[JourneyRecord], stop: usize, lookback_m: f64) -> Option<PreStopSpeed> {
    let target = records[stop].cumulative_distance_m - lookback_m;
    if target < 0.0 {
        return None;
    }
    let mut best: Option<(usize, f64)> = None;
    for index in (0..stop).rev() {
        let distance = records[index].cumulative_distance_m;
        let gap = (distance - target).abs();
        match best {
            Some((_, best_gap)) if gap >= best_gap => {
                // Distances only shrink from here on.
                if distance <= target {
                    break;
                }
            }
            _ => best = Some((index, gap)),
        }
    }
    best.map(|(index, _)| {
        let r = &records[index];
        PreStopSpeed {
            index,
            speed: r.speed,
            distance_m: r.cumulative_distance_m,
            time_s: r.time_s,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(speeds: &[f64], step_m: f64) -> Vec<JourneyRecord> {
        let mut total = 0.0;
        speeds
            .iter()
            .enumerate()
            .map(|(i, &speed)| {
                total += step_m;
                JourneyRecord {
                    row: i,
                    time_s: i as f64 * 10.0,
                    timestamp: None,
                    speed,
                    distance_increment_m: step_m,
                    cumulative_distance_m: total,
                }
            })
            .collect()
    }

    #[test]
    fn test_single_stop_at_end() {
        let recs = records(&[0.0, 20.0, 40.0, 60.0, 40.0, 20.0, 0.0], 1000.0);
        let stops = detect_stops(&recs, &StopConfig::default());
        assert_eq!(stops.len(), 1);
        let stop = &stops[0];
        assert_eq!(stop.index, 6);
        assert_eq!(stop.distance_m, 7000.0);
        assert_eq!(stop.dwell_s, None);
        for lookback in &stop.lookbacks {
            let reading = lookback.reading.as_ref().unwrap();
            assert_eq!(reading.index, 5);
            assert_eq!(reading.speed, 20.0);
        }
    }

    #[test]
    fn test_no_stop_when_never_stationary() {
        let recs = records(&[5.0, 20.0, 40.0, 1.0, 30.0], 100.0);
        assert!(detect_stops(&recs, &StopConfig::default()).is_empty());
    }

    #[test]
    fn test_threshold_and_dwell() {
        let recs = records(&[30.0, 2.0, 0.5, 0.0, 12.0, 0.0], 100.0);
        let config = StopConfig {
            threshold: 1.0,
            ..StopConfig::default()
        };
        let stops = detect_stops(&recs, &config);
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].index, 2);
        assert_eq!(stops[0].dwell_s, Some(20.0));
        assert_eq!(stops[1].index, 5);
        assert_eq!(stops[1].dwell_s, None);
    }

    #[test]
    fn test_lookback_picks_nearest_preceding_record() {
        // Samples every 30 m: the stop at 300 m looks for 250 m and 200 m.
        let recs = records(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 0.0], 30.0);
        let stop = &detect_stops(&recs, &StopConfig::default())[0];
        let at_50 = stop.lookbacks[0].reading.as_ref().unwrap();
        let at_100 = stop.lookbacks[1].reading.as_ref().unwrap();
        assert_eq!(at_50.distance_m, 240.0);
        assert_eq!(at_100.distance_m, 210.0);
        assert_eq!(at_100.speed, 70.0);
    }

    #[test]
    fn test_lookback_unavailable_near_start() {
        let recs = records(&[20.0, 20.0, 0.0], 30.0);
        let stop = &detect_stops(&recs, &StopConfig::default())[0];
        assert_eq!(stop.distance_m, 90.0);
        assert!(stop.lookbacks[0].reading.is_some());
        assert!(stop.lookbacks[1].reading.is_none());
    }
}

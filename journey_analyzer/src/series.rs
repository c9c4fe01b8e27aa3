//! Chart-ready views of a journey. Nothing here feeds back into the metrics.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::distance::JourneyRecord;
use crate::stops::StopEvent;
use crate::JaError;

/// One fixed-width time window of the speed-vs-time chart.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SpeedBucket {
    /// Window start, seconds since the first record.
    pub start_s: f64,
    pub timestamp: Option<NaiveDateTime>,
    /// `None` for windows without samples.
    pub mean_speed: Option<f64>,
    pub samples: usize,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct DistanceSpeedPoint {
    pub distance_km: f64,
    pub speed: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ChartSeries {
    pub speed_time: Vec<SpeedBucket>,
    pub speed_distance: Vec<DistanceSpeedPoint>,
    /// Approach-speed readings before each stop.
    pub stop_markers: Vec<DistanceSpeedPoint>,
}

impl ChartSeries {
    pub fn build(
        records: &[JourneyRecord],
        stops: &[StopEvent],
        interval_s: f64,
        max_buckets: usize,
    ) -> Result<Self, JaError> {
        let (speed_distance, stop_markers) = speed_distance_series(records, stops);
        Ok(Self {
            speed_time: resample(records, interval_s, max_buckets)?,
            speed_distance,
            stop_markers,
        })
    }
}

/// Average speed per `interval_s` window, from the first record's time to the
/// last. Every window in that span is emitted, including empty ones.
pub fn resample(
    records: &[JourneyRecord],
    interval_s: f64,
    max_buckets: usize,
) -> Result<Vec<SpeedBucket>, JaError> {
    if !(interval_s.is_finite() && interval_s > 0.0) {
        return Err(JaError::InvalidParameter(format!(
            "resample interval must be positive, got {}",
            interval_s
        )));
    }
    let (first, last) = match (records.first(), records.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Ok(Vec::new()),
    };

    let origin = first.time_s;
    let span = last.time_s - origin;
    // Checked in f64 so a huge span cannot overflow the bucket index.
    let needed = (span / interval_s).floor().max(0.0) + 1.0;
    if !needed.is_finite() || needed > max_buckets as f64 {
        return Err(JaError::InvalidParameter(format!(
            "{} s interval over a {:.0} s journey needs {:.0} buckets (limit {})",
            interval_s, span, needed, max_buckets
        )));
    }
    let count = needed as usize;
    let bucket_of = |t: f64| ((t - origin) / interval_s).floor().max(0.0) as usize;

    let mut sums = vec![(0.0_f64, 0usize); count];
    for r in records {
        let slot = &mut sums[bucket_of(r.time_s).min(count - 1)];
        slot.0 += r.speed;
        slot.1 += 1;
    }

    let buckets = sums
        .into_iter()
        .enumerate()
        .map(|(i, (sum, n))| {
            let start_s = origin + i as f64 * interval_s;
            let offset_ms = ((start_s - origin) * 1000.0).round() as i64;
            SpeedBucket {
                start_s,
                timestamp: first
                    .timestamp
                    .and_then(|t| t.checked_add_signed(Duration::milliseconds(offset_ms))),
                mean_speed: (n > 0).then(|| sum / n as f64),
                samples: n,
            }
        })
        .collect();
    Ok(buckets)
}

/// Speed against cumulative distance in km, plus the pre-stop marker points.
pub fn speed_distance_series(
    records: &[JourneyRecord],
    stops: &[StopEvent],
) -> (Vec<DistanceSpeedPoint>, Vec<DistanceSpeedPoint>) {
    let line = records
        .iter()
        .map(|r| DistanceSpeedPoint {
            distance_km: r.cumulative_distance_m / 1000.0,
            speed: r.speed,
        })
        .collect();
    let markers = stops
        .iter()
        .flat_map(|stop| stop.lookbacks.iter())
        .filter_map(|l| l.reading.as_ref())
        .map(|reading| DistanceSpeedPoint {
            distance_km: reading.distance_m / 1000.0,
            speed: reading.speed,
        })
        .collect();
    (line, markers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stops::{detect_stops, StopConfig};

    fn record(time_s: f64, speed: f64) -> JourneyRecord {
        JourneyRecord {
            row: 0,
            time_s,
            timestamp: None,
            speed,
            distance_increment_m: 0.0,
            cumulative_distance_m: time_s * 10.0,
        }
    }

    #[test]
    fn test_resample_covers_span_without_gaps() {
        let records = vec![
            record(0.0, 10.0),
            record(4.0, 20.0),
            record(12.0, 30.0),
            record(35.0, 40.0),
        ];
        let buckets = resample(&records, 10.0, 1000).unwrap();
        let starts: Vec<f64> = buckets.iter().map(|b| b.start_s).collect();
        assert_eq!(starts, vec![0.0, 10.0, 20.0, 30.0]);
        assert_eq!(buckets[0].mean_speed, Some(15.0));
        assert_eq!(buckets[1].mean_speed, Some(30.0));
        assert_eq!(buckets[2].mean_speed, None);
        assert_eq!(buckets[2].samples, 0);
        assert_eq!(buckets[3].mean_speed, Some(40.0));
    }

    #[test]
    fn test_resample_offsets_timestamps() {
        let start = NaiveDateTime::parse_from_str("2024-02-01 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let mut records = vec![record(0.0, 1.0), record(25.0, 1.0)];
        records[0].timestamp = Some(start);
        let buckets = resample(&records, 10.0, 1000).unwrap();
        assert_eq!(buckets.len(), 3);
        assert_eq!(
            buckets[2].timestamp.unwrap().format("%H:%M:%S").to_string(),
            "10:00:20"
        );
    }

    #[test]
    fn test_resample_rejects_bad_interval_and_bucket_blowup() {
        let records = vec![record(0.0, 1.0), record(1000.0, 1.0)];
        assert!(matches!(resample(&records, 0.0, 10), Err(JaError::InvalidParameter(_))));
        assert!(matches!(resample(&records, 1.0, 10), Err(JaError::InvalidParameter(_))));
    }

    #[test]
    fn test_resample_huge_span_is_rejected() {
        let records = vec![record(0.0, 10.0), record(1e25, 10.0)];
        assert!(matches!(
            resample(&records, 10.0, usize::MAX),
            Err(JaError::InvalidParameter(_))
        ));
        let records = vec![record(0.0, 10.0), record(f64::MAX, 10.0)];
        assert!(matches!(
            resample(&records, 1e-300, 1_000_000),
            Err(JaError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_stop_markers_follow_lookbacks() {
        let records: Vec<JourneyRecord> = [30.0, 30.0, 30.0, 30.0, 30.0, 30.0, 0.0]
            .iter()
            .enumerate()
            .map(|(i, &s)| record(i as f64 * 3.0, s))
            .collect();
        let stops = detect_stops(&records, &StopConfig::default());
        let (line, markers) = speed_distance_series(&records, &stops);
        assert_eq!(line.len(), 7);
        assert_eq!(markers.len(), 2);
        assert!((markers[0].distance_km - 0.12).abs() < 1e-9);
        assert!((markers[1].distance_km - 0.09).abs() < 1e-9);
    }
}

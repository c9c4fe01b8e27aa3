use serde::{Deserialize, Serialize};

use crate::clean::clock_label;
use crate::metrics::Metrics;
use crate::stops::StopEvent;
use crate::SpeedUnit;

/// Display strings for the results page.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReportText {
    pub total_distance: String,
    pub max_speed: String,
    pub max_speed_details: String,
    pub stop_analysis: Vec<String>,
}

impl ReportText {
    pub fn new(metrics: &Metrics, stops: &[StopEvent], unit: SpeedUnit) -> Self {
        Self {
            total_distance: format!("{:.2} km", metrics.total_distance_m / 1000.0),
            max_speed: format!("{} {}", metrics.max_speed, unit.label()),
            max_speed_details: format!(
                "(at {:.2} km, time {})",
                metrics.max_speed_location_m / 1000.0,
                clock_label(metrics.max_speed_timestamp, metrics.max_speed_time_s)
            ),
            stop_analysis: stop_lines(stops, unit),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        let mut out = vec![
            format!("Total distance: {}", self.total_distance),
            format!("Max speed: {} {}", self.max_speed, self.max_speed_details),
        ];
        if self.stop_analysis.is_empty() {
            out.push("No stops detected.".to_string());
        } else {
            out.extend(self.stop_analysis.iter().cloned());
        }
        out
    }
}

pub fn stop_lines(stops: &[StopEvent], unit: SpeedUnit) -> Vec<String> {
    let mut lines = Vec::new();
    for stop in stops {
        lines.push(format!("Stop detected at {:.2} km.", stop.distance_m / 1000.0));
        for lookback in &stop.lookbacks {
            match &lookback.reading {
                Some(r) => lines.push(format!(
                    "  - Speed ~{:.0}m before: {} {} (at {:.2} km)",
                    lookback.lookback_m,
                    r.speed,
                    unit.label(),
                    r.distance_m / 1000.0
                )),
                None => lines.push(format!(
                    "  - Speed ~{:.0}m before: unavailable",
                    lookback.lookback_m
                )),
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stops::{Lookback, PreStopSpeed};

    #[test]
    fn test_report_strings_keep_recorded_speeds() {
        let metrics = Metrics {
            record_count: 3,
            duration_s: 20.0,
            total_distance_m: 12_346.0,
            max_speed: 72.25,
            max_speed_time_s: 3_725.0,
            max_speed_timestamp: None,
            max_speed_location_m: 1_230.0,
            average_speed: None,
        };
        let stops = vec![StopEvent {
            index: 2,
            row: 9,
            time_s: 20.0,
            timestamp: None,
            distance_m: 12_346.0,
            lookbacks: vec![
                Lookback {
                    lookback_m: 50.0,
                    reading: Some(PreStopSpeed {
                        index: 1,
                        speed: 12.0,
                        distance_m: 12_300.0,
                        time_s: 10.0,
                    }),
                },
                Lookback {
                    lookback_m: 100.0,
                    reading: None,
                },
            ],
            dwell_s: None,
        }];
        let report = ReportText::new(&metrics, &stops, SpeedUnit::Kmph);
        assert_eq!(report.total_distance, "12.35 km");
        assert_eq!(report.max_speed, "72.25 Kmph");
        assert_eq!(report.max_speed_details, "(at 1.23 km, time 01:02:05)");
        assert_eq!(
            report.stop_analysis,
            vec![
                "Stop detected at 12.35 km.".to_string(),
                "  - Speed ~50m before: 12 Kmph (at 12.30 km)".to_string(),
                "  - Speed ~100m before: unavailable".to_string(),
            ]
        );
    }
}

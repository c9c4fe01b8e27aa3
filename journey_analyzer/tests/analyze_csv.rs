use journey_analyzer::header::LayoutSource;
use journey_analyzer::{
    analyze, analyze_upload, DistanceMode, JaError, MemoryUpload, Params, SpeedUnit,
};

const TITLED_EXPORT: &str = "\
Train 4521 speed log
Unit,EMU 12
Driver,J. Smith

Date,Time,Distance (m),Speed (Kmph)
01/02/2024,10:00:00,0,0
01/02/2024,10:00:10,40,30
01/02/2024,10:00:20,N/A,45
01/02/2024,10:00:30,120,50
01/02/2024,10:00:40,100,30
01/02/2024,10:00:50,60,0
01/02/2024,10:01:00,0,0
";

#[test]
fn test_title_block_then_header() {
    let analysis = analyze(TITLED_EXPORT.as_bytes(), "log.csv", &Params::default()).unwrap();
    assert_eq!(
        analysis.diagnostics.layout.source,
        LayoutSource::Named { header_row: 3 }
    );
    // The csv reader skips the blank line under the title block.
    assert_eq!(analysis.diagnostics.layout.data_start, 4);
    assert_eq!(analysis.diagnostics.clean.rows_dropped, 1);
    assert_eq!(analysis.metrics.record_count, 6);
    // The dropped row contributes nothing to the running total.
    assert_eq!(analysis.metrics.total_distance_m, 320.0);
    assert_eq!(analysis.metrics.max_speed, 50.0);
    assert_eq!(analysis.metrics.max_speed_location_m, 160.0);
    assert_eq!(analysis.report.total_distance, "0.32 km");
    assert_eq!(analysis.report.max_speed_details, "(at 0.16 km, time 10:00:30)");
}

#[test]
fn test_stop_with_lookbacks_from_kilometre_steps() {
    let mut csv = String::from("Date,Time,Distance,Speed\n");
    for (i, speed) in [0, 20, 40, 60, 40, 20, 0].iter().enumerate() {
        csv.push_str(&format!("01/02/2024,10:0{}:00,1000,{}\n", i, speed));
    }
    let analysis = analyze(csv.as_bytes(), "trip.csv", &Params::default()).unwrap();
    assert_eq!(analysis.metrics.total_distance_m, 7000.0);
    assert_eq!(analysis.stops.len(), 1);

    let stop = &analysis.stops[0];
    assert_eq!(stop.distance_m, 7000.0);
    for lookback in &stop.lookbacks {
        let reading = lookback.reading.as_ref().unwrap();
        assert_eq!(reading.speed, 20.0);
        assert_eq!(reading.distance_m, 6000.0);
    }
    assert_eq!(
        analysis.report.stop_analysis,
        vec![
            "Stop detected at 7.00 km.",
            "  - Speed ~50m before: 20 Kmph (at 6.00 km)",
            "  - Speed ~100m before: 20 Kmph (at 6.00 km)",
        ]
    );
    assert_eq!(analysis.charts.stop_markers.len(), 2);
}

#[test]
fn test_headerless_export_reads_positionally() {
    let csv = "\
Recorder dump 2024-02-01
01/02/2024,10:00:00,0,0
01/02/2024,10:00:05,25,18
01/02/2024,10:00:10,25,18
";
    let analysis = analyze(csv.as_bytes(), "dump.csv", &Params::default()).unwrap();
    assert_eq!(analysis.diagnostics.layout.source, LayoutSource::Positional);
    assert_eq!(analysis.diagnostics.layout.data_start, 1);
    assert_eq!(analysis.metrics.total_distance_m, 50.0);
    assert_eq!(analysis.metrics.duration_s, 10.0);
}

#[test]
fn test_unrecognisable_file_is_format_error() {
    let csv = "hello,world\nfoo,bar\n";
    assert!(matches!(
        analyze(csv.as_bytes(), "junk.csv", &Params::default()),
        Err(JaError::Format(_))
    ));
}

#[test]
fn test_all_rows_malformed_is_insufficient() {
    let csv = "Time,Speed\nx,y\n,\nlater,fast\n";
    assert!(matches!(
        analyze(csv.as_bytes(), "bad.csv", &Params::default()),
        Err(JaError::InsufficientData { valid: 0 })
    ));
}

#[test]
fn test_cumulative_distance_never_decreases() {
    let csv = "\
Elapsed (s),Odometer (m),Speed
0,1000,10
10,1100,36
20,1090,36
30,1400,72
40,1500,0
";
    let params = Params {
        distance_mode: DistanceMode::Cumulative,
        ..Params::default()
    };
    let analysis = analyze(csv.as_bytes(), "odo.csv", &params).unwrap();
    let totals: Vec<f64> = analysis
        .records
        .iter()
        .map(|r| r.cumulative_distance_m)
        .collect();
    assert!(totals.windows(2).all(|w| w[1] >= w[0]));
    assert_eq!(totals, vec![0.0, 100.0, 100.0, 410.0, 510.0]);
}

#[test]
fn test_integrated_distance_and_resampled_span() {
    let csv = "Time (s),Speed (m/s)\n0,10\n10,10\n35,20\n";
    let params = Params {
        speed_unit: SpeedUnit::Mps,
        ..Params::default()
    };
    let upload = MemoryUpload::new("speed.csv", csv.as_bytes().to_vec());
    let analysis = analyze_upload(&upload, &params).unwrap();
    // 10 s at 10 m/s, then 25 s averaging 15 m/s.
    assert_eq!(analysis.metrics.total_distance_m, 475.0);
    assert!(analysis.stops.is_empty());

    let buckets = &analysis.charts.speed_time;
    let starts: Vec<f64> = buckets.iter().map(|b| b.start_s).collect();
    assert_eq!(starts, vec![0.0, 10.0, 20.0, 30.0]);
    assert_eq!(buckets[2].mean_speed, None);
    assert_eq!(buckets[3].mean_speed, Some(20.0));
}

#[test]
fn test_report_line_naming_date_and_time_is_not_the_header() {
    let csv = "\
Report date,01/02/2024,Start time,10:00
Date,Time,Distance,Speed
01/02/2024,10:00:00,0,0
01/02/2024,10:00:10,50,36
01/02/2024,10:00:20,100,0
";
    let analysis = analyze(csv.as_bytes(), "report.csv", &Params::default()).unwrap();
    assert_eq!(
        analysis.diagnostics.layout.source,
        LayoutSource::Named { header_row: 1 }
    );
    assert_eq!(analysis.metrics.total_distance_m, 150.0);
    assert_eq!(analysis.stops.len(), 1);
}

#[test]
fn test_huge_elapsed_time_is_rejected_not_panicking() {
    let csv = "Time,Speed\n0,10\n1e25,10\n";
    assert!(matches!(
        analyze(csv.as_bytes(), "x.csv", &Params::default()),
        Err(JaError::InvalidParameter(_))
    ));
}

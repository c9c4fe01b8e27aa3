//! Speed, distance and stop analysis for train journey logs.
//!
//! The pipeline runs once per uploaded file: read the sheet, find the data
//! header, clean the rows, derive distance, then compute metrics, stop events
//! and chart series.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub mod clean;
pub mod distance;
pub mod header;
pub mod metrics;
pub mod report;
pub mod series;
pub mod stops;
pub mod table;
pub mod timestamps;
pub mod upload;

pub use clean::{clean, CleanStats, Cleaner, Sample};
pub use distance::{compute_distance, JourneyRecord};
pub use header::{find_data_start, locate_header, resolve_layout, ColumnLayout, TableLayout};
pub use metrics::{compute_metrics, Metrics};
pub use report::ReportText;
pub use series::{resample, ChartSeries, DistanceSpeedPoint, SpeedBucket};
pub use stops::{detect_stops, Lookback, PreStopSpeed, StopConfig, StopEvent};
pub use table::{read_table, Cell, RawTable, TableFormat};
pub use upload::{analyze_upload, FileUpload, MemoryUpload, UploadSource};

/// Fewest cleaned rows an analysis can run on.
pub const MIN_RECORDS: usize = 2;

#[derive(Error, Debug)]
pub enum JaError {
    #[error("unrecognised file layout: {0}")]
    Format(String),
    #[error("insufficient data: {valid} valid row(s) after cleaning, need at least 2")]
    InsufficientData { valid: usize },
    #[error("invalid columns: {0}")]
    Validation(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("failed to read {name}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum SpeedUnit {
    Kmph,
    Mps,
}

impl Default for SpeedUnit {
    fn default() -> Self {
        SpeedUnit::Kmph
    }
}

impl SpeedUnit {
    pub fn mps_per_unit(&self) -> f64 {
        match self {
            SpeedUnit::Kmph => 1.0 / 3.6,
            SpeedUnit::Mps => 1.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SpeedUnit::Kmph => "Kmph",
            SpeedUnit::Mps => "m/s",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum DistanceUnit {
    Metres,
    Kilometres,
}

impl Default for DistanceUnit {
    fn default() -> Self {
        DistanceUnit::Metres
    }
}

impl DistanceUnit {
    pub fn metres_per_unit(&self) -> f64 {
        match self {
            DistanceUnit::Metres => 1.0,
            DistanceUnit::Kilometres => 1000.0,
        }
    }
}

/// How a distance column is read.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum DistanceMode {
    /// Distance covered since the previous row.
    Incremental,
    /// Odometer reading.
    Cumulative,
}

impl Default for DistanceMode {
    fn default() -> Self {
        DistanceMode::Incremental
    }
}

/// Rule for integrating speed when no distance column exists.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Integration {
    Trapezoidal,
    Rectangular,
}

impl Default for Integration {
    fn default() -> Self {
        Integration::Trapezoidal
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Params {
    pub header_scan_rows: usize,
    pub speed_unit: SpeedUnit,
    pub distance_unit: DistanceUnit,
    pub distance_mode: DistanceMode,
    pub integration: Integration,
    /// Plausibility ceiling in `speed_unit`; faster rows are dropped.
    pub max_speed: f64,
    pub stop_threshold: f64,
    pub stop_lookbacks_m: Vec<f64>,
    pub resample_interval_s: f64,
    pub resample_max_buckets: usize,
    /// Read `01/02/2024` as 1 February.
    pub day_first: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            header_scan_rows: 50,
            speed_unit: SpeedUnit::Kmph,
            distance_unit: DistanceUnit::Metres,
            distance_mode: DistanceMode::Incremental,
            integration: Integration::Trapezoidal,
            max_speed: 500.0,
            stop_threshold: 0.0,
            stop_lookbacks_m: vec![50.0, 100.0],
            resample_interval_s: 10.0,
            resample_max_buckets: 1_000_000,
            day_first: true,
        }
    }
}

impl Params {
    pub fn from_json(text: &str) -> Result<Self, JaError> {
        let params: Params =
            serde_json::from_str(text).map_err(|e| JaError::InvalidParameter(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), JaError> {
        if self.header_scan_rows == 0 {
            return Err(JaError::InvalidParameter("header_scan_rows must be > 0".into()));
        }
        if !(self.max_speed.is_finite() && self.max_speed > 0.0) {
            return Err(JaError::InvalidParameter("max_speed must be positive".into()));
        }
        if !(self.stop_threshold.is_finite() && self.stop_threshold >= 0.0) {
            return Err(JaError::InvalidParameter("stop_threshold must be >= 0".into()));
        }
        if let Some(bad) = self
            .stop_lookbacks_m
            .iter()
            .find(|d| !(d.is_finite() && **d > 0.0))
        {
            return Err(JaError::InvalidParameter(format!(
                "stop look-back distances must be positive, got {}",
                bad
            )));
        }
        if !(self.resample_interval_s.is_finite() && self.resample_interval_s > 0.0) {
            return Err(JaError::InvalidParameter("resample_interval_s must be positive".into()));
        }
        if self.resample_max_buckets == 0 {
            return Err(JaError::InvalidParameter("resample_max_buckets must be > 0".into()));
        }
        Ok(())
    }

    pub fn stop_config(&self) -> StopConfig {
        StopConfig {
            threshold: self.stop_threshold,
            lookbacks_m: self.stop_lookbacks_m.clone(),
        }
    }
}

/// How the input was read and what cleaning discarded.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Diagnostics {
    pub layout: TableLayout,
    pub table_rows: usize,
    pub clean: CleanStats,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JourneyAnalysis {
    pub metrics: Metrics,
    pub stops: Vec<StopEvent>,
    pub charts: ChartSeries,
    pub report: ReportText,
    pub records: Vec<JourneyRecord>,
    pub diagnostics: Diagnostics,
    pub params: Params,
}

/// Analyse an uploaded file; `file_name` selects the format by extension.
pub fn analyze(input: &[u8], file_name: &str, params: &Params) -> Result<JourneyAnalysis, JaError> {
    let format = TableFormat::from_file_name(file_name)?;
    let table = read_table(input, format)?;
    debug!(file = file_name, rows = table.len(), ?format, "table read");
    analyze_table(&table, params)
}

/// Analyse an already-read table.
pub fn analyze_table(table: &RawTable, params: &Params) -> Result<JourneyAnalysis, JaError> {
    params.validate()?;
    let layout = resolve_layout(table, params)?;

    let mut cleaner = clean(table, layout, params);
    let samples: Vec<Sample> = cleaner.by_ref().collect();
    let clean_stats = cleaner.stats();
    if samples.len() < MIN_RECORDS {
        return Err(JaError::InsufficientData {
            valid: samples.len(),
        });
    }
    if clean_stats.rows_dropped > 0 {
        debug!(
            dropped = clean_stats.rows_dropped,
            kept = clean_stats.rows_kept,
            "malformed rows dropped"
        );
    }

    let records = compute_distance(&samples, params);
    let metrics = compute_metrics(&records, params.speed_unit)?;
    let stops = detect_stops(&records, &params.stop_config());
    let charts = ChartSeries::build(
        &records,
        &stops,
        params.resample_interval_s,
        params.resample_max_buckets,
    )?;
    let report = ReportText::new(&metrics, &stops, params.speed_unit);
    info!(
        records = records.len(),
        stops = stops.len(),
        total_km = metrics.total_distance_m / 1000.0,
        "journey analysed"
    );

    Ok(JourneyAnalysis {
        metrics,
        stops,
        charts,
        report,
        records,
        diagnostics: Diagnostics {
            layout,
            table_rows: table.len(),
            clean: clean_stats,
        },
        params: params.clone(),
    })
}

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::panic;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use journey_analyzer::header::LayoutSource;
use journey_analyzer::{
    analyze_upload, clean, read_table, resolve_layout, ChartSeries, DistanceMode, DistanceSpeedPoint,
    DistanceUnit, FileUpload, Integration, JourneyAnalysis, Params, Sample, SpeedBucket, SpeedUnit,
    TableFormat, UploadSource,
};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT_HASH"), ")");

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about = "Train journey speed and stop analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse journey logs (.xlsx, .xls, .csv) and write results and charts
    Analyze(AnalyzeArgs),
    /// Report how each file's header and rows are interpreted
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct AnalyzeArgs {
    /// Journey log files to analyse
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Directory for JSON, CSV and chart outputs
    #[arg(short, long, default_value = ".", value_hint = ValueHint::DirPath)]
    output_dir: PathBuf,

    /// JSON parameter file; flags below override its values
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Unit of the speed column
    #[arg(long, value_enum)]
    speed_unit: Option<SpeedUnitOpt>,

    /// Unit of the distance column
    #[arg(long, value_enum)]
    distance_unit: Option<DistanceUnitOpt>,

    /// Whether the distance column holds per-row increments or an odometer
    #[arg(long, value_enum)]
    distance_mode: Option<DistanceModeOpt>,

    /// Integration rule when there is no distance column
    #[arg(long, value_enum)]
    integration: Option<IntegrationOpt>,

    /// Speeds at or below this count as stopped
    #[arg(long)]
    stop_threshold: Option<f64>,

    /// Comma-separated look-back distances in metres (e.g. 50,100)
    #[arg(long)]
    lookbacks: Option<String>,

    /// Resample interval for the speed/time chart, in seconds
    #[arg(long)]
    interval: Option<f64>,

    /// Drop rows faster than this (in the speed unit)
    #[arg(long)]
    max_speed: Option<f64>,

    /// Rows scanned for a header or first data row
    #[arg(long)]
    header_scan: Option<usize>,

    /// Print the analysis JSON to stdout instead of writing files
    #[arg(long, action = ArgAction::SetTrue)]
    stdout: bool,

    /// Skip chart rendering
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Render charts as SVG instead of PNG
    #[arg(long, action = ArgAction::SetTrue)]
    svg: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Profile major stages with timings
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Journey log files to inspect
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Output report path
    #[arg(short, long, default_value = "journey_inspect.txt", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SpeedUnitOpt {
    Kmph,
    Mps,
}

impl From<SpeedUnitOpt> for SpeedUnit {
    fn from(value: SpeedUnitOpt) -> Self {
        match value {
            SpeedUnitOpt::Kmph => SpeedUnit::Kmph,
            SpeedUnitOpt::Mps => SpeedUnit::Mps,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DistanceUnitOpt {
    M,
    Km,
}

impl From<DistanceUnitOpt> for DistanceUnit {
    fn from(value: DistanceUnitOpt) -> Self {
        match value {
            DistanceUnitOpt::M => DistanceUnit::Metres,
            DistanceUnitOpt::Km => DistanceUnit::Kilometres,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DistanceModeOpt {
    Incremental,
    Cumulative,
}

impl From<DistanceModeOpt> for DistanceMode {
    fn from(value: DistanceModeOpt) -> Self {
        match value {
            DistanceModeOpt::Incremental => DistanceMode::Incremental,
            DistanceModeOpt::Cumulative => DistanceMode::Cumulative,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum IntegrationOpt {
    Trapezoidal,
    Rectangular,
}

impl From<IntegrationOpt> for Integration {
    fn from(value: IntegrationOpt) -> Self {
        match value {
            IntegrationOpt::Trapezoidal => Integration::Trapezoidal,
            IntegrationOpt::Rectangular => Integration::Rectangular,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Analyze(args) => args.verbose,
        Command::Inspect(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Analyze(args) => handle_analyze(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

fn load_params(path: Option<&Path>) -> Result<Params> {
    let Some(path) = path else {
        return Ok(Params::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read parameters {}", path.display()))?;
    Params::from_json(&text).with_context(|| format!("invalid parameters in {}", path.display()))
}

fn params_from_args(args: &AnalyzeArgs) -> Result<Params> {
    let mut params = load_params(args.config.as_deref())?;
    if let Some(unit) = args.speed_unit {
        params.speed_unit = unit.into();
    }
    if let Some(unit) = args.distance_unit {
        params.distance_unit = unit.into();
    }
    if let Some(mode) = args.distance_mode {
        params.distance_mode = mode.into();
    }
    if let Some(rule) = args.integration {
        params.integration = rule.into();
    }
    if let Some(threshold) = args.stop_threshold {
        params.stop_threshold = threshold;
    }
    if let Some(list) = args.lookbacks.as_deref() {
        params.stop_lookbacks_m = parse_lookback_list(list)?;
    }
    if let Some(interval) = args.interval {
        params.resample_interval_s = interval;
    }
    if let Some(max_speed) = args.max_speed {
        params.max_speed = max_speed;
    }
    if let Some(rows) = args.header_scan {
        params.header_scan_rows = rows;
    }
    params.validate()?;
    Ok(params)
}

fn parse_lookback_list(input: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: f64 = trimmed
            .parse()
            .with_context(|| format!("invalid look-back '{}': expected metres", trimmed))?;
        if !(value.is_finite() && value > 0.0) {
            return Err(anyhow!("look-back distances must be > 0"));
        }
        out.push(value);
    }
    Ok(out)
}

#[derive(Serialize)]
struct FileAnalysis<'a> {
    file: String,
    analysis: &'a JourneyAnalysis,
}

fn handle_analyze(args: AnalyzeArgs) -> Result<()> {
    let params = params_from_args(&args)?;
    let timings = args.profile || args.verbose;

    let t_analyze = Instant::now();
    let results: Vec<(PathBuf, Result<JourneyAnalysis>)> = args
        .inputs
        .par_iter()
        .map(|path| {
            let upload = FileUpload::new(path);
            let result = analyze_upload(&upload, &params)
                .with_context(|| format!("failed to analyse {}", path.display()));
            (path.clone(), result)
        })
        .collect();
    if timings {
        info!(
            "Analysis stage: {:.1} ms ({} files)",
            t_analyze.elapsed().as_secs_f64() * 1000.0,
            results.len()
        );
    }

    let mut analyses = Vec::with_capacity(results.len());
    for (path, result) in results {
        match result {
            Ok(analysis) => analyses.push((path, analysis)),
            Err(err) => warn!("Skipping {}: {:#}", path.display(), err),
        }
    }
    if analyses.is_empty() {
        return Err(anyhow!("none of the {} input file(s) could be analysed", args.inputs.len()));
    }

    for (path, analysis) in &analyses {
        info!("{}", path.display());
        for line in analysis.report.lines() {
            info!("  {}", line);
        }
        let clean = &analysis.diagnostics.clean;
        if clean.rows_dropped > 0 {
            info!(
                "  ({} of {} rows dropped as malformed)",
                clean.rows_dropped, clean.rows_seen
            );
        }
    }

    if args.stdout {
        let rows: Vec<FileAnalysis> = analyses
            .iter()
            .map(|(path, analysis)| FileAnalysis {
                file: path.display().to_string(),
                analysis,
            })
            .collect();
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        serde_json::to_writer_pretty(&mut handle, &rows)?;
        writeln!(handle)?;
        return Ok(());
    }

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create {}", args.output_dir.display()))?;

    let t_write = Instant::now();
    for (path, analysis) in &analyses {
        let stem = output_stem(path);
        let json_path = args.output_dir.join(format!("{}.json", stem));
        write_analysis_json(analysis, &json_path)?;
        let time_csv = args.output_dir.join(format!("{}_speed_time.csv", stem));
        write_speed_time_csv(&analysis.charts.speed_time, &time_csv)?;
        let distance_csv = args.output_dir.join(format!("{}_speed_distance.csv", stem));
        write_speed_distance_csv(&analysis.charts, &distance_csv)?;
        info!("Wrote {} (+ _speed_time.csv, _speed_distance.csv)", json_path.display());
    }
    if timings {
        info!(
            "Write stage: {:.1} ms",
            t_write.elapsed().as_secs_f64() * 1000.0
        );
    }

    if !args.no_plot {
        let kind = if args.svg { ChartKind::Svg } else { ChartKind::Png };
        let t_plot = Instant::now();
        for (path, analysis) in &analyses {
            let paths = ChartPaths::new(&args.output_dir, &output_stem(path), kind);
            match render_chart_guard(analysis, &paths, kind) {
                Ok(()) => info!(
                    "Wrote charts: {}, {}",
                    paths.speed_time.display(),
                    paths.speed_distance.display()
                ),
                Err(err) => warn!("Skipping charts for {}: {}", path.display(), err),
            }
        }
        if timings {
            info!(
                "Plot stage: {:.1} ms",
                t_plot.elapsed().as_secs_f64() * 1000.0
            );
        }
    }

    Ok(())
}

fn output_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "journey".to_string())
}

fn write_analysis_json(analysis: &JourneyAnalysis, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, analysis)?;
    writer.flush()?;
    Ok(())
}

fn format_timestamp(timestamp: Option<NaiveDateTime>) -> String {
    timestamp
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

fn write_speed_time_csv(buckets: &[SpeedBucket], path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    write_speed_time_rows(buckets, &mut writer)
}

fn write_speed_time_rows<W: Write>(buckets: &[SpeedBucket], writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record(["elapsed_s", "timestamp", "mean_speed", "samples"])?;
    for bucket in buckets {
        writer.write_record([
            format!("{:.3}", bucket.start_s),
            format_timestamp(bucket.timestamp),
            bucket
                .mean_speed
                .map(|v| format!("{:.3}", v))
                .unwrap_or_default(),
            bucket.samples.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_speed_distance_csv(charts: &ChartSeries, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(["distance_km", "speed", "pre_stop_marker"])?;
    let rows = charts
        .speed_distance
        .iter()
        .map(|p| (p, false))
        .chain(charts.stop_markers.iter().map(|p| (p, true)));
    for (point, marker) in rows {
        writer.write_record([
            format!("{:.4}", point.distance_km),
            format!("{:.3}", point.speed),
            marker.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    let params = Params::default();
    let mut report = String::new();

    for path in &args.inputs {
        report.push_str(&format!("FILE: {}\n", path.display()));
        if let Err(err) = inspect_file(path, &params, &mut report) {
            warn!("{}: {:#}", path.display(), err);
            report.push_str(&format!("  error: {:#}\n", err));
        }
        report.push('\n');
    }

    fs::write(&args.output, report)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!("Inspection report written: {}", args.output.display());
    Ok(())
}

fn inspect_file(path: &Path, params: &Params, report: &mut String) -> Result<()> {
    let upload = FileUpload::new(path);
    let bytes = upload.read_bytes()?;
    let format = TableFormat::from_file_name(upload.file_name())?;
    let table = read_table(&bytes, format)?;
    report.push_str(&format!("  format: {:?}\n", format));
    report.push_str(&format!("  rows: {} (width {})\n", table.len(), table.width()));

    let layout = resolve_layout(&table, params)?;
    match layout.source {
        LayoutSource::Named { header_row } => {
            let names: Vec<String> = table
                .row(header_row)
                .unwrap_or_default()
                .iter()
                .map(|c| c.display())
                .collect();
            report.push_str(&format!("  header: row {} [{}]\n", header_row, names.join(" | ")));
        }
        LayoutSource::Positional => {
            report.push_str("  header: none, reading DATE, TIME, DISTANCE, SPEED by position\n");
        }
    }
    let columns = layout.columns;
    let show = |col: Option<usize>| col.map_or("-".to_string(), |c| c.to_string());
    report.push_str(&format!(
        "  columns: date={} time={} distance={} speed={}\n",
        show(columns.date),
        columns.time,
        show(columns.distance),
        columns.speed
    ));
    report.push_str(&format!("  data_start: row {}\n", layout.data_start));

    let mut cleaner = clean(&table, layout, params);
    let samples: Vec<Sample> = cleaner.by_ref().collect();
    let stats = cleaner.stats();
    report.push_str(&format!(
        "  rows: seen={} kept={} dropped={} blank={}\n",
        stats.rows_seen, stats.rows_kept, stats.rows_dropped, stats.rows_blank
    ));
    if let (Some(first), Some(last)) = (samples.first(), samples.last()) {
        report.push_str(&format!("  timespan_s: {:.1}\n", last.time_s - first.time_s));
    }

    let preview_end = (layout.data_start + 5).min(table.len());
    if layout.data_start < preview_end {
        report.push_str("  preview:\n");
        for row in layout.data_start..preview_end {
            let cells: Vec<String> = table
                .row(row)
                .unwrap_or_default()
                .iter()
                .map(|c| c.display())
                .collect();
            report.push_str(&format!("    {:>5}: {}\n", row, cells.join(" | ")));
        }
    }
    Ok(())
}

#[derive(Clone, Copy, Debug)]
enum ChartKind {
    Png,
    Svg,
}

impl ChartKind {
    fn extension(&self) -> &'static str {
        match self {
            ChartKind::Png => "png",
            ChartKind::Svg => "svg",
        }
    }
}

struct ChartPaths {
    speed_time: PathBuf,
    speed_distance: PathBuf,
}

impl ChartPaths {
    fn new(dir: &Path, stem: &str, kind: ChartKind) -> Self {
        let ext = kind.extension();
        Self {
            speed_time: dir.join(format!("{}_speed_time.{}", stem, ext)),
            speed_distance: dir.join(format!("{}_speed_distance.{}", stem, ext)),
        }
    }
}

const CHART_SIZE: (u32, u32) = (1280, 720);

fn render_chart_guard(
    analysis: &JourneyAnalysis,
    paths: &ChartPaths,
    kind: ChartKind,
) -> Result<(), String> {
    let render = || -> Result<(), String> {
        render_charts(analysis, paths, kind).map_err(|e| format!("plotting error: {}", e))
    };

    // Font lookup inside plotters can panic on hosts without system fonts.
    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn render_charts(analysis: &JourneyAnalysis, paths: &ChartPaths, kind: ChartKind) -> Result<()> {
    let unit = analysis.params.speed_unit.label();
    let charts = &analysis.charts;
    match kind {
        ChartKind::Png => {
            let root = BitMapBackend::new(&paths.speed_time, CHART_SIZE).into_drawing_area();
            draw_speed_time_chart(root, &charts.speed_time, unit)?;
            let root = BitMapBackend::new(&paths.speed_distance, CHART_SIZE).into_drawing_area();
            draw_speed_distance_chart(root, charts, unit)?;
        }
        ChartKind::Svg => {
            let root = SVGBackend::new(&paths.speed_time, CHART_SIZE).into_drawing_area();
            draw_speed_time_chart(root, &charts.speed_time, unit)?;
            let root = SVGBackend::new(&paths.speed_distance, CHART_SIZE).into_drawing_area();
            draw_speed_distance_chart(root, charts, unit)?;
        }
    }
    Ok(())
}

/// Consecutive non-empty buckets as line segments, in minutes.
fn speed_time_segments(buckets: &[SpeedBucket]) -> Vec<Vec<(f64, f64)>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    for bucket in buckets {
        match bucket.mean_speed {
            Some(speed) => current.push((bucket.start_s / 60.0, speed)),
            None if !current.is_empty() => segments.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn speed_axis_max(speeds: impl Iterator<Item = f64>) -> f64 {
    (speeds.fold(0.0_f64, f64::max) * 1.1).max(1.0)
}

fn draw_speed_time_chart<DB>(
    root: DrawingArea<DB, Shift>,
    buckets: &[SpeedBucket],
    unit: &str,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let x_max = buckets
        .last()
        .map(|b| b.start_s / 60.0)
        .unwrap_or(0.0)
        .max(1.0);
    let y_max = speed_axis_max(buckets.iter().filter_map(|b| b.mean_speed));

    let mut chart = ChartBuilder::on(&root)
        .caption("Speed vs Time", ("sans-serif", 26))
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 45)
        .build_cartesian_2d(0.0..x_max, 0.0..y_max)?;

    let axis_font = FontDesc::new(FontFamily::SansSerif, 18.0, FontStyle::Normal);
    chart
        .configure_mesh()
        .light_line_style(&BLACK.mix(0.05))
        .x_desc("Elapsed time (min)")
        .y_desc(format!("Speed ({})", unit))
        .x_label_formatter(&|v| format!("{:.0}", v))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .label_style(axis_font.color(&BLACK.mix(0.85)))
        .draw()?;

    let line_color = RGBColor(31, 119, 180);
    let line_style = ShapeStyle {
        color: line_color.to_rgba(),
        filled: false,
        stroke_width: 2,
    };
    for (idx, segment) in speed_time_segments(buckets).into_iter().enumerate() {
        let series = chart.draw_series(LineSeries::new(segment, line_style))?;
        if idx == 0 {
            series
                .label(format!("Mean speed ({})", unit))
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], line_color));
        }
    }

    let legend_font = FontDesc::new(FontFamily::SansSerif, 16.0, FontStyle::Normal);
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.7))
        .border_style(&BLACK.mix(0.3))
        .label_font(legend_font.color(&BLACK))
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    root.present()?;
    Ok(())
}

fn draw_speed_distance_chart<DB>(
    root: DrawingArea<DB, Shift>,
    charts: &ChartSeries,
    unit: &str,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let points: &[DistanceSpeedPoint] = &charts.speed_distance;
    let x_max = points
        .iter()
        .map(|p| p.distance_km)
        .fold(0.0_f64, f64::max)
        .max(0.1);
    let y_max = speed_axis_max(points.iter().map(|p| p.speed));

    let mut chart = ChartBuilder::on(&root)
        .caption("Speed vs Distance", ("sans-serif", 26))
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 45)
        .build_cartesian_2d(0.0..x_max, 0.0..y_max)?;

    let axis_font = FontDesc::new(FontFamily::SansSerif, 18.0, FontStyle::Normal);
    chart
        .configure_mesh()
        .light_line_style(&BLACK.mix(0.05))
        .x_desc("Distance (km)")
        .y_desc(format!("Speed ({})", unit))
        .x_label_formatter(&|v| format!("{:.1}", v))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .label_style(axis_font.color(&BLACK.mix(0.85)))
        .draw()?;

    let line_color = RGBColor(50, 50, 50);
    chart
        .draw_series(LineSeries::new(
            points.iter().map(|p| (p.distance_km, p.speed)),
            ShapeStyle {
                color: line_color.to_rgba(),
                filled: false,
                stroke_width: 2,
            },
        ))?
        .label(format!("Speed ({})", unit))
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], line_color));

    if !charts.stop_markers.is_empty() {
        chart
            .draw_series(
                charts
                    .stop_markers
                    .iter()
                    .map(|p| Circle::new((p.distance_km, p.speed), 6, RED.filled())),
            )?
            .label("Speed before stop")
            .legend(|(x, y)| Circle::new((x + 15, y), 6, RED.filled()));
    }

    let legend_font = FontDesc::new(FontFamily::SansSerif, 16.0, FontStyle::Normal);
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.7))
        .border_style(&BLACK.mix(0.3))
        .label_font(legend_font.color(&BLACK))
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(start_s: f64, mean_speed: Option<f64>) -> SpeedBucket {
        SpeedBucket {
            start_s,
            timestamp: None,
            mean_speed,
            samples: mean_speed.map_or(0, |_| 1),
        }
    }

    #[test]
    fn test_parse_lookback_list() {
        assert_eq!(parse_lookback_list("50, 100,,200").unwrap(), vec![50.0, 100.0, 200.0]);
        assert!(parse_lookback_list("50,-1").is_err());
        assert!(parse_lookback_list("fifty").is_err());
    }

    #[test]
    fn test_speed_time_segments_split_on_gaps() {
        let buckets = vec![
            bucket(0.0, Some(10.0)),
            bucket(60.0, Some(20.0)),
            bucket(120.0, None),
            bucket(180.0, Some(5.0)),
        ];
        let segments = speed_time_segments(&buckets);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0], vec![(0.0, 10.0), (1.0, 20.0)]);
        assert_eq!(segments[1], vec![(3.0, 5.0)]);
    }

    #[test]
    fn test_chart_paths_and_stem() {
        let stem = output_stem(Path::new("/data/run 12.xlsx"));
        assert_eq!(stem, "run 12");
        let paths = ChartPaths::new(Path::new("out"), &stem, ChartKind::Svg);
        assert_eq!(paths.speed_time, Path::new("out/run 12_speed_time.svg"));
        assert_eq!(paths.speed_distance, Path::new("out/run 12_speed_distance.svg"));
    }

    #[test]
    fn test_speed_time_csv_leaves_empty_buckets_blank() {
        let buckets = vec![bucket(0.0, Some(12.5)), bucket(10.0, None)];
        let mut writer = csv::Writer::from_writer(Vec::new());
        write_speed_time_rows(&buckets, &mut writer).unwrap();
        let bytes = writer.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "elapsed_s,timestamp,mean_speed,samples\n0.000,,12.500,1\n10.000,,,0\n"
        );
    }

    #[test]
    fn test_params_flags_override_defaults() {
        let args = AnalyzeArgs::parse_from([
            "analyze",
            "run.csv",
            "--speed-unit",
            "mps",
            "--distance-mode",
            "cumulative",
            "--lookbacks",
            "25,75",
        ]);
        let params = params_from_args(&args).unwrap();
        assert_eq!(params.speed_unit, SpeedUnit::Mps);
        assert_eq!(params.distance_mode, DistanceMode::Cumulative);
        assert_eq!(params.stop_lookbacks_m, vec![25.0, 75.0]);
        assert_eq!(params.resample_interval_s, 10.0);
    }
}

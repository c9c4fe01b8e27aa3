use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::table::Cell;

// Two-digit year patterns come first: `%Y` would happily read "24" as year 24.
const DATETIME_DAY_FIRST: &[&str] = &[
    "%d/%m/%y %H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S%.f",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S%.f",
    "%d.%m.%Y %H:%M:%S%.f",
];

const DATETIME_MONTH_FIRST: &[&str] = &[
    "%m/%d/%y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%m-%d-%Y %H:%M:%S%.f",
];

const DATETIME_ISO: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
];

const DATE_DAY_FIRST: &[&str] = &["%d/%m/%y", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%d-%b-%Y"];
const DATE_MONTH_FIRST: &[&str] = &["%m/%d/%y", "%m/%d/%Y", "%m-%d-%Y", "%b-%d-%Y"];
const DATE_ISO: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

const CLOCK: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

/// Highest serial Excel can represent (9999-12-31).
const EXCEL_MAX_SERIAL: f64 = 2_958_466.0;

/// Convert an Excel 1900-system serial day number into a timestamp.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial <= 0.0 || serial >= EXCEL_MAX_SERIAL {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    base.checked_add_signed(Duration::milliseconds(millis))
}

pub fn parse_datetime_text(raw: &str, day_first: bool) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    let regional = if day_first {
        DATETIME_DAY_FIRST
    } else {
        DATETIME_MONTH_FIRST
    };
    DATETIME_ISO
        .iter()
        .chain(regional.iter())
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

pub fn parse_date_text(raw: &str, day_first: bool) -> Option<NaiveDate> {
    let raw = raw.trim();
    let regional = if day_first {
        DATE_DAY_FIRST
    } else {
        DATE_MONTH_FIRST
    };
    DATE_ISO
        .iter()
        .chain(regional.iter())
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| parse_datetime_text(raw, day_first).map(|dt| dt.date()))
}

/// Seconds since midnight for an `HH:MM[:SS]` string.
pub fn parse_clock_text(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    CLOCK
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok())
        .map(seconds_of_day)
}

pub fn seconds_of_day(time: NaiveTime) -> f64 {
    time.num_seconds_from_midnight() as f64 + time.nanosecond() as f64 / 1e9
}

/// A cell read as a calendar date (a timestamp cell contributes its date part).
pub fn cell_date(cell: &Cell, day_first: bool) -> Option<NaiveDate> {
    match cell {
        Cell::DateTime(dt) => Some(dt.date()),
        Cell::Text(s) => parse_date_text(s, day_first),
        Cell::Number(v) if *v >= 1.0 => excel_serial_to_datetime(*v).map(|dt| dt.date()),
        _ => None,
    }
}

/// A cell read as a full timestamp.
pub fn cell_datetime(cell: &Cell, day_first: bool) -> Option<NaiveDateTime> {
    match cell {
        Cell::DateTime(dt) => Some(*dt),
        Cell::Text(s) => parse_datetime_text(s, day_first),
        _ => None,
    }
}

/// A cell read as a time of day, in seconds since midnight.
pub fn cell_clock(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Time(secs) if secs.is_finite() && *secs >= 0.0 => Some(*secs),
        Cell::DateTime(dt) => Some(seconds_of_day(dt.time())),
        Cell::Text(s) => parse_clock_text(s),
        // Unformatted Excel time: fraction of a day.
        Cell::Number(v) if (0.0..1.0).contains(v) => Some(v * 86_400.0),
        _ => None,
    }
}

/// Whether a cell opens a data row: a date in the first column.
pub fn looks_like_date(cell: &Cell, day_first: bool) -> bool {
    match cell {
        Cell::DateTime(_) => true,
        Cell::Text(s) => parse_date_text(s, day_first).is_some(),
        _ => false,
    }
}

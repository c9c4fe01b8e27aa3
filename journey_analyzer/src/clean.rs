use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::header::TableLayout;
use crate::table::{Cell, RawTable};
use crate::timestamps::{cell_clock, cell_date, cell_datetime, seconds_of_day};
use crate::Params;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// A validated row: time resolved to seconds since the first kept row, speed
/// and optional distance coerced to numbers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// Row index in the source table.
    pub row: usize,
    pub time_s: f64,
    pub timestamp: Option<NaiveDateTime>,
    pub speed: f64,
    pub distance: Option<f64>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanStats {
    pub rows_seen: usize,
    pub rows_kept: usize,
    pub rows_dropped: usize,
    pub rows_blank: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum TimeReading {
    Absolute(NaiveDateTime),
    Clock(f64),
    Elapsed(f64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimeKind {
    Absolute,
    Clock,
    Elapsed,
}

impl TimeReading {
    fn kind(&self) -> TimeKind {
        match self {
            TimeReading::Absolute(_) => TimeKind::Absolute,
            TimeReading::Clock(_) => TimeKind::Clock,
            TimeReading::Elapsed(_) => TimeKind::Elapsed,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Origin {
    Absolute(NaiveDateTime),
    Seconds(f64),
}

/// Lazily yields [`Sample`]s from the data rows of a table, dropping rows that
/// fail coercion or validation. Counters are available from [`Cleaner::stats`]
/// once iteration is done.
pub struct Cleaner<'a> {
    table: &'a RawTable,
    layout: TableLayout,
    params: &'a Params,
    next_row: usize,
    kind: Option<TimeKind>,
    origin: Option<Origin>,
    day_offset: f64,
    last_clock: Option<f64>,
    last_time: Option<f64>,
    stats: CleanStats,
}

/// Start cleaning the rows below the located header (or data start).
pub fn clean<'a>(table: &'a RawTable, layout: TableLayout, params: &'a Params) -> Cleaner<'a> {
    Cleaner {
        table,
        layout,
        params,
        next_row: layout.data_start,
        kind: None,
        origin: None,
        day_offset: 0.0,
        last_clock: None,
        last_time: None,
        stats: CleanStats::default(),
    }
}

impl<'a> Cleaner<'a> {
    pub fn stats(&self) -> CleanStats {
        self.stats
    }

    fn read_time(&self, row: usize) -> Option<TimeReading> {
        let cols = &self.layout.columns;
        let time_cell = self.table.cell(row, cols.time);
        let day_first = self.params.day_first;
        if let Some(date_col) = cols.date {
            let date = cell_date(self.table.cell(row, date_col), day_first)?;
            let secs = cell_clock(time_cell)?;
            let midnight = date.and_hms_opt(0, 0, 0)?;
            let millis = (secs * 1000.0).round() as i64;
            return midnight
                .checked_add_signed(chrono::Duration::milliseconds(millis))
                .map(TimeReading::Absolute);
        }
        match time_cell {
            Cell::Number(v) if v.is_finite() && *v >= 0.0 => Some(TimeReading::Elapsed(*v)),
            Cell::DateTime(dt) => Some(TimeReading::Absolute(*dt)),
            Cell::Time(secs) => Some(TimeReading::Clock(*secs)),
            Cell::Text(_) => cell_datetime(time_cell, day_first)
                .map(TimeReading::Absolute)
                .or_else(|| cell_clock(time_cell).map(TimeReading::Clock))
                .or_else(|| time_cell.to_f64().filter(|v| *v >= 0.0).map(TimeReading::Elapsed)),
            _ => None,
        }
    }

    fn read_speed(&self, row: usize) -> Option<f64> {
        self.table
            .cell(row, self.layout.columns.speed)
            .to_f64()
            .filter(|v| *v >= 0.0 && *v <= self.params.max_speed)
    }

    fn read_distance(&self, row: usize) -> Option<Option<f64>> {
        match self.layout.columns.distance {
            None => Some(None),
            Some(col) => self
                .table
                .cell(row, col)
                .to_f64()
                .filter(|v| *v >= 0.0)
                .map(Some),
        }
    }

    /// Seconds since the first kept row, without committing any state.
    fn relative_seconds(&self, reading: TimeReading) -> Option<(f64, Option<NaiveDateTime>, f64)> {
        match reading {
            TimeReading::Absolute(dt) => {
                let base = match self.origin {
                    Some(Origin::Absolute(base)) => base,
                    None => dt,
                    Some(Origin::Seconds(_)) => return None,
                };
                let secs = (dt - base).num_milliseconds() as f64 / 1000.0;
                Some((secs, Some(dt), self.day_offset))
            }
            TimeReading::Clock(secs) => {
                let mut offset = self.day_offset;
                if let Some(last) = self.last_clock {
                    // A clock that jumps back by more than half a day crossed midnight.
                    if secs + offset < last - SECONDS_PER_DAY / 2.0 {
                        offset += SECONDS_PER_DAY;
                    }
                }
                let unwrapped = secs + offset;
                let base = match self.origin {
                    Some(Origin::Seconds(base)) => base,
                    None => unwrapped,
                    Some(Origin::Absolute(_)) => return None,
                };
                Some((unwrapped - base, None, offset))
            }
            TimeReading::Elapsed(secs) => {
                let base = match self.origin {
                    Some(Origin::Seconds(base)) => base,
                    None => secs,
                    Some(Origin::Absolute(_)) => return None,
                };
                Some((secs - base, None, self.day_offset))
            }
        }
    }

    fn accept(&mut self, reading: TimeReading, offset: f64, time_s: f64) {
        if self.origin.is_none() {
            self.kind = Some(reading.kind());
            self.origin = Some(match reading {
                TimeReading::Absolute(dt) => Origin::Absolute(dt),
                TimeReading::Clock(secs) => Origin::Seconds(secs + offset),
                TimeReading::Elapsed(secs) => Origin::Seconds(secs),
            });
        }
        if let TimeReading::Clock(secs) = reading {
            self.day_offset = offset;
            self.last_clock = Some(secs + offset);
        }
        self.last_time = Some(time_s);
    }

    fn sample_at(&mut self, row: usize) -> Option<Sample> {
        let reading = self.read_time(row)?;
        if self.kind.is_some_and(|k| k != reading.kind()) {
            return None;
        }
        let speed = self.read_speed(row)?;
        let distance = self.read_distance(row)?;
        let (time_s, timestamp, offset) = self.relative_seconds(reading)?;
        if self.last_time.is_some_and(|last| time_s < last) {
            return None;
        }
        self.accept(reading, offset, time_s);
        Some(Sample {
            row,
            time_s,
            timestamp,
            speed,
            distance,
        })
    }
}

impl<'a> Iterator for Cleaner<'a> {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        while self.next_row < self.table.len() {
            let row = self.next_row;
            self.next_row += 1;
            self.stats.rows_seen += 1;

            let blank = self
                .table
                .row(row)
                .map_or(true, |cells| cells.iter().all(Cell::is_empty));
            if blank {
                self.stats.rows_blank += 1;
                continue;
            }

            match self.sample_at(row) {
                Some(sample) => {
                    self.stats.rows_kept += 1;
                    return Some(sample);
                }
                None => {
                    self.stats.rows_dropped += 1;
                    debug!(row, "dropping malformed row");
                }
            }
        }
        None
    }
}

/// Time of day of an absolute sample, used for the report's `HH:MM:SS`.
pub fn clock_label(timestamp: Option<NaiveDateTime>, time_s: f64) -> String {
    let secs = match timestamp {
        Some(ts) => seconds_of_day(ts.time()),
        None => time_s,
    };
    let total = secs.max(0.0).round() as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total / 60) % 60,
        total % 60
    )
}

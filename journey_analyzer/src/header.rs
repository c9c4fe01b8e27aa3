//! Locating the data header in loosely structured exports.
//!
//! Exports from on-train recorders usually carry a title block (train number,
//! driver, unit) above the real column header, and some carry no header at
//! all. Two heuristics cover both shapes: a named header row, or the first row
//! that starts with a date, read with the fixed `DATE, TIME, DISTANCE, SPEED`
//! column order.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::table::{Cell, RawTable};
use crate::timestamps::looks_like_date;
use crate::{JaError, Params};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ColumnRole {
    Date,
    Time,
    Distance,
    Speed,
}

/// Header cells recognised in a candidate row. Only the first column seen for
/// each role is kept.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderColumns {
    pub date: Option<usize>,
    pub time: Option<usize>,
    pub distance: Option<usize>,
    pub speed: Option<usize>,
}

impl HeaderColumns {
    fn assign(&mut self, role: ColumnRole, col: usize) {
        let slot = match role {
            ColumnRole::Date => &mut self.date,
            ColumnRole::Time => &mut self.time,
            ColumnRole::Distance => &mut self.distance,
            ColumnRole::Speed => &mut self.speed,
        };
        slot.get_or_insert(col);
    }

    fn recognised(&self) -> usize {
        [self.date, self.time, self.distance, self.speed]
            .iter()
            .filter(|c| c.is_some())
            .count()
    }

    /// Resolve into a usable layout; a date column alone stands in for time
    /// when it holds full timestamps.
    pub fn layout(&self) -> Result<ColumnLayout, JaError> {
        let speed = self
            .speed
            .ok_or_else(|| JaError::Validation("no speed column in header".into()))?;
        let (date, time) = match (self.date, self.time) {
            (date, Some(time)) => (date, time),
            (Some(date), None) => (None, date),
            (None, None) => {
                return Err(JaError::Validation("no time or date column in header".into()))
            }
        };
        Ok(ColumnLayout {
            date,
            time,
            distance: self.distance,
            speed,
        })
    }
}

/// Column indices the cleaner reads from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnLayout {
    pub date: Option<usize>,
    pub time: usize,
    pub distance: Option<usize>,
    pub speed: usize,
}

impl ColumnLayout {
    /// Fixed column order of recorder exports without a header row.
    pub const POSITIONAL: ColumnLayout = ColumnLayout {
        date: Some(0),
        time: 1,
        distance: Some(2),
        speed: 3,
    };
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderMatch {
    pub row: usize,
    pub columns: HeaderColumns,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayoutSource {
    Named { header_row: usize },
    Positional,
}

/// Where the data starts and how to read it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableLayout {
    pub source: LayoutSource,
    pub columns: ColumnLayout,
    pub data_start: usize,
}

/// Map a header cell to the column it names.
pub fn classify_header(text: &str) -> Option<ColumnRole> {
    let lower = text.trim().to_ascii_lowercase();
    if lower.is_empty() {
        return None;
    }
    let has = |tokens: &[&str]| tokens.iter().any(|t| lower.contains(t));
    if has(&["speed", "velocity", "kmph", "km/h", "kph", "m/s"]) {
        Some(ColumnRole::Speed)
    } else if has(&["datetime", "date/time", "date time", "date & time", "timestamp"]) {
        Some(ColumnRole::Time)
    } else if has(&["date", "day"]) {
        Some(ColumnRole::Date)
    } else if has(&["dist", "odometer", "chainage", "mileage", "metres", "meters"]) {
        Some(ColumnRole::Distance)
    } else if has(&["time", "clock", "elapsed", "seconds", "hh:mm"]) {
        Some(ColumnRole::Time)
    } else {
        None
    }
}

fn header_columns(row: &[Cell]) -> HeaderColumns {
    let mut columns = HeaderColumns::default();
    for (col, cell) in row.iter().enumerate() {
        if let Some(role) = cell.as_text().and_then(classify_header) {
            columns.assign(role, col);
        }
    }
    columns
}

/// First row within `scan_rows` that names at least two known columns and
/// resolves to a usable layout. When no candidate is usable, the first one is
/// returned so the caller can report what is missing.
pub fn locate_header(table: &RawTable, scan_rows: usize) -> Option<HeaderMatch> {
    let mut first_candidate = None;
    for (row, cells) in table.rows().iter().take(scan_rows).enumerate() {
        let columns = header_columns(cells);
        if columns.recognised() < 2 {
            continue;
        }
        let found = HeaderMatch { row, columns };
        if columns.layout().is_ok() {
            return Some(found);
        }
        // Title-block lines such as "Report date, .., Start time, .." land here.
        first_candidate.get_or_insert(found);
    }
    first_candidate
}

/// First row whose leading cell parses as a date.
pub fn find_data_start(table: &RawTable, scan_rows: usize, day_first: bool) -> Option<usize> {
    table
        .rows()
        .iter()
        .take(scan_rows)
        .position(|cells| cells.first().is_some_and(|c| looks_like_date(c, day_first)))
}

/// Named header first, positional fallback second.
pub fn resolve_layout(table: &RawTable, params: &Params) -> Result<TableLayout, JaError> {
    if table.is_empty() {
        return Err(JaError::Format("file contains no rows".into()));
    }

    if let Some(found) = locate_header(table, params.header_scan_rows) {
        debug!(row = found.row, columns = ?found.columns, "header row located");
        return Ok(TableLayout {
            source: LayoutSource::Named {
                header_row: found.row,
            },
            columns: found.columns.layout()?,
            data_start: found.row + 1,
        });
    }

    if let Some(start) = find_data_start(table, params.header_scan_rows, params.day_first) {
        debug!(row = start, "no header row; reading date-led rows positionally");
        if table.width() < 4 {
            return Err(JaError::Validation(format!(
                "expected DATE, TIME, DISTANCE and SPEED columns, found {}",
                table.width()
            )));
        }
        return Ok(TableLayout {
            source: LayoutSource::Positional,
            columns: ColumnLayout::POSITIONAL,
            data_start: start,
        });
    }

    Err(JaError::Format(format!(
        "no header row or date-led data row within the first {} rows",
        params.header_scan_rows
    )))
}

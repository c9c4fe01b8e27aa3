//! Untyped tabular input as read from an uploaded spreadsheet or CSV export.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, ExcelDateTime, Reader};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::JaError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TableFormat {
    Xlsx,
    Xls,
    Csv,
}

impl TableFormat {
    /// Pick the format from a file name or bare extension.
    pub fn from_file_name(name: &str) -> Result<Self, JaError> {
        let lower = name.trim().to_ascii_lowercase();
        let ext = lower.rsplit('.').next().unwrap_or(lower.as_str());
        match ext {
            "xlsx" | "xlsm" => Ok(TableFormat::Xlsx),
            "xls" => Ok(TableFormat::Xls),
            "csv" | "txt" => Ok(TableFormat::Csv),
            _ => Err(JaError::Format(format!(
                "unsupported file type '{}' (expected .xlsx, .xls or .csv)",
                name
            ))),
        }
    }

    pub fn is_workbook(&self) -> bool {
        matches!(self, TableFormat::Xlsx | TableFormat::Xls)
    }
}

/// A single spreadsheet cell before any column semantics are applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    /// Time of day or elapsed duration, in seconds.
    Time(f64),
}

impl Cell {
    pub fn text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(trimmed.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric coercion. Text is accepted when it parses as a finite number,
    /// including a lone decimal comma ("12,5").
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) if v.is_finite() => Some(*v),
            Cell::Text(s) => parse_number(s),
            _ => None,
        }
    }

    /// Short rendering used by diagnostics.
    pub fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(v) => format!("{}", v),
            Cell::Bool(b) => b.to_string(),
            Cell::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            Cell::Time(secs) => format!("{:.0}s", secs),
        }
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let value = match trimmed.parse::<f64>() {
        Ok(v) => v,
        Err(_) if trimmed.matches(',').count() == 1 && !trimmed.contains('.') => {
            trimmed.replace(',', ".").parse::<f64>().ok()?
        }
        Err(_) => return None,
    };
    value.is_finite().then_some(value)
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawTable {
    rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[Cell]> {
        self.rows.get(index).map(|r| r.as_slice())
    }

    /// Cell lookup that treats ragged rows as padded with empty cells.
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        static EMPTY: Cell = Cell::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }
}

/// Read the first worksheet (or the whole CSV) into an untyped table.
pub fn read_table(input: &[u8], format: TableFormat) -> Result<RawTable, JaError> {
    match format {
        TableFormat::Xlsx | TableFormat::Xls => read_workbook(input),
        TableFormat::Csv => read_csv(input),
    }
}

fn read_workbook(input: &[u8]) -> Result<RawTable, JaError> {
    let cursor = Cursor::new(input.to_vec());
    let mut workbook =
        open_workbook_auto_from_rs(cursor).map_err(|e| JaError::Format(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| JaError::Format("workbook has no worksheets".into()))?
        .map_err(|e| JaError::Format(e.to_string()))?;

    let rows = range
        .rows()
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect();
    Ok(RawTable::new(rows))
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::text(s),
        Data::Float(v) => Cell::Number(*v),
        Data::Int(v) => Cell::Number(*v as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => workbook_datetime_cell(dt),
    }
}

/// calamine applies the workbook's 1900 or 1904 date system.
fn workbook_datetime_cell(dt: &ExcelDateTime) -> Cell {
    let duration = if dt.is_duration() {
        dt.as_duration()
    } else {
        None
    };
    excel_datetime_cell(dt.as_f64(), duration, dt.as_datetime())
}

fn excel_datetime_cell(
    serial: f64,
    duration: Option<Duration>,
    datetime: Option<NaiveDateTime>,
) -> Cell {
    if let Some(duration) = duration {
        return Cell::Time(duration.num_milliseconds() as f64 / 1000.0);
    }
    // Serials below one day carry no date part: a bare time-of-day cell.
    if (0.0..1.0).contains(&serial) {
        return Cell::Time(serial * 86_400.0);
    }
    datetime.map(Cell::DateTime).unwrap_or(Cell::Number(serial))
}

fn read_csv(input: &[u8]) -> Result<RawTable, JaError> {
    let input = input.strip_prefix(UTF8_BOM).unwrap_or(input);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(sniff_delimiter(input))
        .from_reader(input);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| JaError::Format(format!("malformed CSV: {}", e)))?;
        rows.push(record.iter().map(Cell::text).collect());
    }
    Ok(RawTable::new(rows))
}

/// Pick the delimiter that occurs most in the first lines of the file.
fn sniff_delimiter(input: &[u8]) -> u8 {
    let head = String::from_utf8_lossy(&input[..input.len().min(4096)]);
    let mut best = (b',', 0usize);
    for candidate in [b',', b';', b'\t'] {
        let count = head
            .lines()
            .take(20)
            .map(|line| line.bytes().filter(|&b| b == candidate).count())
            .sum::<usize>();
        if count > best.1 {
            best = (candidate, count);
        }
    }
    best.0
}

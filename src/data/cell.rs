//! Cell Module
//! Scalar spreadsheet values and their mapping to and from Polars columns.

use calamine::Data;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use polars::prelude::*;
use std::fmt;

/// Days from 0001-01-01 to 1970-01-01.
const UNIX_EPOCH_CE_DAYS: i32 = 719_163;
/// Days from 0001-01-01 to 1899-12-30, the Excel serial date epoch.
const EXCEL_EPOCH_CE_DAYS: i32 = 693_594;
const MS_PER_DAY: i64 = 86_400_000;

/// A single spreadsheet value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Cell {
    /// Convert a calamine cell, keeping Excel dates as dates.
    pub fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) if s.is_empty() => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) if dt.is_datetime() => excel_serial_to_datetime(dt.as_f64())
                .map(Cell::from_datetime)
                .unwrap_or(Cell::Empty),
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::DateTimeIso(s) => parse_datetime(s)
                .map(Cell::from_datetime)
                .unwrap_or_else(|| Cell::Text(s.clone())),
            Data::DurationIso(s) => Cell::Text(s.clone()),
        }
    }

    /// Datetimes at midnight collapse to plain dates.
    fn from_datetime(dt: NaiveDateTime) -> Self {
        if dt.time() == NaiveTime::MIN {
            Cell::Date(dt.date())
        } else {
            Cell::DateTime(dt)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Best-effort date interpretation used for date-column coercion.
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::Date(d) => Some(d.and_time(NaiveTime::MIN)),
            Cell::DateTime(dt) => Some(*dt),
            Cell::Number(n) => excel_serial_to_datetime(*n),
            Cell::Text(s) => parse_datetime(s),
            Cell::Empty | Cell::Bool(_) => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Cell::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Column type inferred from the non-empty cells of a sheet column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Text,
    Number,
    Bool,
    Date,
    DateTime,
}

fn infer_kind(cells: &[Cell]) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;

    for cell in cells {
        let cell_kind = match cell {
            Cell::Empty => continue,
            Cell::Text(_) => return ColumnKind::Text,
            Cell::Number(_) => ColumnKind::Number,
            Cell::Bool(_) => ColumnKind::Bool,
            Cell::Date(_) => ColumnKind::Date,
            Cell::DateTime(_) => ColumnKind::DateTime,
        };

        kind = Some(match (kind, cell_kind) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(ColumnKind::Date), ColumnKind::DateTime)
            | (Some(ColumnKind::DateTime), ColumnKind::Date) => ColumnKind::DateTime,
            _ => return ColumnKind::Text,
        });
    }

    kind.unwrap_or(ColumnKind::Text)
}

/// Build a typed Polars column from sheet cells.
pub fn cells_to_column(name: &str, cells: &[Cell]) -> PolarsResult<Column> {
    let column = match infer_kind(cells) {
        ColumnKind::Number => {
            let values: Vec<Option<f64>> = cells
                .iter()
                .map(|c| match c {
                    Cell::Number(n) => Some(*n),
                    _ => None,
                })
                .collect();
            Column::new(name.into(), values)
        }
        ColumnKind::Bool => {
            let values: Vec<Option<bool>> = cells
                .iter()
                .map(|c| match c {
                    Cell::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            Column::new(name.into(), values)
        }
        ColumnKind::Date => {
            let values: Vec<Option<i32>> = cells
                .iter()
                .map(|c| match c {
                    Cell::Date(d) => Some(date_to_days(*d)),
                    _ => None,
                })
                .collect();
            Column::new(name.into(), values).cast(&DataType::Date)?
        }
        ColumnKind::DateTime => {
            let values: Vec<Option<i64>> = cells
                .iter()
                .map(|c| c.to_datetime().map(datetime_to_millis))
                .collect();
            datetime_column(name, values)?
        }
        ColumnKind::Text => {
            let values: Vec<Option<String>> = cells
                .iter()
                .map(|c| if c.is_empty() { None } else { Some(c.to_string()) })
                .collect();
            Column::new(name.into(), values)
        }
    };

    Ok(column)
}

/// Millisecond-precision Datetime column from epoch milliseconds.
pub fn datetime_column(name: &str, millis: Vec<Option<i64>>) -> PolarsResult<Column> {
    Column::new(name.into(), millis).cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
}

/// Read a Polars column back into cells.
pub fn column_cells(column: &Column) -> PolarsResult<Vec<Cell>> {
    let cells = match column.dtype() {
        DataType::String => column
            .str()?
            .into_iter()
            .map(|v| v.map_or(Cell::Empty, |s| Cell::Text(s.to_string())))
            .collect(),
        DataType::Boolean => column
            .bool()?
            .into_iter()
            .map(|v| v.map_or(Cell::Empty, Cell::Bool))
            .collect(),
        DataType::Date => column
            .cast(&DataType::Int32)?
            .i32()?
            .into_iter()
            .map(|v| v.and_then(days_to_date).map_or(Cell::Empty, Cell::Date))
            .collect(),
        DataType::Datetime(_, _) => column
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| v.and_then(millis_to_datetime).map_or(Cell::Empty, Cell::DateTime))
            .collect(),
        dtype if dtype.is_primitive_numeric() => column
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.map_or(Cell::Empty, Cell::Number))
            .collect(),
        DataType::Null => vec![Cell::Empty; column.len()],
        _ => column
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| v.map_or(Cell::Empty, |s| Cell::Text(s.to_string())))
            .collect(),
    };

    Ok(cells)
}

pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_CE_DAYS
}

pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_CE_DAYS)
}

pub fn datetime_to_millis(dt: NaiveDateTime) -> i64 {
    dt.and_utc().timestamp_millis()
}

pub fn millis_to_datetime(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

/// Convert an Excel serial date (1899-12-30 epoch) to a datetime.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let total_ms = (serial * MS_PER_DAY as f64).round() as i64;
    let days = i32::try_from(total_ms.div_euclid(MS_PER_DAY)).ok()?;
    let ms_of_day = total_ms.rem_euclid(MS_PER_DAY);

    let date = NaiveDate::from_num_days_from_ce_opt(EXCEL_EPOCH_CE_DAYS.checked_add(days)?)?;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(
        (ms_of_day / 1000) as u32,
        ((ms_of_day % 1000) * 1_000_000) as u32,
    )?;
    Some(date.and_time(time))
}

/// Convert a datetime to an Excel serial date.
pub fn datetime_to_excel_serial(dt: NaiveDateTime) -> f64 {
    let days = (dt.date().num_days_from_ce() - EXCEL_EPOCH_CE_DAYS) as f64;
    let time = dt.time();
    let seconds = time.num_seconds_from_midnight() as f64 + time.nanosecond() as f64 / 1e9;
    days + seconds / 86_400.0
}

/// Parse textual dates: ISO first, then month-first, then day-first.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: [&str; 5] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%m/%d/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
    ];
    const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"];

    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

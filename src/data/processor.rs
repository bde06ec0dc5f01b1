//! Data Processor Module
//! Date coercion, range and term filters, provenance tagging and aligned concatenation.

use super::cell::{column_cells, datetime_column, datetime_to_millis, millis_to_datetime, Cell};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("Required column '{0}' not found")]
    MissingColumn(String),
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Trim and upper-case a status term.
pub fn normalize_term(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Handles cleaning and filtering of record tables.
pub struct DataProcessor;

impl DataProcessor {
    /// Look up a column that the pipeline cannot run without.
    pub fn require_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, ProcessorError> {
        df.column(name)
            .map_err(|_| ProcessorError::MissingColumn(name.to_string()))
    }

    /// Replace `column` with a millisecond Datetime column; unparsable values become null.
    pub fn coerce_dates(df: &DataFrame, column: &str) -> Result<DataFrame, ProcessorError> {
        let cells = column_cells(Self::require_column(df, column)?)?;
        let millis: Vec<Option<i64>> = cells
            .iter()
            .map(|c| c.to_datetime().map(datetime_to_millis))
            .collect();

        let unparsed = cells
            .iter()
            .zip(&millis)
            .filter(|(cell, ms)| !cell.is_empty() && ms.is_none())
            .count();
        if unparsed > 0 {
            log::debug!("{} values in {} could not be read as dates", unparsed, column);
        }

        let mut out = df.clone();
        out.with_column(datetime_column(column, millis)?)?;
        Ok(out)
    }

    /// Calendar dates of a coerced date column, nulls kept as `None`.
    fn calendar_dates(df: &DataFrame, column: &str) -> Result<Vec<Option<NaiveDate>>, ProcessorError> {
        let millis = Self::require_column(df, column)?.cast(&DataType::Int64)?;
        let dates = millis
            .i64()?
            .into_iter()
            .map(|ms| ms.and_then(millis_to_datetime).map(|dt| dt.date()))
            .collect();
        Ok(dates)
    }

    /// Earliest and latest date found in `column` across all frames.
    pub fn date_bounds(frames: &[&DataFrame], column: &str) -> Result<Option<DateRange>, ProcessorError> {
        let mut bounds: Option<DateRange> = None;

        for df in frames {
            let coerced = Self::coerce_dates(df, column)?;
            for date in Self::calendar_dates(&coerced, column)?.into_iter().flatten() {
                bounds = Some(match bounds {
                    None => DateRange::new(date, date),
                    Some(b) => DateRange::new(b.start.min(date), b.end.max(date)),
                });
            }
        }

        Ok(bounds)
    }

    /// Keep rows whose date in `column` falls inside `range`; null dates are dropped.
    pub fn filter_by_date(
        df: &DataFrame,
        column: &str,
        range: &DateRange,
    ) -> Result<DataFrame, ProcessorError> {
        let coerced = Self::coerce_dates(df, column)?;
        let mask: Vec<bool> = Self::calendar_dates(&coerced, column)?
            .into_iter()
            .map(|d| d.is_some_and(|d| range.contains(d)))
            .collect();

        let filtered = coerced.filter(&BooleanChunked::from_slice("mask".into(), &mask))?;
        Ok(filtered)
    }

    /// Rewrite `column` as trimmed, upper-cased text.
    pub fn normalize_terms(df: &DataFrame, column: &str) -> Result<DataFrame, ProcessorError> {
        let text = Self::require_column(df, column)?.cast(&DataType::String)?;
        let normalized: Vec<Option<String>> = text
            .str()?
            .into_iter()
            .map(|v| v.map(normalize_term))
            .collect();

        let mut out = df.clone();
        out.with_column(Column::new(column.into(), normalized))?;
        Ok(out)
    }

    /// Keep rows whose already-normalized `column` equals `term`.
    pub fn filter_by_term(
        df: &DataFrame,
        column: &str,
        term: &str,
    ) -> Result<DataFrame, ProcessorError> {
        Self::require_column(df, column)?;
        let filtered = df
            .clone()
            .lazy()
            .filter(col(column).eq(lit(term)))
            .collect()?;
        Ok(filtered)
    }

    /// Set `column` to `label` on every row.
    pub fn tag(df: &DataFrame, column: &str, label: &str) -> Result<DataFrame, ProcessorError> {
        let mut out = df.clone();
        out.with_column(Column::new(column.into(), vec![label; df.height()]))?;
        Ok(out)
    }

    /// Append frames row-wise, aligning columns by name.
    ///
    /// Columns missing from a frame are filled with nulls; columns whose types
    /// disagree between frames are merged as text.
    pub fn concat(frames: &[DataFrame]) -> Result<DataFrame, ProcessorError> {
        let mut names: Vec<String> = Vec::new();
        for df in frames {
            for name in df.get_column_names() {
                if !names.iter().any(|n| n == name.as_str()) {
                    names.push(name.to_string());
                }
            }
        }

        let mut columns: Vec<Column> = Vec::with_capacity(names.len());
        for name in &names {
            let target = Self::common_dtype(frames, name);
            let mut merged: Option<Series> = None;

            for df in frames {
                let part = match df.column(name) {
                    Ok(c) if c.null_count() < c.len() => {
                        if target == DataType::String && c.dtype() != &target {
                            Self::text_series(c)?
                        } else {
                            c.as_materialized_series().cast(&target)?
                        }
                    }
                    Ok(c) => Series::full_null(name.as_str().into(), c.len(), &target),
                    Err(_) => Series::full_null(name.as_str().into(), df.height(), &target),
                };

                match merged.as_mut() {
                    Some(acc) => {
                        acc.append(&part)?;
                    }
                    None => merged = Some(part),
                }
            }

            if let Some(series) = merged {
                columns.push(series.into());
            }
        }

        Ok(DataFrame::new(columns)?)
    }

    /// Render a column as text the way sheet cells display it.
    fn text_series(column: &Column) -> Result<Series, ProcessorError> {
        let values: Vec<Option<String>> = column_cells(column)?
            .iter()
            .map(|c| if c.is_empty() { None } else { Some(c.to_string()) })
            .collect();
        Ok(Series::new(column.name().clone(), values))
    }

    /// Shared dtype of a column across frames, ignoring all-null parts.
    fn common_dtype(frames: &[DataFrame], name: &str) -> DataType {
        let present: Vec<&Column> = frames.iter().filter_map(|df| df.column(name).ok()).collect();
        let typed: Vec<&DataType> = present
            .iter()
            .filter(|c| c.null_count() < c.len())
            .map(|c| c.dtype())
            .collect();

        match typed.first() {
            Some(first) if typed.iter().all(|d| d == first) => (*first).clone(),
            Some(_) => DataType::String,
            None => present
                .first()
                .map(|c| c.dtype().clone())
                .filter(|d| d != &DataType::Null)
                .unwrap_or(DataType::String),
        }
    }

    /// Add each missing column filled with empty strings; existing columns are untouched.
    pub fn ensure_columns(df: &DataFrame, names: &[String]) -> Result<DataFrame, ProcessorError> {
        let mut out = df.clone();
        for name in names {
            if out.column(name).is_err() {
                let height = out.height();
                out.with_column(Column::new(name.as_str().into(), vec![""; height]))?;
            }
        }
        Ok(out)
    }

    /// Distinct non-null values of `column`, in first-seen order.
    pub fn distinct_values(df: &DataFrame, column: &str) -> Result<Vec<Cell>, ProcessorError> {
        let mut values: Vec<Cell> = Vec::new();
        for cell in column_cells(Self::require_column(df, column)?)? {
            if !cell.is_empty() && !values.contains(&cell) {
                values.push(cell);
            }
        }
        Ok(values)
    }

    /// Rows whose `column` holds exactly `value`.
    pub fn filter_by_value(
        df: &DataFrame,
        column: &str,
        value: &Cell,
    ) -> Result<DataFrame, ProcessorError> {
        let mask: Vec<bool> = column_cells(Self::require_column(df, column)?)?
            .iter()
            .map(|c| c == value)
            .collect();

        let filtered = df.filter(&BooleanChunked::from_slice("mask".into(), &mask))?;
        Ok(filtered)
    }
}

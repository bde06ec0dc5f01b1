//! Workbook Loader Module
//! Reads named sheets of an uploaded .xlsx into Polars DataFrames.

use super::cell::{cells_to_column, Cell};
use calamine::{Data, Range, Reader, Xlsx, XlsxError};
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Failed to read {label} workbook: {source}")]
    Io {
        label: String,
        source: std::io::Error,
    },
    #[error("Failed to open {label} workbook: {source}")]
    Workbook { label: String, source: XlsxError },
    #[error("The {label} workbook must contain sheets {}", .required.join(" and "))]
    MissingPartitions { label: String, required: Vec<String> },
    #[error("Failed to read sheet {sheet}: {source}")]
    Sheet { sheet: String, source: XlsxError },
    #[error("Failed to build table: {0}")]
    Polars(#[from] PolarsError),
}

/// An uploaded workbook held in memory.
pub struct WorkbookSource {
    label: String,
    workbook: Xlsx<Cursor<Vec<u8>>>,
}

impl WorkbookSource {
    /// Open a workbook from raw upload bytes.
    pub fn from_bytes(label: &str, bytes: Vec<u8>) -> Result<Self, LoaderError> {
        let workbook = Xlsx::new(Cursor::new(bytes)).map_err(|source| LoaderError::Workbook {
            label: label.to_string(),
            source,
        })?;

        Ok(Self {
            label: label.to_string(),
            workbook,
        })
    }

    /// Read a workbook file fully into memory and open it.
    pub fn open(label: &str, path: &Path) -> Result<Self, LoaderError> {
        let bytes = fs::read(path).map_err(|source| LoaderError::Io {
            label: label.to_string(),
            source,
        })?;
        log::debug!("Read {} bytes from {}", bytes.len(), path.display());
        Self::from_bytes(label, bytes)
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names()
    }

    /// Load two required sheets; fails before reading anything if either is absent.
    pub fn load_partitions(
        &mut self,
        first: &str,
        second: &str,
    ) -> Result<(DataFrame, DataFrame), LoaderError> {
        let names = self.sheet_names();
        if !names.iter().any(|n| n == first) || !names.iter().any(|n| n == second) {
            return Err(LoaderError::MissingPartitions {
                label: self.label.clone(),
                required: vec![first.to_string(), second.to_string()],
            });
        }

        let first_df = self.load_sheet(first)?;
        let second_df = self.load_sheet(second)?;
        Ok((first_df, second_df))
    }

    /// Load a single sheet as a DataFrame.
    pub fn load_sheet(&mut self, sheet: &str) -> Result<DataFrame, LoaderError> {
        let range = self
            .workbook
            .worksheet_range(sheet)
            .map_err(|source| LoaderError::Sheet {
                sheet: sheet.to_string(),
                source,
            })?;

        let df = range_to_dataframe(&range)?;
        log::info!(
            "Loaded {}/{}: {} rows x {} columns",
            self.label,
            sheet,
            df.height(),
            df.width()
        );
        Ok(df)
    }
}

/// Convert a sheet range to a DataFrame, using the first row as the header.
fn range_to_dataframe(range: &Range<Data>) -> Result<DataFrame, LoaderError> {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(DataFrame::empty());
    };

    let names = header_names(header);
    let mut columns: Vec<Vec<Cell>> = vec![Vec::new(); names.len()];

    for row in rows {
        let cells: Vec<Cell> = (0..names.len())
            .map(|i| row.get(i).map(Cell::from_data).unwrap_or(Cell::Empty))
            .collect();

        // Blank rows carry no record
        if cells.iter().all(Cell::is_empty) {
            continue;
        }

        for (column, cell) in columns.iter_mut().zip(cells) {
            column.push(cell);
        }
    }

    let columns = names
        .iter()
        .zip(&columns)
        .map(|(name, cells)| cells_to_column(name, cells))
        .collect::<PolarsResult<Vec<_>>>()?;

    Ok(DataFrame::new(columns)?)
}

/// Header labels with blanks named by position and duplicates suffixed `.1`, `.2`...
///
/// A suffixed name never repeats a label already in the header.
fn header_names(header: &[Data]) -> Vec<String> {
    let bases: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(i, data)| {
            let raw = Cell::from_data(data).to_string().trim().to_string();
            if raw.is_empty() {
                format!("Unnamed: {}", i)
            } else {
                raw
            }
        })
        .collect();

    let mut taken: HashSet<String> = HashSet::new();
    let mut counters: HashMap<&str, usize> = HashMap::new();
    let mut names = Vec::with_capacity(bases.len());

    for base in &bases {
        let mut name = base.clone();
        while taken.contains(&name) {
            let count = counters.entry(base.as_str()).or_insert(0);
            *count += 1;
            name = format!("{}.{}", base, count);
        }
        taken.insert(name.clone());
        names.push(name);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn workbook_bytes(sheets: &[&str]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        for name in sheets {
            let ws = workbook.add_worksheet();
            ws.set_name(*name).unwrap();
            ws.write_string(0, 0, "ID").unwrap();
            ws.write_string(0, 1, "ESTADO").unwrap();
            ws.write_string(0, 3, "ESTADO").unwrap();
            ws.write_number(1, 0, 10.0).unwrap();
            ws.write_string(1, 1, "PENDIENTE").unwrap();
            ws.write_number(3, 0, 11.0).unwrap();
        }
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_load_partitions() {
        let mut source = WorkbookSource::from_bytes("General", workbook_bytes(&["DTO", "PCL"])).unwrap();

        let (dto, pcl) = source.load_partitions("DTO", "PCL").unwrap();
        assert_eq!(dto.height(), 2);
        assert_eq!(pcl.height(), 2);

        let names: Vec<String> = dto.get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["ID", "ESTADO", "Unnamed: 2", "ESTADO.1"]);

        assert_eq!(dto.column("ID").unwrap().dtype(), &DataType::Float64);
        assert_eq!(dto.column("ESTADO").unwrap().null_count(), 1);
    }

    #[test]
    fn test_header_suffixes_skip_existing_labels() {
        let header = [
            Data::String("A".into()),
            Data::String("A.1".into()),
            Data::String("A".into()),
            Data::Empty,
            Data::String("A".into()),
        ];
        assert_eq!(header_names(&header), vec!["A", "A.1", "A.2", "Unnamed: 3", "A.3"]);
    }

    #[test]
    fn test_missing_partition_is_reported() {
        let mut source = WorkbookSource::from_bytes("Courier", workbook_bytes(&["COURIER"])).unwrap();
        let err = source.load_partitions("COURIER", "MENSAJERO").unwrap_err();

        assert!(matches!(err, LoaderError::MissingPartitions { .. }));
        assert_eq!(
            err.to_string(),
            "The Courier workbook must contain sheets COURIER and MENSAJERO"
        );
    }

    #[test]
    fn test_invalid_bytes_are_rejected() {
        let result = WorkbookSource::from_bytes("General", b"not a workbook".to_vec());
        assert!(matches!(result, Err(LoaderError::Workbook { .. })));
    }
}

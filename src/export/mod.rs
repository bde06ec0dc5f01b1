//! Export module - spreadsheet encoding and download artifacts

mod sheet_names;
mod xlsx;

pub use sheet_names::SheetNamer;
pub use xlsx::{encode_workbook, NamedTable};

use polars::prelude::*;
use rust_xlsxwriter::XlsxError;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// MIME type offered with every produced workbook.
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Spreadsheet writer error: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
    #[error("Table has too many columns for a sheet: {0}")]
    TooManyColumns(usize),
    #[error("Table has too many rows for a sheet: {0}")]
    TooManyRows(usize),
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// An encoded workbook ready to be handed to the user.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn xlsx(file_name: &str, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            mime: XLSX_MIME,
            bytes,
        }
    }

    /// Write the buffer under `dir` using its fixed file name.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let path = dir.join(&self.file_name);
        fs::write(&path, &self.bytes).map_err(|source| ExportError::Io {
            path: path.display().to_string(),
            source,
        })?;
        log::info!("Wrote {} ({} bytes)", path.display(), self.bytes.len());
        Ok(path)
    }
}

/// Dump a table as CSV for inspection outside the tool.
pub fn write_csv(df: &DataFrame, path: &Path) -> Result<(), ExportError> {
    let mut file = File::create(path).map_err(|source| ExportError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut df = df.clone();
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_artifact_write_to_dir() {
        let dir = TempDir::new().unwrap();
        let artifact = Artifact::xlsx("general.xlsx", vec![1, 2, 3]);

        let path = artifact.write_to(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("general.xlsx"));
        assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3]);
        assert_eq!(artifact.mime, XLSX_MIME);
    }

    #[test]
    fn test_write_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("working.csv");
        let df = df!("ID" => &["A1", "A2"], "DIAS" => &[1i64, 2]).unwrap();

        write_csv(&df, &path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().next(), Some("ID,DIAS"));
        assert_eq!(content.lines().count(), 3);
    }
}

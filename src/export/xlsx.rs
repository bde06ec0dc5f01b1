//! Spreadsheet Encoder Module
//! Writes named DataFrames into a single in-memory .xlsx buffer, one sheet per table.

use super::ExportError;
use crate::data::{column_cells, datetime_to_excel_serial, Cell};
use chrono::NaiveTime;
use polars::prelude::*;
use rust_xlsxwriter::{Format, Workbook, Worksheet};

/// A table destined for its own sheet.
#[derive(Debug, Clone)]
pub struct NamedTable {
    pub sheet: String,
    pub df: DataFrame,
}

impl NamedTable {
    pub fn new(sheet: impl Into<String>, df: DataFrame) -> Self {
        Self {
            sheet: sheet.into(),
            df,
        }
    }
}

/// Encode tables into one workbook; column order and row order are preserved.
pub fn encode_workbook(tables: &[NamedTable]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let formats = CellFormats::new();

    for table in tables {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&table.sheet)?;
        write_table(worksheet, &table.df, &formats)?;
        log::debug!(
            "Encoded sheet '{}' ({} rows x {} columns)",
            table.sheet,
            table.df.height(),
            table.df.width()
        );
    }

    Ok(workbook.save_to_buffer()?)
}

struct CellFormats {
    date: Format,
    datetime: Format,
}

impl CellFormats {
    fn new() -> Self {
        Self {
            date: Format::new().set_num_format("yyyy-mm-dd"),
            datetime: Format::new().set_num_format("yyyy-mm-dd hh:mm:ss"),
        }
    }
}

fn write_table(ws: &mut Worksheet, df: &DataFrame, formats: &CellFormats) -> Result<(), ExportError> {
    for (col_idx, column) in df.get_columns().iter().enumerate() {
        let col = u16::try_from(col_idx).map_err(|_| ExportError::TooManyColumns(df.width()))?;
        ws.write_string(0, col, column.name().as_str())?;

        for (row_idx, cell) in column_cells(column)?.iter().enumerate() {
            let row = u32::try_from(row_idx + 1).map_err(|_| ExportError::TooManyRows(df.height()))?;
            write_cell(ws, row, col, cell, formats)?;
        }
    }
    Ok(())
}

fn write_cell(
    ws: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &Cell,
    formats: &CellFormats,
) -> Result<(), ExportError> {
    match cell {
        Cell::Empty => { /* Leave cell empty */ }
        Cell::Text(s) => {
            ws.write_string(row, col, s)?;
        }
        Cell::Number(n) => {
            ws.write_number(row, col, *n)?;
        }
        Cell::Bool(b) => {
            ws.write_boolean(row, col, *b)?;
        }
        Cell::Date(d) => {
            let serial = datetime_to_excel_serial(d.and_time(NaiveTime::MIN));
            ws.write_number_with_format(row, col, serial, &formats.date)?;
        }
        Cell::DateTime(dt) => {
            let serial = datetime_to_excel_serial(*dt);
            ws.write_number_with_format(row, col, serial, &formats.datetime)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataProcessor, WorkbookSource};
    use crate::export::SheetNamer;
    use chrono::NaiveDate;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_round_trip_preserves_columns_and_rows() {
        let dto = df!(
            "ID_FURAT_FUREP" => &["A1", "A2", "A3"],
            "DIAS" => &[Some(3.0), None, Some(12.5)],
            "ACTIVO" => &[true, false, true],
            "TERMINOS" => &[Some("FUERA DE TERMINOS"), Some("EN TERMINOS"), None],
            "FECHA_VISADO" => &["2024-01-02", "2024-03-04 10:30:00", "sin fecha"]
        )
        .unwrap();
        let dto = DataProcessor::coerce_dates(&dto, "FECHA_VISADO").unwrap();
        let pcl = df!("ID_FURAT_FUREP" => &["B1"], "NOTA" => &["ok"]).unwrap();

        let bytes = encode_workbook(&[
            NamedTable::new("DTO", dto.clone()),
            NamedTable::new("PCL", pcl.clone()),
        ])
        .unwrap();

        let mut source = WorkbookSource::from_bytes("round trip", bytes).unwrap();
        assert_eq!(source.sheet_names(), vec!["DTO", "PCL"]);
        let (dto_back, pcl_back) = source.load_partitions("DTO", "PCL").unwrap();

        assert_eq!(dto_back.get_column_names(), dto.get_column_names());
        assert_eq!(pcl_back.get_column_names(), pcl.get_column_names());
        assert_eq!(dto_back.height(), 3);

        for name in ["ID_FURAT_FUREP", "DIAS", "ACTIVO", "TERMINOS"] {
            assert_eq!(
                column_cells(dto_back.column(name).unwrap()).unwrap(),
                column_cells(dto.column(name).unwrap()).unwrap(),
                "column {name}"
            );
        }

        let dates = column_cells(dto_back.column("FECHA_VISADO").unwrap()).unwrap();
        assert_eq!(dates[0].to_datetime().unwrap(), ymd(2024, 1, 2).and_time(NaiveTime::MIN));
        assert_eq!(
            dates[1].to_datetime().unwrap(),
            ymd(2024, 3, 4).and_hms_opt(10, 30, 0).unwrap()
        );
        assert_eq!(dates[2], Cell::Empty);
    }

    #[test]
    fn test_assigned_sheet_names_are_accepted() {
        let mut namer = SheetNamer::new();
        let tables: Vec<NamedTable> = [
            "ABCDEFGHIJKLMNOPQRSTUVWXYZABCD'EFG",
            "ABCDEFGHIJKLMNOPQRSTUVWXYZABCD'EFH",
            "'MENSAJERIA [NORTE]'",
        ]
        .iter()
        .map(|raw| NamedTable::new(namer.assign(raw), df!("ID" => &["A1"]).unwrap()))
        .collect();

        let bytes = encode_workbook(&tables).unwrap();
        let source = WorkbookSource::from_bytes("names", bytes).unwrap();
        assert_eq!(
            source.sheet_names(),
            vec![
                "ABCDEFGHIJKLMNOPQRSTUVWXYZABCD",
                "ABCDEFGHIJKLMNOPQRSTUVWXYZA (2)",
                "MENSAJERIA _NORTE_",
            ]
        );
    }

    #[test]
    fn test_header_only_sheet_is_valid() {
        let empty = df!("ID" => Vec::<String>::new(), "FECHA" => Vec::<String>::new()).unwrap();
        let bytes = encode_workbook(&[NamedTable::new("DTO", empty)]).unwrap();

        let mut source = WorkbookSource::from_bytes("empty", bytes).unwrap();
        let back = source.load_sheet("DTO").unwrap();
        assert_eq!(back.height(), 0);
        assert_eq!(back.width(), 2);
    }
}

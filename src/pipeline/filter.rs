//! Date/Term Filter Pipeline
//! Filters the DTO and PCL partitions by visa date, then by out-of-term status.

use super::{GeneralTables, PipelineError};
use crate::config::Settings;
use crate::data::{DataProcessor, DateRange};
use crate::export::{encode_workbook, Artifact, NamedTable};
use polars::prelude::*;
use serde::Serialize;

/// Row counts for one partition through the filter stages.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionCounts {
    pub partition: String,
    pub loaded: usize,
    pub date_filtered: usize,
    pub term_filtered: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterReport {
    pub range: DateRange,
    pub term: String,
    pub partitions: Vec<PartitionCounts>,
}

/// Result of a completed filter run: two workbooks, always produced together.
#[derive(Debug)]
pub struct FilterRun {
    pub report: FilterReport,
    pub date_filtered: Artifact,
    pub term_filtered: Artifact,
}

/// Either a finished run or the idle state awaiting a date range.
#[derive(Debug)]
pub enum FilterOutcome {
    Idle { available: Option<DateRange> },
    Completed(FilterRun),
}

/// Earliest and latest visa date across both partitions, used as the default range.
pub fn available_range(tables: &GeneralTables, settings: &Settings) -> Result<Option<DateRange>, PipelineError> {
    let bounds = DataProcessor::date_bounds(&[&tables.dto, &tables.pcl], &settings.columns.visa_date)?;
    Ok(bounds)
}

/// Run the date/term filter; without a range nothing runs.
pub fn run_filter(
    tables: &GeneralTables,
    range: Option<DateRange>,
    settings: &Settings,
) -> Result<FilterOutcome, PipelineError> {
    let Some(range) = range else {
        return Ok(FilterOutcome::Idle {
            available: available_range(tables, settings)?,
        });
    };

    let date_col = settings.columns.visa_date.as_str();
    let terms_col = settings.columns.terms.as_str();
    let term = settings.terms.out_of_term.as_str();

    let mut date_sheets: Vec<NamedTable> = Vec::with_capacity(2);
    let mut term_sheets: Vec<NamedTable> = Vec::with_capacity(2);
    let mut counts: Vec<PartitionCounts> = Vec::with_capacity(2);

    for (name, df) in tables.partitions(settings) {
        let (by_date, by_term) = filter_partition(df, date_col, terms_col, term, &range)?;
        log::info!(
            "{}: {} rows -> {} in range -> {} {}",
            name,
            df.height(),
            by_date.height(),
            by_term.height(),
            term
        );

        counts.push(PartitionCounts {
            partition: name.to_string(),
            loaded: df.height(),
            date_filtered: by_date.height(),
            term_filtered: by_term.height(),
        });
        date_sheets.push(NamedTable::new(name, by_date));
        term_sheets.push(NamedTable::new(name, by_term));
    }

    Ok(FilterOutcome::Completed(FilterRun {
        report: FilterReport {
            range,
            term: term.to_string(),
            partitions: counts,
        },
        date_filtered: Artifact::xlsx(&settings.outputs.date_filtered, encode_workbook(&date_sheets)?),
        term_filtered: Artifact::xlsx(
            &settings.outputs.date_term_filtered,
            encode_workbook(&term_sheets)?,
        ),
    }))
}

/// Date-filter one partition, normalize its terms, and derive the term-filtered subset.
fn filter_partition(
    df: &DataFrame,
    date_col: &str,
    terms_col: &str,
    term: &str,
    range: &DateRange,
) -> Result<(DataFrame, DataFrame), PipelineError> {
    let by_date = DataProcessor::filter_by_date(df, date_col, range)?;
    let by_date = DataProcessor::normalize_terms(&by_date, terms_col)?;
    let by_term = DataProcessor::filter_by_term(&by_date, terms_col, term)?;
    Ok((by_date, by_term))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{column_cells, Cell, WorkbookSource};
    use chrono::NaiveDate;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tables() -> GeneralTables {
        GeneralTables {
            dto: df!(
                "ID_FURAT_FUREP" => &["D1", "D2", "D3", "D4"],
                "FECHA_VISADO" => &[Some("2024-03-01"), Some("2024-03-10"), Some("fecha mala"), Some("2024-04-02")],
                "TERMINOS" => &[" fuera de terminos", "EN TERMINOS", "FUERA DE TERMINOS", "Fuera de Terminos "]
            )
            .unwrap(),
            pcl: df!(
                "ID_FURAT_FUREP" => &["P1", "P2"],
                "FECHA_VISADO" => &["2024-03-31", "2024-02-28"],
                "TERMINOS" => &["EN TERMINOS", "FUERA DE TERMINOS"]
            )
            .unwrap(),
        }
    }

    fn read_back(artifact: &Artifact) -> (DataFrame, DataFrame) {
        let mut source = WorkbookSource::from_bytes("output", artifact.bytes.clone()).unwrap();
        assert_eq!(source.sheet_names(), vec!["DTO", "PCL"]);
        source.load_partitions("DTO", "PCL").unwrap()
    }

    #[test]
    fn test_idle_without_range_reports_available_dates() {
        let outcome = run_filter(&tables(), None, &Settings::default()).unwrap();
        match outcome {
            FilterOutcome::Idle { available } => {
                assert_eq!(available, Some(DateRange::new(ymd(2024, 2, 28), ymd(2024, 4, 2))));
            }
            FilterOutcome::Completed(_) => panic!("expected idle state"),
        }
    }

    #[test]
    fn test_filter_produces_both_variants() {
        let range = DateRange::new(ymd(2024, 3, 1), ymd(2024, 3, 31));
        let FilterOutcome::Completed(run) = run_filter(&tables(), Some(range), &Settings::default()).unwrap() else {
            panic!("expected a completed run");
        };

        assert_eq!(run.date_filtered.file_name, "general.xlsx");
        assert_eq!(run.term_filtered.file_name, "filtrado_fechas_fuera_termino.xlsx");

        let dto = &run.report.partitions[0];
        assert_eq!((dto.loaded, dto.date_filtered, dto.term_filtered), (4, 2, 1));
        let pcl = &run.report.partitions[1];
        assert_eq!((pcl.loaded, pcl.date_filtered, pcl.term_filtered), (2, 1, 0));

        let (dto_dates, pcl_dates) = read_back(&run.date_filtered);
        assert_eq!(dto_dates.height(), 2);
        assert_eq!(pcl_dates.height(), 1);
        for cell in column_cells(dto_dates.column("FECHA_VISADO").unwrap()).unwrap() {
            let date = cell.to_datetime().unwrap().date();
            assert!(range.contains(date));
        }

        let (dto_terms, pcl_terms) = read_back(&run.term_filtered);
        assert_eq!(
            column_cells(dto_terms.column("ID_FURAT_FUREP").unwrap()).unwrap(),
            vec![Cell::Text("D1".into())]
        );
        // An empty result still yields a header-only sheet.
        assert_eq!(pcl_terms.height(), 0);
        assert_eq!(pcl_terms.width(), 3);
    }

    #[test]
    fn test_term_variant_is_subset_of_date_variant() {
        let range = DateRange::new(ymd(2024, 1, 1), ymd(2024, 12, 31));
        let FilterOutcome::Completed(run) = run_filter(&tables(), Some(range), &Settings::default()).unwrap() else {
            panic!("expected a completed run");
        };

        let (dto_dates, _) = read_back(&run.date_filtered);
        let (dto_terms, _) = read_back(&run.term_filtered);
        let date_ids = column_cells(dto_dates.column("ID_FURAT_FUREP").unwrap()).unwrap();
        let term_ids = column_cells(dto_terms.column("ID_FURAT_FUREP").unwrap()).unwrap();

        assert_eq!(term_ids, vec![Cell::Text("D1".into()), Cell::Text("D4".into())]);
        assert!(term_ids.iter().all(|id| date_ids.contains(id)));

        // Terms are written normalized in both variants.
        let terms = column_cells(dto_dates.column("TERMINOS").unwrap()).unwrap();
        assert_eq!(terms[0], Cell::Text("FUERA DE TERMINOS".into()));
    }

    #[test]
    fn test_missing_terms_column_is_error() {
        let mut tables = tables();
        tables.pcl = tables.pcl.drop("TERMINOS").unwrap();
        let range = DateRange::new(ymd(2024, 1, 1), ymd(2024, 12, 31));

        let err = run_filter(&tables, Some(range), &Settings::default()).unwrap_err();
        assert_eq!(err.to_string(), "Required column 'TERMINOS' not found");
    }
}

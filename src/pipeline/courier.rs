//! Courier Cross-Reference Pipeline
//! Tags and merges the partitions, flags matched pending reports, and exports
//! out-of-term rows with one sheet per notifier.

use super::matching::{key_set, IdKey};
use super::{CourierTables, GeneralTables, PipelineError};
use crate::config::{ExportLayout, Settings};
use crate::data::{column_cells, Cell, DataProcessor};
use crate::export::{encode_workbook, Artifact, NamedTable, SheetNamer};
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashSet;

/// One exported notifier sheet.
#[derive(Debug, Clone, Serialize)]
pub struct SheetSummary {
    pub notifier: String,
    pub sheet: String,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourierReport {
    pub general_rows: usize,
    pub courier_rows: usize,
    pub matched_ids: usize,
    pub updated_rows: usize,
    pub export_rows: usize,
    pub sheets: Vec<SheetSummary>,
}

/// Result of a cross-reference run.
#[derive(Debug)]
pub struct CourierRun {
    /// Every general row after the status rewrite and annotation columns.
    pub working: DataFrame,
    pub report: CourierReport,
    /// `None` when no out-of-term row has a notifier: nothing to export.
    pub export: Option<Artifact>,
}

/// Run the cross-reference between the general and courier datasets.
pub fn run_courier(
    general: &GeneralTables,
    courier: &CourierTables,
    settings: &Settings,
) -> Result<CourierRun, PipelineError> {
    let columns = &settings.columns;

    // Tag & merge
    let tagged: Vec<DataFrame> = general
        .partitions(settings)
        .into_iter()
        .map(|(name, df)| DataProcessor::tag(df, &columns.classification, name))
        .collect::<Result<_, _>>()?;
    let base_general = DataProcessor::concat(&tagged)?;
    let base_courier = DataProcessor::concat(&[courier.courier.clone(), courier.messenger.clone()])?;

    // Cross-reference on the partitions' own cells; the merged column may have been unified to text
    let general_frames: Vec<&DataFrame> = tagged.iter().collect();
    let general_ids = raw_cells(&general_frames, &base_general, &columns.general_id)?;
    let courier_ids = raw_cells(
        &[&courier.courier, &courier.messenger],
        &base_courier,
        &columns.courier_id,
    )?;
    let courier_keys = key_set(&courier_ids, settings.id_matching);
    let matched: HashSet<IdKey> = key_set(&general_ids, settings.id_matching)
        .intersection(&courier_keys)
        .cloned()
        .collect();
    log::info!(
        "{} general rows, {} courier rows, {} matched identifiers",
        base_general.height(),
        base_courier.height(),
        matched.len()
    );

    // Status rewrite and annotation columns
    let (working, updated_rows) = mark_pending_guides(&base_general, &general_ids, &matched, settings)?;
    let working = DataProcessor::ensure_columns(&working, &columns.annotations)?;
    log::info!("{} pending reports marked '{}'", updated_rows, settings.terms.pending_guide);

    // Export filter
    let normalized = DataProcessor::normalize_terms(&working, &columns.terms)?;
    let out_of_term = DataProcessor::filter_by_term(&normalized, &columns.terms, &settings.terms.out_of_term)?;

    let (export, sheets) = if out_of_term.height() == 0 {
        log::info!("No rows with {} = '{}' to export", columns.terms, settings.terms.out_of_term);
        (None, Vec::new())
    } else {
        export_by_notifier(&out_of_term, settings)?
    };

    Ok(CourierRun {
        report: CourierReport {
            general_rows: base_general.height(),
            courier_rows: base_courier.height(),
            matched_ids: matched.len(),
            updated_rows,
            export_rows: out_of_term.height(),
            sheets,
        },
        working,
        export,
    })
}

/// Cells of `column` in merged row order, read from each partition as loaded.
///
/// A partition without the column contributes empty cells, as the merge does.
fn raw_cells(
    partitions: &[&DataFrame],
    merged: &DataFrame,
    column: &str,
) -> Result<Vec<Cell>, PipelineError> {
    DataProcessor::require_column(merged, column)?;

    let mut cells = Vec::with_capacity(merged.height());
    for df in partitions {
        match df.column(column) {
            Ok(c) => cells.extend(column_cells(c)?),
            Err(_) => cells.extend(std::iter::repeat(Cell::Empty).take(df.height())),
        }
    }
    Ok(cells)
}

/// Rewrite the report status of matched rows still pending; returns the rewritten count.
fn mark_pending_guides(
    df: &DataFrame,
    ids: &[Cell],
    matched: &HashSet<IdKey>,
    settings: &Settings,
) -> Result<(DataFrame, usize), PipelineError> {
    let status_col = settings.columns.report_status.as_str();
    let pending = settings.terms.pending.to_uppercase();
    let statuses = column_cells(DataProcessor::require_column(df, status_col)?)?;

    let mut updated = 0;
    let rewritten: Vec<Option<String>> = ids
        .iter()
        .zip(&statuses)
        .map(|(id, status)| match status {
            Cell::Text(s) => {
                let is_matched = IdKey::from_cell(id, settings.id_matching).is_some_and(|k| matched.contains(&k));
                if is_matched && s.to_uppercase() == pending {
                    updated += 1;
                    Some(settings.terms.pending_guide.clone())
                } else {
                    Some(s.clone())
                }
            }
            Cell::Empty => None,
            other => Some(other.to_string()),
        })
        .collect();

    // Only text statuses can match, so a non-text column stays as loaded.
    if updated == 0 {
        return Ok((df.clone(), 0));
    }

    let mut out = df.clone();
    out.with_column(Column::new(status_col.into(), rewritten))?;
    Ok((out, updated))
}

/// One sheet per distinct notifier holding the layout columns, renamed and numbered.
fn export_by_notifier(
    df: &DataFrame,
    settings: &Settings,
) -> Result<(Option<Artifact>, Vec<SheetSummary>), PipelineError> {
    let notifier_col = settings.columns.notifier.as_str();
    let notifiers = DataProcessor::distinct_values(df, notifier_col)?;

    let mut namer = SheetNamer::new();
    let mut tables: Vec<NamedTable> = Vec::with_capacity(notifiers.len());
    let mut sheets: Vec<SheetSummary> = Vec::with_capacity(notifiers.len());

    for notifier in &notifiers {
        let rows = DataProcessor::filter_by_value(df, notifier_col, notifier)?;
        let sheet = namer.assign(&notifier.to_string());
        log::debug!("Sheet '{}': {} rows", sheet, rows.height());

        sheets.push(SheetSummary {
            notifier: notifier.to_string(),
            sheet: sheet.clone(),
            rows: rows.height(),
        });
        tables.push(NamedTable::new(sheet, layout_table(&rows, &settings.export)?));
    }

    if tables.is_empty() {
        log::info!("Out-of-term rows carry no {}; nothing to export", notifier_col);
        return Ok((None, sheets));
    }

    let bytes = encode_workbook(&tables)?;
    Ok((Some(Artifact::xlsx(&settings.outputs.courier_export, bytes)), sheets))
}

/// Select the layout columns present, apply their labels and prepend a 1-based row number.
fn layout_table(df: &DataFrame, layout: &ExportLayout) -> Result<DataFrame, PipelineError> {
    let row_numbers: Vec<u32> = (1..=df.height()).map(|n| n as u32).collect();
    let mut columns = vec![Column::new(layout.row_number_label.as_str().into(), row_numbers)];

    for export_col in &layout.columns {
        if let Ok(column) = df.column(&export_col.source) {
            let mut column = column.clone();
            column.rename(export_col.label.as_str().into());
            columns.push(column);
        }
    }

    Ok(DataFrame::new(columns)?)
}

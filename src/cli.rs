//! Command Line Module
//! Argument parsing, run dispatch and report rendering.

use crate::config::Settings;
use crate::data::{DateRange, WorkbookSource};
use crate::export::{write_csv, Artifact};
use crate::pipeline::{
    available_range, run_courier, run_filter, CourierReport, CourierRun, CourierTables, FilterOutcome,
    FilterReport, GeneralTables,
};
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use polars::prelude::DataFrame;
use serde::Serialize;
use std::{env, fs};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "ans9",
    version,
    about = "Filter ANS9 claims workbooks by cut-off dates and cross-reference them with the courier base."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// TOML file overriding column, sheet and output names.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Report format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Open each written workbook with the system default application.
    #[arg(long, global = true)]
    pub open: bool,

    /// Increase log detail (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Filter the DTO/PCL sheets by visa date, then by out-of-term status.
    Filter {
        /// General workbook with DTO and PCL sheets.
        general: PathBuf,

        /// First visa date to keep (YYYY-MM-DD).
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last visa date to keep, inclusive (YYYY-MM-DD).
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Use the earliest and latest dates found in the workbook as bounds.
        #[arg(long)]
        full_range: bool,

        /// Directory receiving the two workbooks.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Cross-reference the general and courier workbooks and export out-of-term rows per notifier.
    Courier {
        /// General workbook with DTO and PCL sheets.
        general: PathBuf,

        /// Courier workbook with COURIER and MENSAJERO sheets.
        courier: PathBuf,

        /// Directory receiving the export workbook.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// Also write the full working table as CSV.
        #[arg(long, value_name = "PATH")]
        dump_working: Option<PathBuf>,

        /// Rows of the working table to print; --dump-working writes every row.
        #[arg(long, default_value_t = 10)]
        preview: usize,
    },
}

/// Log level implied by the `-v` count.
pub fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

pub fn run(args: Args) -> Result<()> {
    let settings = Settings::load(args.config.as_deref())?;

    match &args.command {
        Command::Filter {
            general,
            start,
            end,
            full_range,
            out_dir,
        } => run_filter_command(&args, &settings, general, (*start, *end), *full_range, out_dir),
        Command::Courier {
            general,
            courier,
            out_dir,
            dump_working,
            preview,
        } => run_courier_command(
            &args,
            &settings,
            general,
            courier,
            out_dir,
            dump_working.as_deref(),
            *preview,
        ),
    }
}

/// A workbook written to disk.
#[derive(Debug, Serialize)]
struct WrittenFile {
    path: String,
    mime: &'static str,
}

#[derive(Debug, Serialize)]
struct JsonFilter<'a> {
    status: &'static str,
    available: Option<DateRange>,
    report: Option<&'a FilterReport>,
    files: Vec<WrittenFile>,
}

#[derive(Debug, Serialize)]
struct JsonCourier<'a> {
    status: &'static str,
    report: &'a CourierReport,
    files: Vec<WrittenFile>,
}

fn run_filter_command(
    args: &Args,
    settings: &Settings,
    general: &Path,
    bounds: (Option<NaiveDate>, Option<NaiveDate>),
    full_range: bool,
    out_dir: &Path,
) -> Result<()> {
    let mut source = WorkbookSource::open("general", general)?;
    let tables = GeneralTables::load(&mut source, settings)?;

    let range = resolve_range(bounds, full_range, || Ok(available_range(&tables, settings)?))?;
    let outcome = run_filter(&tables, range, settings)?;

    match outcome {
        FilterOutcome::Idle { available } => {
            match args.format {
                OutputFormat::Json => print_json(&JsonFilter {
                    status: "idle",
                    available,
                    report: None,
                    files: Vec::new(),
                })?,
                OutputFormat::Text => {
                    match available {
                        Some(r) => println!("Visa dates in workbook: {} - {}", r.start, r.end),
                        None => println!("No valid {} dates found in workbook", settings.columns.visa_date),
                    }
                    println!("Pass --start/--end (or --full-range) to run the filter.");
                }
            }
            Ok(())
        }
        FilterOutcome::Completed(run) => {
            let files = write_artifacts(args, out_dir, &[&run.date_filtered, &run.term_filtered])?;

            match args.format {
                OutputFormat::Json => print_json(&JsonFilter {
                    status: "completed",
                    available: None,
                    report: Some(&run.report),
                    files,
                })?,
                OutputFormat::Text => {
                    println!(
                        "Filter applied for dates: {} - {}",
                        run.report.range.start, run.report.range.end
                    );
                    for counts in &run.report.partitions {
                        println!(
                            "  {}: {} rows, {} in range, {} {}",
                            counts.partition,
                            counts.loaded,
                            counts.date_filtered,
                            counts.term_filtered,
                            run.report.term
                        );
                    }
                    for file in &files {
                        println!("Wrote {}", file.path);
                    }
                }
            }
            Ok(())
        }
    }
}

/// Bounds to run with, or `None` for the idle state when none were requested.
///
/// A missing bound falls back to the matching extreme of the workbook's dates.
fn resolve_range<F>(
    (start, end): (Option<NaiveDate>, Option<NaiveDate>),
    full_range: bool,
    available: F,
) -> Result<Option<DateRange>>
where
    F: FnOnce() -> Result<Option<DateRange>>,
{
    if start.is_none() && end.is_none() && !full_range {
        return Ok(None);
    }

    let (start, end) = match (start, end) {
        (Some(start), Some(end)) => (start, end),
        (start, end) => {
            let Some(data_range) = available()? else {
                bail!("No valid dates in the workbook to default the date range from");
            };
            (start.unwrap_or(data_range.start), end.unwrap_or(data_range.end))
        }
    };

    if start > end {
        log::warn!("Start date {} is after end date {}; no rows will match", start, end);
    }
    Ok(Some(DateRange::new(start, end)))
}

fn run_courier_command(
    args: &Args,
    settings: &Settings,
    general: &Path,
    courier: &Path,
    out_dir: &Path,
    dump_working: Option<&Path>,
    preview: usize,
) -> Result<()> {
    let mut general_source = WorkbookSource::open("general", general)?;
    let general_tables = GeneralTables::load(&mut general_source, settings)?;
    let mut courier_source = WorkbookSource::open("courier", courier)?;
    let courier_tables = CourierTables::load(&mut courier_source, settings)?;

    let run = run_courier(&general_tables, &courier_tables, settings)?;

    if let Some(path) = dump_working {
        write_csv(&run.working, path)
            .with_context(|| format!("Failed to dump working table to {}", path.display()))?;
        log::info!("Working table written to {}", path.display());
    }

    let files = match &run.export {
        Some(artifact) => write_artifacts(args, out_dir, &[artifact])?,
        None => Vec::new(),
    };

    match args.format {
        OutputFormat::Json => print_json(&JsonCourier {
            status: if run.export.is_some() { "exported" } else { "nothing_to_export" },
            report: &run.report,
            files,
        }),
        OutputFormat::Text => {
            print_courier_text(&run, settings, preview, &files);
            Ok(())
        }
    }
}

fn print_courier_text(run: &CourierRun, settings: &Settings, preview: usize, files: &[WrittenFile]) {
    let report = &run.report;
    println!("Matched identifiers: {}", report.matched_ids);
    println!(
        "Reports with {} '{}' updated: {}",
        settings.columns.report_status, settings.terms.pending, report.updated_rows
    );

    if preview > 0 {
        println!("{}", preview_table(&run.working, preview));
    }

    if run.export.is_none() {
        println!(
            "No records with {} = '{}' to export.",
            settings.columns.terms, settings.terms.out_of_term
        );
        return;
    }

    for sheet in &report.sheets {
        println!("  {}: {} rows", sheet.sheet, sheet.rows);
    }
    for file in files {
        println!("Wrote {}", file.path);
    }
}

/// First `rows` rows rendered in full; polars elides rows past its display limit otherwise.
fn preview_table(df: &DataFrame, rows: usize) -> String {
    env::set_var("POLARS_FMT_MAX_ROWS", rows.to_string());
    df.head(Some(rows)).to_string()
}

/// Write artifacts into `out_dir`, opening them afterwards when requested.
fn write_artifacts(args: &Args, out_dir: &Path, artifacts: &[&Artifact]) -> Result<Vec<WrittenFile>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;

    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let path = artifact.write_to(out_dir)?;
        if args.open {
            if let Err(e) = open::that(&path) {
                log::warn!("Could not open {}: {}", path.display(), e);
            }
        }
        written.push(WrittenFile {
            path: path.display().to_string(),
            mime: artifact.mime,
        });
    }
    Ok(written)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn data_range() -> Result<Option<DateRange>> {
        Ok(Some(DateRange::new(ymd(2024, 1, 1), ymd(2024, 6, 30))))
    }

    #[test]
    fn test_no_bounds_is_idle() {
        assert_eq!(resolve_range((None, None), false, data_range).unwrap(), None);
    }

    #[test]
    fn test_full_range_and_partial_bounds_use_data_extremes() {
        assert_eq!(
            resolve_range((None, None), true, data_range).unwrap(),
            Some(DateRange::new(ymd(2024, 1, 1), ymd(2024, 6, 30)))
        );
        assert_eq!(
            resolve_range((Some(ymd(2024, 3, 1)), None), false, data_range).unwrap(),
            Some(DateRange::new(ymd(2024, 3, 1), ymd(2024, 6, 30)))
        );
    }

    #[test]
    fn test_explicit_bounds_skip_data_scan() {
        let range = resolve_range((Some(ymd(2024, 2, 1)), Some(ymd(2024, 2, 29))), false, || {
            panic!("data range should not be needed")
        })
        .unwrap();
        assert_eq!(range, Some(DateRange::new(ymd(2024, 2, 1), ymd(2024, 2, 29))));
    }

    #[test]
    fn test_full_range_without_dates_is_error() {
        let err = resolve_range((None, None), true, || Ok(None)).unwrap_err();
        assert!(err.to_string().contains("No valid dates"));
    }

    #[test]
    fn test_preview_shows_every_requested_row() {
        let ids: Vec<String> = (0..14).map(|i| format!("R{:02}", i)).collect();
        let df = DataFrame::new(vec![polars::prelude::Column::new("ID".into(), ids)]).unwrap();

        let shown = preview_table(&df, 12);
        for i in 0..12 {
            assert!(shown.contains(&format!("R{:02}", i)), "row {i} missing");
        }
        assert!(!shown.contains("R12"));
        assert!(!shown.contains('…'));
    }

    #[test]
    fn test_parse_arguments() {
        let args = Args::try_parse_from([
            "ans9",
            "filter",
            "base.xlsx",
            "--start",
            "2024-01-01",
            "--end",
            "2024-01-31",
            "--format",
            "json",
            "-vv",
        ])
        .unwrap();

        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(log_level(args.verbose), "debug");
        match args.command {
            Command::Filter { start, end, full_range, .. } => {
                assert_eq!(start, Some(ymd(2024, 1, 1)));
                assert_eq!(end, Some(ymd(2024, 1, 31)));
                assert!(!full_range);
            }
            Command::Courier { .. } => panic!("expected filter command"),
        }

        let args = Args::try_parse_from(["ans9", "courier", "general.xlsx", "courier.xlsx"]).unwrap();
        assert!(matches!(args.command, Command::Courier { preview: 10, .. }));
    }
}

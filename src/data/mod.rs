//! Data module - workbook loading and table processing

mod cell;
mod loader;
mod processor;

pub use cell::{column_cells, datetime_to_excel_serial, Cell};
pub use loader::{LoaderError, WorkbookSource};
pub use processor::{DataProcessor, DateRange, ProcessorError};

//! Pipeline module - the two transformation runs offered by the tool

mod courier;
mod filter;
mod matching;

pub use courier::{run_courier, CourierReport, CourierRun};
pub use filter::{available_range, run_filter, FilterOutcome, FilterReport};

use crate::config::Settings;
use crate::data::{LoaderError, ProcessorError, WorkbookSource};
use crate::export::ExportError;
use polars::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Processor(#[from] ProcessorError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// The DTO and PCL partitions of the general claims workbook.
#[derive(Debug, Clone)]
pub struct GeneralTables {
    pub dto: DataFrame,
    pub pcl: DataFrame,
}

impl GeneralTables {
    pub fn load(source: &mut WorkbookSource, settings: &Settings) -> Result<Self, PipelineError> {
        let (dto, pcl) = source.load_partitions(&settings.partitions.dto, &settings.partitions.pcl)?;
        Ok(Self { dto, pcl })
    }

    /// Partitions paired with their sheet labels, in workbook order.
    pub fn partitions<'a>(&'a self, settings: &'a Settings) -> [(&'a str, &'a DataFrame); 2] {
        [
            (settings.partitions.dto.as_str(), &self.dto),
            (settings.partitions.pcl.as_str(), &self.pcl),
        ]
    }
}

/// The COURIER and MENSAJERO partitions of the courier workbook.
#[derive(Debug, Clone)]
pub struct CourierTables {
    pub courier: DataFrame,
    pub messenger: DataFrame,
}

impl CourierTables {
    pub fn load(source: &mut WorkbookSource, settings: &Settings) -> Result<Self, PipelineError> {
        let (courier, messenger) =
            source.load_partitions(&settings.partitions.courier, &settings.partitions.messenger)?;
        Ok(Self { courier, messenger })
    }
}

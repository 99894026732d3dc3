//! Turns monthly ERA5 hourly archives into daily datasets.
//!
//! Each period's surface archive (three members: instantaneous, accumulated
//! and extreme variables) and upper-air file are reduced to daily values,
//! the upper-air pressure levels are flattened into separate variables, and
//! the two are merged and written as one file.

pub mod aggregate;
pub mod archive;
pub mod dataset;
pub mod error;
pub mod flatten;
pub mod merge;
pub mod output;
pub mod period;
pub mod pipeline;
pub mod surface;

#[cfg(test)]
mod testing;

pub use error::{Error, ErrorKind, Result};
pub use period::{Period, PeriodRange};
pub use pipeline::{
    PeriodInputs, PeriodOutcome, PeriodPipeline, PipelineConfig, PipelineState,
};

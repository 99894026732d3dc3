//! Resolved settings for a conversion run.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use era5daily::{surface::SurfaceLayout, Period, PeriodInputs, PeriodRange, PipelineConfig};

use super::ConvertArgs;

#[derive(Debug, Clone)]
pub struct Config {
    pub input_dir: PathBuf,
    pub upper_air_pattern: String,
    pub surface_pattern: String,
    pub first: Period,
    pub last: Period,
    pub pipeline: PipelineConfig,
}

impl Config {
    pub fn from_args(args: &ConvertArgs) -> Result<Self> {
        if args.from > args.to {
            bail!("--from {} is after --to {}", args.from, args.to);
        }

        let input_dir = match &args.input_dir {
            Some(dir) => dir.clone(),
            None => era5_home()?.join("input"),
        };
        let output_dir = match &args.output_dir {
            Some(dir) => dir.clone(),
            None => era5_home()?.join("output"),
        };

        Ok(Config {
            input_dir,
            upper_air_pattern: args.upper_air_pattern.clone(),
            surface_pattern: args.surface_pattern.clone(),
            first: args.from,
            last: args.to,
            pipeline: PipelineConfig {
                archive: args.layout.layout(),
                surface: SurfaceLayout {
                    max_variable: args.max_variable.clone(),
                    min_variable: args.min_variable.clone(),
                },
                output_dir,
            },
        })
    }

    pub fn periods(&self) -> PeriodRange {
        PeriodRange::new(self.first, self.last)
    }

    pub fn inputs(&self, period: Period) -> PeriodInputs {
        PeriodInputs {
            upper_air: self
                .input_dir
                .join(period.format_pattern(&self.upper_air_pattern)),
            surface: self
                .input_dir
                .join(period.format_pattern(&self.surface_pattern)),
        }
    }
}

fn era5_home() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join("ERA5"))
        .ok_or_else(|| anyhow!("could not determine the home directory"))
}

// -- Tests -------------------------------------------------------------------

use std::{
    fmt, fs,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use era5daily::{
    dataset::ParquetDatasetOpener, output::ParquetOutputWriter, PeriodOutcome, PeriodPipeline,
};
use tokio::task;
use tracing::{error, info, warn};

use crate::cli::{config::Config, create_progress_bar};

/// Tally of period outcomes for one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} done, {} skipped, {} failed in {:.1?}",
            self.done, self.skipped, self.failed, self.elapsed
        )
    }
}

/// Converts every period of the configured range, one after another.
pub async fn convert(config: Config) -> Result<Summary> {
    let started = Instant::now();
    let output_dir = &config.pipeline.output_dir;
    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating output directory {}", output_dir.display()))?;

    let pipeline = Arc::new(PeriodPipeline::new(
        config.pipeline.clone(),
        ParquetDatasetOpener::default(),
        ParquetOutputWriter,
    ));

    let periods = config.periods();
    let bar = create_progress_bar(periods.len() as u64, "Converting periods".to_string())?;
    let mut summary = Summary::default();

    for period in periods {
        bar.set_message(period.to_string());
        let inputs = config.inputs(period);
        let worker = Arc::clone(&pipeline);

        // A panic inside one period surfaces here as a JoinError.
        match task::spawn_blocking(move || worker.process(period, &inputs)).await {
            Ok(outcome) => bar.suspend(|| summary.record(&outcome)),
            Err(e) => bar.suspend(|| {
                error!(%period, error = %e, "period aborted");
                summary.failed += 1;
            }),
        }

        bar.inc(1);
    }

    summary.elapsed = started.elapsed();
    bar.finish_with_message(format!("Converted {}", summary));

    Ok(summary)
}

impl Summary {
    fn record(&mut self, outcome: &PeriodOutcome) {
        match outcome {
            PeriodOutcome::Done { period, output } => {
                info!(%period, output = %output.display(), "period converted");
                self.done += 1;
            }
            PeriodOutcome::Skipped { period, reason } => {
                warn!(%period, %reason, "period skipped");
                self.skipped += 1;
            }
            PeriodOutcome::Failed {
                period,
                state,
                kind,
                message,
            } => {
                error!(%period, %state, %kind, %message, "period failed");
                self.failed += 1;
            }
        }
    }
}

// -- Tests -------------------------------------------------------------------

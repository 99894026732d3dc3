//! Converts one month of hourly archives into one daily dataset.
//!
//! ```text
//! Idle -> Checking -> Extracting -> Aggregating -> Flattening -> Merging -> Writing -> Done
//!            |             \____________\______________\____________\__________\
//!            v                                                                  v
//!         Skipped                                                            Failed
//! ```
//!
//! Every error is caught at the period boundary and reported as a
//! [`PeriodOutcome`]; extracted archive content is removed on every path.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use tracing::{debug, debug_span};

use crate::{
    aggregate::{DailyAggregator, Reducer},
    archive::{ArchiveExtractor, ArchiveLayout},
    dataset::{DatasetOpener, VariableCollection},
    error::{Error, ErrorKind, Result},
    flatten::flatten,
    merge::merge,
    output::OutputWriter,
    period::Period,
    surface::{assemble, SurfaceLayout, SurfaceMembers},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Checking,
    Extracting,
    Aggregating,
    Flattening,
    Merging,
    Writing,
    Done,
    Skipped,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Input locations for one period, resolved by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodInputs {
    pub upper_air: PathBuf,
    pub surface: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PeriodOutcome {
    Done {
        period: Period,
        output: PathBuf,
    },
    Skipped {
        period: Period,
        reason: String,
    },
    Failed {
        period: Period,
        state: PipelineState,
        kind: ErrorKind,
        message: String,
    },
}

impl PeriodOutcome {
    pub fn period(&self) -> Period {
        match self {
            Self::Done { period, .. } | Self::Skipped { period, .. } | Self::Failed { period, .. } => {
                *period
            }
        }
    }

    pub fn state(&self) -> PipelineState {
        match self {
            Self::Done { .. } => PipelineState::Done,
            Self::Skipped { .. } => PipelineState::Skipped,
            Self::Failed { .. } => PipelineState::Failed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub archive: ArchiveLayout,
    pub surface: SurfaceLayout,
    pub output_dir: PathBuf,
}

impl PipelineConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        PipelineConfig {
            archive: ArchiveLayout::default(),
            surface: SurfaceLayout::default(),
            output_dir: output_dir.into(),
        }
    }
}

pub struct PeriodPipeline<O, W> {
    config: PipelineConfig,
    extractor: ArchiveExtractor,
    opener: O,
    writer: W,
}

impl<O: DatasetOpener, W: OutputWriter> PeriodPipeline<O, W> {
    pub fn new(config: PipelineConfig, opener: O, writer: W) -> Self {
        let extractor = ArchiveExtractor::new(config.archive.clone());
        PeriodPipeline {
            config,
            extractor,
            opener,
            writer,
        }
    }

    /// Where the output for a period is written.
    pub fn output_path(&self, period: Period) -> PathBuf {
        self.config
            .output_dir
            .join(period.output_file_name(self.writer.extension()))
    }

    /// Processes one period. Never panics on bad input and never returns an
    /// error: every failure becomes a [`PeriodOutcome::Failed`].
    pub fn process(&self, period: Period, inputs: &PeriodInputs) -> PeriodOutcome {
        let _span = debug_span!("period", %period).entered();
        let mut state = Tracker::default();

        state.enter(PipelineState::Checking);
        if let Err(e) = check_inputs(inputs) {
            state.enter(PipelineState::Skipped);
            return PeriodOutcome::Skipped {
                period,
                reason: e.to_string(),
            };
        }

        match self.run(period, inputs, &mut state) {
            Ok(output) => {
                state.enter(PipelineState::Done);
                PeriodOutcome::Done { period, output }
            }
            Err(e) => {
                let failed_in = state.current;
                state.enter(PipelineState::Failed);
                PeriodOutcome::Failed {
                    period,
                    state: failed_in,
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        }
    }

    fn run(&self, period: Period, inputs: &PeriodInputs, state: &mut Tracker) -> Result<PathBuf> {
        state.enter(PipelineState::Extracting);
        let upper_air = self.opener.open(&inputs.upper_air)?;
        let members = self.open_surface(&inputs.surface)?;

        state.enter(PipelineState::Aggregating);
        let surface = assemble(&members, &self.config.surface)?;
        let upper_air = DailyAggregator::new(Reducer::Mean).aggregate_all(&upper_air)?;

        state.enter(PipelineState::Flattening);
        let upper_air = flatten(&upper_air)?;

        state.enter(PipelineState::Merging);
        let combined = merge(surface, upper_air)?;

        state.enter(PipelineState::Writing);
        let output = self.output_path(period);
        self.writer.write(&combined, &output)?;

        Ok(output)
    }

    /// Opens the three role members while the archive is extracted.
    fn open_surface(&self, archive: &Path) -> Result<SurfaceMembers> {
        self.extractor.with_members(archive, |members| {
            Ok(SurfaceMembers {
                instant: self.open_member(members.instant)?,
                accumulated: self.open_member(members.accumulated)?,
                extreme: self.open_member(members.extreme)?,
            })
        })
    }

    fn open_member(&self, path: &Path) -> Result<VariableCollection> {
        self.opener.open(path).map_err(|e| match e {
            Error::DatasetRead(message) => Error::ArchiveRead(format!("unreadable member: {}", message)),
            other => other,
        })
    }
}

fn check_inputs(inputs: &PeriodInputs) -> Result<()> {
    let missing: Vec<String> = [&inputs.upper_air, &inputs.surface]
        .into_iter()
        .filter(|p| !p.exists())
        .map(|p| p.display().to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingInput(missing.join(", ")))
    }
}

#[derive(Debug)]
struct Tracker {
    current: PipelineState,
}

impl Default for Tracker {
    fn default() -> Self {
        Tracker {
            current: PipelineState::Idle,
        }
    }
}

impl Tracker {
    fn enter(&mut self, next: PipelineState) {
        debug!(from = %self.current, to = %next, "state transition");
        self.current = next;
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, fs, sync::Arc};

    use arrow::array::{Array, ArrayRef, Float32Array, StringArray};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        dataset::ParquetDatasetOpener,
        output::ParquetOutputWriter,
        testing::{hourly_times, write_table, write_wide_parquet, write_zip, Cell},
    };

    const LEVELS: [f64; 3] = [1000.0, 850.0, 500.0];

    struct Fixture {
        _scratch: TempDir,
        input: PathBuf,
        output: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let scratch = TempDir::new().unwrap();
            let input = scratch.path().join("input");
            let output = scratch.path().join("output");
            fs::create_dir_all(&input).unwrap();
            fs::create_dir_all(&output).unwrap();

            Fixture {
                _scratch: scratch,
                input,
                output,
            }
        }

        fn inputs(&self, period: Period) -> PeriodInputs {
            PeriodInputs {
                upper_air: self
                    .input
                    .join(period.format_pattern("upper_air_{year}_{month}.parquet")),
                surface: self.input.join(period.format_pattern("surface_{year}_{month}.nc")),
            }
        }

        fn pipeline(&self) -> PeriodPipeline<ParquetDatasetOpener, ParquetOutputWriter> {
            PeriodPipeline::new(
                PipelineConfig::new(&self.output),
                ParquetDatasetOpener::default(),
                ParquetOutputWriter,
            )
        }

        fn write_upper_air(&self, period: Period, days: usize) {
            let times = hourly_times(period.year(), period.month(), 1, days);
            let t: Cell = &|t, l, _| 220.0 + l as f32 * 20.0 + (t % 24) as f32 * 0.1;
            let z: Cell = &|_, l, _| 1000.0 * (l + 1) as f32;
            write_wide_parquet(
                &self.inputs(period).upper_air,
                &times,
                Some(&LEVELS[..]),
                &[(50.0, 10.0)],
                &[("t", t), ("z", z)],
            );
        }

        /// Writes the surface archive with the given member kinds
        /// (`instant`, `accum`, `max`).
        fn write_surface(&self, period: Period, days: usize, kinds: &[&str]) {
            let times = hourly_times(period.year(), period.month(), 1, days);
            let staging = self.input.join("staging");
            fs::create_dir_all(&staging).unwrap();

            let t2m: Cell = &|t, _, _| 270.0 + (t % 24) as f32;
            let msl: Cell = &|_, _, _| 101_000.0;
            let tp: Cell = &|_, _, _| 0.001;
            let ssrd: Cell = &|t, _, _| if t % 24 < 12 { 0.0 } else { 1000.0 };
            let mx2t: Cell = &|t, _, _| 275.0 + (t % 24) as f32;
            let mn2t: Cell = &|t, _, _| 265.0 - (t % 24) as f32;
            // Every member carries the ensemble member coordinate.
            let number: Cell = &|_, _, _| 0.0;
            let mut variables: BTreeMap<&str, Vec<(&str, Cell)>> = BTreeMap::new();
            variables.insert("instant", vec![("number", number), ("t2m", t2m), ("msl", msl)]);
            variables.insert("accum", vec![("number", number), ("tp", tp), ("ssrd", ssrd)]);
            variables.insert("max", vec![("number", number), ("mx2t", mx2t), ("mn2t", mn2t)]);

            let mut members = Vec::new();
            for kind in kinds {
                let source = staging.join(format!("{}.parquet", kind));
                write_wide_parquet(&source, &times, None, &[(50.0, 10.0)], &variables[kind]);
                members.push((format!("data_stream-oper_stepType-{}.nc", kind), source));
            }

            let members: Vec<(&str, &Path)> = members
                .iter()
                .map(|(n, p)| (n.as_str(), p.as_path()))
                .collect();
            write_zip(&self.inputs(period).surface, &members);
        }

        fn output_files(&self) -> Vec<String> {
            fs::read_dir(&self.output)
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                .collect()
        }
    }

    fn rows_per_variable(path: &Path) -> BTreeMap<String, usize> {
        let file = fs::File::open(path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();

        let mut counts = BTreeMap::new();
        for batch in reader {
            let batch = batch.unwrap();
            let names = batch
                .column(0)
                .as_any()
                .downcast_ref::<StringArray>()
                .unwrap();
            for i in 0..names.len() {
                *counts.entry(names.value(i).to_string()).or_insert(0) += 1;
            }
        }
        counts
    }

    #[test]
    fn should_convert_a_full_month() {
        let fixture = Fixture::new();
        let period = Period::new(2000, 1).unwrap();
        fixture.write_upper_air(period, 31);
        fixture.write_surface(period, 31, &["instant", "accum", "max"]);

        let outcome = fixture.pipeline().process(period, &fixture.inputs(period));

        let output = match outcome {
            PeriodOutcome::Done { output, .. } => output,
            other => panic!("expected Done, got {:?}", other),
        };
        assert_eq!(output, fixture.output.join("DS_2000_01.parquet"));
        assert_eq!(fixture.output_files(), vec!["DS_2000_01.parquet"]);

        let counts = rows_per_variable(&output);
        // 6 surface variables + 2 upper-air variables x 3 levels
        assert_eq!(counts.len(), 6 + 2 * 3);
        for name in ["t2m", "msl", "tp", "ssrd", "mx2t", "mn2t", "t_1000hPa", "z_500hPa"] {
            assert_eq!(counts.get(name), Some(&31), "variable {}", name);
        }
        assert!(counts.values().all(|c| *c == 31));
    }

    #[test]
    fn should_ignore_the_ensemble_number_of_each_member() {
        let fixture = Fixture::new();
        let period = Period::new(2000, 1).unwrap();
        fixture.write_upper_air(period, 2);
        fixture.write_surface(period, 2, &["instant", "accum", "max"]);

        let outcome = fixture.pipeline().process(period, &fixture.inputs(period));

        let output = match outcome {
            PeriodOutcome::Done { output, .. } => output,
            other => panic!("expected Done, got {:?}", other),
        };
        let counts = rows_per_variable(&output);
        assert!(!counts.contains_key("number"));
        assert_eq!(counts.len(), 12);
    }

    #[test]
    fn should_skip_when_surface_archive_is_missing() {
        let fixture = Fixture::new();
        let period = Period::new(2000, 2).unwrap();
        fixture.write_upper_air(period, 29);

        let outcome = fixture.pipeline().process(period, &fixture.inputs(period));

        match &outcome {
            PeriodOutcome::Skipped { reason, .. } => assert!(reason.contains("surface_2000_02")),
            other => panic!("expected Skipped, got {:?}", other),
        }
        assert_eq!(outcome.period(), period);
        assert!(!fixture.output.join("DS_2000_02.parquet").exists());
        assert!(fixture.output_files().is_empty());
    }

    #[test]
    fn should_skip_when_upper_air_is_missing() {
        let fixture = Fixture::new();
        let period = Period::new(2000, 3).unwrap();
        fixture.write_surface(period, 2, &["instant", "accum", "max"]);

        let outcome = fixture.pipeline().process(period, &fixture.inputs(period));

        assert_eq!(outcome.state(), PipelineState::Skipped);
        assert!(fixture.output_files().is_empty());
    }

    #[test]
    fn should_fail_when_archive_lacks_a_member() {
        let fixture = Fixture::new();
        let period = Period::new(2000, 1).unwrap();
        fixture.write_upper_air(period, 2);
        fixture.write_surface(period, 2, &["instant", "accum"]);

        let outcome = fixture.pipeline().process(period, &fixture.inputs(period));

        match outcome {
            PeriodOutcome::Failed { kind, state, .. } => {
                assert_eq!(kind, ErrorKind::ArchiveRead);
                assert_eq!(state, PipelineState::Extracting);
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert!(fixture.output_files().is_empty());
    }

    #[test]
    fn should_fail_on_undecodable_upper_air_time() {
        let fixture = Fixture::new();
        let period = Period::new(2000, 1).unwrap();
        fixture.write_surface(period, 1, &["instant", "accum", "max"]);

        let batch = RecordBatch::try_from_iter(vec![
            (
                "valid_time",
                Arc::new(StringArray::from(vec!["first light", "noon"])) as ArrayRef,
            ),
            ("t", Arc::new(Float32Array::from(vec![1.0, 2.0])) as ArrayRef),
        ])
        .unwrap();
        write_table(&fixture.inputs(period).upper_air, &batch);

        let outcome = fixture.pipeline().process(period, &fixture.inputs(period));

        match outcome {
            PeriodOutcome::Failed { kind, state, message, .. } => {
                assert_eq!(kind, ErrorKind::Aggregation);
                assert_eq!(state, PipelineState::Aggregating);
                assert!(message.contains("first light"));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert!(fixture.output_files().is_empty());
    }

    #[test]
    fn should_fail_when_surface_and_upper_air_names_collide() {
        let fixture = Fixture::new();
        let period = Period::new(2000, 1).unwrap();
        fixture.write_surface(period, 1, &["instant", "accum", "max"]);

        // A level-free upper-air variable named like a surface one.
        let times = hourly_times(2000, 1, 1, 1);
        let t2m: Cell = &|_, _, _| 1.0;
        write_wide_parquet(
            &fixture.inputs(period).upper_air,
            &times,
            None,
            &[(50.0, 10.0)],
            &[("t2m", t2m)],
        );

        let outcome = fixture.pipeline().process(period, &fixture.inputs(period));

        match outcome {
            PeriodOutcome::Failed { kind, state, message, .. } => {
                assert_eq!(kind, ErrorKind::NameCollision);
                assert_eq!(state, PipelineState::Merging);
                assert!(message.contains("t2m"));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert!(fixture.output_files().is_empty());
    }

    #[test]
    fn should_fail_on_fractional_pressure_levels() {
        let fixture = Fixture::new();
        let period = Period::new(2000, 1).unwrap();
        fixture.write_surface(period, 1, &["instant", "accum", "max"]);

        let times = hourly_times(2000, 1, 1, 1);
        let t: Cell = &|_, _, _| 250.0;
        write_wide_parquet(
            &fixture.inputs(period).upper_air,
            &times,
            Some(&[850.0, 512.5][..]),
            &[(50.0, 10.0)],
            &[("t", t)],
        );

        let outcome = fixture.pipeline().process(period, &fixture.inputs(period));

        match outcome {
            PeriodOutcome::Failed { kind, state, .. } => {
                assert_eq!(kind, ErrorKind::Flatten);
                assert_eq!(state, PipelineState::Flattening);
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn should_fail_on_unreadable_upper_air() {
        let fixture = Fixture::new();
        let period = Period::new(2000, 1).unwrap();
        fixture.write_surface(period, 1, &["instant", "accum", "max"]);
        fs::write(&fixture.inputs(period).upper_air, b"CDF\x01").unwrap();

        let outcome = fixture.pipeline().process(period, &fixture.inputs(period));

        match outcome {
            PeriodOutcome::Failed { kind, .. } => assert_eq!(kind, ErrorKind::DatasetRead),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn should_produce_identical_output_when_rerun() {
        let fixture = Fixture::new();
        let period = Period::new(2000, 1).unwrap();
        fixture.write_upper_air(period, 3);
        fixture.write_surface(period, 3, &["instant", "accum", "max"]);
        let pipeline = fixture.pipeline();

        let first = pipeline.process(period, &fixture.inputs(period));
        let first_bytes = fs::read(pipeline.output_path(period)).unwrap();
        let second = pipeline.process(period, &fixture.inputs(period));
        let second_bytes = fs::read(pipeline.output_path(period)).unwrap();

        assert_eq!(first.state(), PipelineState::Done);
        assert_eq!(second.state(), PipelineState::Done);
        assert_eq!(first_bytes, second_bytes);
    }
}

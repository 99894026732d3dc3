//! Fixtures shared by the unit tests: synthetic hourly tables and archives.

use std::{
    fs::{self, File},
    io::Write,
    path::Path,
    sync::Arc,
};

use arrow::{
    array::{ArrayRef, Float32Array, Float64Array, TimestampSecondArray},
    record_batch::RecordBatch,
};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use flate2::{write::GzEncoder, Compression};
use parquet::arrow::ArrowWriter;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::dataset::{Coordinate, Grid, TimeAxis, Variable};

/// Value generator indexed by (time, level, point).
pub type Cell<'a> = &'a dyn Fn(usize, usize, usize) -> f32;

/// Hourly timestamps covering `days` whole days from the given date.
pub fn hourly_times(year: i32, month: u32, day: u32, days: usize) -> Vec<NaiveDateTime> {
    let start = NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();

    (0..days * 24)
        .map(|h| start + TimeDelta::try_hours(h as i64).unwrap())
        .collect()
}

/// A time axis in seconds since the Unix epoch.
pub fn time_axis(times: &[NaiveDateTime]) -> TimeAxis {
    let offsets = times
        .iter()
        .map(|t| t.and_utc().timestamp() as f64)
        .collect();

    TimeAxis::offsets(offsets, "seconds since 1970-01-01")
}

/// A single-point surface variable.
pub fn point_variable(name: &str, times: &[NaiveDateTime], values: Vec<f32>) -> Variable {
    Variable::new(name, time_axis(times), None, Grid::single(0.0, 0.0), values).unwrap()
}

/// A single-point variable on pressure levels, values laid out `[time][level]`.
pub fn level_variable(
    name: &str,
    times: &[NaiveDateTime],
    levels: &[f64],
    values: Vec<f32>,
) -> Variable {
    Variable::new(
        name,
        time_axis(times),
        Some(Coordinate::Numeric(levels.to_vec())),
        Grid::single(0.0, 0.0),
        values,
    )
    .unwrap()
}

pub fn write_table(path: &Path, batch: &RecordBatch) {
    let file = File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(batch).unwrap();
    writer.close().unwrap();
}

/// Writes a wide table with one row per (time, level, point).
pub fn write_wide_parquet(
    path: &Path,
    times: &[NaiveDateTime],
    levels: Option<&[f64]>,
    points: &[(f32, f32)],
    variables: &[(&str, Cell)],
) {
    let level_values = levels.unwrap_or(&[f64::NAN]);
    let mut time_column = Vec::new();
    let mut level_column = Vec::new();
    let mut lat_column = Vec::new();
    let mut lon_column = Vec::new();
    let mut value_columns = vec![Vec::new(); variables.len()];

    for (t, time) in times.iter().enumerate() {
        for (l, level) in level_values.iter().enumerate() {
            for (p, (lat, lon)) in points.iter().enumerate() {
                time_column.push(time.and_utc().timestamp());
                level_column.push(*level);
                lat_column.push(*lat);
                lon_column.push(*lon);
                for (column, (_, cell)) in value_columns.iter_mut().zip(variables) {
                    column.push(cell(t, l, p));
                }
            }
        }
    }

    let mut columns: Vec<(&str, ArrayRef)> = vec![(
        "valid_time",
        Arc::new(TimestampSecondArray::from(time_column)) as ArrayRef,
    )];
    if levels.is_some() {
        columns.push((
            "pressure_level",
            Arc::new(Float64Array::from(level_column)) as ArrayRef,
        ));
    }
    columns.push(("latitude", Arc::new(Float32Array::from(lat_column)) as ArrayRef));
    columns.push(("longitude", Arc::new(Float32Array::from(lon_column)) as ArrayRef));
    for ((name, _), values) in variables.iter().zip(value_columns) {
        columns.push((*name, Arc::new(Float32Array::from(values)) as ArrayRef));
    }

    let batch = RecordBatch::try_from_iter(columns).unwrap();
    write_table(path, &batch);
}

/// Packs files into a zip archive under the given member names.
pub fn write_zip(path: &Path, members: &[(&str, &Path)]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, source) in members {
        zip.start_file(*name, options).unwrap();
        zip.write_all(&fs::read(source).unwrap()).unwrap();
    }

    zip.finish().unwrap();
}

/// Packs files into a gzip-compressed tarball under the given member names.
pub fn write_tar_gz(path: &Path, members: &[(&str, &Path)]) {
    let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, source) in members {
        builder.append_path_with_name(source, name).unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap();
}

//! Save the daily dataset to a parquet file in long format.

use std::{fs::File, path::Path, sync::Arc};

use arrow::{
    array::{Date32Builder, Float32Builder, StringBuilder},
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use chrono::NaiveDate;
use parquet::{
    arrow::ArrowWriter,
    basic::{Compression, ZstdLevel},
    file::properties::WriterProperties,
};
use tempfile::NamedTempFile;
use tracing::debug;

use super::OutputWriter;
use crate::{
    dataset::VariableCollection,
    error::{Error, Result},
};

const CHUNK_SIZE: usize = 100_000;

#[derive(Debug, Clone, Default)]
pub struct ParquetOutputWriter;

impl OutputWriter for ParquetOutputWriter {
    /// One row per (variable, date, grid point). Rows follow the collection
    /// order, then date, then point. The file is written next to its final
    /// location and renamed into place once complete.
    fn write(&self, collection: &VariableCollection, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let staging = NamedTempFile::new_in(dir).map_err(|e| write_error(path, e))?;
        let file = staging.reopen().map_err(|e| write_error(path, e))?;

        let rows = write_rows(collection, file).map_err(|e| match e {
            Error::Write(message) => Error::Write(format!("{}: {}", path.display(), message)),
            other => other,
        })?;

        staging.persist(path).map_err(|e| write_error(path, e.error))?;
        debug!(path = %path.display(), rows, "wrote parquet dataset");

        Ok(())
    }

    fn extension(&self) -> &str {
        "parquet"
    }
}

pub fn schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("variable", DataType::Utf8, false),
        Field::new("date", DataType::Date32, false),
        Field::new("latitude", DataType::Float32, true),
        Field::new("longitude", DataType::Float32, true),
        Field::new("value", DataType::Float32, true),
    ]))
}

fn write_rows(collection: &VariableCollection, file: File) -> Result<usize> {
    let schema = schema();
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .set_dictionary_enabled(true)
        .build();
    let mut writer =
        ArrowWriter::try_new(file, schema.clone(), Some(props)).map_err(to_write_error)?;

    let mut columns = Columns::with_capacity(CHUNK_SIZE);
    let mut total_rows = 0;
    let epoch = NaiveDate::default();

    for variable in collection {
        let dates = variable.time().decode().map_err(|e| {
            Error::Write(format!("variable `{}` has undecodable time: {}", variable.name(), e))
        })?;
        if variable.level().is_some() {
            return Err(Error::Write(format!(
                "variable `{}` still has a level dimension",
                variable.name()
            )));
        }

        for (t, date) in dates.iter().enumerate() {
            let date32 = (date.date() - epoch).num_days() as i32;
            let values = variable.slice(t, 0);

            for (point, value) in variable.grid().points().iter().zip(values) {
                columns.variable.append_value(variable.name());
                columns.date.append_value(date32);
                columns.latitude.append_option(point.latitude);
                columns.longitude.append_option(point.longitude);
                columns
                    .value
                    .append_option((!value.is_nan()).then_some(*value));

                columns.rows += 1;
                total_rows += 1;

                if columns.rows >= CHUNK_SIZE {
                    columns.flush(&mut writer, &schema)?;
                }
            }
        }
    }

    if columns.rows > 0 {
        columns.flush(&mut writer, &schema)?;
    }

    writer.close().map_err(to_write_error)?;
    Ok(total_rows)
}

struct Columns {
    variable: StringBuilder,
    date: Date32Builder,
    latitude: Float32Builder,
    longitude: Float32Builder,
    value: Float32Builder,
    rows: usize,
}

impl Columns {
    fn with_capacity(capacity: usize) -> Self {
        Columns {
            variable: StringBuilder::with_capacity(capacity, capacity * 8),
            date: Date32Builder::with_capacity(capacity),
            latitude: Float32Builder::with_capacity(capacity),
            longitude: Float32Builder::with_capacity(capacity),
            value: Float32Builder::with_capacity(capacity),
            rows: 0,
        }
    }

    fn flush(&mut self, writer: &mut ArrowWriter<File>, schema: &SchemaRef) -> Result<()> {
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(self.variable.finish()),
                Arc::new(self.date.finish()),
                Arc::new(self.latitude.finish()),
                Arc::new(self.longitude.finish()),
                Arc::new(self.value.finish()),
            ],
        )
        .map_err(to_write_error)?;

        writer.write(&batch).map_err(to_write_error)?;
        self.rows = 0;

        Ok(())
    }
}

fn to_write_error(e: impl std::fmt::Display) -> Error {
    Error::Write(e.to_string())
}

fn write_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Write(format!("{}: {}", path.display(), e))
}

// -- Tests -------------------------------------------------------------------

//! Reads wide parquet tables into variable collections.
//!
//! One row per (time, level, point). The time column is required, the
//! level and latitude/longitude columns are optional, auxiliary coordinates
//! such as the ensemble `number` are ignored, and every other numeric column
//! is a data variable. Rows may come in any order and may leave cells out;
//! missing cells are NaN. Two rows for the same cell are an error.

use std::{collections::HashMap, fmt::Display, fs::File, path::Path};

use arrow::{
    array::{Array, ArrayRef, Float32Array, Float64Array, Int64Array, StringArray},
    compute::{cast, concat_batches},
    datatypes::{DataType, Field, TimeUnit},
    record_batch::RecordBatch,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::debug;

use super::{
    Coordinate, DatasetOpener, Grid, GridPoint, TimeAxis, Variable, VariableCollection,
};
use crate::error::{Error, Result};

/// Field metadata key holding CF units for numeric time columns.
pub const UNITS_KEY: &str = "units";

#[derive(Debug, Clone)]
pub struct ParquetDatasetOpener {
    pub time_column: String,
    pub level_column: String,
    pub latitude_column: String,
    pub longitude_column: String,
    /// Coordinate columns that carry no data and are skipped.
    pub auxiliary_columns: Vec<String>,
}

impl Default for ParquetDatasetOpener {
    fn default() -> Self {
        ParquetDatasetOpener {
            time_column: "valid_time".to_string(),
            level_column: "pressure_level".to_string(),
            latitude_column: "latitude".to_string(),
            longitude_column: "longitude".to_string(),
            auxiliary_columns: vec!["number".to_string(), "expver".to_string()],
        }
    }
}

impl DatasetOpener for ParquetDatasetOpener {
    fn open(&self, path: &Path) -> Result<VariableCollection> {
        let file = File::open(path).map_err(|e| read_error(path, e))?;
        let builder =
            ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| read_error(path, e))?;
        let schema = builder.schema().clone();
        let reader = builder.build().map_err(|e| read_error(path, e))?;

        let batches = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| read_error(path, e))?;
        let table = concat_batches(&schema, &batches).map_err(|e| read_error(path, e))?;

        debug!(path = %path.display(), rows = table.num_rows(), "read parquet dataset");
        self.from_batch(&table)
    }
}

impl ParquetDatasetOpener {
    /// Builds the collection from one table.
    pub fn from_batch(&self, batch: &RecordBatch) -> Result<VariableCollection> {
        let schema = batch.schema();

        let time_index = schema.index_of(&self.time_column).map_err(|_| {
            Error::DatasetRead(format!("no `{}` time column", self.time_column))
        })?;
        let (time_labels, units) =
            read_time(schema.field(time_index), batch.column(time_index))?;
        let (time_coord, time_rows) = time_labels.distinct();
        let time = TimeAxis::new(time_coord, units);

        let level_index = schema.index_of(&self.level_column).ok();
        let (level, level_rows) = match level_index {
            Some(i) => {
                let (coord, rows) = read_labels(&self.level_column, batch.column(i))?.distinct();
                (Some(coord), rows)
            }
            None => (None, vec![0; batch.num_rows()]),
        };

        let latitude_index = schema.index_of(&self.latitude_column).ok();
        let longitude_index = schema.index_of(&self.longitude_column).ok();
        let (grid, point_rows) = read_grid(
            batch,
            latitude_index.map(|i| batch.column(i)),
            longitude_index.map(|i| batch.column(i)),
        )?;

        let reserved = [Some(time_index), level_index, latitude_index, longitude_index];
        let levels = level.as_ref().map_or(1, Coordinate::len);
        let points = grid.len();

        let mut cells = Vec::with_capacity(batch.num_rows());
        let mut seen = vec![false; time.len() * levels * points];
        for row in 0..batch.num_rows() {
            let cell = (time_rows[row] * levels + level_rows[row]) * points + point_rows[row];
            if std::mem::replace(&mut seen[cell], true) {
                return Err(Error::DatasetRead(format!(
                    "row {} repeats the time, level and grid point of an earlier row",
                    row
                )));
            }
            cells.push(cell);
        }

        let mut builder = VariableCollection::builder();
        for (i, field) in schema.fields().iter().enumerate() {
            if reserved.contains(&Some(i)) {
                continue;
            }
            if self.auxiliary_columns.contains(field.name()) {
                debug!(column = field.name(), "skipping auxiliary coordinate");
                continue;
            }
            if !field.data_type().is_numeric() {
                debug!(column = field.name(), "skipping non-numeric column");
                continue;
            }

            let column = cast(batch.column(i), &DataType::Float32)
                .map_err(|e| Error::DatasetRead(format!("column `{}`: {}", field.name(), e)))?;
            let column = downcast::<Float32Array>(field.name(), &column)?;

            let mut values = vec![f32::NAN; time.len() * levels * points];
            for (row, cell) in cells.iter().enumerate() {
                if column.is_valid(row) {
                    values[*cell] = column.value(row);
                }
            }

            builder.insert(Variable::new(
                field.name().as_str(),
                time.clone(),
                level.clone(),
                grid.clone(),
                values,
            )?)?;
        }

        Ok(builder.build())
    }
}

enum Labels {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl Labels {
    /// Unique labels in first-appearance order, plus each row's position among them.
    fn distinct(self) -> (Coordinate, Vec<usize>) {
        match self {
            Labels::Numeric(values) => {
                let mut seen: HashMap<u64, usize> = HashMap::new();
                let mut unique = Vec::new();
                let rows = values
                    .into_iter()
                    .map(|v| {
                        *seen.entry(v.to_bits()).or_insert_with(|| {
                            unique.push(v);
                            unique.len() - 1
                        })
                    })
                    .collect();
                (Coordinate::Numeric(unique), rows)
            }
            Labels::Text(values) => {
                let mut seen: HashMap<String, usize> = HashMap::new();
                let mut unique = Vec::new();
                let rows = values
                    .into_iter()
                    .map(|v| {
                        if let Some(i) = seen.get(&v) {
                            return *i;
                        }
                        unique.push(v.clone());
                        seen.insert(v, unique.len() - 1);
                        unique.len() - 1
                    })
                    .collect();
                (Coordinate::Text(unique), rows)
            }
        }
    }
}

fn read_time(field: &Field, array: &ArrayRef) -> Result<(Labels, Option<String>)> {
    let name = field.name();
    let seconds_since_epoch = Some("seconds since 1970-01-01".to_string());

    match array.data_type() {
        DataType::Timestamp(unit, _) => {
            let scale = match unit {
                TimeUnit::Second => 1.0,
                TimeUnit::Millisecond => 1e-3,
                TimeUnit::Microsecond => 1e-6,
                TimeUnit::Nanosecond => 1e-9,
            };
            let raw = cast_to::<Int64Array>(name, array, &DataType::Int64)?;
            let values = non_null(name, &raw)?
                .into_iter()
                .map(|i| raw.value(i) as f64 * scale)
                .collect();
            Ok((Labels::Numeric(values), seconds_since_epoch))
        }
        DataType::Date32 => {
            let labels = read_labels(name, array)?;
            Ok((labels, Some("days since 1970-01-01".to_string())))
        }
        DataType::Date64 => {
            let labels = read_labels(name, array)?;
            Ok((labels, Some("milliseconds since 1970-01-01".to_string())))
        }
        DataType::Utf8 | DataType::LargeUtf8 => Ok((read_labels(name, array)?, None)),
        dt if dt.is_numeric() => {
            let units = field.metadata().get(UNITS_KEY).cloned().ok_or_else(|| {
                Error::DatasetRead(format!("numeric time column `{}` has no units", name))
            })?;
            Ok((read_labels(name, array)?, Some(units)))
        }
        other => Err(Error::DatasetRead(format!(
            "time column `{}` has unsupported type {}",
            name, other
        ))),
    }
}

fn read_labels(name: &str, array: &ArrayRef) -> Result<Labels> {
    match array.data_type() {
        DataType::Utf8 | DataType::LargeUtf8 => {
            let text = cast_to::<StringArray>(name, array, &DataType::Utf8)?;
            let rows = non_null(name, &text)?;
            Ok(Labels::Text(
                rows.into_iter().map(|i| text.value(i).to_string()).collect(),
            ))
        }
        DataType::Date32 | DataType::Date64 => {
            let raw = cast_to::<Int64Array>(name, array, &DataType::Int64)?;
            let rows = non_null(name, &raw)?;
            Ok(Labels::Numeric(
                rows.into_iter().map(|i| raw.value(i) as f64).collect(),
            ))
        }
        dt if dt.is_numeric() => {
            let numbers = cast_to::<Float64Array>(name, array, &DataType::Float64)?;
            let rows = non_null(name, &numbers)?;
            Ok(Labels::Numeric(
                rows.into_iter().map(|i| numbers.value(i)).collect(),
            ))
        }
        other => Err(Error::DatasetRead(format!(
            "coordinate column `{}` has unsupported type {}",
            name, other
        ))),
    }
}

fn read_grid(
    batch: &RecordBatch,
    latitude: Option<&ArrayRef>,
    longitude: Option<&ArrayRef>,
) -> Result<(Grid, Vec<usize>)> {
    let latitude = latitude
        .map(|a| cast_to::<Float32Array>("latitude", a, &DataType::Float32))
        .transpose()?;
    let longitude = longitude
        .map(|a| cast_to::<Float32Array>("longitude", a, &DataType::Float32))
        .transpose()?;

    let coordinate = |array: &Option<Float32Array>, row: usize| {
        array
            .as_ref()
            .and_then(|a| a.is_valid(row).then(|| a.value(row)))
    };

    let mut seen: HashMap<(Option<u32>, Option<u32>), usize> = HashMap::new();
    let mut points = Vec::new();
    let mut rows = Vec::with_capacity(batch.num_rows());

    for row in 0..batch.num_rows() {
        let point = GridPoint {
            latitude: coordinate(&latitude, row),
            longitude: coordinate(&longitude, row),
        };
        let key = (
            point.latitude.map(f32::to_bits),
            point.longitude.map(f32::to_bits),
        );
        let index = *seen.entry(key).or_insert_with(|| {
            points.push(point);
            points.len() - 1
        });
        rows.push(index);
    }

    Ok((Grid::new(points), rows))
}

fn cast_to<A: Array + Clone + 'static>(name: &str, array: &ArrayRef, to: &DataType) -> Result<A> {
    let cast_array = cast(array, to)
        .map_err(|e| Error::DatasetRead(format!("column `{}`: {}", name, e)))?;
    downcast::<A>(name, &cast_array).cloned()
}

fn downcast<'a, A: Array + 'static>(name: &str, array: &'a ArrayRef) -> Result<&'a A> {
    array.as_any().downcast_ref::<A>().ok_or_else(|| {
        Error::DatasetRead(format!("column `{}` has unexpected type {}", name, array.data_type()))
    })
}

/// Row indices of a coordinate column, failing on nulls.
fn non_null(name: &str, array: &dyn Array) -> Result<Vec<usize>> {
    if array.null_count() > 0 {
        return Err(Error::DatasetRead(format!(
            "coordinate column `{}` contains nulls",
            name
        )));
    }

    Ok((0..array.len()).collect())
}

fn read_error(path: &Path, e: impl Display) -> Error {
    Error::DatasetRead(format!("{}: {}", path.display(), e))
}

// -- Tests -------------------------------------------------------------------

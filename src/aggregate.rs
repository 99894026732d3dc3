//! Reduces sub-daily variables to one value per UTC calendar day.

use std::{collections::BTreeMap, fmt};

use chrono::NaiveDate;

use crate::{
    dataset::{TimeAxis, Variable, VariableCollection},
    error::{Error, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Sum,
    Mean,
    Max,
    Min,
}

impl Reducer {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Max => "max",
            Self::Min => "min",
        }
    }

    /// Reduces one day's samples. NaN samples are skipped; a day with no
    /// valid samples sums to zero and is NaN for the other reducers.
    pub fn reduce(&self, samples: impl Iterator<Item = f32>) -> f32 {
        let mut count = 0usize;
        let mut total = 0f64;
        let mut extreme: Option<f32> = None;

        for v in samples.filter(|v| !v.is_nan()) {
            count += 1;
            total += f64::from(v);
            extreme = Some(match (self, extreme) {
                (Self::Max, Some(e)) => e.max(v),
                (Self::Min, Some(e)) => e.min(v),
                _ => v,
            });
        }

        match self {
            Self::Sum => total as f32,
            Self::Mean if count == 0 => f32::NAN,
            Self::Mean => (total / count as f64) as f32,
            Self::Max | Self::Min => extreme.unwrap_or(f32::NAN),
        }
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DailyAggregator {
    reducer: Reducer,
}

impl DailyAggregator {
    pub fn new(reducer: Reducer) -> Self {
        DailyAggregator { reducer }
    }

    /// Groups samples by the calendar day of their own timestamp and reduces
    /// each group. Days without samples do not appear in the output.
    pub fn aggregate(&self, variable: &Variable) -> Result<Variable> {
        let timestamps = variable.time().decode().map_err(|e| match e {
            Error::Aggregation(message) => {
                Error::Aggregation(format!("variable `{}`: {}", variable.name(), message))
            }
            other => other,
        })?;

        let mut days: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
        for (index, timestamp) in timestamps.iter().enumerate() {
            days.entry(timestamp.date()).or_default().push(index);
        }

        let levels = variable.level_count();
        let points = variable.grid().len();
        let mut values = Vec::with_capacity(days.len() * levels * points);

        for samples in days.values() {
            for level in 0..levels {
                for point in 0..points {
                    let day = samples
                        .iter()
                        .map(|t| variable.slice(*t, level)[point]);
                    values.push(self.reducer.reduce(day));
                }
            }
        }

        let dates: Vec<NaiveDate> = days.into_keys().collect();
        Variable::new(
            variable.name(),
            TimeAxis::daily(&dates),
            variable.level().cloned(),
            variable.grid().clone(),
            values,
        )
    }

    pub fn aggregate_all(&self, collection: &VariableCollection) -> Result<VariableCollection> {
        let mut builder = VariableCollection::builder();
        for variable in collection {
            builder.insert(self.aggregate(variable)?)?;
        }

        Ok(builder.build())
    }
}

// -- Tests -------------------------------------------------------------------

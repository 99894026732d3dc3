//! Expands pressure-level variables into one scalar variable per level.

use tracing::debug;

use crate::{
    dataset::{CollectionBuilder, Coordinate, Variable, VariableCollection},
    error::{Error, Result},
};

/// Unit suffix appended to generated per-level names.
pub const LEVEL_UNIT_SUFFIX: &str = "hPa";

/// Name of a variable at one pressure level, e.g. `t_850hPa`.
pub fn level_name(base: &str, hpa: i64) -> String {
    format!("{}_{}{}", base, hpa, LEVEL_UNIT_SUFFIX)
}

/// Converts a level coordinate to whole hectopascals, refusing anything
/// that is not exactly an integer.
pub fn level_to_hpa(value: f64) -> Result<i64> {
    if !value.is_finite() {
        return Err(Error::Flatten(format!(
            "pressure level `{}` is not a number",
            value
        )));
    }
    if value.fract() != 0.0 {
        return Err(Error::Flatten(format!(
            "pressure level {} is not a whole number of hPa",
            value
        )));
    }
    if value.abs() > i64::MAX as f64 / 2.0 {
        return Err(Error::Flatten(format!("pressure level {} is out of range", value)));
    }

    Ok(value as i64)
}

/// Produces one variable per (variable, level) pair. Variables without a
/// level dimension pass through under their own name.
pub fn flatten(collection: &VariableCollection) -> Result<VariableCollection> {
    let mut builder = VariableCollection::builder();

    for variable in collection {
        let levels = match variable.level() {
            None => {
                insert_unique(&mut builder, variable.clone())?;
                continue;
            }
            Some(Coordinate::Numeric(levels)) => levels,
            Some(Coordinate::Text(labels)) => {
                return Err(Error::Flatten(format!(
                    "variable `{}` has non-numeric pressure levels [{}]",
                    variable.name(),
                    labels.join(", ")
                )))
            }
        };

        for (index, level) in levels.iter().enumerate() {
            let hpa = level_to_hpa(*level).map_err(|e| match e {
                Error::Flatten(message) => {
                    Error::Flatten(format!("variable `{}`: {}", variable.name(), message))
                }
                other => other,
            })?;
            let name = level_name(variable.name(), hpa);
            insert_unique(&mut builder, variable.at_level(name, index)?)?;
        }
        debug!(variable = variable.name(), levels = levels.len(), "flattened");
    }

    Ok(builder.build())
}

fn insert_unique(builder: &mut CollectionBuilder, variable: Variable) -> Result<()> {
    let name = variable.name().to_string();
    builder.insert(variable).map_err(|_| {
        Error::Flatten(format!("generated variable name `{}` is not unique", name))
    })?;

    Ok(())
}

// -- Tests -------------------------------------------------------------------

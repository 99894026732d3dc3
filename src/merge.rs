//! Combines two variable collections without overwriting anything.

use crate::{
    dataset::VariableCollection,
    error::{Error, Result},
};

/// Returns every variable of `first` followed by every variable of `second`.
/// Fails, listing all shared names, if the two overlap.
pub fn merge(first: VariableCollection, second: VariableCollection) -> Result<VariableCollection> {
    let names: Vec<String> = second
        .names()
        .filter(|name| first.contains(name))
        .map(str::to_string)
        .collect();
    if !names.is_empty() {
        return Err(Error::NameCollision { names });
    }

    let mut builder = VariableCollection::builder();
    builder.extend(first)?.extend(second)?;

    Ok(builder.build())
}

// -- Tests -------------------------------------------------------------------

//! Labelled variables and the collections they travel in.
//!
//! A [`Variable`] is a dense block of `f32` values laid out as
//! `[time][level][point]`, where the level dimension is present only for
//! upper-air variables. Missing cells are NaN.

pub mod parquet;
pub mod time;

use std::{collections::HashMap, path::Path};

use crate::error::{Error, Result};

pub use parquet::ParquetDatasetOpener;
pub use time::TimeAxis;

/// Opens a labelled dataset from a path.
pub trait DatasetOpener {
    fn open(&self, path: &Path) -> Result<VariableCollection>;
}

#[derive(Debug, Clone, PartialEq)]
/// Coordinate labels along one dimension.
pub enum Coordinate {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl Coordinate {
    pub fn len(&self) -> usize {
        match self {
            Coordinate::Numeric(v) => v.len(),
            Coordinate::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    pub latitude: Option<f32>,
    pub longitude: Option<f32>,
}

impl GridPoint {
    pub fn new(latitude: f32, longitude: f32) -> Self {
        GridPoint {
            latitude: Some(latitude),
            longitude: Some(longitude),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
/// The spatial points a variable is sampled on, in storage order.
pub struct Grid {
    points: Vec<GridPoint>,
}

impl Grid {
    pub fn new(points: Vec<GridPoint>) -> Self {
        Grid { points }
    }

    pub fn single(latitude: f32, longitude: f32) -> Self {
        Grid::new(vec![GridPoint::new(latitude, longitude)])
    }

    pub fn points(&self) -> &[GridPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    name: String,
    time: TimeAxis,
    level: Option<Coordinate>,
    grid: Grid,
    values: Vec<f32>,
}

impl Variable {
    pub fn new(
        name: impl Into<String>,
        time: TimeAxis,
        level: Option<Coordinate>,
        grid: Grid,
        values: Vec<f32>,
    ) -> Result<Self> {
        let name = name.into();
        let levels = level.as_ref().map_or(1, Coordinate::len);
        let expected = time.len() * levels * grid.len();

        if values.len() != expected {
            return Err(Error::DatasetRead(format!(
                "variable `{}` has {} values, its dimensions need {}",
                name,
                values.len(),
                expected
            )));
        }

        Ok(Variable {
            name,
            time,
            level,
            grid,
            values,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn time(&self) -> &TimeAxis {
        &self.time
    }

    pub fn level(&self) -> Option<&Coordinate> {
        self.level.as_ref()
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Number of entries along the level dimension, 1 when there is none.
    pub fn level_count(&self) -> usize {
        self.level.as_ref().map_or(1, Coordinate::len)
    }

    /// The grid values at one (time, level) position.
    pub fn slice(&self, time: usize, level: usize) -> &[f32] {
        let points = self.grid.len();
        let start = (time * self.level_count() + level) * points;
        &self.values[start..start + points]
    }

    /// Selects one level, dropping the level dimension.
    pub fn at_level(&self, name: impl Into<String>, level: usize) -> Result<Variable> {
        let mut values = Vec::with_capacity(self.time.len() * self.grid.len());
        for t in 0..self.time.len() {
            values.extend_from_slice(self.slice(t, level));
        }

        Variable::new(name, self.time.clone(), None, self.grid.clone(), values)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Variables keyed by unique name, kept in insertion order.
pub struct VariableCollection {
    variables: Vec<Variable>,
}

impl VariableCollection {
    pub fn builder() -> CollectionBuilder {
        CollectionBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(Variable::name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Variable> {
        self.variables.iter()
    }
}

impl IntoIterator for VariableCollection {
    type Item = Variable;
    type IntoIter = std::vec::IntoIter<Variable>;

    fn into_iter(self) -> Self::IntoIter {
        self.variables.into_iter()
    }
}

impl<'a> IntoIterator for &'a VariableCollection {
    type Item = &'a Variable;
    type IntoIter = std::slice::Iter<'a, Variable>;

    fn into_iter(self) -> Self::IntoIter {
        self.variables.iter()
    }
}

#[derive(Debug, Default)]
/// Accumulates variables, refusing a second variable under an existing name.
pub struct CollectionBuilder {
    variables: Vec<Variable>,
    index: HashMap<String, usize>,
}

impl CollectionBuilder {
    pub fn insert(&mut self, variable: Variable) -> Result<&mut Self> {
        if self.index.contains_key(variable.name()) {
            return Err(Error::NameCollision {
                names: vec![variable.name().to_string()],
            });
        }

        self.index
            .insert(variable.name().to_string(), self.variables.len());
        self.variables.push(variable);

        Ok(self)
    }

    pub fn extend(&mut self, collection: VariableCollection) -> Result<&mut Self> {
        for variable in collection {
            self.insert(variable)?;
        }

        Ok(self)
    }

    pub fn build(self) -> VariableCollection {
        VariableCollection {
            variables: self.variables,
        }
    }
}

// -- Tests -------------------------------------------------------------------

//! Calendar-month processing units.

use std::{fmt, path::PathBuf, str::FromStr};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParsePeriodError {
    #[error("expected YYYY-MM, got `{0}`")]
    Format(String),
    #[error("month must be between 1 and 12, got {0}")]
    Month(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// One (year, month) processing unit.
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, ParsePeriodError> {
        if !(1..=12).contains(&month) {
            return Err(ParsePeriodError::Month(month));
        }

        Ok(Period { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn succ(&self) -> Period {
        if self.month == 12 {
            Period {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Period {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Substitutes `{year}` and `{month}` in a file name pattern.
    pub fn format_pattern(&self, pattern: &str) -> String {
        pattern
            .replace("{year}", &format!("{:04}", self.year))
            .replace("{month}", &format!("{:02}", self.month))
    }

    /// Deterministic output file name, e.g. `DS_2000_01.parquet`.
    pub fn output_file_name(&self, extension: &str) -> PathBuf {
        PathBuf::from(format!(
            "DS_{:04}_{:02}.{}",
            self.year, self.month, extension
        ))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = ParsePeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| ParsePeriodError::Format(s.to_string()))?;
        let year = year
            .parse()
            .map_err(|_| ParsePeriodError::Format(s.to_string()))?;
        let month = month
            .parse()
            .map_err(|_| ParsePeriodError::Format(s.to_string()))?;

        Period::new(year, month)
    }
}

#[derive(Debug, Clone, Copy)]
/// Inclusive run of months, iterated in calendar order.
pub struct PeriodRange {
    next: Option<Period>,
    last: Period,
}

impl PeriodRange {
    pub fn new(first: Period, last: Period) -> Self {
        let next = (first <= last).then_some(first);
        PeriodRange { next, last }
    }

    pub fn len(&self) -> usize {
        match self.next {
            Some(p) => {
                let months = (self.last.year - p.year) * 12 + self.last.month as i32 - p.month as i32;
                months as usize + 1
            }
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.next.is_none()
    }
}

impl Iterator for PeriodRange {
    type Item = Period;

    fn next(&mut self) -> Option<Period> {
        let current = self.next?;
        self.next = (current < self.last).then(|| current.succ());
        Some(current)
    }
}

// -- Tests -------------------------------------------------------------------

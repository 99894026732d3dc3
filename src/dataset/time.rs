//! CF-style time coordinates: numeric offsets from an epoch, or text datetimes.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta};

use super::Coordinate;
use crate::error::{Error, Result};

/// Units used for daily output axes.
pub const DAILY_UNITS: &str = "days since 1970-01-01";

#[derive(Debug, Clone, PartialEq)]
/// The time coordinate of a variable, kept in its stored form until decoded.
pub struct TimeAxis {
    values: Coordinate,
    units: Option<String>,
}

impl TimeAxis {
    pub fn new(values: Coordinate, units: Option<String>) -> Self {
        TimeAxis { values, units }
    }

    pub fn offsets(values: Vec<f64>, units: impl Into<String>) -> Self {
        TimeAxis {
            values: Coordinate::Numeric(values),
            units: Some(units.into()),
        }
    }

    pub fn text(values: Vec<String>) -> Self {
        TimeAxis {
            values: Coordinate::Text(values),
            units: None,
        }
    }

    /// Builds a daily axis, one entry per date.
    pub fn daily(dates: &[NaiveDate]) -> Self {
        let offsets = dates
            .iter()
            .map(|d| (*d - unix_epoch()).num_days() as f64)
            .collect();

        TimeAxis::offsets(offsets, DAILY_UNITS)
    }

    pub fn values(&self) -> &Coordinate {
        &self.values
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Decodes every entry to a UTC timestamp.
    pub fn decode(&self) -> Result<Vec<NaiveDateTime>> {
        match &self.values {
            Coordinate::Numeric(offsets) => {
                let units = self.units.as_deref().ok_or_else(|| {
                    Error::Aggregation("numeric time coordinate has no units".to_string())
                })?;
                let epoch = Epoch::parse(units)?;
                offsets.iter().map(|v| epoch.at(*v)).collect()
            }
            Coordinate::Text(labels) => labels
                .iter()
                .map(|s| {
                    parse_datetime(s).ok_or_else(|| {
                        Error::Aggregation(format!("unparseable time value `{}`", s))
                    })
                })
                .collect(),
        }
    }
}

struct Epoch {
    step_ms: f64,
    origin: NaiveDateTime,
}

impl Epoch {
    fn parse(units: &str) -> Result<Self> {
        let (step, origin) = units.split_once(" since ").ok_or_else(|| {
            Error::Aggregation(format!("time units `{}` are not `<unit> since <date>`", units))
        })?;

        let step_ms = match step.trim().to_lowercase().as_str() {
            "milliseconds" | "millisecond" | "ms" => 1.0,
            "seconds" | "second" | "secs" | "sec" | "s" => 1e3,
            "minutes" | "minute" | "mins" | "min" => 60e3,
            "hours" | "hour" | "hrs" | "hr" | "h" => 3_600e3,
            "days" | "day" | "d" => 86_400e3,
            other => {
                return Err(Error::Aggregation(format!(
                    "unsupported time unit `{}`",
                    other
                )))
            }
        };

        let origin = parse_datetime(origin).ok_or_else(|| {
            Error::Aggregation(format!("unparseable time origin in `{}`", units))
        })?;

        Ok(Epoch { step_ms, origin })
    }

    fn at(&self, offset: f64) -> Result<NaiveDateTime> {
        if !offset.is_finite() {
            return Err(Error::Aggregation(format!(
                "non-numeric time offset `{}`",
                offset
            )));
        }

        let ms = (offset * self.step_ms).round();
        if ms.abs() >= i64::MAX as f64 {
            return Err(Error::Aggregation(format!("time offset {} out of range", offset)));
        }

        TimeDelta::try_milliseconds(ms as i64)
            .and_then(|delta| self.origin.checked_add_signed(delta))
            .ok_or_else(|| Error::Aggregation(format!("time offset {} out of range", offset)))
    }
}

fn unix_epoch() -> NaiveDate {
    NaiveDate::default()
}

/// Parses the datetime spellings found in CF units and text coordinates.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }

    let s = s.trim_end_matches('Z').trim_end_matches("UTC").trim();
    for fmt in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

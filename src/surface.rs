//! Builds the daily surface set from the three archive members.

use tracing::debug;

use crate::{
    aggregate::{DailyAggregator, Reducer},
    dataset::VariableCollection,
    error::{Error, Result},
};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Names of the sub-variables taken from the extreme member.
pub struct SurfaceLayout {
    pub max_variable: String,
    pub min_variable: String,
}

impl Default for SurfaceLayout {
    fn default() -> Self {
        SurfaceLayout {
            max_variable: "mx2t".to_string(),
            min_variable: "mn2t".to_string(),
        }
    }
}

/// The hourly datasets of one surface archive.
#[derive(Debug, Clone, Default)]
pub struct SurfaceMembers {
    pub instant: VariableCollection,
    pub accumulated: VariableCollection,
    pub extreme: VariableCollection,
}

/// Daily means of instant variables, daily sums of accumulated variables,
/// and the daily max/min of the two extreme sub-variables, in one collection.
pub fn assemble(members: &SurfaceMembers, layout: &SurfaceLayout) -> Result<VariableCollection> {
    let mut builder = VariableCollection::builder();

    let instant = DailyAggregator::new(Reducer::Mean);
    builder.extend(instant.aggregate_all(&members.instant)?)?;

    let accumulated = DailyAggregator::new(Reducer::Sum);
    builder.extend(accumulated.aggregate_all(&members.accumulated)?)?;

    for (name, reducer) in [
        (&layout.max_variable, Reducer::Max),
        (&layout.min_variable, Reducer::Min),
    ] {
        let variable = members.extreme.get(name).ok_or_else(|| {
            Error::Aggregation(format!(
                "extreme member has no `{}` variable; found [{}]",
                name,
                members.extreme.names().collect::<Vec<_>>().join(", ")
            ))
        })?;
        builder.insert(DailyAggregator::new(reducer).aggregate(variable)?)?;
    }

    let surface = builder.build();
    debug!(variables = surface.len(), "assembled surface set");

    Ok(surface)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{hourly_times, point_variable};

    fn members() -> SurfaceMembers {
        let times = hourly_times(2000, 1, 1, 2);
        let hourly = |name: &str, f: fn(usize) -> f32| {
            point_variable(name, &times, (0..times.len()).map(f).collect())
        };
        let collect = |vars: Vec<crate::dataset::Variable>| {
            let mut builder = VariableCollection::builder();
            for v in vars {
                builder.insert(v).unwrap();
            }
            builder.build()
        };

        SurfaceMembers {
            instant: collect(vec![hourly("t2m", |h| h as f32), hourly("msl", |_| 1000.0)]),
            accumulated: collect(vec![hourly("tp", |_| 0.5), hourly("ssrd", |_| 1.0)]),
            extreme: collect(vec![
                hourly("mx2t", |h| (h % 24) as f32),
                hourly("mn2t", |h| -((h % 24) as f32)),
            ]),
        }
    }

    #[test]
    fn should_apply_role_reducers() {
        let surface = assemble(&members(), &SurfaceLayout::default()).unwrap();

        assert_eq!(
            surface.names().collect::<Vec<_>>(),
            vec!["t2m", "msl", "tp", "ssrd", "mx2t", "mn2t"]
        );
        assert_eq!(surface.get("t2m").unwrap().values(), &[11.5, 35.5]);
        assert_eq!(surface.get("tp").unwrap().values(), &[12.0, 12.0]);
        assert_eq!(surface.get("mx2t").unwrap().values(), &[23.0, 23.0]);
        assert_eq!(surface.get("mn2t").unwrap().values(), &[-23.0, -23.0]);
    }

    #[test]
    fn should_fail_when_extreme_variable_is_absent() {
        let layout = SurfaceLayout {
            max_variable: "tmax".to_string(),
            ..SurfaceLayout::default()
        };

        match assemble(&members(), &layout) {
            Err(Error::Aggregation(message)) => assert!(message.contains("tmax")),
            other => panic!("expected aggregation error, got {:?}", other),
        }
    }

    #[test]
    fn should_surface_collisions_between_members() {
        let mut members = members();
        members.accumulated = members.instant.clone();

        match assemble(&members, &SurfaceLayout::default()) {
            Err(Error::NameCollision { names }) => assert_eq!(names, vec!["t2m"]),
            other => panic!("expected collision, got {:?}", other),
        }
    }
}

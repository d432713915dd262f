//! Trajectory grouping.
//!
//! Rows arrive in file order and are assumed to be grouped by entity and sorted by
//! time within each group. A [`GroupingSession`] is created per file and decides, row by
//! row, whether a fix extends the open trajectory or starts a new one. The decision
//! only looks at the immediately preceding row's entity id.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{Result, TrajloadError};
use crate::model::{Fix, Trajectory, TrajectoryModel};

/// What to do when an entity id reappears after a different one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisitPolicy {
    /// Start a fresh `{id}_0` trajectory for every contiguous run
    #[default]
    Split,
    /// Append to the trajectory opened earlier in the same file for that id
    Resume,
}

/// Counters reported when a session finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupingSummary {
    pub trajectories_created: usize,
    pub points_appended: usize,
}

#[derive(Debug)]
enum Mode {
    /// One trajectory for the whole file, committed by `finish`
    SingleTrajectory(Trajectory),
    /// Trajectories committed as soon as they are opened
    ByEntity,
}

/// Per-file grouping state
#[derive(Debug)]
pub struct GroupingSession {
    mode: Mode,
    policy: RevisitPolicy,
    previous_key: String,
    current_trajectory_id: String,
    /// Entity key -> trajectory id, only filled under `Resume`
    opened: HashMap<String, String>,
    summary: GroupingSummary,
}

impl GroupingSession {
    /// Start grouping a file.
    ///
    /// Without an entity column a single trajectory is opened right away, owned by a
    /// moving object whose id comes from `model.new_entity_id()`.
    pub fn begin<M: TrajectoryModel>(
        model: &mut M,
        has_entity_id: bool,
        policy: RevisitPolicy,
    ) -> Self {
        let mut summary = GroupingSummary::default();

        let mode = if has_entity_id {
            Mode::ByEntity
        } else {
            let entity = model.new_entity_id();
            let owner = model.create_moving_object(&entity);
            let trajectory = model.create_trajectory(&format!("{}_0", entity), &owner);
            summary.trajectories_created = 1;
            log::debug!("Opened trajectory {} for whole file", trajectory.id);
            Mode::SingleTrajectory(trajectory)
        };

        let current_trajectory_id = match &mode {
            Mode::SingleTrajectory(trajectory) => trajectory.id.clone(),
            Mode::ByEntity => String::new(),
        };

        Self {
            mode,
            policy,
            previous_key: String::new(),
            current_trajectory_id,
            opened: HashMap::new(),
            summary,
        }
    }

    /// Id of the trajectory the last fix went to
    pub fn current_trajectory_id(&self) -> &str {
        &self.current_trajectory_id
    }

    /// Trajectories already handed to the model. The whole-file trajectory only
    /// counts once `finish` has committed it.
    pub fn committed(&self) -> usize {
        match self.mode {
            Mode::SingleTrajectory(_) => 0,
            Mode::ByEntity => self.summary.trajectories_created,
        }
    }

    /// Feed the next decoded fix
    pub fn push<M: TrajectoryModel>(&mut self, model: &mut M, fix: Fix) -> Result<()> {
        let Fix {
            entity_id,
            timestamp,
            coordinate,
            annotations,
        } = fix;

        if let Mode::SingleTrajectory(trajectory) = &mut self.mode {
            trajectory.append_point(coordinate, timestamp, annotations);
            self.summary.points_appended += 1;
            return Ok(());
        }

        let entity = entity_id.ok_or_else(|| {
            TrajloadError::InvalidInput("fix without entity id in entity-id mode".to_string())
        })?;

        let key = entity_key(&entity);
        let continues_run = !self.previous_key.is_empty() && self.previous_key == key;

        let resumed = if continues_run || self.policy != RevisitPolicy::Resume {
            None
        } else {
            self.opened.get(&key).cloned()
        };

        if continues_run || resumed.is_some() {
            if let Some(id) = resumed {
                log::debug!("Entity {} reappeared, resuming {}", entity, id);
                self.current_trajectory_id = id;
            }
            let trajectory = model
                .lookup_trajectory(&self.current_trajectory_id)
                .ok_or_else(|| {
                    TrajloadError::InvalidInput(format!(
                        "trajectory {} is not in the model",
                        self.current_trajectory_id
                    ))
                })?;
            trajectory.append_point(coordinate, timestamp, annotations);
        } else {
            let owner = model.create_moving_object(&entity);
            let trajectory_id = format!("{}_0", entity);
            let mut trajectory = model.create_trajectory(&trajectory_id, &owner);
            trajectory.append_point(coordinate, timestamp, annotations);
            model.add_trajectory(trajectory)?;

            log::debug!("Opened trajectory {}", trajectory_id);
            if self.policy == RevisitPolicy::Resume {
                self.opened.insert(key.clone(), trajectory_id.clone());
            }
            self.current_trajectory_id = trajectory_id;
            self.summary.trajectories_created += 1;
        }

        self.summary.points_appended += 1;
        self.previous_key = key;
        Ok(())
    }

    /// End of file: commit the whole-file trajectory if there is one
    pub fn finish<M: TrajectoryModel>(self, model: &mut M) -> Result<GroupingSummary> {
        if let Mode::SingleTrajectory(trajectory) = self.mode {
            model.add_trajectory(trajectory)?;
        }
        Ok(self.summary)
    }
}

/// Case-folded form under which entity ids are compared
fn entity_key(entity: &str) -> String {
    entity.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Coordinate, InMemoryTrajectoryModel};
    use chrono::{Duration, TimeZone, Utc};

    fn fix(entity: Option<&str>, minute: i64) -> Fix {
        Fix {
            entity_id: entity.map(str::to_string),
            timestamp: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minute),
            coordinate: Coordinate::new(minute as f64, minute as f64),
            annotations: Default::default(),
        }
    }

    fn run(entities: &[&str], policy: RevisitPolicy) -> (InMemoryTrajectoryModel, GroupingSummary) {
        let mut model = InMemoryTrajectoryModel::new();
        let mut session = GroupingSession::begin(&mut model, true, policy);
        for (i, e) in entities.iter().enumerate() {
            session.push(&mut model, fix(Some(*e), i as i64)).unwrap();
        }
        let summary = session.finish(&mut model).unwrap();
        (model, summary)
    }

    fn shape(model: &InMemoryTrajectoryModel) -> Vec<(String, usize)> {
        model
            .trajectories()
            .iter()
            .map(|t| (t.id.clone(), t.len()))
            .collect()
    }

    #[test]
    fn test_single_trajectory_without_entity_column() {
        let mut model = InMemoryTrajectoryModel::new();
        let mut session = GroupingSession::begin(&mut model, false, RevisitPolicy::Split);
        assert_eq!(session.current_trajectory_id(), "0_0");

        for minute in 0..5 {
            session.push(&mut model, fix(None, minute)).unwrap();
        }
        // Nothing committed before the end of the file
        assert!(model.trajectories().is_empty());

        let summary = session.finish(&mut model).unwrap();
        assert_eq!(summary.trajectories_created, 1);
        assert_eq!(summary.points_appended, 5);

        let trajectory = model.trajectory("0_0").unwrap();
        assert_eq!(trajectory.owner, "0");
        let lons: Vec<f64> = trajectory.points.iter().map(|p| p.coordinate.lon).collect();
        assert_eq!(lons, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_contiguous_runs() {
        let (model, summary) = run(&["A", "A", "B"], RevisitPolicy::Split);
        assert_eq!(shape(&model), vec![("A_0".to_string(), 2), ("B_0".to_string(), 1)]);
        assert_eq!(summary.trajectories_created, 2);
        assert_eq!(summary.points_appended, 3);
    }

    #[test]
    fn test_entity_match_ignores_case() {
        let (model, _) = run(&["A", "a", "A"], RevisitPolicy::Split);
        assert_eq!(shape(&model), vec![("A_0".to_string(), 3)]);
    }

    #[test]
    fn test_non_ascii_entity_match_ignores_case() {
        for policy in [RevisitPolicy::Split, RevisitPolicy::Resume] {
            let (model, _) = run(&["É", "é"], policy);
            assert_eq!(shape(&model), vec![("É_0".to_string(), 2)], "{:?}", policy);

            let (model, _) = run(&["ÖMER", "ömer", "Ömer"], policy);
            assert_eq!(shape(&model), vec![("ÖMER_0".to_string(), 3)], "{:?}", policy);
        }
    }

    #[test]
    fn test_resume_matches_non_ascii_revisit() {
        let (model, _) = run(&["Ørsted", "B", "øRSTED"], RevisitPolicy::Resume);
        assert_eq!(shape(&model), vec![("Ørsted_0".to_string(), 2), ("B_0".to_string(), 1)]);
    }

    #[test]
    fn test_split_policy_reopens_on_revisit() {
        let (model, summary) = run(&["A", "A", "B", "A"], RevisitPolicy::Split);
        assert_eq!(
            shape(&model),
            vec![
                ("A_0".to_string(), 2),
                ("B_0".to_string(), 1),
                ("A_0".to_string(), 1),
            ]
        );
        assert_eq!(summary.trajectories_created, 3);
        // Same moving object for both A runs
        assert_eq!(model.moving_object_count(), 2);
    }

    #[test]
    fn test_resume_policy_merges_revisit() {
        let (model, summary) = run(&["A", "A", "B", "a", "B"], RevisitPolicy::Resume);
        assert_eq!(shape(&model), vec![("A_0".to_string(), 3), ("B_0".to_string(), 2)]);
        assert_eq!(summary.trajectories_created, 2);
        assert_eq!(summary.points_appended, 5);
    }

    #[test]
    fn test_entity_trajectories_committed_immediately() {
        let mut model = InMemoryTrajectoryModel::new();
        let mut session = GroupingSession::begin(&mut model, true, RevisitPolicy::Split);
        session.push(&mut model, fix(Some("A"), 0)).unwrap();
        assert_eq!(model.trajectories().len(), 1);
        assert_eq!(session.current_trajectory_id(), "A_0");
    }

    #[test]
    fn test_missing_entity_in_entity_mode() {
        let mut model = InMemoryTrajectoryModel::new();
        let mut session = GroupingSession::begin(&mut model, true, RevisitPolicy::Split);
        assert!(session.push(&mut model, fix(None, 0)).is_err());
    }

    #[test]
    fn test_empty_file_still_commits_single_trajectory() {
        let mut model = InMemoryTrajectoryModel::new();
        let session = GroupingSession::begin(&mut model, false, RevisitPolicy::Split);
        session.finish(&mut model).unwrap();
        assert_eq!(shape(&model), vec![("0_0".to_string(), 0)]);
    }
}

use std::collections::{HashMap, HashSet};

use super::{MovingObject, Trajectory, TrajectoryModel};
use crate::error::{Result, TrajloadError};

/// In-memory trajectory model.
///
/// Trajectories are kept in commit order. Ids are not required to be unique: the id
/// index always points at the latest trajectory committed under that id, which is
/// what `lookup_trajectory` returns.
#[derive(Debug, Default)]
pub struct InMemoryTrajectoryModel {
    moving_objects: Vec<MovingObject>,
    known_objects: HashSet<String>,
    trajectories: Vec<Trajectory>,
    index: HashMap<String, usize>,
}

impl InMemoryTrajectoryModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered moving objects, in registration order
    pub fn moving_objects(&self) -> &[MovingObject] {
        &self.moving_objects
    }

    pub fn moving_object_count(&self) -> usize {
        self.moving_objects.len()
    }

    /// Committed trajectories not yet drained, in commit order
    pub fn trajectories(&self) -> &[Trajectory] {
        &self.trajectories
    }

    /// Latest committed trajectory with this id
    pub fn trajectory(&self, id: &str) -> Option<&Trajectory> {
        self.index.get(id).map(|&i| &self.trajectories[i])
    }

    /// Register a moving object that already exists elsewhere (e.g. in a store),
    /// so that allocated entity ids do not collide with it
    pub fn register_moving_object(&mut self, object: MovingObject) {
        if self.known_objects.insert(object.id.clone()) {
            self.moving_objects.push(object);
        }
    }

    /// Hand all committed trajectories to the caller.
    ///
    /// The moving-object registry is kept so that `new_entity_id` keeps counting.
    pub fn drain_trajectories(&mut self) -> Vec<Trajectory> {
        self.index.clear();
        std::mem::take(&mut self.trajectories)
    }
}

impl TrajectoryModel for InMemoryTrajectoryModel {
    fn new_entity_id(&mut self) -> String {
        let mut n = self.moving_objects.len();
        while self.known_objects.contains(&n.to_string()) {
            n += 1;
        }
        n.to_string()
    }

    fn create_moving_object(&mut self, id: &str) -> MovingObject {
        MovingObject { id: id.to_string() }
    }

    fn create_trajectory(&mut self, id: &str, owner: &MovingObject) -> Trajectory {
        Trajectory {
            id: id.to_string(),
            owner: owner.id.clone(),
            points: Vec::new(),
        }
    }

    fn add_trajectory(&mut self, trajectory: Trajectory) -> Result<()> {
        if trajectory.id.is_empty() {
            return Err(TrajloadError::InvalidInput(
                "trajectory id must not be empty".to_string(),
            ));
        }

        self.register_moving_object(MovingObject {
            id: trajectory.owner.clone(),
        });

        if self.index.contains_key(&trajectory.id) {
            log::debug!(
                "Trajectory id {} committed again; lookups now resolve to the newest",
                trajectory.id
            );
        }

        self.index
            .insert(trajectory.id.clone(), self.trajectories.len());
        self.trajectories.push(trajectory);
        Ok(())
    }

    fn lookup_trajectory(&mut self, id: &str) -> Option<&mut Trajectory> {
        let idx = *self.index.get(id)?;
        self.trajectories.get_mut(idx)
    }
}

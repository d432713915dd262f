//! Trajectory model boundary.
//!
//! The importer only talks to storage through [`TrajectoryModel`]. The data types here
//! (coordinates, annotations, moving objects, trajectories) are what flows across it.

pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

pub use memory::InMemoryTrajectoryModel;

/// Position as (longitude, latitude). No range validation is applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lon: f64,
    pub lat: f64,
}

impl Coordinate {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// Declared type of an annotation value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    String,
}

/// A typed annotation value. The importer never coerces, so every value it
/// produces is of kind [`AnnotationKind::String`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationValue {
    pub kind: AnnotationKind,
    pub value: String,
}

impl AnnotationValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            kind: AnnotationKind::String,
            value: value.into(),
        }
    }
}

/// Annotation name -> value, keyed by the header spelling of the column
pub type Annotations = HashMap<String, AnnotationValue>;

/// One decoded input row
#[derive(Debug, Clone, PartialEq)]
pub struct Fix {
    pub entity_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub coordinate: Coordinate,
    pub annotations: Annotations,
}

/// A position attached to a trajectory at a given instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub coordinate: Coordinate,
    pub timestamp: DateTime<Utc>,
    pub annotations: Annotations,
}

/// Logical entity whose positions are tracked
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MovingObject {
    pub id: String,
}

/// Ordered sequence of points for one moving object.
///
/// The owner is referenced by id; its lifetime belongs to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub id: String,
    pub owner: String,
    pub points: Vec<TrajectoryPoint>,
}

impl Trajectory {
    /// Append a point. Points are kept in insertion order, never re-sorted.
    pub fn append_point(
        &mut self,
        coordinate: Coordinate,
        timestamp: DateTime<Utc>,
        annotations: Annotations,
    ) {
        self.points.push(TrajectoryPoint {
            coordinate,
            timestamp,
            annotations,
        });
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Capabilities the importer consumes from a trajectory model.
///
/// All calls happen from a single thread in the order driven by
/// [`GroupingSession`](crate::ingest::grouping::GroupingSession).
pub trait TrajectoryModel {
    /// Allocate a fresh entity id for files without an entity column
    fn new_entity_id(&mut self) -> String;

    /// Build a moving object handle for `id`
    fn create_moving_object(&mut self, id: &str) -> MovingObject;

    /// Build an empty trajectory owned by `owner`
    fn create_trajectory(&mut self, id: &str, owner: &MovingObject) -> Trajectory;

    /// Commit a trajectory. Called exactly once per created trajectory.
    fn add_trajectory(&mut self, trajectory: Trajectory) -> Result<()>;

    /// Most recently committed trajectory with this id
    fn lookup_trajectory(&mut self, id: &str) -> Option<&mut Trajectory>;
}

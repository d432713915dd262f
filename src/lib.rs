pub mod config;
pub mod error;
pub mod db;
pub mod ingest;
pub mod model;

pub use config::Config;
pub use error::{TrajloadError, Result};
pub use ingest::{Importer, ImportSettings, RunReport, import_path};
pub use model::{InMemoryTrajectoryModel, Trajectory, TrajectoryModel};

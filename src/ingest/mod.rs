pub mod walker;
pub mod metadata;
pub mod time_format;
pub mod schema;
pub mod decoder;
pub mod grouping;
pub mod importer;
pub mod incremental;
pub mod persist;

pub use walker::{DiscoveredFile, discover_files};
pub use incremental::{FileClassification, HashedFile, classify_files, find_deleted_files};
pub use metadata::{compute_file_hash, store_key};
pub use time_format::{TimeFormat, DEFAULT_TIME_FORMAT};
pub use schema::{ColumnKind, RecordSchema};
pub use decoder::decode_row;
pub use grouping::{GroupingSession, GroupingSummary, RevisitPolicy};
pub use importer::{ErrorPolicy, FileOutcome, FileReport, ImportSettings, Importer, RunReport};
pub use persist::import_into_store;

use std::path::Path;

use crate::model::TrajectoryModel;

/// Convenience function to import a file or directory with default settings
/// apart from the time format.
pub fn import_path<M: TrajectoryModel>(
    model: &mut M,
    path: &Path,
    time_format: &str,
) -> crate::error::Result<RunReport> {
    let settings = ImportSettings {
        time_format: TimeFormat::new(time_format)?,
        ..ImportSettings::default()
    };
    Importer::new(settings, model).import_path(path)
}

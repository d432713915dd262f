//! Import files into the SQLite store, one file per transaction.

use uuid::Uuid;

use crate::db::TrajectoryStore;
use crate::error::Result;
use crate::model::InMemoryTrajectoryModel;

use super::importer::{FileOutcome, FileReport, Importer, RunReport};
use super::incremental::HashedFile;
use super::metadata::store_key;

/// Import `files` in order and store the trajectories of every imported file.
///
/// The model is drained after each file, so trajectories of a failed file never
/// reach the store. The run row `run_id` (already begun) is closed with the files
/// processed so far, also when an error ends the run early.
pub fn import_into_store(
    importer: &mut Importer<'_, InMemoryTrajectoryModel>,
    store: &mut TrajectoryStore,
    files: &[HashedFile],
    run_id: &Uuid,
) -> Result<RunReport> {
    let mut report = RunReport::default();
    let total = files.len();

    for (idx, hashed) in files.iter().enumerate() {
        log::info!("[{}/{}] Importing: {}", idx + 1, total, hashed.file.relative_path);

        match import_one(importer, store, hashed, run_id) {
            Ok(file_report) => report.files.push(file_report),
            Err(e) => {
                let discarded = importer.model_mut().drain_trajectories();
                log::error!(
                    "Run {} stopped at {} ({} partial trajectories discarded)",
                    run_id,
                    hashed.file.relative_path,
                    discarded.len()
                );

                let mut failed = FileReport::new(&hashed.file);
                failed.outcome = FileOutcome::Failed(e.to_string());
                report.files.push(failed);
                store.finish_run(run_id, &report)?;
                return Err(e);
            }
        }
    }

    store.finish_run(run_id, &report)?;
    Ok(report)
}

fn import_one(
    importer: &mut Importer<'_, InMemoryTrajectoryModel>,
    store: &mut TrajectoryStore,
    hashed: &HashedFile,
    run_id: &Uuid,
) -> Result<FileReport> {
    let file_report = importer.import_file(&hashed.file)?;
    let trajectories = importer.model_mut().drain_trajectories();

    if file_report.is_imported() {
        store.save_file(
            &store_key(&hashed.file.absolute_path),
            &hashed.hash,
            &file_report,
            run_id,
            &trajectories,
        )?;
    } else if !trajectories.is_empty() {
        log::warn!(
            "Discarding {} partial trajectories of {}",
            trajectories.len(),
            hashed.file.relative_path
        );
    }

    Ok(file_report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::ingest::importer::{ErrorPolicy, ImportSettings};
    use crate::ingest::incremental::classify_files;
    use crate::ingest::walker::discover_files;
    use crate::model::MovingObject;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const GOOD: &str = "userid,time,lat,lon\n\
                        A,2020-01-01T00:00:00Z,1,2\n\
                        A,2020-01-01T00:01:00Z,1.1,2.1\n";
    const BROKEN: &str = "userid,time,lat,lon\n\
                          A,2020-01-01T00:00:00Z,1,2\n\
                          B,2020-01-01T00:01:00Z,1,2\n\
                          B,not-a-time,1,2\n";

    fn open_store(dir: &TempDir) -> TrajectoryStore {
        TrajectoryStore::open(&Db::new(dir.path().join("traj.db"))).unwrap()
    }

    /// Discover, classify against the store and import what changed
    fn run(
        store: &mut TrajectoryStore,
        root: &Path,
        settings: ImportSettings,
    ) -> (usize, Result<RunReport>) {
        let files = discover_files(root, &settings.extension).unwrap();
        let classification = classify_files(&files, &store.file_hashes().unwrap()).unwrap();

        let mut model = InMemoryTrajectoryModel::new();
        for object in store.moving_objects().unwrap() {
            model.register_moving_object(object);
        }

        let run_id = Uuid::new_v4();
        store.begin_run(&run_id, root).unwrap();
        let mut importer = Importer::new(settings, &mut model);
        let result = import_into_store(&mut importer, store, &classification.to_import(), &run_id);
        (classification.unchanged_files.len(), result)
    }

    #[test]
    fn test_failed_entity_file_stores_nothing() {
        let data = TempDir::new().unwrap();
        fs::write(data.path().join("a_broken.csv"), BROKEN).unwrap();
        fs::write(data.path().join("b_good.csv"), GOOD).unwrap();

        let db_dir = TempDir::new().unwrap();
        let mut store = open_store(&db_dir);
        let (_, result) = run(&mut store, data.path(), ImportSettings::default());
        let report = result.unwrap();

        assert_eq!(report.imported(), 1);
        assert_eq!(report.failed(), 1);
        // A_0 and B_0 of the broken file were committed to the model, then dropped
        assert_eq!(report.files[0].trajectories, 2);

        let stats = store.stats().unwrap();
        assert_eq!(stats.files, 1);
        assert_eq!(stats.trajectories, 1);
        assert_eq!(stats.points, 2);
        assert_eq!(store.moving_objects().unwrap(), vec![MovingObject { id: "A".to_string() }]);

        let keys: Vec<String> = store.file_hashes().unwrap().into_keys().collect();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].ends_with("b_good.csv"));

        let record = store.latest_run().unwrap().unwrap();
        assert_eq!((record.files_imported, record.files_failed), (1, 1));
    }

    #[test]
    fn test_modified_file_replaces_trajectories_and_objects() {
        let data = TempDir::new().unwrap();
        let walk = data.path().join("walk.csv");
        fs::write(&walk, "time,lat,lon\n2020-01-01T00:00:00Z,1,2\n2020-01-01T00:01:00Z,1,2\n")
            .unwrap();

        let db_dir = TempDir::new().unwrap();
        let mut store = open_store(&db_dir);
        run(&mut store, data.path(), ImportSettings::default()).1.unwrap();
        assert_eq!(store.moving_objects().unwrap(), vec![MovingObject { id: "0".to_string() }]);

        fs::write(&walk, "time,lat,lon\n2020-01-02T00:00:00Z,5,6\n").unwrap();
        let (unchanged, result) = run(&mut store, data.path(), ImportSettings::default());
        assert_eq!(unchanged, 0);
        assert_eq!(result.unwrap().total_rows(), 1);

        let stats = store.stats().unwrap();
        assert_eq!(stats.files, 1);
        assert_eq!(stats.trajectories, 1);
        assert_eq!(stats.points, 1);
        // Stored owner "0" was seeded into the model, so the new file got "1"; "0" is gone
        assert_eq!(store.moving_objects().unwrap(), vec![MovingObject { id: "1".to_string() }]);
        assert_eq!(
            store.largest_trajectories(5).unwrap()[0].0,
            "1_0".to_string()
        );
    }

    #[test]
    fn test_unchanged_files_are_skipped() {
        let data = TempDir::new().unwrap();
        fs::write(data.path().join("a.csv"), GOOD).unwrap();
        fs::write(data.path().join("b.csv"), GOOD.replace('A', "B")).unwrap();

        let db_dir = TempDir::new().unwrap();
        let mut store = open_store(&db_dir);
        let first = run(&mut store, data.path(), ImportSettings::default()).1.unwrap();
        assert_eq!(first.imported(), 2);
        let before = store.stats().unwrap();

        fs::write(data.path().join("c.csv"), GOOD.replace('A', "C")).unwrap();
        let (unchanged, result) = run(&mut store, data.path(), ImportSettings::default());
        let second = result.unwrap();

        assert_eq!(unchanged, 2);
        assert_eq!(second.files.len(), 1);
        assert!(second.files[0].relative_path.ends_with("c.csv"));

        let after = store.stats().unwrap();
        assert_eq!(after.files, before.files + 1);
        assert_eq!(after.trajectories, before.trajectories + 1);
        assert_eq!(after.runs, 2);
    }

    #[test]
    fn test_abort_closes_run_with_partial_counts() {
        let data = TempDir::new().unwrap();
        fs::write(data.path().join("a_good.csv"), GOOD).unwrap();
        fs::write(data.path().join("b_broken.csv"), BROKEN).unwrap();
        fs::write(data.path().join("c_good.csv"), GOOD.replace('A', "C")).unwrap();

        let settings = ImportSettings {
            error_policy: ErrorPolicy::Abort,
            ..ImportSettings::default()
        };
        let db_dir = TempDir::new().unwrap();
        let mut store = open_store(&db_dir);
        let (_, result) = run(&mut store, data.path(), settings);
        assert!(result.is_err());

        // Only the file before the failure is stored
        let stats = store.stats().unwrap();
        assert_eq!(stats.files, 1);
        assert_eq!(stats.trajectories, 1);

        let record = store.latest_run().unwrap().unwrap();
        assert!(record.finished_at.is_some());
        assert_eq!((record.files_imported, record.files_failed), (1, 1));
        assert_eq!(record.row_count, 2);
    }
}

//! SQLite persistence for committed trajectories.
//!
//! Each imported file is written in one transaction together with its hash, so the
//! store never holds half of a file. Re-importing a file replaces what it produced
//! before.

use std::collections::HashMap;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use uuid::Uuid;

use crate::error::{Result, TrajloadError};
use crate::ingest::importer::{FileReport, RunReport};
use crate::model::{MovingObject, Trajectory};

use super::{migrate, Db};

/// Row counts of the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub moving_objects: i64,
    pub trajectories: i64,
    pub points: i64,
    pub files: i64,
    pub runs: i64,
}

/// One row of `import_runs`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub id: String,
    pub input_path: String,
    pub started_at: String,
    /// `None` while the run is in progress
    pub finished_at: Option<String>,
    pub files_imported: i64,
    pub files_failed: i64,
    pub row_count: i64,
    pub trajectory_count: i64,
}

/// Trajectory persistence on a single connection
pub struct TrajectoryStore {
    conn: Connection,
}

impl TrajectoryStore {
    /// Open the database and bring its schema up to date
    pub fn open(db: &Db) -> Result<Self> {
        let mut conn = db.open_connection()?;
        let applied = migrate::run_migrations(&mut conn)?;
        log::debug!(
            "Trajectory store ready at {} ({} migrations applied)",
            db.path().display(),
            applied
        );
        Ok(Self { conn })
    }

    /// Ids of every stored moving object
    pub fn moving_objects(&self) -> Result<Vec<MovingObject>> {
        let mut stmt = self.conn.prepare("SELECT id FROM moving_objects ORDER BY id")?;
        let rows = stmt.query_map([], |row| Ok(MovingObject { id: row.get(0)? }))?;
        let mut objects = Vec::new();
        for row in rows {
            objects.push(row?);
        }
        Ok(objects)
    }

    /// Map of stored file key -> file hash
    pub fn file_hashes(&self) -> Result<HashMap<String, String>> {
        let mut stmt = self.conn.prepare("SELECT path, file_hash FROM source_files")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut map = HashMap::new();
        for row in rows {
            let (path, hash) = row?;
            map.insert(path, hash);
        }
        Ok(map)
    }

    /// Persist the trajectories produced by one successfully imported file.
    ///
    /// Earlier trajectories of the same file are removed first, along with any moving
    /// object that owned nothing else.
    pub fn save_file(
        &mut self,
        key: &str,
        file_hash: &str,
        report: &FileReport,
        run_id: &Uuid,
        trajectories: &[Trajectory],
    ) -> Result<()> {
        if !report.is_imported() {
            return Err(TrajloadError::InvalidInput(format!(
                "refusing to store failed file {}",
                report.relative_path
            )));
        }

        let tx = self.conn.transaction()?;
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        tx.execute("DELETE FROM trajectories WHERE source_path = ?1", params![key])?;
        tx.execute(
            "INSERT INTO source_files (path, file_hash, row_count, entity_mode, imported_at, run_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(path) DO UPDATE SET
                file_hash = excluded.file_hash,
                row_count = excluded.row_count,
                entity_mode = excluded.entity_mode,
                imported_at = excluded.imported_at,
                run_id = excluded.run_id",
            params![
                key,
                file_hash,
                report.rows as i64,
                report.entity_mode.unwrap_or(false),
                now,
                run_id.to_string(),
            ],
        )?;

        {
            let mut insert_object =
                tx.prepare("INSERT OR IGNORE INTO moving_objects (id) VALUES (?1)")?;
            let mut insert_trajectory = tx.prepare(
                "INSERT INTO trajectories
                    (trajectory_id, moving_object_id, source_path, point_count, started_at, ended_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            let mut insert_point = tx.prepare(
                "INSERT INTO points (trajectory_pk, seq, ts, lon, lat, annotations)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;

            for trajectory in trajectories {
                insert_object.execute(params![trajectory.owner])?;

                let started_at = trajectory.points.first().map(|p| p.timestamp.to_rfc3339());
                let ended_at = trajectory.points.last().map(|p| p.timestamp.to_rfc3339());
                insert_trajectory.execute(params![
                    trajectory.id,
                    trajectory.owner,
                    key,
                    trajectory.len() as i64,
                    started_at,
                    ended_at,
                ])?;
                let trajectory_pk = tx.last_insert_rowid();

                for (seq, point) in trajectory.points.iter().enumerate() {
                    let annotations = serde_json::to_string(&point.annotations)?;
                    insert_point.execute(params![
                        trajectory_pk,
                        seq as i64,
                        point.timestamp.to_rfc3339(),
                        point.coordinate.lon,
                        point.coordinate.lat,
                        annotations,
                    ])?;
                }
            }
        }

        let orphans = remove_orphaned_objects(&tx)?;
        tx.commit()?;
        log::debug!(
            "Stored {} trajectories for {} ({} stale moving objects removed)",
            trajectories.len(),
            key,
            orphans
        );
        Ok(())
    }

    /// Remove files (and, by cascade, their trajectories and points).
    /// Moving objects left without trajectories are removed too.
    pub fn delete_files(&mut self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let mut deleted = 0;
        for key in keys {
            deleted += tx.execute("DELETE FROM source_files WHERE path = ?1", params![key])?;
        }
        remove_orphaned_objects(&tx)?;
        tx.commit()?;

        Ok(deleted)
    }

    /// Record the start of a run
    pub fn begin_run(&self, run_id: &Uuid, input_path: &Path) -> Result<()> {
        self.conn.execute(
            "INSERT INTO import_runs (id, input_path, started_at) VALUES (?1, ?2, ?3)",
            params![
                run_id.to_string(),
                input_path.to_string_lossy().to_string(),
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            ],
        )?;
        Ok(())
    }

    /// Record the aggregate outcome of a run
    pub fn finish_run(&self, run_id: &Uuid, report: &RunReport) -> Result<()> {
        self.conn.execute(
            "UPDATE import_runs SET
                finished_at = ?2,
                files_imported = ?3,
                files_failed = ?4,
                row_count = ?5,
                trajectory_count = ?6
             WHERE id = ?1",
            params![
                run_id.to_string(),
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                report.imported() as i64,
                report.failed() as i64,
                report.total_rows() as i64,
                report.total_trajectories() as i64,
            ],
        )?;
        Ok(())
    }

    /// Most recently started run
    pub fn latest_run(&self) -> Result<Option<RunRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, input_path, started_at, finished_at,
                        files_imported, files_failed, row_count, trajectory_count
                 FROM import_runs
                 ORDER BY started_at DESC, rowid DESC
                 LIMIT 1",
                [],
                |row| {
                    Ok(RunRecord {
                        id: row.get(0)?,
                        input_path: row.get(1)?,
                        started_at: row.get(2)?,
                        finished_at: row.get(3)?,
                        files_imported: row.get(4)?,
                        files_failed: row.get(5)?,
                        row_count: row.get(6)?,
                        trajectory_count: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Row counts per table
    pub fn stats(&self) -> Result<StoreStats> {
        let count = |table: &str| -> Result<i64> {
            let sql = format!("SELECT COUNT(*) FROM {}", table);
            Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
        };

        Ok(StoreStats {
            moving_objects: count("moving_objects")?,
            trajectories: count("trajectories")?,
            points: count("points")?,
            files: count("source_files")?,
            runs: count("import_runs")?,
        })
    }

    /// Largest stored trajectories as (trajectory id, source file, point count)
    pub fn largest_trajectories(&self, limit: usize) -> Result<Vec<(String, String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT trajectory_id, source_path, point_count
             FROM trajectories
             ORDER BY point_count DESC, pk
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }
}

/// Drop moving objects no trajectory refers to any more
fn remove_orphaned_objects(tx: &Transaction) -> Result<usize> {
    Ok(tx.execute(
        "DELETE FROM moving_objects
         WHERE id NOT IN (SELECT DISTINCT moving_object_id FROM trajectories)",
        [],
    )?)
}

//! Ingestion orchestration: discover -> resolve header -> decode rows -> group.
//!
//! Files are processed strictly one after another. Each file yields a [`FileReport`];
//! whether a failed file stops the run is decided by [`ErrorPolicy`].

use std::path::{Path, PathBuf};

use csv::{ByteRecord, ReaderBuilder, Trim};
use serde::Deserialize;

use crate::error::{Result, TrajloadError};
use crate::model::TrajectoryModel;

use super::decoder::decode_row;
use super::grouping::{GroupingSession, RevisitPolicy};
use super::schema::RecordSchema;
use super::time_format::TimeFormat;
use super::walker::{discover_files, DiscoveredFile};

/// What a failed file means for the rest of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Record and log the failure, continue with the next file
    #[default]
    Skip,
    /// Stop the run and return the error
    Abort,
}

/// Settings that drive one import run
#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub time_format: TimeFormat,
    /// File suffix recognised during directory discovery, without the dot
    pub extension: String,
    pub delimiter: u8,
    pub revisit_policy: RevisitPolicy,
    pub error_policy: ErrorPolicy,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            time_format: TimeFormat::default(),
            extension: "csv".to_string(),
            delimiter: b',',
            revisit_policy: RevisitPolicy::default(),
            error_policy: ErrorPolicy::default(),
        }
    }
}

/// How a single file ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Imported,
    Failed(String),
}

/// Result of importing one file
#[derive(Debug, Clone)]
pub struct FileReport {
    pub relative_path: String,
    pub absolute_path: PathBuf,
    /// Whether the header declared an entity column; `None` if it was never read
    pub entity_mode: Option<bool>,
    /// Rows decoded and grouped
    pub rows: usize,
    /// Trajectories committed to the model
    pub trajectories: usize,
    pub outcome: FileOutcome,
}

impl FileReport {
    pub(crate) fn new(file: &DiscoveredFile) -> Self {
        Self {
            relative_path: file.relative_path.clone(),
            absolute_path: file.absolute_path.clone(),
            entity_mode: None,
            rows: 0,
            trajectories: 0,
            outcome: FileOutcome::Imported,
        }
    }

    pub fn is_imported(&self) -> bool {
        self.outcome == FileOutcome::Imported
    }
}

/// Aggregate over all files of a run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub files: Vec<FileReport>,
}

impl RunReport {
    pub fn imported(&self) -> usize {
        self.files.iter().filter(|f| f.is_imported()).count()
    }

    pub fn failed(&self) -> usize {
        self.files.len() - self.imported()
    }

    pub fn total_rows(&self) -> usize {
        self.files.iter().map(|f| f.rows).sum()
    }

    pub fn total_trajectories(&self) -> usize {
        self.files.iter().map(|f| f.trajectories).sum()
    }

    /// True when every file was imported
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Streams files into a [`TrajectoryModel`]
pub struct Importer<'m, M: TrajectoryModel> {
    settings: ImportSettings,
    model: &'m mut M,
}

impl<'m, M: TrajectoryModel> Importer<'m, M> {
    pub fn new(settings: ImportSettings, model: &'m mut M) -> Self {
        Self { settings, model }
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    pub fn model_mut(&mut self) -> &mut M {
        self.model
    }

    /// Import a single file or every matching file under a directory.
    ///
    /// Fails with [`TrajloadError::PathNotFound`] before any I/O when `path` is
    /// neither a file nor a directory.
    pub fn import_path(&mut self, path: &Path) -> Result<RunReport> {
        let files = discover_files(path, &self.settings.extension)?;
        self.import_files(&files)
    }

    /// Import the given files in order
    pub fn import_files(&mut self, files: &[DiscoveredFile]) -> Result<RunReport> {
        let mut report = RunReport::default();
        let total = files.len();

        for (idx, file) in files.iter().enumerate() {
            log::info!("[{}/{}] Importing: {}", idx + 1, total, file.relative_path);
            report.files.push(self.import_file(file)?);
        }

        log::info!(
            "Import finished: {} file(s), {} imported, {} failed, {} rows, {} trajectories",
            report.files.len(),
            report.imported(),
            report.failed(),
            report.total_rows(),
            report.total_trajectories()
        );
        Ok(report)
    }

    /// Import one file.
    ///
    /// Under [`ErrorPolicy::Skip`] a failure is returned inside the report. Under
    /// [`ErrorPolicy::Abort`] it is returned as the error.
    pub fn import_file(&mut self, file: &DiscoveredFile) -> Result<FileReport> {
        let mut report = FileReport::new(file);

        match self.read_file(&file.absolute_path, &mut report) {
            Ok(()) => {
                log::info!(
                    "✓ {} ({} rows, {} trajectories)",
                    file.relative_path,
                    report.rows,
                    report.trajectories
                );
            }
            Err(e) => {
                log::error!("✗ {}: {}", file.relative_path, e);
                if self.settings.error_policy == ErrorPolicy::Abort {
                    return Err(e);
                }
                report.outcome = FileOutcome::Failed(e.to_string());
            }
        }

        Ok(report)
    }

    /// Stream one file. The reader is dropped on every return path.
    fn read_file(&mut self, path: &Path, report: &mut FileReport) -> Result<()> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.settings.delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(Trim::Headers)
            .from_path(path)?;

        let headers: Vec<String> = reader
            .byte_headers()?
            .iter()
            .map(|h| String::from_utf8_lossy(h).into_owned())
            .collect();
        let schema = RecordSchema::resolve(
            headers.iter().map(String::as_str),
            &self.settings.time_format,
        )?;
        report.entity_mode = Some(schema.has_entity_id());

        let mut session =
            GroupingSession::begin(self.model, schema.has_entity_id(), self.settings.revisit_policy);

        let mut record = ByteRecord::new();
        let streamed = loop {
            match reader.read_byte_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(e) => break Err(TrajloadError::from(e)),
            }

            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let fix = match decode_row(&record, line, &schema) {
                Ok(fix) => fix,
                Err(e) => break Err(e),
            };
            if let Err(e) = session.push(self.model, fix) {
                break Err(e);
            }

            report.rows += 1;
            log::debug!(
                "lineNo={}, rowNo={}, trajectory={}",
                line,
                report.rows,
                session.current_trajectory_id()
            );
        };

        if let Err(e) = streamed {
            report.trajectories = session.committed();
            return Err(e);
        }

        let summary = session.finish(self.model)?;
        report.trajectories = summary.trajectories_created;
        Ok(())
    }
}

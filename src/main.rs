use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use trajload::db::{Db, TrajectoryStore};
use trajload::ingest::{
    classify_files, discover_files, find_deleted_files, import_into_store, FileOutcome,
    FileReport, HashedFile, Importer, RunReport,
};
use trajload::model::InMemoryTrajectoryModel;
use trajload::Config;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "trajload")]
#[command(about = "Import position fixes into trajectories (incremental by default)")]
struct Args {
    /// File or directory to import (overrides import.input_path)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Time pattern for the `time` column (overrides import.time_format)
    #[arg(short, long)]
    time_format: Option<String>,

    /// Re-import all files, ignoring stored hashes
    #[arg(short, long)]
    force: bool,

    /// Remove stored files that no longer exist under the input path
    #[arg(short, long)]
    cleanup: bool,

    /// Import into memory only and print the summary; nothing is stored
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Validated once, after command-line overrides and before any file I/O
    let config = Config::load()?.with_overrides(args.input.clone(), args.time_format.clone())?;

    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", config.storage.log_level.as_str())
    ).init();

    let settings = config.import.settings()?;
    let input = config.input_path()?.to_path_buf();
    let input = std::fs::canonicalize(&input).unwrap_or(input);

    log::info!("Starting trajectory import");
    log::info!("Input: {}", input.display());
    log::info!("Time format: {}", settings.time_format.pattern());

    let files = discover_files(&input, &settings.extension)?;
    if files.is_empty() {
        log::warn!("No .{} files found under {}", settings.extension, input.display());
        return Ok(());
    }

    let mut model = InMemoryTrajectoryModel::new();

    if args.dry_run {
        let report = Importer::new(settings, &mut model).import_files(&files)?;
        print_summary(&report, &model);
        return Ok(());
    }

    let db = Db::new(config.db_path());
    let mut store = TrajectoryStore::open(&db)?;
    log::info!("Database: {}", config.db_path().display());

    // Keep allocated entity ids clear of stored ones
    for object in store.moving_objects()? {
        model.register_moving_object(object);
    }

    let classification = classify_files(&files, &store.file_hashes()?)?;
    let to_import: Vec<HashedFile> = if args.force {
        log::info!("Mode: full re-import ({} files)", files.len());
        classification
            .to_import()
            .into_iter()
            .chain(classification.unchanged_files.iter().cloned())
            .collect()
    } else {
        log::info!(
            "Classification: new={}, modified={}, unchanged (skip)={}",
            classification.new_files.len(),
            classification.modified_files.len(),
            classification.unchanged_files.len(),
        );
        classification.to_import()
    };

    let run_id = Uuid::new_v4();
    store.begin_run(&run_id, &input)?;

    let start = Instant::now();
    let mut importer = Importer::new(settings, &mut model);
    let report = import_into_store(&mut importer, &mut store, &to_import, &run_id)?;

    if args.cleanup || !input.is_file() {
        let stored = store.file_hashes()?;
        let deleted = find_deleted_files(&input, stored.keys(), &files);
        if deleted.is_empty() {
            log::debug!("No stored files missing from disk");
        } else if args.cleanup {
            let n = store.delete_files(&deleted)?;
            log::info!("Cleaned up {} file(s) no longer on disk", n);
        } else {
            log::info!(
                "Found {} stored file(s) no longer on disk (use --cleanup to remove)",
                deleted.len()
            );
        }
    }

    log::info!("=== Import Complete ({}) ===", run_id);
    log::info!("Files discovered: {}", files.len());
    log::info!(
        "Files processed: {} (success: {}, errors: {})",
        report.files.len(),
        report.imported(),
        report.failed()
    );
    log::info!("Rows: {}", report.total_rows());
    log::info!("Trajectories: {}", report.total_trajectories());
    log::info!("Time: {:?}", start.elapsed());

    if !report.is_success() {
        log::warn!("Some files failed to import:");
        for file in report.files.iter().filter(|f| !f.is_imported()) {
            log_failure(file);
        }
    }

    Ok(())
}

fn log_failure(file: &FileReport) {
    if let FileOutcome::Failed(reason) = &file.outcome {
        log::warn!("  {}: {}", file.relative_path, reason);
    }
}

fn print_summary(report: &RunReport, model: &InMemoryTrajectoryModel) {
    println!("\n=== Dry run ===\n");
    println!("{:<40} {:>8} {:>14} {:>8}", "File", "Rows", "Trajectories", "Status");
    println!("{:-<74}", "");
    for file in &report.files {
        let status = if file.is_imported() { "ok" } else { "failed" };
        println!(
            "{:<40} {:>8} {:>14} {:>8}",
            file.relative_path, file.rows, file.trajectories, status
        );
    }
    println!("{:-<74}", "");
    println!(
        "{} moving objects, {} trajectories, {} rows",
        model.moving_object_count(),
        model.trajectories().len(),
        report.total_rows()
    );
    for file in report.files.iter().filter(|f| !f.is_imported()) {
        log_failure(file);
    }
}

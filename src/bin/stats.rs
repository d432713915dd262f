use trajload::{config::Config, db::{Db, TrajectoryStore}};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load()?;
    let db = Db::new(config.db_path());
    let store = TrajectoryStore::open(&db)?;

    let stats = store.stats()?;

    println!("\n=== Trajectory Store Statistics ===\n");
    println!("Database: {}\n", config.db_path().display());
    println!("{:-<40}", "");
    println!("{:<25} {:>14}", "Moving objects", stats.moving_objects);
    println!("{:<25} {:>14}", "Trajectories", stats.trajectories);
    println!("{:<25} {:>14}", "Points", stats.points);
    println!("{:<25} {:>14}", "Source files", stats.files);
    println!("{:<25} {:>14}", "Import runs", stats.runs);
    println!("{:-<40}", "");

    if let Some(run) = store.latest_run()? {
        println!("\nLast run: {} ({})", run.id, run.input_path);
        match &run.finished_at {
            Some(finished) => println!(
                "  {} -> {}: {} imported, {} failed, {} rows, {} trajectories",
                run.started_at,
                finished,
                run.files_imported,
                run.files_failed,
                run.row_count,
                run.trajectory_count
            ),
            None => println!("  started {}, not finished", run.started_at),
        }
    }

    if stats.trajectories == 0 {
        println!("\nNo trajectories stored yet. Run `trajload --input <path>` first.");
        return Ok(());
    }

    let avg = stats.points as f64 / stats.trajectories as f64;
    println!("\nAverage points per trajectory: {:.1}", avg);

    println!("\nLargest trajectories:\n");
    println!("{:<30} {:>10}  {}", "Trajectory", "Points", "Source");
    println!("{:-<80}", "");
    for (id, source, points) in store.largest_trajectories(10)? {
        println!("{:<30} {:>10}  {}", id, points, source);
    }
    println!("{:-<80}", "");

    Ok(())
}

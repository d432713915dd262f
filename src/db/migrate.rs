//! Schema migrations compiled into the binary.
//!
//! The SQL lives in `migrations/` and is embedded at build time, so the binaries do
//! not depend on the working directory. Applied versions are tracked in
//! `schema_migrations`.

use std::collections::HashMap;

use rusqlite::{params, Connection};

use crate::error::{Result, TrajloadError};

/// One schema step, applied at most once per database
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Every migration of the trajectory store, in version order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "001_core_tables",
        sql: include_str!("../../migrations/001_core_tables.sql"),
    },
    Migration {
        version: 2,
        name: "002_import_runs",
        sql: include_str!("../../migrations/002_import_runs.sql"),
    },
];

fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Applied migrations as (version, name), oldest first
pub fn applied_migrations(conn: &Connection) -> Result<Vec<(u32, String)>> {
    ensure_migrations_table(conn)?;
    let mut stmt = conn.prepare("SELECT version, name FROM schema_migrations ORDER BY version")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut applied = Vec::new();
    for row in rows {
        applied.push(row?);
    }
    Ok(applied)
}

/// Bring the store schema up to date. Returns how many migrations were applied.
pub fn run_migrations(conn: &mut Connection) -> Result<usize> {
    apply_migrations(conn, MIGRATIONS)
}

fn apply_migrations(conn: &mut Connection, migrations: &[Migration]) -> Result<usize> {
    if let Some(pair) = migrations.windows(2).find(|w| w[0].version >= w[1].version) {
        return Err(TrajloadError::Migration {
            name: pair[1].name.to_string(),
            reason: format!("version {} does not follow {}", pair[1].version, pair[0].version),
        });
    }

    let applied: HashMap<u32, String> = applied_migrations(conn)?.into_iter().collect();
    let mut count = 0;

    for migration in migrations {
        match applied.get(&migration.version) {
            Some(name) if name == migration.name => {
                log::debug!("Migration {} already applied", migration.name);
                continue;
            }
            Some(name) => {
                return Err(TrajloadError::Migration {
                    name: migration.name.to_string(),
                    reason: format!(
                        "database records version {} as '{}'",
                        migration.version, name
                    ),
                });
            }
            None => {}
        }

        log::info!("Applying migration {}", migration.name);
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| TrajloadError::Migration {
                name: migration.name.to_string(),
                reason: e.to_string(),
            })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Connection {
        Connection::open(dir.path().join("test.db")).unwrap()
    }

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .unwrap()
    }

    #[test]
    fn test_embedded_schema_is_created_once() {
        let dir = TempDir::new().unwrap();
        let mut conn = open(&dir);

        assert_eq!(run_migrations(&mut conn).unwrap(), MIGRATIONS.len());
        assert_eq!(run_migrations(&mut conn).unwrap(), 0);

        let tables = table_names(&conn);
        for table in ["moving_objects", "source_files", "trajectories", "points", "import_runs", "schema_migrations"] {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }

        let applied = applied_migrations(&conn).unwrap();
        assert_eq!(
            applied,
            vec![(1, "001_core_tables".to_string()), (2, "002_import_runs".to_string())]
        );
    }

    #[test]
    fn test_embedded_migrations_are_ordered() {
        assert!(MIGRATIONS.windows(2).all(|w| w[0].version < w[1].version));
    }

    #[test]
    fn test_out_of_order_list_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut conn = open(&dir);
        let steps = [
            Migration { version: 2, name: "002_b", sql: "CREATE TABLE b (id INTEGER);" },
            Migration { version: 1, name: "001_a", sql: "CREATE TABLE a (id INTEGER);" },
        ];
        let err = apply_migrations(&mut conn, &steps).unwrap_err();
        assert!(matches!(err, TrajloadError::Migration { .. }));
        assert!(!table_names(&conn).contains(&"a".to_string()));
    }

    #[test]
    fn test_recorded_name_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut conn = open(&dir);
        ensure_migrations_table(&conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (1, '001_something_else')",
            [],
        )
        .unwrap();

        let err = run_migrations(&mut conn).unwrap_err();
        assert!(err.to_string().contains("001_something_else"));
    }

    #[test]
    fn test_failed_migration_is_not_recorded() {
        let dir = TempDir::new().unwrap();
        let mut conn = open(&dir);
        let steps = [
            Migration { version: 1, name: "001_ok", sql: "CREATE TABLE ok (id INTEGER);" },
            Migration { version: 2, name: "002_broken", sql: "CREATE TABLE (;" },
        ];

        let err = apply_migrations(&mut conn, &steps).unwrap_err();
        assert!(err.to_string().contains("002_broken"));
        assert_eq!(applied_migrations(&conn).unwrap(), vec![(1, "001_ok".to_string())]);
    }
}

//! Model schema migrations.
//!
//! # Responsibility
//! - List the `model_objects` schema steps in version order.
//! - Apply pending steps in one transaction and verify the result.
//!
//! # Invariants
//! - Versions increase by one per step.
//! - A step's `tables` are the tables it creates; `ensure_model_schema`
//!   checks every one of them.

use crate::db::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
    tables: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "model_objects",
        sql: include_str!("0001_init.sql"),
        tables: &["model_objects"],
    },
    Migration {
        version: 2,
        name: "revision_index",
        sql: include_str!("0002_revision_index.sql"),
        tables: &[],
    },
];

/// Latest model schema version this build understands.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Current `PRAGMA user_version` of `conn`.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

/// Brings `conn` to the latest model schema.
///
/// # Errors
/// - `DbError::UnsupportedSchemaVersion` when the file is ahead of this build.
/// - `DbError::Migration` naming the step that failed; the whole batch is
///   rolled back.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current = schema_version(conn)?;
    let latest = latest_version();
    if current > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }

    let pending = MIGRATIONS
        .iter()
        .filter(|migration| migration.version > current)
        .collect::<Vec<_>>();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in pending {
        tx.execute_batch(migration.sql)
            .and_then(|()| {
                tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))
            })
            .map_err(|source| {
                error!(
                    "event=db_migrate module=db status=error version={} name={} error={}",
                    migration.version, migration.name, source
                );
                DbError::Migration {
                    version: migration.version,
                    name: migration.name,
                    source,
                }
            })?;
        info!(
            "event=db_migrate module=db status=ok version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;
    Ok(())
}

/// Checks that `conn` is ready for the model store without changing it.
///
/// # Errors
/// - `DbError::SchemaBehind` when the version is not the latest.
/// - `DbError::MissingTable` for the first table a migration should have
///   created but that is absent.
pub fn ensure_model_schema(conn: &Connection) -> DbResult<()> {
    let expected = latest_version();
    let actual = schema_version(conn)?;
    if actual != expected {
        return Err(DbError::SchemaBehind { expected, actual });
    }

    for table in MIGRATIONS
        .iter()
        .flat_map(|migration| migration.tables.iter().copied())
    {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(DbError::MissingTable(table));
        }
    }
    Ok(())
}

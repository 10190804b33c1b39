use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use crate::activity::{Activity, NewActivity};
use crate::errors::{Error, Result};
use crate::route_codec;

/* Durable storage for finished activities. One SQLite database holding a
single `activities` table; the `route` column stores the encoded point
sequence (see `route_codec`). Records are immutable once inserted, except
for deletion.

The store is an explicitly constructed instance with an init/close
lifecycle. Every operation before a successful `init` fails fast with
`NotInitialized` instead of opening the database implicitly. */

const DB_FILE_NAME: &str = "activities.db";

fn init_metadata_and_get_version(tx: &Transaction) -> rusqlite::Result<usize> {
    tx.execute(
        "CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY NOT NULL UNIQUE, value TEXT);",
        (),
    )?;
    let version: Option<String> = tx
        .query_row("SELECT value FROM metadata WHERE key = 'version';", (), |row| row.get(0))
        .optional()?;
    Ok(version.and_then(|v| v.parse().ok()).unwrap_or(0))
}

fn set_version_in_metadata(tx: &Transaction, version: usize) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('version', ?1);",
        (version.to_string(),),
    )?;
    Ok(())
}

#[allow(clippy::type_complexity)]
fn open_db_and_run_migration(
    support_dir: &Path,
    file_name: &str,
    migrations: &[&dyn Fn(&Transaction) -> rusqlite::Result<()>],
) -> Result<Connection> {
    debug!("open and run migration for {}", file_name);
    let mut conn =
        Connection::open(support_dir.join(file_name)).map_err(Error::StorageUnavailable)?;
    let tx = conn.transaction().map_err(Error::StorageUnavailable)?;

    let version = init_metadata_and_get_version(&tx).map_err(Error::StorageUnavailable)?;
    let target_version = migrations.len();
    debug!(
        "current version = {}, target version = {}",
        version, target_version
    );
    match version.cmp(&target_version) {
        Ordering::Equal => (),
        Ordering::Less => {
            for (i, migration) in migrations.iter().enumerate().skip(version) {
                info!("running migration for version: {}", i + 1);
                migration(&tx).map_err(Error::StorageUnavailable)?;
            }
            set_version_in_metadata(&tx, target_version).map_err(Error::StorageUnavailable)?;
        }
        Ordering::Greater => {
            // database written by a newer build; refuse rather than guess
            return Err(Error::MalformedRecord(format!(
                "schema version too high: current = {version}, supported = {target_version}"
            )));
        }
    }
    tx.commit().map_err(Error::StorageUnavailable)?;
    Ok(conn)
}

fn run_migrations(tx: &Transaction) -> rusqlite::Result<()> {
    let sql = "
    CREATE TABLE activities (
        id       INTEGER PRIMARY KEY AUTOINCREMENT
                         UNIQUE
                         NOT NULL,
        name     TEXT    NOT NULL,
        date     TEXT    NOT NULL, -- ISO-8601, second precision, UTC
        duration INTEGER NOT NULL,
        distance REAL    NOT NULL,
        route    TEXT    NOT NULL,
        photoUri TEXT
    );
    CREATE INDEX activities_date_index ON activities (
        date DESC
    );
    ";
    for s in sql_split::split(sql) {
        tx.execute(&s, ())?;
    }
    Ok(())
}

pub struct ActivityStore {
    support_dir: PathBuf,
    conn: Option<Connection>,
}

impl ActivityStore {
    /// Creates a handle on `<support_dir>/activities.db` without touching
    /// the filesystem. Call `init` before any other operation.
    pub fn new<P: AsRef<Path>>(support_dir: P) -> ActivityStore {
        ActivityStore {
            support_dir: support_dir.as_ref().to_path_buf(),
            conn: None,
        }
    }

    /// Opens the database and brings the schema up to date. Idempotent,
    /// safe to call on every process start.
    pub fn init(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn = open_db_and_run_migration(&self.support_dir, DB_FILE_NAME, &[&run_migrations])?;
        self.conn = Some(conn);
        Ok(())
    }

    /// Releases the database handle. Subsequent operations fail with
    /// `NotInitialized` until `init` is called again.
    pub fn close(&mut self) {
        self.conn = None;
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(Error::NotInitialized)
    }

    /// Inserts a finished activity and returns its assigned id. The insert
    /// is a single transaction, never partially written.
    pub fn save(&mut self, activity: &NewActivity) -> Result<i64> {
        let route = route_codec::encode(&activity.route)?;
        let conn = self.conn.as_mut().ok_or(Error::NotInitialized)?;
        let tx = conn.transaction().map_err(Error::Persistence)?;
        tx.execute(
            "INSERT INTO activities (name, date, duration, distance, route, photoUri) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            (
                &activity.name,
                activity.date.to_rfc3339_opts(SecondsFormat::Secs, true),
                activity.duration_secs,
                activity.distance_km,
                route,
                &activity.photo_uri,
            ),
        )
        .map_err(Error::Persistence)?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(Error::Persistence)?;
        info!("activity saved: id={}", id);
        Ok(id)
    }

    /// Returns the matching record when `id` is given (empty when absent),
    /// otherwise all records ordered by date descending.
    pub fn query(&self, id: Option<i64>) -> Result<Vec<Activity>> {
        let conn = self.conn()?;
        let sql_all = "SELECT id, name, date, duration, distance, route, photoUri FROM activities ORDER BY date DESC, id DESC;";
        let sql_one = "SELECT id, name, date, duration, distance, route, photoUri FROM activities WHERE id = ?1;";
        let mut statement = conn
            .prepare(if id.is_some() { sql_one } else { sql_all })
            .map_err(Error::Persistence)?;
        let mut rows = match id {
            Some(id) => statement.query((id,)),
            None => statement.query(()),
        }
        .map_err(Error::Persistence)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().map_err(Error::Persistence)? {
            let f = || -> rusqlite::Result<(i64, String, String, i64, f64, String, Option<String>)> {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            };
            let (id, name, date, duration_secs, distance_km, route, photo_uri) =
                f().map_err(Error::Persistence)?;
            results.push(Activity {
                id,
                name,
                date: parse_stored_date(&date)?,
                duration_secs,
                distance_km,
                route: route_codec::decode(&route)?,
                photo_uri,
            });
        }
        Ok(results)
    }

    /// Removes the record with the given id; returns whether a record was
    /// actually removed. An unknown id is a normal `false`, not an error.
    pub fn delete(&mut self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let changes = conn
            .execute("DELETE FROM activities WHERE id = ?1;", (id,))
            .map_err(Error::Persistence)?;
        if changes > 0 {
            info!("activity deleted: id={}", id);
        }
        Ok(changes > 0)
    }
}

fn parse_stored_date(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::MalformedRecord(format!("date {text:?}: {e}")))
}

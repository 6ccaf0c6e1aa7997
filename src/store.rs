//! SQLite-backed activity store.
//!
//! The store is the pipeline's single external collaborator: unique-key
//! inserts, point append, predicate finds and the SQL aggregation surface the
//! analytics passes lean on. Timestamps are stored as `YYYY-MM-DD HH:MM:SS`
//! text so `strftime`/`julianday` work natively; absent altitudes are SQL
//! NULL. Connection retry with a bounded budget lives here, not in the core.

use std::path::Path;
use std::thread;
use std::time::Duration;

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, TrackError};
use crate::types::{Activity, TrackPoint, User, TRAJECTORY_TIME_FORMAT};

/// Attempts made by [`ActivityStore::open`] before giving up.
const OPEN_ATTEMPTS: u32 = 3;

/// Delay between connection attempts.
const OPEN_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Activity window row used by the reconciler and verifier: the identifying
/// fields of an activity without its point payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityWindow {
    pub id: i64,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub mode: Option<String>,
}

/// Handle to the persisted `users`/`activities`/`trackpoints` collections.
pub struct ActivityStore {
    conn: Connection,
}

impl ActivityStore {
    // ========================================================================
    // Connection & schema
    // ========================================================================

    /// Open (or create) the store at `path`, retrying within a bounded budget.
    /// Exhausting the budget is fatal for the run.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_retry(path, OPEN_ATTEMPTS, OPEN_RETRY_DELAY)
    }

    /// Open with an explicit retry budget.
    pub fn open_with_retry(path: &Path, attempts: u32, delay: Duration) -> Result<Self> {
        let mut last_error = None;
        for attempt in 1..=attempts.max(1) {
            match Connection::open(path) {
                Ok(conn) => {
                    log::info!("connected to store at {}", path.display());
                    return Ok(Self { conn });
                }
                Err(err) => {
                    log::warn!(
                        "store connection attempt {attempt}/{attempts} failed: {err}"
                    );
                    last_error = Some(err);
                    if attempt < attempts {
                        thread::sleep(delay);
                    }
                }
            }
        }

        Err(TrackError::StoreUnavailable {
            attempts: attempts.max(1),
            message: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Create the collections and their indexes.
    pub fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id    TEXT PRIMARY KEY,
                has_labels INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS activities (
                activity_id INTEGER PRIMARY KEY,
                user_id     TEXT NOT NULL,
                mode        TEXT,
                start_time  TEXT NOT NULL,
                end_time    TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(user_id)
            );

            CREATE TABLE IF NOT EXISTS trackpoints (
                activity_id  INTEGER NOT NULL,
                seq          INTEGER NOT NULL,
                lat          REAL NOT NULL,
                lon          REAL NOT NULL,
                altitude     INTEGER,
                elapsed_days REAL NOT NULL,
                time         TEXT NOT NULL,
                PRIMARY KEY (activity_id, seq),
                FOREIGN KEY (activity_id) REFERENCES activities(activity_id)
                    ON DELETE CASCADE
            ) WITHOUT ROWID;

            CREATE INDEX IF NOT EXISTS idx_activities_user ON activities(user_id);
            CREATE INDEX IF NOT EXISTS idx_activities_mode ON activities(mode);
            "#,
        )?;
        log::info!("collections and indexes created");
        Ok(())
    }

    /// Drop all collections. The pipeline runs this before re-ingesting.
    pub fn drop_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "DROP TABLE IF EXISTS trackpoints;
             DROP TABLE IF EXISTS activities;
             DROP TABLE IF EXISTS users;",
        )?;
        log::info!("collections dropped");
        Ok(())
    }

    // ========================================================================
    // Inserts & updates
    // ========================================================================

    /// Insert a user. A duplicate key is reported, never overwritten.
    pub fn insert_user(&self, user: &User) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO users (user_id, has_labels) VALUES (?1, ?2)",
                params![user.id, user.has_labels],
            )
            .map_err(|err| {
                map_constraint(err, || TrackError::DuplicateUser {
                    user_id: user.id.clone(),
                })
            })?;
        Ok(())
    }

    /// Insert an activity row with an unset mode. A duplicate key is
    /// reported, never overwritten.
    pub fn insert_activity(
        &self,
        activity_id: i64,
        user_id: &str,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO activities (activity_id, user_id, mode, start_time, end_time)
                 VALUES (?1, ?2, NULL, ?3, ?4)",
                params![
                    activity_id,
                    user_id,
                    fmt_time(start_time),
                    fmt_time(end_time)
                ],
            )
            .map_err(|err| map_constraint(err, || TrackError::DuplicateActivity { activity_id }))?;
        Ok(())
    }

    /// Append a batch of points to an activity, preserving order.
    pub fn append_trackpoints(&mut self, activity_id: i64, points: &[TrackPoint]) -> Result<()> {
        let base: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM trackpoints WHERE activity_id = ?1",
            params![activity_id],
            |row| row.get(0),
        )?;

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO trackpoints
                     (activity_id, seq, lat, lon, altitude, elapsed_days, time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for (offset, point) in points.iter().enumerate() {
                stmt.execute(params![
                    activity_id,
                    base + offset as i64,
                    point.lat,
                    point.lon,
                    point.altitude,
                    point.elapsed_days,
                    fmt_time(point.time),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Assign a transportation mode to an activity.
    pub fn set_mode(&self, activity_id: i64, mode: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE activities SET mode = ?1 WHERE activity_id = ?2",
            params![mode, activity_id],
        )?;
        Ok(())
    }

    // ========================================================================
    // Finds
    // ========================================================================

    /// Users with `has_labels` set, ascending by id.
    pub fn users_with_labels(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id FROM users WHERE has_labels = 1 ORDER BY user_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Activity windows for one user, ascending by activity id.
    pub fn activity_windows(&self, user_id: &str) -> Result<Vec<ActivityWindow>> {
        let mut stmt = self.conn.prepare(
            "SELECT activity_id, start_time, end_time, mode
             FROM activities WHERE user_id = ?1 ORDER BY activity_id",
        )?;
        let windows = stmt
            .query_map(params![user_id], |row| {
                Ok(ActivityWindow {
                    id: row.get(0)?,
                    start_time: parse_time(1, &row.get::<_, String>(1)?)?,
                    end_time: parse_time(2, &row.get::<_, String>(2)?)?,
                    mode: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(windows)
    }

    /// `(activity_id, user_id)` for every activity, ascending by activity id.
    /// Point-level passes iterate this and load one activity's points at a
    /// time rather than materializing the whole dataset.
    pub fn activity_refs(&self) -> Result<Vec<(i64, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT activity_id, user_id FROM activities ORDER BY activity_id")?;
        let refs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(refs)
    }

    /// Ordered points of one activity.
    pub fn trackpoints(&self, activity_id: i64) -> Result<Vec<TrackPoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT lat, lon, altitude, elapsed_days, time
             FROM trackpoints WHERE activity_id = ?1 ORDER BY seq",
        )?;
        let points = stmt
            .query_map(params![activity_id], |row| {
                Ok(TrackPoint {
                    lat: row.get(0)?,
                    lon: row.get(1)?,
                    altitude: row.get(2)?,
                    elapsed_days: row.get(3)?,
                    time: parse_time(4, &row.get::<_, String>(4)?)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(points)
    }

    /// Load a full activity, points included.
    pub fn activity(&self, activity_id: i64) -> Result<Option<Activity>> {
        let header = self
            .conn
            .query_row(
                "SELECT user_id, mode, start_time, end_time
                 FROM activities WHERE activity_id = ?1",
                params![activity_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        parse_time(2, &row.get::<_, String>(2)?)?,
                        parse_time(3, &row.get::<_, String>(3)?)?,
                    ))
                },
            )
            .optional()?;

        let Some((user_id, mode, start_time, end_time)) = header else {
            return Ok(None);
        };

        Ok(Some(Activity {
            id: activity_id,
            user_id,
            mode,
            start_time,
            end_time,
            points: self.trackpoints(activity_id)?,
        }))
    }

    /// Activity ids matching a user / mode / calendar-year predicate.
    pub fn activity_ids_filtered(
        &self,
        user_id: &str,
        mode: &str,
        year: i32,
    ) -> Result<Vec<i64>> {
        let lower = format!("{year:04}-01-01 00:00:00");
        let upper = format!("{:04}-01-01 00:00:00", year + 1);
        let mut stmt = self.conn.prepare(
            "SELECT activity_id FROM activities
             WHERE user_id = ?1 AND mode = ?2
               AND start_time >= ?3 AND start_time < ?4
             ORDER BY activity_id",
        )?;
        let ids = stmt
            .query_map(params![user_id, mode, lower, upper], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Distinct users with at least one activity of the given mode,
    /// ascending by id.
    pub fn users_with_mode(&self, mode: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT user_id FROM activities WHERE mode = ?1 ORDER BY user_id",
        )?;
        let ids = stmt
            .query_map(params![mode], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    // ========================================================================
    // Aggregations
    // ========================================================================

    pub fn count_users(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
    }

    pub fn count_activities(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM activities", [], |row| row.get(0))?)
    }

    pub fn count_trackpoints(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM trackpoints", [], |row| row.get(0))?)
    }

    /// Mean activity count over users that have at least one activity.
    pub fn average_activities_per_user(&self) -> Result<f64> {
        let avg: Option<f64> = self.conn.query_row(
            "SELECT AVG(cnt) FROM
                 (SELECT COUNT(*) AS cnt FROM activities GROUP BY user_id)",
            [],
            |row| row.get(0),
        )?;
        Ok(avg.unwrap_or(0.0))
    }

    /// Users ranked by activity count descending; id ascending on ties.
    pub fn top_users_by_activity_count(&self, limit: usize) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, COUNT(*) AS cnt FROM activities
             GROUP BY user_id ORDER BY cnt DESC, user_id ASC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Activity count per non-null mode, descending; mode ascending on ties.
    pub fn mode_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT mode, COUNT(*) AS cnt FROM activities
             WHERE mode IS NOT NULL
             GROUP BY mode ORDER BY cnt DESC, mode ASC",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// `(user_id, mode, count)` per non-null mode, grouped per user.
    pub fn mode_counts_per_user(&self) -> Result<Vec<(String, String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, mode, COUNT(*) AS cnt FROM activities
             WHERE mode IS NOT NULL
             GROUP BY user_id, mode ORDER BY user_id ASC, mode ASC",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Year with the most activities, if any activities exist.
    pub fn year_with_most_activities(&self) -> Result<Option<(i32, i64)>> {
        Ok(self
            .conn
            .query_row(
                "SELECT CAST(strftime('%Y', start_time) AS INTEGER) AS y, COUNT(*) AS cnt
                 FROM activities GROUP BY y ORDER BY cnt DESC, y ASC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?)
    }

    /// Year with the most recorded hours, if any activities exist.
    pub fn year_with_most_hours(&self) -> Result<Option<(i32, f64)>> {
        Ok(self
            .conn
            .query_row(
                "SELECT CAST(strftime('%Y', start_time) AS INTEGER) AS y,
                        SUM((strftime('%s', end_time) - strftime('%s', start_time)) / 3600.0) AS hours
                 FROM activities GROUP BY y ORDER BY hours DESC, y ASC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?)
    }
}

fn fmt_time(time: NaiveDateTime) -> String {
    time.format(TRAJECTORY_TIME_FORMAT).to_string()
}

fn parse_time(column: usize, text: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TRAJECTORY_TIME_FORMAT).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
    })
}

/// Map a SQLite constraint violation to a domain duplicate-key error.
fn map_constraint(err: rusqlite::Error, dup: impl FnOnce() -> TrackError) -> TrackError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            dup()
        }
        _ => TrackError::Store(err),
    }
}

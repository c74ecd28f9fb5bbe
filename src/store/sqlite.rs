// src/store/sqlite.rs

//! SQLite-backed job store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use tracing::{debug, info};

use super::{EMAIL_SCRUBBED, Job, JobStore};
use crate::errors::{JobchainError, Result};
use crate::types::{JobId, JobStatus, JobType, QueueRef, Statistic};

#[derive(Debug)]
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

/// Column values as stored, before conversion into domain types.
struct RawJobRow {
    id: String,
    job_type: String,
    status: String,
    queue_ref: Option<i64>,
    title: Option<String>,
    email: Option<String>,
    main_search_job: Option<String>,
    depending_on: Option<String>,
    post_time: String,
    start_time: Option<String>,
    finish_time: Option<String>,
}

impl SqliteJobStore {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened sqlite job store");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| JobchainError::StoreUnavailable("sqlite connection lock poisoned".into()))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS issued_ids (
              id TEXT PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS jobs (
              id TEXT PRIMARY KEY,
              job_type TEXT NOT NULL,
              status TEXT NOT NULL,
              queue_ref INTEGER,
              title TEXT,
              email TEXT,
              main_search_job TEXT,
              depending_on TEXT,
              post_time TEXT NOT NULL,
              start_time TEXT,
              finish_time TEXT
            );

            CREATE TABLE IF NOT EXISTS child_jobs (
              root TEXT NOT NULL,
              position INTEGER NOT NULL,
              child TEXT NOT NULL,
              PRIMARY KEY (root, child)
            );

            CREATE TABLE IF NOT EXISTS statistics (
              name TEXT PRIMARY KEY,
              count INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )?;

        for stat in Statistic::ALL {
            conn.execute(
                "INSERT OR IGNORE INTO statistics (name, count) VALUES (?1, 0)",
                params![stat.as_str()],
            )?;
        }
        Ok(())
    }

    fn children_of(conn: &Connection, root: &str) -> Result<Vec<JobId>> {
        let mut stmt =
            conn.prepare("SELECT child FROM child_jobs WHERE root = ?1 ORDER BY position")?;
        let rows = stmt.query_map(params![root], |row| row.get::<_, String>(0))?;
        let mut children = Vec::new();
        for child in rows {
            children.push(JobId::new(child?));
        }
        Ok(children)
    }

    fn status_of(conn: &Connection, id: &JobId) -> Result<Option<JobStatus>> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT status FROM jobs WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| parse_status(&s)).transpose()
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| JobchainError::StoreUnavailable(format!("corrupt timestamp '{raw}': {e}")))
}

fn parse_status(raw: &str) -> Result<JobStatus> {
    raw.parse().map_err(JobchainError::StoreUnavailable)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

const SELECT_JOB: &str = "SELECT id, job_type, status, queue_ref, title, email, main_search_job,
        depending_on, post_time, start_time, finish_time
 FROM jobs";

impl RawJobRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            job_type: row.get(1)?,
            status: row.get(2)?,
            queue_ref: row.get(3)?,
            title: row.get(4)?,
            email: row.get(5)?,
            main_search_job: row.get(6)?,
            depending_on: row.get(7)?,
            post_time: row.get(8)?,
            start_time: row.get(9)?,
            finish_time: row.get(10)?,
        })
    }

    fn into_job(self, child_jobs: Vec<JobId>) -> Result<Job> {
        let job_type: JobType = self
            .job_type
            .parse()
            .map_err(JobchainError::StoreUnavailable)?;
        Ok(Job {
            id: JobId::new(self.id),
            job_type,
            status: parse_status(&self.status)?,
            queue_ref: self.queue_ref.map(|r| QueueRef(r as u64)),
            title: self.title,
            email: self.email,
            main_search_job: self.main_search_job.map(JobId::new),
            child_jobs,
            depending_on: self.depending_on.map(JobId::new),
            post_time: parse_time(&self.post_time)?,
            start_time: self.start_time.as_deref().map(parse_time).transpose()?,
            finish_time: self.finish_time.as_deref().map(parse_time).transpose()?,
        })
    }
}

impl JobStore for SqliteJobStore {
    fn get(&self, id: &JobId) -> Result<Option<Job>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("{SELECT_JOB} WHERE id = ?1"),
                params![id.as_str()],
                RawJobRow::from_row,
            )
            .optional()?;

        match raw {
            Some(raw) => {
                let children = Self::children_of(&conn, id.as_str())?;
                Ok(Some(raw.into_job(children)?))
            }
            None => Ok(None),
        }
    }

    fn insert(&self, job: &Job) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        match tx.execute(
            "INSERT INTO issued_ids (id) VALUES (?1)",
            params![job.id.as_str()],
        ) {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(JobchainError::IdConflict(job.id.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        tx.execute(
            "INSERT INTO jobs (id, job_type, status, queue_ref, title, email, main_search_job,
                               depending_on, post_time, start_time, finish_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                job.id.as_str(),
                job.job_type.as_str(),
                job.status.as_str(),
                job.queue_ref.map(|r| r.0 as i64),
                job.title,
                job.email,
                job.main_search_job.as_ref().map(JobId::as_str),
                job.depending_on.as_ref().map(JobId::as_str),
                job.post_time.to_rfc3339(),
                job.start_time.map(|t| t.to_rfc3339()),
                job.finish_time.map(|t| t.to_rfc3339()),
            ],
        )?;

        for (position, child) in job.child_jobs.iter().enumerate() {
            tx.execute(
                "INSERT OR IGNORE INTO child_jobs (root, position, child) VALUES (?1, ?2, ?3)",
                params![job.id.as_str(), position as i64, child.as_str()],
            )?;
        }

        if let Some(root) = &job.main_search_job {
            tx.execute(
                "INSERT OR IGNORE INTO child_jobs (root, position, child)
                 SELECT ?1, (SELECT COALESCE(MAX(position), -1) + 1 FROM child_jobs WHERE root = ?1), ?2
                 WHERE EXISTS (SELECT 1 FROM jobs WHERE id = ?1)",
                params![root.as_str(), job.id.as_str()],
            )?;
        }

        tx.commit()?;
        debug!(job = %job.id, "inserted job row");
        Ok(())
    }

    fn delete(&self, id: &JobId) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM jobs WHERE id = ?1", params![id.as_str()])?;
        tx.execute(
            "DELETE FROM child_jobs WHERE root = ?1 OR child = ?1",
            params![id.as_str()],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn set_queue_ref(&self, id: &JobId, queue_ref: QueueRef) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE jobs SET queue_ref = ?2 WHERE id = ?1",
            params![id.as_str(), queue_ref.0 as i64],
        )?;
        if changed == 0 {
            return Err(JobchainError::JobNotFound(id.clone()));
        }
        Ok(())
    }

    fn transition(
        &self,
        id: &JobId,
        from: JobStatus,
        to: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE jobs SET
               status = ?3,
               start_time = CASE WHEN ?3 = 'running' THEN COALESCE(start_time, ?4) ELSE start_time END,
               finish_time = CASE WHEN ?3 IN ('finished', 'failed') THEN COALESCE(finish_time, ?4) ELSE finish_time END
             WHERE id = ?1 AND status = ?2",
            params![id.as_str(), from.as_str(), to.as_str(), at.to_rfc3339()],
        )?;

        if changed == 1 {
            if let Some(stat) = Statistic::for_status(to) {
                tx.execute(
                    "UPDATE statistics SET count = count + 1 WHERE name = ?1",
                    params![stat.as_str()],
                )?;
            }
            tx.commit()?;
            return Ok(());
        }

        match Self::status_of(&tx, id)? {
            Some(actual) => Err(JobchainError::InvalidTransition {
                job: id.clone(),
                from: actual,
                to,
            }),
            None => Err(JobchainError::JobNotFound(id.clone())),
        }
    }

    fn scrub_email(&self, id: &JobId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE jobs SET email = ?2 WHERE id = ?1 AND email IS NOT NULL AND email != ''",
            params![id.as_str(), EMAIL_SCRUBBED],
        )?;
        Ok(())
    }

    fn statistic(&self, stat: Statistic) -> Result<u64> {
        let conn = self.conn()?;
        let count: Option<i64> = conn
            .query_row(
                "SELECT count FROM statistics WHERE name = ?1",
                params![stat.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0) as u64)
    }

    fn job_ids(&self) -> Result<Vec<JobId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM jobs ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for id in rows {
            ids.push(JobId::new(id?));
        }
        Ok(ids)
    }

    fn id_issued(&self, id: &JobId) -> Result<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM issued_ids WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn unfinished_jobs(&self) -> Result<Vec<Job>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_JOB} WHERE status NOT IN ('finished', 'failed') ORDER BY post_time, id"
        ))?;
        let rows = stmt.query_map([], RawJobRow::from_row)?;
        let mut jobs = Vec::new();
        for raw in rows {
            let raw = raw?;
            let children = Self::children_of(&conn, &raw.id)?;
            jobs.push(raw.into_job(children)?);
        }
        Ok(jobs)
    }

    fn last_queue_ref(&self) -> Result<Option<QueueRef>> {
        let conn = self.conn()?;
        let last: Option<i64> =
            conn.query_row("SELECT MAX(queue_ref) FROM jobs", [], |row| row.get(0))?;
        Ok(last.map(|r| QueueRef(r as u64)))
    }
}

//! Job repository: the durable record behind the in-memory queues.
//!
//! Live scheduling state lives in the queue itself; these rows survive
//! restarts and feed the health endpoint's per-queue counts.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub queue: String,
    pub document_id: Option<String>,
    pub priority: String,
    pub state: String,
    pub attempts: u32,
    pub error: Option<String>,
    pub payload: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRecord {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            queue: row.get("queue")?,
            document_id: row.get("document_id")?,
            priority: row.get("priority")?,
            state: row.get("state")?,
            attempts: row.get("attempts")?,
            error: row.get("error")?,
            payload: row.get("payload")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Per-queue state counts for the health endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &JobRecord) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, queue, document_id, priority, state, attempts, error,
             payload, created_at, updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                job.id,
                job.queue,
                job.document_id,
                job.priority,
                job.state,
                job.attempts,
                job.error,
                job.payload,
                job.created_at,
                job.updated_at,
                job.completed_at,
            ],
        )?;
        Ok(())
    })
}

/// Records a state change. `completed_at` is stamped when the state is
/// terminal-success.
pub fn update_state(
    db: &Database,
    id: &str,
    state: &str,
    attempts: u32,
    error: Option<&str>,
) -> Result<(), DatabaseError> {
    let now = chrono::Utc::now().to_rfc3339();
    let completed_at = (state == "COMPLETED").then(|| now.clone());
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET state = ?2, attempts = ?3, error = ?4, updated_at = ?5,
             completed_at = COALESCE(?6, completed_at)
             WHERE id = ?1",
            params![id, state, attempts, error, now, completed_at],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRecord::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Counts jobs per state for one queue.
pub fn counts_for_queue(db: &Database, queue: &str) -> Result<QueueCounts, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT state, COUNT(*) FROM jobs WHERE queue = ?1 GROUP BY state")?;
        let rows = stmt.query_map(params![queue], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let (state, count) = row?;
            match state.as_str() {
                "QUEUED" => counts.waiting = count,
                "ACTIVE" => counts.active = count,
                "DELAYED" => counts.delayed = count,
                "COMPLETED" => counts.completed = count,
                "FAILED" => counts.failed = count,
                _ => {}
            }
        }
        Ok(counts)
    })
}

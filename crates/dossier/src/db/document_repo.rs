//! Document repository: the single writer for document rows.
//!
//! Every status change goes through a guarded UPDATE whose WHERE clause
//! encodes the allowed source states, so illegal transitions (and lost races
//! between workers) fall out as zero affected rows instead of bad data. The
//! `version` column is bumped on every mutation.

use chrono::{Duration, Utc};
use rusqlite::{params, Row};

use super::{Database, DatabaseError};
use crate::document::{Document, DocumentOutcome, ProcessingStatus, ERROR_MARKER};

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn from_row(row: &Row<'_>) -> Result<Document, rusqlite::Error> {
    let id: String = row.get("id")?;
    let status_raw: String = row.get("status")?;
    let timeline_raw: Option<String> = row.get("timeline")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    let parse_ts = |raw: &str, col: &'static str| {
        chrono::DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| {
                rusqlite::Error::InvalidColumnType(0, col.to_string(), rusqlite::types::Type::Text)
            })
    };

    Ok(Document {
        id: id.clone(),
        case_id: row.get("case_id")?,
        file_name: row.get("file_name")?,
        mime_type: row.get("mime_type")?,
        size_bytes: row.get::<_, i64>("size_bytes")? as u64,
        storage_path: row.get("storage_path")?,
        status: ProcessingStatus::parse(&status_raw).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(0, "status".to_string(), rusqlite::types::Type::Text)
        })?,
        extracted_text: row.get("extracted_text")?,
        summary: row.get("summary")?,
        timeline: timeline_raw
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    0,
                    "timeline".to_string(),
                    rusqlite::types::Type::Text,
                )
            })?
            .unwrap_or_default(),
        translation_en: row.get("translation_en")?,
        translation_ar: row.get("translation_ar")?,
        version: row.get("version")?,
        created_at: parse_ts(&created_at, "created_at")?,
        updated_at: parse_ts(&updated_at, "updated_at")?,
    })
}

/// Inserts a new document row in its current state.
pub fn insert(db: &Database, doc: &Document) -> Result<(), DatabaseError> {
    let timeline = serde_json::to_string(&doc.timeline).unwrap_or_else(|_| "[]".to_string());
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO documents (id, case_id, file_name, mime_type, size_bytes,
             storage_path, status, extracted_text, summary, timeline, translation_en,
             translation_ar, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                doc.id,
                doc.case_id,
                doc.file_name,
                doc.mime_type,
                doc.size_bytes as i64,
                doc.storage_path,
                doc.status.as_str(),
                doc.extracted_text,
                doc.summary,
                timeline,
                doc.translation_en,
                doc.translation_ar,
                doc.version,
                doc.created_at.to_rfc3339(),
                doc.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    })
}

/// Finds a document by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Document>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM documents WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], from_row)?;
        match rows.next() {
            Some(Ok(doc)) => Ok(Some(doc)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists every document belonging to a case, newest first.
pub fn list_by_case(db: &Database, case_id: &str) -> Result<Vec<Document>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM documents WHERE case_id = ?1 ORDER BY created_at DESC")?;
        let docs = stmt
            .query_map(params![case_id], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(docs)
    })
}

/// Claims a document for processing: PENDING or FAILED rows move to
/// PROCESSING and take a fresh lease. Returns false when the document is in
/// any other state, including when another worker already claimed it.
pub fn mark_processing(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    let ts = now();
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents
             SET status = 'PROCESSING', lease_at = ?2, updated_at = ?2,
                 version = version + 1
             WHERE id = ?1 AND status IN ('PENDING', 'FAILED')",
            params![id, ts],
        )?;
        Ok(changed == 1)
    })
}

/// Persists a completed pipeline run in one statement: status, extracted
/// content, enrichments, and the content-derived file name all land together
/// or not at all. Only a PROCESSING document can complete.
pub fn complete(db: &Database, id: &str, outcome: &DocumentOutcome) -> Result<bool, DatabaseError> {
    let timeline = serde_json::to_string(&outcome.timeline).unwrap_or_else(|_| "[]".to_string());
    let ts = now();
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents
             SET status = 'PROCESSED',
                 extracted_text = ?2,
                 summary = ?3,
                 timeline = ?4,
                 translation_en = ?5,
                 translation_ar = ?6,
                 file_name = COALESCE(?7, file_name),
                 lease_at = NULL,
                 updated_at = ?8,
                 version = version + 1
             WHERE id = ?1 AND status = 'PROCESSING'",
            params![
                id,
                outcome.extracted_text,
                outcome.summary,
                timeline,
                outcome.translation_en,
                outcome.translation_ar,
                outcome.title,
                ts,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Saves extracted text mid-run so a later enrichment failure cannot lose a
/// successful extraction. The document stays PROCESSING and keeps its lease.
pub fn store_extracted_text(db: &Database, id: &str, text: &str) -> Result<bool, DatabaseError> {
    let ts = now();
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents
             SET extracted_text = ?2, updated_at = ?3, version = version + 1
             WHERE id = ?1 AND status = 'PROCESSING'",
            params![id, text, ts],
        )?;
        Ok(changed == 1)
    })
}

/// Refreshes the derived content of an already PROCESSED document, leaving
/// the status and extracted text untouched. Used by re-analysis jobs.
pub fn update_enrichment(
    db: &Database,
    id: &str,
    outcome: &DocumentOutcome,
) -> Result<bool, DatabaseError> {
    let timeline = serde_json::to_string(&outcome.timeline).unwrap_or_else(|_| "[]".to_string());
    let ts = now();
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents
             SET summary = ?2,
                 timeline = ?3,
                 translation_en = ?4,
                 translation_ar = ?5,
                 file_name = COALESCE(?6, file_name),
                 updated_at = ?7,
                 version = version + 1
             WHERE id = ?1 AND status = 'PROCESSED'",
            params![
                id,
                outcome.summary,
                timeline,
                outcome.translation_en,
                outcome.translation_ar,
                outcome.title,
                ts,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Marks a PROCESSING document as terminally failed. The error message is
/// written into `extracted_text` behind the error marker so the failure is
/// visible wherever the content is shown.
pub fn fail(db: &Database, id: &str, message: &str) -> Result<bool, DatabaseError> {
    let text = format!("{ERROR_MARKER} {message}");
    let ts = now();
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents
             SET status = 'FAILED', extracted_text = ?2, lease_at = NULL,
                 updated_at = ?3, version = version + 1
             WHERE id = ?1 AND status = 'PROCESSING'",
            params![id, text, ts],
        )?;
        Ok(changed == 1)
    })
}

/// Resets PROCESSING documents whose lease expired back to PENDING so a
/// crashed worker cannot strand them. Returns the number of rows reset.
pub fn sweep_stale(db: &Database, stale_secs: u64) -> Result<u64, DatabaseError> {
    let cutoff = (Utc::now() - Duration::seconds(stale_secs as i64)).to_rfc3339();
    let ts = now();
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents
             SET status = 'PENDING', lease_at = NULL, updated_at = ?2,
                 version = version + 1
             WHERE status = 'PROCESSING' AND lease_at IS NOT NULL AND lease_at < ?1",
            params![cutoff, ts],
        )?;
        if changed > 0 {
            log::warn!("Reset {changed} stale PROCESSING document(s) to PENDING");
        }
        Ok(changed as u64)
    })
}

/// Counts documents with the given status.
pub fn count_by_status(db: &Database, status: ProcessingStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

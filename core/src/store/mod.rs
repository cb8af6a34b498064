//! SQLite persistence layer.
//!
//! RULE: Only store/ talks to the database.
//! The pipeline never touches SQL; callers hand a finished RunOutput
//! to `persist_run`, which validates it before writing anything.

use crate::{
    config::PipelineConfig,
    engine::RunOutput,
    error::PipelineResult,
    event::EventLogEntry,
    types::RunId,
    validation,
};
mod output;
mod summary;
use rusqlite::{params, Connection, OptionalExtension};

pub struct GapStore {
    conn: Connection,
}

/// Completion status of a persisted run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run_id: RunId,
    pub granularity: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub retained: Option<i64>,
    pub rejected: Option<i64>,
}

impl GapStore {
    /// Open (or create) the results database at `path`.
    pub fn open(path: &str) -> PipelineResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PipelineResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> PipelineResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_recommendations.sql"))?;
        Ok(())
    }

    /// A fresh, unique run identifier.
    pub fn new_run_id() -> RunId {
        format!("run-{}", uuid::Uuid::new_v4())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, config: &PipelineConfig) -> PipelineResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, granularity, config_json, started_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                run_id,
                config.granularity.name(),
                serde_json::to_string(config)?,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn run_record(&self, run_id: &str) -> PipelineResult<Option<RunRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT run_id, granularity, started_at, completed_at, retained, rejected
                 FROM run WHERE run_id = ?1",
                params![run_id],
                |row| {
                    Ok(RunRecord {
                        run_id: row.get(0)?,
                        granularity: row.get(1)?,
                        started_at: row.get(2)?,
                        completed_at: row.get(3)?,
                        retained: row.get(4)?,
                        rejected: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Validate `output` and write every table for `run_id` in one
    /// transaction. On ValidationFailure nothing is written.
    pub fn persist_run(&self, run_id: &str, output: &RunOutput) -> PipelineResult<()> {
        validation::validate_output(output)?;

        let tx = self.conn.unchecked_transaction()?;
        output::insert_adoption(&tx, run_id, output.adoption.records())?;
        output::insert_opportunities(&tx, run_id, &output.opportunities)?;
        output::insert_rejections(&tx, run_id, &output.rejections)?;
        summary::insert_summaries(&tx, run_id, &output.summaries)?;

        for (seq, event) in output.events.iter().enumerate() {
            tx.execute(
                "INSERT INTO event_log (run_id, seq, stage, event_type, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    run_id,
                    seq as i64,
                    event.stage_name(),
                    event.type_name(),
                    serde_json::to_string(event)?,
                ],
            )?;
        }

        tx.execute(
            "UPDATE run SET completed_at = ?1, retained = ?2, rejected = ?3
             WHERE run_id = ?4",
            params![
                chrono::Utc::now().to_rfc3339(),
                output.opportunities.len() as i64,
                output.rejections.len() as i64,
                run_id,
            ],
        )?;
        tx.commit()?;

        log::debug!(
            "run {run_id} persisted: {} opportunities, {} summaries",
            output.opportunities.len(),
            output.summaries.len()
        );
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn events_for_run(&self, run_id: &str) -> PipelineResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, seq, stage, event_type, payload
             FROM event_log WHERE run_id = ?1
             ORDER BY seq ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    run_id: row.get(1)?,
                    seq: row.get::<_, i64>(2)? as u64,
                    stage: row.get(3)?,
                    event_type: row.get(4)?,
                    payload: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

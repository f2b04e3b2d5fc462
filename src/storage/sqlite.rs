//! SQLite storage implementation

use crate::fetcher::FetchOutput;
use crate::generator::{Segment, SelectorEntry};
use crate::record::{CrawlRecord, CrawlStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RecordStore, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus, SegmentStage};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn upsert_in(conn: &Connection, records: &[(String, CrawlRecord)]) -> StorageResult<usize> {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO records (url, status, fetch_time, score, data) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(url) DO UPDATE SET status = excluded.status,
             fetch_time = excluded.fetch_time, score = excluded.score, data = excluded.data",
        )?;
        for (url, record) in records {
            stmt.execute(params![
                url,
                record.status.code(),
                record.fetch_time,
                f64::from(record.score),
                record.to_json()?
            ])?;
        }
        Ok(records.len())
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        phase: row.get(1)?,
        segment: row.get(2)?,
        started_at: row.get(3)?,
        finished_at: row.get(4)?,
        config_hash: row.get(5)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(6)?)
            .unwrap_or(RunStatus::Interrupted),
    })
}

const RUN_COLUMNS: &str = "id, phase, segment, started_at, finished_at, config_hash, status";

impl RecordStore for SqliteStore {
    // ===== Record Db =====

    fn load_records(&self) -> StorageResult<Vec<(String, CrawlRecord)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url, data FROM records ORDER BY url")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(url, data)| Ok((url, CrawlRecord::from_json(&data)?)))
            .collect()
    }

    fn get_record(&self, url: &str) -> StorageResult<Option<CrawlRecord>> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM records WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;

        Ok(data.map(|d| CrawlRecord::from_json(&d)).transpose()?)
    }

    fn upsert_records(&mut self, records: &[(String, CrawlRecord)]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        let written = Self::upsert_in(&tx, records)?;
        tx.commit()?;
        Ok(written)
    }

    fn write_records(&mut self, records: &[(String, CrawlRecord)]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM records", [])?;
        let written = Self::upsert_in(&tx, records)?;
        tx.commit()?;
        Ok(written)
    }

    fn count_by_status(&self) -> StorageResult<HashMap<CrawlStatus, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM records GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, u8>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts = HashMap::new();
        for (code, count) in rows {
            match CrawlStatus::from_code(code) {
                Some(status) => {
                    counts.insert(status, count.max(0) as u64);
                }
                None => tracing::warn!(code, count, "Unknown status code in record db"),
            }
        }
        Ok(counts)
    }

    // ===== Segments =====

    fn save_segment(&mut self, segment: &Segment) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO segments (name, stage, created_at) VALUES (?1, ?2, ?3)",
            params![
                segment.name,
                SegmentStage::Generated.to_db_string(),
                Utc::now().to_rfc3339()
            ],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO segment_entries (segment, position, url, data) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, entry) in segment.entries.iter().enumerate() {
                stmt.execute(params![
                    segment.name,
                    position as i64,
                    entry.url,
                    serde_json::to_string(entry)?
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_segment(&self, name: &str) -> StorageResult<Segment> {
        let exists: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM segments WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StorageError::SegmentNotFound(name.to_string()));
        }

        let mut stmt = self.conn.prepare(
            "SELECT data FROM segment_entries WHERE segment = ?1 ORDER BY position",
        )?;
        let rows = stmt
            .query_map(params![name], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let entries = rows
            .iter()
            .map(|data| serde_json::from_str::<SelectorEntry>(data))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Segment {
            name: name.to_string(),
            entries,
        })
    }

    fn mark_segment(&mut self, name: &str, stage: SegmentStage) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE segments SET stage = ?1 WHERE name = ?2",
            params![stage.to_db_string(), name],
        )?;
        if updated == 0 {
            return Err(StorageError::SegmentNotFound(name.to_string()));
        }
        Ok(())
    }

    fn latest_segment(&self, stage: SegmentStage) -> StorageResult<Option<String>> {
        let name = self
            .conn
            .query_row(
                "SELECT name FROM segments WHERE stage = ?1 ORDER BY name DESC LIMIT 1",
                params![stage.to_db_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    // ===== Fetch Output =====

    fn save_fetch_output(&mut self, segment: &str, output: &[FetchOutput]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM fetch_output WHERE segment = ?1",
            params![segment],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO fetch_output (segment, seq, url, data, content) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (seq, out) in output.iter().enumerate() {
                stmt.execute(params![
                    segment,
                    seq as i64,
                    out.url,
                    out.record.to_json()?,
                    out.content
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_fetch_output(&self, segment: &str) -> StorageResult<Vec<FetchOutput>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, data, content FROM fetch_output WHERE segment = ?1 ORDER BY seq",
        )?;
        let rows = stmt
            .query_map(params![segment], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<Vec<u8>>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(url, data, content)| {
                Ok(FetchOutput {
                    url,
                    record: CrawlRecord::from_json(&data)?,
                    content,
                })
            })
            .collect()
    }

    // ===== Run Journal =====

    fn start_run(
        &mut self,
        phase: &str,
        segment: Option<&str>,
        config_hash: &str,
    ) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO runs (phase, segment, started_at, config_hash, status) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                phase,
                segment,
                Utc::now().to_rfc3339(),
                config_hash,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), Utc::now().to_rfc3339(), run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }
}

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use engine_logging::{engine_debug, engine_info, engine_warn};
use harvester_core::{merge_record, Record, RecordKey, RunSummary, StopReason, UpsertOutcome};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};

use super::{RecordStore, StoreError, TableSchema};

pub(crate) const RUNS_TABLE: &str = "harvest_runs";

/// SQLite-backed store, one table per source type.
///
/// Upserts are staged in memory, merged per key, and written by `flush` in a
/// single short `BEGIN IMMEDIATE` transaction. The database write lock is
/// only held inside `flush`, so several stores may share one file. The merge
/// rule runs inside an `INSERT .. ON CONFLICT DO UPDATE` statement, so rows
/// written concurrently by another connection are merged, not overwritten.
pub struct SqliteStore {
    inner: Mutex<Inner>,
    schema: TableSchema,
    upsert_sql: String,
    select_sql: String,
    exists_sql: String,
}

struct Inner {
    conn: Connection,
    pending: BTreeMap<RecordKey, Pending>,
}

/// Sightings of one key since the last flush.
struct Pending {
    record: Record,
    sightings: i64,
    first_seen_at: String,
    last_seen_at: String,
    /// Absent from the table when first staged.
    fresh: bool,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>, schema: TableSchema) -> Result<Self, StoreError> {
        schema.validate()?;
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        // NORMAL may lose committed batches on power loss in WAL mode.
        conn.pragma_update(None, "synchronous", "FULL")?;
        engine_info!(
            "Opened store {:?} (table {}, journal {})",
            path.as_ref(),
            schema.table,
            mode
        );
        Self::with_connection(conn, schema)
    }

    pub fn in_memory(schema: TableSchema) -> Result<Self, StoreError> {
        schema.validate()?;
        Self::with_connection(Connection::open_in_memory()?, schema)
    }

    fn with_connection(conn: Connection, schema: TableSchema) -> Result<Self, StoreError> {
        bootstrap(&conn, &schema)?;
        let upsert_sql = build_upsert_sql(&schema);
        let select_sql = build_select_sql(&schema);
        let exists_sql = format!(
            "SELECT 1 FROM \"{}\" WHERE source_item_id = ?1 AND group_key = ?2",
            schema.table
        );
        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                pending: BTreeMap::new(),
            }),
            schema,
            upsert_sql,
            select_sql,
            exists_sql,
        })
    }

    /// Run summaries recorded for `group_key`, oldest first.
    ///
    /// A stop reason this build does not know is reported as a conversion
    /// error rather than guessed.
    pub fn runs(&self, group_key: &str) -> Result<Vec<RunSummary>, StoreError> {
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare(&format!(
            "SELECT group_key, attempted_count, saved_count, merged_count, skipped_count,
                    miss_count, rounds, running_total, stop_reason
             FROM {RUNS_TABLE} WHERE group_key = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params![group_key], |row| {
            let code: String = row.get(8)?;
            let stop_reason = StopReason::from_code(&code).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    8,
                    Type::Text,
                    format!("unknown stop reason {code:?}").into(),
                )
            })?;
            Ok(RunSummary {
                group_key: row.get(0)?,
                attempted_count: from_db(row.get(1)?),
                saved_count: from_db(row.get(2)?),
                merged_count: from_db(row.get(3)?),
                skipped_count: from_db(row.get(4)?),
                miss_count: from_db(row.get(5)?),
                rounds: from_db(row.get(6)?),
                running_total: from_db(row.get(7)?),
                stop_reason,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Writes every staged record, plus an optional run row, in one
    /// transaction. Staged records are kept if the write fails.
    fn write_batch(&self, inner: &mut Inner, run: Option<&RunSummary>) -> Result<(), StoreError> {
        if inner.pending.is_empty() && run.is_none() {
            return Ok(());
        }
        let Inner { conn, pending } = inner;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut upsert = tx.prepare_cached(&self.upsert_sql)?;
            for staged in pending.values() {
                upsert.execute(params_from_iter(self.row_values(staged)))?;
            }
        }
        if let Some(summary) = run {
            insert_run(&tx, summary)?;
        }
        tx.commit()?;
        if !pending.is_empty() {
            engine_debug!("Store batch of {} records committed", pending.len());
        }
        pending.clear();
        Ok(())
    }

    fn row_values(&self, staged: &Pending) -> Vec<Value> {
        let record = &staged.record;
        let mut values = Vec::with_capacity(
            5 + self.schema.text_fields.len() + self.schema.counter_fields.len(),
        );
        values.push(Value::Text(record.source_item_id.clone()));
        values.push(Value::Text(record.group_key.clone()));
        for field in &self.schema.text_fields {
            values.push(Value::Text(record.field(field).to_string()));
        }
        for counter in &self.schema.counter_fields {
            values.push(Value::Integer(to_db(record.counter(counter))));
        }
        values.push(Value::Integer(staged.sightings));
        values.push(Value::Text(staged.first_seen_at.clone()));
        values.push(Value::Text(staged.last_seen_at.clone()));
        values
    }
}

impl RecordStore for SqliteStore {
    fn upsert(&self, record: &Record) -> Result<UpsertOutcome, StoreError> {
        if !record.is_identified() {
            return Err(StoreError::Unidentified);
        }
        let now = Utc::now().to_rfc3339();
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let key = record.key();

        if let Some(staged) = inner.pending.get_mut(&key) {
            merge_record(&mut staged.record, record);
            staged.sightings += 1;
            staged.last_seen_at = now;
            return Ok(UpsertOutcome::Merged);
        }

        let exists = inner
            .conn
            .prepare_cached(&self.exists_sql)?
            .exists(params![record.source_item_id, record.group_key])?;
        inner.pending.insert(
            key,
            Pending {
                record: record.clone(),
                sightings: 1,
                first_seen_at: now.clone(),
                last_seen_at: now,
                fresh: !exists,
            },
        );
        Ok(if exists {
            UpsertOutcome::Merged
        } else {
            UpsertOutcome::Inserted
        })
    }

    fn flush(&self) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        self.write_batch(&mut inner, None)
    }

    fn count(&self, group_key: &str) -> Result<u64, StoreError> {
        let inner = self.lock()?;
        let stored: i64 = inner.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM \"{}\" WHERE group_key = ?1",
                self.schema.table
            ),
            params![group_key],
            |row| row.get(0),
        )?;
        let staged = inner
            .pending
            .values()
            .filter(|staged| staged.fresh && staged.record.group_key == group_key)
            .count() as u64;
        Ok(from_db(stored) + staged)
    }

    fn get(&self, source_item_id: &str, group_key: &str) -> Result<Option<Record>, StoreError> {
        let inner = self.lock()?;
        let text_len = self.schema.text_fields.len();
        let stored = inner
            .conn
            .query_row(&self.select_sql, params![source_item_id, group_key], |row| {
                let mut record = Record::new(source_item_id, group_key);
                for (idx, field) in self.schema.text_fields.iter().enumerate() {
                    record.set_field(field.clone(), row.get::<_, String>(idx)?);
                }
                for (idx, counter) in self.schema.counter_fields.iter().enumerate() {
                    record.set_counter(counter.clone(), from_db(row.get(text_len + idx)?));
                }
                Ok(record)
            })
            .optional()?;

        let key = RecordKey {
            source_item_id: source_item_id.to_string(),
            group_key: group_key.to_string(),
        };
        Ok(match (stored, inner.pending.get(&key)) {
            (Some(mut record), Some(staged)) => {
                merge_record(&mut record, &staged.record);
                Some(record)
            }
            (None, Some(staged)) => Some(staged.record.clone()),
            (stored, None) => stored,
        })
    }

    fn record_run(&self, summary: &RunSummary) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        self.write_batch(&mut inner, Some(summary))
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.get_mut() {
            if !inner.pending.is_empty() {
                engine_warn!(
                    "Store dropped with {} unflushed records; they are discarded",
                    inner.pending.len()
                );
            }
        }
    }
}

fn insert_run(conn: &Connection, summary: &RunSummary) -> Result<(), StoreError> {
    conn.execute(
        &format!(
            "INSERT INTO {RUNS_TABLE} (
                group_key, attempted_count, saved_count, merged_count, skipped_count,
                miss_count, rounds, running_total, stop_reason, finished_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
        ),
        params![
            summary.group_key,
            to_db(summary.attempted_count),
            to_db(summary.saved_count),
            to_db(summary.merged_count),
            to_db(summary.skipped_count),
            to_db(summary.miss_count),
            to_db(summary.rounds),
            to_db(summary.running_total),
            summary.stop_reason.code(),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn bootstrap(conn: &Connection, schema: &TableSchema) -> Result<(), StoreError> {
    let table = &schema.table;
    let mut columns = String::new();
    for field in &schema.text_fields {
        columns.push_str(&format!("\"{field}\" TEXT NOT NULL DEFAULT '',\n"));
    }
    for counter in &schema.counter_fields {
        columns.push_str(&format!("\"{counter}\" INTEGER NOT NULL DEFAULT 0,\n"));
    }

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_item_id TEXT NOT NULL,
            group_key TEXT NOT NULL,
            {columns}
            sightings INTEGER NOT NULL DEFAULT 1,
            first_seen_at TEXT NOT NULL DEFAULT '',
            last_seen_at TEXT NOT NULL DEFAULT '',
            UNIQUE(source_item_id, group_key)
        );
        CREATE INDEX IF NOT EXISTS \"idx_{table}_group\" ON \"{table}\"(group_key);
        CREATE TABLE IF NOT EXISTS {RUNS_TABLE} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_key TEXT NOT NULL,
            attempted_count INTEGER NOT NULL,
            saved_count INTEGER NOT NULL,
            merged_count INTEGER NOT NULL,
            skipped_count INTEGER NOT NULL,
            miss_count INTEGER NOT NULL,
            rounds INTEGER NOT NULL,
            running_total INTEGER NOT NULL,
            stop_reason TEXT NOT NULL,
            finished_at TEXT NOT NULL
        );"
    ))?;

    // Tables created by an older schema gain the new columns in place.
    let existing = table_columns(conn, table)?;
    for field in &schema.text_fields {
        if !existing.contains(field) {
            conn.execute_batch(&format!(
                "ALTER TABLE \"{table}\" ADD COLUMN \"{field}\" TEXT NOT NULL DEFAULT ''"
            ))?;
            engine_info!("Added text column {} to {}", field, table);
        }
    }
    for counter in &schema.counter_fields {
        if !existing.contains(counter) {
            conn.execute_batch(&format!(
                "ALTER TABLE \"{table}\" ADD COLUMN \"{counter}\" INTEGER NOT NULL DEFAULT 0"
            ))?;
            engine_info!("Added counter column {} to {}", counter, table);
        }
    }
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    Ok(names.collect::<Result<Vec<_>, _>>()?)
}

fn build_upsert_sql(schema: &TableSchema) -> String {
    let table = &schema.table;
    let columns: Vec<&String> = schema
        .text_fields
        .iter()
        .chain(&schema.counter_fields)
        .collect();

    let column_list: String = columns.iter().map(|c| format!(", \"{c}\"")).collect();
    let placeholders: String = (0..columns.len()).map(|i| format!(", ?{}", i + 3)).collect();
    let sightings = columns.len() + 3;
    let first_seen = sightings + 1;
    let last_seen = sightings + 2;

    let mut updates: Vec<String> = schema
        .text_fields
        .iter()
        .map(|f| {
            format!(
                "\"{f}\" = CASE WHEN TRIM(excluded.\"{f}\") <> '' THEN excluded.\"{f}\" ELSE \"{table}\".\"{f}\" END"
            )
        })
        .collect();
    updates.extend(
        schema
            .counter_fields
            .iter()
            .map(|c| format!("\"{c}\" = MAX(\"{table}\".\"{c}\", excluded.\"{c}\")")),
    );
    updates.push(format!(
        "sightings = \"{table}\".sightings + excluded.sightings"
    ));
    updates.push("last_seen_at = excluded.last_seen_at".to_string());

    format!(
        "INSERT INTO \"{table}\" (source_item_id, group_key{column_list}, sightings, first_seen_at, last_seen_at)
         VALUES (?1, ?2{placeholders}, ?{sightings}, ?{first_seen}, ?{last_seen})
         ON CONFLICT(source_item_id, group_key) DO UPDATE SET {}",
        updates.join(", ")
    )
}

fn build_select_sql(schema: &TableSchema) -> String {
    let columns: Vec<String> = schema
        .text_fields
        .iter()
        .chain(&schema.counter_fields)
        .map(|c| format!("\"{c}\""))
        .collect();
    let projection = if columns.is_empty() {
        "1".to_string()
    } else {
        columns.join(", ")
    };
    format!(
        "SELECT {projection} FROM \"{}\" WHERE source_item_id = ?1 AND group_key = ?2",
        schema.table
    )
}

fn to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

//! SQLite implementation of HistoryStore.
//!
//! One file per project, `<root>/<project id>.<extension>`, in WAL mode.
//! The pool holds a single connection so every statement against a file
//! runs serialized, whatever the number of concurrent callers.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::condition::push_condition;
use super::schema::{self, quoted, validate_table_name, SCHEMA_VERSION};
use crate::domain::event::QueryCondition;
use crate::domain::foundation::{ProjectId, RunId, Timestamp};
use crate::ports::{
    BlobRow, EventRow, HistoryStore, HistoryStoreFactory, RunInfo, StatusMap, StoreError,
    WriteOptions,
};

fn database(context: &str, err: sqlx::Error) -> StoreError {
    StoreError::Database(format!("Failed to {}: {}", context, err))
}

/// SQLite-backed history for one project.
pub struct SqliteHistoryStore {
    project_id: ProjectId,
    path: PathBuf,
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Opens or creates the store file at `path` and checks its markers.
    ///
    /// A project marker naming another project is always fatal. A version
    /// marker mismatch is fatal only with `strict_version`.
    pub async fn open(
        project_id: ProjectId,
        path: impl Into<PathBuf>,
        strict_version: bool,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| database("open store", e))?;

        let store = Self {
            project_id,
            path,
            pool,
        };

        if let Err(err) = store.bootstrap(strict_version).await {
            store.pool.close().await;
            return Err(err);
        }

        tracing::debug!(
            project_id = %store.project_id,
            path = %store.path.display(),
            "history store opened"
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn bootstrap(&self, strict_version: bool) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| database("begin transaction", e))?;

        for ddl in schema::BOOTSTRAP {
            sqlx::query(ddl)
                .execute(&mut *tx)
                .await
                .map_err(|e| database("create fixed tables", e))?;
        }

        let found: Option<String> =
            sqlx::query_scalar("SELECT projectid FROM projectid WHERE id = 1")
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| database("read project marker", e))?;
        match found {
            Some(found) if found != self.project_id.as_str() => {
                return Err(StoreError::ProjectMismatch {
                    expected: self.project_id.to_string(),
                    found,
                });
            }
            Some(_) => {}
            None => {
                sqlx::query("INSERT INTO projectid (id, projectid) VALUES (1, ?)")
                    .bind(self.project_id.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| database("write project marker", e))?;
            }
        }

        let version: Option<String> =
            sqlx::query_scalar("SELECT version FROM version WHERE id = 1")
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| database("read version marker", e))?;
        match version {
            Some(found) if found != SCHEMA_VERSION => {
                if strict_version {
                    return Err(StoreError::VersionMismatch {
                        expected: SCHEMA_VERSION.to_string(),
                        found,
                    });
                }
                tracing::warn!(
                    project_id = %self.project_id,
                    expected = SCHEMA_VERSION,
                    found = %found,
                    "history store version differs, continuing"
                );
            }
            Some(_) => {}
            None => {
                sqlx::query("INSERT INTO version (id, version) VALUES (1, ?)")
                    .bind(SCHEMA_VERSION)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| database("write version marker", e))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| database("commit bootstrap", e))
    }

    async fn read_rows(
        &self,
        select: &str,
        table: &str,
        condition: &QueryCondition,
    ) -> Result<Vec<SqliteRow>, StoreError> {
        validate_table_name(table)?;
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| database("acquire connection", e))?;
        if !table_exists(&mut conn, table).await? {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM {} t LEFT JOIN runids r ON r.id = t.runid",
            select,
            quoted(table)
        ));
        push_condition(&mut builder, condition);
        builder
            .build()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| database(&format!("read table '{}'", table), e))
    }
}

async fn table_exists(conn: &mut SqliteConnection, table: &str) -> Result<bool, StoreError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_one(conn)
            .await
            .map_err(|e| database("inspect schema", e))?;
    Ok(count > 0)
}

/// Internal id of a run, inserting the directory row on first sight.
async fn resolve_run(conn: &mut SqliteConnection, run_id: &RunId) -> Result<i64, StoreError> {
    sqlx::query(
        "INSERT INTO runids (runid, created_at, metadata) VALUES (?, ?, '{}') \
         ON CONFLICT(runid) DO NOTHING",
    )
    .bind(run_id.as_str())
    .bind(Timestamp::now().to_wire())
    .execute(&mut *conn)
    .await
    .map_err(|e| database("register run id", e))?;

    sqlx::query_scalar("SELECT id FROM runids WHERE runid = ?")
        .bind(run_id.as_str())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| database("resolve run id", e))
}

/// Deletes all but the newest `limit` rows for `(run, series)`.
async fn trim(
    conn: &mut SqliteConnection,
    table: &str,
    run: Option<i64>,
    series: Option<&str>,
    limit: u32,
) -> Result<u64, StoreError> {
    let t = quoted(table);
    let result = sqlx::query(&format!(
        "DELETE FROM {t} WHERE runid IS ?1 AND series IS ?2 AND id NOT IN \
         (SELECT id FROM {t} WHERE runid IS ?1 AND series IS ?2 ORDER BY id DESC LIMIT ?3)"
    ))
    .bind(run)
    .bind(series)
    .bind(i64::from(limit))
    .execute(conn)
    .await
    .map_err(|e| database(&format!("trim table '{}'", table), e))?;
    Ok(result.rows_affected())
}

fn parse_json(text: &str) -> Result<Value, StoreError> {
    Ok(serde_json::from_str(text)?)
}

fn parse_object(text: &str) -> Result<Map<String, Value>, StoreError> {
    match parse_json(text)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(StoreError::Serialization(format!(
            "expected a JSON object, found {}",
            other
        ))),
    }
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| database(&format!("decode column '{}'", name), e))
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    async fn write_event(
        &self,
        table: &str,
        payload: &Value,
        options: WriteOptions,
    ) -> Result<i64, StoreError> {
        validate_table_name(table)?;
        let json = serde_json::to_string(payload)?;
        let timestamp = options
            .timestamp
            .unwrap_or_else(|| Timestamp::now().to_wire());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| database("begin transaction", e))?;

        for ddl in schema::create_event_table(table) {
            sqlx::query(&ddl)
                .execute(&mut *tx)
                .await
                .map_err(|e| database(&format!("create table '{}'", table), e))?;
        }

        let run = match &options.run_id {
            Some(run_id) => Some(resolve_run(&mut tx, run_id).await?),
            None => None,
        };

        let id = sqlx::query(&format!(
            "INSERT INTO {} (timestamp, series, runid, json) VALUES (?, ?, ?, ?)",
            quoted(table)
        ))
        .bind(&timestamp)
        .bind(options.series.as_deref())
        .bind(run)
        .bind(&json)
        .execute(&mut *tx)
        .await
        .map_err(|e| database(&format!("insert into '{}'", table), e))?
        .last_insert_rowid();

        if let Some(limit) = options.retention_limit {
            let removed = trim(&mut tx, table, run, options.series.as_deref(), limit).await?;
            if removed > 0 {
                tracing::trace!(project_id = %self.project_id, table, removed, "history trimmed");
            }
        }

        tx.commit()
            .await
            .map_err(|e| database("commit event", e))?;
        Ok(id)
    }

    async fn write_blob(
        &self,
        table: &str,
        metadata: &Value,
        blob: &[u8],
        options: WriteOptions,
    ) -> Result<i64, StoreError> {
        validate_table_name(table)?;
        let metadata = serde_json::to_string(metadata)?;
        let timestamp = options
            .timestamp
            .unwrap_or_else(|| Timestamp::now().to_wire());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| database("begin transaction", e))?;

        for ddl in schema::create_blob_table(table) {
            sqlx::query(&ddl)
                .execute(&mut *tx)
                .await
                .map_err(|e| database(&format!("create table '{}'", table), e))?;
        }

        let run = match &options.run_id {
            Some(run_id) => Some(resolve_run(&mut tx, run_id).await?),
            None => None,
        };

        let id = sqlx::query(&format!(
            "INSERT INTO {} (timestamp, series, runid, metadata, data) VALUES (?, ?, ?, ?, ?)",
            quoted(table)
        ))
        .bind(&timestamp)
        .bind(options.series.as_deref())
        .bind(run)
        .bind(&metadata)
        .bind(blob)
        .execute(&mut *tx)
        .await
        .map_err(|e| database(&format!("insert into '{}'", table), e))?
        .last_insert_rowid();

        if let Some(limit) = options.retention_limit {
            trim(&mut tx, table, run, options.series.as_deref(), limit).await?;
        }

        tx.commit()
            .await
            .map_err(|e| database("commit blob", e))?;
        Ok(id)
    }

    async fn read_events(
        &self,
        table: &str,
        condition: &QueryCondition,
    ) -> Result<Vec<EventRow>, StoreError> {
        let rows = self
            .read_rows(
                "t.id, t.timestamp, t.series, r.runid AS runid, t.json",
                table,
                condition,
            )
            .await?;

        rows.iter()
            .map(|row| -> Result<EventRow, StoreError> {
                let json: String = column(row, "json")?;
                Ok(EventRow {
                    id: column(row, "id")?,
                    timestamp: column(row, "timestamp")?,
                    series: column(row, "series")?,
                    run_id: column(row, "runid")?,
                    json: parse_json(&json)?,
                })
            })
            .collect()
    }

    async fn read_blobs(
        &self,
        table: &str,
        condition: &QueryCondition,
        meta_only: bool,
    ) -> Result<Vec<BlobRow>, StoreError> {
        let select = if meta_only {
            "t.id, t.timestamp, t.series, r.runid AS runid, t.metadata"
        } else {
            "t.id, t.timestamp, t.series, r.runid AS runid, t.metadata, t.data"
        };
        let rows = self.read_rows(select, table, condition).await?;

        rows.iter()
            .map(|row| -> Result<BlobRow, StoreError> {
                let metadata: String = column(row, "metadata")?;
                let blob: Option<Vec<u8>> = if meta_only {
                    None
                } else {
                    Some(column(row, "data")?)
                };
                Ok(BlobRow {
                    id: column(row, "id")?,
                    timestamp: column(row, "timestamp")?,
                    series: column(row, "series")?,
                    run_id: column(row, "runid")?,
                    metadata: parse_json(&metadata)?,
                    blob,
                })
            })
            .collect()
    }

    async fn set_status(
        &self,
        run_id: &RunId,
        series: &str,
        value: &Value,
    ) -> Result<i64, StoreError> {
        let json = serde_json::to_string(value)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| database("begin transaction", e))?;

        let run = resolve_run(&mut tx, run_id).await?;
        sqlx::query(
            "INSERT INTO status (runid, series, json) VALUES (?, ?, ?) \
             ON CONFLICT(runid, series) DO UPDATE SET json = excluded.json",
        )
        .bind(run)
        .bind(series)
        .bind(&json)
        .execute(&mut *tx)
        .await
        .map_err(|e| database("upsert status", e))?;

        let id: i64 = sqlx::query_scalar("SELECT id FROM status WHERE runid = ? AND series = ?")
            .bind(run)
            .bind(series)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| database("read status id", e))?;

        tx.commit()
            .await
            .map_err(|e| database("commit status", e))?;
        Ok(id)
    }

    async fn get_status(
        &self,
        run_id: Option<&RunId>,
        series: Option<&str>,
    ) -> Result<StatusMap, StoreError> {
        let rows = sqlx::query(
            "SELECT r.runid AS runid, s.series AS series, s.json AS json \
             FROM status s JOIN runids r ON r.id = s.runid \
             WHERE (?1 IS NULL OR r.runid = ?1) AND (?2 IS NULL OR s.series = ?2) \
             ORDER BY s.id",
        )
        .bind(run_id.map(|r| r.as_str()))
        .bind(series)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| database("read status", e))?;

        let mut status = StatusMap::new();
        for row in &rows {
            let run: String = column(row, "runid")?;
            let series: String = column(row, "series")?;
            let json: String = column(row, "json")?;
            status
                .entry(run)
                .or_default()
                .insert(series, parse_json(&json)?);
        }
        Ok(status)
    }

    async fn get_run_ids(&self) -> Result<Vec<RunInfo>, StoreError> {
        let rows = sqlx::query("SELECT runid, created_at, metadata FROM runids ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| database("list run ids", e))?;

        let mut runs = Vec::with_capacity(rows.len());
        for row in &rows {
            let run_id: String = column(row, "runid")?;
            let metadata: String = column(row, "metadata")?;
            runs.push(RunInfo {
                run_id: RunId::new(run_id).map_err(|e| StoreError::Serialization(e.to_string()))?,
                created_at: column(row, "created_at")?,
                metadata: parse_object(&metadata)?,
            });
        }
        Ok(runs)
    }

    async fn delete_run_id(&self, run_id: &RunId) -> Result<bool, StoreError> {
        // Child rows go with the parent through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM runids WHERE runid = ?")
            .bind(run_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| database("delete run id", e))?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(project_id = %self.project_id, run_id = %run_id, "run deleted");
        }
        Ok(deleted)
    }

    async fn fetch_or_create_metadata(
        &self,
        run_id: &RunId,
        updates: Option<Map<String, Value>>,
    ) -> Result<Map<String, Value>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| database("begin transaction", e))?;

        let run = resolve_run(&mut tx, run_id).await?;
        let current: String = sqlx::query_scalar("SELECT metadata FROM runids WHERE id = ?")
            .bind(run)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| database("read run metadata", e))?;
        let mut metadata = parse_object(&current)?;

        if let Some(updates) = updates {
            metadata.extend(updates);
            sqlx::query("UPDATE runids SET metadata = ? WHERE id = ?")
                .bind(serde_json::to_string(&metadata)?)
                .bind(run)
                .execute(&mut *tx)
                .await
                .map_err(|e| database("update run metadata", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| database("commit run metadata", e))?;
        Ok(metadata)
    }

    async fn series_of(
        &self,
        table: &str,
        run_id: Option<&RunId>,
    ) -> Result<Vec<String>, StoreError> {
        validate_table_name(table)?;
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| database("acquire connection", e))?;
        if !table_exists(&mut conn, table).await? {
            return Ok(Vec::new());
        }

        sqlx::query_scalar(&format!(
            "SELECT DISTINCT series FROM {} WHERE series IS NOT NULL \
             AND (?1 IS NULL OR runid = (SELECT id FROM runids WHERE runid = ?1)) \
             ORDER BY series",
            quoted(table)
        ))
        .bind(run_id.map(|r| r.as_str()))
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| database(&format!("list series of '{}'", table), e))
    }

    async fn size_bytes(&self) -> Result<u64, StoreError> {
        let mut total = 0;
        for path in store_files(&self.path) {
            match tokio::fs::metadata(&path).await {
                Ok(meta) => total += meta.len(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    async fn destroy(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        for path in store_files(&self.path) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        tracing::info!(project_id = %self.project_id, "history store removed");
        Ok(())
    }
}

/// Main file plus its WAL and shared-memory companions.
fn store_files(path: &Path) -> [PathBuf; 3] {
    let with_suffix = |suffix: &str| {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    };
    [path.to_path_buf(), with_suffix("-wal"), with_suffix("-shm")]
}

/// Opens project stores under one root directory.
#[derive(Debug, Clone)]
pub struct SqliteStoreFactory {
    root: PathBuf,
    extension: String,
    strict_version: bool,
}

impl SqliteStoreFactory {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>, strict_version: bool) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            strict_version,
        }
    }

    /// File a project's store lives in.
    pub fn path_for(&self, project_id: &ProjectId) -> PathBuf {
        self.root
            .join(format!("{}.{}", project_id.as_str(), self.extension))
    }
}

#[async_trait]
impl HistoryStoreFactory for SqliteStoreFactory {
    async fn open(&self, project_id: &ProjectId) -> Result<Arc<dyn HistoryStore>, StoreError> {
        let store = SqliteHistoryStore::open(
            project_id.clone(),
            self.path_for(project_id),
            self.strict_version,
        )
        .await?;
        Ok(Arc::new(store))
    }

    async fn discover(&self) -> Result<Vec<ProjectId>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match ProjectId::new(stem) {
                Ok(project_id) => found.push(project_id),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping store file");
                }
            }
        }
        found.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(found)
    }
}

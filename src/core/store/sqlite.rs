use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::{SortOrder, SpecStore, StoreError, new_id};
use crate::core::models::{self, BridgeType, JobRun, JobSpec, Params, RunStatus, Task};

/// SQLite-backed store. A single connection guarded by an async mutex.
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

/// Storage form of a task; keeps `type` and params apart so params survive verbatim.
#[derive(serde::Serialize, serde::Deserialize)]
struct StoredTask {
    r#type: String,
    params: Params,
}

impl SqliteStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let db = Connection::open(path)?;
        init_schema(&db)?;
        info!("Job spec store opened at {}", path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Self {
        let db = Connection::open_in_memory().expect("open in-memory db");
        init_schema(&db).expect("init schema");
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }
}

fn init_schema(db: &Connection) -> rusqlite::Result<()> {
    db.execute_batch("PRAGMA foreign_keys = ON;")?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS job_specs (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            start_at TEXT,
            end_at TEXT,
            tasks_json TEXT NOT NULL
        )",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS job_runs (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL REFERENCES job_specs(id),
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            completed_at TEXT
        )",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS bridge_types (
            name TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    db.execute(
        "CREATE INDEX IF NOT EXISTS idx_job_specs_created_at ON job_specs(created_at)",
        [],
    )?;
    db.execute(
        "CREATE INDEX IF NOT EXISTS idx_job_runs_job_id_created ON job_runs(job_id, created_at)",
        [],
    )?;
    Ok(())
}

// Fixed-width UTC text sorts in chronological order.
fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Malformed(format!("timestamp '{}': {}", raw, e)))
}

fn parse_optional_time(raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.as_deref().map(parse_time).transpose()
}

struct SpecRow {
    id: String,
    created_at: String,
    start_at: Option<String>,
    end_at: Option<String>,
    tasks_json: String,
}

impl SpecRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            created_at: row.get(1)?,
            start_at: row.get(2)?,
            end_at: row.get(3)?,
            tasks_json: row.get(4)?,
        })
    }

    fn into_spec(self) -> Result<JobSpec, StoreError> {
        let stored: Vec<StoredTask> = serde_json::from_str(&self.tasks_json)
            .map_err(|e| StoreError::Malformed(format!("tasks of spec {}: {}", self.id, e)))?;
        Ok(JobSpec {
            created_at: parse_time(&self.created_at)?,
            start_at: parse_optional_time(self.start_at)?,
            end_at: parse_optional_time(self.end_at)?,
            tasks: stored
                .into_iter()
                .map(|t| Task {
                    r#type: t.r#type,
                    params: t.params,
                })
                .collect(),
            id: self.id,
        })
    }
}

struct RunRow {
    id: String,
    job_id: String,
    status: String,
    created_at: String,
    completed_at: Option<String>,
}

impl RunRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            job_id: row.get(1)?,
            status: row.get(2)?,
            created_at: row.get(3)?,
            completed_at: row.get(4)?,
        })
    }

    fn into_run(self) -> Result<JobRun, StoreError> {
        let status = RunStatus::from_status(&self.status).ok_or_else(|| {
            StoreError::Malformed(format!("run {} has status '{}'", self.id, self.status))
        })?;
        Ok(JobRun {
            created_at: parse_time(&self.created_at)?,
            completed_at: parse_optional_time(self.completed_at)?,
            id: self.id,
            job_id: self.job_id,
            status,
        })
    }
}

const SPEC_COLUMNS: &str = "id, created_at, start_at, end_at, tasks_json";
const RUN_COLUMNS: &str = "id, job_id, status, created_at, completed_at";

#[async_trait]
impl SpecStore for SqliteStore {
    async fn save(&self, spec: &mut JobSpec) -> Result<(), StoreError> {
        let stored: Vec<StoredTask> = spec
            .tasks
            .iter()
            .map(|t| StoredTask {
                r#type: t.r#type.clone(),
                params: t.params.clone(),
            })
            .collect();
        let tasks_json = serde_json::to_string(&stored)
            .map_err(|e| StoreError::Malformed(format!("tasks: {}", e)))?;
        let id = if spec.is_persisted() {
            spec.id.clone()
        } else {
            new_id()
        };

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO job_specs (id, created_at, start_at, end_at, tasks_json) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                format_time(spec.created_at),
                spec.start_at.map(format_time),
                spec.end_at.map(format_time),
                tasks_json
            ],
        )?;
        spec.id = id;
        Ok(())
    }

    async fn find_job(&self, id: &str) -> Result<JobSpec, StoreError> {
        let db = self.db.lock().await;
        let row = db
            .query_row(
                &format!("SELECT {SPEC_COLUMNS} FROM job_specs WHERE id = ?1"),
                params![id],
                SpecRow::from_row,
            )
            .optional()?;
        row.ok_or(StoreError::NotFound)?.into_spec()
    }

    async fn jobs_sorted(
        &self,
        order: SortOrder,
        offset: usize,
        size: usize,
    ) -> Result<(Vec<JobSpec>, usize), StoreError> {
        let limit = i64::try_from(size).map_err(|_| StoreError::OutOfRange("size"))?;
        let offset = i64::try_from(offset).map_err(|_| StoreError::OutOfRange("offset"))?;

        let db = self.db.lock().await;
        let count: i64 = db.query_row("SELECT COUNT(*) FROM job_specs", [], |row| row.get(0))?;

        let dir = order.as_sql();
        let mut stmt = db.prepare(&format!(
            "SELECT {SPEC_COLUMNS} FROM job_specs ORDER BY created_at {dir}, rowid {dir} LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![limit, offset], SpecRow::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_spec()?);
        }
        Ok((out, count as usize))
    }

    async fn job_runs_for(&self, id: &str) -> Result<Vec<JobRun>, StoreError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM job_runs WHERE job_id = ?1 ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map(params![id], RunRow::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_run()?);
        }
        Ok(out)
    }

    async fn create_job_run(&self, job_id: &str) -> Result<JobRun, StoreError> {
        let run = JobRun {
            id: new_id(),
            job_id: job_id.to_string(),
            status: RunStatus::Pending,
            created_at: models::now(),
            completed_at: None,
        };
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO job_runs (id, job_id, status, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                run.id,
                run.job_id,
                run.status.as_str(),
                format_time(run.created_at)
            ],
        )?;
        Ok(run)
    }

    async fn register_bridge(&self, bridge: &BridgeType) -> Result<(), StoreError> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT OR REPLACE INTO bridge_types (name, url) VALUES (?1, ?2)",
            params![bridge.name, bridge.url],
        )?;
        Ok(())
    }

    async fn bridge_registered(&self, name: &str) -> Result<bool, StoreError> {
        let db = self.db.lock().await;
        let found = db
            .query_row(
                "SELECT 1 FROM bridge_types WHERE name = ?1",
                params![name.to_lowercase()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::assignment::AssignmentSpec;
    use chrono::Duration;
    use serde_json::json;

    fn spec_at(created_at: DateTime<Utc>) -> JobSpec {
        let mut spec = JobSpec::new();
        spec.created_at = created_at;
        spec.tasks = vec![Task::new("noop", Params::default())];
        spec
    }

    #[tokio::test]
    async fn converted_spec_survives_save_and_reload() {
        let store = SqliteStore::open_in_memory();
        let a: AssignmentSpec = serde_json::from_value(json!({
            "assignment": {"subtasks": [{"adapterType": "noOp", "adapterParams": {"foo": "bar"}}]}
        }))
        .unwrap();

        let mut j1 = a.convert_to_job_spec().unwrap();
        assert!(j1.id.is_empty());
        store.save(&mut j1).await.unwrap();
        assert!(!j1.id.is_empty());

        let j2 = store.find_job(&j1.id).await.unwrap();
        assert_eq!(j2.id, j1.id);
        assert_eq!(j2.tasks.len(), 1);
        assert_eq!(j2.tasks[0].r#type, "noop");
        assert_eq!(
            serde_json::to_value(&j2.tasks[0].params).unwrap(),
            json!({"foo": "bar"})
        );
        assert_eq!(j2.created_at, j1.created_at);
    }

    #[tokio::test]
    async fn params_with_reserved_key_round_trip_in_storage() {
        let store = SqliteStore::open_in_memory();
        let mut spec = JobSpec::new();
        spec.tasks = vec![Task::new(
            "httpget",
            Params::try_from(json!({"type": "inner", "url": "u"})).unwrap(),
        )];
        store.save(&mut spec).await.unwrap();

        let loaded = store.find_job(&spec.id).await.unwrap();
        assert_eq!(loaded.tasks, spec.tasks);
    }

    #[tokio::test]
    async fn find_unknown_job_is_not_found() {
        let store = SqliteStore::open_in_memory();
        let err = store.find_job("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn saving_same_id_twice_fails() {
        let store = SqliteStore::open_in_memory();
        let mut spec = JobSpec::new();
        store.save(&mut spec).await.unwrap();
        let mut dup = spec.clone();
        assert!(matches!(
            store.save(&mut dup).await,
            Err(StoreError::Database(_))
        ));
    }

    #[tokio::test]
    async fn jobs_sorted_pages_and_counts() {
        let store = SqliteStore::open_in_memory();
        let base = models::now();
        for i in 0..5 {
            let mut spec = spec_at(base + Duration::seconds(i));
            store.save(&mut spec).await.unwrap();
        }

        let (page, count) = store.jobs_sorted(SortOrder::Ascending, 0, 2).await.unwrap();
        assert_eq!(count, 5);
        assert_eq!(page.len(), 2);
        assert!(page[0].created_at <= page[1].created_at);

        let (page, count) = store.jobs_sorted(SortOrder::Ascending, 4, 2).await.unwrap();
        assert_eq!(count, 5);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].created_at, base + Duration::seconds(4));

        let (page, _) = store.jobs_sorted(SortOrder::Descending, 0, 5).await.unwrap();
        assert!(page.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        assert_eq!(page[0].created_at, base + Duration::seconds(4));
    }

    #[tokio::test]
    async fn jobs_sorted_rejects_offsets_sqlite_cannot_hold() {
        let store = SqliteStore::open_in_memory();
        let mut spec = spec_at(models::now());
        store.save(&mut spec).await.unwrap();

        let err = store
            .jobs_sorted(SortOrder::Ascending, i64::MAX as usize + 1, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OutOfRange("offset")));

        let (page, count) = store
            .jobs_sorted(SortOrder::Ascending, i64::MAX as usize, 10)
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn runs_are_listed_in_creation_order() {
        let store = SqliteStore::open_in_memory();
        let mut spec = JobSpec::new();
        store.save(&mut spec).await.unwrap();
        assert!(store.job_runs_for(&spec.id).await.unwrap().is_empty());

        let first = store.create_job_run(&spec.id).await.unwrap();
        let second = store.create_job_run(&spec.id).await.unwrap();
        let runs = store.job_runs_for(&spec.id).await.unwrap();
        let ids: Vec<_> = runs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, [first.id.as_str(), second.id.as_str()]);
        assert!(runs.iter().all(|r| r.status == RunStatus::Pending));
    }

    #[tokio::test]
    async fn run_for_unknown_spec_violates_foreign_key() {
        let store = SqliteStore::open_in_memory();
        assert!(store.create_job_run("nope").await.is_err());
    }

    #[tokio::test]
    async fn bridges_are_case_insensitive() {
        let store = SqliteStore::open_in_memory();
        assert!(!store.bridge_registered("randomnumber").await.unwrap());
        store
            .register_bridge(&BridgeType::new("RandomNumber", "http://localhost:8080"))
            .await
            .unwrap();
        assert!(store.bridge_registered("randomnumber").await.unwrap());
        assert!(store.bridge_registered("RANDOMNUMBER").await.unwrap());
    }

    #[tokio::test]
    async fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("specs.db");
        let store = SqliteStore::open(&path).await.unwrap();
        let mut spec = JobSpec::new();
        store.save(&mut spec).await.unwrap();
        assert!(path.exists());
    }
}

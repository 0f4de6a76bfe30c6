mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::core::models::{BridgeType, JobRun, JobSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    /// `-createdAt` sorts newest first; anything else is oldest first.
    pub fn from_query(sort: Option<&str>) -> Self {
        match sort {
            Some("-createdAt") => SortOrder::Descending,
            _ => SortOrder::Ascending,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("malformed record: {0}")]
    Malformed(String),
    #[error("{0} is out of range")]
    OutOfRange(&'static str),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound | StoreError::Database(rusqlite::Error::QueryReturnedNoRows)
        )
    }
}

/// Persistence contract for job specs, their runs, and bridge adapters.
#[async_trait]
pub trait SpecStore: Send + Sync {
    /// Inserts a spec, assigning an id first when it has none.
    async fn save(&self, spec: &mut JobSpec) -> Result<(), StoreError>;

    async fn find_job(&self, id: &str) -> Result<JobSpec, StoreError>;

    /// One page of specs by creation time, plus the unpaginated total.
    async fn jobs_sorted(
        &self,
        order: SortOrder,
        offset: usize,
        size: usize,
    ) -> Result<(Vec<JobSpec>, usize), StoreError>;

    /// All runs of a spec in creation order.
    async fn job_runs_for(&self, id: &str) -> Result<Vec<JobRun>, StoreError>;

    async fn create_job_run(&self, job_id: &str) -> Result<JobRun, StoreError>;

    async fn register_bridge(&self, bridge: &BridgeType) -> Result<(), StoreError>;

    async fn bridge_registered(&self, name: &str) -> Result<bool, StoreError>;
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

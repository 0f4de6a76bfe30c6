use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::core::models::JobSpec;
use crate::core::store::{SpecStore, StoreError};

/// Accepts a validated spec into the system: persistence plus any hand-off
/// to the execution engine.
#[async_trait]
pub trait JobAcceptor: Send + Sync {
    async fn add_job(&self, spec: &mut JobSpec) -> Result<(), StoreError>;
}

/// Persists specs; runs are recorded later by whoever executes them.
pub struct StoreAcceptor {
    store: Arc<dyn SpecStore>,
}

impl StoreAcceptor {
    pub fn new(store: Arc<dyn SpecStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl JobAcceptor for StoreAcceptor {
    async fn add_job(&self, spec: &mut JobSpec) -> Result<(), StoreError> {
        self.store.save(spec).await?;
        info!(
            "Accepted job spec {} with {} task(s)",
            spec.id,
            spec.tasks.len()
        );
        Ok(())
    }
}

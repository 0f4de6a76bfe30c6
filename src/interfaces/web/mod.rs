mod errors;
mod handlers;
mod jsonapi;
mod pagination;
mod presenters;
mod router;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::core::config::{PaginationConfig, ServerConfig};
use crate::core::jobs::JobAcceptor;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::store::SpecStore;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<dyn SpecStore>,
    pub(crate) acceptor: Arc<dyn JobAcceptor>,
    pub(crate) pagination: PaginationConfig,
    pub(crate) log_tx: broadcast::Sender<String>,
    pub(crate) api_host: String,
    pub(crate) api_port: u16,
    pub(crate) allowed_origins: Vec<String>,
}

pub struct ApiServer {
    state: AppState,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ApiServer {
    pub fn new(
        config: &ServerConfig,
        store: Arc<dyn SpecStore>,
        acceptor: Arc<dyn JobAcceptor>,
        log_tx: broadcast::Sender<String>,
    ) -> Self {
        Self {
            state: AppState {
                store,
                acceptor,
                pagination: config.pagination,
                log_tx,
                api_host: config.api.host.clone(),
                api_port: config.api.port,
                allowed_origins: config.api.allowed_origins.clone(),
            },
            shutdown_tx: None,
        }
    }
}

// --- SSE Logs (used by router) ---

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(log) => Ok(Event::default().data(log)),
        Err(_) => Ok(Event::default().data("Log stream lagged")),
    });

    Sse::new(stream)
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.state.api_host, self.state.api_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let app = router::build_api_router(self.state.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);

        info!("API Server running at http://{addr}");
        tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!("API Server crashed: {}", e);
            }
        });
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server shutting down...");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        Ok(())
    }
}

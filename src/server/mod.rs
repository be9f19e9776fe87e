pub mod api;
pub mod auth;

use std::sync::Arc;

use anyhow::{Context, Result};
use colored::*;
use tokio::net::TcpListener;

use crate::config::AppConfig;
use crate::directory::InMemoryDirectory;
use crate::service::DiscussionService;
use crate::storage::{self, DiscussionStore};

pub use api::{router, AppState};
pub use auth::{AuthenticationContext, HeaderAuthenticator, RequestTimeouts};

/// Wire storage, collaborators and auth from configuration
pub fn build_state(config: &AppConfig) -> Result<AppState> {
    let db = storage::open(&config.storage.data_dir, config.storage.busy_timeout())?;
    let store = DiscussionStore::new(db, config.storage.cache_capacity);

    let directory = match &config.directory.path {
        Some(path) => Arc::new(InMemoryDirectory::from_file(path)?),
        None => {
            tracing::warn!("no directory seed configured; every course lookup will miss");
            Arc::new(InMemoryDirectory::new())
        }
    };

    let service = DiscussionService::new(store, directory.clone(), directory)
        .with_read_retry(config.requests.read_retry.clone());

    Ok(AppState {
        service: Arc::new(service),
        auth: Arc::new(HeaderAuthenticator::new(&config.auth.actor_header)?),
        timeouts: config.requests.timeouts(),
    })
}

pub async fn start(config: &AppConfig) -> Result<()> {
    let state = build_state(config)?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    println!(
        "{} Server running at {}",
        "✓".green(),
        format!("http://{}", addr).bright_blue()
    );

    serve(listener, state).await
}

pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    tracing::info!(addr = ?listener.local_addr().ok(), "discussion API listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

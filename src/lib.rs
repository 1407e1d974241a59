//! pipetrack -- CI pipeline execution tracking for API test automation.
//!
//! This crate triggers pipeline runs through a QA automation backend,
//! follows them to completion, aggregates their step-level test results,
//! and downloads their report artifacts. A small local API exposes the
//! tracked state to dashboards.

pub mod api;
pub mod client;
pub mod config;
pub mod model;
pub mod results;
pub mod storage;
pub mod tracker;

use anyhow::{Context, Result};

use crate::client::ApiClient;
use crate::config::Config;
use crate::results::{ResultBroadcaster, TestHistory};
use crate::storage::ExecutionStore;
use crate::tracker::ExecutionTracker;

/// Wire storage, the backend client and the result cell into a tracker.
///
/// The last persisted results are republished before returning.
pub fn build_tracker(config: &Config) -> Result<ExecutionTracker> {
    let db_path = config.storage.db_path.to_string_lossy();
    tracing::debug!(%db_path, "Opening database");
    let pool = storage::open_pool(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    let api = ApiClient::new(&config.api)?.into_shared();
    let results = ResultBroadcaster::new(pool.clone());
    results.restore();

    Ok(ExecutionTracker::new(
        api,
        ExecutionStore::new(pool.clone()),
        results,
        TestHistory::new(pool),
        config.provider.clone(),
    ))
}

/// Serve the local status API on `bind` until the process is stopped.
pub async fn serve(tracker: ExecutionTracker, bind: &str) -> Result<()> {
    let app = api::router(api::state::AppState { tracker });

    let addr: std::net::SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", bind))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "pipetrack listening");
    axum::serve(listener, app).await?;

    Ok(())
}

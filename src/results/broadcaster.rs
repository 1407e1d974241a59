//! Replay-latest publish/subscribe cell for the current test-result summary.
//!
//! Every subscriber receives the current value as soon as it subscribes,
//! then every later publication in publish order. Publications are never
//! coalesced, so all subscribers observe the same sequence.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::summary::{summarize, TestResultsSummary};
use crate::model::TestStepResult;
use crate::storage::{self, Pool, KEY_LAST_TEST_RESULTS};

/// Shared handle to a published summary.
pub type SharedSummary = Arc<TestResultsSummary>;

struct Cell {
    current: Option<SharedSummary>,
    subscribers: Vec<mpsc::UnboundedSender<Option<SharedSummary>>>,
}

/// The single authoritative source of the latest test results.
#[derive(Clone)]
pub struct ResultBroadcaster {
    cell: Arc<Mutex<Cell>>,
    pool: Pool,
}

/// Receiving end of a broadcaster subscription.
///
/// `None` items mean the results were cleared.
pub struct ResultSubscription {
    rx: mpsc::UnboundedReceiver<Option<SharedSummary>>,
}

impl ResultSubscription {
    /// Wait for the next published value. Returns `None` once the
    /// broadcaster is gone.
    pub async fn recv(&mut self) -> Option<Option<SharedSummary>> {
        self.rx.recv().await
    }

    /// Take the next value if one is already queued.
    pub fn try_recv(&mut self) -> Option<Option<SharedSummary>> {
        self.rx.try_recv().ok()
    }
}

impl ResultBroadcaster {
    pub fn new(pool: Pool) -> Self {
        Self {
            cell: Arc::new(Mutex::new(Cell {
                current: None,
                subscribers: Vec::new(),
            })),
            pool,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cell> {
        self.cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribe; the current value is delivered immediately.
    pub fn subscribe(&self) -> ResultSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut cell = self.lock();
        // Cannot fail: we still hold `rx`.
        let _ = tx.send(cell.current.clone());
        cell.subscribers.push(tx);
        ResultSubscription { rx }
    }

    pub fn latest(&self) -> Option<SharedSummary> {
        self.lock().current.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Recompute the summary from `results` and publish it.
    ///
    /// An empty result set publishes nothing and returns `None`.
    pub fn update(
        &self,
        results: Vec<TestStepResult>,
        run_id: i64,
        project_name: &str,
    ) -> Option<SharedSummary> {
        if results.is_empty() {
            debug!(run_id, project = %project_name, "No step results to publish");
            return None;
        }

        let summary = Arc::new(summarize(results, run_id, project_name));
        info!(
            run_id,
            project = %project_name,
            total = summary.total_steps(),
            passed = summary.passed_steps(),
            failed = summary.failed_steps(),
            skipped = summary.skipped_steps(),
            "Publishing test results"
        );

        // The durable copy is written under the cell lock so it always
        // matches the value published last.
        let mut cell = self.lock();
        if let Err(e) = self.persist(&summary) {
            // The in-memory cell stays authoritative even when the copy fails.
            warn!(run_id, "Failed to persist test results: {}", e);
        }
        publish(&mut cell, Some(summary.clone()));
        Some(summary)
    }

    /// Reload the last persisted summary and republish it.
    pub fn restore(&self) -> Option<SharedSummary> {
        let mut cell = self.lock();
        let raw = match storage::get_value(&self.pool, KEY_LAST_TEST_RESULTS) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read stored test results: {}", e);
                return None;
            }
        };

        let summary: TestResultsSummary = match serde_json::from_str(&raw) {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Ignoring corrupt stored test results: {}", e);
                return None;
            }
        };

        if summary.recent_results().is_empty() {
            return None;
        }

        debug!(run_id = summary.run_id(), "Restored test results from storage");
        let summary = Arc::new(summary);
        publish(&mut cell, Some(summary.clone()));
        Some(summary)
    }

    /// Publish `None` and drop the persisted copy.
    pub fn clear(&self) -> Result<()> {
        let mut cell = self.lock();
        publish(&mut cell, None);
        storage::remove_value(&self.pool, KEY_LAST_TEST_RESULTS)
            .context("Failed to remove stored test results")
    }

    fn persist(&self, summary: &TestResultsSummary) -> Result<()> {
        let json = serde_json::to_string(summary)?;
        storage::put_value(&self.pool, KEY_LAST_TEST_RESULTS, &json)
    }
}

fn publish(cell: &mut Cell, value: Option<SharedSummary>) {
    cell.current = value.clone();
    cell.subscribers.retain(|tx| tx.send(value.clone()).is_ok());
}

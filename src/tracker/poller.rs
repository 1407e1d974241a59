//! Interval-based status polling for the tracked execution.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ExecutionPhase, ExecutionTracker, TrackOutcome};

/// Why a polling loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollExit {
    /// The run reached a terminal phase.
    Finished(ExecutionPhase),
    Cancelled,
    /// The run stayed non-terminal past the stuck timeout.
    TimedOut,
    /// There was nothing to poll.
    NoExecution,
    /// The loop task panicked, usually inside the update callback.
    Panicked,
}

/// Handle to a running poll loop. Dropping it does not stop the loop.
pub struct PollHandle {
    token: CancellationToken,
    join: JoinHandle<PollExit>,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token that cancels this loop, for use from another task.
    pub fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the loop to end.
    pub async fn join(self) -> PollExit {
        match self.join.await {
            Ok(exit) => exit,
            Err(e) if e.is_panic() => {
                error!("Status polling task panicked: {}", e);
                PollExit::Panicked
            }
            Err(e) => {
                warn!("Status polling task aborted: {}", e);
                PollExit::Cancelled
            }
        }
    }
}

pub struct StatusPoller;

impl StatusPoller {
    /// Poll `tracker.refresh_status()` every `interval` on a background task.
    ///
    /// `on_update` sees every outcome, including the terminal one.
    pub fn spawn<F>(
        tracker: ExecutionTracker,
        interval: Duration,
        stuck_timeout: Option<Duration>,
        on_update: F,
    ) -> PollHandle
    where
        F: FnMut(&TrackOutcome) + Send + 'static,
    {
        let token = CancellationToken::new();
        let join = tokio::spawn(run_poll_loop(
            tracker,
            interval,
            stuck_timeout,
            token.clone(),
            on_update,
        ));
        PollHandle { token, join }
    }
}

async fn run_poll_loop<F>(
    tracker: ExecutionTracker,
    interval: Duration,
    stuck_timeout: Option<Duration>,
    token: CancellationToken,
    mut on_update: F,
) -> PollExit
where
    F: FnMut(&TrackOutcome),
{
    info!(interval_secs = interval.as_secs(), "Status polling started");

    let started = Instant::now();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!("Status polling cancelled");
                return PollExit::Cancelled;
            }
            _ = ticker.tick() => {}
        }

        if let Some(limit) = stuck_timeout {
            if started.elapsed() >= limit {
                warn!(timeout_secs = limit.as_secs(), "Pipeline run stuck, giving up");
                if let Err(e) = tracker.mark_timed_out() {
                    warn!("Failed to mark run as timed out: {}", e);
                }
                return PollExit::TimedOut;
            }
        }

        match tracker.current() {
            None => return PollExit::NoExecution,
            Some(execution) if !execution.has_run() => {
                debug!("No run assigned yet, skipping poll");
                continue;
            }
            Some(_) => {}
        }

        match tracker.refresh_status().await {
            Ok(outcome) => {
                on_update(&outcome);
                if outcome.phase.is_terminal() {
                    info!(phase = %outcome.phase, "Status polling finished");
                    return PollExit::Finished(outcome.phase);
                }
            }
            Err(e) => {
                // refresh_status already moved the record to the error state
                warn!("Status poll failed: {}", e);
                return PollExit::Finished(ExecutionPhase::Error);
            }
        }
    }
}
